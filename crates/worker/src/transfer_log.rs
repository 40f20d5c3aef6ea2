use alloy_primitives::{Address, U256};
use alloy_sol_types::SolEvent;
use binding::IERC20;
use client::ChainLog;

/// Whether `logs` hold a live `Transfer` of `amount` to `to` emitted by `token`.
///
/// Logs flagged as removed belong to a block dropped by a reorg and never
/// count; the remaining logs are still inspected.
pub fn has_transfer(logs: &[ChainLog], token: Address, to: Address, amount: U256) -> bool {
    logs.iter()
        .filter(|log| !log.removed && log.inner.address == token)
        .filter_map(|log| IERC20::Transfer::decode_log(&log.inner).ok())
        .any(|event| event.to == to && event.value == amount)
}

#[cfg(test)]
pub(crate) fn transfer_log(token: Address, from: Address, to: Address, amount: U256) -> ChainLog {
    let event = IERC20::Transfer {
        from,
        to,
        value: amount,
    };
    ChainLog {
        inner: alloy_primitives::Log {
            address: token,
            data: event.encode_log_data(),
        },
        removed: false,
    }
}
