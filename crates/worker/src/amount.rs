use alloy_primitives::U256;

/// Convert a ledger fixed-point amount into token units.
///
/// Lowering precision truncates. Returns `None` when the result does not fit
/// into 256 bits.
pub fn rescale(amount: u64, ledger_digits: u8, token_decimals: u8) -> Option<U256> {
    let amount = U256::from(amount);
    let ten = U256::from(10u8);

    if ledger_digits > token_decimals {
        let exponent = U256::from(ledger_digits - token_decimals);
        // 10^78 no longer fits; any u64 amount floors to zero well before that.
        Some(
            ten.checked_pow(exponent)
                .map_or(U256::ZERO, |divisor| amount / divisor),
        )
    } else {
        let exponent = U256::from(token_decimals - ledger_digits);
        ten.checked_pow(exponent)?.checked_mul(amount)
    }
}
