//! Wiring of the withdraw bridge service.

use client::{EvmClient, GasSettings};
use config::ServiceConfig;
use eyre::WrapErr;
use ledger::{AssetWatcher, LedgerClient, SignerProxy};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use worker::{Dispatcher, Metrics, WorkerSettings};

/// Run the bridge until `token` is cancelled.
///
/// The asset watcher feeds the dispatcher, which keeps one initiator and one
/// confirmer running per withdrawable asset of the configured owner.
pub async fn run(
    config: ServiceConfig,
    private_key: &str,
    token: CancellationToken,
) -> eyre::Result<()> {
    let provider = client::create_provider(&config.chain.rpc_url)
        .await
        .wrap_err("failed to create chain provider")?;
    let gas = GasSettings {
        gas_limit: config.chain.gas_limit,
        gas_price: u128::from(config.chain.gas_price),
    };
    let chain = EvmClient::connect(provider, private_key, gas)
        .await
        .wrap_err("failed to connect chain client")?;
    info!(sender = %chain.address(), "Chain client ready");

    let ledger = LedgerClient::new(
        config.ledger.url.clone(),
        SignerProxy::new(config.ledger.signer_proxy_url.clone()),
    );
    let metrics = Metrics::new();

    let (watcher, events) = AssetWatcher::new(
        ledger.clone(),
        config.ledger.owner.clone(),
        config.poll.asset_period(),
    );
    let dispatcher = Dispatcher::new(ledger, chain, WorkerSettings::from(&config), metrics);

    info!(owner = %config.ledger.owner, "Watching assets");
    let watcher = tokio::spawn(watcher.run(token.clone()));
    dispatcher.run(events, token.clone()).await;

    // The dispatcher also returns when the watcher dies on its own.
    token.cancel();
    if let Err(err) = watcher.await {
        warn!(error = %err, "Asset watcher task failed");
    }

    Ok(())
}

/// Serve the process metrics for Prometheus scrapes on `0.0.0.0:port`.
///
/// Also registers the global recorder, so call it at most once.
pub fn install_prometheus_exporter(port: u16) -> eyre::Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::net::{Ipv4Addr, SocketAddr};

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .install()
        .wrap_err_with(|| format!("failed to serve metrics on port {port}"))
}
