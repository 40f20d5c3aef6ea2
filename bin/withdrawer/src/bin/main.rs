use clap::{Parser, Subcommand};
use config::ServiceConfig;
use eyre::WrapErr;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "withdrawer", about = "Pays out ledger withdraw requests as ERC20 transfers")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bridge until interrupted
    Run {
        /// Private key of the payout account
        #[arg(short = 'k', long, env = "PRIVATE_KEY", hide_env_values = true)]
        private_key: String,
    },
    /// Print the version
    Version,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let private_key = match cli.command {
        Command::Version => {
            println!("withdrawer {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Command::Run { private_key } => private_key,
    };

    info!("Starting withdrawer");
    let config = ServiceConfig::from_file(&cli.config)
        .wrap_err_with(|| format!("failed to load config {}", cli.config))?;
    info!(
        path = %cli.config,
        ledger = %config.ledger.url,
        rpc = %config.chain.rpc_url,
        owner = %config.ledger.owner,
        confirmations = config.chain.confirmations,
        "Loaded config"
    );

    if let Some(port) = config.metrics.port {
        withdrawer::install_prometheus_exporter(port)?;
        info!(port, "Prometheus exporter listening");
    }

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested");
        signal_token.cancel();
    });

    withdrawer::run(config, &private_key, token).await?;
    info!("Withdrawer stopped");

    Ok(())
}
