//! # Configuration
//!
//! The client is configured through:
//! - Base configuration file (`base_config.ron`)
//! - Environment variables prefixed with `JUNCTION_` (override base config)
//!
//! ## Base Configuration
//!
//! ```ron
//! Config(
//!     backend: BackendConfig(
//!         url: "http://localhost:37128",
//!         timeout: "30s",
//!     ),
//!     engine: EngineConfig(
//!         poll_interval: "2s",
//!         signature_counting: "first_input",
//!     ),
//! )
//! ```
//!
//! ## Environment Variable Overrides
//!
//! Use double underscores (`__`) to override nested configuration fields:
//!
//! ```bash
//! export JUNCTION_BACKEND__URL="http://127.0.0.1:37128"
//! export JUNCTION_BACKEND__TIMEOUT="10s"
//! export JUNCTION_ENGINE__POLL_INTERVAL="5s"
//!
//! # Count only signatures present on every input before allowing broadcast
//! export JUNCTION_ENGINE__SIGNATURE_COUNTING="every_input"
//!
//! junction wallets
//! ```
//!
//! # Logging
//!
//! Logging is controlled via the `RUST_LOG` environment variable. Defaults to `info` level.
//! Logs go to stderr; command results are printed to stdout as JSON.

use clap::Parser;
use junction_cli::{Cli, Command, config};
use junction_client::BackendClient;
use junction_wallet_engine::{Backend, Started, WalletEngine, WalletEngineConfig};
use tokio::task;
use tracing::{Subscriber, subscriber};
use tracing_subscriber::{EnvFilter, Registry, fmt::format::FmtSpan, layer::SubscriberExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = task::spawn_blocking(config::get_configuration).await??;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    subscriber::set_global_default(make_tracing_subscriber(env_filter))?;

    let engine = {
        let client = BackendClient::new(config.backend.url.parse()?, config.backend.timeout)?;
        let engine_config = WalletEngineConfig::builder()
            .poll_interval(config.engine.poll_interval)
            .signature_counting(config.engine.signature_counting)
            .build();

        WalletEngine::new(client, engine_config).start()
    };

    let outcome = match cli.command {
        Command::Watch => watch(&engine).await,
        command => run_once(&engine, command).await,
    };

    engine.stop().await?;

    outcome
}

async fn run_once<B>(engine: &WalletEngine<B, Started>, command: Command) -> anyhow::Result<()>
where
    B: Backend,
{
    let output = junction_cli::execute(engine, command)
        .await
        .inspect_err(|e| tracing::debug!("command failed: {e}"))?;

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn watch<B>(engine: &WalletEngine<B, Started>) -> anyhow::Result<()>
where
    B: Backend,
{
    let mut changes = engine.subscribe();
    let poller = engine.start_device_poller();
    tracing::info!("watching devices every {:?}", engine.config().poll_interval());

    let mut last = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                changed?;

                let devices = changes.borrow_and_update().device_list().to_vec();
                if last.as_ref() != Some(&devices) {
                    println!("{}", serde_json::to_string_pretty(&devices)?);
                    last = Some(devices);
                }
            },
        }
    }

    poller.stop().await?;

    Ok(())
}

fn make_tracing_subscriber(env_filter: EnvFilter) -> impl Subscriber {
    Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_line_number(true)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE),
        )
        .with(env_filter)
}
