use anyhow::Context as _;
use clap::Parser;
use log::{debug, info};

use chain_connector::config::Config;
use chain_connector::orchestrator::Connector;

#[derive(Parser)]
struct CliArgs {
    /// Path to the configuration file
    #[clap(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = CliArgs::parse();

    let config = Config::new(&args.config).context("failed to load configuration")?;
    debug!("Configuration loaded: {config:?}");

    let (mut connector, mut events) = Connector::load(&config)
        .await
        .context("failed to load connector")?;

    info!("run chain connector");
    tokio::select! {
        result = connector.run(&mut events) => {
            result.context("connector stopped on a fatal error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    connector.unload().context("failed to unload connector")?;
    info!("end chain connector");

    Ok(())
}
