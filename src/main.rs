use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use log::{debug, info};

mod config;
mod doorbell;
mod error;
mod manager;
mod messages;
mod mqtt;
mod relay;

/// Relays doorbell visitor status between a remote service and a wearable.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    pretty_env_logger::formatted_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or(default_filter.to_string()))
        .init();

    let config_contents = std::fs::read_to_string(&args.config)
        .with_context(|| format!("Failed to read config file {}", args.config.display()))?;
    let config = config::AppConfig::from_toml(&config_contents)
        .with_context(|| format!("Failed to parse config file {}", args.config.display()))?;

    debug!("Doorbell: {:?}", config.doorbell);
    let relay_config = config.relay();
    info!(
        "Relaying doorbell {} to device {}",
        config.doorbell.doorbell_id,
        relay_config.device_name()
    );

    let doorbell = doorbell::DoorbellClient::new(&config.doorbell)?;
    let relay = relay::Relay::new(doorbell, &relay_config);

    let (mqtt_client, eventloop) =
        mqtt::MqttClient::new(&config.mqtt, &relay_config.device_name());
    mqtt_client.subscribe().await?;

    let core = manager::Manager::new(relay, mqtt_client, eventloop);
    core.run_loop().await?;

    Ok(())
}
