//! Field-half binary
//!
//! Runs the field agent on the RS-485 bridge: subscribes to the device's
//! mbnet topic and serves one RTU exchange per broker-origin frame.
//!
//! Usage: mbnet-agent [--config agent.toml]

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mbnet_gateway::{config, AgentSettings, FieldAgent, GatewayResult};

#[derive(Parser)]
#[command(name = "mbnet-agent", about = "MQTT to Modbus RTU gateway, field half")]
struct Args {
    /// Path to a TOML settings file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> GatewayResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut settings: AgentSettings = match &args.config {
        Some(path) => config::load(path)?,
        None => AgentSettings::default(),
    };
    settings.mqtt.apply_env();

    info!(
        device = %settings.device,
        serial = %settings.serial.port,
        "Starting field agent v{}",
        mbnet_gateway::VERSION
    );

    let agent = FieldAgent::new(settings)?;
    agent.run().await
}
