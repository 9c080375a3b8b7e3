//! Broker-half binary
//!
//! Connects to the MQTT broker, subscribes to the request and mbnet topics,
//! and feeds every inbound packet to the gateway pipeline.
//!
//! Usage: mbnet-gateway [--config gateway.toml]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mbnet_gateway::{config, Gateway, GatewayError, GatewayResult, GatewaySettings, MqttLink};

#[derive(Parser)]
#[command(name = "mbnet-gateway", about = "MQTT to Modbus RTU gateway, broker half")]
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
    let mut settings: GatewaySettings = match &args.config {
        Some(path) => config::load(path)?,
        None => GatewaySettings::default(),
    };
    settings.mqtt.apply_env();

    info!(
        broker = %settings.mqtt.host,
        port = settings.mqtt.port,
        "Starting gateway v{}",
        mbnet_gateway::VERSION
    );

    let mut options = MqttOptions::new("mbnet-gateway", &settings.mqtt.host, settings.mqtt.port);
    options.set_keep_alive(Duration::from_secs(settings.mqtt.keep_alive_secs));
    if !settings.mqtt.username.is_empty() {
        options.set_credentials(&settings.mqtt.username, &settings.mqtt.password);
    }

    let (client, mut eventloop) = AsyncClient::new(options, 64);

    // Requests from every client, replies from every field agent
    for filter in ["+/+/request", "+/+/mbnet"] {
        client
            .subscribe(filter, QoS::ExactlyOnce)
            .await
            .map_err(|e| GatewayError::connection(format!("MQTT subscribe failed: {}", e)))?;
    }

    let link = Arc::new(MqttLink::new(client));
    let gateway = Gateway::new(link, settings.queue.into());

    info!("Gateway online");

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                gateway.on_message(&publish.topic, &publish.payload).await;
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "MQTT connection error, reconnecting");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
