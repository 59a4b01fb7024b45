//! OSC bridge for Polymod modules on an I2C bus.
//!
//! Polls the modules for changes, publishes them to the control panel and
//! forwards the panel's digital writes and resets to the bus.

use std::sync::Arc;

use anyhow::{Context, Result};
use polymod_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
use tracing::info;

use polymod_bridge_i2c::bus::BusHandle;
use polymod_bridge_i2c::config::{BusConfig, I2cBridgeConfig};
use polymod_bridge_i2c::endpoint::{Dispatcher, MessageSink, OscClient, OscServer};
use polymod_bridge_i2c::scheduler::PollScheduler;
use polymod_bridge_i2c::translator;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse_with_default("polymod.json5");

    let mut config = I2cBridgeConfig::load_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    if let Some(ip) = args.client_ip {
        config = config.with_client_ip(ip)?;
    }

    let mut runner = BridgeRunner::new_with_args("polymod-bridge-i2c", config, Some(&args))?;
    if !args.config.exists() {
        info!("No config file at {:?}, using defaults", args.config);
    }

    let config = runner.config().clone();
    let bus = BusHandle::new(open_bus(&config.bus)?);

    let client = Arc::new(OscClient::connect(config.osc.client_addr()?).await?);
    client.send(&translator::matrix_reset());

    let listen = config.osc.listen_addr()?;
    let server = OscServer::bind(listen)
        .await
        .with_context(|| format!("Failed to bind OSC listener on {}", listen))?;

    let dispatcher = Dispatcher::new(bus.clone(), client.clone());
    runner.spawn(server.serve(dispatcher));

    let scheduler = PollScheduler::new(bus, client, config.bus.poll_settings());
    runner.spawn(scheduler.run());

    runner.run().await?;
    Ok(())
}

#[cfg(target_os = "linux")]
fn open_bus(config: &BusConfig) -> Result<polymod_bridge_i2c::bus::I2cBus> {
    polymod_bridge_i2c::bus::I2cBus::open(&config.device)
        .with_context(|| format!("Failed to open I2C adapter {}", config.device))
}

#[cfg(not(target_os = "linux"))]
fn open_bus(config: &BusConfig) -> Result<polymod_bridge_i2c::bus::MockBus> {
    anyhow::bail!(
        "I2C adapter {} unavailable: bus access requires Linux",
        config.device
    )
}
