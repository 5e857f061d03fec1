//! Runs the Weixin pedometer peripheral against the simulated adapter,
//! optionally feeding fake steps and playing a central that exercises
//! every characteristic.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;

use weixin_ble::ble::command::DeviceAddress;
use weixin_ble::ble::simulated::SimAdapter;
use weixin_ble::weixin::{WX_CH_PEDOMETER_UUID, WX_CH_READ_UUID, WX_CH_TARGET_UUID};
use weixin_ble::{Peripheral, PeripheralConfig, PeripheralState};

#[derive(Parser, Debug)]
#[command(name = "weixin_pedometer", about = "Weixin pedometer BLE peripheral")]
struct Cli {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Advertised device name
    #[arg(long)]
    name: Option<String>,

    /// Initial step count
    #[arg(long)]
    steps: Option<u32>,

    /// Initial step target
    #[arg(long)]
    target: Option<u32>,

    /// Address reported by the simulated controller
    #[arg(long, default_value = "C0:FF:EE:00:00:01")]
    address: DeviceAddress,

    /// Add one step every N milliseconds
    #[arg(long)]
    step_interval_ms: Option<u64>,

    /// Connect a simulated central and exercise the characteristics
    #[arg(long)]
    demo_central: bool,
}

async fn run_demo_central(adapter: &Arc<SimAdapter>) -> anyhow::Result<()> {
    let central = adapter.connect_central();

    for (name, uuid) in [
        ("pedometer", WX_CH_PEDOMETER_UUID),
        ("target", WX_CH_TARGET_UUID),
        ("read", WX_CH_READ_UUID),
    ] {
        let value = adapter
            .read(central, uuid, 0)
            .await
            .map_err(|status| anyhow!("read {} failed with status {}", name, status))?;
        println!("[central] {} = {}", name, hex::encode(&value));
    }

    let status = adapter.write(central, WX_CH_TARGET_UUID, &12000u32.to_le_bytes()).await;
    println!("[central] write target 12000 -> status {}", status);

    let mut notifications = adapter
        .subscribe(central, WX_CH_PEDOMETER_UUID)
        .await
        .map_err(|status| anyhow!("subscribe failed with status {}", status))?;
    if let Ok(Some(n)) = tokio::time::timeout(Duration::from_secs(1), notifications.recv()).await {
        println!("[central] indication {} = {}", n.characteristic, hex::encode(&n.value));
    }

    adapter.disconnect_central(central);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PeripheralConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PeripheralConfig::default(),
    };
    if let Some(name) = cli.name {
        config.device_name = name;
    }
    if let Some(steps) = cli.steps {
        config.initial_steps = steps;
    }
    if let Some(target) = cli.target {
        config.initial_target = target;
    }

    let adapter = SimAdapter::new(cli.address);
    let peripheral = Peripheral::new(config, adapter.clone());
    let event_loop = peripheral.start().await.context("Failed to open device")?;

    let mut state = peripheral.subscribe_state();
    adapter.power_on();
    state
        .wait_for(|s| *s == PeripheralState::Advertising)
        .await
        .context("Peripheral stopped before advertising")?;

    if let Some(ms) = cli.step_interval_ms {
        let ctx = Arc::clone(peripheral.context());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(ms.max(1)));
            loop {
                ticker.tick().await;
                let steps = ctx.pedometer.add_steps(1);
                log::debug!("Steps: {}", steps);
            }
        });
    }

    if cli.demo_central {
        run_demo_central(&adapter).await?;
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => log::info!("Shutting down"),
        _ = event_loop => log::warn!("Event loop ended"),
    }
    peripheral.stop();
    Ok(())
}
