use anyhow::Result;
use powerocean::config::Config;
use powerocean::fields::Phase;
use powerocean::{Bridge, StateSnapshot};
use tokio_stream::StreamExt;
use tracing::{debug, error, info};

fn log_snapshot(snapshot: &StateSnapshot) {
    info!(
        version = snapshot.version,
        source = ?snapshot.source,
        mqtt = snapshot.mqtt_connected,
        fields = snapshot.len(),
        soc = ?snapshot.battery_soc(),
        pv_w = ?snapshot.pv_power(),
        grid_w = ?snapshot.grid_power(),
        load_w = ?snapshot.system_load_power(),
        "state updated"
    );
    for phase in Phase::all() {
        let reading = snapshot.phase(phase);
        debug!(?phase, ?reading, "phase");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path),
        None => Config::load(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    powerocean::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "PowerOcean {} starting for {}",
        env!("APP_VERSION"),
        config.credentials.device_sn
    );

    let mut bridge = Bridge::start(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Startup failed: {}", e))?;

    let mut updates = bridge.handle().subscribe_stream();
    loop {
        tokio::select! {
            update = updates.next() => match update {
                Some(snapshot) => log_snapshot(&snapshot),
                None => {
                    error!("Coordinator stopped unexpectedly");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                break;
            }
        }
    }

    if let Err(e) = bridge.stop().await {
        error!("Shutdown failed: {}", e);
        return Err(anyhow::anyhow!("Shutdown error: {}", e));
    }
    info!("Shutdown complete");
    Ok(())
}
