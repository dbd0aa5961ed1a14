use anyhow::Result;
use evse_controller::config::Config;
use evse_controller::driver::{DriverCommand, EvseDriver};
use evse_controller::hardware::{SimulatedHardware, SystemClock};
use evse_controller::meter::SimulatedMeter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    config.validate()?;
    evse_controller::logging::init_logging(&config.logging)?;

    info!(
        "EVSE controller {} ({}) starting up",
        env!("EVSE_BUILD_VERSION"),
        env!("EVSE_BUILD_PROFILE")
    );

    // Create driver command channel
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<DriverCommand>();

    let (hardware, sim) = SimulatedHardware::new(config.pilot.adc_to_voltage);
    let meter = SimulatedMeter::from_config(&config.meter);
    let mut driver = EvseDriver::new(
        config.clone(),
        Box::new(hardware),
        Box::new(meter),
        Arc::new(SystemClock::new()),
        cmd_rx,
    )
    .with_simulator(sim);

    #[cfg(feature = "web")]
    let web_task = {
        let state = evse_controller::web::AppState {
            commands: cmd_tx.clone(),
            status: driver.subscribe_snapshot(),
            config: Arc::new(config.clone()),
        };
        let (host, port) = (config.web.host.clone(), config.web.port);
        tokio::spawn(async move {
            if let Err(e) = evse_controller::web::serve(state, &host, port).await {
                error!("Web server error: {}", e);
            }
        })
    };

    let shutdown_tx = cmd_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            let _ = shutdown_tx.send(DriverCommand::Shutdown);
        }
    });

    let outcome = driver.run().await;

    #[cfg(feature = "web")]
    web_task.abort();

    match outcome {
        Ok(()) => {
            info!("Driver shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Driver failed with error: {}", e);
            Err(anyhow::anyhow!("Driver error: {}", e))
        }
    }
}
