//! Plinth controller daemon.
//!
//! Reads `PLINTH_ID` and `MGMT_NODE_IP` (and optionally a JSON file named by
//! `PLINTH_CONFIG`), claims GPIO or falls back to simulation, and runs until
//! Ctrl+C or SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! PLINTH_ID=2 MGMT_NODE_IP=192.168.10.1 plinth_controller
//! RUST_LOG=debug PLINTH_ID=1 plinth_controller
//! ```

use std::process::ExitCode;

use env_logger::Env;
use plinth_controller::{Config, DefaultController, PlinthController};

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("plinth-rt")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let mut controller = PlinthController::from_config(config, tokio::runtime::Handle::current());
        let result = run(&mut controller).await;
        controller.shutdown().await;
        match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("Fatal error: {:#}", e);
                ExitCode::FAILURE
            }
        }
    })
}

async fn run(controller: &mut DefaultController) -> anyhow::Result<()> {
    controller.start().await?;
    log::info!(
        "Plinth {} running; press Ctrl+C to stop",
        controller.config().device.id
    );
    wait_for_signal().await?;
    log::info!("Interrupted by user");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
