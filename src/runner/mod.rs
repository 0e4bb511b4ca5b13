pub mod engine;
pub mod events;
pub mod narrative;
pub mod state;

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::driver::{ActionDriver, AdbDevice, DeviceAutomation};
use crate::report::{json, RunSummary};
use crate::sniffer::LogSniffer;
use crate::utils::config::RunConfig;
use engine::ExecutionEngine;
use events::{ConsoleEventListener, EventEmitter, RunEvent};

/// Run one scenario file end-to-end against a device.
///
/// Teardown (input-method restore, sniffer shutdown, report flush) is
/// guaranteed: the run result is captured, never short-circuited past the
/// cleanup path.
pub async fn run_scenario(
    scenario: &Path,
    device_serial: Option<&str>,
    output: &Path,
    config: RunConfig,
) -> Result<RunSummary> {
    let scenario_name = scenario
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("scenario")
        .to_string();

    let output_dir = output.join(&scenario_name);
    std::fs::create_dir_all(output_dir.join("screenshots"))
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let (emitter, receiver) = EventEmitter::new();
    tokio::spawn(ConsoleEventListener::listen(receiver));

    emitter.emit(RunEvent::ScenarioStarted {
        name: scenario_name.clone(),
    });

    // Device session: keyboard suppression on, restored on shutdown
    let device = AdbDevice::new(device_serial).await?;
    let serial = device.serial();
    let driver = ActionDriver::new(Box::new(device), config.clone());
    if let Err(e) = driver.start_session().await {
        log::warn!("could not enable keyboard suppression: {}", e);
    }

    let sniffer = match LogSniffer::start(serial.as_deref()).await {
        Ok(sniffer) => Some(sniffer),
        Err(e) => {
            log::warn!("log sniffer unavailable: {}", e);
            None
        }
    };

    // Ctrl+C requests an orderly abort between steps, keeping teardown alive
    let abort = Arc::new(AtomicBool::new(false));
    {
        let abort = abort.clone();
        let _ = ctrlc::set_handler(move || {
            println!("\n{} Menghentikan skenario...", "⏹".yellow());
            abort.store(true, Ordering::SeqCst);
        });
    }

    let mut engine = ExecutionEngine::new(
        driver,
        config,
        &scenario_name,
        &output_dir,
        emitter.clone(),
        sniffer,
        abort,
    );

    let run_result = engine.run(scenario).await;
    let report = engine.shutdown().await;

    let report_path = output_dir.join("report.json");
    if let Err(e) = json::write(&report, &report_path) {
        log::warn!("could not write report: {}", e);
    } else {
        emitter.emit(RunEvent::Log {
            message: format!("Laporan tersimpan di {}", report_path.display()),
        });
    }

    let summary = report.summary.clone();
    emitter.emit(RunEvent::ScenarioFinished {
        summary: summary.clone(),
    });

    // Give the console listener a moment to flush the final lines
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    match run_result {
        Ok(()) => Ok(summary),
        // A hard assertion failure is already reflected in the summary;
        // anything else is an orchestration error worth surfacing
        Err(e) if summary.fatal => {
            log::error!("scenario aborted: {}", e);
            Ok(summary)
        }
        Err(e) => Err(e),
    }
}
