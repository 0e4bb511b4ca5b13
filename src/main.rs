use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use sigap::{driver, runner, RunConfig};

#[derive(Parser)]
#[command(name = "sigap")]
#[command(version = "0.1.0")]
#[command(about = "Keyword-driven Android UI automation runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file against a connected device
    Run {
        /// Path to the scenario file
        scenario: PathBuf,

        /// Device serial (required only with multiple devices attached)
        #[arg(short, long)]
        device: Option<String>,

        /// Output directory for reports and screenshots
        #[arg(short, long, default_value = "./reports")]
        output: PathBuf,

        /// Fail on malformed lines and missing includes instead of skipping
        #[arg(long, default_value = "false")]
        strict: bool,
    },

    /// List connected Android devices
    Devices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            device,
            output,
            strict,
        } => {
            println!(
                "{} Skenario: {}",
                "▶".green().bold(),
                scenario.display().to_string().cyan()
            );
            if let Some(ref serial) = device {
                println!("  Perangkat: {}", serial.cyan());
            }
            println!("  Output: {}", output.display().to_string().cyan());

            let config = RunConfig {
                strict,
                ..RunConfig::default()
            };

            let summary =
                runner::run_scenario(&scenario, device.as_deref(), &output, config).await?;

            // Exit code feeds automation pipelines
            if !summary.succeeded() {
                std::process::exit(1);
            }
        }

        Commands::Devices => {
            let devices = driver::adb::get_devices().await?;
            if devices.is_empty() {
                println!("{} Tidak ada perangkat terhubung", "ℹ".blue());
            }
            for device in devices {
                println!("  {} [{}]", device.serial.cyan(), device.state);
            }
        }
    }

    Ok(())
}
