use tokio::sync::broadcast;

use crate::report::RunSummary;

/// Run lifecycle events for coordinated console output
#[derive(Debug, Clone)]
pub enum RunEvent {
    ScenarioStarted {
        name: String,
    },
    FeatureEntered {
        name: String,
    },
    StepStarted {
        index: usize,
        narrative: String,
    },
    StepPassed {
        index: usize,
        duration_ms: u64,
    },
    StepFailed {
        index: usize,
        error: String,
        fatal: bool,
        duration_ms: u64,
    },
    Log {
        message: String,
    },
    ScenarioFinished {
        summary: RunSummary,
    },
}

/// Broadcast emitter; events are dropped silently when nobody listens
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<RunEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<RunEvent>) {
        let (sender, receiver) = broadcast::channel(100);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }
}

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Console listener printing live step progress with a spinner
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<RunEvent>) {
        use std::io::IsTerminal;

        // Hidden draw target when piped, so logs stay free of escape codes
        let multi = if std::io::stdout().is_terminal() {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let mut spinner: Option<ProgressBar> = None;
        let mut step_text = String::new();

        while let Ok(event) = receiver.recv().await {
            match event {
                RunEvent::ScenarioStarted { name } => {
                    multi
                        .println(format!(
                            "\n{} Menjalankan skenario: {}",
                            "▶".green().bold(),
                            name.cyan()
                        ))
                        .ok();
                }

                RunEvent::FeatureEntered { name } => {
                    multi
                        .println(format!("\n--- [Fitur: {}] ---", name.white().bold()))
                        .ok();
                }

                RunEvent::StepStarted { index, narrative } => {
                    let pb = multi.add(ProgressBar::new_spinner());
                    let style = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("    {spinner} {msg}")
                        .unwrap();
                    pb.set_style(style);

                    let body = format!("[{}] {}", index, narrative.dimmed());
                    pb.set_message(body.clone());
                    pb.enable_steady_tick(Duration::from_millis(100));

                    spinner = Some(pb);
                    step_text = body;
                }

                RunEvent::StepPassed { duration_ms, .. } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    multi
                        .println(format!("    {} {} ({}ms)", "✓".green(), step_text, duration_ms))
                        .ok();
                }

                RunEvent::StepFailed {
                    error,
                    fatal,
                    duration_ms,
                    ..
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    let marker = if fatal {
                        "✗ FATAL".red().bold().to_string()
                    } else {
                        "✗".red().to_string()
                    };
                    multi
                        .println(format!("    {} {} ({}ms)", marker, step_text, duration_ms))
                        .ok();
                    multi.println(format!("      {}", error.red())).ok();
                }

                RunEvent::Log { message } => {
                    multi.println(format!("      {}", message)).ok();
                }

                RunEvent::ScenarioFinished { summary } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish();
                    }

                    println!("\n{} Skenario selesai", "■".blue().bold());
                    println!(
                        "  {} lulus, {} gagal dari {} langkah",
                        summary.passed.to_string().green(),
                        summary.failed.to_string().red(),
                        summary.total_steps
                    );
                    if summary.fatal {
                        println!("  {}", "Dihentikan oleh kegagalan fatal".red().bold());
                    }
                    if !summary.activity_path.is_empty() {
                        println!("  Alur layar: {}", summary.activity_path.join(" → "));
                    }
                    println!("  Durasi: {}ms", summary.duration_ms);
                }
            }
        }
    }
}
