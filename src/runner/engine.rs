use anyhow::Result;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::events::{EventEmitter, RunEvent};
use super::narrative;
use super::state::StateStore;
use crate::driver::{ActionDriver, AutomationError};
use crate::parser::{Command, ParseOptions, ScriptParser, Step, DEFAULT_FEATURE};
use crate::report::{ReportSink, RunReport, StepRecord, StepStatus};
use crate::sniffer::LogSniffer;
use crate::utils::config::RunConfig;

/// Drives one scenario run end-to-end: consumes the step stream, resolves
/// variables, dispatches to the action driver and applies the soft/hard
/// failure policy.
pub struct ExecutionEngine {
    driver: ActionDriver,
    state: StateStore,
    report: ReportSink,
    sniffer: Option<LogSniffer>,
    emitter: EventEmitter,
    parser: ScriptParser,
    config: RunConfig,
    output_dir: PathBuf,
    /// Anchor for relative include paths inside conditional bodies
    scenario_dir: PathBuf,
    step_count: usize,
    current_screen: String,
    abort: Arc<AtomicBool>,
}

impl ExecutionEngine {
    pub fn new(
        driver: ActionDriver,
        config: RunConfig,
        scenario_name: &str,
        output_dir: &Path,
        emitter: EventEmitter,
        sniffer: Option<LogSniffer>,
        abort: Arc<AtomicBool>,
    ) -> Self {
        let _ = std::fs::create_dir_all(output_dir.join("screenshots"));

        Self {
            driver,
            state: StateStore::new(),
            report: ReportSink::new(scenario_name, DEFAULT_FEATURE),
            sniffer,
            emitter,
            parser: ScriptParser::new(ParseOptions {
                strict: config.strict,
            }),
            config,
            output_dir: output_dir.to_path_buf(),
            scenario_dir: PathBuf::from("."),
            step_count: 0,
            current_screen: "Start".to_string(),
            abort,
        }
    }

    /// Execute a scenario file. Steps run strictly in parsed order; a hard
    /// assertion failure aborts with an error after being recorded.
    pub async fn run(&mut self, scenario: &Path) -> Result<()> {
        self.scenario_dir = scenario
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let stream = self.parser.parse_file(scenario, DEFAULT_FEATURE)?;

        for item in stream {
            let step = item?;
            if self.abort.load(Ordering::SeqCst) {
                anyhow::bail!("Run aborted by signal");
            }
            self.execute_step(step).await?;
        }

        Ok(())
    }

    /// Restore the device session and assemble the final report. Runs even
    /// after an aborted scenario.
    pub async fn shutdown(self) -> RunReport {
        if let Some(sniffer) = self.sniffer {
            sniffer.stop().await;
        }

        if let Err(e) = self.driver.end_session().await {
            log::warn!("failed to restore device input method: {}", e);
        }

        self.report.finish(self.state.path().to_vec())
    }

    /// Boxed for the indirect recursion through conditional bodies
    fn execute_step(&mut self, step: Step) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            match step {
                Step::Feature { name } => {
                    self.report.set_feature(&name);
                    self.emitter.emit(RunEvent::FeatureEntered { name });
                    Ok(())
                }

                Step::Conditional { condition, body } => {
                    self.execute_conditional(&condition, body).await
                }

                Step::Action { command, args, .. } => self.execute_action(command, &args).await,
            }
        })
    }

    /// Advisory branching: a bounded existence check decides whether the
    /// body runs. No failure is recorded either way.
    async fn execute_conditional(&mut self, condition: &str, body: Vec<String>) -> Result<()> {
        let target = self.state.resolve_text(condition);
        self.emitter.emit(RunEvent::Log {
            message: format!("Mengecek kondisi: '{}'...", target),
        });

        let visible = self
            .driver
            .exists_within(&target, self.config.condition_timeout_ms)
            .await;

        if !visible {
            self.emitter.emit(RunEvent::Log {
                message: format!("Kondisi '{}' tidak muncul, blok dilewati.", target),
            });
            return Ok(());
        }

        let feature = self.report.current_feature().to_string();
        let stream = self
            .parser
            .parse_lines(body, self.scenario_dir.clone(), &feature);

        for item in stream {
            let step = item?;
            self.execute_step(step).await?;
        }

        Ok(())
    }

    async fn execute_action(&mut self, command: Command, args: &[String]) -> Result<()> {
        self.step_count += 1;
        let index = self.step_count;

        // Placeholders resolve against a fresh copy; step args stay pristine
        let resolved: Vec<String> = args.iter().map(|a| self.state.resolve_text(a)).collect();
        let target = resolved.first().cloned().unwrap_or_default();
        let narrative = narrative::generate(command, &target);

        self.emitter.emit(RunEvent::StepStarted {
            index,
            narrative: narrative.clone(),
        });

        let started = Instant::now();
        let feature = self.report.current_feature().to_string();
        self.settle(self.config.pre_action_delay_ms).await;

        match self.dispatch(command, &resolved).await {
            Ok(()) => {
                self.settle(self.config.settle_delay_ms).await;

                let after = self.driver.current_screen().await;
                let screenshot = self
                    .capture_screenshot(&format!("step_{}.png", index))
                    .await;
                let log_entries = self.drain_logs();

                self.report.push(StepRecord {
                    index,
                    feature,
                    narrative,
                    status: StepStatus::Passed,
                    before_screen: StateStore::simple_name(&self.current_screen).to_string(),
                    after_screen: StateStore::simple_name(&after).to_string(),
                    screenshot,
                    log_entries,
                });

                self.state.update_activity(&after);
                self.current_screen = after;

                self.emitter.emit(RunEvent::StepPassed {
                    index,
                    duration_ms: started.elapsed().as_millis() as u64,
                });

                Ok(())
            }

            Err(e) => {
                let fatal = e
                    .downcast_ref::<AutomationError>()
                    .map(AutomationError::is_fatal)
                    .unwrap_or(false);

                let screenshot = self
                    .capture_screenshot(&format!("error_step_{}.png", index))
                    .await;
                let log_entries = self.drain_logs();

                self.report.push(StepRecord {
                    index,
                    feature,
                    narrative: format!("[GAGAL] {}", narrative),
                    status: if fatal {
                        StepStatus::HardFailed
                    } else {
                        StepStatus::SoftFailed
                    },
                    before_screen: StateStore::simple_name(&self.current_screen).to_string(),
                    after_screen: StateStore::simple_name(&self.current_screen).to_string(),
                    screenshot,
                    log_entries,
                });

                self.emitter.emit(RunEvent::StepFailed {
                    index,
                    error: e.to_string(),
                    fatal,
                    duration_ms: started.elapsed().as_millis() as u64,
                });

                if fatal {
                    Err(e)
                } else {
                    log::warn!("{} step {} failed (soft): {}", command.name(), index, e);
                    Ok(())
                }
            }
        }
    }

    async fn dispatch(&mut self, command: Command, args: &[String]) -> Result<()> {
        match command {
            Command::OpenApp => self.driver.open_app(&args[0]).await,
            Command::InputText => self.driver.input_text(&args[0], &args[1]).await,
            Command::Tap => self.driver.tap(&args[0]).await,
            Command::WaitFor => {
                self.driver
                    .wait_for(&args[0], self.config.wait_timeout_ms)
                    .await
            }
            Command::AssertSoft => self.driver.assert_visible(&args[0], false).await,
            Command::AssertHard => self.driver.assert_visible(&args[0], true).await,
            Command::Scroll => self.driver.scroll(&args[0]).await,
            Command::SaveText => {
                let text = self.driver.read_text(&args[0]).await?;
                self.emitter.emit(RunEvent::Log {
                    message: format!("Menyimpan '{}' ke variabel '{}'", text, args[1]),
                });
                self.state.set_variable(&args[1], &text);
                Ok(())
            }
            Command::PressKey => self.driver.press_key(&args[0]).await,
        }
    }

    /// Screenshot into the run's screenshots directory, returning the
    /// report-relative path. Capture failures degrade to a log entry.
    async fn capture_screenshot(&self, filename: &str) -> Option<String> {
        let relative = format!("screenshots/{}", filename);
        let absolute = self.output_dir.join(&relative);

        match self
            .driver
            .screenshot(absolute.to_string_lossy().as_ref())
            .await
        {
            Ok(()) => Some(relative),
            Err(e) => {
                log::warn!("screenshot failed: {}", e);
                None
            }
        }
    }

    fn drain_logs(&mut self) -> Vec<crate::sniffer::NetworkEntry> {
        self.sniffer
            .as_mut()
            .map(|s| s.recent_entries())
            .unwrap_or_default()
    }

    async fn settle(&self, ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::uiautomator::{Bounds, UiElement};
    use crate::driver::DeviceAutomation;
    use async_trait::async_trait;

    struct FakeDevice {
        elements: Vec<UiElement>,
    }

    impl FakeDevice {
        fn with_texts(texts: &[&str]) -> Self {
            let elements = texts
                .iter()
                .enumerate()
                .map(|(i, text)| UiElement {
                    class: "android.widget.Button".to_string(),
                    text: text.to_string(),
                    resource_id: String::new(),
                    content_desc: String::new(),
                    bounds: Bounds {
                        left: 0,
                        top: (i as i32) * 50,
                        right: 100,
                        bottom: (i as i32) * 50 + 40,
                    },
                    clickable: true,
                    enabled: true,
                })
                .collect();
            Self { elements }
        }
    }

    #[async_trait]
    impl DeviceAutomation for FakeDevice {
        fn serial(&self) -> Option<String> {
            None
        }
        fn screen_size(&self) -> (u32, u32) {
            (1080, 1920)
        }
        async fn ui_snapshot(&self) -> Result<Vec<UiElement>> {
            Ok(self.elements.clone())
        }
        async fn tap(&self, _: i32, _: i32) -> Result<()> {
            Ok(())
        }
        async fn type_text(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn swipe(&self, _: i32, _: i32, _: i32, _: i32, _: u64) -> Result<()> {
            Ok(())
        }
        async fn key_event(&self, _: u32) -> Result<()> {
            Ok(())
        }
        async fn launch_app(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn screenshot(&self, _: &str) -> Result<()> {
            // Nothing written; capture degrades to None via the error path
            anyhow::bail!("no screen in tests")
        }
        async fn current_screen_id(&self) -> Result<String> {
            Ok("com.fake.ui.MainActivity".to_string())
        }
        async fn set_ime_suppressed(&self, _: bool) -> Result<()> {
            Ok(())
        }
    }

    fn test_config() -> RunConfig {
        RunConfig {
            pre_action_delay_ms: 0,
            settle_delay_ms: 0,
            condition_timeout_ms: 20,
            wait_timeout_ms: 50,
            poll_interval_ms: 5,
            scroll_settle_ms: 0,
            type_settle_ms: 0,
            ..RunConfig::default()
        }
    }

    fn engine_for(device: FakeDevice) -> ExecutionEngine {
        let driver = ActionDriver::new(Box::new(device), test_config());
        let out = std::env::temp_dir().join(format!("sigap_engine_test_{}", uuid::Uuid::new_v4()));
        ExecutionEngine::new(
            driver,
            test_config(),
            "test",
            &out,
            EventEmitter::default(),
            None,
            Arc::new(AtomicBool::new(false)),
        )
    }

    async fn run_script(device: FakeDevice, script: &str) -> (Result<()>, RunReport) {
        let path = std::env::temp_dir().join(format!("sigap_scenario_{}.sigap", uuid::Uuid::new_v4()));
        std::fs::write(&path, script).unwrap();

        let mut engine = engine_for(device);
        let result = engine.run(&path).await;
        let report = engine.shutdown().await;

        std::fs::remove_file(&path).ok();
        (result, report)
    }

    #[tokio::test]
    async fn test_soft_failure_continues() {
        let script = "Pastikan muncul teks \"Hilang\"\nKetuk tombol \"OK\"\n";
        let (result, report) = run_script(FakeDevice::with_texts(&["OK"]), script).await;

        assert!(result.is_ok());
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].status, StepStatus::SoftFailed);
        assert!(report.records[0].narrative.starts_with("[GAGAL]"));
        assert_eq!(report.records[1].status, StepStatus::Passed);
        assert!(!report.summary.fatal);
    }

    #[tokio::test]
    async fn test_hard_failure_aborts() {
        let script = "HARUS muncul teks \"Hilang\"\nKetuk tombol \"OK\"\n";
        let (result, report) = run_script(FakeDevice::with_texts(&["OK"]), script).await;

        assert!(result.is_err());
        // No record for the step after the fatal one
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].status, StepStatus::HardFailed);
        assert!(report.summary.fatal);
    }

    #[tokio::test]
    async fn test_conditional_branching() {
        let script = concat!(
            "JIKA MUNCUL TEKS \"OK\"\n",
            "Ketuk tombol \"OK\"\n",
            "AKHIR JIKA\n",
            "JIKA MUNCUL TEKS \"Hilang\"\n",
            "Ketuk tombol \"Hilang\"\n",
            "AKHIR JIKA\n",
        );
        let (result, report) = run_script(FakeDevice::with_texts(&["OK"]), script).await;

        assert!(result.is_ok());
        // Only the visible branch executed; the absent one was skipped quietly
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].status, StepStatus::Passed);
    }

    #[tokio::test]
    async fn test_saved_variable_resolves_in_later_step() {
        let script = "SIMPAN teks dari \"Saldo: 5000\" KE \"Saldo\"\nPastikan muncul teks \"{Saldo}\"\n";
        let (result, report) = run_script(FakeDevice::with_texts(&["Saldo: 5000"]), script).await;

        assert!(result.is_ok());
        assert_eq!(report.records.len(), 2);
        // read_text captured the full element text; the assertion re-found it
        assert_eq!(report.records[1].status, StepStatus::Passed);
        assert!(report.records[1].narrative.contains("Saldo: 5000"));
    }

    #[tokio::test]
    async fn test_feature_marker_groups_records() {
        let script = "# FITUR: Login\nKetuk tombol \"OK\"\n";
        let (result, report) = run_script(FakeDevice::with_texts(&["OK"]), script).await;

        assert!(result.is_ok());
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].feature, "Login");
    }

    #[tokio::test]
    async fn test_screens_recorded_simplified() {
        let script = "Ketuk tombol \"OK\"\n";
        let (_, report) = run_script(FakeDevice::with_texts(&["OK"]), script).await;

        assert_eq!(report.records[0].before_screen, "Start");
        assert_eq!(report.records[0].after_screen, "MainActivity");
        assert_eq!(report.summary.activity_path, vec!["MainActivity"]);
    }
}
