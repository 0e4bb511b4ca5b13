pub mod json;
pub mod types;

use chrono::Local;
use std::time::Instant;
use uuid::Uuid;

pub use types::{RunReport, RunSummary, StepRecord, StepStatus};

/// Collects step records during a run and assembles the final report.
///
/// This is the reference reporting collaborator; richer builders (documents,
/// diagrams) consume the same records through [`RunReport`].
pub struct ReportSink {
    session_id: String,
    scenario: String,
    current_feature: String,
    records: Vec<StepRecord>,
    started: Instant,
}

impl ReportSink {
    pub fn new(scenario: &str, initial_feature: &str) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            scenario: scenario.to_string(),
            current_feature: initial_feature.to_string(),
            records: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Change the grouping label applied to subsequent records
    pub fn set_feature(&mut self, name: &str) {
        self.current_feature = name.to_string();
    }

    pub fn current_feature(&self) -> &str {
        &self.current_feature
    }

    pub fn push(&mut self, record: StepRecord) {
        self.records.push(record);
    }

    /// Consume the sink and produce the final report
    pub fn finish(self, activity_path: Vec<String>) -> RunReport {
        let passed = self
            .records
            .iter()
            .filter(|r| r.status == StepStatus::Passed)
            .count();
        let failed = self.records.len() - passed;
        let fatal = self
            .records
            .iter()
            .any(|r| r.status == StepStatus::HardFailed);

        let summary = RunSummary {
            scenario: self.scenario.clone(),
            total_steps: self.records.len(),
            passed,
            failed,
            fatal,
            duration_ms: self.started.elapsed().as_millis() as u64,
            activity_path,
        };

        RunReport {
            session_id: self.session_id,
            scenario: self.scenario,
            records: self.records,
            summary,
            generated_at: Local::now().to_rfc3339(),
        }
    }
}
