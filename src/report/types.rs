use serde::{Deserialize, Serialize};

use crate::sniffer::NetworkEntry;

/// Outcome classification for one executed step
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    /// Recorded as failed, run continued
    SoftFailed,
    /// Recorded as failed, run aborted
    HardFailed,
}

/// Record pushed to report builders for each completed step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub index: usize,
    pub feature: String,
    pub narrative: String,
    pub status: StepStatus,
    pub before_screen: String,
    pub after_screen: String,
    pub screenshot: Option<String>,
    pub log_entries: Vec<NetworkEntry>,
}

/// Aggregate result of a scenario run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub scenario: String,
    pub total_steps: usize,
    pub passed: usize,
    pub failed: usize,
    /// A hard failure aborted the run early
    pub fatal: bool,
    pub duration_ms: u64,
    pub activity_path: Vec<String>,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        !self.fatal && self.failed == 0
    }
}

/// Full machine-readable run report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub session_id: String,
    pub scenario: String,
    pub records: Vec<StepRecord>,
    pub summary: RunSummary,
    pub generated_at: String,
}
