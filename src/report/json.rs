use anyhow::{Context, Result};
use std::path::Path;

use super::types::RunReport;

/// Write the run report as pretty-printed JSON
pub fn write(report: &RunReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}
