use thiserror::Error;

/// Failure taxonomy for device actions and assertions.
///
/// The execution engine downcasts to this type at the step boundary to decide
/// whether a failure is recoverable (record and continue) or fatal (record and
/// abort the scenario).
#[derive(Debug, Error)]
pub enum AutomationError {
    /// The lookup chain and scroll retries were exhausted without a match.
    #[error("element '{selector}' not found after {attempts} attempts")]
    ElementNotFound { selector: String, attempts: u32 },

    /// No input field could be resolved for a `Ketik ... pada kolom` label.
    #[error("input field for label '{label}' not found")]
    LabelNotFound { label: String },

    /// A `Pastikan muncul teks` verification found nothing.
    #[error("assertion failed: text '{text}' is not visible")]
    AssertionFailed { text: String },

    /// A `HARUS muncul teks` verification found nothing.
    #[error("critical assertion failed: text '{text}' is not visible")]
    CriticalAssertionFailed { text: String },
}

impl AutomationError {
    /// Fatal failures abort the remainder of the scenario.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AutomationError::CriticalAssertionFailed { .. })
    }
}
