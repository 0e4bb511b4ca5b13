/// Commands the execution engine can dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    OpenApp,
    InputText,
    Tap,
    WaitFor,
    AssertSoft,
    AssertHard,
    Scroll,
    SaveText,
    PressKey,
}

impl Command {
    /// Stable identifier used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            Command::OpenApp => "open_app",
            Command::InputText => "input_text",
            Command::Tap => "tap",
            Command::WaitFor => "wait_for",
            Command::AssertSoft => "assert_soft",
            Command::AssertHard => "assert_hard",
            Command::Scroll => "scroll",
            Command::SaveText => "save_text",
            Command::PressKey => "press_key",
        }
    }
}

/// One structured unit of a scenario script.
///
/// Steps are transient: produced by the parser, consumed by the engine within
/// a single pass. Conditional bodies stay as raw lines and are re-parsed at
/// execution time, never pre-expanded.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Informational grouping label for subsequent steps
    Feature { name: String },

    /// A device action with positional quoted arguments
    Action {
        command: Command,
        args: Vec<String>,
        raw: String,
    },

    /// A `JIKA MUNCUL TEKS … AKHIR JIKA` block; `body` holds the verbatim
    /// inner lines
    Conditional { condition: String, body: Vec<String> },
}
