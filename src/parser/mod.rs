pub mod script;
pub mod types;

pub use script::{ParseOptions, ScriptParser, StepStream, DEFAULT_FEATURE};
pub use types::{Command, Step};
