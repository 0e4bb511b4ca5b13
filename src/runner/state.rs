use regex::Regex;
use std::collections::HashMap;

/// Single source of truth for scenario variables and the history of visited
/// screens. Created once per run and never shared across runs.
#[derive(Debug, Default)]
pub struct StateStore {
    vars: HashMap<String, String>,
    activity_path: Vec<String>,
    last_activity: Option<String>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a variable, overwriting unconditionally. Braces are stripped
    /// from the name so scripts may write `KE "{Total}"` or `KE "Total"`.
    pub fn set_variable(&mut self, name: &str, value: &str) {
        let clean: String = name.chars().filter(|c| *c != '{' && *c != '}').collect();
        self.vars.insert(clean, value.to_string());
    }

    pub fn get_variable(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|s| s.as_str())
    }

    /// Replace every `{name}` placeholder with its stored value. Unknown
    /// placeholders are left verbatim; the input is never mutated.
    pub fn resolve_text(&self, text: &str) -> String {
        let placeholder = Regex::new(r"\{([A-Za-z0-9_]+)\}").unwrap();
        placeholder
            .replace_all(text, |caps: &regex::Captures| {
                match self.vars.get(&caps[1]) {
                    Some(value) => value.clone(),
                    None => caps[0].to_string(),
                }
            })
            .to_string()
    }

    /// Record a screen visit. Only the last dotted segment is kept, and only
    /// when the screen differs from the previous one. The path never rewinds.
    pub fn update_activity(&mut self, activity: &str) {
        if activity.is_empty() {
            return;
        }
        if self.last_activity.as_deref() == Some(activity) {
            return;
        }

        self.activity_path
            .push(Self::simple_name(activity).to_string());
        self.last_activity = Some(activity.to_string());
    }

    /// Visited screens in order
    pub fn path(&self) -> &[String] {
        &self.activity_path
    }

    /// Last segment of a dotted screen identifier
    pub fn simple_name(activity: &str) -> &str {
        activity.rsplit('.').next().unwrap_or(activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_round_trip() {
        let mut state = StateStore::new();
        state.set_variable("Total", "5000");
        assert_eq!(state.resolve_text("Harga {Total}"), "Harga 5000");
    }

    #[test]
    fn test_resolve_is_fixed_point_without_placeholders() {
        let state = StateStore::new();
        assert_eq!(state.resolve_text("Harga 5000"), "Harga 5000");
        assert_eq!(state.resolve_text(""), "");
    }

    #[test]
    fn test_unknown_placeholder_left_verbatim() {
        let state = StateStore::new();
        assert_eq!(state.resolve_text("Halo {Nama}"), "Halo {Nama}");
    }

    #[test]
    fn test_set_variable_strips_braces() {
        let mut state = StateStore::new();
        state.set_variable("{Total}", "5000");
        assert_eq!(state.get_variable("Total"), Some("5000"));
        assert_eq!(state.resolve_text("{Total}"), "5000");
    }

    #[test]
    fn test_variables_are_case_sensitive() {
        let mut state = StateStore::new();
        state.set_variable("total", "1");
        assert_eq!(state.get_variable("Total"), None);
    }

    #[test]
    fn test_activity_path_dedups_consecutive() {
        let mut state = StateStore::new();
        state.update_activity("com.app.ui.LoginActivity");
        state.update_activity("com.app.ui.LoginActivity");
        state.update_activity("com.app.ui.HomeActivity");
        state.update_activity("com.app.ui.LoginActivity");
        assert_eq!(
            state.path(),
            &["LoginActivity", "HomeActivity", "LoginActivity"]
        );
    }

    #[test]
    fn test_activity_empty_is_noop() {
        let mut state = StateStore::new();
        state.update_activity("");
        assert!(state.path().is_empty());
    }
}
