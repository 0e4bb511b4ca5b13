use anyhow::Result;
use std::path::PathBuf;

/// Locate the adb binary: explicit env override, SDK install locations, then
/// the system PATH.
pub fn find_adb() -> Result<PathBuf> {
    let name = if cfg!(windows) { "adb.exe" } else { "adb" };
    let mut checked = Vec::new();

    if let Ok(sdk) = std::env::var("ANDROID_HOME").or_else(|_| std::env::var("ANDROID_SDK_ROOT")) {
        let candidate = PathBuf::from(sdk).join("platform-tools").join(name);
        checked.push(candidate.display().to_string());
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let sdk_dirs = [
            home.join("Android").join("Sdk"),
            home.join("Library").join("Android").join("sdk"),
        ];
        for sdk in sdk_dirs {
            let candidate = sdk.join("platform-tools").join(name);
            checked.push(candidate.display().to_string());
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }

    if let Ok(path) = which::which(name) {
        return Ok(path);
    }

    Err(anyhow::anyhow!(
        "Could not find adb. Set ANDROID_HOME or add platform-tools to PATH. Checked:\n{}",
        checked.join("\n")
    ))
}
