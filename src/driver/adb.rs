use crate::utils::binary_resolver;
use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::Command;

/// Represents a connected Android device
#[derive(Debug, Clone)]
pub struct Device {
    pub serial: String,
    pub state: String,
}

/// Get list of connected Android devices
pub async fn get_devices() -> Result<Vec<Device>> {
    let adb_path = binary_resolver::find_adb()?;
    let output = Command::new(adb_path)
        .args(["devices"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .context("Failed to execute adb devices")?;

    let stdout = String::from_utf8_lossy(&output.stdout);

    let mut devices = Vec::new();
    for line in stdout.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 2 {
            devices.push(Device {
                serial: parts[0].to_string(),
                state: parts[1].to_string(),
            });
        }
    }

    Ok(devices)
}

/// Execute an ADB shell command
pub async fn shell(serial: Option<&str>, cmd: &str) -> Result<String> {
    let mut args = Vec::new();

    if let Some(s) = serial {
        args.push("-s");
        args.push(s);
    }

    args.push("shell");
    args.push(cmd);

    let adb_path = binary_resolver::find_adb()?;
    let output = Command::new(adb_path)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("Failed to execute: adb shell {}", cmd))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ADB shell command failed: {}", stderr);
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Execute a raw ADB command
pub async fn exec(serial: Option<&str>, args: &[&str]) -> Result<String> {
    let mut full_args = Vec::new();

    if let Some(s) = serial {
        full_args.push("-s");
        full_args.push(s);
    }

    full_args.extend_from_slice(args);

    let adb_path = binary_resolver::find_adb()?;
    let output = Command::new(adb_path)
        .args(&full_args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("Failed to execute: adb {:?}", full_args))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ADB command failed: {}", stderr);
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Pull a file from device
pub async fn pull(serial: Option<&str>, remote: &str, local: &str) -> Result<()> {
    exec(serial, &["pull", remote, local])
        .await
        .with_context(|| format!("Failed to pull {} to {}", remote, local))?;
    Ok(())
}

/// Get screen resolution. Prefers the override size when a resize is active.
pub async fn get_screen_size(serial: Option<&str>) -> Result<(u32, u32)> {
    let output = shell(serial, "wm size").await?;

    // Parse "Physical size: 1080x1920" or "Override size: ..."
    let mut width: u32 = 1080;
    let mut height: u32 = 1920;

    for line in output.lines() {
        if line.contains("Override size:") || line.contains("Physical size:") {
            if let Some(size_str) = line.split(':').nth(1) {
                let parts: Vec<&str> = size_str.trim().split('x').collect();
                if parts.len() == 2 {
                    width = parts[0].trim().parse().unwrap_or(1080);
                    height = parts[1].trim().parse().unwrap_or(1920);
                    if line.contains("Override size:") {
                        break;
                    }
                }
            }
        }
    }

    Ok((width, height))
}
