use anyhow::Result;
use async_trait::async_trait;
use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::adb;
use super::uiautomator::{self, UiElement};

/// Device-automation capability consumed by the action layer.
///
/// The production implementation drives a device over ADB; tests substitute a
/// scripted fake so the lookup and typing strategies can be exercised without
/// hardware.
#[async_trait]
pub trait DeviceAutomation: Send + Sync {
    fn serial(&self) -> Option<String>;

    /// Cached screen dimensions (width, height) in pixels
    fn screen_size(&self) -> (u32, u32);

    /// Dump and parse the current UI hierarchy
    async fn ui_snapshot(&self) -> Result<Vec<UiElement>>;

    /// Tap at absolute coordinates
    async fn tap(&self, x: i32, y: i32) -> Result<()>;

    /// Type raw text into whatever currently holds focus
    async fn type_text(&self, raw: &str) -> Result<()>;

    /// Swipe gesture between two points
    async fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64) -> Result<()>;

    /// Send a key event by Android keycode
    async fn key_event(&self, keycode: u32) -> Result<()>;

    /// Launch an application by package id
    async fn launch_app(&self, package: &str) -> Result<()>;

    /// Capture the screen to a local PNG file
    async fn screenshot(&self, path: &str) -> Result<()>;

    /// Identifier of the foreground screen (activity component)
    async fn current_screen_id(&self) -> Result<String>;

    /// Enable or disable on-screen-keyboard suppression. Must be idempotent.
    async fn set_ime_suppressed(&self, suppressed: bool) -> Result<()>;
}

/// Non-rendering IME used to keep the soft keyboard from covering the screen
const NULL_IME: &str = "com.android.adbkeyboard/.AdbIME";

/// ADB-backed implementation of [`DeviceAutomation`]
pub struct AdbDevice {
    serial: Option<String>,
    screen_size: (u32, u32),
    /// IME active before the session, restored on teardown
    original_ime: String,
    null_ime_available: bool,
    suppressed: AtomicBool,
}

impl AdbDevice {
    /// Connect to a device. With no serial given, exactly one device must be
    /// attached.
    pub async fn new(serial: Option<&str>) -> Result<Self> {
        let selected_serial = if let Some(s) = serial {
            Some(s.to_string())
        } else {
            let devices = adb::get_devices().await?;
            if devices.len() == 1 {
                Some(devices[0].serial.clone())
            } else if devices.is_empty() {
                anyhow::bail!("No Android devices connected");
            } else {
                anyhow::bail!("Multiple devices connected. Please specify one with --device");
            }
        };

        let screen_size = adb::get_screen_size(selected_serial.as_deref()).await?;

        let original_ime = adb::shell(
            selected_serial.as_deref(),
            "settings get secure default_input_method",
        )
        .await
        .unwrap_or_default()
        .trim()
        .to_string();

        let ime_list = adb::shell(selected_serial.as_deref(), "ime list -s")
            .await
            .unwrap_or_default();
        let null_ime_available = ime_list.contains("com.android.adbkeyboard");

        if !null_ime_available {
            println!(
                "  {} ADBKeyBoard not installed; keyboard suppression disabled",
                "⚠".yellow()
            );
        }

        Ok(Self {
            serial: selected_serial,
            screen_size,
            original_ime,
            null_ime_available,
            suppressed: AtomicBool::new(false),
        })
    }

    /// Run an `input` subcommand, preferring the display-targeted form.
    /// Older builds reject `-d` with an injection error; retry the plain form
    /// at the same coordinates so gestures survive on those devices.
    async fn input_cmd(&self, subcmd: &str) -> Result<()> {
        let targeted = format!("input -d 0 {}", subcmd);
        match adb::shell(self.serial.as_deref(), &targeted).await {
            Ok(_) => Ok(()),
            Err(e) => {
                log::debug!("display-targeted input rejected ({}), retrying plain form", e);
                adb::shell(self.serial.as_deref(), &format!("input {}", subcmd)).await?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl DeviceAutomation for AdbDevice {
    fn serial(&self) -> Option<String> {
        self.serial.clone()
    }

    fn screen_size(&self) -> (u32, u32) {
        self.screen_size
    }

    async fn ui_snapshot(&self) -> Result<Vec<UiElement>> {
        // exec-out avoids file round-trips on device; fall back to the
        // file-based dump for older Android versions
        let xml = match adb::shell(self.serial.as_deref(), "uiautomator dump /dev/stdout").await {
            Ok(output) if output.contains("<?xml") => output,
            _ => {
                adb::shell(
                    self.serial.as_deref(),
                    "uiautomator dump /sdcard/window_dump.xml > /dev/null && cat /sdcard/window_dump.xml",
                )
                .await?
            }
        };

        uiautomator::parse_hierarchy(&xml)
    }

    async fn tap(&self, x: i32, y: i32) -> Result<()> {
        self.input_cmd(&format!("tap {} {}", x, y)).await
    }

    async fn type_text(&self, raw: &str) -> Result<()> {
        // `input text` takes %s for spaces and needs shell metacharacters escaped
        let escaped = raw
            .replace('\\', "\\\\")
            .replace(' ', "%s")
            .replace('"', "\\\"")
            .replace('\'', "\\'")
            .replace('&', "\\&")
            .replace('<', "\\<")
            .replace('>', "\\>")
            .replace('|', "\\|")
            .replace(';', "\\;");

        self.input_cmd(&format!("text '{}'", escaped)).await
    }

    async fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64) -> Result<()> {
        self.input_cmd(&format!("swipe {} {} {} {} {}", x1, y1, x2, y2, duration_ms))
            .await
    }

    async fn key_event(&self, keycode: u32) -> Result<()> {
        self.input_cmd(&format!("keyevent {}", keycode)).await
    }

    async fn launch_app(&self, package: &str) -> Result<()> {
        // Resolve the launcher activity; fall back to monkey when resolution fails
        let resolve_cmd = format!(
            "cmd package resolve-activity --brief {} | tail -n 1",
            package
        );
        let activity_output = adb::shell(self.serial.as_deref(), &resolve_cmd)
            .await
            .unwrap_or_default();
        let activity = activity_output.trim();

        if activity.contains('/') {
            adb::shell(self.serial.as_deref(), &format!("am start -n {}", activity)).await?;
        } else {
            println!(
                "  {} Could not resolve activity for {}, falling back to monkey",
                "⚠".yellow(),
                package
            );
            adb::shell(
                self.serial.as_deref(),
                &format!("monkey -p {} -c android.intent.category.LAUNCHER 1", package),
            )
            .await?;
        }

        // Poll for focus instead of a fixed sleep
        let start = Instant::now();
        let timeout = Duration::from_secs(10);

        while start.elapsed() < timeout {
            let output = adb::shell(
                self.serial.as_deref(),
                "dumpsys activity activities | grep ResumedActivity",
            )
            .await
            .unwrap_or_default();
            if output.contains(package) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        println!(
            "  {} App {} did not reach foreground within 10s",
            "⚠".yellow(),
            package
        );
        Ok(())
    }

    async fn screenshot(&self, path: &str) -> Result<()> {
        let remote_path = "/sdcard/sigap_screen.png";

        adb::shell(
            self.serial.as_deref(),
            &format!("screencap -p {}", remote_path),
        )
        .await?;
        adb::pull(self.serial.as_deref(), remote_path, path).await?;
        adb::shell(self.serial.as_deref(), &format!("rm {}", remote_path)).await?;

        Ok(())
    }

    async fn current_screen_id(&self) -> Result<String> {
        let output = adb::shell(
            self.serial.as_deref(),
            "dumpsys activity activities | grep ResumedActivity",
        )
        .await?;

        // Line shape: "mResumedActivity: ActivityRecord{... com.app/.ui.HomeActivity t42}"
        let component = output
            .split_whitespace()
            .find(|token| token.contains('/'))
            .ok_or_else(|| anyhow::anyhow!("No resumed activity in dumpsys output"))?;

        let activity = component
            .splitn(2, '/')
            .nth(1)
            .unwrap_or(component)
            .trim_end_matches('}');

        Ok(activity.to_string())
    }

    async fn set_ime_suppressed(&self, suppressed: bool) -> Result<()> {
        if self.suppressed.load(Ordering::SeqCst) == suppressed {
            return Ok(());
        }

        if suppressed {
            if !self.null_ime_available {
                return Ok(());
            }
            adb::shell(self.serial.as_deref(), &format!("ime set {}", NULL_IME)).await?;
        } else if !self.original_ime.is_empty() && self.original_ime != "null" {
            adb::shell(
                self.serial.as_deref(),
                &format!("ime set {}", self.original_ime),
            )
            .await?;
        }

        self.suppressed.store(suppressed, Ordering::SeqCst);
        Ok(())
    }
}
