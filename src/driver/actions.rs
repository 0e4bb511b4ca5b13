use anyhow::Result;
use regex::Regex;
use std::time::{Duration, Instant};

use super::device::DeviceAutomation;
use super::errors::AutomationError;
use super::uiautomator::{self, UiElement, EDIT_TEXT_CLASS};
use crate::utils::config::RunConfig;

/// Android keycodes used by the action layer
mod keycode {
    pub const HOME: u32 = 3;
    pub const BACK: u32 = 4;
    pub const VOLUME_UP: u32 = 24;
    pub const VOLUME_DOWN: u32 = 25;
    pub const POWER: u32 = 26;
    pub const TAB: u32 = 61;
    pub const ENTER: u32 = 66;
    pub const DEL: u32 = 67;
    pub const MENU: u32 = 82;
    pub const ESCAPE: u32 = 111;
}

/// Selector aliases that resolve to the floating action control. These are
/// routinely unaddressable by id or text, so lookup is bypassed entirely.
const FAB_ALIASES: [&str; 3] = ["FAB", "FLOATING ACTION BUTTON", "TOMBOL TAMBAH"];

/// A resolved on-screen target: either a real hierarchy element or a virtual
/// coordinate point.
#[derive(Debug, Clone)]
pub enum Locatable {
    ByElement(UiElement),
    ByPoint { x: i32, y: i32 },
}

impl Locatable {
    /// Tap point for the target
    pub fn center(&self) -> (i32, i32) {
        match self {
            Locatable::ByElement(e) => e.bounds.center(),
            Locatable::ByPoint { x, y } => (*x, *y),
        }
    }

    /// The conventional FAB position: 85% width, 80% height
    pub fn fab_point(screen: (u32, u32)) -> Self {
        Locatable::ByPoint {
            x: (screen.0 as f64 * 0.85) as i32,
            y: (screen.1 as f64 * 0.80) as i32,
        }
    }
}

pub fn is_fab_alias(selector: &str) -> bool {
    let upper = selector.trim().to_uppercase();
    FAB_ALIASES.contains(&upper.as_str())
}

/// Lookup chain for one snapshot: exact id, exact text, text-contains,
/// description-contains — in that order.
pub(crate) fn match_chain<'a>(elements: &'a [UiElement], selector: &str) -> Option<&'a UiElement> {
    uiautomator::find_by_id(elements, selector)
        .or_else(|| uiautomator::find_by_text(elements, selector))
        .or_else(|| uiautomator::find_by_text_contains(elements, selector))
        .or_else(|| uiautomator::find_by_desc_contains(elements, selector))
}

/// Ordinal field labels ("urutan 2" / "entry 2") address the Nth standard
/// input widget directly. Script side is 1-based.
pub(crate) fn ordinal_field_index(label: &str) -> Option<usize> {
    let lower = label.to_lowercase();
    if !lower.contains("urutan") && !lower.contains("entry") {
        return None;
    }
    let digits = Regex::new(r"\d+").unwrap();
    let n: usize = digits.find(&lower)?.as_str().parse().ok()?;
    n.checked_sub(1)
}

/// Fault-tolerant action layer: resolves selectors to concrete targets and
/// performs primitive operations, hiding device flakiness behind retries and
/// fallback strategies.
pub struct ActionDriver {
    device: Box<dyn DeviceAutomation>,
    config: RunConfig,
}

impl ActionDriver {
    pub fn new(device: Box<dyn DeviceAutomation>, config: RunConfig) -> Self {
        Self { device, config }
    }

    /// Enable keyboard suppression for the session
    pub async fn start_session(&self) -> Result<()> {
        self.device.set_ime_suppressed(true).await
    }

    /// Restore the device's normal input method. Safe to call more than once
    /// and must run even when a scenario aborts.
    pub async fn end_session(&self) -> Result<()> {
        self.device.set_ime_suppressed(false).await
    }

    /// Locate a UI element, scrolling down between attempts when it is not
    /// visible. FAB aliases short-circuit to a coordinate target and never
    /// scroll.
    pub async fn find_element(&self, selector: &str) -> Result<Locatable> {
        if is_fab_alias(selector) {
            log::info!("target '{}' is the floating action control, using coordinates", selector);
            return Ok(Locatable::fab_point(self.device.screen_size()));
        }

        let attempts = self.config.search_attempts.max(1);
        for attempt in 1..=attempts {
            let elements = self.device.ui_snapshot().await?;
            if let Some(found) = match_chain(&elements, selector) {
                return Ok(Locatable::ByElement(found.clone()));
            }

            if attempt < attempts {
                log::info!(
                    "'{}' not visible, scrolling down ({}/{})",
                    selector,
                    attempt,
                    attempts - 1
                );
                self.scroll_down().await?;
            }
        }

        Err(AutomationError::ElementNotFound {
            selector: selector.to_string(),
            attempts,
        }
        .into())
    }

    /// Vertical scroll confined to the upper half of the screen, so the
    /// gesture cannot land on an open keyboard.
    pub async fn scroll_down(&self) -> Result<()> {
        let (w, h) = self.device.screen_size();
        let x = w as i32 / 2;
        self.device
            .swipe(x, h as i32 / 2, x, h as i32 / 5, 500)
            .await?;
        self.settle(self.config.scroll_settle_ms).await;
        Ok(())
    }

    async fn scroll_up(&self) -> Result<()> {
        let (w, h) = self.device.screen_size();
        let x = w as i32 / 2;
        self.device
            .swipe(x, h as i32 / 5, x, h as i32 / 2, 500)
            .await?;
        self.settle(self.config.scroll_settle_ms).await;
        Ok(())
    }

    /// Scroll toward a direction keyword, or until a text target is visible.
    pub async fn scroll(&self, target: &str) -> Result<()> {
        match target.trim().to_lowercase().as_str() {
            "bawah" | "down" => self.scroll_down().await,
            "atas" | "up" => self.scroll_up().await,
            _ => self.find_element(target).await.map(|_| ()),
        }
    }

    /// Type text into the field belonging to `label`.
    ///
    /// Resolution order: ordinal field index, then spatial search below/right
    /// of the located label, then any input field whose own text contains the
    /// label.
    pub async fn input_text(&self, text: &str, label: &str) -> Result<()> {
        // Clear any keyboard left over from a previous step
        let _ = self.device.key_event(keycode::ESCAPE).await;

        if let Some(index) = ordinal_field_index(label) {
            let elements = self.device.ui_snapshot().await?;
            if let Some(field) = uiautomator::find_nth_by_class(&elements, EDIT_TEXT_CLASS, index) {
                let point = field.bounds.center();
                return self.type_into(point, text).await;
            }
        }

        match self.find_element(label).await {
            Ok(Locatable::ByElement(anchor)) => {
                let elements = self.device.ui_snapshot().await?;
                // The label may itself be the editable control
                let point = uiautomator::find_field_near(&elements, &anchor.bounds)
                    .map(|field| field.bounds.center())
                    .unwrap_or_else(|| anchor.bounds.center());
                self.type_into(point, text).await
            }
            Ok(Locatable::ByPoint { x, y }) => self.type_into((x, y), text).await,
            Err(_) => {
                let elements = self.device.ui_snapshot().await?;
                match uiautomator::find_field_by_text(&elements, label) {
                    Some(field) => {
                        let point = field.bounds.center();
                        self.type_into(point, text).await
                    }
                    None => Err(AutomationError::LabelNotFound {
                        label: label.to_string(),
                    }
                    .into()),
                }
            }
        }
    }

    /// Focus the target, type through the shell input mechanism, then dismiss
    /// the keyboard deterministically so subsequent lookups are unobstructed.
    async fn type_into(&self, point: (i32, i32), text: &str) -> Result<()> {
        self.device.tap(point.0, point.1).await?;
        self.settle(self.config.type_settle_ms).await;

        self.device.type_text(text).await?;
        self.settle(self.config.type_settle_ms).await;

        self.device.key_event(keycode::ESCAPE).await?;
        // Status-bar band: consumes the tap without activating any control
        let (w, h) = self.device.screen_size();
        self.device.tap(w as i32 / 2, (h as i32 * 4) / 100).await?;

        Ok(())
    }

    /// Resolve and tap a selector at its bounding-box midpoint
    pub async fn tap(&self, selector: &str) -> Result<()> {
        let target = self.find_element(selector).await?;
        let (x, y) = target.center();
        self.device.tap(x, y).await
    }

    /// Read the text of an element, falling back to its description. Empty
    /// content is not an error; only an unresolvable selector is.
    pub async fn read_text(&self, selector: &str) -> Result<String> {
        match self.find_element(selector).await? {
            Locatable::ByElement(e) => {
                if !e.text.is_empty() {
                    Ok(e.text)
                } else {
                    Ok(e.content_desc)
                }
            }
            // Virtual coordinate targets carry no text
            Locatable::ByPoint { .. } => Ok(String::new()),
        }
    }

    /// Poll until the selector is visible, without scrolling. Used for the
    /// explicit wait action with its long timeout.
    pub async fn wait_for(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        if is_fab_alias(selector) {
            return Ok(());
        }

        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let mut interval = self.config.poll_interval_ms.max(10);
        const MAX_INTERVAL: u64 = 1000;
        let mut polls: u32 = 0;

        while start.elapsed() < timeout {
            polls += 1;
            let elements = self.device.ui_snapshot().await?;
            if match_chain(&elements, selector).is_some() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(interval)).await;
            interval = (interval * 3 / 2).min(MAX_INTERVAL);
        }

        Err(AutomationError::ElementNotFound {
            selector: selector.to_string(),
            attempts: polls,
        }
        .into())
    }

    /// Short bounded existence check for conditional branching. Advisory:
    /// never raises, device failures count as "not visible".
    pub async fn exists_within(&self, text: &str, timeout_ms: u64) -> bool {
        if is_fab_alias(text) {
            return true;
        }

        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let interval = self.config.poll_interval_ms.max(10);

        loop {
            match self.device.ui_snapshot().await {
                Ok(elements) => {
                    if match_chain(&elements, text).is_some() {
                        return true;
                    }
                }
                Err(e) => log::debug!("existence check snapshot failed: {}", e),
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(interval)).await;
        }
    }

    /// Verify a text is visible, classifying the failure as soft or critical
    pub async fn assert_visible(&self, text: &str, critical: bool) -> Result<()> {
        match self.find_element(text).await {
            Ok(_) => Ok(()),
            Err(_) if critical => Err(AutomationError::CriticalAssertionFailed {
                text: text.to_string(),
            }
            .into()),
            Err(_) => Err(AutomationError::AssertionFailed {
                text: text.to_string(),
            }
            .into()),
        }
    }

    /// Press a system key by name
    pub async fn press_key(&self, key: &str) -> Result<()> {
        let name = key.trim().to_lowercase();
        let code = match name.as_str() {
            "home" => keycode::HOME,
            "back" | "kembali" => keycode::BACK,
            "enter" | "done" => keycode::ENTER,
            "del" | "delete" | "backspace" => keycode::DEL,
            "tab" => keycode::TAB,
            "menu" => keycode::MENU,
            "power" => keycode::POWER,
            "volume_up" => keycode::VOLUME_UP,
            "volume_down" => keycode::VOLUME_DOWN,
            other => match other.parse::<u32>() {
                Ok(raw) => raw,
                Err(_) => anyhow::bail!("Unsupported system key: {}", key),
            },
        };

        self.device.key_event(code).await
    }

    pub async fn open_app(&self, package: &str) -> Result<()> {
        self.device.launch_app(package).await
    }

    pub async fn screenshot(&self, path: &str) -> Result<()> {
        self.device.screenshot(path).await
    }

    /// Foreground screen identifier, `"Unknown"` on any retrieval failure
    pub async fn current_screen(&self) -> String {
        self.device
            .current_screen_id()
            .await
            .unwrap_or_else(|_| "Unknown".to_string())
    }

    async fn settle(&self, ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}
