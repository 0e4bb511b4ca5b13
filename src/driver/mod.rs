pub mod actions;
pub mod adb;
pub mod device;
pub mod errors;
pub mod uiautomator;

pub use actions::{ActionDriver, Locatable};
pub use device::{AdbDevice, DeviceAutomation};
pub use errors::AutomationError;
