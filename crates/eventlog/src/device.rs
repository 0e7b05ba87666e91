//! Host metadata captured into the `deviceInfo` context at init.

use std::fmt;

use serde_json::{Map, Value, json};

/// Supplies the initial `deviceInfo` context attribute.
///
/// Failures are not fatal: the engine logs them and starts without device info.
pub trait DeviceInfoProvider: Send + Sync + fmt::Debug {
    fn device_info(&self) -> Result<Map<String, Value>, String>;
}

/// Reports what the Rust standard library knows about the build target.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformInfo;

impl DeviceInfoProvider for PlatformInfo {
    fn device_info(&self) -> Result<Map<String, Value>, String> {
        let mut info = Map::new();
        info.insert("platform".into(), json!(std::env::consts::OS));
        info.insert("arch".into(), json!(std::env::consts::ARCH));
        info.insert("family".into(), json!(std::env::consts::FAMILY));
        if let Ok(parallelism) = std::thread::available_parallelism() {
            info.insert("cpus".into(), json!(parallelism.get()));
        }
        Ok(info)
    }
}

/// A fixed set of attributes, for hosts that already know their device details.
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceInfo(pub Map<String, Value>);

impl DeviceInfoProvider for StaticDeviceInfo {
    fn device_info(&self) -> Result<Map<String, Value>, String> {
        Ok(self.0.clone())
    }
}
