pub mod openrazer;
pub mod undervolt;

use crate::error::Result;
use crate::model::{DeviceItem, UnknownDeviceItem};
use crate::sysfs::SysfsRoot;
use serde::Serialize;
use std::path::PathBuf;

/// Everything a backend needs from its surroundings.
#[derive(Debug, Clone)]
pub struct BackendContext {
    pub sysfs: SysfsRoot,
    /// Directory for persisted settings and hardware state.
    pub data_dir: PathBuf,
}

impl BackendContext {
    pub fn new(sysfs: SysfsRoot, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            sysfs,
            data_dir: data_dir.into(),
        }
    }
}

/// Project links and licence shown alongside a backend.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendInfo {
    pub project_url: String,
    pub bug_url: String,
    pub releases_url: String,
    pub license: String,
}

/// A plugin providing discovery and control for one hardware family.
pub trait Backend: Send + std::fmt::Debug {
    fn backend_id(&self) -> &str;

    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn info(&self) -> BackendInfo {
        BackendInfo::default()
    }

    /// One-shot startup. May block; callers impose a timeout.
    fn init(&mut self) -> bool;

    /// Build fresh device items. An error means this backend has no list
    /// right now.
    fn get_devices(&self) -> Result<Vec<DeviceItem>>;

    fn get_device_by_name(&self, name: &str) -> Option<DeviceItem> {
        self.get_devices()
            .ok()?
            .into_iter()
            .find(|d| d.name == name)
    }

    fn get_device_by_serial(&self, serial: &str) -> Option<DeviceItem> {
        self.get_devices()
            .ok()?
            .into_iter()
            .find(|d| d.serial == serial)
    }

    fn get_unsupported_devices(&self) -> Vec<UnknownDeviceItem> {
        Vec::new()
    }

    fn refresh_device(&self, device: &mut DeviceItem) -> Result<()> {
        device.refresh()
    }

    fn apply(&mut self) -> Result<()> {
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    fn restart(&mut self) -> bool {
        self.init()
    }
}

/// Why a backend could not even be constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The driver or library this backend wraps is absent.
    NotInstalled,
    /// It is present but constructing the backend failed.
    Failed(String),
}

pub type BackendFactory =
    Box<dyn Fn(&BackendContext) -> std::result::Result<Box<dyn Backend>, LoadError> + Send>;

pub struct Registration {
    pub id: String,
    pub factory: BackendFactory,
}

impl Registration {
    pub fn new(
        id: &str,
        factory: impl Fn(&BackendContext) -> std::result::Result<Box<dyn Backend>, LoadError>
        + Send
        + 'static,
    ) -> Self {
        Self {
            id: id.to_string(),
            factory: Box::new(factory),
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration").field("id", &self.id).finish()
    }
}

/// Every backend prismctl knows how to build, in registration order.
pub const KNOWN_BACKENDS: &[&str] = &[openrazer::BACKEND_ID, undervolt::BACKEND_ID];

/// Look up the factory for a known backend id.
pub fn registration(id: &str) -> Option<Registration> {
    match id {
        openrazer::BACKEND_ID => Some(Registration::new(id, openrazer::load)),
        undervolt::BACKEND_ID => Some(Registration::new(id, undervolt::load)),
        _ => None,
    }
}
