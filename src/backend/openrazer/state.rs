use crate::error::{Error, Result};
use crate::model::Colour;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The last effect written to one zone of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneState {
    pub effect: String,
    pub parameter: Option<String>,
    pub colours: Vec<Colour>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HardwareState {
    timestamp: String,
    /// serial -> zone id -> state
    devices: BTreeMap<String, BTreeMap<String, ZoneState>>,
}

/// The kernel driver is write-only for effects, so prismctl remembers what
/// it last wrote. This is what hardware replay falls back to.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

pub const STATE_FILE: &str = "openrazer-state.json";

impl StateStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(STATE_FILE),
        }
    }

    fn read_all(&self) -> Result<HardwareState> {
        if !self.path.exists() {
            return Ok(HardwareState::default());
        }
        let data = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::State(format!("failed to read hardware state: {}", e)))?;
        serde_json::from_str(&data)
            .map_err(|e| Error::State(format!("failed to parse hardware state: {}", e)))
    }

    pub fn get(&self, serial: &str, zone: &str) -> Result<Option<ZoneState>> {
        Ok(self
            .read_all()?
            .devices
            .get(serial)
            .and_then(|zones| zones.get(zone))
            .cloned())
    }

    pub fn record(&self, serial: &str, zone: &str, state: ZoneState) -> Result<()> {
        let mut all = self.read_all().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "discarding unreadable hardware state");
            HardwareState::default()
        });
        all.timestamp = chrono::Utc::now().to_rfc3339();
        all.devices
            .entry(serial.to_string())
            .or_default()
            .insert(zone.to_string(), state);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::State(format!("failed to create data dir: {}", e)))?;
        }
        let data = serde_json::to_string_pretty(&all)
            .map_err(|e| Error::State(format!("failed to serialize hardware state: {}", e)))?;
        std::fs::write(&self.path, data)
            .map_err(|e| Error::State(format!("failed to write hardware state: {}", e)))
    }
}
