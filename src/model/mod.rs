pub mod colour;
pub mod option;
pub mod parameter;
pub mod zone;

pub use colour::Colour;
pub use option::{
    Control, ControlOption, ControlSink, ControlValue, EffectOption, MultipleChoiceOption,
    NullSink, SliderOption, ToggleOption,
};
pub use parameter::{Parameter, ParameterSet};
pub use zone::Zone;

use crate::error::Result;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormFactor {
    pub id: String,
    pub label: String,
}

impl FormFactor {
    pub fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
        }
    }

    pub fn unrecognised() -> Self {
        Self::new("unrecognised", "Unrecognised")
    }
}

/// A device discovered by a backend. Rebuilt from scratch on every cache
/// fill; `backend_id` is only a lookup key into the Middleman.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceItem {
    pub name: String,
    pub serial: String,
    pub form_factor: FormFactor,
    pub backend_id: String,
    pub firmware_version: Option<String>,
    pub vid: Option<String>,
    pub pid: Option<String>,
    pub real_image: Option<String>,
    pub zones: Vec<Zone>,
}

impl DeviceItem {
    pub fn new(name: &str, serial: &str, form_factor: FormFactor, backend_id: &str) -> Self {
        Self {
            name: name.to_string(),
            serial: serial.to_string(),
            form_factor,
            backend_id: backend_id.to_string(),
            firmware_version: None,
            vid: None,
            pid: None,
            real_image: None,
            zones: Vec::new(),
        }
    }

    pub fn zone(&self, zone_id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.zone_id == zone_id)
    }

    pub fn zone_mut(&mut self, zone_id: &str) -> Option<&mut Zone> {
        self.zones.iter_mut().find(|z| z.zone_id == zone_id)
    }

    /// Find an option by uid in any zone, returning the owning zone's id too.
    pub fn find_option(&self, uid: &str) -> Option<(&str, &ControlOption)> {
        self.zones
            .iter()
            .find_map(|z| z.option(uid).map(|o| (z.zone_id.as_str(), o)))
    }

    /// Re-read every option from hardware.
    pub fn refresh(&mut self) -> Result<()> {
        for zone in &mut self.zones {
            zone.refresh()?;
        }
        Ok(())
    }
}

/// Hardware that is plugged in but cannot be driven by its backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownDeviceItem {
    pub name: String,
    pub vid: String,
    pub pid: String,
    pub backend_id: String,
}
