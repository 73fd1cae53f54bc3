use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One adjustable value of the laptop panel.
#[derive(Debug, Clone, Copy)]
pub struct SliderSpec {
    pub uid: &'static str,
    pub label: &'static str,
    pub zone: &'static str,
    pub min: i32,
    pub max: i32,
    pub default: i32,
    pub suffix: &'static str,
    pub suffix_plural: &'static str,
}

/// A group of mutually exclusive modes, presented as one zone.
#[derive(Debug, Clone, Copy)]
pub struct ModeGroup {
    pub zone: &'static str,
    pub label: &'static str,
    pub choices: &'static [(&'static str, &'static str)],
    pub default: &'static str,
}

impl ModeGroup {
    /// Option uid for a choice, unique across the whole device.
    pub fn option_uid(&self, choice: &str) -> String {
        format!("{}_{}", self.zone, choice)
    }
}

const fn voltage(uid: &'static str, label: &'static str) -> SliderSpec {
    SliderSpec {
        uid,
        label,
        zone: "undervolt",
        min: -200,
        max: 0,
        default: 0,
        suffix: "mV",
        suffix_plural: "mV",
    }
}

const fn power_limit(uid: &'static str, label: &'static str) -> SliderSpec {
    SliderSpec {
        uid,
        label,
        zone: "power_limit",
        min: 10,
        max: 160,
        default: 130,
        suffix: "W",
        suffix_plural: "W",
    }
}

pub const BATTERY_LIMIT_UID: &str = "battery_charge_limit";

pub const SLIDERS: &[SliderSpec] = &[
    voltage("core_offset", "Core Offset"),
    voltage("cache_offset", "Cache Offset"),
    voltage("igpu_offset", "iGPU Offset"),
    voltage("system_agent_offset", "System Agent Offset"),
    voltage("analog_io_offset", "Analog I/O Offset"),
    power_limit("pl1", "PL1"),
    power_limit("pl2", "PL2"),
    SliderSpec {
        uid: "fan_speed",
        label: "Fan Speed",
        zone: "fan",
        min: 1200,
        max: 3800,
        default: 1200,
        suffix: " RPM",
        suffix_plural: " RPMs",
    },
    SliderSpec {
        uid: BATTERY_LIMIT_UID,
        label: "Battery Charge Limit",
        zone: "battery",
        min: 50,
        max: 100,
        default: 50,
        suffix: "%",
        suffix_plural: "%",
    },
];

pub const MODE_GROUPS: &[ModeGroup] = &[
    ModeGroup {
        zone: "system",
        label: "System Mode",
        choices: &[("silent", "Silent"), ("balanced", "Balanced"), ("custom", "Custom")],
        default: "silent",
    },
    ModeGroup {
        zone: "cpu",
        label: "CPU Mode",
        choices: &[("low", "Low"), ("mid", "Mid"), ("high", "High"), ("boost", "Boost")],
        default: "low",
    },
    ModeGroup {
        zone: "gpu",
        label: "GPU Mode",
        choices: &[("low", "Low"), ("mid", "Mid"), ("high", "High")],
        default: "low",
    },
    ModeGroup {
        zone: "fan",
        label: "Fan Mode",
        choices: &[("auto", "Auto"), ("manual", "Manual"), ("max", "Max")],
        default: "auto",
    },
];

/// Zones in display order, with labels for the slider-only ones.
pub const ZONE_ORDER: &[(&str, &str)] = &[
    ("system", "System Mode"),
    ("cpu", "CPU Mode"),
    ("gpu", "GPU Mode"),
    ("undervolt", "CPU Undervolting"),
    ("power_limit", "System Power Limit Control"),
    ("fan", "Fan Control"),
    ("battery", "Battery Control"),
];

pub fn slider_spec(uid: &str) -> Option<&'static SliderSpec> {
    SLIDERS.iter().find(|s| s.uid == uid)
}

/// Resolve an option uid like `cpu_boost` to its group and choice.
pub fn mode_for_uid(uid: &str) -> Option<(&'static ModeGroup, &'static str)> {
    MODE_GROUPS.iter().find_map(|group| {
        let choice = uid.strip_prefix(group.zone)?.strip_prefix('_')?;
        group
            .choices
            .iter()
            .find(|(c, _)| *c == choice)
            .map(|(c, _)| (group, *c))
    })
}

/// In-memory laptop power settings. Nothing here reaches hardware registers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerSettings {
    /// Active mode per group, keyed by zone id.
    pub modes: BTreeMap<String, String>,
    /// Slider values keyed by uid.
    pub values: BTreeMap<String, f64>,
}

impl Default for PowerSettings {
    fn default() -> Self {
        Self {
            modes: MODE_GROUPS
                .iter()
                .map(|g| (g.zone.to_string(), g.default.to_string()))
                .collect(),
            values: SLIDERS
                .iter()
                .map(|s| (s.uid.to_string(), f64::from(s.default)))
                .collect(),
        }
    }
}

impl PowerSettings {
    /// Defaults, with the battery limit taken from firmware when it reports one.
    pub fn with_battery_limit(limit: Option<u32>) -> Self {
        let mut settings = Self::default();
        if let (Some(limit), Some(spec)) = (limit, slider_spec(BATTERY_LIMIT_UID)) {
            let clamped = i32::try_from(limit)
                .unwrap_or(spec.max)
                .clamp(spec.min, spec.max);
            settings
                .values
                .insert(BATTERY_LIMIT_UID.to_string(), f64::from(clamped));
        }
        settings
    }

    pub fn mode(&self, zone: &str) -> Option<&str> {
        self.modes.get(zone).map(String::as_str)
    }

    /// Slider value rounded for display, falling back to the slider default.
    pub fn value(&self, uid: &str) -> Option<i32> {
        match self.values.get(uid) {
            Some(v) => Some(v.round() as i32),
            None => slider_spec(uid).map(|s| s.default),
        }
    }

    /// Fill in anything a saved file was missing.
    fn complete(mut self) -> Self {
        let defaults = Self::default();
        for (k, v) in defaults.modes {
            self.modes.entry(k).or_insert(v);
        }
        for (k, v) in defaults.values {
            self.values.entry(k).or_insert(v);
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SavedSettings {
    timestamp: String,
    settings: PowerSettings,
}

pub const SETTINGS_FILE: &str = "undervolt.json";

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE)
}

pub fn save(data_dir: &Path, settings: &PowerSettings) -> Result<PathBuf> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| Error::State(format!("failed to create data dir: {}", e)))?;
    let saved = SavedSettings {
        timestamp: chrono::Utc::now().to_rfc3339(),
        settings: settings.clone(),
    };
    let data = serde_json::to_string_pretty(&saved)
        .map_err(|e| Error::State(format!("failed to serialize settings: {}", e)))?;
    let path = settings_path(data_dir);
    std::fs::write(&path, data)
        .map_err(|e| Error::State(format!("failed to write settings file: {}", e)))?;
    Ok(path)
}

/// Load saved settings, or None if nothing has been saved yet.
pub fn load(data_dir: &Path) -> Result<Option<PowerSettings>> {
    let path = settings_path(data_dir);
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(&path)
        .map_err(|e| Error::State(format!("failed to read settings file: {}", e)))?;
    let saved: SavedSettings = serde_json::from_str(&data)
        .map_err(|e| Error::State(format!("failed to parse settings file: {}", e)))?;
    Ok(Some(saved.settings.complete()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = PowerSettings::default();
        assert_eq!(s.mode("system"), Some("silent"));
        assert_eq!(s.mode("fan"), Some("auto"));
        assert_eq!(s.value("pl1"), Some(130));
        assert_eq!(s.value("core_offset"), Some(0));
        assert_eq!(s.value("fan_speed"), Some(1200));
        assert_eq!(s.value(BATTERY_LIMIT_UID), Some(50));
    }

    #[test]
    fn test_battery_limit_from_firmware_is_clamped() {
        assert_eq!(
            PowerSettings::with_battery_limit(Some(80)).value(BATTERY_LIMIT_UID),
            Some(80)
        );
        assert_eq!(
            PowerSettings::with_battery_limit(Some(20)).value(BATTERY_LIMIT_UID),
            Some(50)
        );
        assert_eq!(
            PowerSettings::with_battery_limit(Some(u32::MAX)).value(BATTERY_LIMIT_UID),
            Some(100)
        );
    }

    #[test]
    fn test_mode_for_uid() {
        let (group, choice) = mode_for_uid("cpu_boost").unwrap();
        assert_eq!(group.zone, "cpu");
        assert_eq!(choice, "boost");
        assert!(mode_for_uid("gpu_boost").is_none());
        assert!(mode_for_uid("pl1").is_none());
        assert_eq!(MODE_GROUPS[0].option_uid("silent"), "system_silent");
    }

    #[test]
    fn test_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested");
        assert!(load(&dir).unwrap().is_none());

        let mut settings = PowerSettings::default();
        settings.values.insert("core_offset".to_string(), -75.0);
        settings.modes.insert("gpu".to_string(), "high".to_string());
        save(&dir, &settings).unwrap();

        assert_eq!(load(&dir).unwrap().unwrap(), settings);
    }

    #[test]
    fn test_load_fills_missing_keys() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            settings_path(tmp.path()),
            r#"{"timestamp":"2026-01-01T00:00:00Z","settings":{"values":{"pl2":90.0}}}"#,
        )
        .unwrap();
        let loaded = load(tmp.path()).unwrap().unwrap();
        assert_eq!(loaded.value("pl2"), Some(90));
        assert_eq!(loaded.value("pl1"), Some(130));
        assert_eq!(loaded.mode("cpu"), Some("low"));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(settings_path(tmp.path()), "not json").unwrap();
        assert!(matches!(load(tmp.path()), Err(Error::State(_))));
    }
}
