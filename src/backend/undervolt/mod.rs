//! Laptop power controls: performance modes, CPU voltage offsets, power
//! limits, fan and battery settings.
//!
//! Values are only held in memory and persisted to the data directory.
//! `apply` logs what would be written; no MSR, RAPL or EC registers are
//! touched.

pub mod settings;

use super::{Backend, BackendContext, BackendInfo, LoadError};
use crate::detect::PlatformInfo;
use crate::error::{Error, Result};
use crate::model::{
    ControlSink, ControlValue, DeviceItem, EffectOption, FormFactor, SliderOption, Zone,
};
use settings::{MODE_GROUPS, PowerSettings, SLIDERS, ZONE_ORDER};
use std::sync::{Arc, Mutex, MutexGuard};

pub const BACKEND_ID: &str = "undervolt";
pub const DEVICE_SERIAL: &str = "laptop";

pub fn load(ctx: &BackendContext) -> std::result::Result<Box<dyn Backend>, LoadError> {
    Ok(Box::new(UndervoltBackend::new(ctx.clone())))
}

type SharedSettings = Arc<Mutex<PowerSettings>>;

fn lock(settings: &SharedSettings) -> Result<MutexGuard<'_, PowerSettings>> {
    settings
        .lock()
        .map_err(|_| Error::Other("power settings lock poisoned".to_string()))
}

/// Routes option writes into the shared in-memory settings.
#[derive(Debug)]
struct PowerSink {
    settings: SharedSettings,
}

impl ControlSink for PowerSink {
    fn write(&self, uid: &str, value: &ControlValue) -> Result<()> {
        let mut settings = lock(&self.settings)?;
        match value {
            ControlValue::Slider { value } if settings::slider_spec(uid).is_some() => {
                settings.values.insert(uid.to_string(), f64::from(*value));
                Ok(())
            }
            ControlValue::Effect { .. } => {
                let (group, choice) =
                    settings::mode_for_uid(uid).ok_or_else(|| Error::InvalidValue {
                        uid: uid.to_string(),
                        detail: "not a power mode".to_string(),
                    })?;
                settings
                    .modes
                    .insert(group.zone.to_string(), choice.to_string());
                Ok(())
            }
            other => Err(Error::InvalidValue {
                uid: uid.to_string(),
                detail: format!("unsupported value {:?}", other),
            }),
        }
    }

    fn read(&self, uid: &str) -> Result<Option<ControlValue>> {
        let settings = lock(&self.settings)?;
        if settings::slider_spec(uid).is_some() {
            return Ok(settings.value(uid).map(|value| ControlValue::Slider { value }));
        }
        Ok(settings::mode_for_uid(uid).map(|(group, choice)| {
            if settings.mode(group.zone) == Some(choice) {
                ControlValue::Effect {
                    parameter: None,
                    colours: Vec::new(),
                }
            } else {
                ControlValue::Inactive
            }
        }))
    }
}

#[derive(Debug)]
pub struct UndervoltBackend {
    ctx: BackendContext,
    platform: PlatformInfo,
    settings: SharedSettings,
}

impl UndervoltBackend {
    pub fn new(ctx: BackendContext) -> Self {
        Self {
            ctx,
            platform: PlatformInfo::default(),
            settings: Arc::new(Mutex::new(PowerSettings::default())),
        }
    }

    pub fn settings(&self) -> Result<PowerSettings> {
        Ok(lock(&self.settings)?.clone())
    }

    fn defaults(&self) -> PowerSettings {
        PowerSettings::with_battery_limit(self.platform.battery.charge_end_threshold)
    }

    /// Saved settings override the defaults ("client overrides").
    fn load_client_overrides(&mut self) {
        let initial = match settings::load(&self.ctx.data_dir) {
            Ok(Some(saved)) => {
                tracing::debug!("loaded saved undervolt settings");
                saved
            }
            Ok(None) => self.defaults(),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring saved undervolt settings");
                self.defaults()
            }
        };
        match lock(&self.settings) {
            Ok(mut current) => *current = initial,
            Err(e) => tracing::warn!(error = %e, "could not install undervolt settings"),
        }
    }

    fn build_device(&self) -> Result<DeviceItem> {
        let current = self.settings()?;
        let sink: Arc<dyn ControlSink> = Arc::new(PowerSink {
            settings: Arc::clone(&self.settings),
        });

        let mut device = DeviceItem::new(
            self.platform.cpu.brand(),
            DEVICE_SERIAL,
            FormFactor::new("laptop", "Laptop"),
            BACKEND_ID,
        );

        for (zone_id, label) in ZONE_ORDER {
            let mut zone = Zone::new(zone_id, label);

            if let Some(group) = MODE_GROUPS.iter().find(|g| g.zone == *zone_id) {
                for (choice, choice_label) in group.choices {
                    let option =
                        EffectOption::new(&group.option_uid(choice), choice_label, sink.clone())
                            .active(current.mode(group.zone) == Some(*choice));
                    zone.push(option)?;
                }
            }

            for spec in SLIDERS.iter().filter(|s| s.zone == *zone_id) {
                let slider = SliderOption::new(spec.uid, spec.label, sink.clone(), spec.min, spec.max)
                    .with_suffix(spec.suffix, spec.suffix_plural)
                    .with_value(current.value(spec.uid).unwrap_or(spec.default));
                zone.push(slider)?;
            }

            device.zones.push(zone);
        }

        Ok(device)
    }
}

impl Backend for UndervoltBackend {
    fn backend_id(&self) -> &str {
        BACKEND_ID
    }

    fn name(&self) -> &str {
        "Laptop Power"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            license: "GPL-3.0-or-later".to_string(),
            ..Default::default()
        }
    }

    fn init(&mut self) -> bool {
        self.platform = PlatformInfo::detect(&self.ctx.sysfs);
        if self.platform.cpu.model_name.is_none() {
            tracing::info!("no CPU model detected, laptop power controls unavailable");
            return false;
        }
        if !self.platform.cpu.is_intel() {
            tracing::debug!(
                cpu = %self.platform.cpu.brand(),
                "voltage offsets are only meaningful on Intel CPUs"
            );
        }
        let battery = &self.platform.battery;
        if battery.has_charge_limit() {
            tracing::debug!(
                supply = ?battery.supply_name,
                capacity = ?battery.capacity_percent,
                limit = ?battery.charge_end_threshold,
                "battery exposes a charge limit"
            );
        }
        tracing::debug!(cpus = self.platform.cpu.online_cpus, "detected laptop platform");
        self.load_client_overrides();
        true
    }

    fn get_devices(&self) -> Result<Vec<DeviceItem>> {
        Ok(vec![self.build_device()?])
    }

    fn apply(&mut self) -> Result<()> {
        let current = self.settings()?;
        tracing::debug!(
            modes = ?current.modes,
            values = ?current.values,
            "apply undervolting settings"
        );
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        let current = self.settings()?;
        let path = settings::save(&self.ctx.data_dir, &current)?;
        tracing::debug!(path = %path.display(), "saved undervolting settings");
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let saved = settings::load(&self.ctx.data_dir)?
            .ok_or_else(|| Error::State("no saved undervolting settings".to_string()))?;
        *lock(&self.settings)? = saved;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        let defaults = self.defaults();
        *lock(&self.settings)? = defaults;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Control, ControlOption};
    use crate::sysfs::SysfsRoot;
    use std::fs;

    fn backend(root: &std::path::Path) -> UndervoltBackend {
        fs::create_dir_all(root.join("proc")).unwrap();
        fs::write(
            root.join("proc/cpuinfo"),
            "vendor_id\t: GenuineIntel\nmodel name\t: Intel(R) Core(TM) i7-10875H CPU @ 2.30GHz\n",
        )
        .unwrap();
        UndervoltBackend::new(BackendContext::new(
            SysfsRoot::new(root),
            root.join("data"),
        ))
    }

    #[test]
    fn test_init_requires_cpu() {
        let tmp = tempfile::tempdir().unwrap();
        let mut b = UndervoltBackend::new(BackendContext::new(
            SysfsRoot::new(tmp.path()),
            tmp.path().join("data"),
        ));
        assert!(!b.init());
        assert!(backend(tmp.path()).init());
    }

    #[test]
    fn test_poisoned_settings_survive_init() {
        let tmp = tempfile::tempdir().unwrap();
        let mut b = backend(tmp.path());
        let shared = Arc::clone(&b.settings);
        let _ = std::thread::spawn(move || {
            let _guard = shared.lock().unwrap();
            panic!("writer died holding the settings");
        })
        .join();

        assert!(b.init());
        assert!(matches!(b.settings(), Err(Error::Other(_))));
        assert!(b.get_devices().is_err());
    }

    #[test]
    fn test_device_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let mut b = backend(tmp.path());
        assert!(b.init());

        let devices = b.get_devices().unwrap();
        assert_eq!(devices.len(), 1);
        let device = &devices[0];
        assert_eq!(device.serial, DEVICE_SERIAL);
        assert_eq!(device.form_factor.id, "laptop");
        assert!(device.name.contains("i7-10875H"));

        let zone_ids: Vec<_> = device.zones.iter().map(|z| z.zone_id.as_str()).collect();
        assert_eq!(
            zone_ids,
            vec!["system", "cpu", "gpu", "undervolt", "power_limit", "fan", "battery"]
        );
        for zone in &device.zones {
            let active = zone.options().iter().filter(|o| o.is_active_effect()).count();
            assert!(active <= 1, "zone {} has {} active", zone.zone_id, active);
        }
        assert_eq!(
            device.zone("cpu").unwrap().active_effect().unwrap().uid(),
            "cpu_low"
        );
        assert_eq!(device.zone("undervolt").unwrap().options().len(), 5);
    }

    #[test]
    fn test_cpu_and_gpu_modes_are_independent() {
        let tmp = tempfile::tempdir().unwrap();
        let mut b = backend(tmp.path());
        b.init();

        let mut device = b.get_devices().unwrap().remove(0);
        device
            .zone_mut("cpu")
            .unwrap()
            .activate_effect("cpu_boost", None)
            .unwrap();

        let settings = b.settings().unwrap();
        assert_eq!(settings.mode("cpu"), Some("boost"));
        assert_eq!(settings.mode("gpu"), Some("low"));
        assert_eq!(settings.mode("system"), Some("silent"));

        let fresh = b.get_devices().unwrap().remove(0);
        assert_eq!(
            fresh.zone("cpu").unwrap().active_effect().unwrap().uid(),
            "cpu_boost"
        );
    }

    #[test]
    fn test_slider_writes_and_refresh() {
        let tmp = tempfile::tempdir().unwrap();
        let mut b = backend(tmp.path());
        b.init();

        let mut a = b.get_devices().unwrap().remove(0);
        let mut other = b.get_devices().unwrap().remove(0);
        if let Some(ControlOption::Slider(s)) =
            a.zone_mut("undervolt").unwrap().option_mut("core_offset")
        {
            s.set_value(-80).unwrap();
            assert!(s.set_value(20).is_err());
        } else {
            panic!("core_offset slider missing");
        }

        other.refresh().unwrap();
        match other.find_option("core_offset") {
            Some((_, ControlOption::Slider(s))) => assert_eq!(s.value, -80),
            _ => panic!("core_offset slider missing"),
        }
    }

    #[test]
    fn test_save_load_reset() {
        let tmp = tempfile::tempdir().unwrap();
        let mut b = backend(tmp.path());
        b.init();
        assert!(matches!(b.load(), Err(Error::State(_))));

        let mut device = b.get_devices().unwrap().remove(0);
        if let Some(ControlOption::Slider(s)) = device.zone_mut("power_limit").unwrap().option_mut("pl2") {
            s.set_value(95).unwrap();
        }
        b.save().unwrap();
        assert!(tmp.path().join("data/undervolt.json").exists());

        b.reset().unwrap();
        assert_eq!(b.settings().unwrap().value("pl2"), Some(130));

        b.load().unwrap();
        assert_eq!(b.settings().unwrap().value("pl2"), Some(95));

        // a new instance picks the saved values up at init
        let mut again = backend(tmp.path());
        again.init();
        assert_eq!(again.settings().unwrap().value("pl2"), Some(95));
        again.apply().unwrap();
    }

    #[test]
    fn test_reapply_writes_same_state() {
        let tmp = tempfile::tempdir().unwrap();
        let mut b = backend(tmp.path());
        b.init();
        let device = b.get_devices().unwrap().remove(0);
        let before = b.settings().unwrap();
        for zone in &device.zones {
            for option in zone.options() {
                if option.is_active_effect() || !matches!(option, ControlOption::Effect(_)) {
                    option.reapply().unwrap();
                }
            }
        }
        assert_eq!(b.settings().unwrap(), before);
    }
}
