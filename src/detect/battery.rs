use crate::sysfs::SysfsRoot;

const POWER_SUPPLY: &str = "sys/class/power_supply";

/// The first `BAT*` power supply, as far as the laptop controls care.
#[derive(Debug, Clone, Default)]
pub struct BatteryInfo {
    pub present: bool,
    pub supply_name: Option<String>,
    pub capacity_percent: Option<u32>,
    /// Firmware charge limit, if the platform exposes one.
    pub charge_end_threshold: Option<u32>,
}

impl BatteryInfo {
    pub fn detect(sysfs: &SysfsRoot) -> Self {
        let Some(name) = sysfs
            .list_dir(POWER_SUPPLY)
            .unwrap_or_default()
            .into_iter()
            .find(|e| e.starts_with("BAT"))
        else {
            return Self::default();
        };

        let dir = format!("{}/{}", POWER_SUPPLY, name);
        // Some peripherals (wireless mice) register as BAT* with another type.
        if sysfs.attr(&dir, "type").is_some_and(|t| t != "Battery") {
            return Self::default();
        }
        let number = |attr: &str| sysfs.attr(&dir, attr).and_then(|v| v.parse().ok());

        Self {
            present: sysfs.attr(&dir, "present").as_deref() == Some("1"),
            capacity_percent: number("capacity"),
            charge_end_threshold: number("charge_control_end_threshold"),
            supply_name: Some(name),
        }
    }

    /// Whether the battery charge limit can be written.
    pub fn has_charge_limit(&self) -> bool {
        self.present && self.charge_end_threshold.is_some()
    }
}
