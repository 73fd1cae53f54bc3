//! Host facts the laptop power backend needs: the CPU it tunes and the
//! battery whose charge limit it exposes.

pub mod battery;
pub mod cpu;

use crate::sysfs::SysfsRoot;

#[derive(Debug, Clone, Default)]
pub struct PlatformInfo {
    pub cpu: cpu::CpuInfo,
    pub battery: battery::BatteryInfo,
}

impl PlatformInfo {
    pub fn detect(sysfs: &SysfsRoot) -> Self {
        let cpu = cpu::CpuInfo::detect(sysfs);
        let battery = battery::BatteryInfo::detect(sysfs);
        Self { cpu, battery }
    }
}
