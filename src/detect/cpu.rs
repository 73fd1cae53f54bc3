use crate::sysfs::SysfsRoot;

#[derive(Debug, Clone, Default)]
pub struct CpuInfo {
    pub model_name: Option<String>,
    pub vendor: Option<String>,
    pub online_cpus: u32,
}

/// First value of `key` in /proc/cpuinfo. Every processor block repeats it.
fn cpuinfo_field(cpuinfo: &str, key: &str) -> Option<String> {
    cpuinfo
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim().to_string())
}

/// `cpu0`, `cpu1`, ... but not `cpufreq` or `cpuidle`.
fn is_cpu_dir(name: &str) -> bool {
    name.strip_prefix("cpu")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

impl CpuInfo {
    pub fn detect(sysfs: &SysfsRoot) -> Self {
        let cpuinfo = sysfs.read("proc/cpuinfo").unwrap_or_default();
        let online_cpus = sysfs
            .list_dir("sys/devices/system/cpu")
            .unwrap_or_default()
            .iter()
            .filter(|e| is_cpu_dir(e))
            .count() as u32;

        Self {
            model_name: cpuinfo_field(&cpuinfo, "model name"),
            vendor: cpuinfo_field(&cpuinfo, "vendor_id"),
            online_cpus,
        }
    }

    pub fn is_intel(&self) -> bool {
        self.vendor.as_deref() == Some("GenuineIntel")
    }

    /// Brand string shown as the laptop device's name.
    pub fn brand(&self) -> &str {
        self.model_name.as_deref().unwrap_or("Unknown CPU")
    }
}
