pub mod openrazer;

use crate::error::Result;
use crate::sysfs::SysfsRoot;
use serde::Serialize;

/// Outcome of one diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub test_name: String,
    /// None when the check does not apply to this system.
    pub passed: Option<bool>,
    pub suggestions: Vec<String>,
}

impl CheckResult {
    pub fn pass(test_name: String) -> Self {
        Self {
            test_name,
            passed: Some(true),
            suggestions: Vec::new(),
        }
    }

    pub fn fail(test_name: String, suggestions: Vec<String>) -> Self {
        Self {
            test_name,
            passed: Some(false),
            suggestions,
        }
    }

    pub fn skipped(test_name: String) -> Self {
        Self {
            test_name,
            passed: None,
            suggestions: Vec::new(),
        }
    }
}

/// Receives progress from a running troubleshooter.
pub trait Progress {
    fn set_max(&mut self, max: u64);
    fn advance(&mut self);
}

/// Progress sink that discards everything.
#[derive(Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn set_max(&mut self, _max: u64) {}
    fn advance(&mut self) {}
}

pub struct TroubleshootContext<'a> {
    pub sysfs: &'a SysfsRoot,
    /// Translates user-facing strings.
    pub i18n: &'a dyn Fn(&str) -> String,
}

pub type Troubleshooter = fn(&TroubleshootContext<'_>, &mut dyn Progress) -> Result<Vec<CheckResult>>;

/// Troubleshooters by backend id.
pub fn lookup(backend_id: &str) -> Option<Troubleshooter> {
    match backend_id {
        crate::backend::openrazer::BACKEND_ID => Some(openrazer::troubleshoot),
        _ => None,
    }
}

/// What `Middleman::troubleshoot` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum TroubleshootOutcome {
    Results(Vec<CheckResult>),
    /// No troubleshooter is registered for the backend.
    NotAvailable,
    /// The troubleshooter itself failed.
    Failed(String),
}
