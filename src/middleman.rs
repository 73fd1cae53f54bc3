//! The single entry point front ends talk to. Owns the backend plugins,
//! caches the devices they report and dispatches effect replay and colour
//! changes to whichever backend owns a device.

use crate::backend::{self, Backend, BackendContext, BackendInfo, LoadError, Registration};
use crate::config::PrismConfig;
use crate::error::{Error, Result};
use crate::model::{Colour, Control, ControlOption, DeviceItem, Parameter, UnknownDeviceItem, Zone};
use crate::procpid::{ProcState, SoftwareEffects};
use crate::sysfs::SysfsRoot;
use crate::troubleshoot::{self, Progress, TroubleshootContext, TroubleshootOutcome, Troubleshooter};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Why a constructed backend is not running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitFailure {
    /// `init()` returned false.
    Refused,
    TimedOut,
    Panicked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedBackend {
    pub id: String,
    pub reason: InitFailure,
}

/// Which of the four buckets a backend id landed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum BackendState {
    Running,
    BadInit(InitFailure),
    NotInstalled,
    ImportError(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendSummary {
    pub id: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub info: Option<BackendInfo>,
    #[serde(flatten)]
    pub state: BackendState,
    pub troubleshooter: bool,
}

/// What `replay_active_effect` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayOutcome {
    /// A software effect was restarted through the helper.
    Software { path: PathBuf },
    /// Hardware effects were written again to this many zones.
    Hardware { zones: usize },
}

/// Empty and not-yet-loaded are different states.
#[derive(Debug, Default)]
enum DeviceCache {
    #[default]
    Unloaded,
    Loaded(Vec<DeviceItem>),
}

pub struct Middleman {
    context: BackendContext,
    registrations: Vec<Registration>,
    backends: Vec<Box<dyn Backend>>,
    bad_init: Vec<FailedBackend>,
    not_installed: Vec<String>,
    import_errors: BTreeMap<String, String>,
    troubleshooters: BTreeMap<String, Troubleshooter>,
    device_cache: DeviceCache,
    software: Box<dyn SoftwareEffects>,
    init_timeout: Duration,
}

/// Run `init()` on a worker thread so a hung backend cannot hang startup.
fn init_with_timeout(
    mut backend: Box<dyn Backend>,
    timeout: Duration,
) -> std::result::Result<Box<dyn Backend>, InitFailure> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let ready = backend.init();
        let _ = tx.send((backend, ready));
    });
    match rx.recv_timeout(timeout) {
        Ok((backend, true)) => Ok(backend),
        Ok((_, false)) => Err(InitFailure::Refused),
        Err(RecvTimeoutError::Timeout) => Err(InitFailure::TimedOut),
        // sender dropped without sending: init panicked
        Err(RecvTimeoutError::Disconnected) => Err(InitFailure::Panicked),
    }
}

impl Middleman {
    pub fn new(
        context: BackendContext,
        registrations: Vec<Registration>,
        software: Box<dyn SoftwareEffects>,
        init_timeout: Duration,
    ) -> Self {
        Self {
            context,
            registrations,
            backends: Vec::new(),
            bad_init: Vec::new(),
            not_installed: Vec::new(),
            import_errors: BTreeMap::new(),
            troubleshooters: BTreeMap::new(),
            device_cache: DeviceCache::Unloaded,
            software,
            init_timeout,
        }
    }

    /// Build a Middleman for the backends enabled in `config`. Ids prismctl
    /// does not know are registered as not installed.
    pub fn from_config(config: &PrismConfig, sysfs: SysfsRoot) -> Self {
        let registrations = config
            .backends
            .enabled
            .iter()
            .map(|id| {
                backend::registration(id).unwrap_or_else(|| {
                    Registration::new(id, |_| Err(LoadError::NotInstalled))
                })
            })
            .collect();
        let software = ProcState::new(
            config.paths.runtime_dir(),
            &config.software_effects.helper,
        );
        Self::new(
            BackendContext::new(sysfs, config.paths.data_dir()),
            registrations,
            Box::new(software),
            config.backends.init_timeout(),
        )
    }

    /// Construct and start every registered backend, classifying each into
    /// exactly one of running, bad init, not installed or import error.
    /// Calling it again starts over from a fresh set of backends.
    pub fn init(&mut self) {
        self.backends.clear();
        self.bad_init.clear();
        self.not_installed.clear();
        self.import_errors.clear();
        self.troubleshooters.clear();
        self.device_cache = DeviceCache::Unloaded;

        for reg in &self.registrations {
            if let Some(f) = troubleshoot::lookup(&reg.id) {
                self.troubleshooters.insert(reg.id.clone(), f);
            }

            let backend = match (reg.factory)(&self.context) {
                Ok(backend) => backend,
                Err(LoadError::NotInstalled) => {
                    tracing::info!(backend = %reg.id, "not installed");
                    self.not_installed.push(reg.id.clone());
                    continue;
                }
                Err(LoadError::Failed(msg)) => {
                    tracing::warn!(backend = %reg.id, error = %msg, "failed to load backend");
                    self.import_errors.insert(reg.id.clone(), msg);
                    continue;
                }
            };

            match init_with_timeout(backend, self.init_timeout) {
                Ok(backend) => {
                    tracing::info!(backend = %reg.id, version = backend.version(), "backend ready");
                    self.backends.push(backend);
                }
                Err(reason) => {
                    tracing::warn!(backend = %reg.id, ?reason, "backend failed to initialise");
                    self.bad_init.push(FailedBackend {
                        id: reg.id.clone(),
                        reason,
                    });
                }
            }
        }
        self.device_cache = DeviceCache::Unloaded;
    }

    pub fn backends(&self) -> impl Iterator<Item = &dyn Backend> {
        self.backends.iter().map(|b| b.as_ref())
    }

    pub fn bad_init(&self) -> &[FailedBackend] {
        &self.bad_init
    }

    pub fn not_installed(&self) -> &[String] {
        &self.not_installed
    }

    pub fn import_errors(&self) -> &BTreeMap<String, String> {
        &self.import_errors
    }

    pub fn context(&self) -> &BackendContext {
        &self.context
    }

    pub fn backend_state(&self, id: &str) -> Option<BackendState> {
        if self.is_backend_running(id) {
            Some(BackendState::Running)
        } else if let Some(failed) = self.bad_init.iter().find(|f| f.id == id) {
            Some(BackendState::BadInit(failed.reason.clone()))
        } else if self.not_installed.iter().any(|n| n == id) {
            Some(BackendState::NotInstalled)
        } else {
            self.import_errors
                .get(id)
                .map(|msg| BackendState::ImportError(msg.clone()))
        }
    }

    /// One line per registered backend, in registration order.
    pub fn summaries(&self) -> Vec<BackendSummary> {
        self.registrations
            .iter()
            .filter_map(|reg| {
                let state = self.backend_state(&reg.id)?;
                let running = self.get_backend(&reg.id);
                Some(BackendSummary {
                    id: reg.id.clone(),
                    name: running.map(|b| b.name().to_string()),
                    version: running.map(|b| b.version().to_string()),
                    info: running.map(|b| b.info()),
                    state,
                    troubleshooter: self.troubleshooters.contains_key(&reg.id),
                })
            })
            .collect()
    }

    pub fn get_backend(&self, backend_id: &str) -> Option<&dyn Backend> {
        self.backends
            .iter()
            .find(|b| b.backend_id() == backend_id)
            .map(|b| b.as_ref())
    }

    fn get_backend_mut(&mut self, backend_id: &str) -> Result<&mut Box<dyn Backend>> {
        self.backends
            .iter_mut()
            .find(|b| b.backend_id() == backend_id)
            .ok_or_else(|| Error::UnknownBackend(backend_id.to_string()))
    }

    /// The backend that reported `device`.
    pub fn get_backend_for(&self, device: &DeviceItem) -> Option<&dyn Backend> {
        self.get_backend(&device.backend_id)
    }

    pub fn is_backend_running(&self, backend_id: &str) -> bool {
        self.get_backend(backend_id).is_some()
    }

    /// Version string of every running backend.
    pub fn get_versions(&self) -> BTreeMap<String, String> {
        self.backends
            .iter()
            .map(|b| (b.backend_id().to_string(), b.version().to_string()))
            .collect()
    }

    /// Every device from every running backend, filled on first use.
    pub fn get_devices(&mut self) -> &[DeviceItem] {
        if let DeviceCache::Unloaded = self.device_cache {
            let mut devices = Vec::new();
            for backend in &self.backends {
                match backend.get_devices() {
                    Ok(found) => {
                        tracing::debug!(backend = backend.backend_id(), count = found.len(), "listed devices");
                        devices.extend(found);
                    }
                    Err(e) => {
                        tracing::warn!(backend = backend.backend_id(), error = %e, "skipping backend for device list");
                    }
                }
            }
            self.device_cache = DeviceCache::Loaded(devices);
        }
        match &self.device_cache {
            DeviceCache::Loaded(devices) => devices,
            DeviceCache::Unloaded => &[],
        }
    }

    pub fn get_devices_by_form_factor(&mut self, form_factor_id: &str) -> Vec<&DeviceItem> {
        self.get_devices()
            .iter()
            .filter(|d| d.form_factor.id == form_factor_id)
            .collect()
    }

    /// Forget the cached devices; the next query lists them again.
    pub fn invalidate_cache(&mut self) {
        self.device_cache = DeviceCache::Unloaded;
    }

    /// Forget the cached devices and list them again now.
    pub fn reload_device_cache(&mut self) -> &[DeviceItem] {
        self.invalidate_cache();
        self.get_devices()
    }

    pub fn get_device_by_name(&self, name: &str) -> Option<DeviceItem> {
        self.backends.iter().find_map(|b| b.get_device_by_name(name))
    }

    pub fn get_device_by_serial(&self, serial: &str) -> Option<DeviceItem> {
        self.backends
            .iter()
            .find_map(|b| b.get_device_by_serial(serial))
    }

    pub fn get_unsupported_devices(&self) -> Vec<UnknownDeviceItem> {
        self.backends
            .iter()
            .flat_map(|b| b.get_unsupported_devices())
            .collect()
    }

    pub fn get_active_effect<'z>(&self, zone: &'z Zone) -> Option<&'z ControlOption> {
        zone.active_effect()
    }

    pub fn get_active_parameter<'o>(&self, option: &'o ControlOption) -> Option<&'o Parameter> {
        option.parameters().active()
    }

    /// The default parameter, else the first, else none.
    pub fn get_default_parameter<'o>(&self, option: &'o ControlOption) -> Option<&'o Parameter> {
        option.parameters().default_or_first()
    }

    pub fn get_active_colours_required(&self, option: &ControlOption) -> usize {
        option.common().active_colours_required()
    }

    /// Send an option's current state to hardware again.
    pub fn reapply_option(&self, option: &ControlOption) -> Result<()> {
        option.reapply()
    }

    /// Put back whatever the device was showing before something else
    /// (such as a preview) overwrote it. A software effect recorded for the
    /// device wins over its hardware effects.
    pub fn replay_active_effect(&self, device: &mut DeviceItem) -> Result<ReplayOutcome> {
        match self.get_backend_for(device) {
            Some(backend) => backend.refresh_device(device)?,
            None => device.refresh()?,
        }

        if let Some(effect) = self.software.get_effect(&device.serial)? {
            tracing::info!(device = %device.serial, effect = %effect.name, "replaying software effect");
            self.software.start_effect(&effect, &device.serial)?;
            return Ok(ReplayOutcome::Software { path: effect.path });
        }

        let mut zones = 0;
        for zone in &device.zones {
            if let Some(active) = zone.active_effect() {
                self.reapply_option(active)?;
                zones += 1;
            }
        }
        tracing::debug!(device = %device.serial, zones, "replayed hardware effects");
        Ok(ReplayOutcome::Hardware { zones })
    }

    /// Set colour `position` of `option` and re-apply it.
    pub fn set_colour_for_option(
        &self,
        option: &mut ControlOption,
        hex: &str,
        position: usize,
    ) -> Result<()> {
        let colour: Colour = hex.parse()?;
        self.recolour(option, position, colour)
    }

    /// Write the new colour to hardware, keeping the old one in the option
    /// if the write fails.
    fn recolour(&self, option: &mut ControlOption, position: usize, colour: Colour) -> Result<()> {
        let previous = option.common().colours.get(position).copied();
        option.set_colour(position, colour)?;
        if let Err(e) = self.reapply_option(option) {
            if let Some(previous) = previous {
                option.set_colour(position, previous)?;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Returns false if the zone has no active effect.
    pub fn set_colour_for_active_effect_zone(
        &self,
        zone: &mut Zone,
        hex: &str,
        position: usize,
    ) -> Result<bool> {
        match zone.active_effect_mut() {
            Some(option) => {
                self.set_colour_for_option(option, hex, position)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns the number of zones whose active effect was recoloured.
    /// Effects without a colour in `position` are left alone.
    pub fn set_colour_for_active_effect_device(
        &self,
        device: &mut DeviceItem,
        hex: &str,
        position: usize,
    ) -> Result<usize> {
        let colour: Colour = hex.parse()?;
        let mut changed = 0;
        for zone in &mut device.zones {
            if let Some(option) = zone.active_effect_mut()
                && position < option.common().colours.len()
            {
                self.recolour(option, position, colour)?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Stop the helper playing a software effect on `serial` and forget
    /// the effect and preset.
    pub fn stop_software_effect(&self, serial: &str) -> Result<()> {
        if self.software.is_running(serial) {
            self.software.stop(serial)?;
        }
        self.software.clear_effect(serial)?;
        self.software.clear_preset(serial)
    }

    pub fn troubleshoot(
        &self,
        backend_id: &str,
        i18n: &dyn Fn(&str) -> String,
        progress: &mut dyn Progress,
    ) -> TroubleshootOutcome {
        let Some(troubleshooter) = self.troubleshooters.get(backend_id) else {
            return TroubleshootOutcome::NotAvailable;
        };
        let ctx = TroubleshootContext {
            sysfs: &self.context.sysfs,
            i18n,
        };
        match troubleshooter(&ctx, progress) {
            Ok(results) => TroubleshootOutcome::Results(results),
            Err(e) => {
                tracing::warn!(backend = backend_id, error = %e, "troubleshooter failed");
                TroubleshootOutcome::Failed(e.to_string())
            }
        }
    }

    /// Run a backend's init again. Devices are re-listed on next use.
    pub fn restart(&mut self, backend_id: &str) -> Result<bool> {
        let ready = self.get_backend_mut(backend_id)?.restart();
        if !ready {
            tracing::warn!(backend = backend_id, "backend did not come back after restart");
        }
        self.invalidate_cache();
        Ok(ready)
    }

    pub fn apply_backend(&mut self, backend_id: &str) -> Result<()> {
        self.get_backend_mut(backend_id)?.apply()
    }

    pub fn save_backend(&mut self, backend_id: &str) -> Result<()> {
        self.get_backend_mut(backend_id)?.save()
    }

    pub fn load_backend(&mut self, backend_id: &str) -> Result<()> {
        self.get_backend_mut(backend_id)?.load()?;
        self.invalidate_cache();
        Ok(())
    }

    pub fn reset_backend(&mut self, backend_id: &str) -> Result<()> {
        self.get_backend_mut(backend_id)?.reset()?;
        self.invalidate_cache();
        Ok(())
    }
}
