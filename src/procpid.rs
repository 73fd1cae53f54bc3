//! Per-device software effect state and supervision of the helper process
//! that plays software effects.
//!
//! Both live in the runtime directory, keyed by device serial:
//! `states/<serial>.json` for what should be playing and `pids/<serial>.pid`
//! for the helper currently playing it.

use crate::error::{Error, Result};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareEffect {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwarePreset {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct StateFile {
    effect: Option<SoftwareEffect>,
    preset: Option<SoftwarePreset>,
}

/// Serials come from hardware; keep them to safe file names. Alphanumerics
/// and `-` pass through, every other byte becomes `_XX` so distinct serials
/// never share a file.
fn file_stem(serial: &str) -> String {
    if serial.is_empty() {
        return "_".to_string();
    }
    serial
        .bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || b == b'-' {
                char::from(b).to_string()
            } else {
                format!("_{:02X}", b)
            }
        })
        .collect()
}

/// What software effect or preset a device should be showing.
#[derive(Debug, Clone)]
pub struct DeviceSoftwareState {
    path: PathBuf,
}

impl DeviceSoftwareState {
    pub fn new(runtime_dir: &Path, serial: &str) -> Self {
        Self {
            path: runtime_dir
                .join("states")
                .join(format!("{}.json", file_stem(serial))),
        }
    }

    fn read(&self) -> Result<StateFile> {
        if !self.path.exists() {
            return Ok(StateFile::default());
        }
        let data = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::State(format!("failed to read {}: {}", self.path.display(), e)))?;
        serde_json::from_str(&data)
            .map_err(|e| Error::State(format!("failed to parse {}: {}", self.path.display(), e)))
    }

    fn write(&self, state: &StateFile) -> Result<()> {
        if state.effect.is_none() && state.preset.is_none() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)
                    .map_err(|e| Error::State(format!("failed to remove state: {}", e)))?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::State(format!("failed to create state dir: {}", e)))?;
        }
        let data = serde_json::to_string_pretty(state)
            .map_err(|e| Error::State(format!("failed to serialize state: {}", e)))?;
        std::fs::write(&self.path, data)
            .map_err(|e| Error::State(format!("failed to write state: {}", e)))
    }

    pub fn get_effect(&self) -> Result<Option<SoftwareEffect>> {
        Ok(self.read()?.effect)
    }

    pub fn set_effect(&self, effect: SoftwareEffect) -> Result<()> {
        let mut state = self.read()?;
        state.effect = Some(effect);
        self.write(&state)
    }

    pub fn clear_effect(&self) -> Result<()> {
        let mut state = self.read()?;
        state.effect = None;
        self.write(&state)
    }

    pub fn get_preset(&self) -> Result<Option<SoftwarePreset>> {
        Ok(self.read()?.preset)
    }

    pub fn set_preset(&self, preset: SoftwarePreset) -> Result<()> {
        let mut state = self.read()?;
        state.preset = Some(preset);
        self.write(&state)
    }

    pub fn clear_preset(&self) -> Result<()> {
        let mut state = self.read()?;
        state.preset = None;
        self.write(&state)
    }
}

/// Tracks one supervised process through a PID file.
#[derive(Debug, Clone)]
pub struct ProcessManager {
    pid_file: PathBuf,
}

impl ProcessManager {
    pub fn new(runtime_dir: &Path, component: &str) -> Self {
        Self {
            pid_file: runtime_dir
                .join("pids")
                .join(format!("{}.pid", file_stem(component))),
        }
    }

    fn recorded_pid(&self) -> Option<Pid> {
        let contents = std::fs::read_to_string(&self.pid_file).ok()?;
        contents.trim().parse::<i32>().ok().map(Pid::from_raw)
    }

    /// Whether the recorded process is still alive. Stale PID files are removed.
    pub fn is_another_instance_running(&self) -> bool {
        let Some(pid) = self.recorded_pid() else {
            return false;
        };
        // A helper this process spawned lingers as a zombie until reaped,
        // and zombies still answer signal 0.
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => {
                tracing::debug!(pid = pid.as_raw(), "component exited");
                let _ = std::fs::remove_file(&self.pid_file);
                return false;
            }
            // ECHILD: started by another prismctl process.
            Ok(_) | Err(_) => {}
        }
        match signal::kill(pid, None) {
            Ok(()) | Err(Errno::EPERM) => true,
            Err(_) => {
                let _ = std::fs::remove_file(&self.pid_file);
                false
            }
        }
    }

    /// Spawn `program` with `args`, replacing any instance already running.
    pub fn start_component(&self, program: &str, args: &[String]) -> Result<u32> {
        if self.is_another_instance_running() {
            self.stop()?;
        }
        let child = std::process::Command::new(program)
            .args(args)
            .spawn()
            .map_err(|e| Error::Process(format!("failed to start {}: {}", program, e)))?;
        let pid = child.id();

        if let Some(parent) = self.pid_file.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Process(format!("failed to create pid dir: {}", e)))?;
        }
        std::fs::write(&self.pid_file, pid.to_string())
            .map_err(|e| Error::Process(format!("failed to write pid file: {}", e)))?;
        tracing::debug!(program, pid, "started component");
        Ok(pid)
    }

    /// Terminate the recorded process, if any, and forget it.
    pub fn stop(&self) -> Result<()> {
        if let Some(pid) = self.recorded_pid() {
            match signal::kill(pid, Signal::SIGTERM) {
                Ok(()) => {
                    tracing::debug!(pid = pid.as_raw(), "stopped component");
                    // Returns ECHILD at once when another process spawned it.
                    std::thread::spawn(move || {
                        let _ = waitpid(pid, None);
                    });
                }
                Err(Errno::ESRCH) => {}
                Err(e) => {
                    return Err(Error::Process(format!(
                        "failed to stop pid {}: {}",
                        pid, e
                    )));
                }
            }
        }
        if self.pid_file.exists() {
            std::fs::remove_file(&self.pid_file)
                .map_err(|e| Error::Process(format!("failed to remove pid file: {}", e)))?;
        }
        Ok(())
    }
}

/// The software-effect side channel the Middleman consults.
pub trait SoftwareEffects: Send + fmt::Debug {
    fn get_effect(&self, serial: &str) -> Result<Option<SoftwareEffect>>;
    fn get_preset(&self, serial: &str) -> Result<Option<SoftwarePreset>>;
    fn clear_effect(&self, serial: &str) -> Result<()>;
    fn clear_preset(&self, serial: &str) -> Result<()>;
    /// Start the helper playing `effect` on the device.
    fn start_effect(&self, effect: &SoftwareEffect, serial: &str) -> Result<()>;
    fn is_running(&self, serial: &str) -> bool;
    fn stop(&self, serial: &str) -> Result<()>;
}

/// File-backed side channel under the runtime directory.
#[derive(Debug, Clone)]
pub struct ProcState {
    runtime_dir: PathBuf,
    helper: String,
}

impl ProcState {
    pub fn new(runtime_dir: impl Into<PathBuf>, helper: &str) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
            helper: helper.to_string(),
        }
    }

    pub fn state(&self, serial: &str) -> DeviceSoftwareState {
        DeviceSoftwareState::new(&self.runtime_dir, serial)
    }

    pub fn process(&self, serial: &str) -> ProcessManager {
        ProcessManager::new(&self.runtime_dir, serial)
    }
}

impl SoftwareEffects for ProcState {
    fn get_effect(&self, serial: &str) -> Result<Option<SoftwareEffect>> {
        self.state(serial).get_effect()
    }

    fn get_preset(&self, serial: &str) -> Result<Option<SoftwarePreset>> {
        self.state(serial).get_preset()
    }

    fn clear_effect(&self, serial: &str) -> Result<()> {
        self.state(serial).clear_effect()
    }

    fn clear_preset(&self, serial: &str) -> Result<()> {
        self.state(serial).clear_preset()
    }

    fn start_effect(&self, effect: &SoftwareEffect, serial: &str) -> Result<()> {
        let args = vec![
            "--run-fx".to_string(),
            effect.path.display().to_string(),
            "--device-serial".to_string(),
            serial.to_string(),
        ];
        self.process(serial).start_component(&self.helper, &args)?;
        Ok(())
    }

    fn is_running(&self, serial: &str) -> bool {
        self.process(serial).is_another_instance_running()
    }

    fn stop(&self, serial: &str) -> Result<()> {
        self.process(serial).stop()
    }
}
