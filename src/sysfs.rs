use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Root of the sysfs/procfs tree that backends read from and write to.
/// Defaults to `/`; tests point it at a temporary directory holding a fake tree.
#[derive(Debug, Clone)]
pub struct SysfsRoot {
    root: PathBuf,
}

impl Default for SysfsRoot {
    fn default() -> Self {
        Self::new("/")
    }
}

impl SysfsRoot {
    pub fn system() -> Self {
        Self::default()
    }

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `sys/bus/hid/drivers` -> `<root>/sys/bus/hid/drivers`.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Read an attribute, trimming whitespace.
    pub fn read(&self, relative: impl AsRef<Path>) -> Result<String> {
        let path = self.path(relative);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(s.trim().to_string()),
            Err(source) => Err(Error::SysfsRead { path, source }),
        }
    }

    /// Read an attribute, returning None if it is missing or unreadable by this user.
    pub fn read_optional(&self, relative: impl AsRef<Path>) -> Result<Option<String>> {
        match self.read(relative) {
            Ok(s) => Ok(Some(s)),
            Err(Error::SysfsRead { source, .. })
                if matches!(
                    source.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Attribute `name` of the device directory `dir`. Any failure reads as
    /// absent; device attributes come and go with hotplug.
    pub fn attr(&self, dir: &str, name: &str) -> Option<String> {
        self.read_optional(format!("{}/{}", dir, name))
            .unwrap_or(None)
            .filter(|v| !v.is_empty())
    }

    pub fn has_attr(&self, dir: &str, name: &str) -> bool {
        self.exists(format!("{}/{}", dir, name))
    }

    /// Write an ASCII value to an attribute.
    pub fn write(&self, relative: impl AsRef<Path>, value: &str) -> Result<()> {
        self.write_bytes(relative, value.as_bytes())
    }

    /// Write a raw payload. The OpenRazer driver takes colours as binary RGB
    /// triplets rather than text.
    pub fn write_bytes(&self, relative: impl AsRef<Path>, payload: &[u8]) -> Result<()> {
        let path = self.path(relative);
        std::fs::write(&path, payload).map_err(|source| Error::SysfsWrite { path, source })
    }

    /// Entry names in a directory, sorted.
    pub fn list_dir(&self, relative: impl AsRef<Path>) -> Result<Vec<String>> {
        let path = self.path(relative);
        let read_err = |source| Error::SysfsRead {
            path: path.clone(),
            source,
        };
        let mut names = std::fs::read_dir(&path)
            .map_err(read_err)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(read_err)?;
        names.sort();
        Ok(names)
    }

    /// Only the subdirectories, following symlinks as sysfs device links
    /// are symlinks.
    pub fn list_subdirs(&self, relative: impl AsRef<Path>) -> Result<Vec<String>> {
        let base = self.path(&relative);
        let mut names = self.list_dir(relative)?;
        names.retain(|name| base.join(name).is_dir());
        Ok(names)
    }

    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.path(relative).exists()
    }
}
