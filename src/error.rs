use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sysfs read failed: {path}: {source}")]
    SysfsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("sysfs write failed: {path}: {source}")]
    SysfsWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("backend not running: {0}")]
    UnknownBackend(String),

    #[error("no option '{uid}' on {device}")]
    OptionNotFound { device: String, uid: String },

    #[error("invalid colour '{0}' (expected #RRGGBB)")]
    InvalidColour(String),

    #[error("invalid value for {uid}: {detail}")]
    InvalidValue { uid: String, detail: String },

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("state file error: {0}")]
    State(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
