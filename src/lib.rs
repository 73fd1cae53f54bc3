pub mod backend;
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod logging;
pub mod middleman;
pub mod model;
pub mod output;
pub mod procpid;
pub mod sysfs;
pub mod troubleshoot;
