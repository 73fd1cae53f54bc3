use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "prismctl",
    about = "Control RGB lighting devices and laptop power settings on Linux",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output as JSON instead of formatted tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Read configuration from this file only
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show every backend and whether it is running
    Backends,

    /// List connected devices
    Devices {
        /// Only devices of this form factor (keyboard, mouse, laptop, ...)
        #[arg(long)]
        form_factor: Option<String>,
    },

    /// Show the zones and options of one device
    Device {
        /// Device serial
        serial: String,
    },

    /// List plugged-in devices no backend can drive
    Unsupported,

    /// Restore the last software or hardware effect on a device
    Replay {
        /// Device serial
        serial: String,
    },

    /// Set a colour on the active effect of a device
    Colour {
        /// Device serial
        serial: String,
        /// Colour as #RRGGBB
        hex: String,
        /// Only this zone
        #[arg(long)]
        zone: Option<String>,
        /// Colour slot (0 = primary, 1 = secondary)
        #[arg(long, default_value_t = 0)]
        position: usize,
    },

    /// Stop the software effect playing on a device
    StopFx {
        /// Device serial
        serial: String,
    },

    /// Diagnose a backend that is not working
    Troubleshoot {
        /// Backend id (e.g. openrazer)
        backend: String,
    },

    /// Laptop power settings
    Laptop {
        #[command(subcommand)]
        action: LaptopAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for (auto-detected if omitted)
        shell: Option<Shell>,
    },
}

#[derive(Subcommand)]
pub enum LaptopAction {
    /// Show current power settings
    Show,
    /// Change one setting: a slider value, or `on` to select a mode
    Set {
        /// Option uid (e.g. core_offset, cpu_boost, fan_auto)
        uid: String,
        /// New value
        value: String,
    },
    /// Apply the current settings
    Apply,
    /// Save the current settings
    Save,
    /// Load saved settings
    Load,
    /// Restore default settings
    Reset,
}

/// Print shell completions to stdout.
pub fn print_completions(shell: Option<Shell>) {
    let shell = shell.or_else(Shell::from_env).unwrap_or_else(|| {
        eprintln!(
            "Could not detect shell. Specify one: prismctl completions bash|zsh|fish|elvish|powershell"
        );
        std::process::exit(1);
    });
    clap_complete::generate(shell, &mut Cli::command(), "prismctl", &mut std::io::stdout());
}
