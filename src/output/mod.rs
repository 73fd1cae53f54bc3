use crate::error::{Error, Result};
use crate::middleman::{BackendState, BackendSummary, InitFailure, ReplayOutcome};
use crate::model::{ControlOption, DeviceItem, UnknownDeviceItem};
use crate::troubleshoot::{CheckResult, TroubleshootOutcome};
use colored::Colorize;
use serde::Serialize;

const LABEL_W: usize = 18;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Other(format!("failed to serialize output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

fn state_label(state: &BackendState) -> colored::ColoredString {
    match state {
        BackendState::Running => "running".green().bold(),
        BackendState::BadInit(InitFailure::Refused) => "failed to start".red().bold(),
        BackendState::BadInit(InitFailure::TimedOut) => "timed out".red().bold(),
        BackendState::BadInit(InitFailure::Panicked) => "crashed".red().bold(),
        BackendState::NotInstalled => "not installed".dimmed().bold(),
        BackendState::ImportError(_) => "load error".yellow().bold(),
    }
}

pub fn print_backends(summaries: &[BackendSummary]) {
    let divider_w: usize = 64;
    let title = format!("Backends ({})", summaries.len());
    println!("── {} {}", title.bold(), "─".repeat(divider_w.saturating_sub(2 + title.len())));

    for summary in summaries {
        let name = summary.name.as_deref().unwrap_or(&summary.id);
        let version = summary
            .version
            .as_deref()
            .map(|v| format!(" {}", v))
            .unwrap_or_default();
        println!(
            "  {:<14} {}{}  {}",
            summary.id,
            name,
            version.dimmed(),
            state_label(&summary.state)
        );
        if let BackendState::ImportError(msg) = &summary.state {
            println!("       {}", msg.dimmed());
        }
        if summary.troubleshooter && summary.state != BackendState::Running {
            println!(
                "       Run {} for help.",
                format!("prismctl troubleshoot {}", summary.id).cyan()
            );
        }
    }
    println!("{}", "─".repeat(divider_w));
}

pub fn print_devices(devices: &[&DeviceItem]) {
    if devices.is_empty() {
        println!("{}", "  No devices found.".yellow());
        return;
    }
    for device in devices {
        println!(
            "  {:<18} {} {}",
            device.serial.cyan(),
            device.name.bold(),
            format!("({}, {})", device.form_factor.label, device.backend_id).dimmed()
        );
    }
}

/// Current state of an option in a few words.
pub fn describe_option(option: &ControlOption) -> String {
    match option {
        ControlOption::Effect(e) => {
            let mut parts = Vec::new();
            if e.active {
                parts.push("active".to_string());
            }
            if let Some(p) = e.common.parameters.active() {
                parts.push(p.label.clone());
            }
            let wanted = e.common.active_colours_required().min(e.common.colours.len());
            parts.extend(e.common.colours[..wanted].iter().map(|c| c.to_string()));
            parts.join(" ")
        }
        ControlOption::Slider(s) => {
            format!("{} ({}..{})", s.display_value(), s.min, s.max)
        }
        ControlOption::Toggle(t) => (if t.active { "on" } else { "off" }).to_string(),
        ControlOption::MultipleChoice(m) => m
            .chosen()
            .map(|p| p.label.clone())
            .unwrap_or_else(|| "-".to_string()),
    }
}

pub fn print_device(device: &DeviceItem) {
    let mut rows: Vec<(&str, String)> = vec![
        ("Name", device.name.clone()),
        ("Serial", device.serial.clone()),
        ("Form Factor", device.form_factor.label.clone()),
        ("Backend", device.backend_id.clone()),
    ];
    if let Some(fw) = &device.firmware_version {
        rows.push(("Firmware", fw.clone()));
    }
    if let (Some(vid), Some(pid)) = (&device.vid, &device.pid) {
        rows.push(("USB ID", format!("{}:{}", vid, pid)));
    }

    let inner_w = rows
        .iter()
        .map(|(l, v)| l.len().max(LABEL_W) + 2 + v.len())
        .max()
        .unwrap_or(40);

    let title = "Device";
    let fill = inner_w.saturating_sub(1 + title.len());
    println!("╭─ {} {}╮", title.bold(), "─".repeat(fill));
    for (label, value) in &rows {
        let padded = format!("{:<w$}", label, w = LABEL_W);
        let pad = inner_w.saturating_sub(LABEL_W + 2 + value.len());
        println!("│ {}  {}{} │", padded.dimmed(), value, " ".repeat(pad));
    }
    println!("╰{}╯", "─".repeat(inner_w + 2));

    for zone in &device.zones {
        println!("  {} {}", zone.label.bold(), format!("[{}]", zone.zone_id).dimmed());
        for option in zone.options() {
            let marker = if option.is_active_effect() {
                "●".green()
            } else {
                " ".normal()
            };
            println!(
                "   {} {:<22} {:<8} {}",
                marker,
                option.uid(),
                option.kind().dimmed(),
                describe_option(option)
            );
        }
    }
}

pub fn print_unsupported(devices: &[UnknownDeviceItem]) {
    if devices.is_empty() {
        println!("{}", "  Every connected device is supported.".green());
        return;
    }
    for device in devices {
        println!(
            "  {}:{}  {} {}",
            device.vid,
            device.pid,
            device.name.bold(),
            format!("({})", device.backend_id).dimmed()
        );
    }
}

pub fn print_replay(serial: &str, outcome: &ReplayOutcome) {
    match outcome {
        ReplayOutcome::Software { path } => println!(
            "  {} restarted software effect {}",
            serial.cyan(),
            path.display()
        ),
        ReplayOutcome::Hardware { zones: 0 } => println!(
            "  {} {}",
            serial.cyan(),
            "has no active effect to replay".yellow()
        ),
        ReplayOutcome::Hardware { zones } => {
            println!("  {} replayed effects on {} zone(s)", serial.cyan(), zones)
        }
    }
}

fn print_check(check: &CheckResult) {
    let mark = match check.passed {
        Some(true) => "PASS".green().bold(),
        Some(false) => "FAIL".red().bold(),
        None => "SKIP".dimmed().bold(),
    };
    println!("  {} {}", mark, check.test_name);
    for suggestion in &check.suggestions {
        println!("       {}", suggestion.dimmed());
    }
}

pub fn print_troubleshoot(backend_id: &str, outcome: &TroubleshootOutcome) {
    match outcome {
        TroubleshootOutcome::NotAvailable => println!(
            "  {} No troubleshooter for {}.",
            "Note:".yellow(),
            backend_id
        ),
        TroubleshootOutcome::Failed(reason) => println!(
            "  {} Troubleshooter for {} failed: {}",
            "Error:".red().bold(),
            backend_id,
            reason
        ),
        TroubleshootOutcome::Results(checks) => {
            for check in checks {
                print_check(check);
            }
            let failed = checks.iter().filter(|c| c.passed == Some(false)).count();
            if failed == 0 {
                println!("  {}", "No problems found.".green());
            } else {
                println!("  {}", format!("{} problem(s) found.", failed).red().bold());
            }
        }
    }
}
