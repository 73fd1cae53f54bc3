use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use prismctl::backend::undervolt;
use prismctl::cli::{Cli, Command, LaptopAction};
use prismctl::middleman::Middleman;
use prismctl::model::{ControlOption, DeviceItem};
use prismctl::sysfs::SysfsRoot;
use prismctl::troubleshoot::{NoProgress, Progress, TroubleshootOutcome};

fn main() -> Result<()> {
    let cli = Cli::parse();
    prismctl::logging::init(cli.verbose);

    if let Command::Completions { shell } = cli.command {
        prismctl::cli::print_completions(shell);
        return Ok(());
    }

    let config = prismctl::config::load(cli.config.as_ref());
    let mut mm = Middleman::from_config(&config, SysfsRoot::system());
    mm.init();

    match cli.command {
        Command::Backends => cmd_backends(&mm, cli.json)?,
        Command::Devices { form_factor } => cmd_devices(&mut mm, form_factor.as_deref(), cli.json)?,
        Command::Device { serial } => cmd_device(&mm, &serial, cli.json)?,
        Command::Unsupported => cmd_unsupported(&mm, cli.json)?,
        Command::Replay { serial } => cmd_replay(&mm, &serial, cli.json)?,
        Command::Colour {
            serial,
            hex,
            zone,
            position,
        } => cmd_colour(&mm, &serial, &hex, zone.as_deref(), position, cli.json)?,
        Command::StopFx { serial } => {
            mm.stop_software_effect(&serial)?;
            if !cli.json {
                println!("  Stopped software effect on {}.", serial.cyan());
            }
        }
        Command::Troubleshoot { backend } => cmd_troubleshoot(&mm, &backend, cli.json)?,
        Command::Laptop { action } => cmd_laptop(&mut mm, action, cli.json)?,
        Command::Completions { .. } => {}
    }

    Ok(())
}

fn find_device(mm: &Middleman, serial: &str) -> Result<DeviceItem> {
    mm.get_device_by_serial(serial).with_context(|| {
        format!(
            "No device with serial {}. Run `prismctl devices` to list them.",
            serial
        )
    })
}

fn cmd_backends(mm: &Middleman, json: bool) -> Result<()> {
    let summaries = mm.summaries();
    if json {
        prismctl::output::print_json(&summaries)?;
    } else {
        prismctl::output::print_backends(&summaries);
    }
    Ok(())
}

fn cmd_devices(mm: &mut Middleman, form_factor: Option<&str>, json: bool) -> Result<()> {
    let devices: Vec<&DeviceItem> = match form_factor {
        Some(id) => mm.get_devices_by_form_factor(id),
        None => mm.get_devices().iter().collect(),
    };
    if json {
        prismctl::output::print_json(&devices)?;
    } else {
        prismctl::output::print_devices(&devices);
    }
    Ok(())
}

fn cmd_device(mm: &Middleman, serial: &str, json: bool) -> Result<()> {
    let device = find_device(mm, serial)?;
    if json {
        prismctl::output::print_json(&device)?;
    } else {
        prismctl::output::print_device(&device);
    }
    Ok(())
}

fn cmd_unsupported(mm: &Middleman, json: bool) -> Result<()> {
    let devices = mm.get_unsupported_devices();
    if json {
        prismctl::output::print_json(&devices)?;
    } else {
        prismctl::output::print_unsupported(&devices);
    }
    Ok(())
}

fn cmd_replay(mm: &Middleman, serial: &str, json: bool) -> Result<()> {
    let mut device = find_device(mm, serial)?;
    let outcome = mm.replay_active_effect(&mut device)?;
    if json {
        prismctl::output::print_json(&outcome)?;
    } else {
        prismctl::output::print_replay(serial, &outcome);
    }
    Ok(())
}

fn cmd_colour(
    mm: &Middleman,
    serial: &str,
    hex: &str,
    zone: Option<&str>,
    position: usize,
    json: bool,
) -> Result<()> {
    let mut device = find_device(mm, serial)?;
    let changed = match zone {
        Some(zone_id) => {
            let zone = device
                .zone_mut(zone_id)
                .with_context(|| format!("{} has no zone '{}'", serial, zone_id))?;
            usize::from(mm.set_colour_for_active_effect_zone(zone, hex, position)?)
        }
        None => mm.set_colour_for_active_effect_device(&mut device, hex, position)?,
    };

    if json {
        prismctl::output::print_json(&serde_json::json!({
            "serial": serial,
            "colour": hex,
            "position": position,
            "zones_changed": changed,
        }))?;
    } else if changed == 0 {
        println!(
            "  {} No active effect on {} takes a colour at position {}.",
            "Note:".yellow(),
            serial,
            position
        );
    } else {
        println!("  Set {} on {} zone(s) of {}.", hex.bold(), changed, serial.cyan());
    }
    Ok(())
}

/// Troubleshooter progress shown as a terminal bar.
struct BarProgress(ProgressBar);

impl Progress for BarProgress {
    fn set_max(&mut self, max: u64) {
        self.0.set_length(max);
    }

    fn advance(&mut self) {
        self.0.inc(1);
    }
}

fn cmd_troubleshoot(mm: &Middleman, backend: &str, json: bool) -> Result<()> {
    let i18n = |s: &str| s.to_string();
    let outcome = if json {
        mm.troubleshoot(backend, &i18n, &mut NoProgress)
    } else {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template("  {msg} [{bar:30}] {pos}/{len}") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(format!("Checking {}", backend));
        let mut progress = BarProgress(bar.clone());
        let outcome = mm.troubleshoot(backend, &i18n, &mut progress);
        bar.finish_and_clear();
        outcome
    };

    if json {
        prismctl::output::print_json(&outcome)?;
    } else {
        prismctl::output::print_troubleshoot(backend, &outcome);
    }
    if let TroubleshootOutcome::Failed(reason) = outcome {
        anyhow::bail!("troubleshooter for {} failed: {}", backend, reason);
    }
    Ok(())
}

/// Change one laptop setting in place. Modes take `on`.
fn set_laptop_option(device: &mut DeviceItem, uid: &str, value: &str) -> Result<()> {
    let zone = device
        .zones
        .iter_mut()
        .find(|z| z.option(uid).is_some())
        .with_context(|| format!("No laptop setting named '{}'", uid))?;

    if matches!(zone.option(uid), Some(ControlOption::Effect(_))) {
        if value != "on" {
            anyhow::bail!("'{}' is a mode; select it with `on`", uid);
        }
        zone.activate_effect(uid, None)?;
        return Ok(());
    }

    match zone.option_mut(uid) {
        Some(ControlOption::Slider(slider)) => {
            let parsed: i32 = value
                .parse()
                .with_context(|| format!("'{}' is not a whole number", value))?;
            slider.set_value(parsed)?;
        }
        Some(ControlOption::Toggle(toggle)) => {
            let active = match value {
                "on" | "true" | "1" => true,
                "off" | "false" | "0" => false,
                other => anyhow::bail!("'{}' is not on or off", other),
            };
            toggle.set(active)?;
        }
        Some(ControlOption::MultipleChoice(choice)) => choice.choose(value)?,
        Some(ControlOption::Effect(_)) | None => {}
    }
    Ok(())
}

fn laptop_device(mm: &Middleman) -> Result<DeviceItem> {
    mm.get_backend(undervolt::BACKEND_ID)
        .and_then(|b| b.get_device_by_serial(undervolt::DEVICE_SERIAL))
        .context("Laptop power controls did not report a device")
}

fn cmd_laptop(mm: &mut Middleman, action: LaptopAction, json: bool) -> Result<()> {
    let id = undervolt::BACKEND_ID;
    if !mm.is_backend_running(id) {
        anyhow::bail!(
            "Laptop power controls are not available. Run `prismctl backends` for details."
        );
    }

    let message = match action {
        LaptopAction::Show => {
            let device = laptop_device(mm)?;
            if json {
                prismctl::output::print_json(&device)?;
            } else {
                prismctl::output::print_device(&device);
            }
            return Ok(());
        }
        LaptopAction::Set { uid, value } => {
            let mut device = laptop_device(mm)?;
            set_laptop_option(&mut device, &uid, &value)?;
            mm.save_backend(id)?;
            mm.invalidate_cache();
            format!("Set {} to {} and saved.", uid, value)
        }
        LaptopAction::Apply => {
            mm.apply_backend(id)?;
            "Applied laptop power settings.".to_string()
        }
        LaptopAction::Save => {
            mm.save_backend(id)?;
            "Saved laptop power settings.".to_string()
        }
        LaptopAction::Load => {
            mm.load_backend(id)?;
            "Loaded saved laptop power settings.".to_string()
        }
        LaptopAction::Reset => {
            mm.reset_backend(id)?;
            mm.save_backend(id)?;
            "Restored default laptop power settings.".to_string()
        }
    };

    if json {
        prismctl::output::print_json(&serde_json::json!({ "ok": true, "message": message }))?;
    } else {
        println!("  {}", message.green());
    }
    Ok(())
}
