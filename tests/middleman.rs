use prismctl::backend::undervolt;
use prismctl::config::{BackendsConfig, PathsConfig, PrismConfig, SoftwareEffectsConfig};
use prismctl::middleman::{BackendState, InitFailure, Middleman, ReplayOutcome};
use prismctl::model::ControlOption;
use prismctl::procpid::{ProcState, SoftwareEffect};
use prismctl::sysfs::SysfsRoot;
use prismctl::troubleshoot::{NoProgress, TroubleshootOutcome};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const KBD_SERIAL: &str = "IO0000000000001";
const KBD_DIR: &str = "sys/bus/hid/drivers/razerkbd/0003:1532:0226.0001";

/// A desktop with a Razer Huntsman Elite on the kernel driver, an Intel CPU
/// and a battery with a firmware charge limit.
fn create_fixture(root: &Path) {
    let kbd = root.join(KBD_DIR);
    fs::create_dir_all(&kbd).unwrap();
    fs::write(kbd.join("device_type"), "Razer Huntsman Elite\n").unwrap();
    fs::write(kbd.join("device_serial"), format!("{}\n", KBD_SERIAL)).unwrap();
    fs::write(kbd.join("firmware_version"), "v1.02\n").unwrap();
    fs::write(kbd.join("matrix_brightness"), "255\n").unwrap();
    for effect in ["none", "spectrum", "wave", "reactive", "breath", "static"] {
        fs::write(kbd.join(format!("matrix_effect_{}", effect)), "").unwrap();
    }
    fs::write(kbd.join("logo_led_brightness"), "128\n").unwrap();
    fs::write(kbd.join("logo_matrix_effect_static"), "").unwrap();
    fs::write(kbd.join("logo_matrix_effect_spectrum"), "").unwrap();

    let module = root.join("sys/module/razerkbd");
    fs::create_dir_all(&module).unwrap();
    fs::write(module.join("version"), "3.6.1\n").unwrap();

    let usb = root.join("sys/bus/usb/devices");
    for (entry, pid, product) in [("1-4", "0226", "Huntsman Elite"), ("1-5", "0c02", "Goliathus")] {
        fs::create_dir_all(usb.join(entry)).unwrap();
        fs::write(usb.join(entry).join("idVendor"), "1532\n").unwrap();
        fs::write(usb.join(entry).join("idProduct"), format!("{}\n", pid)).unwrap();
        fs::write(usb.join(entry).join("product"), format!("{}\n", product)).unwrap();
    }

    fs::create_dir_all(root.join("proc")).unwrap();
    fs::write(
        root.join("proc/cpuinfo"),
        "processor\t: 0\nvendor_id\t: GenuineIntel\nmodel name\t: Intel(R) Core(TM) i7-9750H CPU @ 2.60GHz\n\n",
    )
    .unwrap();

    let bat = root.join("sys/class/power_supply/BAT0");
    fs::create_dir_all(&bat).unwrap();
    fs::write(bat.join("type"), "Battery\n").unwrap();
    fs::write(bat.join("present"), "1\n").unwrap();
    fs::write(bat.join("capacity"), "77\n").unwrap();
    fs::write(bat.join("charge_control_end_threshold"), "80\n").unwrap();

    fs::create_dir_all(root.join("etc")).unwrap();
    fs::write(root.join("etc/group"), "root:x:0:\nplugdev:x:46:\n").unwrap();
}

struct Env {
    tmp: TempDir,
}

impl Env {
    fn new(with_hardware: bool) -> Self {
        let tmp = TempDir::new().unwrap();
        if with_hardware {
            create_fixture(&tmp.path().join("root"));
        } else {
            fs::create_dir_all(tmp.path().join("root")).unwrap();
        }
        Self { tmp }
    }

    fn root(&self) -> PathBuf {
        self.tmp.path().join("root")
    }

    fn runtime_dir(&self) -> PathBuf {
        self.tmp.path().join("run")
    }

    fn config(&self, enabled: &[&str]) -> PrismConfig {
        PrismConfig {
            backends: BackendsConfig {
                enabled: enabled.iter().map(|s| s.to_string()).collect(),
                init_timeout_secs: 5,
            },
            paths: PathsConfig {
                data_dir: Some(self.tmp.path().join("data")),
                runtime_dir: Some(self.runtime_dir()),
            },
            software_effects: SoftwareEffectsConfig {
                helper: "true".to_string(),
            },
        }
    }

    fn middleman(&self) -> Middleman {
        let mut mm = Middleman::from_config(
            &self.config(&["openrazer", "undervolt", "corsair"]),
            SysfsRoot::new(self.root()),
        );
        mm.init();
        mm
    }
}

#[test]
fn test_backends_are_classified() {
    let env = Env::new(true);
    let mut mm = env.middleman();

    assert_eq!(mm.backend_state("openrazer"), Some(BackendState::Running));
    assert_eq!(mm.backend_state("undervolt"), Some(BackendState::Running));
    assert_eq!(mm.backend_state("corsair"), Some(BackendState::NotInstalled));
    assert!(mm.bad_init().is_empty());
    assert!(mm.import_errors().is_empty());

    let versions = mm.get_versions();
    assert_eq!(versions["openrazer"], "3.6.1");
    assert!(versions.contains_key("undervolt"));

    let summaries = mm.summaries();
    assert_eq!(summaries.len(), 3);
    assert!(summaries[0].troubleshooter);
    assert!(!summaries[1].troubleshooter);

    let serials: Vec<_> = mm.get_devices().iter().map(|d| d.serial.clone()).collect();
    assert_eq!(serials, vec![KBD_SERIAL.to_string(), undervolt::DEVICE_SERIAL.to_string()]);
    assert_eq!(mm.get_devices_by_form_factor("keyboard").len(), 1);
    assert_eq!(mm.get_devices_by_form_factor("mouse").len(), 0);
}

#[test]
fn test_nothing_installed() {
    let env = Env::new(false);
    let mut mm = env.middleman();

    assert_eq!(mm.backend_state("openrazer"), Some(BackendState::NotInstalled));
    assert_eq!(
        mm.backend_state("undervolt"),
        Some(BackendState::BadInit(InitFailure::Refused))
    );
    assert!(mm.get_devices().is_empty());
    assert!(mm.get_device_by_name("Razer Huntsman Elite").is_none());

    let i18n = |s: &str| s.to_string();
    match mm.troubleshoot("openrazer", &i18n, &mut NoProgress) {
        TroubleshootOutcome::Results(checks) => {
            assert_eq!(checks.len(), 5);
            assert_eq!(checks[0].passed, Some(false));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(
        mm.troubleshoot("undervolt", &i18n, &mut NoProgress),
        TroubleshootOutcome::NotAvailable
    );
}

#[test]
fn test_unsupported_devices() {
    let env = Env::new(true);
    let mm = env.middleman();
    let unknown = mm.get_unsupported_devices();
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].name, "Goliathus");
    assert_eq!(unknown[0].backend_id, "openrazer");
}

#[test]
fn test_colour_then_replay_restores_hardware() {
    let env = Env::new(true);
    let mm = env.middleman();
    let static_file = env.root().join(KBD_DIR).join("matrix_effect_static");

    let mut kbd = mm.get_device_by_serial(KBD_SERIAL).unwrap();
    assert_eq!(kbd.firmware_version.as_deref(), Some("v1.02"));
    kbd.zone_mut("main")
        .unwrap()
        .activate_effect("static", None)
        .unwrap();

    let changed = mm
        .set_colour_for_active_effect_device(&mut kbd, "#00FF80", 0)
        .unwrap();
    assert_eq!(changed, 1);
    assert_eq!(fs::read(&static_file).unwrap(), vec![0x00, 0xff, 0x80]);

    // something else drew on the keyboard
    fs::write(&static_file, [0x12, 0x12, 0x12]).unwrap();

    let mut fresh = mm.get_device_by_serial(KBD_SERIAL).unwrap();
    let outcome = mm.replay_active_effect(&mut fresh).unwrap();
    assert_eq!(outcome, ReplayOutcome::Hardware { zones: 1 });
    assert_eq!(fs::read(&static_file).unwrap(), vec![0x00, 0xff, 0x80]);

    let active = fresh.zone("main").unwrap().active_effect().unwrap();
    assert_eq!(mm.get_active_colours_required(active), 1);
    assert!(mm.get_active_parameter(active).is_none());
}

#[test]
fn test_software_effect_replay_and_stop() {
    let env = Env::new(true);
    let mm = env.middleman();
    let side = ProcState::new(env.runtime_dir(), "true");
    side.state(KBD_SERIAL)
        .set_effect(SoftwareEffect {
            name: "Ripple".to_string(),
            path: PathBuf::from("/usr/share/prismctl/effects/ripple.json"),
        })
        .unwrap();

    let mut kbd = mm.get_device_by_serial(KBD_SERIAL).unwrap();
    let outcome = mm.replay_active_effect(&mut kbd).unwrap();
    assert_eq!(
        outcome,
        ReplayOutcome::Software {
            path: PathBuf::from("/usr/share/prismctl/effects/ripple.json")
        }
    );
    assert!(env.runtime_dir().join(format!("pids/{}.pid", KBD_SERIAL)).exists());

    mm.stop_software_effect(KBD_SERIAL).unwrap();
    assert!(side.state(KBD_SERIAL).get_effect().unwrap().is_none());
    assert!(!env.runtime_dir().join(format!("pids/{}.pid", KBD_SERIAL)).exists());
}

#[test]
fn test_laptop_settings_survive_restart() {
    let env = Env::new(true);
    let mut mm = env.middleman();

    let mut laptop = mm.get_device_by_serial(undervolt::DEVICE_SERIAL).unwrap();
    match laptop.find_option("battery_charge_limit") {
        Some((_, ControlOption::Slider(s))) => assert_eq!(s.value, 80),
        _ => panic!("battery slider missing"),
    }
    match laptop.zone_mut("fan").unwrap().option_mut("fan_speed") {
        Some(ControlOption::Slider(s)) => s.set_value(3000).unwrap(),
        _ => panic!("fan slider missing"),
    }
    laptop
        .zone_mut("fan")
        .unwrap()
        .activate_effect("fan_manual", None)
        .unwrap();
    mm.apply_backend(undervolt::BACKEND_ID).unwrap();
    mm.save_backend(undervolt::BACKEND_ID).unwrap();

    let mut again = env.middleman();
    let laptop = again.get_device_by_serial(undervolt::DEVICE_SERIAL).unwrap();
    let fan = laptop.zone("fan").unwrap();
    assert_eq!(again.get_active_effect(fan).unwrap().uid(), "fan_manual");
    match fan.option("fan_speed") {
        Some(ControlOption::Slider(s)) => assert_eq!(s.display_value(), "3000 RPMs"),
        _ => panic!("fan slider missing"),
    }

    again.reset_backend(undervolt::BACKEND_ID).unwrap();
    let laptop = again.get_device_by_serial(undervolt::DEVICE_SERIAL).unwrap();
    assert_eq!(
        laptop.zone("fan").unwrap().active_effect().unwrap().uid(),
        "fan_auto"
    );
    assert!(again.restart(undervolt::BACKEND_ID).unwrap());
}
