//! Razer devices driven through the OpenRazer kernel drivers.
//!
//! Each bound HID interface appears under `sys/bus/hid/drivers/<driver>/`
//! with attributes such as `device_type`, `device_serial` and
//! `matrix_effect_static`. Effects are written straight to those files.

pub mod effects;
pub mod state;

use super::{Backend, BackendContext, BackendInfo, LoadError};
use crate::error::Result;
use crate::model::{DeviceItem, FormFactor, UnknownDeviceItem};
use crate::sysfs::SysfsRoot;
use state::StateStore;
use std::collections::BTreeSet;

pub const BACKEND_ID: &str = "openrazer";

pub const RAZER_VID: &str = "1532";

const HID_DRIVERS: &str = "sys/bus/hid/drivers";
const USB_DEVICES: &str = "sys/bus/usb/devices";

/// Driver name, form factor id, form factor label.
pub const DRIVERS: &[(&str, &str, &str)] = &[
    ("razerkbd", "keyboard", "Keyboard"),
    ("razermouse", "mouse", "Mouse"),
    ("razeraccessory", "accessory", "Accessory"),
    ("razerkraken", "headset", "Headset"),
];

/// A HID interface bound to one of the OpenRazer drivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundInterface {
    pub driver: &'static str,
    pub dir: String,
    pub vid: String,
    pub pid: String,
}

/// Split a HID id like `0003:1532:0203.0001` into vendor and product.
pub fn parse_hid_id(hid: &str) -> Option<(String, String)> {
    let mut parts = hid.split(':');
    let _bus = parts.next()?;
    let vid = parts.next()?;
    let pid = parts.next()?.split('.').next()?;
    if vid.len() != 4 || pid.len() != 4 || parts.next().is_some() {
        return None;
    }
    Some((vid.to_ascii_lowercase(), pid.to_ascii_lowercase()))
}

pub fn driver_registered(sysfs: &SysfsRoot) -> bool {
    DRIVERS
        .iter()
        .any(|(driver, _, _)| sysfs.exists(format!("{}/{}", HID_DRIVERS, driver)))
}

pub fn module_loaded(sysfs: &SysfsRoot) -> bool {
    DRIVERS
        .iter()
        .any(|(driver, _, _)| sysfs.exists(format!("sys/module/{}", driver)))
}

/// Every Razer HID interface bound to an OpenRazer driver, in driver order.
pub fn bound_interfaces(sysfs: &SysfsRoot) -> Vec<BoundInterface> {
    let mut found = Vec::new();
    for (driver, _, _) in DRIVERS {
        let base = format!("{}/{}", HID_DRIVERS, driver);
        let Ok(entries) = sysfs.list_subdirs(&base) else {
            continue;
        };
        for entry in entries {
            if let Some((vid, pid)) = parse_hid_id(&entry)
                && vid == RAZER_VID
            {
                found.push(BoundInterface {
                    driver,
                    dir: format!("{}/{}", base, entry),
                    vid,
                    pid,
                });
            }
        }
    }
    found
}

/// Razer USB devices that no OpenRazer driver has claimed.
pub fn unbound_usb_devices(sysfs: &SysfsRoot, bound: &[BoundInterface]) -> Vec<UnknownDeviceItem> {
    let bound_pids: BTreeSet<&str> = bound.iter().map(|b| b.pid.as_str()).collect();
    let mut seen = BTreeSet::new();
    let mut unknown = Vec::new();

    let Ok(entries) = sysfs.list_dir(USB_DEVICES) else {
        return unknown;
    };
    for entry in entries {
        let base = format!("{}/{}", USB_DEVICES, entry);
        let read = |name: &str| sysfs.attr(&base, name);
        let (Some(vid), Some(pid)) = (read("idVendor"), read("idProduct")) else {
            continue;
        };
        let (vid, pid) = (vid.to_ascii_lowercase(), pid.to_ascii_lowercase());
        if vid != RAZER_VID || bound_pids.contains(pid.as_str()) || !seen.insert(pid.clone()) {
            continue;
        }
        unknown.push(UnknownDeviceItem {
            name: read("product").unwrap_or_else(|| "Unknown Razer device".to_string()),
            vid,
            pid,
            backend_id: BACKEND_ID.to_string(),
        });
    }
    unknown
}

pub fn load(ctx: &BackendContext) -> std::result::Result<Box<dyn Backend>, LoadError> {
    if !module_loaded(&ctx.sysfs) && !driver_registered(&ctx.sysfs) {
        return Err(LoadError::NotInstalled);
    }
    Ok(Box::new(OpenRazerBackend::new(ctx.clone())))
}

#[derive(Debug)]
pub struct OpenRazerBackend {
    ctx: BackendContext,
    store: StateStore,
    version: String,
}

impl OpenRazerBackend {
    pub fn new(ctx: BackendContext) -> Self {
        let version = DRIVERS
            .iter()
            .find_map(|(driver, _, _)| {
                ctx.sysfs.attr(&format!("sys/module/{}", driver), "version")
            })
            .unwrap_or_else(|| "unknown".to_string());
        let store = StateStore::new(&ctx.data_dir);
        Self {
            ctx,
            store,
            version,
        }
    }

    fn build_device(&self, iface: &BoundInterface) -> Result<Option<DeviceItem>> {
        let sysfs = &self.ctx.sysfs;
        let attr = |name: &str| sysfs.attr(&iface.dir, name);

        // Interfaces without a name or serial carry no controls.
        let (Some(name), Some(serial)) = (attr("device_type"), attr("device_serial")) else {
            return Ok(None);
        };

        let form_factor = DRIVERS
            .iter()
            .find(|(driver, _, _)| *driver == iface.driver)
            .map(|(_, id, label)| FormFactor::new(id, label))
            .unwrap_or_else(FormFactor::unrecognised);

        let mut device = DeviceItem::new(&name, &serial, form_factor, BACKEND_ID);
        device.firmware_version = attr("firmware_version");
        device.vid = Some(iface.vid.clone());
        device.pid = Some(iface.pid.clone());

        for spec in effects::ZONES {
            if let Some(zone) = effects::build_zone(sysfs, &iface.dir, &serial, spec, &self.store)? {
                device.zones.push(zone);
            }
        }

        if let Err(e) = device.refresh() {
            tracing::warn!(device = %device.name, error = %e, "could not read device state");
        }
        Ok(Some(device))
    }
}

impl Backend for OpenRazerBackend {
    fn backend_id(&self) -> &str {
        BACKEND_ID
    }

    fn name(&self) -> &str {
        "OpenRazer"
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            project_url: "https://openrazer.github.io".to_string(),
            bug_url: "https://github.com/openrazer/openrazer/issues".to_string(),
            releases_url: "https://github.com/openrazer/openrazer/releases".to_string(),
            license: "GPLv2".to_string(),
        }
    }

    fn init(&mut self) -> bool {
        let registered = driver_registered(&self.ctx.sysfs);
        if !registered {
            tracing::info!("OpenRazer module present but no driver registered");
        }
        registered
    }

    fn get_devices(&self) -> Result<Vec<DeviceItem>> {
        let mut devices: Vec<DeviceItem> = Vec::new();
        for iface in bound_interfaces(&self.ctx.sysfs) {
            if let Some(device) = self.build_device(&iface)? {
                // Composite devices bind several interfaces with the same serial.
                if devices.iter().all(|d| d.serial != device.serial) {
                    devices.push(device);
                }
            }
        }
        Ok(devices)
    }

    fn get_unsupported_devices(&self) -> Vec<UnknownDeviceItem> {
        let bound = bound_interfaces(&self.ctx.sysfs);
        unbound_usb_devices(&self.ctx.sysfs, &bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Colour, Control, ControlOption};
    use std::fs;
    use std::path::Path;

    fn add_keyboard(root: &Path) -> std::path::PathBuf {
        let dir = root.join("sys/bus/hid/drivers/razerkbd/0003:1532:0203.0001");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("device_type"), "Razer BlackWidow Chroma\n").unwrap();
        fs::write(dir.join("device_serial"), "IO0000000000001\n").unwrap();
        fs::write(dir.join("firmware_version"), "v1.0\n").unwrap();
        fs::write(dir.join("matrix_brightness"), "255\n").unwrap();
        for effect in ["none", "static", "spectrum", "wave", "breath", "reactive"] {
            fs::write(dir.join(format!("matrix_effect_{}", effect)), "").unwrap();
        }
        // second interface of the same keyboard
        let second = root.join("sys/bus/hid/drivers/razerkbd/0003:1532:0203.0002");
        fs::create_dir_all(&second).unwrap();
        fs::write(second.join("device_type"), "Razer BlackWidow Chroma\n").unwrap();
        fs::write(second.join("device_serial"), "IO0000000000001\n").unwrap();
        fs::create_dir_all(root.join("sys/module/razerkbd")).unwrap();
        fs::write(root.join("sys/module/razerkbd/version"), "3.5.1\n").unwrap();
        dir
    }

    fn ctx(root: &Path) -> BackendContext {
        BackendContext::new(SysfsRoot::new(root), root.join("data"))
    }

    #[test]
    fn test_parse_hid_id() {
        assert_eq!(
            parse_hid_id("0003:1532:0203.0001"),
            Some(("1532".to_string(), "0203".to_string()))
        );
        assert_eq!(
            parse_hid_id("0003:1532:00A5.000B"),
            Some(("1532".to_string(), "00a5".to_string()))
        );
        assert_eq!(parse_hid_id("bind"), None);
        assert_eq!(parse_hid_id("0003:1532"), None);
    }

    #[test]
    fn test_load_not_installed() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(load(&ctx(tmp.path())).unwrap_err(), LoadError::NotInstalled);
    }

    #[test]
    fn test_init_needs_registered_driver() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("sys/module/razermouse")).unwrap();
        let mut backend = load(&ctx(tmp.path())).unwrap();
        assert!(!backend.init());
        assert_eq!(backend.version(), "unknown");

        add_keyboard(tmp.path());
        assert!(backend.init());
    }

    #[test]
    fn test_discovers_and_dedups_devices() {
        let tmp = tempfile::tempdir().unwrap();
        add_keyboard(tmp.path());
        let backend = OpenRazerBackend::new(ctx(tmp.path()));
        assert_eq!(backend.version(), "3.5.1");

        let devices = backend.get_devices().unwrap();
        assert_eq!(devices.len(), 1);
        let kbd = &devices[0];
        assert_eq!(kbd.name, "Razer BlackWidow Chroma");
        assert_eq!(kbd.form_factor.id, "keyboard");
        assert_eq!(kbd.pid.as_deref(), Some("0203"));
        assert_eq!(kbd.firmware_version.as_deref(), Some("v1.0"));
        assert_eq!(kbd.zones.len(), 1);
        assert_eq!(kbd.zones[0].options().len(), 7);
        assert!(kbd.zones[0].active_effect().is_none());
        assert!(backend.get_device_by_serial("IO0000000000001").is_some());
        assert!(backend.get_device_by_name("Razer Naga").is_none());
    }

    #[test]
    fn test_effect_write_is_remembered() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = add_keyboard(tmp.path());
        let backend = OpenRazerBackend::new(ctx(tmp.path()));

        let mut kbd = backend.get_devices().unwrap().remove(0);
        let zone = kbd.zone_mut("main").unwrap();
        zone.option_mut("static")
            .unwrap()
            .set_colour(0, Colour::new(0x12, 0x34, 0x56))
            .unwrap();
        zone.activate_effect("static", None).unwrap();
        assert_eq!(
            fs::read(dir.join("matrix_effect_static")).unwrap(),
            vec![0x12, 0x34, 0x56]
        );

        let fresh = backend.get_devices().unwrap().remove(0);
        let active = fresh.zone("main").unwrap().active_effect().unwrap();
        assert_eq!(active.uid(), "static");
        assert_eq!(active.common().colours[0], Colour::new(0x12, 0x34, 0x56));
    }

    #[test]
    fn test_brightness_read_and_write() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = add_keyboard(tmp.path());
        fs::write(dir.join("matrix_brightness"), "128\n").unwrap();
        let backend = OpenRazerBackend::new(ctx(tmp.path()));

        let mut kbd = backend.get_devices().unwrap().remove(0);
        match kbd.zone_mut("main").unwrap().option_mut("brightness") {
            Some(ControlOption::Slider(s)) => {
                assert_eq!(s.value, 50);
                s.set_value(100).unwrap();
            }
            _ => panic!("no brightness slider"),
        }
        assert_eq!(fs::read_to_string(dir.join("matrix_brightness")).unwrap(), "255");
    }

    #[test]
    fn test_unsupported_devices() {
        let tmp = tempfile::tempdir().unwrap();
        add_keyboard(tmp.path());
        let usb = tmp.path().join("sys/bus/usb/devices");
        for (entry, vid, pid, product) in [
            ("1-1", "1532", "0203", Some("BlackWidow Chroma")),
            ("1-2", "1532", "0f99", Some("Mystery Mat")),
            ("1-3", "046d", "c52b", None),
        ] {
            fs::create_dir_all(usb.join(entry)).unwrap();
            fs::write(usb.join(entry).join("idVendor"), vid).unwrap();
            fs::write(usb.join(entry).join("idProduct"), pid).unwrap();
            if let Some(p) = product {
                fs::write(usb.join(entry).join("product"), p).unwrap();
            }
        }
        fs::create_dir_all(usb.join("1-2:1.0")).unwrap();

        let backend = OpenRazerBackend::new(ctx(tmp.path()));
        let unknown = backend.get_unsupported_devices();
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].name, "Mystery Mat");
        assert_eq!(unknown[0].pid, "0f99");
    }
}
