use super::{CheckResult, Progress, TroubleshootContext};
use crate::backend::openrazer::{self as razer, BoundInterface};
use crate::error::Result;
use crate::sysfs::SysfsRoot;

const CHECKS: u64 = 5;
const GROUP: &str = "plugdev";

/// Members of `group` listed in `etc/group`, or None if the group is absent
/// or the file cannot be read.
fn group_members(sysfs: &SysfsRoot, group: &str) -> Option<Vec<String>> {
    let content = sysfs.read_optional("etc/group").unwrap_or(None)?;
    content.lines().find_map(|line| {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() == 4 && fields[0] == group {
            Some(
                fields[3]
                    .split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(String::from)
                    .collect(),
            )
        } else {
            None
        }
    })
}

fn current_user() -> Option<String> {
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .ok()
        .flatten()
        .map(|u| u.name)
}

fn check_module(ctx: &TroubleshootContext<'_>) -> CheckResult {
    let t = ctx.i18n;
    let name = t("OpenRazer kernel module is loaded");
    if razer::module_loaded(ctx.sysfs) {
        CheckResult::pass(name)
    } else {
        CheckResult::fail(
            name,
            vec![
                t("Install the openrazer-driver-dkms package and reboot"),
                t("Load the driver manually: sudo modprobe razerkbd"),
                t("If Secure Boot is enabled, the DKMS module must be signed"),
            ],
        )
    }
}

fn check_bound(ctx: &TroubleshootContext<'_>, bound: &[BoundInterface]) -> CheckResult {
    let t = ctx.i18n;
    let name = t("Razer devices are bound to the driver");
    if !razer::module_loaded(ctx.sysfs) {
        CheckResult::skipped(name)
    } else if bound.is_empty() {
        CheckResult::fail(
            name,
            vec![
                t("Reconnect the device"),
                t("Check the device is supported by the installed OpenRazer version"),
            ],
        )
    } else {
        CheckResult::pass(name)
    }
}

fn check_unsupported(ctx: &TroubleshootContext<'_>, bound: &[BoundInterface]) -> CheckResult {
    let t = ctx.i18n;
    let name = t("All connected Razer devices are supported");
    let unknown = razer::unbound_usb_devices(ctx.sysfs, bound);
    if unknown.is_empty() {
        return CheckResult::pass(name);
    }
    let mut suggestions: Vec<String> = unknown
        .iter()
        .map(|d| format!("{} ({}:{})", d.name, d.vid, d.pid))
        .collect();
    suggestions.push(t("Update OpenRazer, or report the device to the OpenRazer project"));
    CheckResult::fail(name, suggestions)
}

fn check_group(ctx: &TroubleshootContext<'_>) -> CheckResult {
    let t = ctx.i18n;
    let name = t("User is in the plugdev group");
    match (group_members(ctx.sysfs, GROUP), current_user()) {
        (Some(members), Some(user)) if members.contains(&user) => CheckResult::pass(name),
        (Some(_), Some(user)) => CheckResult::fail(
            name,
            vec![format!("sudo gpasswd -a {} {}", user, GROUP), t("Log out and back in")],
        ),
        (Some(_), None) => CheckResult::skipped(name),
        (None, _) => CheckResult::fail(
            name,
            vec![t("The plugdev group does not exist. Reinstall the OpenRazer packages")],
        ),
    }
}

fn check_serials(ctx: &TroubleshootContext<'_>, bound: &[BoundInterface]) -> CheckResult {
    let t = ctx.i18n;
    let name = t("Device serials are readable");
    let named: Vec<&BoundInterface> = bound
        .iter()
        .filter(|b| ctx.sysfs.has_attr(&b.dir, "device_type"))
        .collect();
    if named.is_empty() {
        return CheckResult::skipped(name);
    }
    let unreadable: Vec<String> = named
        .iter()
        .filter(|b| ctx.sysfs.attr(&b.dir, "device_serial").is_none())
        .map(|b| b.dir.clone())
        .collect();
    if unreadable.is_empty() {
        CheckResult::pass(name)
    } else {
        let mut suggestions = unreadable;
        suggestions.push(t("Check permissions on the device attributes"));
        CheckResult::fail(name, suggestions)
    }
}

/// Diagnose why OpenRazer devices might not be working.
pub fn troubleshoot(
    ctx: &TroubleshootContext<'_>,
    progress: &mut dyn Progress,
) -> Result<Vec<CheckResult>> {
    progress.set_max(CHECKS);
    let bound = razer::bound_interfaces(ctx.sysfs);
    let mut results = Vec::new();

    results.push(check_module(ctx));
    progress.advance();
    results.push(check_bound(ctx, &bound));
    progress.advance();
    results.push(check_unsupported(ctx, &bound));
    progress.advance();
    results.push(check_group(ctx));
    progress.advance();
    results.push(check_serials(ctx, &bound));
    progress.advance();

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[derive(Default)]
    struct Counter {
        max: u64,
        done: u64,
    }

    impl Progress for Counter {
        fn set_max(&mut self, max: u64) {
            self.max = max;
        }
        fn advance(&mut self) {
            self.done += 1;
        }
    }

    fn run(root: &std::path::Path) -> (Vec<CheckResult>, Counter) {
        let sysfs = SysfsRoot::new(root);
        let i18n = |s: &str| s.to_string();
        let ctx = TroubleshootContext {
            sysfs: &sysfs,
            i18n: &i18n,
        };
        let mut counter = Counter::default();
        let results = troubleshoot(&ctx, &mut counter).unwrap();
        (results, counter)
    }

    #[test]
    fn test_nothing_installed() {
        let tmp = tempfile::tempdir().unwrap();
        let (results, counter) = run(tmp.path());

        assert_eq!(results.len(), 5);
        assert_eq!(counter.max, 5);
        assert_eq!(counter.done, 5);
        assert_eq!(results[0].passed, Some(false));
        assert!(!results[0].suggestions.is_empty());
        assert_eq!(results[1].passed, None);
        assert_eq!(results[2].passed, Some(true));
        // no etc/group in the fake root
        assert_eq!(results[3].passed, Some(false));
        assert_eq!(results[4].passed, None);
    }

    #[test]
    fn test_working_install() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("sys/module/razermouse")).unwrap();
        let dev = root.join("sys/bus/hid/drivers/razermouse/0003:1532:0084.0003");
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join("device_type"), "Razer DeathAdder V2\n").unwrap();
        fs::write(dev.join("device_serial"), "PM2000000000001\n").unwrap();

        let (results, _) = run(root);
        assert_eq!(results[0].passed, Some(true));
        assert_eq!(results[1].passed, Some(true));
        assert_eq!(results[2].passed, Some(true));
        assert_eq!(results[4].passed, Some(true));
    }

    #[test]
    fn test_unsupported_and_unreadable() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("sys/module/razerkbd")).unwrap();
        let dev = root.join("sys/bus/hid/drivers/razerkbd/0003:1532:0203.0001");
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join("device_type"), "Razer BlackWidow Chroma\n").unwrap();
        let usb = root.join("sys/bus/usb/devices/3-1");
        fs::create_dir_all(&usb).unwrap();
        fs::write(usb.join("idVendor"), "1532\n").unwrap();
        fs::write(usb.join("idProduct"), "0f0d\n").unwrap();

        let (results, _) = run(root);
        assert_eq!(results[2].passed, Some(false));
        assert!(results[2].suggestions[0].contains("1532:0f0d"));
        assert_eq!(results[4].passed, Some(false));
    }

    #[test]
    fn test_group_members() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("etc")).unwrap();
        fs::write(
            tmp.path().join("etc/group"),
            "root:x:0:\nplugdev:x:46:alice, bob\nwheel:x:10:alice\n",
        )
        .unwrap();
        let sysfs = SysfsRoot::new(tmp.path());
        assert_eq!(
            group_members(&sysfs, "plugdev"),
            Some(vec!["alice".to_string(), "bob".to_string()])
        );
        assert_eq!(group_members(&sysfs, "root"), Some(Vec::new()));
        assert_eq!(group_members(&sysfs, "video"), None);
    }
}
