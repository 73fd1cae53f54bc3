use super::state::{StateStore, ZoneState};
use crate::error::{Error, Result};
use crate::model::{
    Colour, ControlSink, ControlValue, EffectOption, Parameter, ParameterSet, SliderOption, Zone,
};
use crate::sysfs::SysfsRoot;
use std::sync::Arc;

/// A lighting region as the kernel driver exposes it.
#[derive(Debug, Clone, Copy)]
pub struct ZoneSpec {
    pub id: &'static str,
    pub label: &'static str,
    /// Effect attributes are `<prefix><effect>`, e.g. `logo_matrix_effect_wave`.
    pub effect_prefix: &'static str,
    pub brightness: &'static str,
}

pub const ZONES: &[ZoneSpec] = &[
    ZoneSpec {
        id: "main",
        label: "Main",
        effect_prefix: "matrix_effect_",
        brightness: "matrix_brightness",
    },
    ZoneSpec {
        id: "logo",
        label: "Logo",
        effect_prefix: "logo_matrix_effect_",
        brightness: "logo_led_brightness",
    },
    ZoneSpec {
        id: "scroll",
        label: "Scroll Wheel",
        effect_prefix: "scroll_matrix_effect_",
        brightness: "scroll_led_brightness",
    },
    ZoneSpec {
        id: "backlight",
        label: "Backlight",
        effect_prefix: "backlight_matrix_effect_",
        brightness: "backlight_led_brightness",
    },
];

pub const EFFECTS: &[(&str, &str)] = &[
    ("none", "None"),
    ("spectrum", "Spectrum"),
    ("wave", "Wave"),
    ("reactive", "Reactive"),
    ("breath", "Breath"),
    ("static", "Static"),
];

pub const BRIGHTNESS_UID: &str = "brightness";

const DEFAULT_PRIMARY: Colour = Colour::new(0x00, 0xff, 0x00);
const DEFAULT_SECONDARY: Colour = Colour::new(0x00, 0xff, 0xff);

fn effect_parameters(effect: &str) -> Result<ParameterSet> {
    let items = match effect {
        "wave" => vec![
            Parameter::new("left", "Left", "1").as_default(),
            Parameter::new("right", "Right", "2"),
        ],
        "breath" => vec![
            Parameter::new("random", "Random", "random"),
            Parameter::new("single", "Single", "single")
                .with_colours(1)
                .as_default(),
            Parameter::new("dual", "Dual", "dual").with_colours(2),
        ],
        "reactive" => vec![
            Parameter::new("short", "Short", "1").with_colours(1),
            Parameter::new("medium", "Medium", "2")
                .with_colours(1)
                .as_default(),
            Parameter::new("long", "Long", "3").with_colours(1),
        ],
        _ => Vec::new(),
    };
    ParameterSet::new(items)
}

fn effect_colours(effect: &str) -> (Vec<Colour>, usize) {
    match effect {
        "static" | "reactive" => (vec![DEFAULT_PRIMARY], 1),
        "breath" => (vec![DEFAULT_PRIMARY, DEFAULT_SECONDARY], 1),
        _ => (Vec::new(), 0),
    }
}

fn colour_at(colours: &[Colour], index: usize, effect: &str) -> Result<Colour> {
    colours.get(index).copied().ok_or_else(|| Error::InvalidValue {
        uid: effect.to_string(),
        detail: format!("needs at least {} colour(s)", index + 1),
    })
}

/// Encode an effect for its driver attribute.
pub fn encode_effect(effect: &str, parameter: Option<&str>, colours: &[Colour]) -> Result<Vec<u8>> {
    match effect {
        "none" | "spectrum" => Ok(b"1".to_vec()),
        "wave" => Ok(parameter.unwrap_or("1").as_bytes().to_vec()),
        "static" => Ok(colour_at(colours, 0, effect)?.to_bytes().to_vec()),
        "breath" => match parameter.unwrap_or("single") {
            "random" => Ok(vec![1]),
            "single" => Ok(colour_at(colours, 0, effect)?.to_bytes().to_vec()),
            "dual" => {
                let mut payload = colour_at(colours, 0, effect)?.to_bytes().to_vec();
                payload.extend(colour_at(colours, 1, effect)?.to_bytes());
                Ok(payload)
            }
            other => Err(Error::InvalidValue {
                uid: effect.to_string(),
                detail: format!("unknown breath mode '{}'", other),
            }),
        },
        "reactive" => {
            let speed: u8 = parameter
                .unwrap_or("2")
                .parse()
                .map_err(|_| Error::InvalidValue {
                    uid: effect.to_string(),
                    detail: "speed must be 1-3".to_string(),
                })?;
            let mut payload = vec![speed];
            payload.extend(colour_at(colours, 0, effect)?.to_bytes());
            Ok(payload)
        }
        other => Err(Error::InvalidValue {
            uid: other.to_string(),
            detail: "unknown effect".to_string(),
        }),
    }
}

/// Driver brightness is 0-255; sliders show percent.
pub fn percent_to_raw(percent: i32) -> u8 {
    ((percent.clamp(0, 100) as f64) * 255.0 / 100.0).round() as u8
}

pub fn raw_to_percent(raw: u8) -> i32 {
    ((raw as f64) * 100.0 / 255.0).round() as i32
}

/// Writes one zone's options to the driver and remembers the last effect.
#[derive(Debug)]
pub struct ZoneSink {
    sysfs: SysfsRoot,
    device_dir: String,
    serial: String,
    zone: ZoneSpec,
    store: StateStore,
}

impl ZoneSink {
    fn attribute(&self, name: &str) -> String {
        format!("{}/{}", self.device_dir, name)
    }
}

impl ControlSink for ZoneSink {
    fn write(&self, uid: &str, value: &ControlValue) -> Result<()> {
        match value {
            ControlValue::Slider { value } if uid == BRIGHTNESS_UID => self.sysfs.write(
                self.attribute(self.zone.brightness),
                &percent_to_raw(*value).to_string(),
            ),
            ControlValue::Effect { parameter, colours } => {
                let payload = encode_effect(uid, parameter.as_deref(), colours)?;
                self.sysfs.write_bytes(
                    self.attribute(&format!("{}{}", self.zone.effect_prefix, uid)),
                    &payload,
                )?;
                self.store.record(
                    &self.serial,
                    self.zone.id,
                    ZoneState {
                        effect: uid.to_string(),
                        parameter: parameter.clone(),
                        colours: colours.clone(),
                    },
                )
            }
            other => Err(Error::InvalidValue {
                uid: uid.to_string(),
                detail: format!("unsupported value {:?}", other),
            }),
        }
    }

    fn read(&self, uid: &str) -> Result<Option<ControlValue>> {
        if uid == BRIGHTNESS_UID {
            return Ok(self
                .sysfs
                .read_optional(self.attribute(self.zone.brightness))?
                .and_then(|raw| raw.parse::<u8>().ok())
                .map(|raw| ControlValue::Slider {
                    value: raw_to_percent(raw),
                }));
        }
        Ok(self.store.get(&self.serial, self.zone.id)?.map(|state| {
            if state.effect == uid {
                ControlValue::Effect {
                    parameter: state.parameter,
                    colours: state.colours,
                }
            } else {
                ControlValue::Inactive
            }
        }))
    }
}

/// Build the zone for `spec` from the attributes present in `device_dir`,
/// or None if the device has no such zone.
pub fn build_zone(
    sysfs: &SysfsRoot,
    device_dir: &str,
    serial: &str,
    spec: &ZoneSpec,
    store: &StateStore,
) -> Result<Option<Zone>> {
    let has = |name: &str| sysfs.exists(format!("{}/{}", device_dir, name));

    let effects: Vec<_> = EFFECTS
        .iter()
        .filter(|(effect, _)| has(&format!("{}{}", spec.effect_prefix, effect)))
        .collect();
    let has_brightness = has(spec.brightness);
    if effects.is_empty() && !has_brightness {
        return Ok(None);
    }

    let sink: Arc<dyn ControlSink> = Arc::new(ZoneSink {
        sysfs: sysfs.clone(),
        device_dir: device_dir.to_string(),
        serial: serial.to_string(),
        zone: *spec,
        store: store.clone(),
    });

    let mut zone = Zone::new(spec.id, spec.label);
    if has_brightness {
        zone.push(
            SliderOption::new(BRIGHTNESS_UID, "Brightness", sink.clone(), 0, 100)
                .with_suffix("%", "%")
                .with_step(5)
                .with_value(100),
        )?;
    }
    for (effect, label) in effects {
        let (colours, required) = effect_colours(effect);
        zone.push(
            EffectOption::new(effect, label, sink.clone())
                .with_parameters(effect_parameters(effect)?)
                .with_colours(colours, required),
        )?;
    }
    Ok(Some(zone))
}
