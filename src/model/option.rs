//! User-adjustable controls inside a zone.
//!
//! Every control is one variant of [`ControlOption`]. Each variant owns its
//! state and knows how to push that state to hardware ([`Control::reapply`])
//! and pull it back ([`Control::refresh`]) through the backend's
//! [`ControlSink`].

use super::colour::Colour;
use super::parameter::{Parameter, ParameterSet};
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A value travelling between an option and its backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlValue {
    Effect {
        parameter: Option<String>,
        colours: Vec<Colour>,
    },
    Slider {
        value: i32,
    },
    Toggle {
        active: bool,
    },
    Choice {
        parameter: Option<String>,
    },
    /// Read-back only: the effect is known to be off.
    Inactive,
}

/// Where an option's writes go. Implemented by each backend.
pub trait ControlSink: Send + Sync + fmt::Debug {
    fn write(&self, uid: &str, value: &ControlValue) -> Result<()>;

    /// Current hardware state for `uid`, or None if the backend cannot tell.
    fn read(&self, _uid: &str) -> Result<Option<ControlValue>> {
        Ok(None)
    }
}

/// Sink for options that only live in memory.
#[derive(Debug, Default)]
pub struct NullSink;

impl ControlSink for NullSink {
    fn write(&self, _uid: &str, _value: &ControlValue) -> Result<()> {
        Ok(())
    }
}

/// Shared capability of every option variant.
pub trait Control {
    fn common(&self) -> &OptionCommon;
    fn common_mut(&mut self) -> &mut OptionCommon;
    /// Send the current state to hardware again, unchanged.
    fn reapply(&self) -> Result<()>;
    /// Pull state back from hardware. Missing readings leave state as is.
    fn refresh(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionCommon {
    pub uid: String,
    pub label: String,
    pub icon: Option<String>,
    pub parameters: ParameterSet,
    pub colours: Vec<Colour>,
    pub colours_required: usize,
    #[serde(skip)]
    sink: Arc<dyn ControlSink>,
}

impl OptionCommon {
    fn new(uid: &str, label: &str, sink: Arc<dyn ControlSink>) -> Self {
        Self {
            uid: uid.to_string(),
            label: label.to_string(),
            icon: None,
            parameters: ParameterSet::default(),
            colours: Vec::new(),
            colours_required: 0,
            sink,
        }
    }

    /// Colours needed by the active parameter, or by the option itself.
    pub fn active_colours_required(&self) -> usize {
        self.parameters
            .active()
            .map_or(self.colours_required, |p| p.colours_required)
    }

    fn active_colours(&self) -> Vec<Colour> {
        let wanted = self.active_colours_required().min(self.colours.len());
        self.colours[..wanted].to_vec()
    }

    fn active_or_first_data(&self) -> Option<String> {
        self.parameters.active_or_first().map(|p| p.data.clone())
    }

    /// Make sure there is an active parameter, preferring the default one.
    fn ensure_active_parameter(&mut self) -> Result<()> {
        if self.parameters.active().is_some() {
            return Ok(());
        }
        let fallback = self.parameters.default_or_first().map(|p| p.uid.clone());
        match fallback {
            Some(uid) => self.parameters.set_active(&uid),
            None => Ok(()),
        }
    }

    fn write(&self, value: &ControlValue) -> Result<()> {
        tracing::debug!(option = %self.uid, ?value, "writing option");
        self.sink.write(&self.uid, value)
    }

    fn read(&self) -> Result<Option<ControlValue>> {
        self.sink.read(&self.uid)
    }
}

/// A lighting effect or a mode button. At most one is active per zone.
#[derive(Debug, Clone, Serialize)]
pub struct EffectOption {
    #[serde(flatten)]
    pub common: OptionCommon,
    pub active: bool,
}

impl EffectOption {
    pub fn new(uid: &str, label: &str, sink: Arc<dyn ControlSink>) -> Self {
        Self {
            common: OptionCommon::new(uid, label, sink),
            active: false,
        }
    }

    pub fn with_parameters(mut self, parameters: ParameterSet) -> Self {
        self.common.parameters = parameters;
        self
    }

    /// `colours` is the initial palette; `required` how many the effect uses
    /// when no parameter overrides it.
    pub fn with_colours(mut self, colours: Vec<Colour>, required: usize) -> Self {
        self.common.colours = colours;
        self.common.colours_required = required;
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Switch the effect on, optionally with a specific parameter. Without
    /// one, the current or default parameter is used.
    pub fn activate(&mut self, parameter: Option<&str>) -> Result<()> {
        match parameter {
            Some(uid) => self.common.parameters.set_active(uid)?,
            None => self.common.ensure_active_parameter()?,
        }
        self.common.write(&self.value())?;
        self.active = true;
        Ok(())
    }

    fn value(&self) -> ControlValue {
        ControlValue::Effect {
            parameter: self.common.active_or_first_data(),
            colours: self.common.active_colours(),
        }
    }
}

impl Control for EffectOption {
    fn common(&self) -> &OptionCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut OptionCommon {
        &mut self.common
    }

    fn reapply(&self) -> Result<()> {
        self.common.write(&self.value())
    }

    fn refresh(&mut self) -> Result<()> {
        match self.common.read()? {
            Some(ControlValue::Effect { parameter, colours }) => {
                self.active = true;
                if let Some(data) = parameter {
                    self.common.parameters.set_active_by_data(&data);
                }
                for (slot, colour) in self.common.colours.iter_mut().zip(colours) {
                    *slot = colour;
                }
            }
            Some(ControlValue::Inactive) => self.active = false,
            _ => {}
        }
        Ok(())
    }
}

/// A bounded integer such as brightness, a voltage offset or a fan speed.
#[derive(Debug, Clone, Serialize)]
pub struct SliderOption {
    #[serde(flatten)]
    pub common: OptionCommon,
    pub value: i32,
    pub min: i32,
    pub max: i32,
    pub step: i32,
    pub suffix: String,
    pub suffix_plural: String,
}

impl SliderOption {
    pub fn new(uid: &str, label: &str, sink: Arc<dyn ControlSink>, min: i32, max: i32) -> Self {
        Self {
            common: OptionCommon::new(uid, label, sink),
            value: min,
            min,
            max,
            step: 1,
            suffix: String::new(),
            suffix_plural: String::new(),
        }
    }

    pub fn with_suffix(mut self, suffix: &str, suffix_plural: &str) -> Self {
        self.suffix = suffix.to_string();
        self.suffix_plural = suffix_plural.to_string();
        self
    }

    pub fn with_step(mut self, step: i32) -> Self {
        self.step = step;
        self
    }

    /// Initial value; clamped into range.
    pub fn with_value(mut self, value: i32) -> Self {
        self.value = value.clamp(self.min, self.max);
        self
    }

    pub fn set_value(&mut self, value: i32) -> Result<()> {
        if value < self.min || value > self.max {
            return Err(Error::InvalidValue {
                uid: self.common.uid.clone(),
                detail: format!("{} outside {}..={}", value, self.min, self.max),
            });
        }
        self.common.write(&ControlValue::Slider { value })?;
        self.value = value;
        Ok(())
    }

    /// Value with its unit, e.g. `1 RPM` / `1200 RPMs`.
    pub fn display_value(&self) -> String {
        let suffix = if self.value == 1 {
            &self.suffix
        } else {
            &self.suffix_plural
        };
        format!("{}{}", self.value, suffix)
    }
}

impl Control for SliderOption {
    fn common(&self) -> &OptionCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut OptionCommon {
        &mut self.common
    }

    fn reapply(&self) -> Result<()> {
        self.common.write(&ControlValue::Slider { value: self.value })
    }

    fn refresh(&mut self) -> Result<()> {
        if let Some(ControlValue::Slider { value }) = self.common.read()? {
            self.value = value.clamp(self.min, self.max);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToggleOption {
    #[serde(flatten)]
    pub common: OptionCommon,
    pub active: bool,
}

impl ToggleOption {
    pub fn new(uid: &str, label: &str, sink: Arc<dyn ControlSink>) -> Self {
        Self {
            common: OptionCommon::new(uid, label, sink),
            active: false,
        }
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn set(&mut self, active: bool) -> Result<()> {
        self.common.write(&ControlValue::Toggle { active })?;
        self.active = active;
        Ok(())
    }
}

impl Control for ToggleOption {
    fn common(&self) -> &OptionCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut OptionCommon {
        &mut self.common
    }

    fn reapply(&self) -> Result<()> {
        self.common.write(&ControlValue::Toggle {
            active: self.active,
        })
    }

    fn refresh(&mut self) -> Result<()> {
        if let Some(ControlValue::Toggle { active }) = self.common.read()? {
            self.active = active;
        }
        Ok(())
    }
}

/// A choice between the option's parameters, e.g. a polling rate.
#[derive(Debug, Clone, Serialize)]
pub struct MultipleChoiceOption {
    #[serde(flatten)]
    pub common: OptionCommon,
    pub active: bool,
}

impl MultipleChoiceOption {
    pub fn new(uid: &str, label: &str, sink: Arc<dyn ControlSink>, choices: ParameterSet) -> Self {
        let mut common = OptionCommon::new(uid, label, sink);
        common.parameters = choices;
        Self {
            common,
            active: false,
        }
    }

    pub fn choose(&mut self, parameter: &str) -> Result<()> {
        self.common.parameters.set_active(parameter)?;
        self.common.write(&ControlValue::Choice {
            parameter: self.common.active_or_first_data(),
        })?;
        self.active = true;
        Ok(())
    }

    pub fn chosen(&self) -> Option<&Parameter> {
        self.common.parameters.active()
    }
}

impl Control for MultipleChoiceOption {
    fn common(&self) -> &OptionCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut OptionCommon {
        &mut self.common
    }

    fn reapply(&self) -> Result<()> {
        self.common.write(&ControlValue::Choice {
            parameter: self.common.active_or_first_data(),
        })
    }

    fn refresh(&mut self) -> Result<()> {
        if let Some(ControlValue::Choice {
            parameter: Some(data),
        }) = self.common.read()?
        {
            self.common.parameters.set_active_by_data(&data);
            self.active = true;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlOption {
    Effect(EffectOption),
    Slider(SliderOption),
    Toggle(ToggleOption),
    MultipleChoice(MultipleChoiceOption),
}

macro_rules! each_variant {
    ($self:expr, $opt:ident => $body:expr) => {
        match $self {
            ControlOption::Effect($opt) => $body,
            ControlOption::Slider($opt) => $body,
            ControlOption::Toggle($opt) => $body,
            ControlOption::MultipleChoice($opt) => $body,
        }
    };
}

impl ControlOption {
    pub fn uid(&self) -> &str {
        &self.common().uid
    }

    pub fn label(&self) -> &str {
        &self.common().label
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ControlOption::Effect(_) => "effect",
            ControlOption::Slider(_) => "slider",
            ControlOption::Toggle(_) => "toggle",
            ControlOption::MultipleChoice(_) => "choice",
        }
    }

    pub fn is_active_effect(&self) -> bool {
        matches!(self, ControlOption::Effect(e) if e.active)
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.common().parameters
    }

    /// Replace the colour at `position` (0 = primary).
    pub fn set_colour(&mut self, position: usize, colour: Colour) -> Result<()> {
        let common = self.common_mut();
        match common.colours.get_mut(position) {
            Some(slot) => {
                *slot = colour;
                Ok(())
            }
            None => Err(Error::InvalidValue {
                uid: common.uid.clone(),
                detail: format!(
                    "colour position {} out of range ({} colours)",
                    position,
                    common.colours.len()
                ),
            }),
        }
    }
}

impl Control for ControlOption {
    fn common(&self) -> &OptionCommon {
        each_variant!(self, o => o.common())
    }

    fn common_mut(&mut self) -> &mut OptionCommon {
        each_variant!(self, o => o.common_mut())
    }

    fn reapply(&self) -> Result<()> {
        each_variant!(self, o => o.reapply())
    }

    fn refresh(&mut self) -> Result<()> {
        each_variant!(self, o => o.refresh())
    }
}

impl From<EffectOption> for ControlOption {
    fn from(o: EffectOption) -> Self {
        ControlOption::Effect(o)
    }
}

impl From<SliderOption> for ControlOption {
    fn from(o: SliderOption) -> Self {
        ControlOption::Slider(o)
    }
}

impl From<ToggleOption> for ControlOption {
    fn from(o: ToggleOption) -> Self {
        ControlOption::Toggle(o)
    }
}

impl From<MultipleChoiceOption> for ControlOption {
    fn from(o: MultipleChoiceOption) -> Self {
        ControlOption::MultipleChoice(o)
    }
}
