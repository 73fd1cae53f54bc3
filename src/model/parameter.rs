use crate::error::{Error, Result};
use serde::Serialize;

/// A named variant of an effect or choice, e.g. wave direction or breath mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub uid: String,
    pub label: String,
    /// Payload handed to the hardware sink when this parameter is used.
    pub data: String,
    pub colours_required: usize,
    pub default: bool,
}

impl Parameter {
    pub fn new(uid: &str, label: &str, data: &str) -> Self {
        Self {
            uid: uid.to_string(),
            label: label.to_string(),
            data: data.to_string(),
            colours_required: 0,
            default: false,
        }
    }

    pub fn with_colours(mut self, colours_required: usize) -> Self {
        self.colours_required = colours_required;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }
}

/// The parameters of one option. Holds at most one default and at most one
/// active parameter; the active one is tracked by index so two can never be
/// flagged at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParameterSet {
    items: Vec<Parameter>,
    active: Option<usize>,
}

impl ParameterSet {
    pub fn new(items: Vec<Parameter>) -> Result<Self> {
        let defaults = items.iter().filter(|p| p.default).count();
        if defaults > 1 {
            return Err(Error::Invariant(format!(
                "{} parameters marked default, at most one allowed",
                defaults
            )));
        }
        Ok(Self {
            items,
            active: None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.items.iter()
    }

    pub fn get(&self, uid: &str) -> Option<&Parameter> {
        self.items.iter().find(|p| p.uid == uid)
    }

    pub fn active(&self) -> Option<&Parameter> {
        self.active.and_then(|i| self.items.get(i))
    }

    /// The default parameter, or the first one if none is marked default.
    pub fn default_or_first(&self) -> Option<&Parameter> {
        self.items
            .iter()
            .find(|p| p.default)
            .or_else(|| self.items.first())
    }

    /// The parameter a re-apply should use: the active one, else the first.
    pub fn active_or_first(&self) -> Option<&Parameter> {
        self.active().or_else(|| self.items.first())
    }

    pub fn set_active(&mut self, uid: &str) -> Result<()> {
        let index = self
            .items
            .iter()
            .position(|p| p.uid == uid)
            .ok_or_else(|| Error::InvalidValue {
                uid: uid.to_string(),
                detail: "no such parameter".to_string(),
            })?;
        self.active = Some(index);
        Ok(())
    }

    /// Mark the payload `data` as active, as read back from hardware state.
    /// Unknown payloads clear the active parameter.
    pub fn set_active_by_data(&mut self, data: &str) {
        self.active = self.items.iter().position(|p| p.data == data);
    }
}
