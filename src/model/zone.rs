use super::option::{Control, ControlOption};
use crate::error::{Error, Result};
use serde::Serialize;

/// An independently controllable lighting region (or, for the laptop
/// backend, a group of related settings).
#[derive(Debug, Clone, Serialize)]
pub struct Zone {
    pub zone_id: String,
    pub label: String,
    pub icon: Option<String>,
    options: Vec<ControlOption>,
}

impl Zone {
    pub fn new(zone_id: &str, label: &str) -> Self {
        Self {
            zone_id: zone_id.to_string(),
            label: label.to_string(),
            icon: None,
            options: Vec::new(),
        }
    }

    /// Append an option. A second active effect is refused.
    pub fn push(&mut self, option: impl Into<ControlOption>) -> Result<()> {
        let option = option.into();
        if option.is_active_effect()
            && let Some(current) = self.active_effect()
        {
            return Err(Error::Invariant(format!(
                "zone '{}' already has active effect '{}', cannot add active '{}'",
                self.zone_id,
                current.uid(),
                option.uid()
            )));
        }
        self.options.push(option);
        Ok(())
    }

    pub fn options(&self) -> &[ControlOption] {
        &self.options
    }

    pub fn option(&self, uid: &str) -> Option<&ControlOption> {
        self.options.iter().find(|o| o.uid() == uid)
    }

    pub fn option_mut(&mut self, uid: &str) -> Option<&mut ControlOption> {
        self.options.iter_mut().find(|o| o.uid() == uid)
    }

    pub fn active_effect(&self) -> Option<&ControlOption> {
        self.options.iter().find(|o| o.is_active_effect())
    }

    pub fn active_effect_mut(&mut self) -> Option<&mut ControlOption> {
        self.options.iter_mut().find(|o| o.is_active_effect())
    }

    /// Activate the effect `uid`, deactivating whichever effect was active.
    /// The previous effect stays active if the hardware write fails.
    pub fn activate_effect(&mut self, uid: &str, parameter: Option<&str>) -> Result<()> {
        let index = self
            .options
            .iter()
            .position(|o| o.uid() == uid && matches!(o, ControlOption::Effect(_)))
            .ok_or_else(|| Error::OptionNotFound {
                device: self.zone_id.clone(),
                uid: uid.to_string(),
            })?;

        if let ControlOption::Effect(effect) = &mut self.options[index] {
            effect.activate(parameter)?;
        }

        for (i, option) in self.options.iter_mut().enumerate() {
            if i != index
                && let ControlOption::Effect(effect) = option
            {
                effect.active = false;
            }
        }
        Ok(())
    }

    /// Refresh every option. If hardware reports several active effects,
    /// only the first keeps its flag.
    pub fn refresh(&mut self) -> Result<()> {
        for option in &mut self.options {
            option.refresh()?;
        }
        let mut seen_active = false;
        for option in &mut self.options {
            if let ControlOption::Effect(effect) = option
                && effect.active
            {
                if seen_active {
                    tracing::warn!(
                        zone = %self.zone_id,
                        effect = %effect.common.uid,
                        "more than one effect reported active, ignoring"
                    );
                    effect.active = false;
                }
                seen_active = true;
            }
        }
        Ok(())
    }
}
