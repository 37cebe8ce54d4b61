//! Strategy engine: rule trees, snapshots and the predefined strategies.

pub mod presets;
pub mod rules;
pub mod snapshot;

use std::time::Duration;

use crate::error::StrategyError;
use rules::{Action, ConditionSet};
use snapshot::{fields, Snapshot};

/// Immutable decision tree plus the interval an agent waits between ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub root: ConditionSet,
    pub tick: Duration,
}

impl Strategy {
    pub fn new(name: &str, root: ConditionSet, tick_secs: u64) -> Self {
        Self {
            name: name.to_string(),
            root,
            tick: Duration::from_secs(tick_secs),
        }
    }

    /// Look up a predefined strategy (case-insensitive).
    pub fn by_name(name: &str) -> Result<Self, StrategyError> {
        match name.trim().to_lowercase().as_str() {
            presets::AGGRESSIVE => Ok(presets::aggressive()),
            presets::WAITING => Ok(presets::waiting()),
            presets::PROGRESSIVE => Ok(presets::progressive()),
            _ => Err(StrategyError::UnknownStrategy(name.to_string())),
        }
    }

    pub fn decide(&self, snapshot: &Snapshot) -> Action {
        self.root.define(snapshot)
    }

    /// Reject trees that read fields the snapshot does not have, and
    /// strategies that would never sleep.
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.tick.is_zero() {
            return Err(StrategyError::ZeroTick(self.name.clone()));
        }
        for set in self.root.chain() {
            for condition in set.when.conditions() {
                let names = std::iter::once(condition.field.as_str())
                    .chain(condition.value.field_name());
                for name in names {
                    if !fields::is_known(name) {
                        return Err(StrategyError::UnknownField {
                            strategy: self.name.clone(),
                            field: name.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
