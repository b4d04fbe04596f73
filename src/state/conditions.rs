//! Preconditions, goal targets and effects over the key-value view

use crate::state::world::{StateKey, StateMap, StateValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Requirement on one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum Condition {
    Equals(StateValue),
    AtLeast(i64),
    AtMost(i64),
}

impl Condition {
    pub fn is_true() -> Self {
        Condition::Equals(StateValue::Bool(true))
    }

    pub fn is_false() -> Self {
        Condition::Equals(StateValue::Bool(false))
    }

    /// Check an observed value; `None` means the key is absent
    pub fn is_satisfied_by(&self, actual: Option<StateValue>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        match self {
            Condition::Equals(expected) => expected.as_i64() == actual.as_i64(),
            Condition::AtLeast(min) => actual.as_i64() >= *min,
            Condition::AtMost(max) => actual.as_i64() <= *max,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Equals(v) => write!(f, "== {}", v),
            Condition::AtLeast(n) => write!(f, ">= {}", n),
            Condition::AtMost(n) => write!(f, "<= {}", n),
        }
    }
}

/// Change an action declares on one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum Effect {
    /// Absolute value after the action
    Set(StateValue),
    /// Expected change; the sign is what gets verified
    Add(i64),
}

impl Effect {
    /// Value after applying this effect to `current`
    pub fn apply(&self, current: Option<StateValue>) -> StateValue {
        match self {
            Effect::Set(value) => *value,
            Effect::Add(delta) => {
                let base = current.map(|v| v.as_i64()).unwrap_or(0);
                StateValue::Int(base.saturating_add(*delta))
            }
        }
    }
}

pub type ConditionMap = BTreeMap<StateKey, Condition>;
pub type EffectMap = BTreeMap<StateKey, Effect>;

/// Look a key up, falling back to its implicit value
pub fn lookup(view: &StateMap, key: &StateKey) -> Option<StateValue> {
    view.get(key).copied().or_else(|| key.implicit_value())
}

/// Keys whose condition the view does not satisfy
pub fn unmet_conditions(view: &StateMap, conditions: &ConditionMap) -> Vec<StateKey> {
    conditions
        .iter()
        .filter(|(key, condition)| !condition.is_satisfied_by(lookup(view, key)))
        .map(|(key, _)| key.clone())
        .collect()
}

pub fn conditions_met(view: &StateMap, conditions: &ConditionMap) -> bool {
    conditions
        .iter()
        .all(|(key, condition)| condition.is_satisfied_by(lookup(view, key)))
}

/// Apply an effect map to a view in place
pub fn apply_effects(view: &mut StateMap, effects: &EffectMap) {
    for (key, effect) in effects {
        let next = effect.apply(lookup(view, key));
        view.insert(key.clone(), next);
    }
}
