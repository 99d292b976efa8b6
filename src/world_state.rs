//! Symbolic world state
//!
//! A `WorldState` is a snapshot of everything an agent believes about the
//! world at one instant: a mapping from fact keys to tagged values. Snapshots
//! are built fresh from perception each tick, cloned on every planner node
//! expansion, and compared against each other to measure drift.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Tagged value stored under a fact key.
///
/// The value space is deliberately small: absent/null, boolean, double, and
/// string. Equality is structural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FactValue {
    /// No information. An unset key reads as `Null`.
    Null,
    /// Boolean flag (held-tool flags, capability bits).
    Bool(bool),
    /// Double-precision number (inventory counts, distances).
    Number(f64),
    /// Free-form string (current target name, biome).
    Str(String),
}

impl FactValue {
    /// Returns the boolean payload, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FactValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the numeric payload, if this is a `Number`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FactValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FactValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// True for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, FactValue::Null)
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Null => write!(f, "null"),
            FactValue::Bool(b) => write!(f, "{b}"),
            FactValue::Number(n) => write!(f, "{n}"),
            // JSON rendering keeps string facts unambiguous in canonical keys
            FactValue::Str(s) => {
                write!(f, "{}", serde_json::to_string(s).unwrap_or_default())
            }
        }
    }
}

impl From<bool> for FactValue {
    fn from(b: bool) -> Self {
        FactValue::Bool(b)
    }
}

impl From<f64> for FactValue {
    fn from(n: f64) -> Self {
        FactValue::Number(n)
    }
}

impl From<i64> for FactValue {
    fn from(n: i64) -> Self {
        FactValue::Number(n as f64)
    }
}

impl From<&str> for FactValue {
    fn from(s: &str) -> Self {
        FactValue::Str(s.to_string())
    }
}

impl From<String> for FactValue {
    fn from(s: String) -> Self {
        FactValue::Str(s)
    }
}

const NULL: FactValue = FactValue::Null;

/// Mapping from fact keys to tagged values.
///
/// Reads through [`WorldState::get`] treat an absent key as [`FactValue::Null`],
/// while the typed accessors [`get_number`](WorldState::get_number) and
/// [`get_bool`](WorldState::get_bool) substitute `0.0` and `false`. Precondition
/// and goal checks are written against those defaults, so the asymmetry must
/// hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    facts: HashMap<String, FactValue>,
}

impl WorldState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self {
            facts: HashMap::new(),
        }
    }

    /// Builder-style insertion, for constructing snapshots inline.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FactValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Value under `key`; `Null` when unset.
    pub fn get(&self, key: &str) -> &FactValue {
        self.facts.get(key).unwrap_or(&NULL)
    }

    /// Numeric value under `key`; `0.0` when unset or non-numeric.
    pub fn get_number(&self, key: &str) -> f64 {
        self.get(key).as_number().unwrap_or(0.0)
    }

    /// Boolean value under `key`; `false` when unset or non-boolean.
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).as_bool().unwrap_or(false)
    }

    /// String value under `key`, when set and string-typed.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).as_str()
    }

    /// Set `key` to `value`. Writing `Null` keeps the key present, which is
    /// indistinguishable from absence through every read path.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FactValue>) {
        self.facts.insert(key.into(), value.into());
    }

    /// Remove `key` entirely.
    pub fn clear(&mut self, key: &str) {
        self.facts.remove(key);
    }

    /// Number of facts stored (absent keys excluded).
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// True when no facts are stored.
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Iterate over stored facts in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FactValue)> + '_ {
        self.facts.iter()
    }

    /// Count of keys whose values differ between `self` and `other`, over the
    /// union of both key sets. Absent keys compare as `Null`, so a key set on
    /// one side only counts once. Used as the executor's drift metric.
    pub fn diff(&self, other: &WorldState) -> usize {
        let mut differing = self
            .facts
            .iter()
            .filter(|(key, value)| other.get(key) != *value)
            .count();
        differing += other
            .facts
            .iter()
            .filter(|(key, value)| !self.facts.contains_key(*key) && !value.is_null())
            .count();
        differing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_key_reads_as_null() {
        let state = WorldState::new();
        assert_eq!(*state.get("missing"), FactValue::Null);
        assert!(state.get("missing").is_null());
    }

    #[test]
    fn typed_accessors_apply_defaults() {
        let state = WorldState::new()
            .with("count", 5.0)
            .with("flag", true)
            .with("name", "oak");

        assert_eq!(state.get_number("count"), 5.0);
        assert_eq!(state.get_number("missing"), 0.0);
        assert_eq!(state.get_number("name"), 0.0);
        assert!(state.get_bool("flag"));
        assert!(!state.get_bool("missing"));
        assert!(!state.get_bool("count"));
        assert_eq!(state.get_str("name"), Some("oak"));
        assert_eq!(state.get_str("count"), None);
    }

    #[test]
    fn clone_is_independent() {
        let original = WorldState::new().with("a", 1.0).with("b", true);
        let mut copy = original.clone();

        assert_eq!(copy, original);

        copy.set("a", 99.0);
        copy.clear("b");

        assert_eq!(original.get_number("a"), 1.0);
        assert!(original.get_bool("b"));
    }

    #[test]
    fn diff_is_zero_on_self_and_symmetric() {
        let a = WorldState::new().with("x", 1.0).with("y", "tree");
        let b = WorldState::new().with("x", 2.0).with("z", false);

        assert_eq!(a.diff(&a), 0);
        assert_eq!(a.diff(&b), b.diff(&a));
    }

    #[test]
    fn diff_counts_union_of_differing_keys() {
        let a = WorldState::new().with("x", 1.0).with("y", true);
        let b = WorldState::new().with("x", 2.0).with("z", "here");

        // x differs, y is absent from b, z is absent from a
        assert_eq!(a.diff(&b), 3);
    }

    #[test]
    fn explicit_null_equals_absent_in_diff() {
        let a = WorldState::new().with("gone", FactValue::Null);
        let b = WorldState::new();

        assert_eq!(a.diff(&b), 0);
        assert_eq!(b.diff(&a), 0);
    }

    #[test]
    fn clear_removes_key() {
        let mut state = WorldState::new().with("tool", "axe");
        state.clear("tool");
        assert!(state.get("tool").is_null());
        assert!(state.is_empty());
    }
}
