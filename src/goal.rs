//! Goals: desired world states with utility
//!
//! A goal is a named conjunction of conditions plus a utility function over
//! the current world state. Conditions may carry numeric-target metadata that
//! the planner's heuristic consumes; the metadata never participates in
//! satisfaction checks.

use crate::action::CheckFn;
use crate::world_state::{FactValue, WorldState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a numeric target compares against the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    /// Current value must reach at least the target.
    Gte,
    /// Current value must drop to at most the target.
    Lte,
    /// Current value must equal the target.
    Eq,
}

/// Planning metadata estimating how far a numeric fact is from its target and
/// how much one action moves it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericTarget {
    /// Target value of the fact.
    pub value: f64,
    /// Direction of the comparison.
    pub comparison: Comparison,
    /// Expected change per action; drives the heuristic's step estimate.
    pub estimated_delta: f64,
}

/// One conjunct of a goal.
pub struct GoalCondition {
    /// Fact key the check reads.
    pub key: String,
    /// Human-readable summary for diagnostics.
    pub description: String,
    /// Optional heuristic metadata.
    pub numeric_target: Option<NumericTarget>,
    check: CheckFn,
}

impl GoalCondition {
    /// Condition from an arbitrary check closure.
    pub fn new(
        key: impl Into<String>,
        description: impl Into<String>,
        check: impl Fn(&FactValue) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            numeric_target: None,
            check: Box::new(check),
        }
    }

    /// Requires the boolean fact to be `true`.
    pub fn is_true(key: impl Into<String>) -> Self {
        let key = key.into();
        let description = format!("{key} is true");
        Self::new(key, description, |v| v.as_bool().unwrap_or(false))
    }

    /// Requires the boolean fact to be `false`.
    pub fn is_false(key: impl Into<String>) -> Self {
        let key = key.into();
        let description = format!("{key} is false");
        Self::new(key, description, |v| !v.as_bool().unwrap_or(false))
    }

    /// Requires the numeric fact to reach `min`, with heuristic metadata
    /// assuming one-unit steps (tune with [`with_target`](Self::with_target)).
    pub fn at_least(key: impl Into<String>, min: f64) -> Self {
        let key = key.into();
        let description = format!("{key} >= {min}");
        Self::new(key, description, move |v| v.as_number().unwrap_or(0.0) >= min).with_target(
            NumericTarget {
                value: min,
                comparison: Comparison::Gte,
                estimated_delta: 1.0,
            },
        )
    }

    /// Requires the numeric fact to drop to `max`, with one-unit-step
    /// heuristic metadata.
    pub fn at_most(key: impl Into<String>, max: f64) -> Self {
        let key = key.into();
        let description = format!("{key} <= {max}");
        Self::new(key, description, move |v| v.as_number().unwrap_or(0.0) <= max).with_target(
            NumericTarget {
                value: max,
                comparison: Comparison::Lte,
                estimated_delta: 1.0,
            },
        )
    }

    /// Requires the fact to equal `value` structurally.
    pub fn equals(key: impl Into<String>, value: impl Into<FactValue>) -> Self {
        let key = key.into();
        let value = value.into();
        let description = format!("{key} == {value}");
        let target = value.as_number().map(|n| NumericTarget {
            value: n,
            comparison: Comparison::Eq,
            estimated_delta: 1.0,
        });
        let mut condition = Self::new(key, description, move |v| *v == value);
        condition.numeric_target = target;
        condition
    }

    /// Attach or replace heuristic metadata.
    pub fn with_target(mut self, target: NumericTarget) -> Self {
        self.numeric_target = Some(target);
        self
    }

    /// Evaluate the check against `state` (defaulted read semantics).
    pub fn holds(&self, state: &WorldState) -> bool {
        (self.check)(state.get(&self.key))
    }
}

impl fmt::Debug for GoalCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoalCondition")
            .field("key", &self.key)
            .field("description", &self.description)
            .field("numeric_target", &self.numeric_target)
            .finish()
    }
}

type UtilityFn = Box<dyn Fn(&WorldState) -> f64 + Send + Sync>;
type ValidityFn = Box<dyn Fn(&WorldState) -> bool + Send + Sync>;

/// Named conjunction of conditions with a utility function and a validity
/// pre-filter.
///
/// Utility is a real number, higher meaning more desirable; the arbiter drops
/// goals whose utility is not positive. `is_valid` gates the goal entirely,
/// regardless of utility.
pub struct Goal {
    /// Stable goal name, used for cooldown bookkeeping and reports.
    pub name: String,
    /// Human-readable summary for reports.
    pub description: String,
    conditions: Vec<GoalCondition>,
    utility: UtilityFn,
    validity: ValidityFn,
}

impl Goal {
    /// New goal with constant utility `1.0` and unconditional validity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            conditions: Vec::new(),
            utility: Box::new(|_| 1.0),
            validity: Box::new(|_| true),
        }
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a condition to the conjunction.
    pub fn with_condition(mut self, condition: GoalCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Replace the utility function.
    pub fn with_utility(mut self, utility: impl Fn(&WorldState) -> f64 + Send + Sync + 'static) -> Self {
        self.utility = Box::new(utility);
        self
    }

    /// Replace the validity pre-filter.
    pub fn with_validity(
        mut self,
        validity: impl Fn(&WorldState) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.validity = Box::new(validity);
        self
    }

    /// The goal's conditions.
    pub fn conditions(&self) -> &[GoalCondition] {
        &self.conditions
    }

    /// Utility of pursuing this goal from `state`.
    pub fn utility(&self, state: &WorldState) -> f64 {
        (self.utility)(state)
    }

    /// Whether the goal may be considered at all from `state`.
    pub fn is_valid(&self, state: &WorldState) -> bool {
        (self.validity)(state)
    }

    /// True when every condition holds. A goal with no conditions is
    /// vacuously satisfied.
    pub fn is_satisfied(&self, state: &WorldState) -> bool {
        self.conditions.iter().all(|c| c.holds(state))
    }
}

impl fmt::Debug for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Goal")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("conditions", &self.conditions)
            .finish()
    }
}
