//! Actions: the planner's edges and the executor's work items
//!
//! An action is a named, symbolic move in state space. At planning time only
//! its preconditions, effects, and cost are consulted; all of those are pure.
//! At execution time [`Action::execute`] is the single impure entry point,
//! performing real work against the bot and blackboard and reporting progress
//! cooperatively via [`ActionStatus`].

use crate::world_state::{FactValue, WorldState};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pure predicate over a single fact value.
pub type CheckFn = Box<dyn Fn(&FactValue) -> bool + Send + Sync>;

/// Pure computation of a fact's next value from the current state.
pub type ApplyFn = Box<dyn Fn(&WorldState) -> FactValue + Send + Sync>;

/// Requirement on one fact key for an action to be applicable.
pub struct Precondition {
    /// Fact key the check reads.
    pub key: String,
    /// Human-readable summary for diagnostics.
    pub description: String,
    check: CheckFn,
}

impl Precondition {
    /// Precondition from an arbitrary check closure.
    pub fn new(
        key: impl Into<String>,
        description: impl Into<String>,
        check: impl Fn(&FactValue) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            check: Box::new(check),
        }
    }

    /// Requires the boolean fact to be `true` (absent reads as `false`).
    pub fn is_true(key: impl Into<String>) -> Self {
        let key = key.into();
        let description = format!("{key} is true");
        Self::new(key, description, |v| v.as_bool().unwrap_or(false))
    }

    /// Requires the boolean fact to be `false` (absent reads as `false`).
    pub fn is_false(key: impl Into<String>) -> Self {
        let key = key.into();
        let description = format!("{key} is false");
        Self::new(key, description, |v| !v.as_bool().unwrap_or(false))
    }

    /// Requires the numeric fact to be at least `min` (absent reads as `0`).
    pub fn at_least(key: impl Into<String>, min: f64) -> Self {
        let key = key.into();
        let description = format!("{key} >= {min}");
        Self::new(key, description, move |v| v.as_number().unwrap_or(0.0) >= min)
    }

    /// Requires the numeric fact to be at most `max` (absent reads as `0`).
    pub fn at_most(key: impl Into<String>, max: f64) -> Self {
        let key = key.into();
        let description = format!("{key} <= {max}");
        Self::new(key, description, move |v| v.as_number().unwrap_or(0.0) <= max)
    }

    /// Requires the fact to equal `value` structurally.
    pub fn equals(key: impl Into<String>, value: impl Into<FactValue>) -> Self {
        let key = key.into();
        let value = value.into();
        let description = format!("{key} == {value}");
        Self::new(key, description, move |v| *v == value)
    }

    /// Evaluate the check against `state` (defaulted read semantics).
    pub fn holds(&self, state: &WorldState) -> bool {
        (self.check)(state.get(&self.key))
    }
}

impl fmt::Debug for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Precondition")
            .field("key", &self.key)
            .field("description", &self.description)
            .finish()
    }
}

/// Pure transformation of one fact key.
///
/// Effects do not mutate state directly; they read the current state and
/// return the next value, and the planner or executor writes it back. Within
/// one action effects apply in declaration order, so later effects observe
/// earlier writes.
pub struct Effect {
    /// Fact key the effect writes.
    pub key: String,
    /// Human-readable summary for diagnostics.
    pub description: String,
    apply: ApplyFn,
}

impl Effect {
    /// Effect from an arbitrary apply closure.
    pub fn new(
        key: impl Into<String>,
        description: impl Into<String>,
        apply: impl Fn(&WorldState) -> FactValue + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            apply: Box::new(apply),
        }
    }

    /// Sets the fact to a constant value.
    pub fn set(key: impl Into<String>, value: impl Into<FactValue>) -> Self {
        let key = key.into();
        let value = value.into();
        let description = format!("{key} := {value}");
        Self::new(key, description, move |_| value.clone())
    }

    /// Adds `delta` to the numeric fact (absent reads as `0`).
    pub fn add(key: impl Into<String>, delta: f64) -> Self {
        let key = key.into();
        let description = format!("{key} += {delta}");
        let read_key = key.clone();
        Self::new(key, description, move |state| {
            FactValue::Number(state.get_number(&read_key) + delta)
        })
    }

    /// Subtracts `delta` from the numeric fact (absent reads as `0`).
    pub fn subtract(key: impl Into<String>, delta: f64) -> Self {
        Self::add(key, -delta)
    }

    /// Compute the next value and write it into `state`.
    pub fn apply_to(&self, state: &mut WorldState) {
        let next = (self.apply)(state);
        state.set(self.key.clone(), next);
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("key", &self.key)
            .field("description", &self.description)
            .finish()
    }
}

/// Cooperative result of one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    /// The action finished its work; advance the plan.
    Success,
    /// The action cannot make progress; the executor applies its failure policy.
    Failure,
    /// The action needs more ticks; it will be polled again.
    Running,
}

/// A unit of change the planner can reason about and the executor can run.
///
/// `B` is the opaque game-client handle, `K` the role's blackboard; the core
/// passes both through untouched. Implementations are constructed once at
/// agent start and treated as immutable; anything `cancel` needs to signal
/// must live behind interior mutability.
#[async_trait]
pub trait Action<B, K>: Send + Sync {
    /// Stable action name, used in plans, logs, and reports.
    fn name(&self) -> &str;

    /// Conjunction of requirements consulted by the default
    /// [`check_preconditions`](Action::check_preconditions).
    fn preconditions(&self) -> &[Precondition];

    /// Planning-time model of what execution changes. Kept optimistic; the
    /// executor's drift detector catches divergence from reality.
    fn effects(&self) -> &[Effect];

    /// Dynamic cost of running this action from `state`. May return cheaper
    /// values when prerequisites are already satisfied.
    fn cost(&self, state: &WorldState) -> f64;

    /// Applicability test. The default is the conjunction of
    /// [`preconditions`](Action::preconditions); override for OR-logic or
    /// disjunctive material checks.
    fn check_preconditions(&self, state: &WorldState) -> bool {
        self.preconditions().iter().all(|p| p.holds(state))
    }

    /// Apply all effects to a clone of `state`, in declaration order.
    fn apply_effects(&self, state: &WorldState) -> WorldState {
        let mut next = state.clone();
        for effect in self.effects() {
            effect.apply_to(&mut next);
        }
        next
    }

    /// Perform real work. The only impure entry point in the core; may
    /// suspend for a long time (movement, block interaction). Errors are
    /// folded into [`ActionStatus::Failure`] by the executor.
    async fn execute(
        &self,
        bot: &mut B,
        blackboard: &mut K,
        state: &WorldState,
    ) -> Result<ActionStatus>;

    /// Best-effort cancellation signal. Actions that ignore it simply run to
    /// their next `execute` boundary.
    fn cancel(&self) {}
}
