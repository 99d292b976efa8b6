//! # ARBOR - Autonomous Reactive Behavior Orchestration Runtime
//!
//! A reactive goal-oriented action planning (GOAP) engine for autonomous game
//! agents. ARBOR gives each agent a symbolic picture of its world, a set of
//! goals scored by utility, and a library of actions with preconditions,
//! effects, and dynamic costs; an A* planner chains those actions into plans
//! and a replan-aware executor runs them against the live game.
//!
//! ## Features
//!
//! - **Symbolic world state**: typed fact store with defaulting accessors,
//!   deep cloning, and a drift metric
//! - **A\* planning**: admissible-ish numeric-distance heuristic, canonical-key
//!   deduplication over a configurable fact whitelist, bounded search
//! - **Utility arbitration**: hysteresis against goal thrashing, additive
//!   pre-emption threshold for interrupting running plans
//! - **Resilient execution**: cooperative async actions, failure escalation,
//!   world-drift detection, typed replan reasons
//! - **Single control loop**: perceive → decide → act → monitor tick with
//!   goal cooldowns, idle tracking, and an overlap guard
//!
//! ## Quick Start
//!
//! Add ARBOR to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! arbor = "0.1.0"
//! tokio = { version = "1.40", features = ["full"] }
//! ```
//!
//! ### Planning in isolation
//!
//! ```rust
//! use arbor::{
//!     Action, ActionStatus, Effect, Goal, GoalCondition, Planner, PlannerConfig,
//!     Precondition, WorldState,
//! };
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct PickupItems {
//!     preconditions: Vec<Precondition>,
//!     effects: Vec<Effect>,
//! }
//!
//! #[async_trait]
//! impl Action<(), ()> for PickupItems {
//!     fn name(&self) -> &str {
//!         "PickupItems"
//!     }
//!     fn preconditions(&self) -> &[Precondition] {
//!         &self.preconditions
//!     }
//!     fn effects(&self) -> &[Effect] {
//!         &self.effects
//!     }
//!     fn cost(&self, state: &WorldState) -> f64 {
//!         1.0 + state.get_number("nearby.drops") * 0.1
//!     }
//!     async fn execute(
//!         &self,
//!         _bot: &mut (),
//!         _blackboard: &mut (),
//!         _state: &WorldState,
//!     ) -> anyhow::Result<ActionStatus> {
//!         // real implementations move the avatar, mine blocks, open chests
//!         Ok(ActionStatus::Success)
//!     }
//! }
//!
//! let mut planner: Planner<(), ()> = Planner::new(PlannerConfig::default());
//! planner.add_action(Arc::new(PickupItems {
//!     preconditions: vec![Precondition::is_false("state.inventoryFull")],
//!     effects: vec![Effect::set("nearby.drops", 0.0)],
//! }));
//!
//! let world = WorldState::new()
//!     .with("nearby.drops", 5.0)
//!     .with("state.inventoryFull", false);
//! let goal = Goal::new("clean_ground")
//!     .with_condition(GoalCondition::at_most("nearby.drops", 0.0));
//!
//! let result = planner.plan(&world, &goal);
//! assert!(result.success);
//! assert_eq!(result.action_names(), ["PickupItems"]);
//! ```
//!
//! For the full control loop, assemble an [`Agent`] from a bot handle, a
//! [`Blackboard`], a [`Role`], actions, and goals, then drive it with
//! [`Agent::run`] (or [`Agent::tick`] under a host scheduler).
//!
//! ## Architecture
//!
//! Data flows through five modules plus one control loop, leaves first:
//!
//! - [`world_state`] - fact values and symbolic snapshots
//! - [`action`] - preconditions, effects, costs, and the async execute contract
//! - [`goal`] - conditions, numeric targets, utility and validity
//! - [`planner`] - A* search over symbolic states
//! - [`arbiter`] - utility selection with hysteresis and pre-emption
//! - [`executor`] - plan execution, failure policy, drift detection
//! - [`agent`] - the per-agent perceive/decide/act/monitor loop
//!
//! Each agent owns its own planner, arbiter, and executor; nothing is shared
//! across agents, and within one agent scheduling is single-threaded
//! cooperative.

#![warn(missing_docs, rust_2018_idioms)]

pub mod action;
pub mod agent;
pub mod arbiter;
pub mod executor;
pub mod goal;
pub mod planner;
pub mod world_state;

// Re-export commonly used types
pub use action::{Action, ActionStatus, Effect, Precondition};
pub use agent::{Agent, AgentConfig, AgentError, AgentState, AgentStats, Blackboard, Role};
pub use arbiter::{Arbiter, ArbiterConfig, Selection, SelectionReason};
pub use executor::{Executor, ExecutorConfig, ExecutorStats, ReplanReason};
pub use goal::{Comparison, Goal, GoalCondition, NumericTarget};
pub use planner::{PlanResult, Planner, PlannerConfig};
pub use world_state::{FactValue, WorldState};
