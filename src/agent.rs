//! Per-agent control loop
//!
//! One agent owns one planner, one arbiter, one executor, a bot handle, and a
//! role blackboard, and drives them through a fixed-interval tick:
//! perceive → decide → act → monitor. Planning failures put goals on a
//! cooldown; replan requests from the executor clear the arbiter's current
//! goal (and cooldown it when failures were involved); a higher-utility goal
//! can pre-empt a running plan past an additive threshold.
//!
//! Scheduling is single-threaded cooperative: the tick is one async unit of
//! work and is always awaited before the next timer fire is honoured, so
//! ticks never overlap even when an action blocks for tens of seconds.

use crate::arbiter::{Arbiter, ArbiterConfig, Selection};
use crate::executor::{Executor, ExecutorConfig, ExecutorStats, ReplanReason};
use crate::planner::{Planner, PlannerConfig};
use crate::world_state::WorldState;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Role-local scratchpad carried between perception and actions.
///
/// Opaque to the core except for one counter: the number of consecutive ticks
/// in which no action succeeded, which fallback "explore" goals key off.
pub trait Blackboard: Send {
    /// Ticks since an action last succeeded.
    fn consecutive_idle_ticks(&self) -> u32;
    /// Overwrite the idle-tick counter.
    fn set_consecutive_idle_ticks(&mut self, ticks: u32);
}

/// The agent's connection to its environment: connectivity, perception, and
/// the projection of the blackboard into a symbolic snapshot.
#[async_trait]
pub trait Role<B, K>: Send {
    /// Whether the game client is connected and the avatar spawned. A `false`
    /// stops the agent.
    fn is_connected(&self, bot: &B) -> bool;

    /// Refresh the blackboard from the live world. Runs once at the head of
    /// every tick; an error skips the tick.
    async fn update_blackboard(&mut self, bot: &mut B, blackboard: &mut K) -> Result<()>;

    /// Pure projection of bot and blackboard into a symbolic snapshot.
    fn project_world_state(&self, bot: &B, blackboard: &K) -> WorldState;
}

/// Control-loop tuning knobs, bundling the component configurations.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Milliseconds between timer fires.
    pub tick_interval_ms: u64,
    /// Cooldown applied to a goal whose planning failed.
    pub planning_cooldown_ms: u64,
    /// Planner knobs.
    pub planner: PlannerConfig,
    /// Arbiter knobs.
    pub arbiter: ArbiterConfig,
    /// Executor knobs.
    pub executor: ExecutorConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            planning_cooldown_ms: 5000,
            planner: PlannerConfig::default(),
            arbiter: ArbiterConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl AgentConfig {
    fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    fn planning_cooldown(&self) -> Duration {
        Duration::from_millis(self.planning_cooldown_ms)
    }
}

/// Lifecycle of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentState {
    /// Constructed, loop not yet entered.
    Created,
    /// Loop running.
    Running,
    /// Stopped by request or lost connectivity; the loop will not tick again.
    Stopped,
}

/// Aggregated counters across the loop and its executor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AgentStats {
    /// Ticks entered (including skipped ones).
    pub ticks: u64,
    /// Plans handed to the executor.
    pub plans_built: u64,
    /// Planning attempts that found no plan.
    pub planning_failures: u64,
    /// Running plans cancelled in favour of a higher-utility goal.
    pub preemptions: u64,
    /// Executor counters.
    pub executor: ExecutorStats,
}

/// Faults surfaced by the control loop.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The game client is not connected or the avatar is not spawned.
    #[error("game client disconnected")]
    Disconnected,
    /// The role's perception refresh failed; the tick was skipped.
    #[error("blackboard update failed: {0}")]
    Perception(anyhow::Error),
}

/// One autonomous agent: components, identity, and the tick pipeline.
pub struct Agent<B, K, R> {
    id: Uuid,
    name: String,
    bot: B,
    blackboard: K,
    role: R,
    planner: Planner<B, K>,
    arbiter: Arbiter,
    executor: Executor<B, K>,
    /// Goal name → cooldown expiry.
    cooldowns: HashMap<String, Instant>,
    replan_inbox: Arc<Mutex<Vec<ReplanReason>>>,
    config: AgentConfig,
    state: AgentState,
    ticks: u64,
    plans_built: u64,
    planning_failures: u64,
    preemptions: u64,
}

impl<B, K, R> Agent<B, K, R>
where
    B: Send,
    K: Blackboard,
    R: Role<B, K>,
{
    /// Assemble an agent around a bot handle, blackboard, and role.
    pub fn new(name: impl Into<String>, bot: B, blackboard: K, role: R, config: AgentConfig) -> Self {
        let mut executor = Executor::new(config.executor.clone());
        let replan_inbox: Arc<Mutex<Vec<ReplanReason>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&replan_inbox);
        executor.set_replan_callback(Box::new(move |reason| sink.lock().push(reason)));

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            bot,
            blackboard,
            role,
            planner: Planner::new(config.planner.clone()),
            arbiter: Arbiter::new(config.arbiter.clone()),
            executor,
            cooldowns: HashMap::new(),
            replan_inbox,
            config,
            state: AgentState::Created,
            ticks: 0,
            plans_built: 0,
            planning_failures: 0,
            preemptions: 0,
        }
    }

    /// Unique agent id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Register an action with the planner.
    pub fn add_action(&mut self, action: Arc<dyn crate::action::Action<B, K>>) {
        self.planner.add_action(action);
    }

    /// Register a goal with the arbiter.
    pub fn add_goal(&mut self, goal: Arc<crate::goal::Goal>) {
        self.arbiter.add_goal(goal);
    }

    /// Shared view of the blackboard.
    pub fn blackboard(&self) -> &K {
        &self.blackboard
    }

    /// Drive the loop until stopped. One timer fire triggers at most one
    /// tick; fires that land while a tick is still in flight are skipped.
    pub async fn run(&mut self) {
        self.state = AgentState::Running;
        info!(agent = %self.name, id = %self.id, "control loop started");

        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.state == AgentState::Running {
            interval.tick().await;
            self.tick().await;
        }

        info!(agent = %self.name, id = %self.id, "control loop ended");
    }

    /// One pass of the perceive → decide → act → monitor pipeline. Public so
    /// hosts and tests can drive the agent without the timer.
    pub async fn tick(&mut self) {
        if self.state == AgentState::Stopped {
            return;
        }
        self.ticks += 1;

        if let Err(error) = self.try_tick().await {
            match error {
                AgentError::Disconnected => {
                    warn!(agent = %self.name, "client disconnected, stopping");
                    self.stop();
                }
                AgentError::Perception(source) => {
                    warn!(agent = %self.name, error = %source, "tick skipped");
                }
            }
        }
    }

    async fn try_tick(&mut self) -> Result<(), AgentError> {
        // Connectivity gate
        if !self.role.is_connected(&self.bot) {
            return Err(AgentError::Disconnected);
        }

        // Perceive
        self.role
            .update_blackboard(&mut self.bot, &mut self.blackboard)
            .await
            .map_err(AgentError::Perception)?;
        let world = self.role.project_world_state(&self.bot, &self.blackboard);

        // Decide
        if self.executor.is_executing() {
            self.check_goal_preemption(&world);
        } else {
            self.plan_next_goal(&world);
        }

        // Act
        let succeeded_before = self.executor.stats().actions_succeeded;
        self.executor
            .tick(&mut self.bot, &mut self.blackboard, &world)
            .await;

        // Monitor
        self.executor.check_world_drift(&world);
        self.drain_replans();

        // Idle tracking
        if self.executor.stats().actions_succeeded > succeeded_before {
            self.blackboard.set_consecutive_idle_ticks(0);
        } else {
            let idle = self.blackboard.consecutive_idle_ticks();
            self.blackboard.set_consecutive_idle_ticks(idle.saturating_add(1));
        }

        Ok(())
    }

    /// Stop the loop, cancelling any in-flight plan.
    pub fn stop(&mut self) {
        if self.state == AgentState::Stopped {
            return;
        }
        self.state = AgentState::Stopped;
        if self.executor.is_executing() {
            self.executor.cancel(ReplanReason::WorldChanged);
        }
        self.replan_inbox.lock().clear();
        self.arbiter.clear_current_goal();
        info!(agent = %self.name, "stopped");
    }

    /// Select a goal and build a plan for it. Planning failure puts the goal
    /// on cooldown so the arbiter tries alternatives.
    fn plan_next_goal(&mut self, world: &WorldState) {
        let skip = self.prune_cooldowns();
        let Some(selection) = self.arbiter.select_goal(world, &skip) else {
            return;
        };
        self.plan_for(world, &selection);
    }

    fn plan_for(&mut self, world: &WorldState, selection: &Selection) {
        let result = self.planner.plan(world, &selection.goal);
        if result.success {
            self.plans_built += 1;
            info!(
                agent = %self.name,
                goal = %selection.goal.name,
                plan = %serde_json::to_string(&result.action_names()).unwrap_or_default(),
                cost = result.total_cost,
                nodes = result.nodes_explored,
                utility = selection.utility,
                "plan ready"
            );
            self.executor.load_plan(result.plan, world.clone());
        } else {
            self.planning_failures += 1;
            warn!(
                agent = %self.name,
                goal = %selection.goal.name,
                nodes = result.nodes_explored,
                "no plan found, cooling goal down"
            );
            self.cooldowns.insert(
                selection.goal.name.clone(),
                Instant::now() + self.config.planning_cooldown(),
            );
            self.arbiter.clear_current_goal();
        }
    }

    /// While a plan runs: cancel it when a challenger clears the pre-emption
    /// threshold, and plan for the challenger immediately.
    fn check_goal_preemption(&mut self, world: &WorldState) {
        let skip = self.prune_cooldowns();
        let Some(challenger) = self.arbiter.check_preemption(world, &skip) else {
            return;
        };

        self.preemptions += 1;
        self.executor.cancel(ReplanReason::WorldChanged);
        // The cancellation we just triggered is already handled; keep it out
        // of the monitor-phase drain.
        self.replan_inbox.lock().clear();
        self.plan_for(world, &challenger);
    }

    /// Handle replan requests surfaced by the executor this tick.
    fn drain_replans(&mut self) {
        let reasons: Vec<ReplanReason> = {
            let mut inbox = self.replan_inbox.lock();
            inbox.drain(..).collect()
        };

        for reason in reasons {
            let failed_goal = match reason {
                ReplanReason::ActionFailed => true,
                ReplanReason::PlanExhausted => self.executor.had_recent_failures(),
                _ => false,
            };
            if failed_goal {
                if let Some(goal) = self.arbiter.current_goal() {
                    debug!(agent = %self.name, goal, %reason, "cooling failed goal down");
                    self.cooldowns.insert(
                        goal.to_string(),
                        Instant::now() + self.config.planning_cooldown(),
                    );
                }
            }
            self.arbiter.clear_current_goal();
        }
    }

    /// Drop expired cooldowns and return the active skip set.
    fn prune_cooldowns(&mut self) -> HashSet<String> {
        let now = Instant::now();
        self.cooldowns.retain(|_, expiry| *expiry > now);
        self.cooldowns.keys().cloned().collect()
    }

    /// One-line agent status.
    pub fn status(&self) -> String {
        format!(
            "{} [{:?}] goal={} executor={}",
            self.name,
            self.state,
            self.arbiter.current_goal().unwrap_or("-"),
            self.executor.status(),
        )
    }

    /// Aggregated counters.
    pub fn stats(&self) -> AgentStats {
        AgentStats {
            ticks: self.ticks,
            plans_built: self.plans_built,
            planning_failures: self.planning_failures,
            preemptions: self.preemptions,
            executor: self.executor.stats(),
        }
    }

    /// Per-goal utility/validity/cooldown table from the current projection.
    pub fn goal_report(&self) -> String {
        let world = self.role.project_world_state(&self.bot, &self.blackboard);
        let now = Instant::now();
        let remaining: HashMap<String, Duration> = self
            .cooldowns
            .iter()
            .filter_map(|(name, expiry)| {
                expiry
                    .checked_duration_since(now)
                    .map(|left| (name.clone(), left))
            })
            .collect();
        self.arbiter.report(&world, &remaining)
    }
}
