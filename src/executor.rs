//! Plan execution with failure and replan discipline
//!
//! The executor owns the current plan and walks it action by action. Actions
//! report cooperatively (`Success`/`Failure`/`Running`); failures advance
//! past the failed action until a consecutive-failure threshold escalates to
//! a replan. A separate drift check compares the live world against the
//! snapshot taken when the plan was loaded. Replans are delivered through an
//! injected callback carrying a typed [`ReplanReason`].

use crate::action::{Action, ActionStatus};
use crate::world_state::WorldState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Why the executor is asking for a new plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplanReason {
    /// The plan ran to the end through successes.
    GoalComplete,
    /// Consecutive action failures crossed the threshold.
    ActionFailed,
    /// The live world drifted too far from the planning snapshot.
    WorldChanged,
    /// The plan ran out of actions without a clean completion.
    PlanExhausted,
}

impl fmt::Display for ReplanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReplanReason::GoalComplete => "goal_complete",
            ReplanReason::ActionFailed => "action_failed",
            ReplanReason::WorldChanged => "world_changed",
            ReplanReason::PlanExhausted => "plan_exhausted",
        };
        write!(f, "{label}")
    }
}

/// Executor tuning knobs.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Consecutive failures tolerated before escalating to a replan.
    pub max_consecutive_failures: u32,
    /// Drift (differing fact keys) tolerated before requesting a replan.
    pub drift_threshold: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            drift_threshold: 5,
        }
    }
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorStats {
    /// Actions started.
    pub actions_executed: u64,
    /// Actions that returned `Success`.
    pub actions_succeeded: u64,
    /// Actions that returned `Failure` (or errored).
    pub actions_failed: u64,
    /// Replan requests emitted, including cancellations.
    pub replans_requested: u64,
}

/// Callback invoked when the executor wants a new plan.
pub type ReplanCallback = Box<dyn FnMut(ReplanReason) + Send>;

/// Runs one plan at a time against the live world.
pub struct Executor<B, K> {
    plan: Vec<Arc<dyn Action<B, K>>>,
    index: usize,
    action_running: bool,
    completed: bool,
    snapshot: Option<WorldState>,
    consecutive_failures: u32,
    stats: ExecutorStats,
    on_replan: Option<ReplanCallback>,
    config: ExecutorConfig,
}

impl<B, K> Executor<B, K> {
    /// New idle executor.
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            plan: Vec::new(),
            index: 0,
            action_running: false,
            completed: false,
            snapshot: None,
            consecutive_failures: 0,
            stats: ExecutorStats::default(),
            on_replan: None,
            config,
        }
    }

    /// Install the replan callback. Fires within the tick that detects the
    /// trigger condition.
    pub fn set_replan_callback(&mut self, callback: ReplanCallback) {
        self.on_replan = Some(callback);
    }

    /// Adopt a plan together with the world snapshot it was planned from.
    pub fn load_plan(&mut self, plan: Vec<Arc<dyn Action<B, K>>>, snapshot: WorldState) {
        if self.is_executing() {
            debug!(
                dropped = self.plan.len() - self.index,
                "replacing an in-flight plan"
            );
        }
        self.plan = plan;
        self.index = 0;
        self.action_running = false;
        self.completed = false;
        self.snapshot = Some(snapshot);
        self.consecutive_failures = 0;
    }

    /// Drive the plan one step. Returns `true` while there is more to do on
    /// subsequent ticks.
    pub async fn tick(&mut self, bot: &mut B, blackboard: &mut K, state: &WorldState) -> bool {
        if self.plan.is_empty() {
            return false;
        }

        if self.index >= self.plan.len() {
            // Only reachable when failure-advance walked off the end.
            self.reset_plan();
            self.emit_replan(ReplanReason::PlanExhausted);
            return false;
        }

        if !self.action_running {
            self.action_running = true;
            self.stats.actions_executed += 1;
            debug!(
                action = self.plan[self.index].name(),
                index = self.index,
                of = self.plan.len(),
                "action started"
            );
        }

        let action = Arc::clone(&self.plan[self.index]);
        let status = match action.execute(bot, blackboard, state).await {
            Ok(status) => status,
            Err(error) => {
                warn!(action = action.name(), %error, "action raised an error");
                ActionStatus::Failure
            }
        };

        match status {
            ActionStatus::Running => true,
            ActionStatus::Success => {
                self.stats.actions_succeeded += 1;
                self.consecutive_failures = 0;
                self.action_running = false;
                self.index += 1;
                if self.index >= self.plan.len() {
                    debug!("plan complete");
                    self.completed = true;
                    self.reset_plan();
                    self.emit_replan(ReplanReason::GoalComplete);
                    return false;
                }
                true
            }
            ActionStatus::Failure => {
                self.stats.actions_failed += 1;
                self.consecutive_failures += 1;
                action.cancel();
                warn!(
                    action = action.name(),
                    failures = self.consecutive_failures,
                    "action failed"
                );
                if self.consecutive_failures >= self.config.max_consecutive_failures {
                    self.reset_plan();
                    self.emit_replan(ReplanReason::ActionFailed);
                    return false;
                }
                // Failure-advance policy: skip the failed action and try the
                // next one.
                self.action_running = false;
                self.index += 1;
                true
            }
        }
    }

    /// Compare the live world against the plan-load snapshot; request a
    /// replan when the drift reaches the configured threshold.
    pub fn check_world_drift(&mut self, state: &WorldState) {
        if !self.is_executing() {
            return;
        }
        let Some(snapshot) = &self.snapshot else {
            return;
        };
        let drift = snapshot.diff(state);
        if drift >= self.config.drift_threshold {
            warn!(drift, threshold = self.config.drift_threshold, "world drifted from plan");
            if self.action_running {
                self.plan[self.index].cancel();
            }
            self.reset_plan();
            self.emit_replan(ReplanReason::WorldChanged);
        }
    }

    /// Abandon the current plan and request a replan with `reason`.
    /// Best-effort: a running action that ignores the signal continues to its
    /// next `execute` boundary.
    pub fn cancel(&mut self, reason: ReplanReason) {
        if self.action_running && self.index < self.plan.len() {
            self.plan[self.index].cancel();
        }
        self.reset_plan();
        self.emit_replan(reason);
    }

    /// True while a plan with remaining work is loaded.
    pub fn is_executing(&self) -> bool {
        !self.plan.is_empty()
    }

    /// True once a plan has run to the end through successes.
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Name of the action currently in flight.
    pub fn current_action_name(&self) -> Option<&str> {
        if self.plan.is_empty() || self.index >= self.plan.len() {
            None
        } else {
            Some(self.plan[self.index].name())
        }
    }

    /// Fraction of the plan dispatched, as a percentage.
    pub fn progress(&self) -> f64 {
        if self.plan.is_empty() {
            if self.completed {
                100.0
            } else {
                0.0
            }
        } else {
            self.index as f64 / self.plan.len() as f64 * 100.0
        }
    }

    /// One-line execution status.
    pub fn status(&self) -> String {
        if let Some(action) = self.current_action_name() {
            format!(
                "executing {}/{} ({:.0}%): {action}",
                self.index + 1,
                self.plan.len(),
                self.progress()
            )
        } else if self.completed {
            "complete".to_string()
        } else {
            "idle".to_string()
        }
    }

    /// Lifetime counters.
    pub fn stats(&self) -> ExecutorStats {
        self.stats
    }

    /// True while the consecutive-failure counter is non-zero.
    pub fn had_recent_failures(&self) -> bool {
        self.consecutive_failures > 0
    }

    fn reset_plan(&mut self) {
        self.plan.clear();
        self.index = 0;
        self.action_running = false;
        self.snapshot = None;
    }

    fn emit_replan(&mut self, reason: ReplanReason) {
        self.stats.replans_requested += 1;
        debug!(%reason, failures = self.consecutive_failures, "replan requested");
        if let Some(callback) = &mut self.on_replan {
            callback(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Effect, Precondition};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted action: returns the queued statuses in order, then repeats
    /// the last one.
    struct Scripted {
        name: &'static str,
        script: Vec<Result<ActionStatus>>,
        calls: AtomicU32,
        cancelled: AtomicU32,
    }

    impl Scripted {
        fn arc(name: &'static str, script: Vec<Result<ActionStatus>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                script,
                calls: AtomicU32::new(0),
                cancelled: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Action<(), ()> for Scripted {
        fn name(&self) -> &str {
            self.name
        }
        fn preconditions(&self) -> &[Precondition] {
            &[]
        }
        fn effects(&self) -> &[Effect] {
            &[]
        }
        fn cost(&self, _state: &WorldState) -> f64 {
            1.0
        }
        async fn execute(
            &self,
            _bot: &mut (),
            _blackboard: &mut (),
            _state: &WorldState,
        ) -> Result<ActionStatus> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let step = self.script.get(call).or_else(|| self.script.last());
            match step {
                Some(Ok(status)) => Ok(*status),
                Some(Err(e)) => Err(anyhow!(e.to_string())),
                None => Ok(ActionStatus::Success),
            }
        }
        fn cancel(&self) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn collecting_executor() -> (Executor<(), ()>, Arc<Mutex<Vec<ReplanReason>>>) {
        let mut executor = Executor::new(ExecutorConfig::default());
        let inbox = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&inbox);
        executor.set_replan_callback(Box::new(move |reason| sink.lock().push(reason)));
        (executor, inbox)
    }

    fn always(status: ActionStatus) -> Arc<Scripted> {
        Scripted::arc("scripted", vec![Ok(status)])
    }

    #[tokio::test]
    async fn successful_plan_completes_with_goal_complete() {
        let (mut executor, inbox) = collecting_executor();
        let plan: Vec<Arc<dyn Action<(), ()>>> = vec![
            Scripted::arc("first", vec![Ok(ActionStatus::Success)]),
            Scripted::arc("second", vec![Ok(ActionStatus::Success)]),
        ];
        executor.load_plan(plan, WorldState::new());

        let world = WorldState::new();
        assert!(executor.tick(&mut (), &mut (), &world).await);
        assert!(!executor.tick(&mut (), &mut (), &world).await);

        assert!(executor.is_complete());
        assert!(!executor.is_executing());
        assert_eq!(*inbox.lock(), vec![ReplanReason::GoalComplete]);

        let stats = executor.stats();
        assert_eq!(stats.actions_executed, 2);
        assert_eq!(stats.actions_succeeded, 2);
        assert_eq!(stats.actions_failed, 0);
    }

    #[tokio::test]
    async fn failure_escalation_emits_one_action_failed() {
        let (mut executor, inbox) = collecting_executor();
        let plan: Vec<Arc<dyn Action<(), ()>>> = (0..5)
            .map(|_| always(ActionStatus::Failure) as Arc<dyn Action<(), ()>>)
            .collect();
        executor.load_plan(plan, WorldState::new());

        let world = WorldState::new();
        for _ in 0..6 {
            executor.tick(&mut (), &mut (), &world).await;
        }

        let stats = executor.stats();
        assert_eq!(stats.actions_failed, 3);
        assert_eq!(*inbox.lock(), vec![ReplanReason::ActionFailed]);
        assert!(!executor.is_executing());
        assert!(executor.had_recent_failures());
    }

    #[tokio::test]
    async fn failure_below_threshold_advances_past_the_action() {
        let (mut executor, inbox) = collecting_executor();
        let failing = Scripted::arc("flaky", vec![Ok(ActionStatus::Failure)]);
        let plan: Vec<Arc<dyn Action<(), ()>>> = vec![
            Arc::clone(&failing) as Arc<dyn Action<(), ()>>,
            always(ActionStatus::Success),
        ];
        executor.load_plan(plan, WorldState::new());

        let world = WorldState::new();
        assert!(executor.tick(&mut (), &mut (), &world).await);
        assert!(!executor.tick(&mut (), &mut (), &world).await);

        assert_eq!(failing.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(*inbox.lock(), vec![ReplanReason::GoalComplete]);

        let stats = executor.stats();
        assert_eq!(stats.actions_failed, 1);
        assert_eq!(stats.actions_succeeded, 1);
    }

    #[tokio::test]
    async fn error_from_execute_is_folded_into_failure() {
        let (mut executor, inbox) = collecting_executor();
        let plan: Vec<Arc<dyn Action<(), ()>>> = vec![Scripted::arc(
            "broken",
            vec![Err(anyhow!("pathfinding timed out"))],
        )];
        executor.load_plan(plan, WorldState::new());

        let world = WorldState::new();
        // a single failed action walks off the end of the one-action plan
        assert!(executor.tick(&mut (), &mut (), &world).await);
        assert!(!executor.tick(&mut (), &mut (), &world).await);

        assert_eq!(executor.stats().actions_failed, 1);
        assert_eq!(*inbox.lock(), vec![ReplanReason::PlanExhausted]);
    }

    #[tokio::test]
    async fn drift_past_threshold_requests_world_changed() {
        let (mut executor, inbox) = collecting_executor();
        let running = always(ActionStatus::Running);
        executor.load_plan(
            vec![Arc::clone(&running) as Arc<dyn Action<(), ()>>],
            WorldState::new()
                .with("a", 1.0)
                .with("b", 2.0)
                .with("c", 3.0)
                .with("d", 4.0)
                .with("e", 5.0),
        );

        let world = WorldState::new()
            .with("a", 1.0)
            .with("b", 2.0)
            .with("c", 3.0)
            .with("d", 4.0)
            .with("e", 5.0);
        assert!(executor.tick(&mut (), &mut (), &world).await);
        executor.check_world_drift(&world);
        assert!(inbox.lock().is_empty());

        let drifted = WorldState::new()
            .with("a", 9.0)
            .with("b", 9.0)
            .with("c", 9.0)
            .with("d", 9.0)
            .with("e", 9.0);
        executor.check_world_drift(&drifted);

        assert_eq!(*inbox.lock(), vec![ReplanReason::WorldChanged]);
        assert_eq!(running.cancelled.load(Ordering::SeqCst), 1);
        assert!(!executor.is_executing());
    }

    #[tokio::test]
    async fn running_action_is_polled_again() {
        let (mut executor, _inbox) = collecting_executor();
        let slow = Scripted::arc(
            "slow",
            vec![
                Ok(ActionStatus::Running),
                Ok(ActionStatus::Running),
                Ok(ActionStatus::Success),
            ],
        );
        executor.load_plan(
            vec![Arc::clone(&slow) as Arc<dyn Action<(), ()>>],
            WorldState::new(),
        );

        let world = WorldState::new();
        assert!(executor.tick(&mut (), &mut (), &world).await);
        assert!(executor.tick(&mut (), &mut (), &world).await);
        assert!(!executor.tick(&mut (), &mut (), &world).await);

        assert_eq!(slow.calls.load(Ordering::SeqCst), 3);
        // one logical action despite three polls
        assert_eq!(executor.stats().actions_executed, 1);
        assert_eq!(executor.stats().actions_succeeded, 1);
    }

    #[tokio::test]
    async fn cancel_on_idle_executor_only_bumps_counters() {
        let (mut executor, inbox) = collecting_executor();

        executor.cancel(ReplanReason::WorldChanged);

        assert_eq!(executor.stats().replans_requested, 1);
        assert_eq!(*inbox.lock(), vec![ReplanReason::WorldChanged]);
        assert!(!executor.is_executing());
        assert_eq!(executor.progress(), 0.0);
    }

    #[tokio::test]
    async fn tick_on_empty_plan_is_a_no_op() {
        let (mut executor, inbox) = collecting_executor();
        let world = WorldState::new();

        assert!(!executor.tick(&mut (), &mut (), &world).await);
        assert_eq!(executor.stats(), ExecutorStats::default());
        assert!(inbox.lock().is_empty());
        assert_eq!(executor.status(), "idle");
    }

    #[tokio::test]
    async fn stats_balance_at_quiescence() {
        let (mut executor, _inbox) = collecting_executor();
        let plan: Vec<Arc<dyn Action<(), ()>>> = vec![
            always(ActionStatus::Success),
            always(ActionStatus::Failure),
            always(ActionStatus::Success),
        ];
        executor.load_plan(plan, WorldState::new());

        let world = WorldState::new();
        while executor.tick(&mut (), &mut (), &world).await {}

        let stats = executor.stats();
        assert_eq!(
            stats.actions_succeeded + stats.actions_failed,
            stats.actions_executed
        );
    }

    #[tokio::test]
    async fn progress_and_status_track_the_index() {
        let (mut executor, _inbox) = collecting_executor();
        let plan: Vec<Arc<dyn Action<(), ()>>> = vec![
            always(ActionStatus::Success),
            always(ActionStatus::Running),
        ];
        executor.load_plan(plan, WorldState::new());

        assert_eq!(executor.progress(), 0.0);
        let world = WorldState::new();
        executor.tick(&mut (), &mut (), &world).await;
        assert_eq!(executor.progress(), 50.0);
        assert!(executor.status().starts_with("executing 2/2"));
    }
}
