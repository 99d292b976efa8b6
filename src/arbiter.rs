//! Utility-driven goal arbitration
//!
//! The arbiter scores every valid, non-cooldowned goal by utility and decides
//! which one the agent pursues. Switching away from the incumbent requires
//! beating it by a multiplicative hysteresis margin; interrupting a running
//! plan (pre-emption) requires a stricter additive margin, because dropping a
//! plan mid-flight forfeits sunk cost.

use crate::goal::Goal;
use crate::world_state::WorldState;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Arbiter tuning knobs.
#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    /// Multiplicative margin a challenger must exceed to displace the
    /// incumbent during idle selection.
    pub hysteresis: f64,
    /// Additive margin a challenger must exceed to pre-empt a running plan.
    pub preemption_threshold: f64,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            hysteresis: 0.2,
            preemption_threshold: 30.0,
        }
    }
}

/// Why the arbiter returned the goal it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionReason {
    /// No goal was current; this is a fresh pick.
    Initial,
    /// The incumbent goal survived its challengers.
    Stay,
    /// A challenger displaced the incumbent (or the incumbent lapsed).
    Switch,
}

/// A selected goal with its utility at selection time.
#[derive(Debug, Clone)]
pub struct Selection {
    /// The chosen goal.
    pub goal: Arc<Goal>,
    /// Utility at the moment of selection.
    pub utility: f64,
    /// Why this goal was chosen.
    pub reason: SelectionReason,
}

/// Stateful goal selector.
///
/// Owns the goal registry plus the identity of the current goal. The stored
/// utility is the selection-time value and is diagnostic only; pre-emption
/// re-evaluates both sides freshly.
pub struct Arbiter {
    goals: Vec<Arc<Goal>>,
    current_goal: Option<String>,
    current_utility: f64,
    config: ArbiterConfig,
}

impl Arbiter {
    /// New arbiter with the given configuration and no goals.
    pub fn new(config: ArbiterConfig) -> Self {
        Self {
            goals: Vec::new(),
            current_goal: None,
            current_utility: 0.0,
            config,
        }
    }

    /// Register a goal.
    pub fn add_goal(&mut self, goal: Arc<Goal>) {
        self.goals.push(goal);
    }

    /// Register multiple goals.
    pub fn add_goals(&mut self, goals: impl IntoIterator<Item = Arc<Goal>>) {
        self.goals.extend(goals);
    }

    /// The registered goals.
    pub fn goals(&self) -> &[Arc<Goal>] {
        &self.goals
    }

    /// Name of the goal currently held, if any.
    pub fn current_goal(&self) -> Option<&str> {
        self.current_goal.as_deref()
    }

    /// Utility recorded when the current goal was selected. Diagnostic only.
    pub fn current_utility(&self) -> f64 {
        self.current_utility
    }

    /// Forget the current goal. Called on failed planning, on replans, and on
    /// world drift.
    pub fn clear_current_goal(&mut self) {
        self.current_goal = None;
        self.current_utility = 0.0;
    }

    /// Valid, non-cooldowned goals with positive utility, scored.
    fn candidates(
        &self,
        state: &WorldState,
        skip: &HashSet<String>,
    ) -> Vec<(Arc<Goal>, f64)> {
        self.goals
            .iter()
            .filter(|g| !skip.contains(&g.name))
            .filter(|g| g.is_valid(state))
            .map(|g| (Arc::clone(g), g.utility(state)))
            .filter(|(_, utility)| *utility > 0.0)
            .collect()
    }

    /// Highest-utility candidate, first wins ties.
    fn argmax(candidates: &[(Arc<Goal>, f64)]) -> Option<(Arc<Goal>, f64)> {
        candidates
            .iter()
            .fold(None::<(Arc<Goal>, f64)>, |best, (goal, utility)| match best {
                Some((_, best_utility)) if *utility <= best_utility => best,
                _ => Some((Arc::clone(goal), *utility)),
            })
    }

    /// Pick the goal to pursue from `state`, skipping names in `skip`
    /// (cooldowned goals). Applies hysteresis against the incumbent;
    /// hysteresis is skipped when the incumbent itself has been filtered out.
    pub fn select_goal(
        &mut self,
        state: &WorldState,
        skip: &HashSet<String>,
    ) -> Option<Selection> {
        let candidates = self.candidates(state, skip);

        let incumbent = self
            .current_goal
            .as_ref()
            .and_then(|name| candidates.iter().find(|(g, _)| g.name == *name))
            .cloned();

        match incumbent {
            None => {
                let had_current = self.current_goal.is_some();
                let (goal, utility) = match Self::argmax(&candidates) {
                    Some(best) => best,
                    None => {
                        self.clear_current_goal();
                        return None;
                    }
                };
                let reason = if had_current {
                    SelectionReason::Switch
                } else {
                    SelectionReason::Initial
                };
                debug!(goal = %goal.name, utility, ?reason, "goal selected");
                self.current_goal = Some(goal.name.clone());
                self.current_utility = utility;
                Some(Selection {
                    goal,
                    utility,
                    reason,
                })
            }
            Some((current, current_utility)) => {
                let challenger = Self::argmax(
                    &candidates
                        .iter()
                        .filter(|(g, _)| g.name != current.name)
                        .cloned()
                        .collect::<Vec<_>>(),
                );

                if let Some((goal, utility)) = challenger {
                    if utility > current_utility * (1.0 + self.config.hysteresis) {
                        debug!(
                            from = %current.name,
                            to = %goal.name,
                            utility,
                            "goal switch past hysteresis"
                        );
                        self.current_goal = Some(goal.name.clone());
                        self.current_utility = utility;
                        return Some(Selection {
                            goal,
                            utility,
                            reason: SelectionReason::Switch,
                        });
                    }
                }

                self.current_utility = current_utility;
                Some(Selection {
                    goal: current,
                    utility: current_utility,
                    reason: SelectionReason::Stay,
                })
            }
        }
    }

    /// While a plan is executing: should a challenger interrupt it?
    ///
    /// Both the incumbent's and the challengers' utilities are evaluated
    /// freshly. A challenger wins only by exceeding the incumbent's utility
    /// by the additive pre-emption threshold; the winner becomes current.
    pub fn check_preemption(
        &mut self,
        state: &WorldState,
        skip: &HashSet<String>,
    ) -> Option<Selection> {
        let current_name = self.current_goal.clone()?;
        let current_utility = self
            .goals
            .iter()
            .find(|g| g.name == current_name)
            .map(|g| g.utility(state))?;

        let candidates = self.candidates(state, skip);
        let challenger = Self::argmax(
            &candidates
                .iter()
                .filter(|(g, _)| g.name != current_name)
                .cloned()
                .collect::<Vec<_>>(),
        )?;

        let (goal, utility) = challenger;
        if utility > current_utility + self.config.preemption_threshold {
            debug!(
                from = %current_name,
                to = %goal.name,
                utility,
                current_utility,
                "pre-empting running goal"
            );
            self.current_goal = Some(goal.name.clone());
            self.current_utility = utility;
            return Some(Selection {
                goal,
                utility,
                reason: SelectionReason::Switch,
            });
        }
        None
    }

    /// Human-readable per-goal table: utility, validity, cooldown remaining,
    /// and a marker on the current goal.
    pub fn report(&self, state: &WorldState, cooldowns: &HashMap<String, Duration>) -> String {
        let mut out = String::from("goal                     utility   valid  cooldown\n");
        for goal in &self.goals {
            let marker = if self.current_goal.as_deref() == Some(goal.name.as_str()) {
                "*"
            } else {
                " "
            };
            let cooldown = cooldowns
                .get(&goal.name)
                .map(|d| format!("{:.1}s", d.as_secs_f64()))
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "{marker}{:<24} {:>8.2}   {:<5}  {cooldown}",
                goal.name,
                goal.utility(state),
                goal.is_valid(state),
            );
        }
        out
    }
}
