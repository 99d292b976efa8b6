//! A* planner over symbolic world states
//!
//! Actions are the edges: a node expands by applying every applicable
//! action's effects to a clone of its state. The open set is a binary heap
//! keyed by `f = g + h` with stable insertion-order tie-breaking; duplicate
//! states are folded through a canonical key built from a domain-supplied
//! whitelist of planning-relevant facts. The whitelist dedup is deliberately
//! lossy: it bounds the state space at the cost of very rare false
//! identifications, which the executor's drift detector catches at runtime.

use crate::action::Action;
use crate::goal::{Comparison, Goal};
use crate::world_state::WorldState;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

/// Assumed average action cost, weighting the heuristic's step estimates.
const AVERAGE_ACTION_COST: f64 = 3.0;

/// Flat heuristic penalty for an unsatisfied condition without numeric
/// metadata.
const UNSATISFIED_PENALTY: f64 = 5.0;

/// Planner tuning knobs.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Upper bound on open-set dequeues before the search gives up.
    pub max_iterations: usize,
    /// Whitelist of fact keys that identify a planning state. Facts off the
    /// list are invisible to deduplication. An empty list keys on the full
    /// state (no lossy folding).
    pub relevant_keys: Vec<String>,
    /// Emit a per-expansion trace record.
    pub debug: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            relevant_keys: Vec::new(),
            debug: false,
        }
    }
}

/// Outcome of one planning request. The planner never errors; failure is a
/// `success = false` result carrying diagnostics.
pub struct PlanResult<B, K> {
    /// Whether a plan reaching the goal was found.
    pub success: bool,
    /// Actions in execution order; empty when the goal already holds or the
    /// search failed.
    pub plan: Vec<Arc<dyn Action<B, K>>>,
    /// Sum of action costs along the plan.
    pub total_cost: f64,
    /// Open-set dequeues performed, for diagnostics.
    pub nodes_explored: usize,
}

impl<B, K> PlanResult<B, K> {
    fn failure(nodes_explored: usize) -> Self {
        Self {
            success: false,
            plan: Vec::new(),
            total_cost: 0.0,
            nodes_explored,
        }
    }

    /// Action names in execution order.
    pub fn action_names(&self) -> Vec<&str> {
        self.plan.iter().map(|a| a.name()).collect()
    }

    /// Number of actions in the plan.
    pub fn len(&self) -> usize {
        self.plan.len()
    }

    /// True when the plan carries no actions.
    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }
}

impl<B, K> fmt::Debug for PlanResult<B, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanResult")
            .field("success", &self.success)
            .field("plan", &self.action_names())
            .field("total_cost", &self.total_cost)
            .field("nodes_explored", &self.nodes_explored)
            .finish()
    }
}

/// Search node; owned by the arena, linked by parent indices for plan
/// reconstruction.
struct Node {
    state: WorldState,
    g: f64,
    action: Option<usize>,
    parent: Option<usize>,
}

/// Heap entry. `BinaryHeap` is a max-heap, so the ordering is reversed on `f`
/// and, among equal `f`, reversed on insertion sequence to keep ties stable.
struct OpenEntry {
    f: f64,
    seq: u64,
    node: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f && self.seq == other.seq
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .partial_cmp(&self.f)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A* planner owning the agent's action set.
pub struct Planner<B, K> {
    actions: Vec<Arc<dyn Action<B, K>>>,
    config: PlannerConfig,
}

impl<B, K> Planner<B, K> {
    /// New planner with the given configuration and no actions.
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            actions: Vec::new(),
            config,
        }
    }

    /// Register an action.
    pub fn add_action(&mut self, action: Arc<dyn Action<B, K>>) {
        self.actions.push(action);
    }

    /// Register multiple actions.
    pub fn add_actions(&mut self, actions: impl IntoIterator<Item = Arc<dyn Action<B, K>>>) {
        self.actions.extend(actions);
    }

    /// The registered action set.
    pub fn actions(&self) -> &[Arc<dyn Action<B, K>>] {
        &self.actions
    }

    /// Search for a plan taking `initial` to a state satisfying `goal`.
    pub fn plan(&self, initial: &WorldState, goal: &Goal) -> PlanResult<B, K> {
        if goal.is_satisfied(initial) {
            return PlanResult {
                success: true,
                plan: Vec::new(),
                total_cost: 0.0,
                nodes_explored: 0,
            };
        }

        let mut arena: Vec<Node> = vec![Node {
            state: initial.clone(),
            g: 0.0,
            action: None,
            parent: None,
        }];
        let mut open = BinaryHeap::new();
        open.push(OpenEntry {
            f: self.heuristic(initial, goal),
            seq: 0,
            node: 0,
        });
        let mut seq: u64 = 1;

        let mut closed: HashSet<String> = HashSet::new();
        // Best g seen per canonical key, open or closed. Backs the open-set
        // dominance rule: a queued entry whose g has been beaten is dropped
        // lazily when dequeued.
        let mut best_g: HashMap<String, f64> = HashMap::new();
        best_g.insert(self.canonical_key(initial), 0.0);

        let mut nodes_explored = 0usize;

        while let Some(entry) = open.pop() {
            if nodes_explored >= self.config.max_iterations {
                debug!(
                    goal = %goal.name,
                    nodes_explored,
                    "planning aborted: iteration budget exhausted"
                );
                return PlanResult::failure(nodes_explored);
            }
            nodes_explored += 1;

            let (current_state, current_g) = {
                let node = &arena[entry.node];
                (node.state.clone(), node.g)
            };
            let current_key = self.canonical_key(&current_state);

            // Lazy deletion: a cheaper route to this state was queued later.
            if best_g
                .get(&current_key)
                .is_some_and(|&g| current_g > g + f64::EPSILON)
            {
                continue;
            }

            // Goal test happens on dequeue, not at generation.
            if goal.is_satisfied(&current_state) {
                return self.reconstruct(&arena, entry.node, current_g, nodes_explored);
            }

            if !closed.insert(current_key) {
                continue;
            }

            for (index, action) in self.actions.iter().enumerate() {
                if !action.check_preconditions(&current_state) {
                    continue;
                }

                let successor = action.apply_effects(&current_state);
                // Cost is evaluated on the parent state.
                let g = current_g + action.cost(&current_state);
                let key = self.canonical_key(&successor);

                if closed.contains(&key) {
                    continue;
                }
                if best_g.get(&key).is_some_and(|&known| known <= g) {
                    continue;
                }
                best_g.insert(key, g);

                let h = self.heuristic(&successor, goal);
                if self.config.debug {
                    debug!(
                        action = action.name(),
                        g,
                        h,
                        f = g + h,
                        "expanding"
                    );
                }

                arena.push(Node {
                    state: successor,
                    g,
                    action: Some(index),
                    parent: Some(entry.node),
                });
                open.push(OpenEntry {
                    f: g + h,
                    seq,
                    node: arena.len() - 1,
                });
                seq += 1;
            }
        }

        debug!(goal = %goal.name, nodes_explored, "planning failed: open set exhausted");
        PlanResult::failure(nodes_explored)
    }

    fn reconstruct(
        &self,
        arena: &[Node],
        mut index: usize,
        total_cost: f64,
        nodes_explored: usize,
    ) -> PlanResult<B, K> {
        let mut plan = Vec::new();
        loop {
            let node = &arena[index];
            match (node.action, node.parent) {
                (Some(action), Some(parent)) => {
                    plan.push(Arc::clone(&self.actions[action]));
                    index = parent;
                }
                _ => break,
            }
        }
        plan.reverse();

        PlanResult {
            success: true,
            plan,
            total_cost,
            nodes_explored,
        }
    }

    /// Estimated remaining cost from `state` to `goal`. Not strictly
    /// admissible: the average-cost weighting can over-estimate, trading
    /// optimality guarantees for strong guidance.
    fn heuristic(&self, state: &WorldState, goal: &Goal) -> f64 {
        let mut h = 0.0;
        for condition in goal.conditions() {
            if condition.holds(state) {
                continue;
            }
            match &condition.numeric_target {
                Some(target) if target.estimated_delta.abs() > f64::EPSILON => {
                    let current = state.get_number(&condition.key);
                    let distance = match target.comparison {
                        Comparison::Gte => (target.value - current).max(0.0),
                        Comparison::Lte => (current - target.value).max(0.0),
                        Comparison::Eq => (target.value - current).abs(),
                    };
                    let steps = (distance / target.estimated_delta.abs()).ceil();
                    h += steps * AVERAGE_ACTION_COST;
                }
                _ => h += UNSATISFIED_PENALTY,
            }
        }
        h
    }

    /// Deterministic identity of a planning state. Renders the whitelisted
    /// facts in declaration order; with an empty whitelist, renders the full
    /// state in sorted key order.
    fn canonical_key(&self, state: &WorldState) -> String {
        let mut key = String::new();
        if self.config.relevant_keys.is_empty() {
            let sorted: BTreeMap<_, _> = state.iter().collect();
            for (k, v) in sorted {
                let _ = write!(key, "{k}={v};");
            }
        } else {
            for k in &self.config.relevant_keys {
                let _ = write!(key, "{k}={};", state.get(k));
            }
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionStatus, Effect, Precondition};
    use crate::goal::GoalCondition;
    use anyhow::Result;
    use async_trait::async_trait;

    struct TestAction {
        name: &'static str,
        cost: f64,
        preconditions: Vec<Precondition>,
        effects: Vec<Effect>,
    }

    impl TestAction {
        fn arc(
            name: &'static str,
            cost: f64,
            preconditions: Vec<Precondition>,
            effects: Vec<Effect>,
        ) -> Arc<dyn Action<(), ()>> {
            Arc::new(Self {
                name,
                cost,
                preconditions,
                effects,
            })
        }
    }

    #[async_trait]
    impl Action<(), ()> for TestAction {
        fn name(&self) -> &str {
            self.name
        }

        fn preconditions(&self) -> &[Precondition] {
            &self.preconditions
        }

        fn effects(&self) -> &[Effect] {
            &self.effects
        }

        fn cost(&self, _state: &WorldState) -> f64 {
            self.cost
        }

        async fn execute(
            &self,
            _bot: &mut (),
            _blackboard: &mut (),
            _state: &WorldState,
        ) -> Result<ActionStatus> {
            Ok(ActionStatus::Success)
        }
    }

    fn pickup_items() -> Arc<dyn Action<(), ()>> {
        TestAction::arc(
            "PickupItems",
            2.0,
            vec![Precondition::is_false("state.inventoryFull")],
            vec![Effect::set("nearby.drops", 0.0)],
        )
    }

    #[test]
    fn goal_already_satisfied_yields_empty_plan() {
        let mut planner = Planner::new(PlannerConfig::default());
        planner.add_action(pickup_items());

        let state = WorldState::new()
            .with("nearby.drops", 0.0)
            .with("state.inventoryFull", false);
        let goal = Goal::new("clean_ground")
            .with_condition(GoalCondition::at_most("nearby.drops", 0.0));

        let result = planner.plan(&state, &goal);
        assert!(result.success);
        assert!(result.is_empty());
        assert_eq!(result.total_cost, 0.0);
        assert_eq!(result.nodes_explored, 0);
    }

    #[test]
    fn single_action_plan() {
        let mut planner = Planner::new(PlannerConfig::default());
        planner.add_action(pickup_items());

        let state = WorldState::new()
            .with("nearby.drops", 5.0)
            .with("state.inventoryFull", false);
        let goal = Goal::new("clean_ground")
            .with_condition(GoalCondition::at_most("nearby.drops", 0.0));

        let result = planner.plan(&state, &goal);
        assert!(result.success);
        assert_eq!(result.action_names(), ["PickupItems"]);
        assert_eq!(result.total_cost, 2.0);
    }

    #[test]
    fn chained_preconditions_order_the_plan() {
        let mut planner = Planner::new(PlannerConfig::default());
        planner.add_actions([
            TestAction::arc(
                "ProcessWood",
                1.0,
                vec![Precondition::at_least("inv.logs", 1.0)],
                vec![Effect::subtract("inv.logs", 1.0), Effect::add("inv.planks", 4.0)],
            ),
            TestAction::arc(
                "CraftHoe",
                3.0,
                vec![
                    Precondition::at_least("inv.planks", 4.0),
                    Precondition::at_least("nearby.craftingTables", 1.0),
                ],
                vec![Effect::set("has.hoe", true), Effect::subtract("inv.planks", 4.0)],
            ),
        ]);

        let state = WorldState::new()
            .with("has.hoe", false)
            .with("inv.logs", 2.0)
            .with("inv.planks", 0.0)
            .with("nearby.craftingTables", 1.0);
        let goal = Goal::new("tooled_up").with_condition(GoalCondition::is_true("has.hoe"));

        let result = planner.plan(&state, &goal);
        assert!(result.success);
        assert_eq!(result.action_names(), ["ProcessWood", "CraftHoe"]);
        assert_eq!(result.total_cost, 4.0);
    }

    #[test]
    fn planned_effects_reach_the_goal_from_the_initial_state() {
        // Replaying the returned plan's effects over the initial snapshot
        // must land in a goal-satisfying state.
        let mut planner = Planner::new(PlannerConfig::default());
        planner.add_actions([
            TestAction::arc(
                "ProcessWood",
                1.0,
                vec![Precondition::at_least("inv.logs", 1.0)],
                vec![Effect::subtract("inv.logs", 1.0), Effect::add("inv.planks", 4.0)],
            ),
            TestAction::arc(
                "CraftHoe",
                3.0,
                vec![Precondition::at_least("inv.planks", 4.0)],
                vec![Effect::set("has.hoe", true), Effect::subtract("inv.planks", 4.0)],
            ),
        ]);

        let initial = WorldState::new().with("inv.logs", 3.0);
        let goal = Goal::new("tooled_up").with_condition(GoalCondition::is_true("has.hoe"));

        let result = planner.plan(&initial, &goal);
        assert!(result.success);

        let mut replayed = initial.clone();
        for action in &result.plan {
            assert!(action.check_preconditions(&replayed));
            replayed = action.apply_effects(&replayed);
        }
        assert!(goal.is_satisfied(&replayed));
    }

    #[test]
    fn cheaper_alternative_is_chosen() {
        let mut planner = Planner::new(PlannerConfig::default());
        planner.add_actions([
            TestAction::arc(
                "BuySeeds",
                10.0,
                vec![],
                vec![Effect::set("inv.seeds", 10.0)],
            ),
            TestAction::arc(
                "ForageSeeds",
                1.0,
                vec![],
                vec![Effect::set("inv.seeds", 10.0)],
            ),
        ]);

        let state = WorldState::new().with("inv.seeds", 0.0);
        let goal = Goal::new("stocked").with_condition(GoalCondition::equals("inv.seeds", 10.0));

        let result = planner.plan(&state, &goal);
        assert!(result.success);
        assert_eq!(result.action_names(), ["ForageSeeds"]);
        assert_eq!(result.total_cost, 1.0);
    }

    #[test]
    fn iteration_budget_bounds_the_search() {
        let config = PlannerConfig {
            max_iterations: 100,
            ..PlannerConfig::default()
        };
        let mut planner = Planner::new(config);
        planner.add_action(TestAction::arc(
            "GatherOne",
            1.0,
            vec![],
            vec![Effect::add("inv.items", 1.0)],
        ));

        let goal = Goal::new("hoard")
            .with_condition(GoalCondition::at_least("inv.items", 1000.0));

        let result = planner.plan(&WorldState::new(), &goal);
        assert!(!result.success);
        assert!(result.is_empty());
        assert!(result.nodes_explored <= 100);
    }

    #[test]
    fn no_actions_means_failure_unless_satisfied() {
        let planner: Planner<(), ()> = Planner::new(PlannerConfig::default());
        let goal = Goal::new("anything").with_condition(GoalCondition::is_true("done"));

        let result = planner.plan(&WorldState::new(), &goal);
        assert!(!result.success);

        let satisfied = planner.plan(&WorldState::new().with("done", true), &goal);
        assert!(satisfied.success);
        assert!(satisfied.is_empty());
    }

    #[test]
    fn whitelist_folds_irrelevant_facts() {
        // Two states differing only off-whitelist must share a canonical key.
        let config = PlannerConfig {
            relevant_keys: vec!["has.axe".into(), "inv.logs".into()],
            ..PlannerConfig::default()
        };
        let planner: Planner<(), ()> = Planner::new(config);

        let a = WorldState::new().with("has.axe", true).with("weather", "rain");
        let b = WorldState::new().with("has.axe", true).with("weather", "clear");

        assert_eq!(planner.canonical_key(&a), planner.canonical_key(&b));

        let c = WorldState::new().with("has.axe", false);
        assert_ne!(planner.canonical_key(&a), planner.canonical_key(&c));
    }

    #[test]
    fn dynamic_cost_reads_the_parent_state() {
        struct DiscountedCraft;

        #[async_trait]
        impl Action<(), ()> for DiscountedCraft {
            fn name(&self) -> &str {
                "DiscountedCraft"
            }
            fn preconditions(&self) -> &[Precondition] {
                &[]
            }
            fn effects(&self) -> &[Effect] {
                &[]
            }
            fn cost(&self, state: &WorldState) -> f64 {
                if state.get_bool("near.station") {
                    1.0
                } else {
                    6.0
                }
            }
            async fn execute(
                &self,
                _bot: &mut (),
                _blackboard: &mut (),
                _state: &WorldState,
            ) -> Result<ActionStatus> {
                Ok(ActionStatus::Success)
            }
        }

        let action = DiscountedCraft;
        assert_eq!(action.cost(&WorldState::new().with("near.station", true)), 1.0);
        assert_eq!(action.cost(&WorldState::new()), 6.0);
    }
}
