//! Plan search over string-keyed integer states
//!
//! The rest of the crate treats the solver as a black box: it hands over
//! a start state, goal requirements, and weighted actions, and gets back
//! an ordered list of action names, or nothing if the goal is unreachable.

use crate::state::conditions::{Condition, Effect};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap, HashMap};

/// Solver-side world state; absent keys read as 0
pub type SolverState = BTreeMap<String, i64>;

/// Requirement on one integer key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Eq(i64),
    Ge(i64),
    Le(i64),
}

impl Requirement {
    pub fn holds(&self, value: i64) -> bool {
        match self {
            Requirement::Eq(v) => value == *v,
            Requirement::Ge(v) => value >= *v,
            Requirement::Le(v) => value <= *v,
        }
    }
}

impl From<&Condition> for Requirement {
    fn from(condition: &Condition) -> Self {
        match condition {
            Condition::Equals(v) => Requirement::Eq(v.as_i64()),
            Condition::AtLeast(n) => Requirement::Ge(*n),
            Condition::AtMost(n) => Requirement::Le(*n),
        }
    }
}

/// Change applied to one integer key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Set(i64),
    Add(i64),
}

impl From<&Effect> for Change {
    fn from(effect: &Effect) -> Self {
        match effect {
            Effect::Set(v) => Change::Set(v.as_i64()),
            Effect::Add(n) => Change::Add(*n),
        }
    }
}

/// Action in the solver's primitive form
#[derive(Debug, Clone, PartialEq)]
pub struct SolverAction {
    pub name: String,
    pub cost: u32,
    pub preconditions: BTreeMap<String, Requirement>,
    pub effects: BTreeMap<String, Change>,
}

impl SolverAction {
    fn applicable(&self, state: &SolverState) -> bool {
        self.preconditions
            .iter()
            .all(|(key, req)| req.holds(value_of(state, key)))
    }

    fn apply(&self, state: &SolverState) -> SolverState {
        let mut next = state.clone();
        for (key, change) in &self.effects {
            let value = match change {
                Change::Set(v) => *v,
                Change::Add(n) => value_of(state, key).saturating_add(*n),
            };
            next.insert(key.clone(), value);
        }
        next
    }
}

fn value_of(state: &SolverState, key: &str) -> i64 {
    state.get(key).copied().unwrap_or(0)
}

/// Number of goal requirements `state` does not meet
pub fn unmet_count(state: &SolverState, goal: &BTreeMap<String, Requirement>) -> usize {
    goal.iter()
        .filter(|(key, req)| !req.holds(value_of(state, key)))
        .count()
}

/// Search strategy turning a start state into an ordered action sequence
pub trait Solver: Send + Sync {
    /// Lowest-cost sequence of action names reaching `goal`, or empty
    fn solve(
        &self,
        start: &SolverState,
        goal: &BTreeMap<String, Requirement>,
        actions: &[SolverAction],
    ) -> Vec<String>;
}

/// Open-list entry ordered by estimated total cost, then cost so far
#[derive(Debug, PartialEq, Eq)]
struct Node {
    estimate: u64,
    cost: u64,
    seq: u64,
    state: SolverState,
    path: Vec<usize>,
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        Reverse(self.estimate)
            .cmp(&Reverse(other.estimate))
            .then_with(|| Reverse(self.cost).cmp(&Reverse(other.cost)))
            .then_with(|| Reverse(self.seq).cmp(&Reverse(other.seq)))
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* over solver states with the unmet-requirement count as heuristic
///
/// The expansion budget bounds the search on unreachable goals, where
/// additive effects would otherwise make the state space unbounded.
#[derive(Debug, Clone)]
pub struct BestFirstSolver {
    max_expansions: usize,
    max_plan_length: usize,
}

impl Default for BestFirstSolver {
    fn default() -> Self {
        Self {
            max_expansions: 20_000,
            max_plan_length: 24,
        }
    }
}

impl BestFirstSolver {
    pub fn new(max_expansions: usize, max_plan_length: usize) -> Self {
        Self {
            max_expansions,
            max_plan_length,
        }
    }
}

impl Solver for BestFirstSolver {
    fn solve(
        &self,
        start: &SolverState,
        goal: &BTreeMap<String, Requirement>,
        actions: &[SolverAction],
    ) -> Vec<String> {
        if unmet_count(start, goal) == 0 {
            return Vec::new();
        }

        let mut open = BinaryHeap::new();
        let mut best_cost: HashMap<SolverState, u64> = HashMap::new();
        let mut seq = 0u64;

        best_cost.insert(start.clone(), 0);
        open.push(Node {
            estimate: unmet_count(start, goal) as u64,
            cost: 0,
            seq,
            state: start.clone(),
            path: Vec::new(),
        });

        let mut expansions = 0usize;
        while let Some(node) = open.pop() {
            if unmet_count(&node.state, goal) == 0 {
                return node
                    .path
                    .iter()
                    .map(|i| actions[*i].name.clone())
                    .collect();
            }

            expansions += 1;
            if expansions > self.max_expansions {
                break;
            }
            if node.path.len() >= self.max_plan_length {
                continue;
            }
            // Stale entry
            if best_cost.get(&node.state).map(|c| *c < node.cost).unwrap_or(false) {
                continue;
            }

            for (index, action) in actions.iter().enumerate() {
                if !action.applicable(&node.state) {
                    continue;
                }
                let next = action.apply(&node.state);
                let cost = node.cost + u64::from(action.cost.max(1));
                if best_cost.get(&next).map(|c| *c <= cost).unwrap_or(false) {
                    continue;
                }
                best_cost.insert(next.clone(), cost);

                let mut path = node.path.clone();
                path.push(index);
                seq += 1;
                open.push(Node {
                    estimate: cost + unmet_count(&next, goal) as u64,
                    cost,
                    seq,
                    state: next,
                    path,
                });
            }
        }

        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(name: &str, cost: u32, pre: &[(&str, Requirement)], eff: &[(&str, Change)]) -> SolverAction {
        SolverAction {
            name: name.to_string(),
            cost,
            preconditions: pre.iter().map(|(k, r)| (k.to_string(), *r)).collect(),
            effects: eff.iter().map(|(k, c)| (k.to_string(), *c)).collect(),
        }
    }

    fn state(pairs: &[(&str, i64)]) -> SolverState {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_chains_actions() {
        let actions = vec![
            action("fight", 3, &[("x", Requirement::Eq(0)), ("y", Requirement::Eq(1))], &[("level", Change::Add(1))]),
            action("move_0_1", 2, &[], &[("x", Change::Set(0)), ("y", Change::Set(1))]),
        ];
        let goal: BTreeMap<_, _> = [("level".to_string(), Requirement::Ge(6))].into();
        let plan = BestFirstSolver::default().solve(&state(&[("level", 5), ("x", 0), ("y", 0)]), &goal, &actions);
        assert_eq!(plan, vec!["move_0_1", "fight"]);
    }

    #[test]
    fn test_prefers_cheaper_route() {
        let actions = vec![
            action("expensive", 10, &[], &[("done", Change::Set(1))]),
            action("step", 1, &[], &[("half", Change::Set(1))]),
            action("finish", 1, &[("half", Requirement::Eq(1))], &[("done", Change::Set(1))]),
        ];
        let goal: BTreeMap<_, _> = [("done".to_string(), Requirement::Eq(1))].into();
        let plan = BestFirstSolver::default().solve(&SolverState::new(), &goal, &actions);
        assert_eq!(plan, vec!["step", "finish"]);
    }

    #[test]
    fn test_unreachable_goal_is_empty() {
        let actions = vec![action("noop", 1, &[], &[("counter", Change::Add(1))])];
        let goal: BTreeMap<_, _> = [("other".to_string(), Requirement::Ge(1))].into();
        let plan = BestFirstSolver::new(500, 10).solve(&SolverState::new(), &goal, &actions);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_satisfied_goal_needs_no_actions() {
        let goal: BTreeMap<_, _> = [("level".to_string(), Requirement::Ge(1))].into();
        let plan = BestFirstSolver::default().solve(&state(&[("level", 3)]), &goal, &[]);
        assert!(plan.is_empty());
    }
}
