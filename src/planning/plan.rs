//! Ordered action sequences produced by the solver

use crate::actions::Action;
use crate::state::conditions::{apply_effects, unmet_conditions};
use crate::state::{StateKey, WorldState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Actions reaching one goal, consumed once by the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub goal_name: String,
    pub actions: Vec<Action>,
    pub total_cost: u32,
}

impl Plan {
    pub fn new(goal_name: impl Into<String>, actions: Vec<Action>) -> Self {
        let total_cost = actions.iter().map(|a| a.cost).sum();
        Self {
            id: Uuid::new_v4(),
            goal_name: goal_name.into(),
            actions,
            total_cost,
        }
    }

    /// Infeasible or already-satisfied goal
    pub fn empty(goal_name: impl Into<String>) -> Self {
        Self::new(goal_name, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn action_names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name.as_str()).collect()
    }

    /// First step whose preconditions fail when the plan is simulated from
    /// `state`, with the keys that fail; `None` if every step holds
    pub fn first_unsatisfied_step(&self, state: &WorldState) -> Option<(usize, Vec<StateKey>)> {
        let mut view = state.to_state_map();
        for (index, action) in self.actions.iter().enumerate() {
            let unmet = unmet_conditions(&view, &action.preconditions);
            if !unmet.is_empty() {
                return Some((index, unmet));
            }
            apply_effects(&mut view, &action.effects);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::RemoteCall;
    use crate::state::conditions::{Condition, Effect};
    use crate::state::world::test_support::state;
    use crate::state::StateValue;

    #[test]
    fn test_total_cost_and_simulation() {
        let travel = Action::remote("move_0_1", RemoteCall::Move { x: 0, y: 1 }, 2)
            .with_effect(StateKey::Y, Effect::Set(StateValue::Int(1)));
        let fight = Action::remote("fight_chicken", RemoteCall::Fight, 3)
            .with_precondition(StateKey::Y, Condition::Equals(StateValue::Int(1)));

        let plan = Plan::new("reach_level(6)", vec![travel.clone(), fight.clone()]);
        assert_eq!(plan.total_cost, 5);
        assert_eq!(plan.first_unsatisfied_step(&state(5, 80, 100)), None);

        let reversed = Plan::new("reach_level(6)", vec![fight, travel]);
        assert_eq!(
            reversed.first_unsatisfied_step(&state(5, 80, 100)),
            Some((0, vec![StateKey::Y]))
        );
    }
}
