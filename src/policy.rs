use crate::action::{Action, ActionSpace};
use crate::observation::Observation;
use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Decision-making side of the loop. An external agent plugs in here.
pub trait Policy: Send {
    fn name(&self) -> &str;
    fn act(&mut self, observation: &Observation, action_space: &ActionSpace) -> Action;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyKind {
    /// Never trades.
    Hold,
    /// Uniform over the discrete action space.
    Random,
}

impl PolicyKind {
    /// `seed` is offset by `env_index` so parallel environments do not mirror each other.
    pub fn build(self, seed: u64, env_index: usize) -> Box<dyn Policy> {
        match self {
            PolicyKind::Hold => Box::new(HoldPolicy),
            PolicyKind::Random => Box::new(RandomPolicy::new(seed.wrapping_add(env_index as u64))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HoldPolicy;

impl Policy for HoldPolicy {
    fn name(&self) -> &str {
        "hold"
    }

    fn act(&mut self, _observation: &Observation, _action_space: &ActionSpace) -> Action {
        Action::Hold
    }
}

#[derive(Debug, Clone)]
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn name(&self) -> &str {
        "random"
    }

    fn act(&mut self, _observation: &Observation, action_space: &ActionSpace) -> Action {
        let index = self.rng.gen_range(0..action_space.size());
        action_space.decode(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation() -> Observation {
        Observation {
            rows: 1,
            cols: 1,
            values: vec![0.0],
        }
    }

    #[test]
    fn test_random_policy_is_reproducible_per_seed() {
        let space = ActionSpace::new(3, 3);
        let mut first = RandomPolicy::new(7);
        let mut second = RandomPolicy::new(7);
        let a: Vec<Action> = (0..32).map(|_| first.act(&observation(), &space)).collect();
        let b: Vec<Action> = (0..32).map(|_| second.act(&observation(), &space)).collect();
        assert_eq!(a, b);
        assert!(a.iter().any(|action| *action != Action::Hold));
    }

    #[test]
    fn test_hold_policy_never_trades() {
        let mut policy = PolicyKind::Hold.build(0, 3);
        assert_eq!(policy.name(), "hold");
        assert_eq!(
            policy.act(&observation(), &ActionSpace::new(1, 1)),
            Action::Hold
        );
    }
}
