use crate::action::Action;
use crate::config::EnvironmentConfig;
use crate::environment::{MarketSimulationEnvironment, StepResult};
use crate::errors::{EnvError, EnvResult};
use crate::observation::Observation;
use crate::policy::Policy;
use crate::price_series::PriceSeries;
use rayon::prelude::*;

/// N independent environments stepped together.
///
/// Each environment owns its position, ledger and cursor; only the price
/// series is shared. With `auto_reset` a finished environment is reset inside
/// `step_all` and the returned observation is the fresh one, while the reward,
/// `done` flag and info still describe the step that ended the episode.
#[derive(Debug, Clone)]
pub struct VecEnvironment {
    envs: Vec<MarketSimulationEnvironment>,
    auto_reset: bool,
}

impl VecEnvironment {
    pub fn new(envs: Vec<MarketSimulationEnvironment>, auto_reset: bool) -> EnvResult<Self> {
        let first = envs
            .first()
            .ok_or_else(|| EnvError::configuration("VecEnvironment needs at least one environment"))?;
        let action_size = first.action_space().size();
        let shape = first.observation_shape();

        if let Some(index) = envs.iter().position(|env| {
            env.action_space().size() != action_size || env.observation_shape() != shape
        }) {
            return Err(EnvError::configuration(format!(
                "environment {} does not match the action space or observation shape of environment 0",
                index
            )));
        }

        Ok(Self { envs, auto_reset })
    }

    /// `count` copies over the same series and config.
    pub fn replicate(
        series: &PriceSeries,
        config: &EnvironmentConfig,
        count: usize,
        auto_reset: bool,
    ) -> EnvResult<Self> {
        let envs = (0..count)
            .map(|_| MarketSimulationEnvironment::new(series.clone(), config.clone()))
            .collect::<EnvResult<Vec<_>>>()?;
        Self::new(envs, auto_reset)
    }

    pub fn len(&self) -> usize {
        self.envs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envs.is_empty()
    }

    pub fn envs(&self) -> &[MarketSimulationEnvironment] {
        &self.envs
    }

    pub fn env(&self, index: usize) -> Option<&MarketSimulationEnvironment> {
        self.envs.get(index)
    }

    pub fn reset_all(&mut self) -> EnvResult<Vec<Observation>> {
        self.envs.par_iter_mut().map(|env| env.reset()).collect()
    }

    pub fn step_all(&mut self, actions: &[Action]) -> EnvResult<Vec<StepResult>> {
        if actions.len() != self.envs.len() {
            return Err(EnvError::invalid_state(format!(
                "expected {} actions, got {}",
                self.envs.len(),
                actions.len()
            )));
        }

        let auto_reset = self.auto_reset;
        self.envs
            .par_iter_mut()
            .zip(actions.par_iter())
            .map(|(env, action)| -> EnvResult<StepResult> {
                let mut result = env.step(*action)?;
                if result.done && auto_reset {
                    result.observation = env.reset()?;
                }
                Ok(result)
            })
            .collect()
    }

    pub fn step_discrete_all(&mut self, action_indices: &[usize]) -> EnvResult<Vec<StepResult>> {
        let actions: Vec<Action> = match self.envs.first() {
            Some(env) => {
                let space = env.action_space();
                action_indices.iter().map(|index| space.decode(*index)).collect()
            }
            None => Vec::new(),
        };
        self.step_all(&actions)
    }

    /// Resets every environment and drives it to the end of its episode with
    /// its own policy. `on_step` receives the environment index after each step.
    pub fn run_episodes<F>(&mut self, policies: &mut [Box<dyn Policy>], on_step: F) -> EnvResult<()>
    where
        F: Fn(usize) + Sync,
    {
        if policies.len() != self.envs.len() {
            return Err(EnvError::invalid_state(format!(
                "expected {} policies, got {}",
                self.envs.len(),
                policies.len()
            )));
        }

        self.envs
            .par_iter_mut()
            .zip(policies.par_iter_mut())
            .enumerate()
            .map(|(idx, (env, policy))| -> EnvResult<()> {
                let action_space = env.action_space();
                let mut observation = env.reset()?;
                loop {
                    let action = policy.act(&observation, &action_space);
                    let result = env.step(action)?;
                    on_step(idx);
                    if result.done {
                        return Ok(());
                    }
                    observation = result.observation;
                }
            })
            .collect()
    }
}
