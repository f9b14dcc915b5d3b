use crate::config::ModelConfig;
use crate::history::{Counts, History};
use crate::model::{Agent, Status};
use crate::policy::{Policy, Transmission};
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::Uniform;

/// Aggregate outcome of a single step.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct StepReport {
    pub counts: Counts,
    pub n_new_infections: usize,
    pub r0: f64,
}

/// Simulation engine.
///
/// Holds the model parameters, intervention policy, agents, recorded
/// history and random number generator.
pub struct Engine {
    model: ModelConfig,
    policy: Policy,
    agents: Vec<Agent>,
    history: History,
    rng: ChaCha12Rng,
}

impl Engine {
    /// Create an engine with no agents. Call [`Engine::initialize`] before stepping.
    ///
    /// The generator is seeded from `seed` if given and from the OS otherwise.
    pub fn new(model: ModelConfig, policy: Policy, seed: Option<u64>) -> Result<Self> {
        model.validate().context("invalid model parameters")?;

        let rng = match seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };

        Ok(Self {
            model,
            policy,
            agents: Vec::new(),
            history: History::new(),
            rng,
        })
    }

    /// Replace all agents with a fresh random population and clear the history.
    ///
    /// Agent 0 is the seed case.
    pub fn initialize(&mut self) -> Result<()> {
        let x_dist = Uniform::new_inclusive(0.0, self.model.width)?;
        let y_dist = Uniform::new_inclusive(0.0, self.model.height)?;
        let v_dist = Uniform::new_inclusive(-1.0, 1.0)?;

        let mut agents = Vec::with_capacity(self.model.population);
        for _ in 0..self.model.population {
            let x = x_dist.sample(&mut self.rng);
            let y = y_dist.sample(&mut self.rng);
            let (vx, vy) = self.policy.effective_velocity(
                v_dist.sample(&mut self.rng),
                v_dist.sample(&mut self.rng),
                self.model.movement_restriction,
            );
            agents.push(Agent::new(x, y, vx, vy));
        }

        let seed_agt = agents
            .first_mut()
            .context("population must contain at least one agent")?;
        seed_agt.infect();

        self.agents = agents;
        self.history = History::new();
        log::debug!("initialized {} agents", self.agents.len());

        Ok(())
    }

    /// Advance the simulation by an elapsed time `dt`.
    ///
    /// Records one history entry and, if R0 tracking is enabled, one R0 sample.
    pub fn step(&mut self, dt: f64) -> Result<StepReport> {
        if !(dt >= 0.0 && dt.is_finite()) {
            bail!("time step must be non-negative and finite, but is {dt:?}");
        }
        if self.agents.is_empty() {
            bail!("engine has no agents, it must be initialized first");
        }

        let model = &self.model;
        for agt in &mut self.agents {
            agt.move_within(model.width, model.height);
            agt.progress_infection(dt, model.recovery_time);
        }

        let beta = self.policy.effective_transmission_probability(
            model.beta,
            model.mask_effectiveness,
            model.social_distancing,
        );
        let n_new_infections = self.transmit(beta);

        let counts = self.count_statuses();
        self.history.push_counts(counts);

        let r0 = if counts.infected > 0 {
            n_new_infections as f64 / counts.infected as f64
        } else {
            0.0
        };
        if self.policy.enable_r0_tracking {
            self.history.push_r0(r0);
        }

        let report = StepReport {
            counts,
            n_new_infections,
            r0,
        };
        log::trace!("{report:?}");

        Ok(report)
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn into_history(self) -> History {
        self.history
    }

    fn transmit(&mut self, beta: f64) -> usize {
        let radius = self.policy.infection_radius;
        let n_agt = self.agents.len();

        let i_src_vec: Vec<usize> = match self.policy.transmission {
            // Sources are re-checked against the live collection.
            Transmission::Chained => (0..n_agt).collect(),
            Transmission::Snapshot => (0..n_agt)
                .filter(|&i_agt| self.agents[i_agt].status() == Status::Infected)
                .collect(),
        };

        let mut n_new = 0;
        for i_src in i_src_vec {
            if self.agents[i_src].status() != Status::Infected {
                continue;
            }
            for i_tgt in 0..n_agt {
                if self.agents[i_tgt].status() != Status::Susceptible {
                    continue;
                }
                let dist = self.agents[i_src].distance_to(&self.agents[i_tgt]);
                if dist < radius && self.rng.random::<f64>() < beta {
                    self.agents[i_tgt].infect();
                    n_new += 1;
                }
            }
        }
        n_new
    }

    fn count_statuses(&self) -> Counts {
        let mut counts = Counts::default();
        for agt in &self.agents {
            match agt.status() {
                Status::Susceptible => counts.susceptible += 1,
                Status::Infected => counts.infected += 1,
                Status::Recovered => counts.recovered += 1,
            }
        }
        counts
    }

    #[cfg(test)]
    fn with_agents(
        model: ModelConfig,
        policy: Policy,
        seed: u64,
        mut agents: Vec<Agent>,
    ) -> Result<Self> {
        let mut engine = Self::new(model, policy, Some(seed))?;
        agents
            .first_mut()
            .context("population must contain at least one agent")?
            .infect();
        engine.agents = agents;
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model(population: usize, beta: f64, recovery_time: f64) -> ModelConfig {
        ModelConfig {
            beta,
            recovery_time,
            population,
            mask_effectiveness: 0.0,
            social_distancing: false,
            movement_restriction: false,
            width: 800.0,
            height: 600.0,
        }
    }

    fn policy(infection_radius: f64, transmission: Transmission) -> Policy {
        Policy {
            infection_radius,
            transmission,
            ..Policy::default()
        }
    }

    fn still_agent(x: f64, y: f64) -> Agent {
        Agent::new(x, y, 0.0, 0.0)
    }

    #[test]
    fn two_agent_scenario() {
        let dt = 1.0;
        let agents = vec![still_agent(100.0, 100.0), still_agent(105.0, 100.0)];
        let mut engine = Engine::with_agents(
            model(2, 1.0, dt),
            policy(10.0, Transmission::Chained),
            1,
            agents,
        )
        .unwrap();

        let report = engine.step(dt).unwrap();
        assert_eq!(report.n_new_infections, 1);
        assert_eq!(
            report.counts,
            Counts {
                susceptible: 0,
                infected: 2,
                recovered: 0
            }
        );
        assert_relative_eq!(report.r0, 0.5);

        let report = engine.step(dt).unwrap();
        assert_eq!(engine.agents()[0].status(), Status::Recovered);
        assert_eq!(engine.agents()[1].status(), Status::Infected);
        assert!(engine.agents()[1].infection_timer() <= dt);
        assert_eq!(report.n_new_infections, 0);
        assert_eq!(report.r0, 0.0);

        assert_eq!(engine.history().len(), 2);
        assert_eq!(engine.history().r0(), &[0.5, 0.0]);
    }

    #[test]
    fn chained_transmission_within_one_step() {
        let agents = || {
            vec![
                still_agent(100.0, 100.0),
                still_agent(108.0, 100.0),
                still_agent(116.0, 100.0),
            ]
        };

        let mut chained = Engine::with_agents(
            model(3, 1.0, 100.0),
            policy(10.0, Transmission::Chained),
            1,
            agents(),
        )
        .unwrap();
        let report = chained.step(1.0).unwrap();
        assert_eq!(report.n_new_infections, 2);
        assert_eq!(report.counts.infected, 3);

        let mut snapshot = Engine::with_agents(
            model(3, 1.0, 100.0),
            policy(10.0, Transmission::Snapshot),
            1,
            agents(),
        )
        .unwrap();
        let report = snapshot.step(1.0).unwrap();
        assert_eq!(report.n_new_infections, 1);
        assert_eq!(snapshot.agents()[2].status(), Status::Susceptible);
    }

    #[test]
    fn far_agents_never_infect() {
        let agents = vec![still_agent(10.0, 10.0), still_agent(500.0, 500.0)];
        let mut engine = Engine::with_agents(
            model(2, 1.0, 1e9),
            policy(20.0, Transmission::Chained),
            1,
            agents,
        )
        .unwrap();
        for _ in 0..10 {
            let report = engine.step(1.0).unwrap();
            assert_eq!(report.n_new_infections, 0);
            assert_eq!(report.r0, 0.0);
        }
    }

    #[test]
    fn counts_sum_and_statuses_are_monotone() {
        let population = 150;
        let mut engine = Engine::new(
            model(population, 0.5, 40.0),
            policy(30.0, Transmission::Chained),
            Some(42),
        )
        .unwrap();
        engine.initialize().unwrap();

        let rank = |status: Status| match status {
            Status::Susceptible => 0,
            Status::Infected => 1,
            Status::Recovered => 2,
        };
        let mut prev: Vec<_> = engine.agents().iter().map(|a| rank(a.status())).collect();

        for _ in 0..300 {
            engine.step(1.0).unwrap();
            let cur: Vec<_> = engine.agents().iter().map(|a| rank(a.status())).collect();
            assert!(prev.iter().zip(&cur).all(|(p, c)| p <= c));
            prev = cur;
        }

        let history = engine.history();
        assert_eq!(history.len(), 300);
        assert_eq!(history.r0().len(), 300);
        assert!(history.counts().iter().all(|c| c.total() == population));
        assert!(history.r0().iter().all(|&r0| r0 >= 0.0 && r0.is_finite()));
    }

    #[test]
    fn initialize_replaces_population() {
        let mut model = model(50, 0.1, 10.0);
        model.movement_restriction = true;
        let mut engine = Engine::new(model, Policy::default(), Some(3)).unwrap();

        engine.initialize().unwrap();
        engine.step(1.0).unwrap();
        engine.initialize().unwrap();

        assert_eq!(engine.agents().len(), 50);
        assert!(engine.history().is_empty());
        assert_eq!(engine.agents()[0].status(), Status::Infected);
        assert_eq!(engine.agents()[0].infection_timer(), 0.0);
        assert!(
            engine.agents()[1..]
                .iter()
                .all(|a| a.status() == Status::Susceptible)
        );
        for agt in engine.agents() {
            let (x, y) = agt.position();
            assert!((0.0..=800.0).contains(&x) && (0.0..=600.0).contains(&y));
            let (vx, vy) = agt.velocity();
            assert!(vx.abs() <= 0.75 && vy.abs() <= 0.75);
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let run = || {
            let mut engine =
                Engine::new(model(80, 0.3, 20.0), Policy::default(), Some(11)).unwrap();
            engine.initialize().unwrap();
            for _ in 0..100 {
                engine.step(1.0).unwrap();
            }
            engine.into_history()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn r0_tracking_can_be_disabled() {
        let policy = Policy {
            enable_r0_tracking: false,
            ..Policy::default()
        };
        let mut engine = Engine::new(model(10, 0.3, 20.0), policy, Some(5)).unwrap();
        engine.initialize().unwrap();
        for _ in 0..5 {
            engine.step(1.0).unwrap();
        }
        assert_eq!(engine.history().len(), 5);
        assert!(engine.history().r0().is_empty());
    }

    #[test]
    fn rejects_contract_violations() {
        let mut engine = Engine::new(model(10, 0.3, 20.0), Policy::default(), Some(5)).unwrap();
        assert!(engine.step(1.0).is_err());

        engine.initialize().unwrap();
        assert!(engine.step(-1.0).is_err());
        assert!(engine.step(f64::NAN).is_err());
        assert!(engine.history().is_empty());
        assert!(engine.step(0.0).is_ok());

        assert!(Engine::new(model(0, 0.3, 20.0), Policy::default(), None).is_err());
        assert!(Engine::new(model(10, 0.3, -1.0), Policy::default(), None).is_err());
    }
}
