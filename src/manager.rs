use crate::analysis::Analyzer;
use crate::config::Config;
use crate::engine::Engine;
use crate::history::History;
use crate::model::Status;
use anyhow::{Context, Result};
use glob::glob;
use std::{
    fs,
    path::{Path, PathBuf},
};

pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    /// Simulate a new run in its own directory and save its history.
    pub fn create_run(&self) -> Result<()> {
        let run_idx = self.count_run_dirs().context("failed to count run dirs")?;

        let run_dir = self.run_dir(run_idx);
        fs::create_dir_all(&run_dir).with_context(|| format!("failed to create {run_dir:?}"))?;
        log::info!("created {run_dir:?}");

        let engine = self.build_engine(run_idx)?;
        let history = self.drive(engine).context("failed to run simulation")?;

        if self.cfg.policy().enable_persistence {
            let history_file = self.history_file(run_idx);
            history
                .save(&history_file)
                .with_context(|| format!("failed to save {history_file:?}"))?;
            log::info!("saved {history_file:?}");
        } else {
            log::warn!("persistence is disabled, history of run {run_idx} is discarded");
        }

        Ok(())
    }

    /// Analyze every saved run and write per-run and overall results.
    pub fn analyze_sim(&self) -> Result<()> {
        let mut analyzer = Analyzer::new(self.cfg.output.r0_window);

        let n_runs = self.count_run_dirs().context("failed to count run dirs")?;
        for run_idx in 0..n_runs {
            let history_file = self.history_file(run_idx);
            if !history_file.exists() {
                log::warn!("skipping run {run_idx}, {history_file:?} does not exist");
                continue;
            }

            let report = analyzer
                .add_file(&history_file)
                .context("failed to add file")?;
            log::info!(
                "run {run_idx}: mean R0 {:.4}, peak infected {} at step {}, final {:?}",
                report.r0_mean,
                report.peak_infected,
                report.peak_step,
                report.final_counts
            );

            report
                .save(self.results_file(run_idx))
                .context("failed to save run results")?;
        }

        analyzer
            .save_results(self.sim_dir.join("results.msgpack"))
            .context("failed to save results")?;
        log::info!("{:#?}", analyzer.report());

        Ok(())
    }

    pub fn clean_sim(&self) -> Result<()> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        for run_dir in glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
        {
            fs::remove_dir_all(&run_dir)
                .with_context(|| format!("failed to remove {run_dir:?}"))?;
            log::info!("removed {run_dir:?}");
        }

        let results_file = self.sim_dir.join("results.msgpack");
        if results_file.exists() {
            fs::remove_file(&results_file)
                .with_context(|| format!("failed to remove {results_file:?}"))?;
            log::info!("removed {results_file:?}");
        }

        Ok(())
    }

    /// Construct and initialize the engine of run `run_idx`.
    ///
    /// A configured seed is offset by the run index so that every run
    /// draws a different but reproducible trajectory.
    fn build_engine(&self, run_idx: usize) -> Result<Engine> {
        let seed = self.cfg.run.seed.map(|seed| seed.wrapping_add(run_idx as u64));

        let mut engine = Engine::new(self.cfg.model.clone(), self.cfg.policy(), seed)
            .context("failed to construct engine")?;
        engine.initialize().context("failed to initialize engine")?;

        Ok(engine)
    }

    /// Step the engine with a fixed `dt` and hand back its history.
    fn drive(&self, mut engine: Engine) -> Result<History> {
        let n_steps = self.cfg.run.n_steps;
        let steps_per_log = self.cfg.output.steps_per_log;
        log::info!("{:?}", engine.policy());

        for i_step in 0..n_steps {
            let report = engine
                .step(self.cfg.run.dt)
                .with_context(|| format!("failed to perform step {i_step}"))?;

            if (i_step + 1) % steps_per_log == 0 || i_step + 1 == n_steps {
                let progress = 100.0 * (i_step + 1) as f64 / n_steps as f64;
                log::info!("completed {progress:06.2}% {:?}", report.counts);
                log_infected(&engine);
            }
        }

        log::debug!("recorded {} steps", engine.history().len());
        Ok(engine.into_history())
    }

    fn count_run_dirs(&self) -> Result<usize> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let count = glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
            .count();
        Ok(count)
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("run-{run_idx:04}"))
    }

    fn history_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("history.zip")
    }

    fn results_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("results.msgpack")
    }
}

fn log_infected(engine: &Engine) {
    if !log::log_enabled!(log::Level::Trace) {
        return;
    }
    for (i_agt, agt) in engine.agents().iter().enumerate() {
        if agt.status() != Status::Infected {
            continue;
        }
        let (x, y) = agt.position();
        let (vx, vy) = agt.velocity();
        log::trace!(
            "agent {i_agt}: position ({x:.1}, {y:.1}), velocity ({vx:.3}, {vy:.3}), \
             radius {}, infected for {:.1}",
            agt.radius(),
            agt.infection_timer()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_STR: &str = r#"
[model]
beta = 0.4
recovery_time = 200.0
population = 60
width = 120.0
height = 90.0

[run]
n_steps = 80
seed = 7
"#;

    fn manager() -> (tempfile::TempDir, Manager) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        fs::write(dir.path().join("config.toml"), CONFIG_STR).expect("failed to write config");
        let mgr = Manager::new(dir.path()).expect("failed to construct mgr");
        (dir, mgr)
    }

    fn simulate(mgr: &Manager, run_idx: usize) -> History {
        let engine = mgr.build_engine(run_idx).unwrap();
        mgr.drive(engine).unwrap()
    }

    #[test]
    fn seeded_runs_differ_but_reproduce() {
        let (_dir, mgr) = manager();

        let run_0 = simulate(&mgr, 0);
        let run_1 = simulate(&mgr, 1);
        assert_ne!(run_0, run_1);
        assert_eq!(run_0, simulate(&mgr, 0));
    }

    #[test]
    fn create_analyze_clean() {
        let (dir, mgr) = manager();

        mgr.create_run().unwrap();
        mgr.create_run().unwrap();
        let run_0 = History::load(dir.path().join("run-0000").join("history.zip")).unwrap();
        let run_1 = History::load(dir.path().join("run-0001").join("history.zip")).unwrap();
        assert_eq!(run_0.len(), 80);
        assert_ne!(run_0, run_1);

        mgr.analyze_sim().unwrap();
        assert!(dir.path().join("results.msgpack").is_file());

        mgr.clean_sim().unwrap();
        assert!(!dir.path().join("run-0000").exists());
        assert!(!dir.path().join("results.msgpack").exists());
    }
}
