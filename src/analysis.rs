use crate::history::{CountSeries, Counts, History};
use crate::stats::{Accumulator, AccumulatorReport, mean, moving_average};
use anyhow::{Context, Result};
use rmp_serde::encode;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Plot-ready summary of a single run.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub n_steps: usize,
    pub counts: CountSeries,

    pub r0: Vec<f64>,
    pub r0_window: usize,
    pub r0_smoothed: Vec<f64>,
    pub r0_mean: f64,

    pub peak_infected: usize,
    pub peak_step: usize,
    pub final_counts: Counts,
}

impl RunReport {
    pub fn new(history: &History, r0_window: usize) -> Result<Self> {
        let r0 = history.r0().to_vec();
        let r0_smoothed =
            moving_average(&r0, r0_window).context("failed to smooth R0 history")?;

        // First step at which the infected count peaks.
        let (peak_step, peak_infected) = history
            .counts()
            .iter()
            .enumerate()
            .fold((0, 0), |peak, (step, c)| {
                if c.infected > peak.1 {
                    (step, c.infected)
                } else {
                    peak
                }
            });

        Ok(Self {
            n_steps: history.len(),
            counts: history.counts_by_status(),
            r0_mean: mean(&r0),
            r0,
            r0_window,
            r0_smoothed,
            peak_infected,
            peak_step,
            final_counts: history.counts().last().copied().unwrap_or_default(),
        })
    }

    /// Fraction of the population ever infected by the end of the run.
    pub fn attack_rate(&self) -> f64 {
        let total = self.final_counts.total();
        if total == 0 {
            return 0.0;
        }
        (self.final_counts.infected + self.final_counts.recovered) as f64 / total as f64
    }

    pub fn save<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        save_named(self, file)
    }
}

/// Statistics across all analyzed runs.
#[derive(Debug, Serialize, Deserialize)]
pub struct SimReport {
    pub r0_mean: AccumulatorReport,
    pub peak_infected: AccumulatorReport,
    pub attack_rate: AccumulatorReport,
}

pub struct Analyzer {
    r0_window: usize,
    r0_mean: Accumulator,
    peak_infected: Accumulator,
    attack_rate: Accumulator,
}

impl Analyzer {
    pub fn new(r0_window: usize) -> Self {
        Self {
            r0_window,
            r0_mean: Accumulator::new(),
            peak_infected: Accumulator::new(),
            attack_rate: Accumulator::new(),
        }
    }

    /// Load a saved history, record it and return its report.
    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<RunReport> {
        let file = file.as_ref();
        let history = History::load(file).with_context(|| format!("failed to load {file:?}"))?;
        self.add_history(&history)
    }

    pub fn add_history(&mut self, history: &History) -> Result<RunReport> {
        if history.is_empty() {
            log::warn!("history has no steps");
        }
        let report = RunReport::new(history, self.r0_window)?;
        // Runs without R0 tracking have no samples to contribute.
        if !history.r0().is_empty() {
            self.r0_mean.add(report.r0_mean);
        }
        self.peak_infected.add(report.peak_infected as f64);
        self.attack_rate.add(report.attack_rate());
        Ok(report)
    }

    pub fn report(&self) -> SimReport {
        SimReport {
            r0_mean: self.r0_mean.report(),
            peak_infected: self.peak_infected.report(),
            attack_rate: self.attack_rate.report(),
        }
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        save_named(&self.report(), file)
    }
}

fn save_named<T: Serialize, P: AsRef<Path>>(val: &T, file: P) -> Result<()> {
    let file = file.as_ref();
    let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut writer = BufWriter::new(file);
    encode::write_named(&mut writer, val).context("failed to serialize results")?;
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}
