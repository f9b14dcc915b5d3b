use crate::policy::{Policy, Preset, Transmission};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub model: ModelConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    pub run: RunConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Epidemic model parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Base per-contact transmission probability.
    pub beta: f64,
    /// Infection time after which an agent recovers (same unit as `dt`).
    pub recovery_time: f64,
    /// Number of agents.
    pub population: usize,

    /// Fraction of transmission removed by masks (0 means no mask policy).
    #[serde(default)]
    pub mask_effectiveness: f64,
    #[serde(default)]
    pub social_distancing: bool,
    #[serde(default)]
    pub movement_restriction: bool,

    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
}

/// Intervention constants: a preset plus optional overrides.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    #[serde(default)]
    pub preset: Preset,

    pub distancing_factor: Option<f64>,
    pub movement_factor: Option<f64>,
    pub infection_radius: Option<f64>,
    pub enable_r0_tracking: Option<bool>,
    pub enable_persistence: Option<bool>,
    pub transmission: Option<Transmission>,
}

/// Parameters of the fixed-step driving loop.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Number of steps to simulate.
    pub n_steps: usize,
    /// Elapsed time per step.
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// Seed of the random number generator (random if absent).
    pub seed: Option<u64>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Number of steps between progress messages.
    #[serde(default = "default_steps_per_log")]
    pub steps_per_log: usize,
    /// Window of the R0 moving average.
    #[serde(default = "default_r0_window")]
    pub r0_window: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            steps_per_log: default_steps_per_log(),
            r0_window: default_r0_window(),
        }
    }
}

fn default_width() -> f64 {
    800.0
}

fn default_height() -> f64 {
    600.0
}

fn default_dt() -> f64 {
    16.0
}

fn default_steps_per_log() -> usize {
    100
}

fn default_r0_window() -> usize {
    10
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Resolve the intervention policy from the preset and its overrides.
    pub fn policy(&self) -> Policy {
        let cfg = &self.policy;
        let mut policy = Policy::from_preset(cfg.preset);
        if let Some(factor) = cfg.distancing_factor {
            policy.distancing_factor = factor;
        }
        if let Some(factor) = cfg.movement_factor {
            policy.movement_factor = factor;
        }
        if let Some(radius) = cfg.infection_radius {
            policy.infection_radius = radius;
        }
        if let Some(enable) = cfg.enable_r0_tracking {
            policy.enable_r0_tracking = enable;
        }
        if let Some(enable) = cfg.enable_persistence {
            policy.enable_persistence = enable;
        }
        if let Some(transmission) = cfg.transmission {
            policy.transmission = transmission;
        }
        policy
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate().context("invalid model parameters")?;

        let policy = self.policy();
        check_num(policy.distancing_factor, 0.0..=1.0).context("invalid distancing factor")?;
        check_num(policy.movement_factor, 0.0..=1.0).context("invalid movement factor")?;
        check_pos(policy.infection_radius).context("invalid infection radius")?;

        check_num(self.run.n_steps, 1..10_000_000).context("invalid number of steps")?;
        check_pos(self.run.dt).context("invalid time step")?;

        check_num(self.output.steps_per_log, 1..).context("invalid number of steps per log")?;
        check_num(self.output.r0_window, 1..).context("invalid R0 window")?;

        Ok(())
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        check_pos(self.beta).context("invalid transmission probability")?;
        check_num(self.beta, ..=1.0).context("invalid transmission probability")?;
        check_num(self.recovery_time, 0.0..).context("invalid recovery time")?;
        check_num(self.population, 1..1_000_000).context("invalid population")?;
        check_num(self.mask_effectiveness, 0.0..=1.0).context("invalid mask effectiveness")?;
        check_pos(self.width).context("invalid world width")?;
        check_pos(self.height).context("invalid world height")?;
        Ok(())
    }
}

pub fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_pos(num: f64) -> Result<()> {
    // Also rejects NaN.
    if !(num > 0.0 && num.is_finite()) {
        bail!("number must be positive and finite, but is {num:?}");
    }
    Ok(())
}
