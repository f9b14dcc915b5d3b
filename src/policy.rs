//! Non-pharmaceutical intervention policy.
//!
//! Maps the base model parameters and the intervention flags to the
//! effective transmission probability and initial agent velocity.

use serde::{Deserialize, Serialize};

/// How infected agents are selected as sources during a transmission pass.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transmission {
    /// Scan the live collection: agents infected earlier in the pass
    /// can infect others later in the same pass.
    #[default]
    Chained,
    /// Only agents infected when the pass starts act as sources.
    Snapshot,
}

/// Named parameter sets for the intervention constants.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Distancing cuts transmission by 40% and movement restriction
    /// slows agents by 25%.
    #[default]
    Standard,
    /// Distancing cuts transmission by 30% and movement restriction
    /// halves agent speed.
    Revised,
}

/// Resolved intervention constants for one run.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Transmission multiplier applied under social distancing.
    pub distancing_factor: f64,
    /// Velocity multiplier applied under movement restriction.
    pub movement_factor: f64,
    /// Maximum distance at which a transmission draw takes place.
    pub infection_radius: f64,

    pub enable_r0_tracking: bool,
    pub enable_persistence: bool,

    pub transmission: Transmission,
}

impl Policy {
    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Standard => Self {
                distancing_factor: 0.6,
                movement_factor: 0.75,
                infection_radius: 20.0,
                enable_r0_tracking: true,
                enable_persistence: true,
                transmission: Transmission::Chained,
            },
            Preset::Revised => Self {
                distancing_factor: 0.7,
                movement_factor: 0.5,
                infection_radius: 20.0,
                enable_r0_tracking: true,
                enable_persistence: true,
                transmission: Transmission::Chained,
            },
        }
    }

    /// Effective per-contact transmission probability.
    ///
    /// The mask reduction is applied first, then the distancing factor.
    pub fn effective_transmission_probability(
        &self,
        base_beta: f64,
        mask_effectiveness: f64,
        social_distancing: bool,
    ) -> f64 {
        let mut beta = base_beta;
        if mask_effectiveness > 0.0 {
            beta *= 1.0 - mask_effectiveness;
        }
        if social_distancing {
            beta *= self.distancing_factor;
        }
        beta
    }

    /// Effective initial velocity of a newly created agent.
    pub fn effective_velocity(&self, vx: f64, vy: f64, movement_restriction: bool) -> (f64, f64) {
        if movement_restriction {
            (vx * self.movement_factor, vy * self.movement_factor)
        } else {
            (vx, vy)
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::from_preset(Preset::default())
    }
}
