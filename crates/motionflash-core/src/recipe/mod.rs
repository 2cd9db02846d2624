//! Test recipes
//!
//! A recipe is a named, ordered list of bounded motion steps plus the
//! safety limits that gate them. Recipes are validated when built and are
//! immutable afterwards.

mod book;
mod limits;

pub use book::{RecipeBook, RecipeBookError, SMOKE_V1};
pub use limits::{SafetyLimit, SafetyLimits};

use std::collections::BTreeSet;
use std::time::Duration;

use crate::device::Channel;
use crate::error::{Error, Result};
use crate::telemetry::validate_fields;

/// One bounded step of a recipe
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Step {
    /// Open-loop duty on one channel
    Duty {
        /// Channel to drive
        channel: Channel,
        /// Signed duty
        duty: i32,
        /// How long to hold the command
        duration_ms: u64,
        /// Telemetry fields sampled during the step
        sample: Vec<String>,
    },
    /// Closed-loop velocity on one channel
    Velocity {
        /// Channel to drive
        channel: Channel,
        /// Signed speed in encoder counts per second
        speed: i32,
        /// How long to hold the command
        duration_ms: u64,
        /// Telemetry fields sampled during the step
        sample: Vec<String>,
    },
    /// Sample only, no motion command
    Hold {
        /// How long to sample
        duration_ms: u64,
        /// Telemetry fields sampled during the step
        sample: Vec<String>,
    },
}

impl Step {
    /// Scheduled duration
    pub fn duration(&self) -> Duration {
        match self {
            Self::Duty { duration_ms, .. }
            | Self::Velocity { duration_ms, .. }
            | Self::Hold { duration_ms, .. } => Duration::from_millis(*duration_ms),
        }
    }

    /// Fields sampled during the step
    pub fn sample(&self) -> &[String] {
        match self {
            Self::Duty { sample, .. } | Self::Velocity { sample, .. } | Self::Hold { sample, .. } => {
                sample
            }
        }
    }

    /// Whether the step issues a motion command
    pub fn is_motion(&self) -> bool {
        !matches!(self, Self::Hold { .. })
    }

    fn validate(&self, index: usize) -> Result<()> {
        if self.duration().is_zero() {
            return Err(Error::invalid(format!(
                "step {} must have a positive duration",
                index
            )));
        }
        validate_fields(self.sample())
            .map_err(|e| Error::invalid(format!("step {}: {}", index, e)))
    }
}

/// A validated test recipe
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    id: String,
    steps: Vec<Step>,
    safety_limits: SafetyLimits,
}

impl Recipe {
    /// Build and validate a recipe
    ///
    /// Requires a non-empty id and at least one step, positive step
    /// durations, valid sample lists, duplicate-free limits and a schedule
    /// that fits inside `max_runtime_s` when that limit is set.
    pub fn new(id: impl Into<String>, steps: Vec<Step>, limits: Vec<SafetyLimit>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::invalid("recipe id must be non-empty"));
        }
        if steps.is_empty() {
            return Err(Error::invalid(format!("recipe {} has no steps", id)));
        }
        for (i, step) in steps.iter().enumerate() {
            step.validate(i)
                .map_err(|e| Error::invalid(format!("recipe {}: {}", id, e)))?;
        }
        let safety_limits = SafetyLimits::new(limits)?;

        let recipe = Self {
            id,
            steps,
            safety_limits,
        };
        if let Some(max) = recipe.safety_limits.max_runtime() {
            let scheduled = recipe.scheduled_duration();
            if scheduled > max {
                return Err(Error::invalid(format!(
                    "recipe {} schedules {} ms but max_runtime_s allows {} ms",
                    recipe.id,
                    scheduled.as_millis(),
                    max.as_millis()
                )));
            }
        }
        Ok(recipe)
    }

    /// Recipe identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Steps in execution order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Limits in declared order
    pub fn safety_limits(&self) -> &SafetyLimits {
        &self.safety_limits
    }

    /// Sum of all step durations
    pub fn scheduled_duration(&self) -> Duration {
        self.steps.iter().map(Step::duration).sum()
    }

    /// Every field sampled by any step, sorted
    pub fn fields(&self) -> BTreeSet<&str> {
        self.steps
            .iter()
            .flat_map(|s| s.sample().iter().map(String::as_str))
            .collect()
    }
}
