//! Configuration for the EM control loop.
//!
//! All hyperparameters the driver would otherwise thread through individual
//! calls live in one value object: the iteration budget, the learning and
//! inference epoch counts handed to the sampler, the learning-rate schedule,
//! regularization strengths, and the convergence policy selection.
//!
//! # Example
//!
//! ```rust
//! use gibbs_em_rs::config::EmConfig;
//!
//! // Using defaults
//! let config = EmConfig::default();
//!
//! // Using the builder
//! let config = EmConfig::builder()
//!     .max_iterations(50)
//!     .check_convergence(true)
//!     .window_length(4)
//!     .delta_exponent(3)
//!     .build();
//!
//! // Loading from file
//! // let config = EmConfig::from_file("em.toml")?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::EmError;
use crate::LearnOptions;

/// Configuration for an EM run.
///
/// # Defaults
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `max_iterations` | 100 | E+M cycle budget after the warm start |
/// | `learning_epochs` | 100 | Sampler epochs per maximization |
/// | `inference_epochs` | 100 | Sampler epochs per expectation |
/// | `samples_per_epoch` | 1 | Samples drawn per learning epoch |
/// | `stepsize` | 0.01 | Initial gradient step size |
/// | `decay` | 0.95 | Per-epoch step size decay |
/// | `reg_l2` | 0.01 | L2 regularization strength |
/// | `reg_l1` | 0.0 | L1 regularization strength |
/// | `check_convergence` | false | Select the pseudo-likelihood window policy |
/// | `window_length` | 5 | Window length W for the windowed policy |
/// | `delta_exponent` | 2 | Converge when relative change ≤ 10^(−Δ) |
/// | `weight_tolerance` | 0.01 | Max weight delta threshold |
/// | `quiet` | false | Suppress per-iteration log output |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmConfig {
    /// Iteration budget for the E+M loop.
    ///
    /// One unit is consumed per full expectation+maximization cycle; the
    /// warm-start maximization is free. Zero means warm start only.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Number of learning epochs the sampler runs per maximization step.
    #[serde(default = "default_learning_epochs")]
    pub learning_epochs: u32,

    /// Number of inference epochs the sampler runs per expectation step.
    #[serde(default = "default_inference_epochs")]
    pub inference_epochs: u32,

    /// Number of samples drawn per learning epoch.
    #[serde(default = "default_samples_per_epoch")]
    pub samples_per_epoch: u32,

    /// Initial gradient step size passed to the sampler's learner.
    #[serde(default = "default_stepsize")]
    pub stepsize: f64,

    /// Multiplicative step size decay per learning epoch.
    #[serde(default = "default_decay")]
    pub decay: f64,

    /// L2 regularization strength.
    #[serde(default = "default_reg_l2")]
    pub reg_l2: f64,

    /// L1 regularization strength.
    #[serde(default = "default_reg_l1")]
    pub reg_l1: f64,

    /// Selects the convergence policy.
    ///
    /// `true` enables the pseudo-likelihood window policy; `false` leaves
    /// the max-weight-delta policy in effect.
    #[serde(default)]
    pub check_convergence: bool,

    /// Window length W for the pseudo-likelihood policy.
    ///
    /// The bounded history holds 2×W entries and convergence compares the
    /// first-W and last-W window sums. Must be at least 1.
    #[serde(default = "default_window_length")]
    pub window_length: usize,

    /// Convergence exponent Δ for the pseudo-likelihood policy.
    ///
    /// The run converges once the relative change between window sums drops
    /// to 10^(−Δ) or below. Must be at most 300; beyond that the threshold
    /// underflows to zero.
    #[serde(default = "default_delta_exponent")]
    pub delta_exponent: u32,

    /// Convergence tolerance for the max-weight-delta policy.
    #[serde(default = "default_weight_tolerance")]
    pub weight_tolerance: f64,

    /// Suppresses per-iteration info-level output when set.
    ///
    /// Also forwarded to every sampler call.
    #[serde(default)]
    pub quiet: bool,
}

// Default value functions for serde
fn default_max_iterations() -> u32 {
    100
}
fn default_learning_epochs() -> u32 {
    100
}
fn default_inference_epochs() -> u32 {
    100
}
fn default_samples_per_epoch() -> u32 {
    1
}
fn default_stepsize() -> f64 {
    0.01
}
fn default_decay() -> f64 {
    0.95
}
fn default_reg_l2() -> f64 {
    0.01
}
fn default_reg_l1() -> f64 {
    0.0
}
fn default_window_length() -> usize {
    5
}
fn default_delta_exponent() -> u32 {
    2
}
fn default_weight_tolerance() -> f64 {
    0.01
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            learning_epochs: default_learning_epochs(),
            inference_epochs: default_inference_epochs(),
            samples_per_epoch: default_samples_per_epoch(),
            stepsize: default_stepsize(),
            decay: default_decay(),
            reg_l2: default_reg_l2(),
            reg_l1: default_reg_l1(),
            check_convergence: false,
            window_length: default_window_length(),
            delta_exponent: default_delta_exponent(),
            weight_tolerance: default_weight_tolerance(),
            quiet: false,
        }
    }
}

impl EmConfig {
    /// Creates a new configuration builder.
    ///
    /// # Example
    ///
    /// ```rust
    /// use gibbs_em_rs::config::EmConfig;
    ///
    /// let config = EmConfig::builder()
    ///     .stepsize(0.1)
    ///     .decay(0.9)
    ///     .build();
    /// ```
    #[must_use]
    pub fn builder() -> EmConfigBuilder {
        EmConfigBuilder::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&content)?)
    }

    /// Saves configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EmError::InvalidConfig`] describing the first parameter
    /// found outside its valid range.
    pub fn validate(&self) -> Result<()> {
        if self.window_length == 0 {
            return Err(EmError::InvalidConfig(
                "window_length must be at least 1".to_string(),
            ));
        }

        if self.delta_exponent > 300 {
            return Err(EmError::InvalidConfig(
                "delta_exponent must be at most 300".to_string(),
            ));
        }

        if self.learning_epochs == 0 {
            return Err(EmError::InvalidConfig(
                "learning_epochs must be at least 1".to_string(),
            ));
        }

        if self.inference_epochs == 0 {
            return Err(EmError::InvalidConfig(
                "inference_epochs must be at least 1".to_string(),
            ));
        }

        if self.samples_per_epoch == 0 {
            return Err(EmError::InvalidConfig(
                "samples_per_epoch must be at least 1".to_string(),
            ));
        }

        if !self.stepsize.is_finite() || self.stepsize <= 0.0 {
            return Err(EmError::InvalidConfig(
                "stepsize must be a positive finite number".to_string(),
            ));
        }

        if !self.decay.is_finite() || self.decay <= 0.0 || self.decay > 1.0 {
            return Err(EmError::InvalidConfig(
                "decay must be in (0, 1]".to_string(),
            ));
        }

        if !self.reg_l2.is_finite() || self.reg_l2 < 0.0 {
            return Err(EmError::InvalidConfig(
                "reg_l2 must be non-negative".to_string(),
            ));
        }

        if !self.reg_l1.is_finite() || self.reg_l1 < 0.0 {
            return Err(EmError::InvalidConfig(
                "reg_l1 must be non-negative".to_string(),
            ));
        }

        if !self.weight_tolerance.is_finite() || self.weight_tolerance <= 0.0 {
            return Err(EmError::InvalidConfig(
                "weight_tolerance must be a positive finite number".to_string(),
            ));
        }

        Ok(())
    }

    /// Convergence threshold implied by `delta_exponent`, i.e. 10^(−Δ).
    #[must_use]
    pub fn window_threshold(&self) -> f64 {
        10f64.powi(-(self.delta_exponent as i32))
    }

    /// Bundles the learning hyperparameters for a sampler `learn` call.
    #[must_use]
    pub fn learn_options(&self) -> LearnOptions {
        LearnOptions {
            epochs: self.learning_epochs,
            samples_per_epoch: self.samples_per_epoch,
            stepsize: self.stepsize,
            decay: self.decay,
            reg_l2: self.reg_l2,
            reg_l1: self.reg_l1,
            quiet: self.quiet,
        }
    }
}

/// Builder for [`EmConfig`].
#[derive(Debug, Default)]
pub struct EmConfigBuilder {
    max_iterations: Option<u32>,
    learning_epochs: Option<u32>,
    inference_epochs: Option<u32>,
    samples_per_epoch: Option<u32>,
    stepsize: Option<f64>,
    decay: Option<f64>,
    reg_l2: Option<f64>,
    reg_l1: Option<f64>,
    check_convergence: Option<bool>,
    window_length: Option<usize>,
    delta_exponent: Option<u32>,
    weight_tolerance: Option<f64>,
    quiet: Option<bool>,
}

impl EmConfigBuilder {
    /// Sets the E+M cycle budget.
    #[must_use]
    pub fn max_iterations(mut self, iterations: u32) -> Self {
        self.max_iterations = Some(iterations);
        self
    }

    /// Sets the learning epochs per maximization.
    #[must_use]
    pub fn learning_epochs(mut self, epochs: u32) -> Self {
        self.learning_epochs = Some(epochs);
        self
    }

    /// Sets the inference epochs per expectation.
    #[must_use]
    pub fn inference_epochs(mut self, epochs: u32) -> Self {
        self.inference_epochs = Some(epochs);
        self
    }

    /// Sets the samples drawn per learning epoch.
    #[must_use]
    pub fn samples_per_epoch(mut self, samples: u32) -> Self {
        self.samples_per_epoch = Some(samples);
        self
    }

    /// Sets the initial gradient step size.
    #[must_use]
    pub fn stepsize(mut self, stepsize: f64) -> Self {
        self.stepsize = Some(stepsize);
        self
    }

    /// Sets the per-epoch step size decay.
    #[must_use]
    pub fn decay(mut self, decay: f64) -> Self {
        self.decay = Some(decay);
        self
    }

    /// Sets the L2 regularization strength.
    #[must_use]
    pub fn reg_l2(mut self, reg: f64) -> Self {
        self.reg_l2 = Some(reg);
        self
    }

    /// Sets the L1 regularization strength.
    #[must_use]
    pub fn reg_l1(mut self, reg: f64) -> Self {
        self.reg_l1 = Some(reg);
        self
    }

    /// Selects the pseudo-likelihood window policy when `true`.
    #[must_use]
    pub fn check_convergence(mut self, check: bool) -> Self {
        self.check_convergence = Some(check);
        self
    }

    /// Sets the window length W.
    #[must_use]
    pub fn window_length(mut self, window: usize) -> Self {
        self.window_length = Some(window);
        self
    }

    /// Sets the convergence exponent Δ.
    #[must_use]
    pub fn delta_exponent(mut self, delta: u32) -> Self {
        self.delta_exponent = Some(delta);
        self
    }

    /// Sets the max-weight-delta tolerance.
    #[must_use]
    pub fn weight_tolerance(mut self, tolerance: f64) -> Self {
        self.weight_tolerance = Some(tolerance);
        self
    }

    /// Sets the quiet flag.
    #[must_use]
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = Some(quiet);
        self
    }

    /// Builds the configuration with defaults for unset values.
    #[must_use]
    pub fn build(self) -> EmConfig {
        EmConfig {
            max_iterations: self.max_iterations.unwrap_or_else(default_max_iterations),
            learning_epochs: self.learning_epochs.unwrap_or_else(default_learning_epochs),
            inference_epochs: self
                .inference_epochs
                .unwrap_or_else(default_inference_epochs),
            samples_per_epoch: self
                .samples_per_epoch
                .unwrap_or_else(default_samples_per_epoch),
            stepsize: self.stepsize.unwrap_or_else(default_stepsize),
            decay: self.decay.unwrap_or_else(default_decay),
            reg_l2: self.reg_l2.unwrap_or_else(default_reg_l2),
            reg_l1: self.reg_l1.unwrap_or_else(default_reg_l1),
            check_convergence: self.check_convergence.unwrap_or(false),
            window_length: self.window_length.unwrap_or_else(default_window_length),
            delta_exponent: self.delta_exponent.unwrap_or_else(default_delta_exponent),
            weight_tolerance: self
                .weight_tolerance
                .unwrap_or_else(default_weight_tolerance),
            quiet: self.quiet.unwrap_or(false),
        }
    }
}
