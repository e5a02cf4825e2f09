//! # gibbs-em-rs
//!
//! Hard expectation-maximization control loop for Gibbs-sampling learners
//! over large discrete factor graphs.
//!
//! ## Overview
//!
//! This crate drives the outer loop of hard EM on top of any Gibbs sampler
//! that can infer free variables and learn weights on a factor graph. The
//! graph starts with a user-provided evidence mask. Each expectation step
//! runs free inference and then freezes the sampled world, turning every
//! variable into evidence. Each maximization step learns weights on that
//! fully evidenced world, restores the original mask, and checks for
//! convergence. The loop repeats until a convergence criterion fires or
//! the cycle budget runs out.
//!
//! ## EM Cycle
//!
//! ```text
//!          ┌────────────────┐
//!          │  MAXIMIZATION  │  warm start: learn on the
//!          │  (warm start)  │  user-provided evidence
//!          └───────┬────────┘
//!                  │
//!                  ▼
//!        ┌───────────────────┐
//!   ┌───▶│    EXPECTATION    │  infer free variables,
//!   │    │                   │  freeze the sampled world
//!   │    └─────────┬─────────┘
//!   │              │
//!   │              ▼
//!   │    ┌───────────────────┐
//!   │    │   MAXIMIZATION    │  learn on the frozen world,
//!   │    │                   │  restore the evidence mask
//!   │    └─────────┬─────────┘
//!   │              │
//!   │              │ not converged, budget left
//!   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use gibbs_em_rs::{EmConfig, EmTrainer};
//!
//! // Create configuration with sensible defaults
//! let config = EmConfig::builder()
//!     .max_iterations(50)
//!     .check_convergence(true)
//!     .build();
//!
//! // Drive EM over your graph with your sampler
//! // let mut trainer = EmTrainer::new(&mut graph, &mut sampler, config)?;
//! // let stats = trainer.run()?;
//! // println!("{stats}");
//! ```
//!
//! ## Features
//!
//! - **Two convergence criteria** - maximum weight delta, or a windowed
//!   comparison of the negative pseudo-log-likelihood
//! - **Evidence round trip** - capture, freeze, and restore of the
//!   observed mask across every cycle
//! - **Pluggable sampler** - a trait seam accepts any Gibbs implementation
//! - **Progress sinks** - per-iteration diagnostics routed through
//!   `tracing` or a caller-supplied collector
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`config`] - EM hyperparameters, validation, and serialization
//! - [`error`] - Error types shared across the crate
//! - [`evidence`] - Evidence mask capture, freeze, and restore
//! - [`history`] - Bounded pseudo-log-likelihood history
//! - [`likelihood`] - Negative pseudo-log-likelihood estimation
//! - [`convergence`] - Weight-delta and windowed convergence criteria
//! - [`metrics`] - Progress reporting and run statistics

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
// Allow precision loss casts - acceptable in numerical estimation code
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
// Suppress documentation warnings during development
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

// Core modules
pub mod config;
pub mod error;

// Evidence bookkeeping and the likelihood estimator
pub mod evidence;
pub mod likelihood;

// Convergence control
pub mod convergence;
pub mod history;

// Metrics and monitoring
pub mod metrics;

// Re-exports for convenient access
pub use config::{EmConfig, EmConfigBuilder};
pub use convergence::{ConvergenceCheck, ConvergenceDetector, ConvergenceMetric};
pub use error::{EmError, Result};
pub use evidence::{EvidencePhase, EvidenceState};
pub use history::PseudoLikelihoodHistory;
pub use likelihood::negative_pseudo_log_likelihood;
pub use metrics::{EmStats, ProgressMetric, ProgressRecord, ProgressSink, TracingSink};

use std::fmt;
use std::time::Instant;

/// Value domain of a single factor-graph variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableDomain {
    /// Binary variable taking values `0` and `1`.
    Boolean,
    /// Categorical variable taking integer values in `low..=high`.
    Multinomial {
        /// Smallest admissible value.
        low: i64,
        /// Largest admissible value, inclusive.
        high: i64,
    },
    /// Continuous variable. Sampled, but excluded from likelihood
    /// estimation.
    Real,
}

impl VariableDomain {
    /// Stable lowercase identifier, suitable for log and error text.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Multinomial { .. } => "multinomial",
            Self::Real => "real",
        }
    }
}

impl fmt::Display for VariableDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hyperparameters for a single learning pass.
///
/// Bundles the learning fields of [`EmConfig`] so the sampler receives
/// one compact value per maximization instead of the whole config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearnOptions {
    /// Number of learning epochs to run.
    pub epochs: u32,
    /// Samples drawn per variable per epoch.
    pub samples_per_epoch: u32,
    /// Initial gradient step size.
    pub stepsize: f64,
    /// Multiplicative step-size decay applied between epochs.
    pub decay: f64,
    /// L2 regularization strength.
    pub reg_l2: f64,
    /// L1 regularization strength.
    pub reg_l1: f64,
    /// Suppress per-epoch output.
    pub quiet: bool,
}

/// Trait for factor graphs the EM loop can drive.
///
/// The loop never touches factors directly. It needs per-variable access
/// to the evidence mask and the two assignment slots, per-weight access
/// to the learned values, and conditional potentials for the likelihood
/// estimator. Anything that exposes these ten operations can be trained,
/// whatever its factor storage looks like.
///
/// # Why This Trait?
///
/// Graph layouts vary wildly: compressed adjacency for billion-edge
/// graphs, flat arrays for test fixtures, memory-mapped stores for
/// out-of-core runs. By requiring only mask, assignment, weight, and
/// potential access, the loop works against all of them without caring
/// which one it got.
///
/// Index arguments are trusted: callers keep `variable` below
/// [`num_variables`](Self::num_variables) and `weight` below
/// [`num_weights`](Self::num_weights). Implementations may panic on
/// out-of-range indices.
pub trait FactorGraph {
    /// Returns the number of variables in the graph.
    fn num_variables(&self) -> usize;

    /// Returns the number of learnable weights.
    fn num_weights(&self) -> usize;

    /// Returns the value domain of `variable`.
    fn domain(&self, variable: usize) -> VariableDomain;

    /// Returns whether `variable` is currently treated as evidence.
    fn is_observed(&self, variable: usize) -> bool;

    /// Marks `variable` as evidence or as free.
    fn set_observed(&mut self, variable: usize, observed: bool);

    /// Returns the current sampled value in the free-world slot.
    fn free_assignment(&self, variable: usize) -> i64;

    /// Returns the value in the evidence slot.
    fn evidence_assignment(&self, variable: usize) -> i64;

    /// Writes `value` into the evidence slot of `variable`.
    fn set_evidence_assignment(&mut self, variable: usize, value: i64);

    /// Returns the current value of `weight`.
    fn weight_value(&self, weight: usize) -> f64;

    /// Returns the conditional potential of assigning `value` to
    /// `variable`, holding the rest of the current world fixed.
    fn potential(&self, variable: usize, value: i64) -> f64;
}

/// Trait for Gibbs samplers driven by the EM loop.
///
/// `infer` and `learn` receive the graph mutably and run their epochs
/// internally; the loop only decides when each is called and with which
/// options. The two dump hooks let implementations persist weights and
/// aggregated marginals at the points the loop reaches them.
pub trait GibbsSampler<G: FactorGraph> {
    /// Samples free variables for `epochs` epochs, leaving the drawn
    /// values in each variable's free-world slot.
    fn infer(&mut self, graph: &mut G, epochs: u32, quiet: bool) -> Result<()>;

    /// Runs weight learning on the current evidence.
    fn learn(&mut self, graph: &mut G, options: &LearnOptions) -> Result<()>;

    /// Persists the current weight values.
    fn dump_weights(&mut self, graph: &G, quiet: bool) -> Result<()>;

    /// Aggregates inference results across epochs and persists them.
    fn aggregate_and_dump(&mut self, graph: &G, quiet: bool) -> Result<()>;
}

/// Orchestrates hard EM over a factor graph and a Gibbs sampler.
///
/// # Overview
///
/// `EmTrainer` borrows the graph and sampler for the duration of the run
/// and alternates [`expectation`](Self::expectation) and
/// [`maximization`](Self::maximization) until convergence or budget
/// exhaustion. Construction captures the evidence mask and builds the
/// convergence detector selected by the config; [`run`](Self::run) then
/// owns the whole schedule, including the warm-start maximization and
/// the final dumps.
///
/// The two step methods are public so callers with unusual schedules can
/// drive cycles by hand and inspect the graph between steps.
///
/// # Example
///
/// ```no_run
/// use gibbs_em_rs::{EmConfig, EmTrainer};
///
/// let config = EmConfig::builder()
///     .max_iterations(20)
///     .weight_tolerance(1e-3)
///     .build();
///
/// // let mut trainer = EmTrainer::new(&mut graph, &mut sampler, config)?;
/// // let stats = trainer.run()?;
/// ```
pub struct EmTrainer<'a, G, S> {
    /// The factor graph being trained.
    graph: &'a mut G,

    /// The sampler performing inference and learning.
    sampler: &'a mut S,

    /// EM hyperparameters.
    config: EmConfig,

    /// Evidence mask captured at construction.
    evidence: EvidenceState,

    /// Convergence criterion selected by the config.
    detector: ConvergenceDetector,

    /// Completed maximization steps, the warm start included.
    iteration: u64,

    /// Whether the detector has fired.
    converged: bool,

    /// Receiver for per-iteration diagnostics.
    sink: Box<dyn ProgressSink>,
}

impl<'a, G, S> EmTrainer<'a, G, S>
where
    G: FactorGraph,
    S: GibbsSampler<G>,
{
    /// Creates a trainer over `graph` and `sampler`.
    ///
    /// Validates the config, captures the evidence mask, and builds the
    /// convergence detector: the windowed pseudo-log-likelihood criterion
    /// when `check_convergence` is set, the weight-delta criterion
    /// otherwise. Diagnostics go to a [`TracingSink`] until replaced via
    /// [`with_progress_sink`](Self::with_progress_sink).
    ///
    /// # Errors
    ///
    /// Returns [`EmError::InvalidConfig`] when the config fails
    /// validation and [`EmError::InvalidGraph`] when the graph has no
    /// variables or no weights.
    pub fn new(graph: &'a mut G, sampler: &'a mut S, config: EmConfig) -> Result<Self> {
        config.validate()?;
        if graph.num_variables() == 0 {
            return Err(EmError::InvalidGraph(
                "factor graph has no variables".to_string(),
            ));
        }
        if graph.num_weights() == 0 {
            return Err(EmError::InvalidGraph(
                "factor graph has no weights".to_string(),
            ));
        }

        let evidence = EvidenceState::capture(graph);
        let detector = if config.check_convergence {
            ConvergenceDetector::likelihood_window(config.window_length, config.window_threshold())
        } else {
            ConvergenceDetector::weight_delta(graph, config.weight_tolerance)
        };
        let sink = Box::new(TracingSink::new(config.quiet));

        Ok(Self {
            graph,
            sampler,
            config,
            evidence,
            detector,
            iteration: 0,
            converged: false,
            sink,
        })
    }

    /// Replaces the progress sink.
    #[must_use]
    pub fn with_progress_sink(mut self, sink: Box<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns whether the convergence criterion has fired.
    #[must_use]
    pub fn has_converged(&self) -> bool {
        self.converged
    }

    /// Returns the number of completed maximization steps.
    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.iteration
    }

    /// Returns the current evidence phase.
    #[must_use]
    pub fn evidence_phase(&self) -> EvidencePhase {
        self.evidence.phase()
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &EmConfig {
        &self.config
    }

    /// Returns a view of the graph being trained.
    #[must_use]
    pub fn graph(&self) -> &G {
        self.graph
    }

    /// Runs one expectation step: free inference, result aggregation,
    /// then freezing the sampled world as evidence.
    ///
    /// When the windowed criterion is active, also computes the negative
    /// pseudo-log-likelihood of the frozen world, feeds it to the
    /// detector, and returns it.
    ///
    /// # Errors
    ///
    /// Propagates sampler failures and likelihood estimation failures.
    pub fn expectation(&mut self) -> Result<Option<f64>> {
        self.sampler
            .infer(self.graph, self.config.inference_epochs, self.config.quiet)?;
        self.sampler.aggregate_and_dump(self.graph, self.config.quiet)?;
        self.evidence.freeze(self.graph);

        if !self.detector.wants_likelihood() {
            return Ok(None);
        }

        let value = likelihood::negative_pseudo_log_likelihood(self.graph)?;
        self.detector.record(value);
        self.sink.record(ProgressRecord {
            iteration: self.iteration,
            metric: ProgressMetric::NegPseudoLogLikelihood(value),
        });
        Ok(Some(value))
    }

    /// Runs one maximization step: weight learning, a weight dump,
    /// restoring the evidence mask, then the convergence check.
    ///
    /// Increments the iteration count and latches the detector verdict,
    /// which [`run`](Self::run) and [`has_converged`](Self::has_converged)
    /// observe.
    ///
    /// # Errors
    ///
    /// Propagates sampler failures.
    pub fn maximization(&mut self) -> Result<ConvergenceCheck> {
        let options = self.config.learn_options();
        self.sampler.learn(self.graph, &options)?;
        self.sampler.dump_weights(self.graph, self.config.quiet)?;
        self.evidence.restore(self.graph);

        self.iteration += 1;
        let check = self.detector.evaluate(self.graph, self.iteration);
        self.converged = check.converged;
        self.emit(check);
        Ok(check)
    }

    /// Runs the full EM schedule.
    ///
    /// Performs the warm-start maximization, then alternates expectation
    /// and maximization until the criterion fires or `max_iterations`
    /// cycles have run, and finally persists weights and aggregates one
    /// last time. A budget of zero means warm start and dumps only.
    ///
    /// # Errors
    ///
    /// Propagates the first sampler or estimator failure; the run stops
    /// at that point.
    pub fn run(&mut self) -> Result<EmStats> {
        let start = Instant::now();

        let mut check = self.maximization()?;
        let budget = u64::from(self.config.max_iterations);
        let mut cycles = 0u64;
        while !self.converged && cycles < budget {
            self.expectation()?;
            check = self.maximization()?;
            cycles += 1;
        }

        self.sampler.dump_weights(self.graph, self.config.quiet)?;
        self.sampler.aggregate_and_dump(self.graph, self.config.quiet)?;

        let stats = EmStats {
            iterations: self.iteration,
            cycles,
            converged: self.converged,
            elapsed_secs: start.elapsed().as_secs_f64(),
            final_metric: check.metric.scalar(),
        };
        if self.config.quiet {
            tracing::debug!("EM run finished: {stats}");
        } else {
            tracing::info!("EM run finished: {stats}");
        }
        Ok(stats)
    }

    /// Forwards the diagnostics carried by a convergence check.
    fn emit(&mut self, check: ConvergenceCheck) {
        match check.metric {
            ConvergenceMetric::MaxWeightDelta { value } => {
                self.sink.record(ProgressRecord {
                    iteration: self.iteration,
                    metric: ProgressMetric::MaxWeightDelta(value),
                });
            }
            ConvergenceMetric::WindowChange {
                old_sum, new_sum, ..
            } => {
                self.sink.record(ProgressRecord {
                    iteration: self.iteration,
                    metric: ProgressMetric::WindowOldSum(old_sum),
                });
                self.sink.record(ProgressRecord {
                    iteration: self.iteration,
                    metric: ProgressMetric::WindowNewSum(new_sum),
                });
            }
            ConvergenceMetric::AwaitingHistory { .. } => {}
        }
    }
}

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use gibbs_em_rs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ConvergenceCheck, ConvergenceDetector, ConvergenceMetric, EmConfig, EmError, EmStats,
        EmTrainer, EvidencePhase, EvidenceState, FactorGraph, GibbsSampler, LearnOptions,
        ProgressMetric, ProgressRecord, ProgressSink, Result, TracingSink, VariableDomain,
    };
}
