//! Progress reporting and run statistics.
//!
//! The trainer emits one [`ProgressRecord`] per diagnostic it produces:
//! the weight-delta or window sums from the maximization step, and the
//! negative pseudo-log-likelihood from the expectation step when the
//! windowed criterion is active. Records flow through a [`ProgressSink`]
//! so callers can capture them for plotting or assertions; the default
//! [`TracingSink`] forwards them to `tracing`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single diagnostic value produced during an EM run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ProgressMetric {
    /// Largest absolute weight change since the previous maximization.
    MaxWeightDelta(f64),
    /// Sum of the older half of the pseudo-log-likelihood window.
    WindowOldSum(f64),
    /// Sum of the newer half of the pseudo-log-likelihood window.
    WindowNewSum(f64),
    /// Negative pseudo-log-likelihood of the evidence variables.
    NegPseudoLogLikelihood(f64),
}

impl ProgressMetric {
    /// Stable identifier for the metric, suitable for log fields.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::MaxWeightDelta(_) => "max_weight_delta",
            Self::WindowOldSum(_) => "window_old_sum",
            Self::WindowNewSum(_) => "window_new_sum",
            Self::NegPseudoLogLikelihood(_) => "neg_pseudo_log_likelihood",
        }
    }

    /// The carried value.
    #[must_use]
    pub fn value(&self) -> f64 {
        match self {
            Self::MaxWeightDelta(v)
            | Self::WindowOldSum(v)
            | Self::WindowNewSum(v)
            | Self::NegPseudoLogLikelihood(v) => *v,
        }
    }
}

impl fmt::Display for ProgressMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {:.6}", self.name(), self.value())
    }
}

/// A metric tagged with the maximization iteration that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Completed maximization count at the time of emission.
    pub iteration: u64,
    /// The diagnostic value.
    pub metric: ProgressMetric,
}

/// Receives diagnostics as the trainer produces them.
pub trait ProgressSink {
    /// Called once per emitted diagnostic.
    fn record(&mut self, record: ProgressRecord);
}

/// Default sink that forwards records to `tracing`.
///
/// Quiet runs downgrade the records to debug level so they stay
/// available to subscribers without cluttering normal output.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    quiet: bool,
}

impl TracingSink {
    /// Creates a sink; `quiet` selects debug-level output.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressSink for TracingSink {
    fn record(&mut self, record: ProgressRecord) {
        if self.quiet {
            tracing::debug!(
                "iteration {}: {} = {:.6}",
                record.iteration,
                record.metric.name(),
                record.metric.value()
            );
        } else {
            tracing::info!(
                "iteration {}: {} = {:.6}",
                record.iteration,
                record.metric.name(),
                record.metric.value()
            );
        }
    }
}

/// Summary of a completed EM run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmStats {
    /// Total maximization steps, the warm-start included.
    pub iterations: u64,
    /// Full expectation + maximization cycles consumed.
    pub cycles: u64,
    /// Whether the convergence criterion fired before the budget ran out.
    pub converged: bool,
    /// Wall-clock duration of the run in seconds.
    pub elapsed_secs: f64,
    /// Scalar from the last convergence evaluation, when one exists.
    pub final_metric: Option<f64>,
}

impl fmt::Display for EmStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Iterations: {} | Cycles: {} | Converged: {} | Elapsed: {:.2}s",
            self.iterations, self.cycles, self.converged, self.elapsed_secs
        )?;
        if let Some(metric) = self.final_metric {
            write!(f, " | Final metric: {metric:.6}")?;
        }
        Ok(())
    }
}
