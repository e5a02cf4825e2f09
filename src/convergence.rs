//! Convergence detection for the EM loop.
//!
//! Two mutually exclusive policies, fixed at construction:
//!
//! - **Weight delta** - after each maximization, the largest absolute
//!   change across all weights since the previous snapshot is compared
//!   against a fixed tolerance. The snapshot refreshes in the same scan.
//! - **Pseudo-likelihood window** - negative pseudo-log-likelihood
//!   observations accumulate in a bounded history; once the iteration
//!   counter reaches 2×W and the history is full, the oldest-W and
//!   newest-W window sums are compared and the run converges when their
//!   relative change drops to 10^(−Δ) or below.
//!
//! Neither policy errors. With insufficient data (or a degenerate ratio)
//! the verdict is simply "not converged".

use crate::history::PseudoLikelihoodHistory;
use crate::FactorGraph;

/// Outcome of one convergence evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceCheck {
    /// Whether the active policy judged the run converged.
    pub converged: bool,
    /// The diagnostic the verdict was based on.
    pub metric: ConvergenceMetric,
}

/// Diagnostic produced by a convergence evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConvergenceMetric {
    /// Largest absolute per-weight change since the previous snapshot.
    MaxWeightDelta {
        /// The max |current − previous| over all weights.
        value: f64,
    },

    /// Window comparison under the pseudo-likelihood policy.
    WindowChange {
        /// Sum of the oldest W observations.
        old_sum: f64,
        /// Sum of the newest W observations.
        new_sum: f64,
        /// `|old_sum − new_sum| / old_sum`.
        relative: f64,
    },

    /// The window policy is not yet eligible to fire.
    AwaitingHistory {
        /// Observations recorded so far.
        have: usize,
        /// Observations required (2×W).
        need: usize,
    },
}

impl ConvergenceMetric {
    /// The scalar a progress line would report, when one exists.
    #[must_use]
    pub fn scalar(&self) -> Option<f64> {
        match self {
            ConvergenceMetric::MaxWeightDelta { value } => Some(*value),
            ConvergenceMetric::WindowChange { relative, .. } => Some(*relative),
            ConvergenceMetric::AwaitingHistory { .. } => None,
        }
    }
}

/// Evaluates one of the two convergence policies against the evolving
/// model state.
#[derive(Debug, Clone)]
pub struct ConvergenceDetector {
    criterion: Criterion,
}

#[derive(Debug, Clone)]
enum Criterion {
    WeightDelta {
        tolerance: f64,
        previous: Vec<f64>,
    },
    LikelihoodWindow {
        threshold: f64,
        history: PseudoLikelihoodHistory,
    },
}

impl ConvergenceDetector {
    /// Weight-delta policy, snapshotting the graph's current weights as
    /// the comparison baseline.
    #[must_use]
    pub fn weight_delta<G: FactorGraph + ?Sized>(graph: &G, tolerance: f64) -> Self {
        let previous = (0..graph.num_weights())
            .map(|w| graph.weight_value(w))
            .collect();
        Self {
            criterion: Criterion::WeightDelta {
                tolerance,
                previous,
            },
        }
    }

    /// Pseudo-likelihood window policy with window length W and converge
    /// threshold 10^(−Δ) supplied directly.
    #[must_use]
    pub fn likelihood_window(window: usize, threshold: f64) -> Self {
        Self {
            criterion: Criterion::LikelihoodWindow {
                threshold,
                history: PseudoLikelihoodHistory::new(window),
            },
        }
    }

    /// Whether the active policy consumes pseudo-likelihood observations.
    #[must_use]
    pub fn wants_likelihood(&self) -> bool {
        matches!(self.criterion, Criterion::LikelihoodWindow { .. })
    }

    /// Feeds one negative pseudo-log-likelihood observation.
    ///
    /// A no-op under the weight-delta policy.
    pub fn record(&mut self, value: f64) {
        if let Criterion::LikelihoodWindow { history, .. } = &mut self.criterion {
            history.record(value);
        }
    }

    /// Evaluates the active policy after a completed maximization.
    ///
    /// `iteration` is the maximization count so far; the window policy is
    /// not eligible before it reaches 2×W. The weight-delta policy also
    /// refreshes its snapshot here, in lock-step with the comparison.
    pub fn evaluate<G: FactorGraph + ?Sized>(
        &mut self,
        graph: &G,
        iteration: u64,
    ) -> ConvergenceCheck {
        match &mut self.criterion {
            Criterion::WeightDelta {
                tolerance,
                previous,
            } => {
                let mut maxdiff = 0.0f64;
                for (w, prev) in previous.iter_mut().enumerate() {
                    let current = graph.weight_value(w);
                    let diff = (current - *prev).abs();
                    if diff > maxdiff {
                        maxdiff = diff;
                    }
                    *prev = current;
                }
                ConvergenceCheck {
                    converged: maxdiff < *tolerance,
                    metric: ConvergenceMetric::MaxWeightDelta { value: maxdiff },
                }
            }
            Criterion::LikelihoodWindow { threshold, history } => {
                let need = history.capacity();
                match history.window_sums() {
                    Some((old_sum, new_sum)) if iteration >= need as u64 => {
                        let relative = (old_sum - new_sum).abs() / old_sum;
                        ConvergenceCheck {
                            converged: relative <= *threshold,
                            metric: ConvergenceMetric::WindowChange {
                                old_sum,
                                new_sum,
                                relative,
                            },
                        }
                    }
                    _ => ConvergenceCheck {
                        converged: false,
                        metric: ConvergenceMetric::AwaitingHistory {
                            have: history.len(),
                            need,
                        },
                    },
                }
            }
        }
    }

    /// The recorded history, when the window policy is active.
    #[must_use]
    pub fn history(&self) -> Option<&PseudoLikelihoodHistory> {
        match &self.criterion {
            Criterion::LikelihoodWindow { history, .. } => Some(history),
            Criterion::WeightDelta { .. } => None,
        }
    }

    /// The weight snapshot, when the weight-delta policy is active.
    #[must_use]
    pub fn weight_snapshot(&self) -> Option<&[f64]> {
        match &self.criterion {
            Criterion::WeightDelta { previous, .. } => Some(previous),
            Criterion::LikelihoodWindow { .. } => None,
        }
    }
}
