//! Negative pseudo-log-likelihood estimation.
//!
//! The estimate sums, over every currently evidenced variable, the log of
//! the inverse local-conditional probability of its observed value under
//! the current weights: `Σ log(1 / P(observed | neighbors, weights))`.
//! Normalizing each variable against only its own candidate values keeps
//! the metric tractable on graphs where the global partition function is
//! out of reach.
//!
//! Callers evaluate this immediately after an expectation step has frozen
//! the sampled world, so every variable is evidenced and the result
//! measures how well the learned weights explain that world.

use crate::error::Result;
use crate::{EmError, FactorGraph, VariableDomain};

/// Sums the per-variable contributions over all evidenced variables.
///
/// Variables whose observed flag is clear contribute nothing. The result
/// is non-negative (each term is a `-log` of a probability).
///
/// # Errors
///
/// Returns [`EmError::UnsupportedDomain`] on the first evidenced variable
/// whose domain has no contribution rule.
pub fn negative_pseudo_log_likelihood<G: FactorGraph + ?Sized>(graph: &G) -> Result<f64> {
    let mut total = 0.0;
    for v in 0..graph.num_variables() {
        if !graph.is_observed(v) {
            continue;
        }
        total += variable_contribution(graph, v)?;
    }
    Ok(total)
}

/// Contribution of a single variable: `log(1 / P(observed | rest))`.
///
/// - Boolean: with `pPos = potential(v, 1)` and `pNeg = potential(v, 0)`,
///   the contribution is `log(1 + exp(pNeg − pPos))` when the observed
///   value is 1 and `log(1 + exp(pPos − pNeg))` otherwise.
/// - Multinomial over `[low, high]`: `log Z − potential(v, observed)` with
///   `Z = Σ_{val=low..=high} exp(potential(v, val))`, evaluated in the log
///   domain.
///
/// # Errors
///
/// Returns [`EmError::UnsupportedDomain`] for any other domain kind.
pub fn variable_contribution<G: FactorGraph + ?Sized>(graph: &G, variable: usize) -> Result<f64> {
    match graph.domain(variable) {
        VariableDomain::Boolean => {
            let p_pos = graph.potential(variable, 1);
            let p_neg = graph.potential(variable, 0);
            if graph.evidence_assignment(variable) == 1 {
                Ok(log1p_exp(p_neg - p_pos))
            } else {
                Ok(log1p_exp(p_pos - p_neg))
            }
        }
        VariableDomain::Multinomial { low, high } => {
            let potentials: Vec<f64> = (low..=high)
                .map(|value| graph.potential(variable, value))
                .collect();
            let log_z = log_sum_exp(&potentials);
            let observed = graph.evidence_assignment(variable);
            Ok(log_z - graph.potential(variable, observed))
        }
        domain @ VariableDomain::Real => Err(EmError::UnsupportedDomain {
            variable,
            domain: domain.name(),
        }),
    }
}

/// `log(1 + exp(x))` without overflow for large `x`.
#[inline]
#[must_use]
pub fn log1p_exp(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

/// `log Σ exp(vᵢ)` with max-shifting.
///
/// Returns negative infinity for an empty slice.
#[must_use]
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let m = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !m.is_finite() {
        return m;
    }
    let sum: f64 = values.iter().map(|v| (v - m).exp()).sum();
    m + sum.ln()
}
