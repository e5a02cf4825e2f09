//! Evidence mask state machine.
//!
//! Alternating E/M steps are only correct if every expectation runs against
//! the graph as originally observed and every maximization sees a fully
//! observed world. This module owns the construction-time observation mask
//! and the two transitions that move the graph between those states.
//!
//! # State Machine
//!
//! ```text
//! RESTORED ──(freeze: copy free-run sample into evidence,
//!             mark every variable observed)──▶ FROZEN
//!
//! FROZEN ──(restore: reset observed flags to the
//!           construction-time mask)──▶ RESTORED
//! ```
//!
//! Both transitions are full scans over the variable set and cannot fail
//! partway; either the call has been made and every variable was updated,
//! or it has not.

use crate::FactorGraph;

/// The two evidence states the graph cycles through during EM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvidencePhase {
    /// Observed flags match the construction-time mask; originally
    /// unobserved variables are free to be sampled.
    Restored,

    /// Every variable is observed and its evidence slot holds the latest
    /// free-run assignment, a complete possible world for learning.
    Frozen,
}

impl EvidencePhase {
    /// Returns a human-readable name for the state.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            EvidencePhase::Restored => "restored",
            EvidencePhase::Frozen => "frozen",
        }
    }
}

impl std::fmt::Display for EvidencePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Owns the immutable observation mask and drives the freeze/restore
/// transitions on a borrowed factor graph.
///
/// The mask is captured once at construction and never resized; its length
/// always equals the graph's variable count.
#[derive(Debug, Clone)]
pub struct EvidenceState {
    mask: Vec<bool>,
    phase: EvidencePhase,
}

impl EvidenceState {
    /// Captures the current observation pattern of `graph` as the mask
    /// that [`restore`](Self::restore) will reinstate.
    #[must_use]
    pub fn capture<G: FactorGraph + ?Sized>(graph: &G) -> Self {
        let mask = (0..graph.num_variables())
            .map(|v| graph.is_observed(v))
            .collect();
        Self {
            mask,
            phase: EvidencePhase::Restored,
        }
    }

    /// Fixes the latest free-run sample as a complete possible world.
    ///
    /// For every variable, copies the free-run assignment into the evidence
    /// slot and marks the variable observed. Used once per expectation step.
    pub fn freeze<G: FactorGraph + ?Sized>(&mut self, graph: &mut G) {
        for v in 0..self.mask.len() {
            let sampled = graph.free_assignment(v);
            graph.set_evidence_assignment(v, sampled);
            graph.set_observed(v, true);
        }
        self.phase = EvidencePhase::Frozen;
    }

    /// Reinstates the construction-time observation pattern.
    ///
    /// Evidence slot contents are left alone; only the observed flags are
    /// reset. Used once per maximization step.
    pub fn restore<G: FactorGraph + ?Sized>(&mut self, graph: &mut G) {
        for (v, &observed) in self.mask.iter().enumerate() {
            graph.set_observed(v, observed);
        }
        self.phase = EvidencePhase::Restored;
    }

    /// Current state of the freeze/restore machine.
    #[must_use]
    pub fn phase(&self) -> EvidencePhase {
        self.phase
    }

    /// The observation pattern captured at construction.
    #[must_use]
    pub fn initial_mask(&self) -> &[bool] {
        &self.mask
    }

    /// Number of variables the mask covers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mask.len()
    }

    /// Whether the mask covers zero variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }
}
