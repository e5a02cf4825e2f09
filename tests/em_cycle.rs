//! End-to-end tests for the EM schedule against a mock Gibbs sampler.

use std::cell::RefCell;
use std::rc::Rc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use gibbs_em_rs::prelude::*;

/// Small mixed-domain graph: four booleans and one three-way multinomial.
struct ChainGraph {
    domains: Vec<VariableDomain>,
    observed: Vec<bool>,
    free: Vec<i64>,
    evidence: Vec<i64>,
    weights: Vec<f64>,
}

impl ChainGraph {
    fn new() -> Self {
        let mut domains = vec![VariableDomain::Boolean; 4];
        domains.push(VariableDomain::Multinomial { low: 0, high: 2 });
        Self {
            domains,
            observed: vec![true, false, true, false, false],
            free: vec![0; 5],
            evidence: vec![1, 0, 1, 0, 0],
            weights: vec![0.0; 3],
        }
    }
}

impl FactorGraph for ChainGraph {
    fn num_variables(&self) -> usize {
        self.domains.len()
    }

    fn num_weights(&self) -> usize {
        self.weights.len()
    }

    fn domain(&self, variable: usize) -> VariableDomain {
        self.domains[variable]
    }

    fn is_observed(&self, variable: usize) -> bool {
        self.observed[variable]
    }

    fn set_observed(&mut self, variable: usize, observed: bool) {
        self.observed[variable] = observed;
    }

    fn free_assignment(&self, variable: usize) -> i64 {
        self.free[variable]
    }

    fn evidence_assignment(&self, variable: usize) -> i64 {
        self.evidence[variable]
    }

    fn set_evidence_assignment(&mut self, variable: usize, value: i64) {
        self.evidence[variable] = value;
    }

    fn weight_value(&self, weight: usize) -> f64 {
        self.weights[weight]
    }

    fn potential(&self, variable: usize, value: i64) -> f64 {
        self.weights[variable % self.weights.len()] * value as f64
    }
}

/// Mock sampler: seeded draws for inference, a shrinking fixed step for
/// learning, and an event log for schedule assertions.
struct MockSampler {
    rng: ChaCha8Rng,
    weight_step: f64,
    shrink: f64,
    deterministic_world: bool,
    fail_learn_on: Option<usize>,
    learn_calls: usize,
    last_options: Option<LearnOptions>,
    events: Vec<&'static str>,
}

impl MockSampler {
    fn new(weight_step: f64, shrink: f64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(42),
            weight_step,
            shrink,
            deterministic_world: false,
            fail_learn_on: None,
            learn_calls: 0,
            last_options: None,
            events: Vec::new(),
        }
    }

    /// Makes inference produce the same world every time.
    fn deterministic(mut self) -> Self {
        self.deterministic_world = true;
        self
    }

    /// Injects a failure into the n-th learn call (1-based).
    fn failing_learn(mut self, call: usize) -> Self {
        self.fail_learn_on = Some(call);
        self
    }
}

impl GibbsSampler<ChainGraph> for MockSampler {
    fn infer(&mut self, graph: &mut ChainGraph, _epochs: u32, _quiet: bool) -> Result<()> {
        self.events.push("infer");
        for variable in 0..graph.num_variables() {
            if graph.is_observed(variable) {
                // Evidence variables stay pinned to their observed value.
                graph.free[variable] = graph.evidence_assignment(variable);
                continue;
            }
            let value = match graph.domain(variable) {
                VariableDomain::Boolean => {
                    if self.deterministic_world {
                        1
                    } else {
                        i64::from(self.rng.gen_bool(0.5))
                    }
                }
                VariableDomain::Multinomial { low, high } => {
                    if self.deterministic_world {
                        low
                    } else {
                        self.rng.gen_range(low..=high)
                    }
                }
                VariableDomain::Real => 0,
            };
            graph.free[variable] = value;
        }
        Ok(())
    }

    fn learn(&mut self, graph: &mut ChainGraph, options: &LearnOptions) -> Result<()> {
        self.events.push("learn");
        self.learn_calls += 1;
        self.last_options = Some(*options);
        if self.fail_learn_on == Some(self.learn_calls) {
            return Err(EmError::sampler("learn", "injected failure"));
        }
        for weight in &mut graph.weights {
            *weight += self.weight_step;
        }
        self.weight_step *= self.shrink;
        Ok(())
    }

    fn dump_weights(&mut self, _graph: &ChainGraph, _quiet: bool) -> Result<()> {
        self.events.push("dump_weights");
        Ok(())
    }

    fn aggregate_and_dump(&mut self, _graph: &ChainGraph, _quiet: bool) -> Result<()> {
        self.events.push("aggregate");
        Ok(())
    }
}

/// Sink backed by a shared buffer the test keeps a handle to.
#[derive(Clone, Default)]
struct RecordingSink {
    records: Rc<RefCell<Vec<ProgressRecord>>>,
}

impl ProgressSink for RecordingSink {
    fn record(&mut self, record: ProgressRecord) {
        self.records.borrow_mut().push(record);
    }
}

#[test]
fn test_cycle_restores_then_freezes_then_restores() {
    let mut graph = ChainGraph::new();
    let mut sampler = MockSampler::new(0.5, 1.0);
    let mut trainer = EmTrainer::new(&mut graph, &mut sampler, EmConfig::default()).unwrap();

    // Warm start ends with the user mask in place.
    trainer.maximization().unwrap();
    assert_eq!(trainer.evidence_phase(), EvidencePhase::Restored);
    assert!(!trainer.graph().is_observed(1));

    // Expectation freezes the sampled world: everything becomes evidence.
    trainer.expectation().unwrap();
    assert_eq!(trainer.evidence_phase(), EvidencePhase::Frozen);
    for variable in 0..5 {
        assert!(trainer.graph().is_observed(variable), "variable {variable} not frozen");
    }
    let categorical = trainer.graph().evidence_assignment(4);
    assert!((0..=2).contains(&categorical), "value {categorical} out of domain");
    // Originally observed variables keep their evidence value.
    assert_eq!(trainer.graph().evidence_assignment(0), 1);

    // The next maximization puts the user mask back.
    trainer.maximization().unwrap();
    assert_eq!(trainer.evidence_phase(), EvidencePhase::Restored);
    assert!(trainer.graph().is_observed(0));
    assert!(!trainer.graph().is_observed(1));
    assert!(!trainer.graph().is_observed(3));
}

#[test]
fn test_run_schedule_event_order() {
    let mut graph = ChainGraph::new();
    let mut sampler = MockSampler::new(0.5, 1.0);
    let config = EmConfig::builder().max_iterations(1).build();
    {
        let mut trainer = EmTrainer::new(&mut graph, &mut sampler, config).unwrap();
        let stats = trainer.run().unwrap();
        assert_eq!(stats.iterations, 2);
        assert_eq!(stats.cycles, 1);
    }

    // Warm maximization, one full cycle, then the final dumps.
    assert_eq!(
        sampler.events,
        vec![
            "learn",
            "dump_weights",
            "infer",
            "aggregate",
            "learn",
            "dump_weights",
            "dump_weights",
            "aggregate",
        ]
    );
}

#[test]
fn test_run_converges_on_weight_delta() {
    let mut graph = ChainGraph::new();
    // Step halves per learn: 0.5, 0.25, ... drops below 0.01 on call 7.
    let mut sampler = MockSampler::new(0.5, 0.5);
    let mut trainer = EmTrainer::new(&mut graph, &mut sampler, EmConfig::default()).unwrap();

    let stats = trainer.run().unwrap();

    assert!(stats.converged);
    assert_eq!(stats.iterations, 7);
    assert_eq!(stats.cycles, 6);
    let final_metric = stats.final_metric.expect("weight-delta run reports a metric");
    assert!(final_metric < 0.01, "final delta {final_metric} above tolerance");
}

#[test]
fn test_run_exhausts_budget_without_convergence() {
    let mut graph = ChainGraph::new();
    // Constant step keeps the delta at 0.5 forever.
    let mut sampler = MockSampler::new(0.5, 1.0);
    let config = EmConfig::builder().max_iterations(4).build();
    let mut trainer = EmTrainer::new(&mut graph, &mut sampler, config).unwrap();

    let stats = trainer.run().unwrap();

    assert!(!stats.converged);
    assert_eq!(stats.cycles, 4);
    assert_eq!(stats.iterations, 5);
    assert_eq!(stats.final_metric, Some(0.5));
}

#[test]
fn test_windowed_criterion_converges_on_flat_likelihood() {
    let mut graph = ChainGraph::new();
    // Frozen weights and a deterministic world make the likelihood flat.
    let mut sampler = MockSampler::new(0.0, 1.0).deterministic();
    let config = EmConfig::builder()
        .check_convergence(true)
        .window_length(2)
        .max_iterations(20)
        .build();
    let sink = RecordingSink::default();
    let handle = sink.clone();
    let mut trainer = EmTrainer::new(&mut graph, &mut sampler, config)
        .unwrap()
        .with_progress_sink(Box::new(sink));

    let stats = trainer.run().unwrap();

    // The window needs 2W = 4 observations before it can fire.
    assert!(stats.converged);
    assert_eq!(stats.cycles, 4);
    let relative = stats.final_metric.expect("windowed run reports a metric");
    assert!(relative.abs() < 1e-12, "flat likelihood moved by {relative}");

    let records = handle.records.borrow();
    let likelihoods: Vec<f64> = records
        .iter()
        .filter(|r| r.metric.name() == "neg_pseudo_log_likelihood")
        .map(|r| r.metric.value())
        .collect();
    assert_eq!(likelihoods.len(), 4);
    for value in &likelihoods {
        assert!((value - likelihoods[0]).abs() < 1e-12);
    }
    assert!(records
        .iter()
        .any(|r| r.metric.name() == "window_old_sum"));
    assert!(records
        .iter()
        .any(|r| r.metric.name() == "window_new_sum"));
}

#[test]
fn test_progress_records_reach_custom_sink() {
    let mut graph = ChainGraph::new();
    let mut sampler = MockSampler::new(0.5, 1.0);
    let config = EmConfig::builder().max_iterations(2).build();
    let sink = RecordingSink::default();
    let handle = sink.clone();
    let mut trainer = EmTrainer::new(&mut graph, &mut sampler, config)
        .unwrap()
        .with_progress_sink(Box::new(sink));

    trainer.run().unwrap();

    // One delta record per maximization, tagged with its iteration.
    let records = handle.records.borrow();
    assert_eq!(records.len(), 3);
    for (index, record) in records.iter().enumerate() {
        assert_eq!(record.iteration, index as u64 + 1);
        assert_eq!(record.metric.name(), "max_weight_delta");
        assert!((record.metric.value() - 0.5).abs() < 1e-12);
    }
}

#[test]
fn test_learn_failure_aborts_run() {
    let mut graph = ChainGraph::new();
    let mut sampler = MockSampler::new(0.5, 1.0).failing_learn(2);
    {
        let mut trainer =
            EmTrainer::new(&mut graph, &mut sampler, EmConfig::default()).unwrap();
        let err = trainer.run().unwrap_err();
        assert!(matches!(err, EmError::Sampler { operation: "learn", .. }));
        // The failing maximization never restored the mask.
        assert_eq!(trainer.evidence_phase(), EvidencePhase::Frozen);
    }
    assert_eq!(sampler.learn_calls, 2);
    assert_eq!(sampler.events.last(), Some(&"learn"));
}

#[test]
fn test_learn_receives_config_hyperparameters() {
    let mut graph = ChainGraph::new();
    let mut sampler = MockSampler::new(0.5, 1.0);
    let config = EmConfig::builder()
        .learning_epochs(7)
        .samples_per_epoch(2)
        .stepsize(0.05)
        .reg_l2(0.3)
        .build();
    {
        let mut trainer = EmTrainer::new(&mut graph, &mut sampler, config).unwrap();
        trainer.maximization().unwrap();
    }

    let options = sampler.last_options.expect("learn was called");
    assert_eq!(
        options,
        LearnOptions {
            epochs: 7,
            samples_per_epoch: 2,
            stepsize: 0.05,
            decay: 0.95,
            reg_l2: 0.3,
            reg_l1: 0.0,
            quiet: false,
        }
    );
}
