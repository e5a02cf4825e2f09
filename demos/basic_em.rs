//! Basic EM run over a toy boolean graph with a naive Gibbs sampler.
//!
//! This example wires a small in-memory factor graph and a straightforward
//! Gibbs implementation into the EM loop to show the full schedule: the
//! warm-start maximization, alternating cycles, and the final dumps.
//!
//! # Running
//!
//! ```bash
//! cargo run --example basic_em
//! ```

use gibbs_em_rs::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Twelve boolean variables sharing three weights; variable `v` is tied
/// to weight `v % 3`.
struct StarGraph {
    observed: Vec<bool>,
    free: Vec<i64>,
    evidence: Vec<i64>,
    weights: Vec<f64>,
}

impl StarGraph {
    fn new() -> Self {
        let mut observed = vec![false; 12];
        let mut evidence = vec![0; 12];
        // Half the variables arrive as evidence with a biased pattern.
        for v in 0..6 {
            observed[v] = true;
            evidence[v] = i64::from(v % 3 != 2);
        }
        Self {
            observed,
            free: vec![0; 12],
            evidence,
            weights: vec![0.0; 3],
        }
    }
}

impl FactorGraph for StarGraph {
    fn num_variables(&self) -> usize {
        self.observed.len()
    }

    fn num_weights(&self) -> usize {
        self.weights.len()
    }

    fn domain(&self, _variable: usize) -> VariableDomain {
        VariableDomain::Boolean
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

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Single-site Gibbs sampler with a logistic weight update rule.
struct NaiveGibbsSampler {
    rng: ChaCha8Rng,
    /// Per-variable count of epochs that sampled the variable as 1.
    positive_counts: Vec<u64>,
    epochs_seen: u64,
}

impl NaiveGibbsSampler {
    fn new(num_variables: usize, seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            positive_counts: vec![0; num_variables],
            epochs_seen: 0,
        }
    }
}

impl GibbsSampler<StarGraph> for NaiveGibbsSampler {
    fn infer(&mut self, graph: &mut StarGraph, epochs: u32, _quiet: bool) -> Result<()> {
        for _ in 0..epochs {
            for v in 0..graph.num_variables() {
                if graph.is_observed(v) {
                    graph.free[v] = graph.evidence_assignment(v);
                } else {
                    let gap = graph.potential(v, 1) - graph.potential(v, 0);
                    graph.free[v] = i64::from(self.rng.gen_bool(sigmoid(gap)));
                }
                if graph.free[v] == 1 {
                    self.positive_counts[v] += 1;
                }
            }
            self.epochs_seen += 1;
        }
        Ok(())
    }

    fn learn(&mut self, graph: &mut StarGraph, options: &LearnOptions) -> Result<()> {
        let num_weights = graph.num_weights();
        let mut stepsize = options.stepsize;
        for _ in 0..options.epochs {
            let mut gradient = vec![0.0; num_weights];
            let mut touched = vec![0u32; num_weights];
            for v in 0..graph.num_variables() {
                if !graph.is_observed(v) {
                    continue;
                }
                let k = v % num_weights;
                let target = graph.evidence_assignment(v) as f64;
                let model = sigmoid(graph.potential(v, 1) - graph.potential(v, 0));
                gradient[k] += target - model;
                touched[k] += 1;
            }
            for k in 0..num_weights {
                if touched[k] == 0 {
                    continue;
                }
                let grad = gradient[k] / f64::from(touched[k])
                    - options.reg_l2 * graph.weights[k]
                    - options.reg_l1 * graph.weights[k].signum();
                graph.weights[k] += stepsize * grad;
            }
            stepsize *= options.decay;
        }
        Ok(())
    }

    fn dump_weights(&mut self, graph: &StarGraph, quiet: bool) -> Result<()> {
        if quiet {
            tracing::debug!("weights: {:?}", graph.weights);
        } else {
            tracing::info!("weights: {:?}", graph.weights);
        }
        Ok(())
    }

    fn aggregate_and_dump(&mut self, _graph: &StarGraph, quiet: bool) -> Result<()> {
        if self.epochs_seen == 0 {
            return Ok(());
        }
        let marginals: Vec<f64> = self
            .positive_counts
            .iter()
            .map(|&count| count as f64 / self.epochs_seen as f64)
            .collect();
        if quiet {
            tracing::debug!("marginals over {} epochs: {:?}", self.epochs_seen, marginals);
        } else {
            tracing::info!("marginals over {} epochs: {:?}", self.epochs_seen, marginals);
        }
        Ok(())
    }
}

fn main() -> gibbs_em_rs::Result<()> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("{}", "=".repeat(64));
    println!("EM OVER A TOY FACTOR GRAPH");
    println!("{}", "=".repeat(64));

    let config = EmConfig::builder()
        .max_iterations(10)
        .learning_epochs(20)
        .inference_epochs(200)
        .stepsize(0.5)
        .decay(0.95)
        .build();

    println!("Configuration:");
    println!("  Cycle budget:     {}", config.max_iterations);
    println!("  Learning epochs:  {}", config.learning_epochs);
    println!("  Inference epochs: {}", config.inference_epochs);
    println!("  Stepsize / decay: {} / {}", config.stepsize, config.decay);
    println!("  Weight tolerance: {}", config.weight_tolerance);
    println!();

    let mut graph = StarGraph::new();
    let mut sampler = NaiveGibbsSampler::new(graph.num_variables(), 7);

    let stats = {
        let mut trainer = EmTrainer::new(&mut graph, &mut sampler, config)?;
        trainer.run()?
    };

    println!();
    println!("Run summary: {stats}");
    println!("Learned weights: {:?}", graph.weights);

    Ok(())
}
