//! Isolation forest with a seeded RNG and a contamination-based threshold.
//!
//! Outliers are isolated by fewer random splits, so their expected path
//! length is short. The anomaly score is `s(x) = 2^(-E[h(x)] / c(psi))`, in
//! `(0, 1]`; higher means more anomalous.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::DetectError;
use crate::config::{Contamination, ScoringConfig};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Score threshold used when contamination is `auto`.
pub const AUTO_THRESHOLD: f64 = 0.5;

/// Decisions closer than this to the threshold are treated as exactly on it.
const DECISION_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct ForestParams {
    pub trees: usize,
    pub max_samples: usize,
    pub seed: u64,
    pub contamination: Contamination,
}

impl From<&ScoringConfig> for ForestParams {
    fn from(cfg: &ScoringConfig) -> Self {
        Self {
            trees: cfg.trees,
            max_samples: cfg.max_samples,
            seed: cfg.seed,
            contamination: cfg.contamination,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    /// Normalisation term `c(psi)` for the per-tree subsample size.
    avg_path_length: f64,
    width: usize,
    threshold: f64,
}

impl IsolationForest {
    /// Fit on `data`. All rows must share one width.
    pub fn fit(data: &[Vec<f64>], params: &ForestParams) -> Result<Self, DetectError> {
        let width = match data.first() {
            Some(row) => row.len(),
            None => return Err(DetectError::EmptyTrainingSet),
        };
        if let Some(bad) = data.iter().find(|r| r.len() != width) {
            return Err(DetectError::ShapeMismatch {
                expected: width,
                actual: bad.len(),
            });
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let sample_size = params.max_samples.min(data.len()).max(1);
        let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;

        let mut trees = Vec::with_capacity(params.trees);
        for _ in 0..params.trees {
            // Subsample without replacement.
            let sample: Vec<&[f64]> = rand::seq::index::sample(&mut rng, data.len(), sample_size)
                .iter()
                .map(|i| data[i].as_slice())
                .collect();
            trees.push(IsolationTree::build(&sample, width, max_depth, &mut rng));
        }

        let mut forest = Self {
            trees,
            avg_path_length: average_path_length(sample_size),
            width,
            threshold: AUTO_THRESHOLD,
        };

        if let Contamination::Fraction(fraction) = params.contamination {
            let mut scores: Vec<f64> = data.iter().map(|row| forest.raw_score(row)).collect();
            forest.threshold = quantile(&mut scores, 1.0 - fraction);
        }

        Ok(forest)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Isolation score `s(x)` in `(0, 1]`.
    pub fn anomaly_score(&self, row: &[f64]) -> Result<f64, DetectError> {
        if row.len() != self.width {
            return Err(DetectError::ShapeMismatch {
                expected: self.width,
                actual: row.len(),
            });
        }
        Ok(self.raw_score(row))
    }

    /// `s(x) - threshold`: positive for outliers, zero or negative for inliers.
    pub fn decision(&self, row: &[f64]) -> Result<f64, DetectError> {
        let diff = self.anomaly_score(row)? - self.threshold;
        // Averaging identical path lengths can land an ulp off the threshold.
        if diff.abs() < DECISION_EPSILON {
            return Ok(0.0);
        }
        Ok(diff)
    }

    fn raw_score(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() || self.avg_path_length == 0.0 {
            return AUTO_THRESHOLD;
        }
        let total: f64 = self.trees.iter().map(|t| t.path_length(row)).sum();
        let mean = total / self.trees.len() as f64;
        2.0_f64.powf(-mean / self.avg_path_length)
    }
}

/// Expected path length of an unsuccessful BST search over `n` points, `c(n)`.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated quantile, `q` in `[0, 1]`. Sorts `values` in place.
fn quantile(values: &mut [f64], q: f64) -> f64 {
    if values.is_empty() {
        return AUTO_THRESHOLD;
    }
    values.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (pos - lo as f64)
}

#[derive(Debug, Clone)]
struct IsolationTree {
    root: Node,
}

#[derive(Debug, Clone)]
enum Node {
    Internal {
        feature: usize,
        split: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

impl IsolationTree {
    fn build(samples: &[&[f64]], width: usize, max_depth: usize, rng: &mut StdRng) -> Self {
        Self {
            root: build_node(samples, width, 0, max_depth, rng),
        }
    }

    fn path_length(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;
        loop {
            match node {
                Node::Leaf { size } => return depth as f64 + average_path_length(*size),
                Node::Internal {
                    feature,
                    split,
                    left,
                    right,
                } => {
                    node = if row[*feature] < *split { &**left } else { &**right };
                    depth += 1;
                }
            }
        }
    }
}

fn build_node(samples: &[&[f64]], width: usize, depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
    if depth >= max_depth || samples.len() <= 1 {
        return Node::Leaf { size: samples.len() };
    }

    // Only features that still vary within this node can split it.
    let mut candidates: Vec<(usize, f64, f64)> = Vec::new();
    for feature in 0..width {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for s in samples {
            min = min.min(s[feature]);
            max = max.max(s[feature]);
        }
        if max > min {
            candidates.push((feature, min, max));
        }
    }

    if candidates.is_empty() {
        return Node::Leaf { size: samples.len() };
    }

    let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
    let split = rng.gen_range(min..max);

    let (left, right): (Vec<&[f64]>, Vec<&[f64]>) = samples.iter().copied().partition(|s| s[feature] < split);

    Node::Internal {
        feature,
        split,
        left: Box::new(build_node(&left, width, depth + 1, max_depth, rng)),
        right: Box::new(build_node(&right, width, depth + 1, max_depth, rng)),
    }
}
