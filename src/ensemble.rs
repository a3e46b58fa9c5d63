//! Seeded bagged decision-tree ensemble
//!
//! Both risk classifiers are bootstrap-aggregated CART trees. Bootstrap
//! samples are drawn sequentially from one seeded generator and the trees are
//! then fitted in parallel, so identical input always yields identical votes.

use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ComputeError;
use crate::models::Label;

/// Ensemble hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of bootstrap trees
    pub n_trees: usize,

    /// Maximum tree depth (None grows until leaves are pure)
    pub max_depth: Option<usize>,

    /// Seed for bootstrap sampling
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: None,
            seed: 42,
        }
    }
}

/// Dense mapping between labels and class indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: Vec<Label>,
}

impl LabelEncoder {
    pub fn fit(labels: &[Label]) -> Self {
        let mut classes = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();
        Self { classes }
    }

    pub fn encode(&self, label: Label) -> Option<usize> {
        self.classes.binary_search(&label).ok()
    }

    pub fn decode(&self, index: usize) -> Option<Label> {
        self.classes.get(index).copied()
    }

    pub fn classes(&self) -> &[Label] {
        &self.classes
    }
}

/// A bootstrap member; samples holding a single class need no tree
#[derive(Debug, Clone)]
enum Member {
    Tree(DecisionTree<f64, usize>),
    Constant(usize),
}

/// Fitted bagged ensemble
#[derive(Debug, Clone)]
pub struct BaggedForest {
    members: Vec<Member>,
    encoder: LabelEncoder,
    n_features: usize,
}

impl BaggedForest {
    /// Fit the ensemble on fixed-width feature rows
    pub fn fit<const N: usize>(
        model: &str,
        features: &[[f64; N]],
        labels: &[Label],
        config: &ForestConfig,
    ) -> Result<Self, ComputeError> {
        let fit_failed = |reason: String| ComputeError::FitFailed {
            model: model.to_string(),
            reason,
        };

        if features.is_empty() || features.len() != labels.len() {
            return Err(fit_failed(format!(
                "{} feature rows for {} labels",
                features.len(),
                labels.len()
            )));
        }
        if config.n_trees == 0 {
            return Err(fit_failed("ensemble needs at least one tree".to_string()));
        }
        if features.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ComputeError::NonFinite {
                model: model.to_string(),
            });
        }

        let encoder = LabelEncoder::fit(labels);
        let records = to_records(features);
        let targets: Array1<usize> = labels
            .iter()
            .filter_map(|label| encoder.encode(*label))
            .collect();

        let n_rows = features.len();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let samples: Vec<Vec<usize>> = (0..config.n_trees)
            .map(|_| (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect())
            .collect();

        let params = DecisionTree::params()
            .split_quality(SplitQuality::Gini)
            .max_depth(config.max_depth);

        let members = samples
            .par_iter()
            .map(|sample| {
                let sample_targets = targets.select(Axis(0), sample);
                if let Some(class) = single_class(&sample_targets) {
                    return Ok(Member::Constant(class));
                }
                let dataset = Dataset::new(records.select(Axis(0), sample), sample_targets);
                let fitted: Result<DecisionTree<f64, usize>, linfa::Error> =
                    params.clone().fit(&dataset);
                fitted
                    .map(Member::Tree)
                    .map_err(|e| fit_failed(e.to_string()))
            })
            .collect::<Result<Vec<_>, ComputeError>>()?;

        tracing::debug!(
            model,
            trees = members.len(),
            rows = n_rows,
            classes = encoder.classes().len(),
            "Fitted bagged ensemble"
        );

        Ok(Self {
            members,
            encoder,
            n_features: N,
        })
    }

    /// Majority vote per row; ties go to the smallest label
    pub fn predict<const N: usize>(&self, rows: &[[f64; N]]) -> Result<Vec<Label>, ComputeError> {
        if N != self.n_features {
            return Err(ComputeError::FitFailed {
                model: "bagged ensemble".to_string(),
                reason: format!("expected {} features, got {}", self.n_features, N),
            });
        }
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let records = to_records(rows);
        let n_classes = self.encoder.classes().len();
        let mut votes = vec![vec![0usize; n_classes]; rows.len()];

        for member in &self.members {
            match member {
                Member::Tree(tree) => {
                    let predicted: Array1<usize> = tree.predict(&records);
                    for (row_votes, class) in votes.iter_mut().zip(predicted.iter()) {
                        if let Some(count) = row_votes.get_mut(*class) {
                            *count += 1;
                        }
                    }
                }
                Member::Constant(class) => {
                    for row_votes in votes.iter_mut() {
                        row_votes[*class] += 1;
                    }
                }
            }
        }

        votes
            .iter()
            .map(|row_votes| {
                let mut best = 0;
                for (class, count) in row_votes.iter().enumerate() {
                    if *count > row_votes[best] {
                        best = class;
                    }
                }
                self.encoder.decode(best).ok_or_else(|| ComputeError::FitFailed {
                    model: "bagged ensemble".to_string(),
                    reason: "vote for unknown class".to_string(),
                })
            })
            .collect()
    }

    /// Predict a single row
    pub fn predict_one<const N: usize>(&self, row: [f64; N]) -> Result<Label, ComputeError> {
        self.predict(&[row])?
            .into_iter()
            .next()
            .ok_or_else(|| ComputeError::FitFailed {
                model: "bagged ensemble".to_string(),
                reason: "no prediction produced".to_string(),
            })
    }

    pub fn classes(&self) -> &[Label] {
        self.encoder.classes()
    }

    pub fn n_trees(&self) -> usize {
        self.members.len()
    }
}

fn to_records<const N: usize>(rows: &[[f64; N]]) -> Array2<f64> {
    let mut records = Array2::zeros((rows.len(), N));
    for (mut record, row) in records.axis_iter_mut(Axis(0)).zip(rows) {
        for (cell, value) in record.iter_mut().zip(row.iter()) {
            *cell = *value;
        }
    }
    records
}

fn single_class(targets: &Array1<usize>) -> Option<usize> {
    let first = *targets.iter().next()?;
    targets.iter().all(|t| *t == first).then_some(first)
}

/// Shuffled train/test partition of `n` row indices.
///
/// `ceil(test_fraction * n)` rows go to the test side, always leaving at
/// least one training row.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    if n < 2 {
        return ((0..n).collect(), Vec::new());
    }
    let n_test = ((test_fraction * n as f64).ceil() as usize).clamp(1, n - 1);

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test = indices[..n_test].to_vec();
    let train = indices[n_test..].to_vec();
    (train, test)
}

/// Fraction of matching predictions
pub fn accuracy(predicted: &[Label], actual: &[Label]) -> Option<f64> {
    if predicted.is_empty() || predicted.len() != actual.len() {
        return None;
    }
    let correct = predicted.iter().zip(actual).filter(|(p, a)| p == a).count();
    Some(correct as f64 / actual.len() as f64)
}
