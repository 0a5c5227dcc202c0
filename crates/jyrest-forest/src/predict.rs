//! Ensemble voting over a subset of trees.

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::confusion::ConfusionMatrix;
use crate::error::ForestError;
use crate::node::weighted_argmax;
use crate::tree::DecisionTree;

/// Summed tree votes for one observation, indexed by class.
///
/// Each tree adds its leaf vote strength to the class it predicts.
pub(crate) fn tally<'t>(
    trees: impl IntoIterator<Item = &'t DecisionTree>,
    n_classes: usize,
    value: impl Fn(usize) -> f64 + Copy,
) -> Vec<f64> {
    let mut votes = vec![0.0; n_classes];
    for tree in trees {
        let vote = tree.vote_with(value);
        votes[vote.class] += vote.strength;
    }
    votes
}

/// The ensemble's answer for one observation.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ObservationPrediction {
    /// Index of the observation in the dataset it was read from.
    pub observation: usize,
    /// Predicted class name.
    pub predicted: String,
    /// Recorded class name.
    pub truth: String,
    /// Whether `predicted == truth`.
    pub correct: bool,
    /// Summed vote strength per class, in schema class order.
    pub votes: Vec<f64>,
}

/// The ensemble's answer for a bare feature row.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RowPrediction {
    /// Predicted class name.
    pub class: String,
    /// Summed vote strength per class, in schema class order.
    pub votes: Vec<f64>,
}

/// Predictions of a tree subset over an observation subset.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EnsembleReport {
    class_names: Vec<String>,
    predictions: Vec<ObservationPrediction>,
    error_rate: f64,
    confusion: Option<ConfusionMatrix>,
}

impl EnsembleReport {
    /// Class names in vote order.
    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// One prediction per requested observation, in request order.
    #[must_use]
    pub fn predictions(&self) -> &[ObservationPrediction] {
        &self.predictions
    }

    /// Fraction of observations whose predicted class differs from the recorded one.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        self.error_rate
    }

    /// Confusion matrix over the observations whose class the forest knows.
    #[must_use]
    pub fn confusion(&self) -> Option<&ConfusionMatrix> {
        self.confusion.as_ref()
    }
}

/// Where the ensemble reads an observation from.
pub(crate) struct VoteSource<'d> {
    /// Column of the forest's feature `f` is `columns[f]`.
    pub(crate) columns: Vec<&'d [f64]>,
    /// Recorded class name of each observation.
    pub(crate) truth: Box<dyn Fn(usize) -> &'d str + Sync + 'd>,
}

/// Vote every observation in parallel and summarise.
///
/// `class_names` is the forest's class order. A recorded class the forest
/// does not know is always misclassified and left out of the confusion matrix.
pub(crate) fn predict_observations(
    trees: &[&DecisionTree],
    class_names: &[String],
    source: &VoteSource<'_>,
    observations: &[usize],
) -> Result<EnsembleReport, ForestError> {
    if trees.is_empty() {
        return Err(ForestError::NoTreesSelected);
    }
    if observations.is_empty() {
        return Err(ForestError::EmptyObservationSet);
    }

    let predictions: Vec<ObservationPrediction> = observations
        .par_iter()
        .map(|&obs| {
            let votes = tally(trees.iter().copied(), class_names.len(), |f| {
                source.columns[f][obs]
            });
            let (class, _) = weighted_argmax(&votes);
            let predicted = class_names[class].clone();
            let truth = (source.truth)(obs).to_string();
            ObservationPrediction {
                observation: obs,
                correct: predicted == truth,
                predicted,
                truth,
                votes,
            }
        })
        .collect();

    let misclassified = predictions.iter().filter(|p| !p.correct).count();
    let error_rate = misclassified as f64 / predictions.len() as f64;

    let (known_truth, known_predicted): (Vec<usize>, Vec<usize>) = predictions
        .iter()
        .filter_map(|p| {
            let t = class_names.binary_search(&p.truth).ok()?;
            let q = class_names.binary_search(&p.predicted).ok()?;
            Some((t, q))
        })
        .unzip();
    let confusion = if known_truth.is_empty() {
        None
    } else {
        Some(ConfusionMatrix::from_labels(
            &known_truth,
            &known_predicted,
            class_names,
        )?)
    };

    Ok(EnsembleReport {
        class_names: class_names.to_vec(),
        predictions,
        error_rate,
        confusion,
    })
}
