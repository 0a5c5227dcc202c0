//! Weighted-Gini split search.
//!
//! The criterion is the sum of child purities
//! `Σc left[c]² / Σleft + Σc right[c]² / Σright` over weighted class
//! counts, and is maximised.

use jyrest_data::DatasetView;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::node::FeatureIndex;

/// Smallest criterion a split must reach to be accepted.
pub const ACCEPTANCE_THRESHOLD: f64 = 0.1;

/// Relative margin a split must beat the parent purity by.
const IMPROVEMENT_TOLERANCE: f64 = 1e-9;

/// The best accepted split of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitCandidate {
    /// Feature used for the split.
    pub feature: FeatureIndex,
    /// Values `<= threshold` go left.
    pub threshold: f64,
    /// Sum of the two child purities.
    pub criterion: f64,
}

/// `Σc counts[c]² / Σc counts[c]`, or 0.0 for an empty node.
#[must_use]
pub fn purity(counts: &[f64]) -> f64 {
    let total: f64 = counts.iter().sum();
    if total > 0.0 {
        counts.iter().map(|c| c * c).sum::<f64>() / total
    } else {
        0.0
    }
}

/// Weighted class counts of `observations` (repeats counted each time).
#[must_use]
pub fn weighted_class_counts(
    dataset: &DatasetView,
    observations: &[usize],
    class_weights: &[f64],
) -> Vec<f64> {
    let mut counts = vec![0.0; dataset.n_classes()];
    for &obs in observations {
        let class = dataset.class_of(obs);
        counts[class] += class_weights[class];
    }
    counts
}

/// Shuffle the usable features and keep the first `mtry` (all when `None`).
pub(crate) fn sample_candidates(
    usable: &[usize],
    mtry: Option<usize>,
    rng: &mut impl Rng,
) -> Vec<usize> {
    let mut candidates = usable.to_vec();
    candidates.shuffle(rng);
    candidates.truncate(mtry.map_or(usable.len(), |m| m.min(usable.len())));
    candidates
}

/// Find the split of `observations` that maximises the weighted-Gini criterion.
///
/// For each candidate feature the observations are sorted by value (ties by
/// observation index) and swept left to right, moving one observation at a
/// time from the right child to the left. A boundary is considered only where
/// the value strictly increases and both sides keep at least `min_node_size`
/// observations. The first maximum found wins ties.
///
/// Returns `None` (stop growing) when no boundary is valid, when the best
/// criterion is below [`ACCEPTANCE_THRESHOLD`], or when it does not exceed
/// the parent's own purity.
#[must_use]
pub fn find_best_split(
    dataset: &DatasetView,
    observations: &[usize],
    candidate_features: &[usize],
    class_weights: &[f64],
    min_node_size: usize,
) -> Option<SplitCandidate> {
    let n = observations.len();
    if n < 2 {
        return None;
    }
    let parent = weighted_class_counts(dataset, observations, class_weights);
    let parent_purity = purity(&parent);

    let mut best: Option<SplitCandidate> = None;
    let mut sorted: Vec<(f64, usize)> = Vec::with_capacity(n);

    for &feature in candidate_features {
        let column = dataset.column(feature);
        sorted.clear();
        sorted.extend(observations.iter().map(|&obs| (column[obs], obs)));
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut left = vec![0.0; parent.len()];
        let mut right = parent.clone();

        for i in 0..n - 1 {
            let (value, obs) = sorted[i];
            let class = dataset.class_of(obs);
            let w = class_weights[class];
            left[class] += w;
            right[class] = (right[class] - w).max(0.0);

            let next = sorted[i + 1].0;
            if next <= value {
                continue;
            }
            let n_left = i + 1;
            let n_right = n - n_left;
            if n_left < min_node_size || n_right < min_node_size {
                continue;
            }

            let criterion = purity(&left) + purity(&right);
            if best.is_none_or(|b| criterion > b.criterion) {
                best = Some(SplitCandidate {
                    feature: FeatureIndex::new(feature),
                    threshold: value + (next - value) / 2.0,
                    criterion,
                });
            }
        }
    }

    let best = best?;
    let margin = IMPROVEMENT_TOLERANCE * parent_purity.abs().max(1.0);
    (best.criterion >= ACCEPTANCE_THRESHOLD && best.criterion > parent_purity + margin)
        .then_some(best)
}
