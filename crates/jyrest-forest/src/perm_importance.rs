//! Permutation-based variable importance.

use jyrest_data::DatasetView;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::confusion::ConfusionMatrix;
use crate::tree::DecisionTree;

/// Permutation importance of a single feature.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VariableImportance {
    /// Feature name.
    pub name: String,
    /// Mean OOB accuracy drop when this feature is permuted.
    pub importance: f64,
    /// Standard deviation of the accuracy drop across trees.
    pub std: f64,
    /// Mean drop in the G-mean of per-class OOB recall.
    pub g_mean_importance: f64,
    /// Rank (1 = most important).
    pub rank: usize,
}

/// Accuracy and G-mean of one tree over its OOB observations.
#[derive(Debug, Clone, Copy)]
struct TreeScore {
    accuracy: f64,
    g_mean: f64,
}

/// Score `tree` on `oob`, reading the feature `f` of the `k`-th OOB
/// observation through `value(k, f)`. `oob` must not be empty.
fn score_tree(
    tree: &DecisionTree,
    dataset: &DatasetView,
    oob: &[usize],
    value: impl Fn(usize, usize) -> f64,
) -> TreeScore {
    let truth: Vec<usize> = oob.iter().map(|&o| dataset.class_of(o)).collect();
    let predicted: Vec<usize> = (0..oob.len())
        .map(|k| tree.vote_with(|f| value(k, f)).class)
        .collect();
    ConfusionMatrix::from_labels(&truth, &predicted, dataset.class_names()).map_or(
        TreeScore {
            accuracy: 0.0,
            g_mean: 0.0,
        },
        |cm| TreeScore {
            accuracy: cm.accuracy(),
            g_mean: cm.g_mean(),
        },
    )
}

/// Seed of the shuffle for one (tree, feature) pair.
fn permutation_seed(seed: u64, tree_idx: usize, feat_idx: usize, n_features: usize) -> u64 {
    seed.wrapping_add((tree_idx as u64).wrapping_mul(n_features as u64))
        .wrapping_add(feat_idx as u64)
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Compute permutation importance using each tree's OOB observations.
///
/// Only the columns in `features` are scored. For each of them and each tree with a non-empty OOB set:
/// 1. Score the tree on its OOB observations (baseline)
/// 2. Shuffle the feature's values among those observations
/// 3. Score again with the shuffled column
/// 4. Importance = baseline accuracy - permuted accuracy
///
/// The result per feature is the mean across those trees, with the
/// population standard deviation. Trees without OOB observations are
/// skipped; if none remain every importance is zero. Results are sorted by
/// importance, descending.
pub(crate) fn compute_permutation_importance(
    trees: &[DecisionTree],
    dataset: &DatasetView,
    oob_indices: &[Vec<usize>],
    features: &[usize],
    seed: u64,
) -> Vec<VariableImportance> {
    let n_features = dataset.n_features();
    let feature_names = dataset.feature_names();

    let scored: Vec<(usize, &DecisionTree, &[usize], TreeScore)> = trees
        .iter()
        .zip(oob_indices)
        .enumerate()
        .filter(|(_, (_, oob))| !oob.is_empty())
        .map(|(tree_idx, (tree, oob))| {
            let baseline = score_tree(tree, dataset, oob, |k, f| dataset.value(oob[k], f));
            (tree_idx, tree, oob.as_slice(), baseline)
        })
        .collect();

    if scored.is_empty() {
        return features
            .iter()
            .enumerate()
            .map(|(i, &f)| VariableImportance {
                name: feature_names[f].clone(),
                importance: 0.0,
                std: 0.0,
                g_mean_importance: 0.0,
                rank: i + 1,
            })
            .collect();
    }

    let mut results: Vec<VariableImportance> = features
        .par_iter()
        .map(|&feat_idx| {
            let column = dataset.column(feat_idx);
            let mut accuracy_drops = Vec::with_capacity(scored.len());
            let mut g_mean_drops = Vec::with_capacity(scored.len());
            for &(tree_idx, tree, oob, baseline) in &scored {
                let mut permuted: Vec<f64> = oob.iter().map(|&o| column[o]).collect();
                let mut rng = ChaCha8Rng::seed_from_u64(permutation_seed(
                    seed, tree_idx, feat_idx, n_features,
                ));
                permuted.shuffle(&mut rng);

                let score = score_tree(tree, dataset, oob, |k, f| {
                    if f == feat_idx {
                        permuted[k]
                    } else {
                        dataset.value(oob[k], f)
                    }
                });
                accuracy_drops.push(baseline.accuracy - score.accuracy);
                g_mean_drops.push(baseline.g_mean - score.g_mean);
            }
            let (importance, std) = mean_and_std(&accuracy_drops);
            let (g_mean_importance, _) = mean_and_std(&g_mean_drops);
            VariableImportance {
                name: feature_names[feat_idx].clone(),
                importance,
                std,
                g_mean_importance,
                rank: 0,
            }
        })
        .collect();

    results.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i + 1;
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    use crate::config::TreeGrowthConfig;
    use crate::weights::ClassWeights;

    /// Feature "signal" separates the classes, "noise" is random.
    fn dataset() -> DatasetView {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut signal = Vec::new();
        let mut noise = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let positive = i % 2 == 0;
            signal.push(if positive { 5.0 } else { 0.0 } + rng.r#gen::<f64>());
            noise.push(rng.r#gen::<f64>());
            labels.push(if positive { "pos" } else { "unl" });
        }
        DatasetView::from_parts(vec!["noise".into(), "signal".into()], vec![noise, signal], &labels)
            .unwrap()
    }

    fn grown(ds: &DatasetView) -> (Vec<DecisionTree>, Vec<Vec<usize>>) {
        // Each tree trains on the first half and is OOB on the second.
        let train: Vec<usize> = (0..20).collect();
        let oob: Vec<usize> = (20..40).collect();
        let cfg = TreeGrowthConfig::new(1).unwrap();
        let trees: Vec<DecisionTree> = (0..5)
            .map(|s| DecisionTree::grow(ds, &train, &cfg, &ClassWeights::new(), s).unwrap())
            .collect();
        (trees, vec![oob; 5])
    }

    #[test]
    fn informative_feature_ranks_first() {
        let ds = dataset();
        let (trees, oob) = grown(&ds);
        let imp = compute_permutation_importance(&trees, &ds, &oob, &[0, 1], 7);
        assert_eq!(imp.len(), 2);
        assert_eq!(imp[0].name, "signal");
        assert_eq!(imp[0].rank, 1);
        assert!(imp[0].importance > 0.2, "signal importance {}", imp[0].importance);
        assert!(imp[0].g_mean_importance > 0.0);
        assert!(imp[0].importance >= imp[1].importance);
    }

    #[test]
    fn unused_feature_has_zero_importance() {
        let ds = dataset();
        let (trees, oob) = grown(&ds);
        let imp = compute_permutation_importance(&trees, &ds, &oob, &[0, 1], 7);
        let noise = imp.iter().find(|v| v.name == "noise").unwrap();
        let splits_on_noise = trees.iter().any(|t| {
            t.preorder().any(|n| match n {
                crate::node::Node::Internal { feature, .. } => feature.index() == 0,
                crate::node::Node::Leaf { .. } => false,
            })
        });
        if !splits_on_noise {
            assert_eq!(noise.importance, 0.0);
            assert_eq!(noise.std, 0.0);
        }
    }

    #[test]
    fn no_oob_gives_zero_importances() {
        let ds = dataset();
        let (trees, _) = grown(&ds);
        let imp = compute_permutation_importance(&trees, &ds, &vec![Vec::new(); 5], &[0, 1], 7);
        assert!(imp.iter().all(|v| v.importance == 0.0));
        assert_eq!(imp.iter().map(|v| v.rank).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn same_seed_same_importance() {
        let ds = dataset();
        let (trees, oob) = grown(&ds);
        let a = compute_permutation_importance(&trees, &ds, &oob, &[0, 1], 11);
        let b = compute_permutation_importance(&trees, &ds, &oob, &[0, 1], 11);
        let key = |v: &[VariableImportance]| {
            v.iter().map(|i| (i.name.clone(), i.importance.to_bits())).collect::<Vec<_>>()
        };
        assert_eq!(key(&a), key(&b));
    }

    #[test]
    fn only_listed_features_are_scored() {
        let ds = dataset();
        let (trees, oob) = grown(&ds);
        let both = compute_permutation_importance(&trees, &ds, &oob, &[0, 1], 7);
        let signal_only = compute_permutation_importance(&trees, &ds, &oob, &[1], 7);
        assert_eq!(signal_only.len(), 1);
        assert_eq!(signal_only[0].name, "signal");
        assert_eq!(signal_only[0].rank, 1);
        let signal = both.iter().find(|v| v.name == "signal").unwrap();
        assert_eq!(signal_only[0].importance.to_bits(), signal.importance.to_bits());

        let none = compute_permutation_importance(&trees, &ds, &vec![Vec::new(); 5], &[1], 7);
        assert_eq!(none.len(), 1);
        assert_eq!(none[0].name, "signal");
    }

    #[test]
    fn seed_formula_spreads_pairs() {
        assert_eq!(permutation_seed(100, 0, 0, 3), 100);
        assert_eq!(permutation_seed(100, 2, 1, 3), 107);
        assert_eq!(permutation_seed(u64::MAX, 0, 1, 3), 0);
    }
}
