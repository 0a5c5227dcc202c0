//! Out-of-bag (OOB) evaluation.

use jyrest_data::DatasetView;
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};

use crate::confusion::ConfusionMatrix;
use crate::node::weighted_argmax;
use crate::predict::tally;
use crate::tree::DecisionTree;

/// Out-of-bag evaluation result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OobEstimate {
    /// Misclassified fraction of the observations that were OOB for at least
    /// one tree. `None` when no observation was ever OOB.
    pub error: Option<f64>,
    /// Number of observations that had at least one OOB tree.
    pub n_oob_observations: usize,
    /// OOB confusion matrix, `None` under the same condition as `error`.
    pub confusion: Option<ConfusionMatrix>,
}

/// For each observation, the trees that did not train on it.
fn oob_trees_per_observation(n_observations: usize, oob_indices: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut per_observation = vec![Vec::new(); n_observations];
    for (tree, oob) in oob_indices.iter().enumerate() {
        for &obs in oob {
            per_observation[obs].push(tree);
        }
    }
    per_observation
}

/// Compute the OOB estimate.
///
/// Each observation is voted on only by the trees it was OOB for, using the
/// same strength-weighted vote as ensemble prediction. Observations with no
/// OOB tree are skipped.
pub(crate) fn compute_oob(
    trees: &[DecisionTree],
    dataset: &DatasetView,
    oob_indices: &[Vec<usize>],
) -> OobEstimate {
    let per_observation = oob_trees_per_observation(dataset.n_observations(), oob_indices);
    let n_classes = dataset.n_classes();

    let voted: Vec<(usize, usize)> = per_observation
        .into_par_iter()
        .enumerate()
        .filter(|(_, tree_ids)| !tree_ids.is_empty())
        .map(|(obs, tree_ids)| {
            let votes = tally(tree_ids.iter().map(|&t| &trees[t]), n_classes, |f| {
                dataset.value(obs, f)
            });
            (dataset.class_of(obs), weighted_argmax(&votes).0)
        })
        .collect();

    if voted.is_empty() {
        return OobEstimate {
            error: None,
            n_oob_observations: 0,
            confusion: None,
        };
    }

    let (truth, predicted): (Vec<usize>, Vec<usize>) = voted.into_iter().unzip();
    let misclassified = truth.iter().zip(&predicted).filter(|(t, p)| t != p).count();
    let confusion = ConfusionMatrix::from_labels(&truth, &predicted, dataset.class_names()).ok();

    OobEstimate {
        error: Some(misclassified as f64 / truth.len() as f64),
        n_oob_observations: truth.len(),
        confusion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeGrowthConfig;
    use crate::weights::ClassWeights;

    fn dataset() -> DatasetView {
        DatasetView::from_parts(
            vec!["x".into()],
            vec![vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]],
            &["a", "a", "a", "b", "b", "b"],
        )
        .unwrap()
    }

    fn tree(ds: &DatasetView, observations: &[usize]) -> DecisionTree {
        let cfg = TreeGrowthConfig::new(1).unwrap();
        DecisionTree::grow(ds, observations, &cfg, &ClassWeights::new(), 1).unwrap()
    }

    #[test]
    fn inverse_index_lists_trees() {
        let per = oob_trees_per_observation(3, &[vec![0, 2], vec![2]]);
        assert_eq!(per, vec![vec![0], vec![], vec![0, 1]]);
    }

    #[test]
    fn oob_observations_are_voted_by_their_trees() {
        let ds = dataset();
        let trees = vec![tree(&ds, &[0, 1, 3, 4]), tree(&ds, &[1, 2, 4, 5])];
        let oob = vec![vec![2, 5], vec![0, 3]];
        let estimate = compute_oob(&trees, &ds, &oob);
        assert_eq!(estimate.n_oob_observations, 4);
        assert_eq!(estimate.error, Some(0.0));
        assert_eq!(estimate.confusion.unwrap().total(), 4);
    }

    #[test]
    fn misclassified_oob_observation_counts() {
        let ds = dataset();
        // A tree that only saw class "a" gets observation 5 wrong.
        let trees = vec![tree(&ds, &[0, 1, 2])];
        let estimate = compute_oob(&trees, &ds, &[vec![5]]);
        assert_eq!(estimate.error, Some(1.0));
    }

    #[test]
    fn no_oob_observations_is_undefined() {
        let ds = dataset();
        let trees = vec![tree(&ds, &[0, 1, 2, 3, 4, 5])];
        let estimate = compute_oob(&trees, &ds, &[vec![]]);
        assert_eq!(estimate.error, None);
        assert_eq!(estimate.n_oob_observations, 0);
        assert!(estimate.confusion.is_none());
    }
}
