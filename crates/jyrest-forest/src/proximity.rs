//! Pairwise observation proximities.

use std::collections::BTreeMap;

use jyrest_data::DatasetView;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::tree::DecisionTree;

/// Fraction of trees in which two observations share a leaf.
///
/// Stored sparsely as the upper triangle (`i < j`); pairs that never share a
/// leaf are absent and read as 0.0.
#[derive(Debug, Clone, PartialEq)]
pub struct Proximities {
    n_observations: usize,
    n_trees: usize,
    counts: BTreeMap<(usize, usize), usize>,
}

impl Proximities {
    /// Proximity of observations `i` and `j`. An observation is always
    /// proximate to itself.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        if i == j {
            return 1.0;
        }
        let key = if i < j { (i, j) } else { (j, i) };
        self.counts
            .get(&key)
            .map_or(0.0, |&c| c as f64 / self.n_trees as f64)
    }

    /// Non-zero pairs `(i, j, proximity)` with `i < j`, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let n_trees = self.n_trees as f64;
        self.counts
            .iter()
            .map(move |(&(i, j), &c)| (i, j, c as f64 / n_trees))
    }

    /// Number of non-zero pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    #[must_use]
    pub fn n_observations(&self) -> usize {
        self.n_observations
    }
}

fn count_pairs(groups: Vec<Vec<usize>>) -> BTreeMap<(usize, usize), usize> {
    let mut counts = BTreeMap::new();
    for mut group in groups {
        group.sort_unstable();
        for (a, &i) in group.iter().enumerate() {
            for &j in &group[a + 1..] {
                *counts.entry((i, j)).or_insert(0) += 1;
            }
        }
    }
    counts
}

fn merge(
    mut left: BTreeMap<(usize, usize), usize>,
    right: BTreeMap<(usize, usize), usize>,
) -> BTreeMap<(usize, usize), usize> {
    for (key, c) in right {
        *left.entry(key).or_insert(0) += c;
    }
    left
}

/// Drop every observation of `dataset` down each tree and count co-located pairs.
pub(crate) fn compute_proximities(trees: &[DecisionTree], dataset: &DatasetView) -> Proximities {
    let everyone: Vec<usize> = (0..dataset.n_observations()).collect();
    let counts = trees
        .par_iter()
        .map(|tree| count_pairs(tree.leaf_groups(dataset, &everyone)))
        .reduce(BTreeMap::new, merge);
    Proximities {
        n_observations: dataset.n_observations(),
        n_trees: trees.len(),
        counts,
    }
}
