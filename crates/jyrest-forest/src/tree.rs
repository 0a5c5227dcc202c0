use std::fmt;
use std::sync::Arc;

use jyrest_data::{DatasetView, Schema};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    ForestError,
    config::TreeGrowthConfig,
    node::{FeatureIndex, Node, TreeVote},
    split::{find_best_split, sample_candidates, weighted_class_counts},
    weights::ClassWeights,
};

/// A grown weighted-Gini classification tree.
///
/// The tree keeps the [`Schema`] it was grown against so predictions can be
/// labelled and the tree can be written without the dataset. Growth and every
/// traversal use explicit stacks, so tree depth is not bounded by the call stack.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    root: Node,
    schema: Arc<Schema>,
    seed: u64,
}

/// Pending work while growing a tree.
enum Frame {
    Grow {
        observations: Vec<usize>,
        depth: usize,
    },
    Assemble {
        feature: FeatureIndex,
        threshold: f64,
        depth: usize,
        class_weights: Vec<f64>,
    },
}

impl DecisionTree {
    /// Grow a tree on `observations` of `dataset` (repeats allowed).
    ///
    /// `seed` drives the per-node candidate feature shuffles; the RNG is
    /// seeded once for the whole tree, so the same inputs always grow the
    /// same tree.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`ForestError::EmptyTrainingSet`] | `observations` is empty |
    /// | [`ForestError::ObservationOutOfRange`] | an index exceeds the dataset |
    /// | [`ForestError::NoCandidateFeatures`] | every feature is ignored |
    /// | [`ForestError::UnknownClass`] / [`ForestError::InvalidClassWeight`] | bad `weights` |
    /// | any error of [`TreeGrowthConfig::validate`] | invalid `config` |
    #[instrument(skip_all, fields(n_observations = observations.len(), seed = seed))]
    pub fn grow(
        dataset: &DatasetView,
        observations: &[usize],
        config: &TreeGrowthConfig,
        weights: &ClassWeights,
        seed: u64,
    ) -> Result<Self, ForestError> {
        config.validate(dataset.schema())?;
        let class_weights = weights.resolve(dataset.schema())?;
        let usable = config.usable_features(dataset.schema());
        Self::grow_resolved(dataset, observations, config, &class_weights, &usable, seed)
    }

    /// Grow with weights and usable features already resolved against the dataset.
    pub(crate) fn grow_resolved(
        dataset: &DatasetView,
        observations: &[usize],
        config: &TreeGrowthConfig,
        class_weights: &[f64],
        usable: &[usize],
        seed: u64,
    ) -> Result<Self, ForestError> {
        if observations.is_empty() {
            return Err(ForestError::EmptyTrainingSet);
        }
        let n_observations = dataset.n_observations();
        if let Some(&index) = observations.iter().find(|&&o| o >= n_observations) {
            return Err(ForestError::ObservationOutOfRange {
                index,
                n_observations,
            });
        }
        if usable.is_empty() {
            return Err(ForestError::NoCandidateFeatures);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut frames = vec![Frame::Grow {
            observations: observations.to_vec(),
            depth: 0,
        }];
        let mut built: Vec<Node> = Vec::new();

        while let Some(frame) = frames.pop() {
            match frame {
                Frame::Grow {
                    observations,
                    depth,
                } => {
                    let counts = weighted_class_counts(dataset, &observations, class_weights);
                    let n_present = counts.iter().filter(|&&c| c > 0.0).count();
                    let at_max_depth = config.max_tree_depth.is_some_and(|max| depth >= max);

                    let split = if n_present <= 1 || at_max_depth {
                        None
                    } else {
                        let candidates = sample_candidates(usable, config.mtry, &mut rng);
                        find_best_split(
                            dataset,
                            &observations,
                            &candidates,
                            class_weights,
                            config.min_node_size,
                        )
                    };
                    let Some(split) = split else {
                        built.push(Node::Leaf {
                            class_weights: counts,
                            depth,
                        });
                        continue;
                    };

                    let column = dataset.column(split.feature.index());
                    let (left, right): (Vec<usize>, Vec<usize>) = observations
                        .iter()
                        .copied()
                        .partition(|&o| column[o] <= split.threshold);
                    // A midpoint that rounds onto a bracketing value can empty one side.
                    if left.is_empty() || right.is_empty() {
                        built.push(Node::Leaf {
                            class_weights: counts,
                            depth,
                        });
                        continue;
                    }

                    // Left is popped first, so its subtree consumes the RNG before the right one.
                    frames.push(Frame::Assemble {
                        feature: split.feature,
                        threshold: split.threshold,
                        depth,
                        class_weights: counts,
                    });
                    frames.push(Frame::Grow {
                        observations: right,
                        depth: depth + 1,
                    });
                    frames.push(Frame::Grow {
                        observations: left,
                        depth: depth + 1,
                    });
                }
                Frame::Assemble {
                    feature,
                    threshold,
                    depth,
                    class_weights,
                } => {
                    let (Some(right), Some(left)) = (built.pop(), built.pop()) else {
                        unreachable!("both children are built before their parent");
                    };
                    built.push(Node::Internal {
                        feature,
                        threshold,
                        depth,
                        class_weights,
                        left: Box::new(left),
                        right: Box::new(right),
                    });
                }
            }
        }

        let Some(root) = built.pop() else {
            unreachable!("the root frame always produces a node");
        };
        let tree = Self {
            root,
            schema: Arc::clone(dataset.schema()),
            seed,
        };
        debug!(
            n_nodes = tree.n_nodes(),
            n_leaves = tree.n_leaves(),
            depth = tree.depth(),
            "decision tree grown"
        );
        Ok(tree)
    }

    /// Reassemble a tree from a loaded root.
    pub(crate) fn from_root(root: Node, schema: Arc<Schema>, seed: u64) -> Self {
        Self { root, schema, seed }
    }

    /// Root node.
    #[must_use]
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Schema the tree was grown against.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Seed of the candidate feature shuffles.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Predict the class of one observation given as a row in feature order.
    ///
    /// Descends from the root (values `<= threshold` go left) and returns the
    /// leaf's heaviest class with its weighted count. Ties go to the
    /// lexicographically smallest class.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionFeatureMismatch`] when `row.len()` differs
    /// from the number of features.
    pub fn predict(&self, row: &[f64]) -> Result<TreeVote, ForestError> {
        let expected = self.schema.n_features();
        if row.len() != expected {
            return Err(ForestError::PredictionFeatureMismatch {
                expected,
                got: row.len(),
            });
        }
        Ok(self.leaf_with(|f| row[f]).vote())
    }

    /// Predict with feature values read through `value(feature_index)`.
    pub(crate) fn vote_with(&self, value: impl Fn(usize) -> f64) -> TreeVote {
        self.leaf_with(value).vote()
    }

    /// Walk from the root to the leaf selected by `value`.
    pub(crate) fn leaf_with(&self, value: impl Fn(usize) -> f64) -> &Node {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { .. } => return node,
                Node::Internal {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if value(feature.index()) <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    /// Partition `observations` of `dataset` by the leaf they reach.
    ///
    /// Groups come in pre-order leaf order; leaves no observation reaches are
    /// omitted. `dataset` must share the tree's feature layout.
    pub(crate) fn leaf_groups(&self, dataset: &DatasetView, observations: &[usize]) -> Vec<Vec<usize>> {
        let mut groups = Vec::new();
        let mut stack = vec![(&self.root, observations.to_vec())];
        while let Some((node, obs)) = stack.pop() {
            if obs.is_empty() {
                continue;
            }
            match node {
                Node::Leaf { .. } => groups.push(obs),
                Node::Internal {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    let column = dataset.column(feature.index());
                    let (l, r): (Vec<usize>, Vec<usize>) =
                        obs.into_iter().partition(|&o| column[o] <= *threshold);
                    stack.push((right, r));
                    stack.push((left, l));
                }
            }
        }
        groups
    }

    /// Nodes in pre-order (node, left subtree, right subtree).
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder {
            stack: vec![&self.root],
        }
    }

    /// Total number of nodes.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.preorder().count()
    }

    /// Number of leaves.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.preorder().filter(|n| n.is_leaf()).count()
    }

    /// Depth of the deepest node. A single-leaf tree has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.preorder().map(Node::depth).max().unwrap_or(0)
    }
}

impl Drop for DecisionTree {
    // Dismantle iteratively; the derived drop of `Box<Node>` recurses once per level.
    fn drop(&mut self) {
        let root = std::mem::replace(
            &mut self.root,
            Node::Leaf {
                class_weights: Vec::new(),
                depth: 0,
            },
        );
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if let Node::Internal { left, right, .. } = node {
                stack.push(*left);
                stack.push(*right);
            }
        }
    }
}

/// Pre-order iterator over the nodes of a [`DecisionTree`].
pub struct Preorder<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Preorder<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if let Node::Internal { left, right, .. } = node {
            self.stack.push(right);
            self.stack.push(left);
        }
        Some(node)
    }
}

impl fmt::Display for DecisionTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in self.preorder() {
            write!(f, "{}", "|  ".repeat(node.depth()))?;
            match node {
                Node::Internal {
                    feature, threshold, ..
                } => {
                    let name = &self.schema.feature_names()[feature.index()];
                    writeln!(f, "{name} <= {threshold}")?;
                }
                Node::Leaf { class_weights, .. } => {
                    let counts: Vec<String> = class_weights
                        .iter()
                        .enumerate()
                        .filter(|(_, w)| **w > 0.0)
                        .map(|(c, w)| format!("{}:{w}", self.schema.class_name(c)))
                        .collect();
                    writeln!(f, "[{}]", counts.join(", "))?;
                }
            }
        }
        Ok(())
    }
}
