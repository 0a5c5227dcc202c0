use std::fmt;

/// Zero-based feature column index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct FeatureIndex(usize);

impl FeatureIndex {
    /// Create a new feature index from a zero-based column position.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based feature column index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FeatureIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node of a decision tree. Internal nodes own their children.
///
/// `class_weights[c]` is the weighted count of class `c` among the training
/// observations that reached the node: each observation contributes its
/// class weight, once per bootstrap draw.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A terminal node.
    Leaf {
        /// Weighted class counts.
        class_weights: Vec<f64>,
        /// Distance from the root (root = 0).
        depth: usize,
    },
    /// A split on one feature: values `<= threshold` go left.
    Internal {
        /// Feature used for the split.
        feature: FeatureIndex,
        /// Split threshold (midpoint of the two bracketing values).
        threshold: f64,
        /// Distance from the root (root = 0).
        depth: usize,
        /// Weighted class counts before splitting.
        class_weights: Vec<f64>,
        /// Subtree for values `<= threshold`.
        left: Box<Node>,
        /// Subtree for values `> threshold`.
        right: Box<Node>,
    },
}

impl Node {
    /// Distance from the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Node::Leaf { depth, .. } | Node::Internal { depth, .. } => *depth,
        }
    }

    /// Weighted class counts of the training observations at this node.
    #[must_use]
    pub fn class_weights(&self) -> &[f64] {
        match self {
            Node::Leaf { class_weights, .. } | Node::Internal { class_weights, .. } => {
                class_weights
            }
        }
    }

    /// Sum of the weighted class counts.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.class_weights().iter().sum()
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// The class this node would vote for, with its weighted count.
    #[must_use]
    pub fn vote(&self) -> TreeVote {
        let (class, strength) = weighted_argmax(self.class_weights());
        TreeVote { class, strength }
    }
}

/// A single tree's prediction: the winning leaf class and its weighted count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeVote {
    /// Predicted class index.
    pub class: usize,
    /// Weighted count of that class in the leaf.
    pub strength: f64,
}

/// Index and value of the largest entry. Ties go to the lowest index,
/// which is the lexicographically smallest class name.
pub(crate) fn weighted_argmax(values: &[f64]) -> (usize, f64) {
    let mut best = (0, values.first().copied().unwrap_or(0.0));
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > best.1 {
            best = (i, v);
        }
    }
    best
}
