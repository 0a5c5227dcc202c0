//! Weighted-Gini classification trees and bagged forests for positive-unlabelled learning.
//!
//! Trees are grown on bootstrap samples with per-class weights, so a small
//! positive class can outvote a large unlabelled one. The forest provides
//! out-of-bag error, ensemble prediction over any tree/observation subset,
//! permutation importance, proximities, seed-exact regrowth, and a plain
//! text persistence format.

mod bootstrap;
mod config;
mod confusion;
mod error;
mod forest;
mod manifest;
mod node;
mod oob;
mod perm_importance;
mod predict;
mod proximity;
mod serialize;
mod split;
mod tree;
mod weights;

pub use bootstrap::Bootstrap;
pub use config::{OobMode, TreeGrowthConfig};
pub use confusion::{ClassMetrics, ConfusionMatrix};
pub use error::ForestError;
pub use forest::Forest;
pub use manifest::{DatasetSource, FORMAT_VERSION, ForestManifest, MANIFEST_FILE};
pub use node::{FeatureIndex, Node, TreeVote};
pub use oob::OobEstimate;
pub use perm_importance::VariableImportance;
pub use predict::{EnsembleReport, ObservationPrediction, RowPrediction};
pub use proximity::Proximities;
pub use serialize::{load_tree, read_tree, save_tree, write_tree};
pub use split::{ACCEPTANCE_THRESHOLD, SplitCandidate, find_best_split, purity, weighted_class_counts};
pub use tree::{DecisionTree, Preorder};
pub use weights::ClassWeights;
