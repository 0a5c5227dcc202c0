//! Configuration builder for tree and forest growth.

use std::collections::{BTreeMap, BTreeSet};

use jyrest_data::Schema;

use crate::error::ForestError;

/// Whether to compute the out-of-bag estimate when a forest is grown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OobMode {
    /// Compute the OOB error and confusion matrix after growth.
    Enabled,
    /// Skip OOB evaluation; it can still be requested later.
    Disabled,
}

/// Immutable growth parameters shared by every tree in a forest.
///
/// Construct via [`TreeGrowthConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter                      | Default        |
/// |--------------------------------|----------------|
/// | `n_trees`                      | 500            |
/// | `min_node_size`                | 1              |
/// | `mtry`                         | `None` (all)   |
/// | `max_tree_depth`               | `None`         |
/// | `is_replacement_used`          | `true`         |
/// | `selection_fraction`           | 0.632          |
/// | `variables_to_ignore`          | empty          |
/// | `is_stratified_bootstrap_used` | `true`         |
/// | `class_sample_sizes`           | `None`         |
/// | `oob_mode`                     | `Enabled`      |
/// | `n_threads`                    | `None` (global pool) |
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TreeGrowthConfig {
    pub(crate) n_trees: usize,
    pub(crate) min_node_size: usize,
    pub(crate) mtry: Option<usize>,
    pub(crate) max_tree_depth: Option<usize>,
    pub(crate) is_replacement_used: bool,
    pub(crate) selection_fraction: f64,
    pub(crate) variables_to_ignore: BTreeSet<String>,
    pub(crate) is_stratified_bootstrap_used: bool,
    pub(crate) class_sample_sizes: Option<BTreeMap<String, usize>>,
    pub(crate) oob_mode: OobMode,
    pub(crate) n_threads: Option<usize>,
}

impl Default for TreeGrowthConfig {
    fn default() -> Self {
        Self {
            n_trees: 500,
            min_node_size: 1,
            mtry: None,
            max_tree_depth: None,
            is_replacement_used: true,
            selection_fraction: 0.632,
            variables_to_ignore: BTreeSet::new(),
            is_stratified_bootstrap_used: true,
            class_sample_sizes: None,
            oob_mode: OobMode::Enabled,
            n_threads: None,
        }
    }
}

impl TreeGrowthConfig {
    /// Create a new config with the given number of trees.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidTreeCount`] if `n_trees` is zero.
    pub fn new(n_trees: usize) -> Result<Self, ForestError> {
        if n_trees == 0 {
            return Err(ForestError::InvalidTreeCount { n_trees });
        }
        Ok(Self {
            n_trees,
            ..Self::default()
        })
    }

    // --- Setters ---

    /// Set the number of trees. Checked again by [`TreeGrowthConfig::validate`].
    #[must_use]
    pub fn with_n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    /// Set the minimum number of observations each child of a split must hold.
    #[must_use]
    pub fn with_min_node_size(mut self, min_node_size: usize) -> Self {
        self.min_node_size = min_node_size;
        self
    }

    /// Set the number of candidate features sampled per node. `None` means all.
    #[must_use]
    pub fn with_mtry(mut self, mtry: Option<usize>) -> Self {
        self.mtry = mtry;
        self
    }

    /// Set the maximum tree depth (the root has depth 0). `None` means unlimited.
    #[must_use]
    pub fn with_max_tree_depth(mut self, max_tree_depth: Option<usize>) -> Self {
        self.max_tree_depth = max_tree_depth;
        self
    }

    /// Choose bootstrap sampling with (`true`) or without replacement.
    #[must_use]
    pub fn with_replacement(mut self, is_replacement_used: bool) -> Self {
        self.is_replacement_used = is_replacement_used;
        self
    }

    /// Set the fraction drawn per tree when sampling without replacement.
    #[must_use]
    pub fn with_selection_fraction(mut self, selection_fraction: f64) -> Self {
        self.selection_fraction = selection_fraction;
        self
    }

    /// Exclude the named features from split candidates.
    #[must_use]
    pub fn with_variables_to_ignore<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables_to_ignore = names.into_iter().map(Into::into).collect();
        self
    }

    /// Draw each class independently so that per-class proportions are kept.
    #[must_use]
    pub fn with_stratified_bootstrap(mut self, is_stratified_bootstrap_used: bool) -> Self {
        self.is_stratified_bootstrap_used = is_stratified_bootstrap_used;
        self
    }

    /// Draw an explicit number of observations of each class per tree.
    ///
    /// Requires stratified bootstrap to be off.
    #[must_use]
    pub fn with_class_sample_sizes(mut self, sizes: Option<BTreeMap<String, usize>>) -> Self {
        self.class_sample_sizes = sizes;
        self
    }

    /// Set the OOB evaluation mode.
    #[must_use]
    pub fn with_oob_mode(mut self, oob_mode: OobMode) -> Self {
        self.oob_mode = oob_mode;
        self
    }

    /// Grow trees on a dedicated pool of this many threads. `None` uses rayon's global pool.
    #[must_use]
    pub fn with_n_threads(mut self, n_threads: Option<usize>) -> Self {
        self.n_threads = n_threads;
        self
    }

    // --- Getters ---

    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    #[must_use]
    pub fn min_node_size(&self) -> usize {
        self.min_node_size
    }

    #[must_use]
    pub fn mtry(&self) -> Option<usize> {
        self.mtry
    }

    #[must_use]
    pub fn max_tree_depth(&self) -> Option<usize> {
        self.max_tree_depth
    }

    #[must_use]
    pub fn is_replacement_used(&self) -> bool {
        self.is_replacement_used
    }

    #[must_use]
    pub fn selection_fraction(&self) -> f64 {
        self.selection_fraction
    }

    #[must_use]
    pub fn variables_to_ignore(&self) -> &BTreeSet<String> {
        &self.variables_to_ignore
    }

    #[must_use]
    pub fn is_stratified_bootstrap_used(&self) -> bool {
        self.is_stratified_bootstrap_used
    }

    #[must_use]
    pub fn class_sample_sizes(&self) -> Option<&BTreeMap<String, usize>> {
        self.class_sample_sizes.as_ref()
    }

    #[must_use]
    pub fn oob_mode(&self) -> OobMode {
        self.oob_mode
    }

    #[must_use]
    pub fn n_threads(&self) -> Option<usize> {
        self.n_threads
    }

    /// Check every parameter against the dataset schema it will be used with.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::InvalidTreeCount`] | `n_trees == 0` |
    /// | [`ForestError::InvalidMinNodeSize`] | `min_node_size == 0` |
    /// | [`ForestError::InvalidMtry`] | `mtry == Some(0)` |
    /// | [`ForestError::InvalidMaxDepth`] | `max_tree_depth == Some(0)` |
    /// | [`ForestError::InvalidSelectionFraction`] | fraction outside `(0, 1]` |
    /// | [`ForestError::InvalidThreadCount`] | `n_threads == Some(0)` |
    /// | [`ForestError::ConflictingSampling`] | sample sizes set with stratified bootstrap |
    /// | [`ForestError::UnknownClass`] | a sample size names an unknown class |
    /// | [`ForestError::MissingSampleSize`] | a class has no sample size |
    /// | [`ForestError::NoCandidateFeatures`] | every feature is ignored |
    pub fn validate(&self, schema: &Schema) -> Result<(), ForestError> {
        if self.n_trees == 0 {
            return Err(ForestError::InvalidTreeCount {
                n_trees: self.n_trees,
            });
        }
        if self.min_node_size == 0 {
            return Err(ForestError::InvalidMinNodeSize {
                min_node_size: self.min_node_size,
            });
        }
        if self.mtry == Some(0) {
            return Err(ForestError::InvalidMtry { mtry: 0 });
        }
        if self.max_tree_depth == Some(0) {
            return Err(ForestError::InvalidMaxDepth { max_depth: 0 });
        }
        if !(self.selection_fraction > 0.0 && self.selection_fraction <= 1.0) {
            return Err(ForestError::InvalidSelectionFraction {
                fraction: self.selection_fraction,
            });
        }
        if self.n_threads == Some(0) {
            return Err(ForestError::InvalidThreadCount { n_threads: 0 });
        }
        if let Some(sizes) = &self.class_sample_sizes {
            if self.is_stratified_bootstrap_used {
                return Err(ForestError::ConflictingSampling);
            }
            if let Some(class) = sizes.keys().find(|c| schema.class_index(c).is_none()) {
                return Err(ForestError::UnknownClass {
                    class: class.clone(),
                });
            }
            if let Some(class) = schema.class_names().iter().find(|c| !sizes.contains_key(*c)) {
                return Err(ForestError::MissingSampleSize {
                    class: class.clone(),
                });
            }
        }
        if self.usable_features(schema).is_empty() {
            return Err(ForestError::NoCandidateFeatures);
        }
        Ok(())
    }

    /// Feature indices that may be offered as split candidates.
    pub(crate) fn usable_features(&self, schema: &Schema) -> Vec<usize> {
        schema
            .feature_names()
            .iter()
            .enumerate()
            .filter(|(_, name)| !self.variables_to_ignore.contains(*name))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(
            vec!["a".into(), "b".into()],
            ["neg".to_string(), "pos".to_string()],
        )
    }

    #[test]
    fn defaults_match_documented_table() {
        let cfg = TreeGrowthConfig::default();
        assert_eq!(cfg.n_trees(), 500);
        assert_eq!(cfg.min_node_size(), 1);
        assert_eq!(cfg.mtry(), None);
        assert_eq!(cfg.max_tree_depth(), None);
        assert!(cfg.is_replacement_used());
        assert!((cfg.selection_fraction() - 0.632).abs() < f64::EPSILON);
        assert!(cfg.is_stratified_bootstrap_used());
        assert_eq!(cfg.oob_mode(), OobMode::Enabled);
        assert!(cfg.validate(&schema()).is_ok());
    }

    #[test]
    fn zero_trees_rejected() {
        assert!(matches!(
            TreeGrowthConfig::new(0),
            Err(ForestError::InvalidTreeCount { n_trees: 0 })
        ));
        let cfg = TreeGrowthConfig::new(5).unwrap().with_n_trees(0);
        assert!(matches!(
            cfg.validate(&schema()),
            Err(ForestError::InvalidTreeCount { .. })
        ));
    }

    #[test]
    fn invalid_parameters_rejected() {
        let base = TreeGrowthConfig::new(10).unwrap();
        let s = schema();
        assert!(matches!(
            base.clone().with_min_node_size(0).validate(&s),
            Err(ForestError::InvalidMinNodeSize { .. })
        ));
        assert!(matches!(
            base.clone().with_mtry(Some(0)).validate(&s),
            Err(ForestError::InvalidMtry { .. })
        ));
        assert!(matches!(
            base.clone().with_max_tree_depth(Some(0)).validate(&s),
            Err(ForestError::InvalidMaxDepth { .. })
        ));
        assert!(matches!(
            base.clone().with_selection_fraction(0.0).validate(&s),
            Err(ForestError::InvalidSelectionFraction { .. })
        ));
        assert!(matches!(
            base.clone().with_selection_fraction(f64::NAN).validate(&s),
            Err(ForestError::InvalidSelectionFraction { .. })
        ));
        assert!(matches!(
            base.with_n_threads(Some(0)).validate(&s),
            Err(ForestError::InvalidThreadCount { .. })
        ));
    }

    #[test]
    fn mtry_larger_than_feature_count_is_allowed() {
        let cfg = TreeGrowthConfig::new(1).unwrap().with_mtry(Some(50));
        assert!(cfg.validate(&schema()).is_ok());
    }

    #[test]
    fn sample_sizes_conflict_with_stratified() {
        let sizes = BTreeMap::from([("neg".to_string(), 3), ("pos".to_string(), 3)]);
        let cfg = TreeGrowthConfig::new(10)
            .unwrap()
            .with_class_sample_sizes(Some(sizes.clone()));
        assert!(matches!(
            cfg.validate(&schema()),
            Err(ForestError::ConflictingSampling)
        ));
        let cfg = cfg.with_stratified_bootstrap(false);
        assert!(cfg.validate(&schema()).is_ok());
    }

    #[test]
    fn sample_sizes_must_cover_known_classes() {
        let missing = BTreeMap::from([("neg".to_string(), 3)]);
        let cfg = TreeGrowthConfig::new(10)
            .unwrap()
            .with_stratified_bootstrap(false)
            .with_class_sample_sizes(Some(missing));
        assert!(matches!(
            cfg.validate(&schema()),
            Err(ForestError::MissingSampleSize { class }) if class == "pos"
        ));

        let unknown = BTreeMap::from([
            ("neg".to_string(), 3),
            ("pos".to_string(), 3),
            ("zzz".to_string(), 1),
        ]);
        let cfg = cfg.with_class_sample_sizes(Some(unknown));
        assert!(matches!(
            cfg.validate(&schema()),
            Err(ForestError::UnknownClass { class }) if class == "zzz"
        ));
    }

    #[test]
    fn ignoring_every_feature_rejected() {
        let cfg = TreeGrowthConfig::new(1)
            .unwrap()
            .with_variables_to_ignore(["a", "b"]);
        assert!(matches!(
            cfg.validate(&schema()),
            Err(ForestError::NoCandidateFeatures)
        ));
    }

    #[test]
    fn usable_features_skip_ignored() {
        let cfg = TreeGrowthConfig::new(1).unwrap().with_variables_to_ignore(["a"]);
        assert_eq!(cfg.usable_features(&schema()), vec![1]);
    }
}
