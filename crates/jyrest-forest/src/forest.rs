//! Bagged forest growth with parallel tree construction.

use std::path::Path;
use std::sync::Arc;

use jyrest_data::DatasetView;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::bootstrap::{Bootstrap, validate_sampling};
use crate::config::{OobMode, TreeGrowthConfig};
use crate::error::ForestError;
use crate::manifest::{DatasetSource, FORMAT_VERSION, ForestManifest};
use crate::node::weighted_argmax;
use crate::oob::{OobEstimate, compute_oob};
use crate::perm_importance::{VariableImportance, compute_permutation_importance};
use crate::predict::{EnsembleReport, RowPrediction, VoteSource, predict_observations, tally};
use crate::proximity::{Proximities, compute_proximities};
use crate::serialize::{load_tree, save_tree};
use crate::tree::DecisionTree;
use crate::weights::ClassWeights;

/// A forest of weighted-Gini trees over one dataset.
///
/// Each tree `i` is grown from `tree_seeds[i]`: a `ChaCha8Rng` seeded with it
/// draws the tree's bootstrap, then yields the seed of the tree's candidate
/// feature shuffles. Tree seeds come from a master `ChaCha8Rng` seeded with
/// the forest seed, so `(dataset, config, weights, seed)` fixes the forest
/// regardless of thread count.
#[derive(Debug, Clone)]
pub struct Forest<'a> {
    dataset: &'a DatasetView,
    config: TreeGrowthConfig,
    weights: ClassWeights,
    seed: u64,
    tree_seeds: Vec<u64>,
    trees: Vec<DecisionTree>,
    oob_indices: Vec<Vec<usize>>,
    oob: Option<OobEstimate>,
}

/// Extend or truncate `stored` to `n_trees` seeds drawn from the master stream.
fn derive_tree_seeds(seed: u64, stored: &[u64], n_trees: usize) -> Vec<u64> {
    if stored.len() >= n_trees {
        return stored[..n_trees].to_vec();
    }
    let mut master = ChaCha8Rng::seed_from_u64(seed);
    for _ in 0..stored.len() {
        let _: u64 = master.r#gen();
    }
    let mut seeds = stored.to_vec();
    seeds.extend((stored.len()..n_trees).map(|_| master.r#gen::<u64>()));
    seeds
}

/// Replay tree `tree_seed`'s bootstrap; returns it with the tree's shuffle seed.
fn replay_bootstrap(
    dataset: &DatasetView,
    config: &TreeGrowthConfig,
    tree_seed: u64,
) -> Result<(Bootstrap, u64), ForestError> {
    let mut rng = ChaCha8Rng::seed_from_u64(tree_seed);
    let bootstrap = Bootstrap::draw(dataset, config, &mut rng)?;
    Ok((bootstrap, rng.r#gen()))
}

/// Run `job` on a dedicated pool of `n_threads`, or on the current pool.
fn run_in_pool<T: Send>(
    n_threads: Option<usize>,
    job: impl FnOnce() -> T + Send,
) -> Result<T, ForestError> {
    match n_threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|source| ForestError::ThreadPool { source })?;
            Ok(pool.install(job))
        }
        None => Ok(job()),
    }
}

impl<'a> Forest<'a> {
    /// Create an ungrown forest. Nothing is validated until [`Forest::grow`].
    pub fn new(
        dataset: &'a DatasetView,
        config: TreeGrowthConfig,
        weights: ClassWeights,
        seed: u64,
    ) -> Self {
        Self {
            dataset,
            config,
            weights,
            seed,
            tree_seeds: Vec::new(),
            trees: Vec::new(),
            oob_indices: Vec::new(),
            oob: None,
        }
    }

    /// Create and grow a forest in one step.
    ///
    /// # Errors
    ///
    /// See [`Forest::grow`].
    pub fn grow_forest(
        dataset: &'a DatasetView,
        config: TreeGrowthConfig,
        weights: ClassWeights,
        seed: u64,
    ) -> Result<Self, ForestError> {
        let mut forest = Self::new(dataset, config, weights, seed);
        forest.grow()?;
        Ok(forest)
    }

    /// Grow every tree, replacing any previous ones.
    ///
    /// Trees are grown in parallel; tree `i` always comes from seed `i`. The
    /// first failing tree aborts the whole growth. When the config's OOB mode
    /// is [`OobMode::Enabled`] the OOB estimate is computed afterwards.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | any error of [`TreeGrowthConfig::validate`] | invalid config |
    /// | [`ForestError::UnknownClass`] / [`ForestError::InvalidClassWeight`] | bad weights |
    /// | [`ForestError::SampleSizeTooLarge`] | per-class sample size exceeds the class |
    /// | [`ForestError::EmptyTrainingSet`] | a bootstrap drew nothing |
    /// | [`ForestError::ThreadPool`] | the dedicated pool could not be built |
    #[instrument(skip_all, fields(n_trees = self.config.n_trees, seed = self.seed))]
    pub fn grow(&mut self) -> Result<(), ForestError> {
        let dataset = self.dataset;
        let config = &self.config;
        config.validate(dataset.schema())?;
        let class_weights = self.weights.resolve(dataset.schema())?;
        validate_sampling(dataset, config)?;
        let usable = config.usable_features(dataset.schema());

        let tree_seeds = derive_tree_seeds(self.seed, &self.tree_seeds, config.n_trees);
        info!(
            n_trees = config.n_trees,
            n_observations = dataset.n_observations(),
            n_features = dataset.n_features(),
            n_classes = dataset.n_classes(),
            "growing forest"
        );

        let grown: Vec<(DecisionTree, Vec<usize>)> = run_in_pool(config.n_threads, || {
            tree_seeds
                .clone()
                .into_par_iter()
                .map(|tree_seed| -> Result<_, ForestError> {
                    let (bootstrap, shuffle_seed) = replay_bootstrap(dataset, config, tree_seed)?;
                    let tree = DecisionTree::grow_resolved(
                        dataset,
                        &bootstrap.training,
                        config,
                        &class_weights,
                        &usable,
                        shuffle_seed,
                    )?;
                    Ok((tree, bootstrap.oob))
                })
                .collect::<Result<Vec<_>, ForestError>>()
        })??;

        let (trees, oob_indices): (Vec<_>, Vec<_>) = grown.into_iter().unzip();
        debug!(n_trees_grown = trees.len(), "tree growth complete");

        self.tree_seeds = tree_seeds;
        self.trees = trees;
        self.oob_indices = oob_indices;
        self.oob = match config.oob_mode {
            OobMode::Enabled => Some(run_in_pool(config.n_threads, || {
                compute_oob(&self.trees, dataset, &self.oob_indices)
            })?),
            OobMode::Disabled => None,
        };

        info!(
            oob_error = self.oob.as_ref().and_then(|o| o.error),
            "forest grown"
        );
        Ok(())
    }

    /// Discard the trees and grow again.
    ///
    /// With `new_seed` the tree seeds are derived afresh from it; otherwise
    /// the stored seeds are reused, extended from the master stream if the
    /// new config asks for more trees and truncated if it asks for fewer.
    ///
    /// # Errors
    ///
    /// See [`Forest::grow`]. An invalid `new_config` is rejected before the
    /// current trees are discarded.
    pub fn regrow(
        &mut self,
        new_seed: Option<u64>,
        new_config: Option<TreeGrowthConfig>,
    ) -> Result<(), ForestError> {
        if let Some(config) = &new_config {
            config.validate(self.dataset.schema())?;
        }
        if let Some(config) = new_config {
            self.config = config;
        }
        if let Some(seed) = new_seed {
            self.seed = seed;
            self.tree_seeds.clear();
        }
        self.trees.clear();
        self.oob_indices.clear();
        self.oob = None;
        self.grow()
    }

    /// Restore an ungrown forest from a manifest. Call [`Forest::grow`] to
    /// rebuild the recorded trees from their seeds.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::SchemaMismatch`] when `dataset` does not have the
    /// recorded features and classes.
    pub fn from_manifest(
        manifest: &ForestManifest,
        dataset: &'a DatasetView,
    ) -> Result<Self, ForestError> {
        if **dataset.schema() != manifest.schema {
            return Err(ForestError::SchemaMismatch {
                path: manifest
                    .dataset
                    .as_ref()
                    .map(|s| s.path.clone())
                    .unwrap_or_default(),
            });
        }
        let mut forest = Self::new(
            dataset,
            manifest.config.clone(),
            manifest.class_weights.clone(),
            manifest.seed,
        );
        forest.tree_seeds = manifest.tree_seeds.clone();
        Ok(forest)
    }

    // --- Accessors ---

    #[must_use]
    pub fn dataset(&self) -> &'a DatasetView {
        self.dataset
    }

    #[must_use]
    pub fn config(&self) -> &TreeGrowthConfig {
        &self.config
    }

    #[must_use]
    pub fn weights(&self) -> &ClassWeights {
        &self.weights
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Per-tree seeds, in tree order.
    #[must_use]
    pub fn tree_seeds(&self) -> &[u64] {
        &self.tree_seeds
    }

    #[must_use]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[must_use]
    pub fn is_grown(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Observations each tree did not train on.
    #[must_use]
    pub fn oob_indices(&self) -> &[Vec<usize>] {
        &self.oob_indices
    }

    fn ensure_grown(&self) -> Result<(), ForestError> {
        if self.is_grown() {
            Ok(())
        } else {
            Err(ForestError::NotGrown)
        }
    }

    // --- Evaluation ---

    /// The OOB estimate, computed now if growth skipped it.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::NotGrown`] before the forest is grown.
    pub fn oob_estimate(&self) -> Result<OobEstimate, ForestError> {
        self.ensure_grown()?;
        Ok(match &self.oob {
            Some(oob) => oob.clone(),
            None => compute_oob(&self.trees, self.dataset, &self.oob_indices),
        })
    }

    /// OOB misclassification fraction; `None` when no observation was OOB.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::NotGrown`] before the forest is grown.
    pub fn oob_error(&self) -> Result<Option<f64>, ForestError> {
        Ok(self.oob_estimate()?.error)
    }

    /// Predict `observations` of the training data with the trees in `trees`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::NotGrown`] | forest not grown |
    /// | [`ForestError::TreeOutOfRange`] | a tree index exceeds the forest |
    /// | [`ForestError::ObservationOutOfRange`] | an observation index exceeds the dataset |
    /// | [`ForestError::NoTreesSelected`] | `trees` is empty |
    /// | [`ForestError::EmptyObservationSet`] | `observations` is empty |
    pub fn predict_subset(
        &self,
        observations: &[usize],
        trees: &[usize],
    ) -> Result<EnsembleReport, ForestError> {
        self.ensure_grown()?;
        let n_trees = self.trees.len();
        let selected = trees
            .iter()
            .map(|&index| {
                self.trees
                    .get(index)
                    .ok_or(ForestError::TreeOutOfRange { index, n_trees })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let n_observations = self.dataset.n_observations();
        if let Some(&index) = observations.iter().find(|&&o| o >= n_observations) {
            return Err(ForestError::ObservationOutOfRange {
                index,
                n_observations,
            });
        }
        let dataset = self.dataset;
        let source = VoteSource {
            columns: dataset.columns().iter().map(Vec::as_slice).collect(),
            truth: Box::new(move |o| dataset.label(o)),
        };
        predict_observations(&selected, dataset.class_names(), &source, observations)
    }

    /// Predict every training observation with every tree.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::NotGrown`] before the forest is grown.
    pub fn predict_all(&self) -> Result<EnsembleReport, ForestError> {
        let observations: Vec<usize> = (0..self.dataset.n_observations()).collect();
        let trees: Vec<usize> = (0..self.trees.len()).collect();
        self.predict_subset(&observations, &trees)
    }

    /// Predict every observation of another dataset.
    ///
    /// Features are matched by name, so `other` may order its columns
    /// differently or carry extra ones. Recorded classes are compared by name;
    /// a class the forest never saw counts as an error.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::NotGrown`] | forest not grown |
    /// | [`ForestError::MissingFeature`] | `other` lacks one of the forest's features |
    #[instrument(skip_all, fields(n_observations = other.n_observations()))]
    pub fn predict_dataset(&self, other: &DatasetView) -> Result<EnsembleReport, ForestError> {
        self.ensure_grown()?;
        let columns = self
            .dataset
            .feature_names()
            .iter()
            .map(|name| {
                other
                    .column_by_name(name)
                    .ok_or_else(|| ForestError::MissingFeature { name: name.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let source = VoteSource {
            columns,
            truth: Box::new(move |o| other.label(o)),
        };
        let trees: Vec<&DecisionTree> = self.trees.iter().collect();
        let observations: Vec<usize> = (0..other.n_observations()).collect();
        let report =
            predict_observations(&trees, self.dataset.class_names(), &source, &observations)?;
        info!(error_rate = report.error_rate(), "dataset predicted");
        Ok(report)
    }

    /// Predict one row given in the training data's feature order.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::NotGrown`] | forest not grown |
    /// | [`ForestError::PredictionFeatureMismatch`] | wrong row width |
    pub fn predict_row(&self, row: &[f64]) -> Result<RowPrediction, ForestError> {
        self.ensure_grown()?;
        let expected = self.dataset.n_features();
        if row.len() != expected {
            return Err(ForestError::PredictionFeatureMismatch {
                expected,
                got: row.len(),
            });
        }
        let votes = tally(&self.trees, self.dataset.n_classes(), |f| row[f]);
        let (class, _) = weighted_argmax(&votes);
        Ok(RowPrediction {
            class: self.dataset.schema().class_name(class).to_string(),
            votes,
        })
    }

    /// Permutation importance of every feature the trees may split on,
    /// over each tree's OOB set.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::NotGrown`] before the forest is grown.
    #[instrument(skip(self))]
    pub fn variable_importance(&self, seed: u64) -> Result<Vec<VariableImportance>, ForestError> {
        self.ensure_grown()?;
        let features = self.config.usable_features(self.dataset.schema());
        let importance = compute_permutation_importance(
            &self.trees,
            self.dataset,
            &self.oob_indices,
            &features,
            seed,
        );
        debug!(n_features = importance.len(), "variable importance computed");
        Ok(importance)
    }

    /// Fraction of trees in which each pair of training observations shares a leaf.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::NotGrown`] before the forest is grown.
    pub fn proximities(&self) -> Result<Proximities, ForestError> {
        self.ensure_grown()?;
        Ok(compute_proximities(&self.trees, self.dataset))
    }

    // --- Persistence ---

    /// The record [`Forest::save`] writes to `forest.json`.
    #[must_use]
    pub fn manifest(&self, source: Option<&DatasetSource>) -> ForestManifest {
        ForestManifest {
            format_version: FORMAT_VERSION,
            dataset: source.cloned(),
            config: self.config.clone(),
            class_weights: self.weights.clone(),
            seed: self.seed,
            tree_seeds: self.tree_seeds.clone(),
            oob_error: self.oob.as_ref().and_then(|o| o.error),
            schema: self.dataset.schema().as_ref().clone(),
        }
    }

    /// Save the manifest and one skeleton per tree into `dir`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::NotGrown`] | forest not grown |
    /// | [`ForestError::CreateDir`] | `dir` cannot be created |
    /// | [`ForestError::UnencodableName`] | a name holds a reserved delimiter |
    /// | [`ForestError::WriteFile`] / [`ForestError::Manifest`] | writing failed |
    #[instrument(skip(self, source), fields(dir = %dir.display()))]
    pub fn save(&self, dir: &Path, source: Option<&DatasetSource>) -> Result<(), ForestError> {
        self.ensure_grown()?;
        self.manifest(source).write(dir)?;
        for (i, tree) in self.trees.iter().enumerate() {
            save_tree(tree, &ForestManifest::tree_path(dir, i))?;
        }
        info!(n_trees = self.trees.len(), "forest saved");
        Ok(())
    }

    /// Load a saved forest against the dataset it was grown on.
    ///
    /// Trees are read from their skeletons; OOB sets are recovered by
    /// replaying each tree's bootstrap from its seed, so `dataset` must be
    /// the training data, loaded with the same options.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | any error of [`ForestManifest::read`] | bad manifest |
    /// | [`ForestError::SchemaMismatch`] | `dataset` has other features or classes |
    /// | [`ForestError::ReadFile`] / [`ForestError::SkeletonFile`] | bad tree file |
    #[instrument(skip(dataset), fields(dir = %dir.display()))]
    pub fn load(dir: &Path, dataset: &'a DatasetView) -> Result<Self, ForestError> {
        let manifest = ForestManifest::read(dir)?;
        if **dataset.schema() != manifest.schema {
            return Err(ForestError::SchemaMismatch {
                path: dir.to_path_buf(),
            });
        }
        let config = &manifest.config;
        let loaded: Vec<(DecisionTree, Vec<usize>)> = run_in_pool(config.n_threads, || {
            manifest
                .tree_seeds
                .clone()
                .into_par_iter()
                .enumerate()
                .map(|(i, tree_seed)| -> Result<_, ForestError> {
                    let (bootstrap, shuffle_seed) = replay_bootstrap(dataset, config, tree_seed)?;
                    let tree = load_tree(
                        &ForestManifest::tree_path(dir, i),
                        Arc::clone(dataset.schema()),
                        shuffle_seed,
                    )?;
                    Ok((tree, bootstrap.oob))
                })
                .collect::<Result<Vec<_>, ForestError>>()
        })??;
        let (trees, oob_indices): (Vec<_>, Vec<_>) = loaded.into_iter().unzip();

        let mut forest = Self::from_manifest(&manifest, dataset)?;
        forest.trees = trees;
        forest.oob_indices = oob_indices;
        forest.oob = match config.oob_mode {
            OobMode::Enabled => Some(compute_oob(&forest.trees, dataset, &forest.oob_indices)),
            OobMode::Disabled => None,
        };
        info!(n_trees = forest.trees.len(), "forest loaded");
        Ok(forest)
    }
}
