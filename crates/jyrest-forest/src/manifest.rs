//! On-disk record of a grown forest.
//!
//! A forest directory holds `forest.json` (this manifest) and one tree
//! skeleton per tree, `tree_<i>.tsv`.

use std::path::{Path, PathBuf};

use jyrest_data::{DatasetView, LoadOptions, Schema};
use tracing::{debug, instrument};

use crate::config::TreeGrowthConfig;
use crate::error::ForestError;
use crate::weights::ClassWeights;

/// Current manifest format version.
pub const FORMAT_VERSION: u32 = 1;

/// File name of the manifest inside a forest directory.
pub const MANIFEST_FILE: &str = "forest.json";

/// Where a forest's training data came from, so it can be reloaded.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DatasetSource {
    /// Path of the dataset file.
    pub path: PathBuf,
    /// Options the file was loaded with.
    pub options: LoadOptions,
}

impl DatasetSource {
    pub fn new(path: impl Into<PathBuf>, options: LoadOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }
}

/// Everything needed to rebuild a forest bit-for-bit from its dataset.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ForestManifest {
    /// Format version for compatibility checking.
    pub format_version: u32,
    /// Training data, when the forest was grown from a file.
    pub dataset: Option<DatasetSource>,
    /// Growth parameters.
    pub config: TreeGrowthConfig,
    /// Class weights used during growth.
    pub class_weights: ClassWeights,
    /// Master seed the tree seeds were derived from.
    pub seed: u64,
    /// One seed per tree, in tree order.
    pub tree_seeds: Vec<u64>,
    /// OOB error at save time. `null` when undefined or not computed.
    pub oob_error: Option<f64>,
    /// Feature and class names of the training data.
    pub schema: Schema,
}

impl ForestManifest {
    /// Path of tree `index`'s skeleton inside `dir`.
    #[must_use]
    pub fn tree_path(dir: &Path, index: usize) -> PathBuf {
        dir.join(format!("tree_{index}.tsv"))
    }

    /// Write the manifest to `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::CreateDir`] | directory creation failed |
    /// | [`ForestError::Manifest`] | JSON encoding failed |
    /// | [`ForestError::WriteFile`] | file write failed |
    #[instrument(skip(self), fields(dir = %dir.display()))]
    pub fn write(&self, dir: &Path) -> Result<(), ForestError> {
        std::fs::create_dir_all(dir).map_err(|source| ForestError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|source| ForestError::Manifest {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|source| ForestError::WriteFile {
            path: path.clone(),
            source,
        })?;
        debug!(n_trees = self.tree_seeds.len(), "manifest written");
        Ok(())
    }

    /// Read the manifest from `dir`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::ReadFile`] | file read failed |
    /// | [`ForestError::Manifest`] | JSON decoding failed |
    /// | [`ForestError::IncompatibleManifestVersion`] | format version mismatch |
    #[instrument(fields(dir = %dir.display()))]
    pub fn read(dir: &Path) -> Result<Self, ForestError> {
        let path = dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path).map_err(|source| ForestError::ReadFile {
            path: path.clone(),
            source,
        })?;
        let manifest: Self = serde_json::from_str(&text).map_err(|source| ForestError::Manifest {
            path: path.clone(),
            source,
        })?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(ForestError::IncompatibleManifestVersion {
                expected: FORMAT_VERSION,
                found: manifest.format_version,
                path,
            });
        }
        debug!(n_trees = manifest.tree_seeds.len(), "manifest read");
        Ok(manifest)
    }

    /// Reload the training data this forest was grown from.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::MissingDatasetPath`] if no source was recorded,
    /// [`ForestError::SchemaMismatch`] if the file no longer has the recorded
    /// features and classes, or any [`jyrest_data::DataError`] from loading.
    pub fn load_dataset(&self) -> Result<DatasetView, ForestError> {
        let source = self.dataset.as_ref().ok_or(ForestError::MissingDatasetPath)?;
        let dataset = DatasetView::load(&source.path, &source.options)?;
        if **dataset.schema() != self.schema {
            return Err(ForestError::SchemaMismatch {
                path: source.path.clone(),
            });
        }
        Ok(dataset)
    }
}
