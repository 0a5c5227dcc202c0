use std::path::PathBuf;

use jyrest_data::DataError;

/// Errors from tree and forest operations.
#[derive(Debug, thiserror::Error)]
pub enum ForestError {
    /// Returned when n_trees is zero.
    #[error("n_trees must be at least 1, got {n_trees}")]
    InvalidTreeCount {
        /// The invalid n_trees value provided.
        n_trees: usize,
    },

    /// Returned when min_node_size is zero.
    #[error("min_node_size must be at least 1, got {min_node_size}")]
    InvalidMinNodeSize {
        /// The invalid min_node_size value provided.
        min_node_size: usize,
    },

    /// Returned when mtry is zero.
    #[error("mtry must be at least 1, got {mtry}")]
    InvalidMtry {
        /// The invalid mtry value provided.
        mtry: usize,
    },

    /// Returned when max_tree_depth is zero.
    #[error("max_tree_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_tree_depth value provided.
        max_depth: usize,
    },

    /// Returned when selection_fraction is not in (0.0, 1.0].
    #[error("selection_fraction must be in (0.0, 1.0], got {fraction}")]
    InvalidSelectionFraction {
        /// The invalid selection_fraction value provided.
        fraction: f64,
    },

    /// Returned when n_threads is zero.
    #[error("n_threads must be at least 1, got {n_threads}")]
    InvalidThreadCount {
        /// The invalid n_threads value provided.
        n_threads: usize,
    },

    /// Returned when both stratified bootstrap and per-class sample sizes are configured.
    #[error("per-class sample sizes cannot be combined with stratified bootstrap")]
    ConflictingSampling,

    /// Returned when per-class sample sizes omit a class present in the dataset.
    #[error("no sample size given for class \"{class}\"")]
    MissingSampleSize {
        /// The class without a sample size.
        class: String,
    },

    /// Returned when sampling without replacement asks for more observations than a class has.
    #[error("cannot draw {requested} observations of class \"{class}\" without replacement, only {available} available")]
    SampleSizeTooLarge {
        /// The class being sampled.
        class: String,
        /// Number of observations requested.
        requested: usize,
        /// Number of observations of that class.
        available: usize,
    },

    /// Returned when a weight or sample size names a class absent from the dataset.
    #[error("unknown class \"{class}\"")]
    UnknownClass {
        /// The unknown class name.
        class: String,
    },

    /// Returned when a class weight is negative or not finite.
    #[error("weight for class \"{class}\" must be finite and non-negative, got {weight}")]
    InvalidClassWeight {
        /// The class whose weight is invalid.
        class: String,
        /// The invalid weight.
        weight: f64,
    },

    /// Returned when every feature is excluded from split candidates.
    #[error("no candidate features remain after exclusion")]
    NoCandidateFeatures,

    /// Returned when a tree is asked to grow from zero observations.
    #[error("training set is empty")]
    EmptyTrainingSet,

    /// Returned when predicting from, evaluating, or saving a forest with no trees.
    #[error("the forest has not been grown")]
    NotGrown,

    /// Returned when an observation index exceeds the dataset.
    #[error("observation index {index} out of range for a dataset of {n_observations}")]
    ObservationOutOfRange {
        /// The offending index.
        index: usize,
        /// Number of observations in the dataset.
        n_observations: usize,
    },

    /// Returned when a tree index exceeds the forest.
    #[error("tree index {index} out of range for a forest of {n_trees}")]
    TreeOutOfRange {
        /// The offending index.
        index: usize,
        /// Number of trees in the forest.
        n_trees: usize,
    },

    /// Returned when an ensemble prediction is requested over zero trees.
    #[error("no trees selected for prediction")]
    NoTreesSelected,

    /// Returned when a confusion matrix or evaluation is requested over zero observations.
    #[error("no observations to evaluate")]
    EmptyObservationSet,

    /// Returned when a prediction row has the wrong number of features.
    #[error("prediction input has {got} features, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the prediction input.
        got: usize,
    },

    /// Returned when a dataset lacks a feature the forest splits on.
    #[error("dataset has no feature named \"{name}\"")]
    MissingFeature {
        /// The missing feature name.
        name: String,
    },

    /// Returned when a saved forest is loaded against a dataset with different features or classes.
    #[error("dataset schema does not match the forest saved in {path}")]
    SchemaMismatch {
        /// Directory of the saved forest.
        path: PathBuf,
    },

    /// Returned when a feature or class name cannot be written to a tree skeleton.
    #[error("name \"{name}\" contains a reserved delimiter")]
    UnencodableName {
        /// The offending name.
        name: String,
    },

    /// Returned when a tree skeleton line is malformed.
    #[error("invalid tree skeleton at line {line}: {reason}")]
    Skeleton {
        /// One-based line number.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// Returned when a tree skeleton file is malformed.
    #[error("invalid tree skeleton in {path} at line {line}: {reason}")]
    SkeletonFile {
        /// Path to the skeleton file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// Returned when the forest directory cannot be created.
    #[error("cannot create directory {path}")]
    CreateDir {
        /// Path that was attempted.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when writing a file fails.
    #[error("failed to write {path}")]
    WriteFile {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading a file fails.
    #[error("failed to read {path}")]
    ReadFile {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the forest manifest cannot be encoded or decoded.
    #[error("invalid forest manifest {path}")]
    Manifest {
        /// Path to the manifest file.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// Returned when loading a manifest with an incompatible format version.
    #[error("incompatible forest version in {path}: expected {expected}, found {found}")]
    IncompatibleManifestVersion {
        /// The format version this build expects.
        expected: u32,
        /// The format version found in the file.
        found: u32,
        /// Path to the manifest.
        path: PathBuf,
    },

    /// Returned when a manifest has no dataset path to regrow from.
    #[error("the forest manifest records no dataset path")]
    MissingDatasetPath,

    /// Returned when a dedicated worker pool cannot be built.
    #[error("failed to build worker pool")]
    ThreadPool {
        /// The underlying rayon error.
        source: rayon::ThreadPoolBuildError,
    },

    /// Returned when the dataset layer fails.
    #[error(transparent)]
    Data(#[from] DataError),
}
