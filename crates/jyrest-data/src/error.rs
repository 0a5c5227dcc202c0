//! Error types for jyrest-data.

use std::path::PathBuf;

/// Errors from dataset parsing, validation, and in-memory construction.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the file ends before the three header lines are read.
    #[error("missing header line {line} in {path}")]
    MissingHeader {
        /// Path to the dataset file.
        path: PathBuf,
        /// One-based header line number that is missing.
        line: usize,
    },

    /// Returned when reading a header line fails.
    #[error("cannot read header of {path}")]
    HeaderRead {
        /// Path to the dataset file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the name line and the type line disagree in length.
    #[error("header arity mismatch in {path}: {names} names but {types} type codes")]
    HeaderArity {
        /// Path to the dataset file.
        path: PathBuf,
        /// Number of variable names on line 1.
        names: usize,
        /// Number of type codes on line 2.
        types: usize,
    },

    /// Returned when a type code is not one of `n`, `r`, or `x`.
    #[error("unknown type code \"{code}\" for variable \"{name}\" in {path}; expected n, r, or x")]
    UnknownTypeCode {
        /// Path to the dataset file.
        path: PathBuf,
        /// Variable the code belongs to.
        name: String,
        /// The offending code.
        code: String,
    },

    /// Returned when the header does not declare exactly one response column.
    #[error("exactly one response variable must be declared in {path}, found {found}")]
    ResponseCount {
        /// Path to the dataset file.
        path: PathBuf,
        /// Number of `r` columns found.
        found: usize,
    },

    /// Returned when the response variable is listed among the variables to ignore.
    #[error("response variable \"{name}\" cannot be ignored")]
    IgnoredResponse {
        /// Name of the response variable.
        name: String,
    },

    /// Returned when too few covariates remain after exclusion.
    #[error("{found} covariates remain after exclusion, at least {required} required")]
    TooFewCovariates {
        /// Number of covariates left.
        found: usize,
        /// Minimum number accepted.
        required: usize,
    },

    /// Returned when the response holds fewer than two distinct classes.
    #[error("the response has {found} distinct classes, at least 2 required")]
    TooFewClasses {
        /// Number of distinct classes found.
        found: usize,
    },

    /// Returned when the file has header lines but zero data rows.
    #[error("empty dataset (no data rows) in {path}")]
    EmptyDataset {
        /// Path to the dataset file.
        path: PathBuf,
    },

    /// Returned when the tab-separated parser encounters a malformed record.
    #[error("parse error in {path} at byte offset {offset}")]
    RecordParse {
        /// Path to the dataset file.
        path: PathBuf,
        /// Byte offset where the error occurred, relative to the first data row.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when a data row has a different number of fields than the header.
    #[error("inconsistent row length in {path}: row {row_index} has {got} fields, expected {expected}")]
    InconsistentRowLength {
        /// Path to the dataset file.
        path: PathBuf,
        /// Zero-based data row index (blank rows excluded).
        row_index: usize,
        /// Number of fields declared by the header.
        expected: usize,
        /// Number of fields in this row.
        got: usize,
    },

    /// Returned when a covariate cell is NaN, infinite, or not a number.
    #[error("non-finite value in {path}: row {row_index}, variable \"{name}\", raw value \"{raw}\"")]
    NonFiniteValue {
        /// Path to the dataset file.
        path: PathBuf,
        /// Zero-based data row index (blank rows excluded).
        row_index: usize,
        /// Variable the cell belongs to.
        name: String,
        /// The raw text that failed to parse.
        raw: String,
    },

    /// Returned when an in-memory column holds a non-finite value.
    #[error("non-finite value in column \"{name}\" at observation {observation}")]
    NonFiniteColumnValue {
        /// Feature name.
        name: String,
        /// Zero-based observation index.
        observation: usize,
    },

    /// Returned when the same feature name is used twice.
    #[error("duplicate feature name \"{name}\"")]
    DuplicateFeature {
        /// The repeated name.
        name: String,
    },

    /// Returned when columns and response have different lengths.
    #[error("column \"{name}\" has {got} values, expected {expected}")]
    ColumnLength {
        /// Feature name (or `response`).
        name: String,
        /// Number of observations expected.
        expected: usize,
        /// Number of values present.
        got: usize,
    },

    /// Returned when a subset names an observation that does not exist.
    #[error("observation index {index} out of range for a dataset of {n_observations}")]
    ObservationOutOfRange {
        /// The offending index.
        index: usize,
        /// Number of observations in the dataset.
        n_observations: usize,
    },
}
