//! Tab-separated dataset reader with full header and row validation.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::dataset::{DatasetView, Schema};
use crate::options::LoadOptions;
use crate::DataError;

/// Minimum number of covariates a loaded file must keep after exclusion.
pub const MIN_LOADED_COVARIATES: usize = 2;

/// Role of a column as declared on header line 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Covariate,
    Response,
    Excluded,
}

/// Reads a dataset from a tab-separated file.
///
/// Expected format:
/// - line 1: variable names
/// - line 2: one type code per variable: `n` (numeric covariate),
///   `r` (response), `x` (excluded); case-insensitive
/// - line 3: reserved, read and discarded
/// - remaining lines: one observation per row; whitespace-only rows are skipped
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`DataError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`DataError::MissingHeader`] | File ends before the third header line |
/// | [`DataError::HeaderArity`] | Lines 1 and 2 differ in field count |
/// | [`DataError::UnknownTypeCode`] | A code other than `n`, `r`, `x` |
/// | [`DataError::ResponseCount`] | Not exactly one `r` column |
/// | [`DataError::IgnoredResponse`] | The response is in the ignore list |
/// | [`DataError::DuplicateFeature`] | Two kept covariates share a name |
/// | [`DataError::TooFewCovariates`] | Fewer than two covariates remain |
/// | [`DataError::EmptyDataset`] | Zero data rows |
/// | [`DataError::InconsistentRowLength`] | Row field count differs from the header |
/// | [`DataError::NonFiniteValue`] | A covariate cell is NaN, infinite, or unparseable |
/// | [`DataError::TooFewClasses`] | Fewer than two response classes |
pub struct DatasetReader {
    path: PathBuf,
    options: LoadOptions,
}

impl DatasetReader {
    /// Create a reader for the given file with default [`LoadOptions`].
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            options: LoadOptions::default(),
        }
    }

    /// Replace the load options.
    #[must_use]
    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    /// Read and validate the file, returning a [`DatasetView`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<DatasetView, DataError> {
        let file = File::open(&self.path).map_err(|e| DataError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;
        let mut reader = BufReader::new(file);

        // --- Header ---
        let names = self.header_line(&mut reader, 1)?;
        let codes = self.header_line(&mut reader, 2)?;
        self.header_line(&mut reader, 3)?;

        if names.len() != codes.len() {
            return Err(DataError::HeaderArity {
                path: self.path.clone(),
                names: names.len(),
                types: codes.len(),
            });
        }

        let mut kinds = Vec::with_capacity(codes.len());
        for (name, code) in names.iter().zip(&codes) {
            let kind = match code.trim().to_ascii_lowercase().as_str() {
                "n" => ColumnKind::Covariate,
                "r" => ColumnKind::Response,
                "x" => ColumnKind::Excluded,
                _ => {
                    return Err(DataError::UnknownTypeCode {
                        path: self.path.clone(),
                        name: name.clone(),
                        code: code.clone(),
                    });
                }
            };
            kinds.push(kind);
        }

        let responses: Vec<usize> = kinds
            .iter()
            .enumerate()
            .filter(|(_, k)| **k == ColumnKind::Response)
            .map(|(i, _)| i)
            .collect();
        let response_col = match responses.as_slice() {
            [col] => *col,
            _ => {
                return Err(DataError::ResponseCount {
                    path: self.path.clone(),
                    found: responses.len(),
                });
            }
        };
        if self.options.variables_to_ignore.contains(&names[response_col]) {
            return Err(DataError::IgnoredResponse {
                name: names[response_col].clone(),
            });
        }

        let covariate_cols: Vec<usize> = kinds
            .iter()
            .enumerate()
            .filter(|(i, k)| {
                **k == ColumnKind::Covariate && !self.options.variables_to_ignore.contains(&names[*i])
            })
            .map(|(i, _)| i)
            .collect();
        let mut seen = BTreeSet::new();
        if let Some(&dup) = covariate_cols.iter().find(|&&c| !seen.insert(names[c].as_str())) {
            return Err(DataError::DuplicateFeature {
                name: names[dup].clone(),
            });
        }
        if covariate_cols.len() < MIN_LOADED_COVARIATES {
            return Err(DataError::TooFewCovariates {
                found: covariate_cols.len(),
                required: MIN_LOADED_COVARIATES,
            });
        }
        debug!(
            n_columns = names.len(),
            n_covariates = covariate_cols.len(),
            response = %names[response_col],
            "parsed header"
        );

        // --- Rows ---
        // flexible(true) so that InconsistentRowLength fires instead of a CSV error.
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(reader);

        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); covariate_cols.len()];
        let mut labels: Vec<String> = Vec::new();
        let mut row_index = 0usize;

        for result in rdr.records() {
            let record = result.map_err(|e| DataError::RecordParse {
                path: self.path.clone(),
                offset: e.position().map_or(0, |p| p.byte()),
                source: e,
            })?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            let current = row_index;
            row_index += 1;
            if let Some(keep) = &self.options.observations {
                if !keep.contains(&current) {
                    continue;
                }
            }

            if record.len() != names.len() {
                return Err(DataError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index: current,
                    expected: names.len(),
                    got: record.len(),
                });
            }

            for (column, &col) in columns.iter_mut().zip(&covariate_cols) {
                let raw = record.get(col).unwrap_or("");
                let value = raw
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| DataError::NonFiniteValue {
                        path: self.path.clone(),
                        row_index: current,
                        name: names[col].clone(),
                        raw: raw.to_string(),
                    })?;
                column.push(value);
            }
            labels.push(record.get(response_col).unwrap_or("").trim().to_string());
        }

        if labels.is_empty() {
            return Err(DataError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        let feature_names = covariate_cols.iter().map(|&c| names[c].clone()).collect();
        let schema = Schema::new(feature_names, labels.iter().cloned());
        if schema.n_classes() < 2 {
            return Err(DataError::TooFewClasses {
                found: schema.n_classes(),
            });
        }
        let response = labels
            .iter()
            .map(|l| schema.class_index(l).unwrap_or_default())
            .collect();

        self.options.transform(&mut columns);

        let view = DatasetView::from_validated(schema, columns, response);
        info!(
            n_observations = view.n_observations(),
            n_features = view.n_features(),
            n_classes = view.n_classes(),
            scaled = self.options.scale,
            standardized = self.options.standardize && !self.options.scale,
            "dataset loaded"
        );
        Ok(view)
    }

    /// Read header line `line` (one-based) and split it on tabs.
    fn header_line(&self, reader: &mut impl BufRead, line: usize) -> Result<Vec<String>, DataError> {
        let mut buf = String::new();
        let n = reader
            .read_line(&mut buf)
            .map_err(|e| DataError::HeaderRead {
                path: self.path.clone(),
                source: e,
            })?;
        if n == 0 {
            return Err(DataError::MissingHeader {
                path: self.path.clone(),
                line,
            });
        }
        Ok(buf
            .trim_end_matches(['\n', '\r'])
            .split('\t')
            .map(str::to_string)
            .collect())
    }
}

impl DatasetView {
    /// Load a dataset file with the given options.
    ///
    /// # Errors
    ///
    /// See [`DatasetReader`].
    pub fn load(path: &Path, options: &LoadOptions) -> Result<Self, DataError> {
        DatasetReader::new(path).with_options(options.clone()).read()
    }
}
