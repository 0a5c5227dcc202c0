//! Column-major dataset views with interned class labels.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::DataError;

/// Feature and class names shared by a dataset, its subsets, and every model grown from it.
///
/// Class names are sorted lexicographically and de-duplicated; a class index
/// is a position in [`Schema::class_names`]. Feature order is the file order.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Schema {
    feature_names: Vec<String>,
    class_names: Vec<String>,
}

impl Schema {
    /// Build a schema. Class names are sorted and de-duplicated.
    pub fn new(feature_names: Vec<String>, class_names: impl IntoIterator<Item = String>) -> Self {
        let class_names: BTreeSet<String> = class_names.into_iter().collect();
        Self {
            feature_names,
            class_names: class_names.into_iter().collect(),
        }
    }

    /// Feature names in column order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Class names in lexicographic order.
    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Number of features.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Column position of a feature, if present.
    #[must_use]
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|f| f == name)
    }

    /// Index of a class, if present.
    #[must_use]
    pub fn class_index(&self, name: &str) -> Option<usize> {
        self.class_names
            .binary_search_by(|c| c.as_str().cmp(name))
            .ok()
    }

    /// Name of the class at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= n_classes()`.
    #[must_use]
    pub fn class_name(&self, index: usize) -> &str {
        &self.class_names[index]
    }
}

/// An immutable table of numeric covariates and a categorical response.
///
/// Covariates are stored column-major: `columns[feature][observation]`.
/// The response is stored as class indices into the shared [`Schema`].
#[derive(Debug, Clone)]
pub struct DatasetView {
    schema: Arc<Schema>,
    columns: Vec<Vec<f64>>,
    response: Vec<usize>,
}

impl DatasetView {
    /// Build a view from in-memory columns and per-observation labels.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`DataError::TooFewCovariates`] | `feature_names` is empty |
    /// | [`DataError::DuplicateFeature`] | A name appears twice |
    /// | [`DataError::ColumnLength`] | Names/columns or columns/labels disagree in length |
    /// | [`DataError::NonFiniteColumnValue`] | A value is NaN or infinite |
    /// | [`DataError::TooFewClasses`] | Fewer than two distinct labels |
    pub fn from_parts<S: AsRef<str>>(
        feature_names: Vec<String>,
        columns: Vec<Vec<f64>>,
        labels: &[S],
    ) -> Result<Self, DataError> {
        if feature_names.is_empty() {
            return Err(DataError::TooFewCovariates {
                found: 0,
                required: 1,
            });
        }
        if columns.len() != feature_names.len() {
            return Err(DataError::ColumnLength {
                name: "columns".to_string(),
                expected: feature_names.len(),
                got: columns.len(),
            });
        }
        let mut seen = HashSet::with_capacity(feature_names.len());
        for name in &feature_names {
            if !seen.insert(name.as_str()) {
                return Err(DataError::DuplicateFeature { name: name.clone() });
            }
        }

        let n_observations = labels.len();
        for (name, column) in feature_names.iter().zip(&columns) {
            if column.len() != n_observations {
                return Err(DataError::ColumnLength {
                    name: name.clone(),
                    expected: n_observations,
                    got: column.len(),
                });
            }
            if let Some(observation) = column.iter().position(|v| !v.is_finite()) {
                return Err(DataError::NonFiniteColumnValue {
                    name: name.clone(),
                    observation,
                });
            }
        }

        let schema = Schema::new(
            feature_names,
            labels.iter().map(|l| l.as_ref().to_string()),
        );
        if schema.n_classes() < 2 {
            return Err(DataError::TooFewClasses {
                found: schema.n_classes(),
            });
        }
        // Every label is in the schema by construction.
        let response = labels
            .iter()
            .map(|l| schema.class_index(l.as_ref()).unwrap_or_default())
            .collect();

        Ok(Self {
            schema: Arc::new(schema),
            columns,
            response,
        })
    }

    /// Copy of this view restricted to `indices`, in the given order.
    ///
    /// Repeated indices are kept. The subset shares this view's schema, so
    /// class indices stay comparable even if a class is absent from the subset.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::ObservationOutOfRange`] if any index is out of range.
    pub fn subset(&self, indices: &[usize]) -> Result<Self, DataError> {
        let n_observations = self.n_observations();
        if let Some(&index) = indices.iter().find(|&&i| i >= n_observations) {
            return Err(DataError::ObservationOutOfRange {
                index,
                n_observations,
            });
        }
        let columns = self
            .columns
            .iter()
            .map(|col| indices.iter().map(|&i| col[i]).collect())
            .collect();
        let response = indices.iter().map(|&i| self.response[i]).collect();
        Ok(Self {
            schema: Arc::clone(&self.schema),
            columns,
            response,
        })
    }

    /// Shared schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[must_use]
    pub fn n_observations(&self) -> usize {
        self.response.len()
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.schema.n_classes()
    }

    /// Feature names in column order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        self.schema.feature_names()
    }

    /// Class names in lexicographic order.
    #[must_use]
    pub fn class_names(&self) -> &[String] {
        self.schema.class_names()
    }

    /// Column position of a feature, if present.
    #[must_use]
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.schema.feature_index(name)
    }

    /// All values of one feature.
    ///
    /// # Panics
    ///
    /// Panics if `feature >= n_features()`.
    #[must_use]
    pub fn column(&self, feature: usize) -> &[f64] {
        &self.columns[feature]
    }

    /// All values of the feature called `name`, if present.
    #[must_use]
    pub fn column_by_name(&self, name: &str) -> Option<&[f64]> {
        self.feature_index(name).map(|f| self.columns[f].as_slice())
    }

    /// Every column, `columns()[feature][observation]`.
    #[must_use]
    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    /// Value of `feature` for `observation`.
    #[must_use]
    pub fn value(&self, observation: usize, feature: usize) -> f64 {
        self.columns[feature][observation]
    }

    /// Class indices of every observation.
    #[must_use]
    pub fn response(&self) -> &[usize] {
        &self.response
    }

    /// Class index of `observation`.
    #[must_use]
    pub fn class_of(&self, observation: usize) -> usize {
        self.response[observation]
    }

    /// Class name of `observation`.
    #[must_use]
    pub fn label(&self, observation: usize) -> &str {
        self.schema.class_name(self.response[observation])
    }

    /// All covariate values of one observation, in feature order.
    #[must_use]
    pub fn row(&self, observation: usize) -> Vec<f64> {
        self.columns.iter().map(|col| col[observation]).collect()
    }

    /// Number of observations of each class.
    #[must_use]
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes()];
        for &c in &self.response {
            counts[c] += 1;
        }
        counts
    }

    /// Observation indices grouped by class, ascending within each class.
    #[must_use]
    pub fn observations_by_class(&self) -> Vec<Vec<usize>> {
        let mut groups = vec![Vec::new(); self.n_classes()];
        for (obs, &c) in self.response.iter().enumerate() {
            groups[c].push(obs);
        }
        groups
    }

    /// Build a view from validated parts produced by the reader.
    pub(crate) fn from_validated(
        schema: Schema,
        columns: Vec<Vec<f64>>,
        response: Vec<usize>,
    ) -> Self {
        Self {
            schema: Arc::new(schema),
            columns,
            response,
        }
    }
}
