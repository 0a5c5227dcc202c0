//! Per-class observation weights.

use std::collections::BTreeMap;

use jyrest_data::Schema;

use crate::error::ForestError;

/// Weight applied to every observation of a class.
///
/// Classes without an explicit entry weigh 1.0. Weights multiply class
/// counts in split purity, leaf class counts, and therefore votes.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClassWeights {
    weights: BTreeMap<String, f64>,
}

impl ClassWeights {
    /// Uniform weights.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the weight of one class.
    #[must_use]
    pub fn with_weight(mut self, class: impl Into<String>, weight: f64) -> Self {
        self.weights.insert(class.into(), weight);
        self
    }

    /// Weight of `class` (1.0 if unset).
    #[must_use]
    pub fn get(&self, class: &str) -> f64 {
        self.weights.get(class).copied().unwrap_or(1.0)
    }

    /// Explicitly set weights, by class name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(c, &w)| (c.as_str(), w))
    }

    /// Weights indexed by class position in `schema`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::UnknownClass`] | A weight names a class not in the schema |
    /// | [`ForestError::InvalidClassWeight`] | A weight is negative, NaN, or infinite |
    pub fn resolve(&self, schema: &Schema) -> Result<Vec<f64>, ForestError> {
        let mut resolved = vec![1.0; schema.n_classes()];
        for (class, &weight) in &self.weights {
            let index = schema
                .class_index(class)
                .ok_or_else(|| ForestError::UnknownClass {
                    class: class.clone(),
                })?;
            if !weight.is_finite() || weight < 0.0 {
                return Err(ForestError::InvalidClassWeight {
                    class: class.clone(),
                    weight,
                });
            }
            resolved[index] = weight;
        }
        Ok(resolved)
    }
}

impl FromIterator<(String, f64)> for ClassWeights {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self {
            weights: iter.into_iter().collect(),
        }
    }
}
