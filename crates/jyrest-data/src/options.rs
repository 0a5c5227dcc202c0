//! Load-time options: variable exclusion, row selection, and column transforms.

use std::collections::BTreeSet;

/// Options applied while loading a dataset file.
///
/// # Defaults
///
/// | Parameter             | Default |
/// |-----------------------|---------|
/// | `variables_to_ignore` | empty   |
/// | `observations`        | all     |
/// | `scale`               | `false` |
/// | `standardize`         | `false` |
///
/// When both `scale` and `standardize` are set, only scaling is applied.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LoadOptions {
    pub(crate) variables_to_ignore: BTreeSet<String>,
    pub(crate) observations: Option<BTreeSet<usize>>,
    pub(crate) scale: bool,
    pub(crate) standardize: bool,
}

impl LoadOptions {
    /// Options that load every covariate and row untouched.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude the named variables in addition to those typed `x` in the header.
    #[must_use]
    pub fn with_variables_to_ignore<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables_to_ignore = names.into_iter().map(Into::into).collect();
        self
    }

    /// Keep only the data rows at these zero-based indices (blank rows not counted).
    #[must_use]
    pub fn with_observations(mut self, observations: impl IntoIterator<Item = usize>) -> Self {
        self.observations = Some(observations.into_iter().collect());
        self
    }

    /// Drop any row selection so every data row is kept.
    #[must_use]
    pub fn with_all_observations(mut self) -> Self {
        self.observations = None;
        self
    }

    /// Min-max scale every covariate to `[0, 1]`.
    #[must_use]
    pub fn with_scale(mut self, scale: bool) -> Self {
        self.scale = scale;
        self
    }

    /// Standardize every covariate to zero mean and unit population variance.
    #[must_use]
    pub fn with_standardize(mut self, standardize: bool) -> Self {
        self.standardize = standardize;
        self
    }

    #[must_use]
    pub fn variables_to_ignore(&self) -> &BTreeSet<String> {
        &self.variables_to_ignore
    }

    #[must_use]
    pub fn observations(&self) -> Option<&BTreeSet<usize>> {
        self.observations.as_ref()
    }

    #[must_use]
    pub fn scale(&self) -> bool {
        self.scale
    }

    #[must_use]
    pub fn standardize(&self) -> bool {
        self.standardize
    }

    /// Apply the configured transform to every column in place.
    pub(crate) fn transform(&self, columns: &mut [Vec<f64>]) {
        if self.scale {
            columns.iter_mut().for_each(|c| scale_column(c));
        } else if self.standardize {
            columns.iter_mut().for_each(|c| standardize_column(c));
        }
    }
}

/// Min-max scale to `[0, 1]`. A constant column becomes all zeros.
pub(crate) fn scale_column(values: &mut [f64]) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !range.is_finite() {
        // Spread beyond f64::MAX: work on values divided by their largest magnitude.
        let magnitude = largest_magnitude(values);
        values.iter_mut().for_each(|v| *v /= magnitude);
        scale_column(values);
        return;
    }
    for v in values.iter_mut() {
        *v = if range > 0.0 { (*v - min) / range } else { 0.0 };
    }
}

fn largest_magnitude(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |m: f64, v| m.max(v.abs()))
}

/// Zero mean, unit population variance. A constant column becomes all zeros.
pub(crate) fn standardize_column(values: &mut [f64]) {
    if values.is_empty() {
        return;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    if !(mean.is_finite() && std.is_finite()) {
        // The result is scale-invariant, so shrink overflowing columns first.
        let magnitude = largest_magnitude(values);
        values.iter_mut().for_each(|v| *v /= magnitude);
        standardize_column(values);
        return;
    }
    for v in values.iter_mut() {
        *v = if std > 0.0 { (*v - mean) / std } else { 0.0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_survives_extreme_spread() {
        let mut col = vec![-f64::MAX, 0.0, f64::MAX];
        scale_column(&mut col);
        assert!(col.iter().all(|v| v.is_finite()));
        assert_eq!(col, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn standardize_survives_extreme_values() {
        let mut col = vec![f64::MAX, f64::MAX, -f64::MAX, -f64::MAX];
        standardize_column(&mut col);
        assert!(col.iter().all(|v| v.is_finite()));
        for (v, expected) in col.iter().zip([1.0, 1.0, -1.0, -1.0]) {
            assert!((v - expected).abs() < 1e-12, "{v}");
        }
    }

    #[test]
    fn scale_maps_to_unit_interval() {
        let mut col = vec![2.0, 4.0, 6.0];
        scale_column(&mut col);
        assert_eq!(col, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn scale_constant_column_is_zero() {
        let mut col = vec![3.0, 3.0];
        scale_column(&mut col);
        assert_eq!(col, vec![0.0, 0.0]);
    }

    #[test]
    fn standardize_uses_population_variance() {
        let mut col = vec![1.0, 3.0];
        standardize_column(&mut col);
        // mean 2, population std 1
        assert!((col[0] + 1.0).abs() < 1e-12);
        assert!((col[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn scale_takes_precedence_over_standardize() {
        let opts = LoadOptions::new().with_scale(true).with_standardize(true);
        let mut cols = vec![vec![0.0, 5.0, 10.0]];
        opts.transform(&mut cols);
        assert_eq!(cols[0], vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn default_leaves_columns_untouched() {
        let mut cols = vec![vec![7.0, -1.0]];
        LoadOptions::default().transform(&mut cols);
        assert_eq!(cols[0], vec![7.0, -1.0]);
    }

    #[test]
    fn all_observations_clears_selection_only() {
        let opts = LoadOptions::new()
            .with_variables_to_ignore(["a"])
            .with_observations([0, 2])
            .with_scale(true)
            .with_all_observations();
        assert!(opts.observations().is_none());
        assert!(opts.scale());
        assert!(opts.variables_to_ignore().contains("a"));
    }

    #[test]
    fn ignore_list_collects_names() {
        let opts = LoadOptions::new().with_variables_to_ignore(["b", "a"]);
        let names: Vec<&str> = opts.variables_to_ignore().iter().map(String::as_str).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
