//! True-by-predicted class tallies and the rates derived from them.

use std::fmt;

use crate::error::ForestError;

/// Counts of (recorded class, predicted class) pairs.
///
/// `matrix[t][p]` is the number of observations of class `t` the ensemble
/// assigned to class `p`, both in schema class order.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
    class_names: Vec<String>,
}

/// How well one class is recovered.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClassMetrics {
    pub class: String,
    /// Share of the predictions of this class that were right; 0.0 when never predicted.
    pub precision: f64,
    /// Share of this class that was predicted as such; 0.0 when absent.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
    /// Observations recorded with this class.
    pub support: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

impl ConfusionMatrix {
    /// Tally paired class indices. `truth[i]` and `predicted[i]` describe
    /// the same observation.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::EmptyObservationSet`] when `truth` is empty.
    pub fn from_labels(
        truth: &[usize],
        predicted: &[usize],
        class_names: &[String],
    ) -> Result<Self, ForestError> {
        if truth.is_empty() {
            return Err(ForestError::EmptyObservationSet);
        }
        let n = class_names.len();
        let mut matrix = vec![vec![0; n]; n];
        truth
            .iter()
            .zip(predicted)
            .for_each(|(&t, &p)| matrix[t][p] += 1);
        Ok(Self {
            matrix,
            class_names: class_names.to_vec(),
        })
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.matrix.iter().map(|row| row.iter().sum::<usize>()).sum()
    }

    /// Fraction on the diagonal.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let hits = self.matrix.iter().enumerate().map(|(c, row)| row[c]).sum();
        ratio(hits, self.total())
    }

    #[must_use]
    pub fn error_rate(&self) -> f64 {
        1.0 - self.accuracy()
    }

    /// Precision, recall, F1 and support of every class, in class order.
    #[must_use]
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        let n = self.n_classes();
        let predicted_as: Vec<usize> = (0..n)
            .map(|p| self.matrix.iter().map(|row| row[p]).sum())
            .collect();
        self.class_names
            .iter()
            .zip(&self.matrix)
            .zip(predicted_as)
            .enumerate()
            .map(|(c, ((class, row), predicted))| {
                let hits = row[c];
                let support: usize = row.iter().sum();
                let precision = ratio(hits, predicted);
                let recall = ratio(hits, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    class: class.clone(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }

    /// Geometric mean of the recall of every class that occurs.
    ///
    /// Zero as soon as one occurring class is never recovered.
    #[must_use]
    pub fn g_mean(&self) -> f64 {
        let (product, present) = self
            .class_metrics()
            .iter()
            .filter(|m| m.support > 0)
            .fold((1.0_f64, 0_u32), |(product, present), m| (product * m.recall, present + 1));
        if present == 0 {
            0.0
        } else {
            product.powf(1.0 / f64::from(present))
        }
    }

    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.class_names.len()
    }
}

/// Tab-separated table with a `true\pred` corner cell.
impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "true\\pred")?;
        for name in &self.class_names {
            write!(f, "\t{name}")?;
        }
        writeln!(f)?;
        for (name, row) in self.class_names.iter().zip(&self.matrix) {
            write!(f, "{name}")?;
            for count in row {
                write!(f, "\t{count}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pu() -> Vec<String> {
        vec!["pos".into(), "unl".into()]
    }

    #[test]
    fn tallies_pairs() {
        // pos: 3 right, 1 missed. unl: 5 right, 1 wrongly called pos.
        let truth = [0, 0, 0, 0, 1, 1, 1, 1, 1, 1];
        let predicted = [0, 0, 0, 1, 1, 1, 1, 1, 1, 0];
        let cm = ConfusionMatrix::from_labels(&truth, &predicted, &pu()).unwrap();
        assert_eq!(cm.as_rows(), &[vec![3, 1], vec![1, 5]]);
        assert_eq!(cm.total(), 10);
        assert!((cm.accuracy() - 0.8).abs() < 1e-12);
        assert!((cm.error_rate() - 0.2).abs() < 1e-12);

        let m = cm.class_metrics();
        assert_eq!(m[0].class, "pos");
        assert_eq!(m[0].support, 4);
        assert!((m[0].precision - 0.75).abs() < 1e-12);
        assert!((m[0].recall - 0.75).abs() < 1e-12);
        assert!((m[0].f1 - 0.75).abs() < 1e-12);
        assert!((m[1].recall - 5.0 / 6.0).abs() < 1e-12);
        assert!((cm.g_mean() - (0.75_f64 * 5.0 / 6.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn missed_minority_zeroes_g_mean() {
        let truth = [0, 1, 1, 1, 1, 1, 1, 1, 1, 1];
        let cm = ConfusionMatrix::from_labels(&truth, &[1; 10], &pu()).unwrap();
        assert!((cm.accuracy() - 0.9).abs() < 1e-12);
        assert_eq!(cm.g_mean(), 0.0);
        let metrics = cm.class_metrics();
        assert_eq!(metrics[0].precision, 0.0);
        assert_eq!(metrics[0].f1, 0.0);
    }

    #[test]
    fn absent_class_is_left_out_of_g_mean() {
        let names = vec!["a".to_string(), "b".into(), "c".into()];
        let cm = ConfusionMatrix::from_labels(&[0, 1], &[0, 1], &names).unwrap();
        assert_eq!(cm.class_metrics()[2].support, 0);
        assert!((cm.g_mean() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_rejected() {
        assert!(matches!(
            ConfusionMatrix::from_labels(&[], &[], &pu()),
            Err(ForestError::EmptyObservationSet)
        ));
    }

    #[test]
    fn renders_tab_separated() {
        let cm = ConfusionMatrix::from_labels(&[0, 1, 1], &[0, 0, 1], &pu()).unwrap();
        assert_eq!(cm.to_string(), "true\\pred\tpos\tunl\npos\t1\t0\nunl\t1\t1\n");
    }
}
