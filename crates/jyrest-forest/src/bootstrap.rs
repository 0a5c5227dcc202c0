//! Per-tree bootstrap sampling with out-of-bag tracking.

use jyrest_data::DatasetView;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::TreeGrowthConfig;
use crate::error::ForestError;

/// The observations one tree is grown from, and those it never saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
    /// Training multiset, in draw order (repeats kept).
    pub training: Vec<usize>,
    /// Observations absent from `training`, ascending and unique.
    pub oob: Vec<usize>,
}

/// A pool of observations and how many to draw from it.
#[derive(Debug)]
struct Stratum {
    observations: Vec<usize>,
    draws: usize,
}

impl Bootstrap {
    /// Draw a training set for one tree.
    ///
    /// - With replacement: `n` uniform draws; anything never drawn is OOB.
    /// - Without replacement: shuffle, keep the first `floor(selection_fraction * n)`.
    /// - Stratified: the above independently within each class.
    /// - Per-class sample sizes: exactly `size[c]` draws from class `c`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::ConflictingSampling`] | sample sizes set together with stratification |
    /// | [`ForestError::MissingSampleSize`] | a class has no sample size |
    /// | [`ForestError::SampleSizeTooLarge`] | more draws than a class has, without replacement |
    pub fn draw(
        dataset: &DatasetView,
        config: &TreeGrowthConfig,
        rng: &mut impl Rng,
    ) -> Result<Self, ForestError> {
        let strata = strata(dataset, config)?;
        let mut training = Vec::new();
        for stratum in &strata {
            if config.is_replacement_used {
                if stratum.observations.is_empty() {
                    continue;
                }
                for _ in 0..stratum.draws {
                    let pick = rng.gen_range(0..stratum.observations.len());
                    training.push(stratum.observations[pick]);
                }
            } else {
                let mut pool = stratum.observations.clone();
                pool.shuffle(rng);
                training.extend_from_slice(&pool[..stratum.draws]);
            }
        }

        let mut in_bag = vec![false; dataset.n_observations()];
        for &obs in &training {
            in_bag[obs] = true;
        }
        let oob = (0..dataset.n_observations()).filter(|&i| !in_bag[i]).collect();
        Ok(Self { training, oob })
    }
}

/// Resolve the sampling pools for `config`. Also used to validate sampling before growth.
fn strata(dataset: &DatasetView, config: &TreeGrowthConfig) -> Result<Vec<Stratum>, ForestError> {
    let fraction_of = |n: usize| {
        if config.is_replacement_used {
            n
        } else {
            (config.selection_fraction * n as f64).floor() as usize
        }
    };

    if let Some(sizes) = &config.class_sample_sizes {
        if config.is_stratified_bootstrap_used {
            return Err(ForestError::ConflictingSampling);
        }
        let groups = dataset.observations_by_class();
        let mut strata = Vec::with_capacity(groups.len());
        for (class, observations) in groups.into_iter().enumerate() {
            let name = dataset.schema().class_name(class);
            let draws = *sizes.get(name).ok_or_else(|| ForestError::MissingSampleSize {
                class: name.to_string(),
            })?;
            if !config.is_replacement_used && draws > observations.len() {
                return Err(ForestError::SampleSizeTooLarge {
                    class: name.to_string(),
                    requested: draws,
                    available: observations.len(),
                });
            }
            strata.push(Stratum {
                observations,
                draws,
            });
        }
        return Ok(strata);
    }

    if config.is_stratified_bootstrap_used {
        return Ok(dataset
            .observations_by_class()
            .into_iter()
            .map(|observations| {
                let draws = fraction_of(observations.len());
                Stratum {
                    observations,
                    draws,
                }
            })
            .collect());
    }

    let n = dataset.n_observations();
    Ok(vec![Stratum {
        observations: (0..n).collect(),
        draws: fraction_of(n),
    }])
}

/// Check that `config`'s sampling scheme can be applied to `dataset`.
pub(crate) fn validate_sampling(
    dataset: &DatasetView,
    config: &TreeGrowthConfig,
) -> Result<(), ForestError> {
    strata(dataset, config).map(|_| ())
}
