use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use jyrest_data::{DatasetView, LoadOptions};
use jyrest_forest::{
    ClassMetrics, ClassWeights, DatasetSource, Forest, ForestManifest, OobMode, TreeGrowthConfig,
    VariableImportance,
};

#[derive(Parser)]
#[command(name = "jyrest")]
#[command(about = "Weighted CART random forests for class-imbalanced and positive/unlabelled data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// How the dataset file is read.
#[derive(Args, Debug, Clone)]
struct DataArgs {
    /// Column to drop while reading (repeatable)
    #[arg(long = "ignore", value_name = "NAME")]
    ignore: Vec<String>,

    /// Rescale every covariate to [0, 1]
    #[arg(long, default_value_t = false)]
    scale: bool,

    /// Standardize every covariate to mean 0, variance 1 (ignored with --scale)
    #[arg(long, default_value_t = false)]
    standardize: bool,
}

impl DataArgs {
    fn options(&self) -> LoadOptions {
        LoadOptions::new()
            .with_variables_to_ignore(self.ignore.iter().cloned())
            .with_scale(self.scale)
            .with_standardize(self.standardize)
    }
}

/// Forest growth parameters. Unset flags keep the base configuration.
#[derive(Args, Debug, Clone)]
struct TuningArgs {
    /// Number of trees to grow
    #[arg(long)]
    n_trees: Option<usize>,

    /// Minimum number of observations in each child of a split
    #[arg(long)]
    min_node_size: Option<usize>,

    /// Features tried per split (all if not set)
    #[arg(long)]
    mtry: Option<usize>,

    /// Maximum tree depth (unlimited if not set)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Draw bootstrap samples with replacement
    #[arg(long, value_name = "BOOL")]
    replacement: Option<bool>,

    /// Fraction of each pool drawn when sampling without replacement
    #[arg(long)]
    selection_fraction: Option<f64>,

    /// Sample each class independently
    #[arg(long, value_name = "BOOL")]
    stratified: Option<bool>,

    /// Exact per-class draws per tree, e.g. `pos=50` (repeatable; disables stratification)
    #[arg(long = "sample-size", value_name = "CLASS=N", value_parser = parse_sample_size)]
    sample_sizes: Vec<(String, usize)>,

    /// Feature never used for splitting (repeatable)
    #[arg(long = "exclude", value_name = "NAME")]
    exclude: Vec<String>,

    /// Skip the out-of-bag estimate after growth
    #[arg(long, default_value_t = false)]
    no_oob: bool,
}

impl TuningArgs {
    fn apply(&self, base: TreeGrowthConfig) -> TreeGrowthConfig {
        let mut cfg = base;
        if let Some(n) = self.n_trees {
            cfg = cfg.with_n_trees(n);
        }
        if let Some(n) = self.min_node_size {
            cfg = cfg.with_min_node_size(n);
        }
        if self.mtry.is_some() {
            cfg = cfg.with_mtry(self.mtry);
        }
        if self.max_depth.is_some() {
            cfg = cfg.with_max_tree_depth(self.max_depth);
        }
        if let Some(replacement) = self.replacement {
            cfg = cfg.with_replacement(replacement);
        }
        if let Some(fraction) = self.selection_fraction {
            cfg = cfg.with_selection_fraction(fraction);
        }
        if let Some(stratified) = self.stratified {
            cfg = cfg.with_stratified_bootstrap(stratified);
        }
        if !self.sample_sizes.is_empty() {
            let sizes: BTreeMap<String, usize> = self.sample_sizes.iter().cloned().collect();
            cfg = cfg
                .with_stratified_bootstrap(false)
                .with_class_sample_sizes(Some(sizes));
        }
        if !self.exclude.is_empty() {
            cfg = cfg.with_variables_to_ignore(self.exclude.iter().cloned());
        }
        if self.no_oob {
            cfg = cfg.with_oob_mode(OobMode::Disabled);
        }
        cfg
    }
}

#[derive(Subcommand)]
enum Command {
    /// Grow a forest from a dataset file and save it
    Grow {
        /// Path to the tab-separated dataset file
        #[arg(long)]
        data: PathBuf,

        /// Directory the forest is written to
        #[arg(long)]
        output_dir: PathBuf,

        /// Class weight, e.g. `pos=10` (repeatable; unlisted classes weigh 1)
        #[arg(long = "weight", value_name = "CLASS=W", value_parser = parse_class_weight)]
        weights: Vec<(String, f64)>,

        #[command(flatten)]
        data_args: DataArgs,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// Predict the observations of a dataset file with a saved forest
    Predict {
        /// Directory of a saved forest
        #[arg(long)]
        forest: PathBuf,

        /// Path to the dataset file to predict
        #[arg(long)]
        data: PathBuf,

        /// Include per-observation predictions in the output
        #[arg(long, default_value_t = false)]
        observations: bool,
    },

    /// Permutation importance of every feature of a saved forest
    Importance {
        /// Directory of a saved forest
        #[arg(long)]
        forest: PathBuf,

        /// Seed for the permutations
        #[arg(long, default_value_t = 42)]
        importance_seed: u64,
    },

    /// Observation pairs that share leaves in a saved forest
    Proximity {
        /// Directory of a saved forest
        #[arg(long)]
        forest: PathBuf,

        /// Smallest proximity reported
        #[arg(long, default_value_t = 0.5)]
        min: f64,
    },

    /// Rebuild a saved forest, optionally with a new seed or parameters
    Regrow {
        /// Directory of a saved forest
        #[arg(long)]
        forest: PathBuf,

        /// Derive fresh tree seeds from this seed instead of reusing the stored ones
        #[arg(long)]
        new_seed: Option<u64>,

        /// Directory the regrown forest is written to
        #[arg(long)]
        output_dir: PathBuf,

        #[command(flatten)]
        tuning: TuningArgs,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct ForestSummary {
    output_dir: PathBuf,
    n_observations: usize,
    n_features: usize,
    class_counts: BTreeMap<String, usize>,
    n_trees: usize,
    seed: u64,
    oob_error: Option<f64>,
    oob_class_metrics: Vec<ClassMetrics>,
}

#[derive(Serialize)]
struct PredictOutput {
    forest: PathBuf,
    n_observations: usize,
    error_rate: f64,
    class_names: Vec<String>,
    confusion: Option<Vec<Vec<usize>>>,
    class_metrics: Vec<ClassMetrics>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    predictions: Vec<PredictionOutput>,
}

#[derive(Serialize)]
struct PredictionOutput {
    observation: usize,
    predicted: String,
    truth: String,
    votes: Vec<f64>,
}

#[derive(Serialize)]
struct ImportanceOutput {
    forest: PathBuf,
    importance_seed: u64,
    oob_error: Option<f64>,
    variables: Vec<VariableImportance>,
}

#[derive(Serialize)]
struct ProximityOutput {
    forest: PathBuf,
    n_observations: usize,
    n_pairs: usize,
    pairs: Vec<ProximityPair>,
}

#[derive(Serialize)]
struct ProximityPair {
    first: usize,
    second: usize,
    proximity: f64,
}

fn parse_class_weight(s: &str) -> Result<(String, f64), String> {
    let (class, weight) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CLASS=WEIGHT, got `{s}`"))?;
    let weight = weight
        .parse::<f64>()
        .map_err(|e| format!("invalid weight `{weight}`: {e}"))?;
    Ok((class.to_string(), weight))
}

fn parse_sample_size(s: &str) -> Result<(String, usize), String> {
    let (class, size) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CLASS=N, got `{s}`"))?;
    let size = size
        .parse::<usize>()
        .map_err(|e| format!("invalid sample size `{size}`: {e}"))?;
    Ok((class.to_string(), size))
}

fn summarize(forest: &Forest<'_>, output_dir: &Path) -> Result<ForestSummary> {
    let dataset = forest.dataset();
    let class_counts = dataset
        .class_names()
        .iter()
        .cloned()
        .zip(dataset.class_counts())
        .collect();
    let oob = match forest.config().oob_mode() {
        OobMode::Enabled => Some(forest.oob_estimate().context("OOB estimate failed")?),
        OobMode::Disabled => None,
    };
    let oob_class_metrics = oob
        .as_ref()
        .and_then(|o| o.confusion.as_ref())
        .map(|cm| cm.class_metrics())
        .unwrap_or_default();
    Ok(ForestSummary {
        output_dir: output_dir.to_path_buf(),
        n_observations: dataset.n_observations(),
        n_features: dataset.n_features(),
        class_counts,
        n_trees: forest.n_trees(),
        seed: forest.seed(),
        oob_error: oob.and_then(|o| o.error),
        oob_class_metrics,
    })
}

fn read_forest_manifest(dir: &Path) -> Result<(ForestManifest, DatasetView)> {
    let manifest = ForestManifest::read(dir)
        .with_context(|| format!("failed to read forest manifest in {}", dir.display()))?;
    let dataset = manifest
        .load_dataset()
        .context("failed to reload the training data")?;
    info!(
        n_observations = dataset.n_observations(),
        n_trees = manifest.tree_seeds.len(),
        "training data reloaded"
    );
    Ok((manifest, dataset))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Grow {
            data,
            output_dir,
            weights,
            data_args,
            tuning,
        } => {
            let options = data_args.options();
            let dataset = DatasetView::load(&data, &options)
                .with_context(|| format!("failed to load {}", data.display()))?;
            info!(
                n_observations = dataset.n_observations(),
                n_features = dataset.n_features(),
                n_classes = dataset.n_classes(),
                "dataset loaded"
            );

            let config = tuning.apply(TreeGrowthConfig::default());
            let weights = weights
                .into_iter()
                .fold(ClassWeights::new(), |w, (class, weight)| w.with_weight(class, weight));
            let forest = Forest::grow_forest(&dataset, config, weights, cli.seed)
                .context("forest growth failed")?;

            let source = DatasetSource::new(
                std::fs::canonicalize(&data).unwrap_or(data),
                options,
            );
            forest
                .save(&output_dir, Some(&source))
                .with_context(|| format!("failed to save forest to {}", output_dir.display()))?;

            let output = summarize(&forest, &output_dir)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Predict {
            forest: forest_dir,
            data,
            observations,
        } => {
            let (manifest, training) = read_forest_manifest(&forest_dir)?;
            let forest = Forest::load(&forest_dir, &training)
                .with_context(|| format!("failed to load forest from {}", forest_dir.display()))?;

            // The training row selection indexes the training file, not this one.
            let options = manifest
                .dataset
                .as_ref()
                .map(|s| s.options.clone().with_all_observations())
                .unwrap_or_default();
            let target = DatasetView::load(&data, &options)
                .with_context(|| format!("failed to load {}", data.display()))?;
            let report = forest
                .predict_dataset(&target)
                .context("prediction failed")?;
            info!(error_rate = report.error_rate(), "prediction complete");

            let predictions = if observations {
                report
                    .predictions()
                    .iter()
                    .map(|p| PredictionOutput {
                        observation: p.observation,
                        predicted: p.predicted.clone(),
                        truth: p.truth.clone(),
                        votes: p.votes.clone(),
                    })
                    .collect()
            } else {
                Vec::new()
            };
            let output = PredictOutput {
                forest: forest_dir,
                n_observations: target.n_observations(),
                error_rate: report.error_rate(),
                class_names: report.class_names().to_vec(),
                confusion: report.confusion().map(|cm| cm.as_rows().to_vec()),
                class_metrics: report
                    .confusion()
                    .map(|cm| cm.class_metrics())
                    .unwrap_or_default(),
                predictions,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Importance {
            forest: forest_dir,
            importance_seed,
        } => {
            let (_, training) = read_forest_manifest(&forest_dir)?;
            let forest = Forest::load(&forest_dir, &training)
                .with_context(|| format!("failed to load forest from {}", forest_dir.display()))?;
            let variables = forest
                .variable_importance(importance_seed)
                .context("permutation importance failed")?;
            if let Some(top) = variables.first() {
                info!(feature = %top.name, importance = top.importance, "most important feature");
            }

            let output = ImportanceOutput {
                forest: forest_dir,
                importance_seed,
                oob_error: forest.oob_error()?,
                variables,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Proximity {
            forest: forest_dir,
            min,
        } => {
            let (_, training) = read_forest_manifest(&forest_dir)?;
            let forest = Forest::load(&forest_dir, &training)
                .with_context(|| format!("failed to load forest from {}", forest_dir.display()))?;
            let proximities = forest.proximities().context("proximity computation failed")?;
            let pairs: Vec<ProximityPair> = proximities
                .iter()
                .filter(|&(_, _, p)| p >= min)
                .map(|(first, second, proximity)| ProximityPair {
                    first,
                    second,
                    proximity,
                })
                .collect();

            let output = ProximityOutput {
                forest: forest_dir,
                n_observations: proximities.n_observations(),
                n_pairs: pairs.len(),
                pairs,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Regrow {
            forest: forest_dir,
            new_seed,
            output_dir,
            tuning,
        } => {
            let (manifest, training) = read_forest_manifest(&forest_dir)?;
            let mut forest = Forest::from_manifest(&manifest, &training)
                .context("forest record does not match its training data")?;
            let new_config = tuning.apply(manifest.config.clone());
            forest
                .regrow(new_seed, Some(new_config))
                .context("forest regrowth failed")?;
            forest
                .save(&output_dir, manifest.dataset.as_ref())
                .with_context(|| format!("failed to save forest to {}", output_dir.display()))?;

            let output = summarize(&forest, &output_dir)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
