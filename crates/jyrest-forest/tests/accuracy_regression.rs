//! Behavioural regression tests for jyrest-forest.
//!
//! These pin the observable behaviour of growth, voting, OOB estimation,
//! weighting, persistence, and regrowth on small deterministic datasets.

use std::path::{Path, PathBuf};

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

use jyrest_data::{DatasetView, LoadOptions};
use jyrest_forest::{
    ClassWeights, DatasetSource, Forest, ForestError, ForestManifest, Node, TreeGrowthConfig,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// 300 observations, 6 features, 3 classes.
///
/// Features 0-2 are informative (class * 3.0 + noise in [0, 0.5]).
/// Features 3-5 are pure noise in [0, 0.5].
fn make_classification() -> DatasetView {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let n_features = 6;
    let names = ["alpha", "beta", "gamma"];
    let mut columns = vec![Vec::new(); n_features];
    let mut labels = Vec::new();
    for i in 0..300 {
        let class = i % 3;
        labels.push(names[class]);
        for (f, column) in columns.iter_mut().enumerate() {
            let base = if f < 3 { class as f64 * 3.0 } else { 0.0 };
            column.push(base + rng.r#gen::<f64>() * 0.5);
        }
    }
    let feature_names = (0..n_features).map(|f| format!("f{f}")).collect();
    DatasetView::from_parts(feature_names, columns, &labels).unwrap()
}

/// 20 positives and 200 unlabelled on overlapping ranges of "x".
fn make_imbalanced() -> DatasetView {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut labels = Vec::new();
    for i in 0..220 {
        let positive = i % 11 == 0;
        let offset = if positive { 0.5 } else { 0.0 };
        x.push(offset + rng.r#gen::<f64>());
        y.push(rng.r#gen::<f64>());
        labels.push(if positive { "pos" } else { "unl" });
    }
    DatasetView::from_parts(vec!["x".into(), "y".into()], vec![x, y], &labels).unwrap()
}

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../jyrest-data/tests/fixtures/two_groups.tsv")
}

fn count_predicted(forest: &Forest<'_>, class: &str) -> usize {
    forest
        .predict_all()
        .unwrap()
        .predictions()
        .iter()
        .filter(|p| p.predicted == class)
        .count()
}

// ---------------------------------------------------------------------------
// a) separable data
// ---------------------------------------------------------------------------

/// Training and OOB error stay low on well-separated classes.
#[test]
fn separable_classes_are_learned() {
    let ds = make_classification();
    let cfg = TreeGrowthConfig::new(50).unwrap().with_mtry(Some(2));
    let forest = Forest::grow_forest(&ds, cfg, ClassWeights::new(), 42).unwrap();

    let report = forest.predict_all().unwrap();
    assert!(report.error_rate() < 0.02, "training error {}", report.error_rate());

    let oob = forest.oob_estimate().unwrap();
    let error = oob.error.unwrap();
    assert!(error < 0.1, "oob error {error}");
    assert_eq!(oob.n_oob_observations, 300);
    assert_eq!(oob.confusion.unwrap().total(), 300);
}

/// Informative features outrank noise in permutation importance.
#[test]
fn importance_prefers_informative_features() {
    let ds = make_classification();
    let cfg = TreeGrowthConfig::new(30).unwrap().with_mtry(Some(2));
    let forest = Forest::grow_forest(&ds, cfg, ClassWeights::new(), 42).unwrap();
    let importance = forest.variable_importance(42).unwrap();

    assert_eq!(importance.len(), 6);
    let top = &importance[0];
    assert_eq!(top.rank, 1);
    assert!(
        ["f0", "f1", "f2"].contains(&top.name.as_str()),
        "top feature {}",
        top.name
    );
    for noise in importance.iter().filter(|v| ["f3", "f4", "f5"].contains(&v.name.as_str())) {
        assert!(noise.importance < top.importance);
    }
}

// ---------------------------------------------------------------------------
// b) four-row scenario
// ---------------------------------------------------------------------------

/// One tree trained on every row splits at 0.5 and has no OOB estimate.
#[test]
fn four_rows_single_tree_without_oob() {
    let ds = DatasetView::from_parts(
        vec!["x".into()],
        vec![vec![0.0, 0.0, 1.0, 1.0]],
        &["A", "A", "B", "B"],
    )
    .unwrap();
    let cfg = TreeGrowthConfig::new(1)
        .unwrap()
        .with_mtry(Some(1))
        .with_min_node_size(1)
        .with_replacement(false)
        .with_selection_fraction(1.0)
        .with_stratified_bootstrap(false);
    let forest = Forest::grow_forest(&ds, cfg, ClassWeights::new(), 0).unwrap();

    match forest.trees()[0].root() {
        Node::Internal {
            threshold,
            left,
            right,
            ..
        } => {
            assert!((threshold - 0.5).abs() < f64::EPSILON);
            assert!(left.is_leaf() && right.is_leaf());
        }
        Node::Leaf { .. } => panic!("expected a split"),
    }
    assert!(forest.oob_indices()[0].is_empty());
    assert_eq!(forest.oob_error().unwrap(), None);
    assert_eq!(forest.predict_all().unwrap().error_rate(), 0.0);
}

// ---------------------------------------------------------------------------
// c) class weighting
// ---------------------------------------------------------------------------

/// Weighting the minority class 10x moves votes towards it.
#[test]
fn minority_weight_shifts_votes() {
    let ds = make_imbalanced();
    let cfg = TreeGrowthConfig::new(50)
        .unwrap()
        .with_replacement(true)
        .with_min_node_size(25);

    let plain = Forest::grow_forest(&ds, cfg.clone(), ClassWeights::new(), 5).unwrap();
    let weighted =
        Forest::grow_forest(&ds, cfg, ClassWeights::new().with_weight("pos", 10.0), 5).unwrap();

    let plain_pos = count_predicted(&plain, "pos");
    let weighted_pos = count_predicted(&weighted, "pos");
    assert!(
        weighted_pos > plain_pos,
        "weighted forest predicted {weighted_pos} positives, unweighted {plain_pos}"
    );
}

// ---------------------------------------------------------------------------
// d) persistence and regrowth
// ---------------------------------------------------------------------------

/// A saved and reloaded forest predicts and estimates exactly as before.
#[test]
fn save_load_preserves_predictions() {
    let ds = make_classification();
    let cfg = TreeGrowthConfig::new(15).unwrap().with_mtry(Some(3));
    let forest = Forest::grow_forest(&ds, cfg, ClassWeights::new(), 11).unwrap();

    let dir = TempDir::new().unwrap();
    forest.save(dir.path(), None).unwrap();
    let loaded = Forest::load(dir.path(), &ds).unwrap();

    assert_eq!(loaded.tree_seeds(), forest.tree_seeds());
    assert_eq!(loaded.oob_indices(), forest.oob_indices());
    for (a, b) in forest.trees().iter().zip(loaded.trees()) {
        assert_eq!(a.root(), b.root());
        assert_eq!(a.seed(), b.seed());
    }
    assert_eq!(
        forest.predict_all().unwrap().predictions(),
        loaded.predict_all().unwrap().predictions()
    );
    assert_eq!(forest.oob_error().unwrap(), loaded.oob_error().unwrap());
}

/// Loading against data with other features is rejected.
#[test]
fn load_against_other_schema_fails() {
    let ds = make_classification();
    let forest =
        Forest::grow_forest(&ds, TreeGrowthConfig::new(2).unwrap(), ClassWeights::new(), 1)
            .unwrap();
    let dir = TempDir::new().unwrap();
    forest.save(dir.path(), None).unwrap();

    let other = make_imbalanced();
    assert!(matches!(
        Forest::load(dir.path(), &other),
        Err(ForestError::SchemaMismatch { .. })
    ));
}

/// A forest rebuilt from its manifest and the reloaded file is identical.
#[test]
fn manifest_regrows_identical_forest() {
    let options = LoadOptions::new().with_variables_to_ignore(["noise"]);
    let ds = DatasetView::load(&fixture(), &options).unwrap();
    let cfg = TreeGrowthConfig::new(12).unwrap().with_mtry(Some(1));
    let weights = ClassWeights::new().with_weight("pos", 2.0);
    let forest = Forest::grow_forest(&ds, cfg, weights, 2024).unwrap();

    let dir = TempDir::new().unwrap();
    let source = DatasetSource::new(fixture(), options);
    forest.save(dir.path(), Some(&source)).unwrap();

    let manifest = ForestManifest::read(dir.path()).unwrap();
    assert_eq!(manifest.oob_error, forest.oob_error().unwrap());
    let reloaded = manifest.load_dataset().unwrap();
    let mut regrown = Forest::from_manifest(&manifest, &reloaded).unwrap();
    assert!(!regrown.is_grown());
    regrown.grow().unwrap();

    for (a, b) in forest.trees().iter().zip(regrown.trees()) {
        assert_eq!(a.root(), b.root());
    }
    assert_eq!(forest.oob_indices(), regrown.oob_indices());
}

/// Regrowing with the stored seeds reproduces the forest; a new seed does not.
#[test]
fn regrow_reproduces_or_reseeds() {
    let ds = make_classification();
    let cfg = TreeGrowthConfig::new(6).unwrap().with_mtry(Some(2));
    let mut forest = Forest::grow_forest(&ds, cfg, ClassWeights::new(), 8).unwrap();
    let before: Vec<Node> = forest.trees().iter().map(|t| t.root().clone()).collect();

    forest.regrow(None, None).unwrap();
    let same: Vec<Node> = forest.trees().iter().map(|t| t.root().clone()).collect();
    assert_eq!(before, same);

    forest.regrow(Some(9), None).unwrap();
    let reseeded: Vec<Node> = forest.trees().iter().map(|t| t.root().clone()).collect();
    assert_ne!(before, reseeded);
}

/// Predicting a separately loaded file aligns features by name.
#[test]
fn predict_dataset_from_file() {
    let ds = DatasetView::load(&fixture(), &LoadOptions::new()).unwrap();
    let cfg = TreeGrowthConfig::new(20).unwrap();
    let forest = Forest::grow_forest(&ds, cfg, ClassWeights::new(), 3).unwrap();

    let without_noise =
        DatasetView::load(&fixture(), &LoadOptions::new().with_variables_to_ignore(["noise"]))
            .unwrap();
    assert!(matches!(
        forest.predict_dataset(&without_noise),
        Err(ForestError::MissingFeature { name }) if name == "noise"
    ));

    let report = forest.predict_dataset(&ds).unwrap();
    assert_eq!(report.predictions().len(), 60);
    assert!(report.error_rate() < 0.05);
}
