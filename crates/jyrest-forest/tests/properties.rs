//! Property tests over random seeds and sampling schemes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use jyrest_data::DatasetView;
use jyrest_forest::{Bootstrap, ClassWeights, DecisionTree, Forest, TreeGrowthConfig, write_tree};

/// 30 observations: positives every third row, noisy overlap on "b".
fn dataset() -> DatasetView {
    let a: Vec<f64> = (0..30).map(|i| f64::from((i * 13) % 17)).collect();
    let b: Vec<f64> = (0..30)
        .map(|i| if i % 3 == 0 { 2.0 + f64::from(i % 4) } else { f64::from(i % 5) })
        .collect();
    let labels: Vec<&str> = (0..30).map(|i| if i % 3 == 0 { "pos" } else { "unl" }).collect();
    DatasetView::from_parts(vec!["a".into(), "b".into()], vec![a, b], &labels).unwrap()
}

fn skeleton_hash(forest: &Forest<'_>) -> u64 {
    let mut hasher = DefaultHasher::new();
    for tree in forest.trees() {
        write_tree(tree).unwrap().hash(&mut hasher);
    }
    hasher.finish()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_same_seed_same_forest(seed in any::<u64>(), threads in 1usize..4) {
        let ds = dataset();
        let one = TreeGrowthConfig::new(4).unwrap().with_n_threads(Some(1));
        let many = TreeGrowthConfig::new(4).unwrap().with_n_threads(Some(threads));
        let a = Forest::grow_forest(&ds, one, ClassWeights::new(), seed).unwrap();
        let b = Forest::grow_forest(&ds, many, ClassWeights::new(), seed).unwrap();
        prop_assert_eq!(skeleton_hash(&a), skeleton_hash(&b));
        prop_assert_eq!(a.tree_seeds(), b.tree_seeds());
    }

    #[test]
    fn prop_oob_is_complement_of_training(
        seed in any::<u64>(),
        replacement in any::<bool>(),
        stratified in any::<bool>(),
        fraction in 0.1f64..1.0,
    ) {
        let ds = dataset();
        let cfg = TreeGrowthConfig::new(1)
            .unwrap()
            .with_replacement(replacement)
            .with_stratified_bootstrap(stratified)
            .with_selection_fraction(fraction);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let bootstrap = Bootstrap::draw(&ds, &cfg, &mut rng).unwrap();

        prop_assert!(bootstrap.oob.windows(2).all(|w| w[0] < w[1]));
        for obs in 0..ds.n_observations() {
            let in_bag = bootstrap.training.contains(&obs);
            let out_of_bag = bootstrap.oob.binary_search(&obs).is_ok();
            prop_assert!(in_bag != out_of_bag, "observation {} in both or neither", obs);
        }
        if !replacement {
            let mut unique = bootstrap.training.clone();
            unique.sort_unstable();
            unique.dedup();
            prop_assert_eq!(unique.len(), bootstrap.training.len());
        }
    }

    #[test]
    fn prop_leaves_hold_training_mass(seed in any::<u64>(), weight in 0.5f64..20.0) {
        let ds = dataset();
        let cfg = TreeGrowthConfig::new(1).unwrap().with_min_node_size(2);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let bootstrap = Bootstrap::draw(&ds, &cfg, &mut rng).unwrap();
        let weights = ClassWeights::new().with_weight("pos", weight);
        let tree = DecisionTree::grow(&ds, &bootstrap.training, &cfg, &weights, seed).unwrap();

        let expected: f64 = bootstrap
            .training
            .iter()
            .map(|&o| if ds.label(o) == "pos" { weight } else { 1.0 })
            .sum();
        let leaf_mass: f64 = tree
            .preorder()
            .filter(|n| n.is_leaf())
            .map(|n| n.total_weight())
            .sum();
        prop_assert!((leaf_mass - expected).abs() < 1e-9 * expected.max(1.0));
        prop_assert!((tree.root().total_weight() - expected).abs() < 1e-9 * expected.max(1.0));
    }

    #[test]
    fn prop_oob_error_is_a_rate(seed in any::<u64>()) {
        let ds = dataset();
        let forest =
            Forest::grow_forest(&ds, TreeGrowthConfig::new(5).unwrap(), ClassWeights::new(), seed)
                .unwrap();
        if let Some(error) = forest.oob_error().unwrap() {
            prop_assert!((0.0..=1.0).contains(&error));
        }
        for oob in forest.oob_indices() {
            prop_assert!(oob.iter().all(|&o| o < ds.n_observations()));
        }
    }
}
