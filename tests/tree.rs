use bart_trees::errors::TreeError;
use bart_trees::{CutPoints, Data, MeanNormalModel, NodeId, Rule, Tree, TreeContext, TreePrior, VariableType, ROOT};

use ndarray::{array, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Five observations of one ordinal variable with raw values 1 to 5.
fn five_observations() -> (Data, CutPoints) {
    let raw = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
    let cut_points = CutPoints::new(vec![vec![0.0, 1.0, 2.0, 3.0, 4.0]]).unwrap();
    let x = cut_points.discretize(raw.view(), &[VariableType::Ordinal]).unwrap();
    let data = Data::new(array![10.0, 20.0, 30.0, 40.0, 50.0], x.view(), vec![VariableType::Ordinal]).unwrap();
    (data, cut_points)
}

/// Two ordinal variables with codes 0..7 and 0..5 over 40 observations.
fn two_variables() -> (Data, CutPoints, Array2<u16>) {
    let n = 40;
    let x = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { (i % 7) as u16 } else { ((3 * i) % 5) as u16 });
    let y = (0..n).map(|i| (i as f64).sin() * 10.0 + i as f64).collect();
    let cut_points = CutPoints::new(vec![
        (0..7).map(|c| c as f64 + 0.5).collect(),
        (0..5).map(|c| c as f64 + 0.5).collect(),
    ])
    .unwrap();
    let data = Data::new(y, x.view(), vec![VariableType::Ordinal; 2]).unwrap();
    (data, cut_points, x)
}

fn sorted(indices: &[usize]) -> Vec<usize> {
    let mut indices = indices.to_vec();
    indices.sort_unstable();
    indices
}

/// Builds root(var 0 @ 3) -> left(var 1 @ 2) -> left(var 0 @ 1).
fn three_level_tree(ctx: &TreeContext, y: &[f64]) -> (Tree, [NodeId; 3]) {
    let mut tree = Tree::new(ctx.num_observations(), ctx.num_predictors());
    let (a, _) = tree.split(ctx, ROOT, Rule::ordinal(0, 3), y, false, false).unwrap();
    let (c, _) = tree.split(ctx, a, Rule::ordinal(1, 2), y, false, false).unwrap();
    tree.split(ctx, c, Rule::ordinal(0, 1), y, false, false).unwrap();
    (tree, [ROOT, a, c])
}

struct AlwaysSplit;

impl TreePrior for AlwaysSplit {
    fn split_probability(&self, _depth: usize) -> f64 {
        1.0
    }
}

#[test]
fn test_split_five_observations() {
    let (data, cut_points) = five_observations();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let y = data.y().to_vec();
    let mut tree = Tree::new(5, 1);

    let rule = Rule::ordinal(0, 2);
    assert_eq!(rule.get_split_value(&ctx), 2.0);

    let (left, right) = tree.split(&ctx, ROOT, rule, &y, false, false).unwrap();

    assert_eq!(tree.get_num_bottom_nodes(), 2);
    assert_eq!(sorted(tree.observation_indices(left)), vec![0, 1]);
    assert_eq!(sorted(tree.observation_indices(right)), vec![2, 3, 4]);
    assert_eq!(tree.node(left).view(), (0, 2));
    assert_eq!(tree.node(right).view(), (2, 3));

    assert_eq!(tree.node(left).average(), Some(15.0));
    assert_eq!(tree.node(right).average(), Some(40.0));
    assert_eq!(tree.node(left).num_effective_observations(), Some(2.0));
    assert_eq!(tree.node(right).num_effective_observations(), Some(3.0));
    assert!(tree.root().average().is_none());

    assert!(tree.validate().is_ok());
    assert!(tree.validate_partition(&ctx).is_ok());
}

#[test]
fn test_split_errors() {
    let (data, cut_points) = five_observations();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let y = data.y().to_vec();
    let mut tree = Tree::new(5, 1);

    assert!(matches!(
        tree.split(&ctx, ROOT, Rule::ordinal(0, 9), &y, false, false),
        Err(TreeError::InvalidRule(_))
    ));
    assert!(matches!(
        tree.split(&ctx, ROOT, Rule::invalid(), &y, false, false),
        Err(TreeError::InvalidRule(_))
    ));
    assert_eq!(
        tree.split(&ctx, 99, Rule::ordinal(0, 1), &y, false, false),
        Err(TreeError::InvalidNodeIndex(99))
    );

    tree.split(&ctx, ROOT, Rule::ordinal(0, 1), &y, false, false).unwrap();
    assert_eq!(
        tree.split(&ctx, ROOT, Rule::ordinal(0, 2), &y, false, false),
        Err(TreeError::NonLeafSplit(ROOT))
    );
    assert_eq!(tree.orphan_children(99).unwrap_err(), TreeError::InvalidNodeIndex(99));
}

#[test]
fn test_exhausted_split_narrows_child_masks() {
    let (data, cut_points, _) = two_variables();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let y = data.y().to_vec();
    let mut tree = Tree::new(40, 2);

    let (left, right) = tree.split(&ctx, ROOT, Rule::ordinal(1, 0), &y, true, false).unwrap();
    assert_eq!(tree.node(left).variables_available_for_split(), &[true, false]);
    assert_eq!(tree.node(right).variables_available_for_split(), &[true, true]);
    assert_eq!(tree.node(left).get_num_variables_available_for_split(), 1);
    assert_eq!(tree.root().variables_available_for_split(), &[true, true]);
}

#[test]
fn test_node_classes() {
    let (data, cut_points, _) = two_variables();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let y = data.y().to_vec();
    let (tree, [root, a, c]) = three_level_tree(&ctx, &y);

    assert_eq!(tree.get_no_grand_nodes(), vec![c]);
    assert_eq!(tree.get_swappable_nodes(), vec![a, root]);
    assert_eq!(tree.get_not_bottom_nodes(), vec![c, a, root]);
    assert_eq!(tree.get_num_bottom_nodes(), 4);
    assert_eq!(tree.get_num_not_bottom_nodes(), 3);
    assert_eq!(tree.get_num_no_grand_nodes(), 1);
    assert_eq!(tree.get_num_swappable_nodes(), 2);

    for id in tree.get_swappable_nodes() {
        assert!(!tree.node(id).is_bottom());
        assert!(!tree.children_are_bottom(id));
    }

    let leaves = tree.get_bottom_nodes();
    let deepest = leaves[0];
    assert_eq!(tree.get_depth(deepest), 3);
    assert_eq!(tree.node(deepest).parent(), Some(c));
    assert_eq!(tree.get_depth_below(ROOT), 3);
    assert_eq!(tree.get_depth_below(c), 1);
    assert_eq!(tree.get_depth_below(deepest), 0);
    assert_eq!(tree.get_num_nodes_below(ROOT), 6);
    assert!(tree.root().is_top());
    assert!(!tree.has_single_node());

    let total: usize = leaves.iter().map(|&leaf| tree.node(leaf).num_observations()).sum();
    assert_eq!(total, tree.root().num_observations());

    let mut counts = vec![0u32; 2];
    tree.count_variable_uses(&mut counts);
    assert_eq!(counts, vec![2, 1]);
}

#[test]
fn test_find_bottom_node_matches_views() {
    let (data, cut_points, x) = two_variables();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let y = data.y().to_vec();
    let (tree, _) = three_level_tree(&ctx, &y);

    for leaf in tree.get_bottom_nodes() {
        for &i in tree.observation_indices(leaf) {
            assert_eq!(tree.find_bottom_node(data.variable_types(), x.row(i)), leaf);
        }
    }
}

#[test]
fn test_orphan_then_split_is_deterministic() {
    let (data, cut_points, _) = two_variables();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let y = data.y().to_vec();
    let (mut tree, [_, _, c]) = three_level_tree(&ctx, &y);

    let (left, right) = tree.node(c).children().unwrap();
    let left_before = tree.observation_indices(left).to_vec();
    let right_before = tree.observation_indices(right).to_vec();
    let full_mean = tree.subset_vector(c, &y).iter().sum::<f64>() / tree.node(c).num_observations() as f64;

    let orphaned = tree.orphan_children(c).unwrap();
    assert_eq!(orphaned.node(), c);
    assert_eq!(orphaned.rule(), &Rule::ordinal(0, 1));
    assert!(tree.node(c).is_bottom());
    assert!((tree.node(c).average().unwrap() - full_mean).abs() < 1e-10);
    assert_eq!(
        tree.node(c).num_effective_observations(),
        Some(tree.node(c).num_observations() as f64)
    );

    let (left, right) = tree.split(&ctx, c, Rule::ordinal(0, 1), &y, false, false).unwrap();
    assert_eq!(tree.observation_indices(left), left_before.as_slice());
    assert_eq!(tree.observation_indices(right), right_before.as_slice());
}

#[test]
fn test_restore_children_undoes_merge() {
    let (data, cut_points, _) = two_variables();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let y = data.y().to_vec();
    let (mut tree, [root, a, c]) = three_level_tree(&ctx, &y);
    let before = tree.clone();

    assert_eq!(tree.orphan_children(a).unwrap_err(), TreeError::NotNoGrandNode(a));
    assert_eq!(tree.orphan_children(root).unwrap_err(), TreeError::NotNoGrandNode(root));

    let orphaned = tree.orphan_children(c).unwrap();
    assert_eq!(tree.get_num_bottom_nodes(), 3);
    tree.restore_children(orphaned).unwrap();

    assert!(tree.same_structure(&before));
    assert_eq!(tree.indices(), before.indices());
    assert!(tree.validate_partition(&ctx).is_ok());
}

#[test]
fn test_change_rule_repartitions_subtree() {
    let (data, cut_points) = five_observations();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let y = data.y().to_vec();
    let mut tree = Tree::new(5, 1);
    let (left, right) = tree.split(&ctx, ROOT, Rule::ordinal(0, 2), &y, false, false).unwrap();

    let mut candidate = Rule::ordinal(0, 3);
    tree.rule_mut(ROOT).unwrap().swap_with(&mut candidate);
    tree.add_observations_to_children(&ctx, ROOT, Some(&y));

    assert_eq!(candidate, Rule::ordinal(0, 2));
    assert_eq!(tree.node(left).num_observations(), 3);
    assert_eq!(tree.node(left).average(), Some(20.0));
    assert_eq!(tree.node(right).average(), Some(45.0));
    assert!(tree.validate_partition(&ctx).is_ok());

    // reject: revert the rule and the views
    tree.rule_mut(ROOT).unwrap().copy_from(&candidate);
    tree.add_observations_to_children(&ctx, ROOT, Some(&y));
    assert_eq!(tree.node(left).num_observations(), 2);
    assert_eq!(tree.node(left).average(), Some(15.0));
}

#[test]
fn test_swap_rules_between_parent_and_child() {
    let (data, cut_points, _) = two_variables();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let y = data.y().to_vec();
    let (mut tree, [root, a, _]) = three_level_tree(&ctx, &y);

    let mut child_rule = *tree.node(a).rule().unwrap();
    tree.rule_mut(root).unwrap().swap_with(&mut child_rule);
    *tree.rule_mut(a).unwrap() = child_rule;
    tree.add_observations_to_children(&ctx, ROOT, Some(&y));

    assert_eq!(tree.node(root).rule(), Some(&Rule::ordinal(1, 2)));
    assert_eq!(tree.node(a).rule(), Some(&Rule::ordinal(0, 3)));
    assert!(tree.validate().is_ok());
    assert!(tree.validate_partition(&ctx).is_ok());

    for leaf in tree.get_bottom_nodes() {
        let values = tree.subset_vector(leaf, &y);
        let expected = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };
        assert!((tree.node(leaf).average().unwrap() - expected).abs() < 1e-10);
    }
}

#[test]
fn test_weighted_averages() {
    let (data, cut_points) = five_observations();
    let data = data.with_weights(array![1.0, 1.0, 2.0, 2.0, 2.0]).unwrap();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let y = data.y().to_vec();
    let mut tree = Tree::new(5, 1);
    let (left, right) = tree.split(&ctx, ROOT, Rule::ordinal(0, 2), &y, false, false).unwrap();

    assert_eq!(tree.node(left).num_effective_observations(), Some(2.0));
    assert_eq!(tree.node(right).num_effective_observations(), Some(6.0));
    assert_eq!(tree.node(right).average(), Some(40.0));
    assert_eq!(tree.compute_variance(&ctx, right, &y), Some(2.0 * (100.0 + 0.0 + 100.0)));
}

#[test]
fn test_compute_variance() {
    let (data, cut_points) = five_observations();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let y = data.y().to_vec();
    let mut tree = Tree::new(5, 1);
    let (left, _) = tree.split(&ctx, ROOT, Rule::ordinal(0, 2), &y, false, false).unwrap();

    assert_eq!(tree.compute_variance(&ctx, left, &y), Some(50.0));
    assert_eq!(tree.compute_variance(&ctx, ROOT, &y), None);
}

#[test]
fn test_sample_from_prior_is_valid() {
    let (data, cut_points, _) = two_variables();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let prior = bart_trees::CgmPrior::default();
    let mut tree = Tree::new(40, 2);

    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        tree.sample_from_prior(&ctx, &mut rng, &prior).unwrap();
        assert!(tree.validate().is_ok());
        assert!(tree.validate_partition(&ctx).is_ok());
        for leaf in tree.get_bottom_nodes() {
            assert_eq!(tree.node(leaf).average(), Some(0.0));
        }
    }
}

#[test]
fn test_sampled_node_classes_partition_internal_nodes() {
    let (data, cut_points, _) = two_variables();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let prior = bart_trees::CgmPrior::new(0.95, 0.5).unwrap();
    let mut tree = Tree::new(40, 2);

    for seed in 0..30 {
        let mut rng = StdRng::seed_from_u64(seed);
        tree.sample_from_prior(&ctx, &mut rng, &prior).unwrap();

        let swappable = tree.get_swappable_nodes();
        let nog = tree.get_no_grand_nodes();
        for &id in &swappable {
            assert!(!tree.node(id).is_bottom(), "seed {}: leaf {} is swappable", seed, id);
            assert!(!tree.children_are_bottom(id), "seed {}: nog node {} is swappable", seed, id);
            assert!(!nog.contains(&id));
        }

        let mut classes = swappable.clone();
        classes.extend_from_slice(&nog);
        assert_eq!(sorted(&classes), sorted(&tree.get_not_bottom_nodes()), "seed {}", seed);
        assert_eq!(tree.get_num_swappable_nodes(), swappable.len());
        assert_eq!(tree.get_num_no_grand_nodes(), nog.len());
    }
}

#[test]
fn test_prior_growth_exhausts_ordinal_cut_points() {
    let (data, cut_points) = five_observations();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let mut tree = Tree::new(5, 1);
    let mut rng = StdRng::seed_from_u64(3);

    tree.sample_from_prior(&ctx, &mut rng, &AlwaysSplit).unwrap();

    // five cut points leave six code intervals
    assert_eq!(tree.get_num_bottom_nodes(), 6);
    for leaf in tree.get_bottom_nodes() {
        assert_eq!(tree.node(leaf).variables_available_for_split(), &[false]);
        assert_eq!(tree.node(leaf).num_effective_observations(), Some(tree.node(leaf).num_observations() as f64));
    }
    assert!(tree.validate_partition(&ctx).is_ok());
}

#[test]
fn test_prior_growth_exhausts_categories() {
    let x = array![[0u16], [1], [2], [3], [1], [2]];
    let cut_points = CutPoints::new(vec![vec![0.0, 1.0, 2.0, 3.0]]).unwrap();
    let data = Data::new(array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], x.view(), vec![VariableType::Categorical]).unwrap();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let mut tree = Tree::new(6, 1);
    let mut rng = StdRng::seed_from_u64(11);

    tree.sample_from_prior(&ctx, &mut rng, &AlwaysSplit).unwrap();

    assert_eq!(tree.get_num_bottom_nodes(), 4);
    for leaf in tree.get_bottom_nodes() {
        let codes: Vec<u16> = tree.observation_indices(leaf).iter().map(|&i| x[[i, 0]]).collect();
        assert!(!codes.is_empty());
        assert!(codes.iter().all(|&c| c == codes[0]));
    }
}

#[test]
fn test_sample_averages_and_set_fits() {
    let (data, cut_points) = five_observations();
    let data = data.with_test(array![[0u16], [5], [2]]).unwrap();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let y = data.y().to_vec();
    let mut tree = Tree::new(5, 1);
    tree.split(&ctx, ROOT, Rule::ordinal(0, 2), &y, false, false).unwrap();

    let model = MeanNormalModel::new(1.0e-12).unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    let mut training_fits = vec![0.0; 5];
    let mut test_fits = vec![0.0; 3];
    let draws = tree
        .sample_averages_and_set_fits(&ctx, &mut rng, &model, 1.0e-12, &mut training_fits, Some(&mut test_fits))
        .unwrap();

    assert_eq!(draws.len(), 2);
    assert!((draws[0] - 15.0).abs() < 1e-3);
    assert!((draws[1] - 40.0).abs() < 1e-3);
    assert_eq!(training_fits, vec![draws[0], draws[0], draws[1], draws[1], draws[1]]);
    assert_eq!(test_fits, vec![draws[0], draws[1], draws[0]]);

    assert_eq!(tree.recover_averages_from_fits(&training_fits), draws);

    let mut refit = vec![0.0; 5];
    tree.set_current_fits_from_averages(&ctx, &[1.0, 2.0], &mut refit, None).unwrap();
    assert_eq!(refit, vec![1.0, 1.0, 2.0, 2.0, 2.0]);
    assert_eq!(
        tree.set_current_fits_from_averages(&ctx, &[1.0], &mut refit, None),
        Err(TreeError::LeafCountMismatch { expected: 2, found: 1 })
    );
}

#[test]
fn test_fit_buffers_must_match_observations() {
    let (data, cut_points) = five_observations();
    let data = data.with_test(array![[0u16], [5], [2]]).unwrap();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let y = data.y().to_vec();
    let mut tree = Tree::new(5, 1);
    tree.split(&ctx, ROOT, Rule::ordinal(0, 2), &y, false, false).unwrap();

    let model = MeanNormalModel::new(1.0).unwrap();
    let mut rng = StdRng::seed_from_u64(9);
    let mut training_fits = vec![0.0; 5];

    let mut short_test = vec![7.0; 2];
    assert!(matches!(
        tree.sample_averages_and_set_fits(&ctx, &mut rng, &model, 1.0, &mut training_fits, Some(&mut short_test)),
        Err(TreeError::InvalidData(_))
    ));
    assert_eq!(short_test, vec![7.0; 2]);
    assert_eq!(training_fits, vec![0.0; 5]);

    let mut long_test = vec![0.0; 4];
    assert!(matches!(
        tree.set_current_fits_from_averages(&ctx, &[1.0, 2.0], &mut training_fits, Some(&mut long_test)),
        Err(TreeError::InvalidData(_))
    ));

    let mut short_training = vec![0.0; 4];
    assert!(matches!(
        tree.set_current_fits_from_averages(&ctx, &[1.0, 2.0], &mut short_training, None),
        Err(TreeError::InvalidData(_))
    ));
}

#[test]
fn test_enumeration_follows_leaf_order() {
    let (data, cut_points, _) = two_variables();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let y = data.y().to_vec();
    let (mut tree, _) = three_level_tree(&ctx, &y);

    let leaves = tree.get_and_enumerate_bottom_nodes();
    for (index, leaf) in leaves.iter().enumerate() {
        assert_eq!(tree.node(*leaf).enumeration_index(), Some(index));
    }
    assert_eq!(tree.enumerate_bottom_nodes(), 4);
}

#[test]
fn test_collapse_hoists_non_empty_subtree() {
    let raw = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
    let cut_points = CutPoints::new(vec![vec![0.0, 1.0, 2.0, 3.0, 4.0, 9.0]]).unwrap();
    let x = cut_points.discretize(raw.view(), &[VariableType::Ordinal]).unwrap();
    let data = Data::new(array![1.0, 2.0, 3.0, 4.0, 5.0], x.view(), vec![VariableType::Ordinal]).unwrap();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();

    let mut tree = Tree::new(5, 1);
    let (left, right) = tree.split_structure(&ctx, ROOT, Rule::ordinal(0, 5), false, false).unwrap();
    assert_eq!(tree.node(right).num_observations(), 0);
    assert_eq!(tree.node(left).num_effective_observations(), Some(5.0));
    tree.split_structure(&ctx, left, Rule::ordinal(0, 2), false, false).unwrap();

    let mut predictions = vec![1.0, 2.0, 3.0];
    tree.collapse_empty_nodes(&mut predictions).unwrap();

    assert_eq!(predictions, vec![1.0, 2.0]);
    assert_eq!(tree.root().rule(), Some(&Rule::ordinal(0, 2)));
    assert_eq!(tree.get_num_nodes_below(ROOT), 2);
    assert!(tree.validate().is_ok());
    assert!(tree.validate_partition(&ctx).is_ok());

    let mut wrong = vec![0.0];
    assert_eq!(
        tree.collapse_empty_nodes(&mut wrong),
        Err(TreeError::LeafCountMismatch { expected: 2, found: 1 })
    );
}

#[test]
fn test_map_old_cut_points_onto_new() {
    let raw = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
    let y = array![1.0, 2.0, 3.0, 4.0, 5.0];
    let old_cut_points = CutPoints::new(vec![vec![0.0, 1.0, 2.0, 3.0, 4.0]]).unwrap();
    let old_x = old_cut_points.discretize(raw.view(), &[VariableType::Ordinal]).unwrap();
    let old_data = Data::new(y.clone(), old_x.view(), vec![VariableType::Ordinal]).unwrap();
    let old_ctx = TreeContext::new(&old_data, &old_cut_points).unwrap();

    let mut tree = Tree::new(5, 1);
    let (_, right) = tree.split_structure(&old_ctx, ROOT, Rule::ordinal(0, 2), false, false).unwrap();
    tree.split_structure(&old_ctx, right, Rule::ordinal(0, 3), false, false).unwrap();
    assert_eq!(tree.get_num_bottom_nodes(), 3);

    let new_cut_points = CutPoints::new(vec![vec![2.0, 10.0]]).unwrap();
    let new_x = new_cut_points.discretize(raw.view(), &[VariableType::Ordinal]).unwrap();
    let new_data = Data::new(y, new_x.view(), vec![VariableType::Ordinal]).unwrap();
    let new_ctx = TreeContext::new(&new_data, &new_cut_points).unwrap();

    let mut predictions = vec![-1.0, 0.5, 7.0];
    tree.map_old_cut_points_onto_new(&new_ctx, &old_cut_points, &mut predictions).unwrap();

    assert_eq!(tree.get_num_bottom_nodes(), 2);
    assert_eq!(predictions, vec![-1.0, 7.0]);
    assert_eq!(tree.root().rule(), Some(&Rule::ordinal(0, 0)));
    let (left, right) = tree.root().children().unwrap();
    assert_eq!(sorted(tree.observation_indices(left)), vec![0, 1]);
    assert_eq!(sorted(tree.observation_indices(right)), vec![2, 3, 4]);
    assert!(tree.validate_partition(&new_ctx).is_ok());
}

#[test]
fn test_reset_and_display() {
    let (data, cut_points) = five_observations();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();
    let y = data.y().to_vec();
    let mut tree = Tree::new(5, 1);
    assert!(tree.to_string().starts_with("5 TB- 1 avg:"));

    tree.split(&ctx, ROOT, Rule::ordinal(0, 2), &y, false, false).unwrap();
    let printed = tree.to_string();
    assert_eq!(printed.lines().count(), 3);
    assert!(printed.lines().nth(1).unwrap().starts_with("  2 -B- 1 avg: 15.000000"));

    tree.reset();
    assert!(tree.has_single_node());
    assert_eq!(tree.indices(), &[0, 1, 2, 3, 4]);
}
