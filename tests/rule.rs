use bart_trees::errors::TreeError;
use bart_trees::rule::{CATEGORICAL_SPLIT_VALUE, INVALID_SPLIT_VALUE};
use bart_trees::{CutPoints, Data, Rule, TreeContext, VariableType};

use ndarray::array;

fn mixed_context_data() -> (Data, CutPoints) {
    let x = array![[0u16, 0], [1, 1], [2, 2], [3, 1]];
    let cut_points = CutPoints::new(vec![vec![0.5, 1.5, 2.5], vec![0.0, 1.0, 2.0]]).unwrap();
    let data = Data::new(
        array![1.0, 2.0, 3.0, 4.0],
        x.view(),
        vec![VariableType::Ordinal, VariableType::Categorical],
    )
    .unwrap();
    (data, cut_points)
}

#[test]
fn test_categorical_mask_routes_categories() {
    let rule = Rule::categorical(0, 0b101);

    for category in 0..3u16 {
        let bit_set = (0b101 >> category) & 1 == 1;
        assert_eq!(rule.goes_right(VariableType::Categorical, category), bit_set);
    }
    assert!(rule.goes_right(VariableType::Categorical, 0));
    assert!(!rule.goes_right(VariableType::Categorical, 1));
    assert!(rule.goes_right(VariableType::Categorical, 2));
}

#[test]
fn test_ordinal_threshold() {
    let rule = Rule::ordinal(0, 2);
    assert!(!rule.goes_right(VariableType::Ordinal, 0));
    assert!(!rule.goes_right(VariableType::Ordinal, 2));
    assert!(rule.goes_right(VariableType::Ordinal, 3));
    assert_eq!(rule.variable(), Some(0));
    assert_eq!(rule.split_index(), 2);
}

#[test]
fn test_split_values() {
    let (data, cut_points) = mixed_context_data();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();

    assert_eq!(Rule::ordinal(0, 1).get_split_value(&ctx), 1.5);
    assert_eq!(Rule::categorical(1, 0b10).get_split_value(&ctx), CATEGORICAL_SPLIT_VALUE);
    assert_eq!(Rule::invalid().get_split_value(&ctx), INVALID_SPLIT_VALUE);
}

#[test]
fn test_check_against_data() {
    let (data, cut_points) = mixed_context_data();
    let ctx = TreeContext::new(&data, &cut_points).unwrap();

    assert_eq!(Rule::ordinal(0, 2).check(&ctx), Ok(0));
    assert_eq!(Rule::categorical(1, 0b011).check(&ctx), Ok(1));
    assert!(matches!(Rule::ordinal(0, 3).check(&ctx), Err(TreeError::InvalidRule(_))));
    assert!(matches!(Rule::categorical(1, 0b1000).check(&ctx), Err(TreeError::InvalidRule(_))));
    assert!(matches!(Rule::ordinal(2, 0).check(&ctx), Err(TreeError::InvalidRule(_))));
    assert!(matches!(Rule::invalid().check(&ctx), Err(TreeError::InvalidRule(_))));
}

#[test]
fn test_invalidate_and_copy() {
    let mut rule = Rule::ordinal(3, 1);
    let mut staged = Rule::default();
    staged.copy_from(&rule);
    assert!(staged.equals(&rule));

    rule.invalidate();
    assert!(!rule.is_valid());
    assert_eq!(rule.variable(), None);
    assert!(!rule.equals(&staged));

    staged.copy_from(&rule);
    assert!(!staged.is_valid());
}
