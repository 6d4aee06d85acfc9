//! Tests for the `.at` indexer.

use serde_json::json;
use tirea_treeclass::{
    freeze, leaves, path, tree_compare, Array, BinaryOp, CompareOp, Selector, Tree, TreeError,
    UnaryOp,
};

fn config() -> Tree {
    Tree::from(json!({
        "encoder": {"layers": [1, -2, 3], "dropout": 0.1},
        "decoder": {"layers": [-4, 5], "dropout": 0.2},
        "name": "model"
    }))
}

fn ints(values: &[i64]) -> Tree {
    Tree::list(values.iter().map(|v| Tree::Int(*v)))
}

// ============================================================================
// Path selection
// ============================================================================

#[test]
fn test_value_projects_subtree() {
    let tree = config();
    assert_eq!(
        tree.at("encoder.layers").unwrap().value().unwrap(),
        ints(&[1, -2, 3])
    );
    assert_eq!(
        tree.at(path!("decoder", "layers", 1)).unwrap().value().unwrap(),
        Tree::Int(5)
    );
    assert_eq!(
        tree.at("encoder").unwrap().at("layers[2]").unwrap().value().unwrap(),
        Tree::Int(3)
    );
}

#[test]
fn test_path_apply_leaves_siblings_alone() {
    let tree = config();
    let out = tree
        .at("encoder.layers")
        .unwrap()
        .apply(|x| x.unary(UnaryOp::Abs))
        .unwrap();
    assert_eq!(out.at("encoder.layers").unwrap().value().unwrap(), ints(&[1, 2, 3]));
    assert_eq!(out.at("decoder.layers").unwrap().value().unwrap(), ints(&[-4, 5]));
    assert_eq!(tree.at("encoder.layers").unwrap().value().unwrap(), ints(&[1, -2, 3]));
}

#[test]
fn test_path_errors() {
    let tree = config();
    assert!(matches!(
        tree.at("encoder.missing").unwrap_err(),
        TreeError::AttributeNotFound { .. }
    ));
    match tree.at("encoder.layers[0].x.y").unwrap_err() {
        TreeError::PathOutOfBounds { max_depth, .. } => assert_eq!(max_depth, 3),
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        tree.at("encoder.layers[9]").unwrap_err(),
        TreeError::AttributeNotFound { .. }
    ));
}

#[test]
fn test_string_tree_selector_is_a_path() {
    let tree = config();
    let at = tree.at(Tree::from("name")).unwrap();
    assert_eq!(at.value().unwrap(), Tree::from("model"));
    let renamed = at.set("other").unwrap();
    assert_eq!(renamed.at("name").unwrap().value().unwrap(), Tree::from("other"));
}

#[test]
fn test_index_selector_on_lists() {
    let tree = ints(&[10, 20, 30]);
    assert_eq!(tree.at(1usize).unwrap().value().unwrap(), Tree::Int(20));
    assert_eq!(tree.at(Tree::Int(2)).unwrap().add(1).unwrap(), ints(&[10, 20, 31]));
}

// ============================================================================
// Mask selection
// ============================================================================

#[test]
fn test_mask_from_comparison_on_nested_tree() {
    let layers = Tree::dict([
        ("a", ints(&[1, -2, 3])),
        ("b", ints(&[-4, 5])),
    ]);
    let negative = tree_compare(&layers, CompareOp::Lt, &Tree::Int(0), None).unwrap();

    let got = layers.at(negative.clone()).unwrap().get().unwrap();
    assert_eq!(
        got,
        Tree::dict([
            ("a", Tree::list([Tree::None, Tree::Int(-2), Tree::None])),
            ("b", Tree::list([Tree::Int(-4), Tree::None])),
        ])
    );

    let zeroed = layers.at(negative).unwrap().set(0).unwrap();
    assert_eq!(
        zeroed,
        Tree::dict([("a", ints(&[1, 0, 3])), ("b", ints(&[0, 5]))])
    );
}

#[test]
fn test_get_then_set_restores_selected_values() {
    let tree = Tree::list([Tree::from(1.5), Tree::from(-2.5), Tree::from(3.5)]);
    let mask = tree_compare(&tree, CompareOp::Gt, &Tree::Int(0), None).unwrap();

    let picked = tree.at(mask.clone()).unwrap().get().unwrap();
    let cleared = tree.at(mask.clone()).unwrap().set(0.0).unwrap();
    let restored = cleared.at(mask).unwrap().set(picked).unwrap();
    assert_eq!(restored, tree);
}

#[test]
fn test_array_leaf_masks() {
    let tree = Tree::list([Tree::Array(Array::float(vec![0.5, -1.0, 2.0]))]);
    let positive = tree_compare(&tree, CompareOp::Gt, &Tree::Int(0), None).unwrap();

    assert_eq!(
        tree.at(positive.clone()).unwrap().get().unwrap(),
        Tree::list([Tree::Array(Array::float(vec![0.5, 2.0]))])
    );
    assert_eq!(
        tree.at(positive.clone()).unwrap().multiply(2).unwrap(),
        Tree::list([Tree::Array(Array::float(vec![1.0, -1.0, 4.0]))])
    );
    // Not every element is selected, so a non-scalar value is ignored.
    assert_eq!(
        tree.at(positive).unwrap().set(Array::float(vec![9.0])).unwrap(),
        tree
    );
}

#[test]
fn test_reduce_sums_selected_parts() {
    let tree = Tree::list([
        Tree::Array(Array::int(vec![1, 2, 3])),
        Tree::from(10),
        Tree::from(-5),
    ]);
    let mask = Tree::list([
        Tree::Array(Array::bool(vec![true, false, true])),
        Tree::from(true),
        Tree::from(false),
    ]);
    let total = tree
        .at(mask)
        .unwrap()
        .reduce(
            |acc, x| {
                let x = match x {
                    Tree::Array(a) => a.iter().map(Tree::from).try_fold(
                        Tree::Int(0),
                        |sum, v| sum.binary(BinaryOp::Add, &v),
                    )?,
                    other => other,
                };
                acc.binary(BinaryOp::Add, &x)
            },
            Some(Tree::Int(0)),
        )
        .unwrap();
    assert_eq!(total, Tree::Int(14));
}

#[test]
fn test_numeric_conveniences() {
    let tree = ints(&[1, 2, 3]);
    let all = tree.at(Selector::All).unwrap();
    assert_eq!(all.add(1).unwrap(), ints(&[2, 3, 4]));
    assert_eq!(all.subtract(1).unwrap(), ints(&[0, 1, 2]));
    assert_eq!(all.multiply(2).unwrap(), ints(&[2, 4, 6]));
    assert_eq!(
        all.divide(2).unwrap(),
        Tree::list([Tree::from(0.5), Tree::from(1.0), Tree::from(1.5)])
    );
    assert_eq!(all.power(2).unwrap(), ints(&[1, 4, 9]));
    assert_eq!(all.min(2).unwrap(), ints(&[1, 2, 2]));
    assert_eq!(all.max(2).unwrap(), ints(&[2, 2, 3]));
}

#[test]
fn test_is_leaf_treats_lists_as_leaves() {
    let tree = Tree::dict([("xs", ints(&[1, 2])), ("y", Tree::from(3))]);
    let is_list = |t: &Tree| matches!(t, Tree::List(_));
    let out = tree
        .at(Selector::All)
        .unwrap()
        .is_leaf(&is_list)
        .apply(|x| Ok(Tree::Int(x.as_seq().map_or(1, |s| s.len() as i64))))
        .unwrap();
    assert_eq!(out, Tree::dict([("xs", Tree::from(2)), ("y", Tree::from(1))]));
}

#[test]
fn test_frozen_leaves_are_invisible_to_masks() {
    let tree = Tree::list([freeze(-1), Tree::from(-2)]);
    let negative = tree_compare(&tree, CompareOp::Lt, &Tree::Int(0), None).unwrap();
    assert_eq!(leaves(&negative, None), vec![Tree::Bool(true)]);
    let out = tree.at(negative).unwrap().set(0).unwrap();
    assert_eq!(out, Tree::list([freeze(-1), Tree::from(0)]));
}

// ============================================================================
// Unsupported selectors
// ============================================================================

#[test]
fn test_mask_of_other_kind_is_unsupported() {
    let tree = ints(&[1, 2]);
    let err = tree.at(Tree::Float(1.0)).unwrap_err();
    assert!(matches!(err, TreeError::UnsupportedSelector { .. }));

    let err = tree.at(Tree::tuple([Tree::from(true), Tree::from(false)])).unwrap_err();
    assert!(err.to_string().contains("Selector::All"));
}

#[test]
fn test_non_boolean_mask_leaves_fail_on_use() {
    let tree = ints(&[1, 2]);
    let at = tree.at(ints(&[1, 0])).unwrap();
    assert!(matches!(
        at.get().unwrap_err(),
        TreeError::NonBooleanMask { .. }
    ));
}

// ============================================================================
// Path set semantics
// ============================================================================

#[test]
fn test_path_set_applies_tree_shaped_value_leafwise() {
    let tree = Tree::from(json!({"a": 1, "b": 2}));
    let out = tree
        .at("a")
        .unwrap()
        .set(Tree::from(json!({"a": 10, "b": 20})))
        .unwrap();
    assert_eq!(out, Tree::from(json!({"a": 10, "b": 2})));
}

#[test]
fn test_path_set_broadcasts_container_to_selected_leaves() {
    let tree = Tree::from(json!({"xs": [1, 2], "y": 3}));
    let out = tree.at("xs").unwrap().set(ints(&[7])).unwrap();
    assert_eq!(out, Tree::from(json!({"xs": [[7], [7]], "y": 3})));
}
