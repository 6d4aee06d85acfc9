//! Structural equality, hashing and copying.

use crate::{flatten, unflatten, Scalar, Tree, TreeResult};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Structural equality.
///
/// Trees must have equal structure tokens; leaves are then compared
/// pairwise. Arrays compare by shape and values, an array never equals a
/// non-array, and numeric scalars compare by value across kinds
/// (`1 == 1.0`).
///
/// ```
/// use tirea_treeclass::{is_tree_equal, Array, Tree};
///
/// let a = Tree::list([Tree::from(1), Tree::Array(Array::int(vec![1, 2]))]);
/// let b = Tree::list([Tree::from(1), Tree::Array(Array::float(vec![1.0, 2.0]))]);
/// assert!(is_tree_equal(&a, &b));
/// assert!(!is_tree_equal(&a, &Tree::tuple([Tree::from(1), Tree::from(2)])));
/// ```
pub fn is_tree_equal(a: &Tree, b: &Tree) -> bool {
    trees_match(a, b, false)
}

/// [`is_tree_equal`] with NaN equal to itself, for hashed keys.
pub(crate) fn is_tree_key_equal(a: &Tree, b: &Tree) -> bool {
    trees_match(a, b, true)
}

fn trees_match(a: &Tree, b: &Tree, nan_equal: bool) -> bool {
    let (lhs, lhs_def) = flatten(a, None);
    let (rhs, rhs_def) = flatten(b, None);
    if lhs_def != rhs_def {
        return false;
    }
    lhs.iter().zip(&rhs).all(|(x, y)| leaf_equal(x, y, nan_equal))
}

fn leaf_equal(a: &Tree, b: &Tree, nan_equal: bool) -> bool {
    let same = |x: Scalar, y: Scalar| if nan_equal { x.key_eq(y) } else { x.loose_eq(y) };
    match (a, b) {
        (Tree::Array(x), Tree::Array(y)) if !nan_equal => x.array_equal(y),
        (Tree::Array(x), Tree::Array(y)) => {
            x.shape() == y.shape() && x.iter().zip(y.iter()).all(|(p, q)| same(p, q))
        }
        (Tree::Array(_), _) | (_, Tree::Array(_)) => false,
        _ => match (a.as_scalar(), b.as_scalar()) {
            (Some(x), Some(y)) => same(x, y),
            _ => a == b,
        },
    }
}

/// Content hash consistent with [`is_tree_equal`].
pub fn tree_hash(tree: &Tree) -> u64 {
    let mut hasher = DefaultHasher::new();
    hash_into(tree, &mut hasher);
    hasher.finish()
}

fn hash_into<H: Hasher>(tree: &Tree, state: &mut H) {
    match tree {
        Tree::None => 0u8.hash(state),
        Tree::Bool(_) | Tree::Int(_) | Tree::Float(_) => {
            1u8.hash(state);
            if let Some(s) = tree.as_scalar() {
                s.hash_bits().hash(state);
            }
        }
        Tree::Str(s) => {
            2u8.hash(state);
            s.hash(state);
        }
        Tree::Array(a) => {
            3u8.hash(state);
            a.hash_content(state);
        }
        Tree::List(items) | Tree::Tuple(items) => {
            let tag: u8 = if matches!(tree, Tree::List(_)) { 4 } else { 5 };
            tag.hash(state);
            items.len().hash(state);
            for item in items {
                hash_into(item, state);
            }
        }
        Tree::Dict(map) => {
            6u8.hash(state);
            map.len().hash(state);
            for (k, v) in map {
                k.hash(state);
                hash_into(v, state);
            }
        }
        Tree::Node(node) => {
            7u8.hash(state);
            node.type_key().hash(state);
            for (k, v) in node.attrs() {
                k.hash(state);
                hash_into(v, state);
            }
        }
        Tree::Frozen(f) => {
            8u8.hash(state);
            f.hash(state);
        }
    }
}

/// Copy a tree by flattening and rebuilding it. Nodes are rebuilt through
/// their codecs.
pub fn tree_copy(tree: &Tree) -> TreeResult<Tree> {
    let (leaves, def) = flatten(tree, None);
    unflatten(&def, leaves)
}
