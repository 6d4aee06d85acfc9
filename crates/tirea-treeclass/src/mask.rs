//! Leaf masking: freeze the leaves a mask selects, and undo it.

use crate::{
    freeze, is_frozen, structure_of, tree_map, unfreeze, IsLeaf, Tree, TreeError, TreeResult,
    TypeTag,
};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::debug;

/// Which leaves to mask.
#[derive(Clone, Copy)]
pub enum Mask<'a> {
    /// Select leaves for which the predicate returns true.
    Predicate(&'a dyn Fn(&Tree) -> bool),
    /// A tree of booleans with the same structure and top-level kind as
    /// the masked tree.
    Tree(&'a Tree),
}

fn always(_: &Tree) -> bool {
    true
}

impl Mask<'_> {
    /// Select every leaf.
    pub fn all() -> Mask<'static> {
        Mask::Predicate(&always)
    }
}

/// Selects the leaves that differentiation must not see.
impl Default for Mask<'_> {
    fn default() -> Self {
        Mask::Predicate(&is_nondiff)
    }
}

impl std::fmt::Debug for Mask<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mask::Predicate(_) => f.write_str("Mask::Predicate(..)"),
            Mask::Tree(t) => f.debug_tuple("Mask::Tree").field(t).finish(),
        }
    }
}

/// Custom non-differentiability rule for one runtime kind.
pub type NondiffHandler = Arc<dyn Fn(&Tree) -> bool + Send + Sync>;

static NONDIFF_HANDLERS: OnceLock<RwLock<HashMap<TypeTag, NondiffHandler>>> = OnceLock::new();

fn nondiff_handlers() -> &'static RwLock<HashMap<TypeTag, NondiffHandler>> {
    NONDIFF_HANDLERS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register the [`is_nondiff`] rule for values of kind `tag`.
pub fn def_nondiff<F>(tag: TypeTag, handler: F)
where
    F: Fn(&Tree) -> bool + Send + Sync + 'static,
{
    nondiff_handlers()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(tag, Arc::new(handler));
    debug!(?tag, "registered nondiff handler");
}

/// True for values that are not of an inexact (floating point) kind.
///
/// ```
/// use tirea_treeclass::{is_nondiff, Array, Tree};
///
/// assert!(is_nondiff(&Tree::Int(1)));
/// assert!(!is_nondiff(&Tree::Float(1.0)));
/// assert!(is_nondiff(&Tree::Array(Array::int(vec![1]))));
/// assert!(!is_nondiff(&Tree::Array(Array::float(vec![1.0]))));
/// ```
pub fn is_nondiff(value: &Tree) -> bool {
    let handler = nondiff_handlers()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&value.type_tag())
        .cloned();
    if let Some(handler) = handler {
        return handler(value);
    }
    match value {
        Tree::Float(_) => false,
        Tree::Array(a) => !a.is_inexact(),
        _ => true,
    }
}

/// Freeze the leaves selected by `mask`; the others pass through.
///
/// A masked leaf disappears from [`leaves`](crate::leaves) but keeps its
/// position, so [`tree_unmask`] can restore it.
pub fn tree_mask(tree: &Tree, mask: Mask<'_>, is_leaf: IsLeaf<'_>) -> TreeResult<Tree> {
    mask_map(tree, mask, is_leaf, |leaf| freeze(leaf.clone()))
}

/// Unfreeze the frozen values selected by `mask`.
///
/// Traversal stops at frozen wrappers, and a predicate mask receives the
/// wrapper itself. Use [`Mask::all`] to unmask everything.
pub fn tree_unmask(tree: &Tree, mask: Mask<'_>) -> TreeResult<Tree> {
    mask_map(tree, mask, Some(&is_frozen), |leaf| unfreeze(leaf.clone()))
}

fn mask_map<F>(tree: &Tree, mask: Mask<'_>, is_leaf: IsLeaf<'_>, func: F) -> TreeResult<Tree>
where
    F: Fn(&Tree) -> Tree,
{
    match mask {
        Mask::Predicate(pred) => tree_map(tree, &[], is_leaf, |leaf, _| {
            Ok(if pred(leaf) { func(leaf) } else { leaf.clone() })
        }),
        Mask::Tree(mask_tree) => {
            if mask_tree.type_tag() != tree.type_tag() {
                return Err(TreeError::InvalidMask {
                    message: format!(
                        "mask is a {} but the tree is a {}",
                        mask_tree.type_name(),
                        tree.type_name()
                    ),
                });
            }
            let lhs = structure_of(tree, is_leaf);
            let rhs = structure_of(mask_tree, is_leaf);
            if lhs != rhs {
                return Err(TreeError::InvalidMask {
                    message: format!("expected {}, found {}", lhs.describe(), rhs.describe()),
                });
            }
            tree_map(tree, &[mask_tree], is_leaf, |leaf, rest| match &rest[0] {
                Tree::Bool(true) => Ok(func(leaf)),
                Tree::Bool(false) => Ok(leaf.clone()),
                other => Err(TreeError::NonBooleanMask {
                    found: other.to_string(),
                }),
            })
        }
    }
}
