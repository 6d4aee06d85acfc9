//! Frozen wrappers.
//!
//! Freezing hides a value from traversal: a [`Frozen`] has no children, so
//! flattening keeps it as a structural position but yields no leaves for
//! it. The wrapper is hashable, which lets frozen values live in the
//! structural token and in hash maps.

use crate::tree_util::is_tree_key_equal;
use crate::{tree_hash, Array, Tree, TreeError, TreeResult, TypeTag};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::debug;

/// A frozen value.
#[derive(Clone, Debug)]
pub enum Frozen {
    /// Any non-array value. Equality is [`is_tree_equal`](crate::is_tree_equal)
    /// with NaN equal to itself; hash is [`tree_hash`].
    Hashable(Box<Tree>),
    /// An array. Equal only with matching shape, dtype and elements;
    /// hashed by its SHA-256 digest.
    Array(Array),
}

impl Frozen {
    /// The wrapped value.
    pub fn to_tree(&self) -> Tree {
        match self {
            Frozen::Hashable(inner) => inner.as_ref().clone(),
            Frozen::Array(a) => Tree::Array(a.clone()),
        }
    }

    /// Unwrap, consuming the wrapper.
    pub fn into_tree(self) -> Tree {
        match self {
            Frozen::Hashable(inner) => *inner,
            Frozen::Array(a) => Tree::Array(a),
        }
    }

    /// Frozen values cannot be called.
    pub fn call(&self, _args: &[Tree]) -> TreeResult<Tree> {
        Err(TreeError::FrozenOperation { op: "__call__" })
    }
}

impl PartialEq for Frozen {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Frozen::Hashable(a), Frozen::Hashable(b)) => is_tree_key_equal(a, b),
            (Frozen::Array(a), Frozen::Array(b)) => a.key_equal(b),
            _ => false,
        }
    }
}

impl Eq for Frozen {}

impl Hash for Frozen {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Frozen::Hashable(inner) => tree_hash(inner).hash(state),
            Frozen::Array(a) => a.digest().hash(state),
        }
    }
}

/// Custom freeze rule for one runtime kind.
pub type FreezeHandler = Arc<dyn Fn(Tree) -> Frozen + Send + Sync>;

static FREEZE_HANDLERS: OnceLock<RwLock<HashMap<TypeTag, FreezeHandler>>> = OnceLock::new();

fn freeze_handlers() -> &'static RwLock<HashMap<TypeTag, FreezeHandler>> {
    FREEZE_HANDLERS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register how values of kind `tag` are frozen.
///
/// Frozen values are never dispatched: freezing stays idempotent whatever
/// is registered.
pub fn def_freeze<F>(tag: TypeTag, handler: F)
where
    F: Fn(Tree) -> Frozen + Send + Sync + 'static,
{
    freeze_handlers()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(tag, Arc::new(handler));
    debug!(?tag, "registered freeze handler");
}

/// Freeze a value. Freezing a frozen value returns it unchanged.
///
/// ```
/// use tirea_treeclass::{freeze, leaves, unfreeze, Tree};
///
/// let frozen = freeze(2.0);
/// assert!(leaves(&frozen, None).is_empty());
/// assert_eq!(freeze(frozen.clone()), frozen);
/// assert_eq!(unfreeze(frozen), Tree::Float(2.0));
/// ```
pub fn freeze(value: impl Into<Tree>) -> Tree {
    let value = value.into();
    if let Tree::Frozen(_) = value {
        return value;
    }
    let handler = freeze_handlers()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&value.type_tag())
        .cloned();
    let frozen = match (handler, value) {
        (Some(handler), value) => handler(value),
        (None, Tree::Array(a)) => Frozen::Array(a),
        (None, value) => Frozen::Hashable(Box::new(value)),
    };
    Tree::Frozen(frozen)
}

/// Remove exactly one frozen layer; other values are returned unchanged.
pub fn unfreeze(value: Tree) -> Tree {
    match value {
        Tree::Frozen(f) => f.into_tree(),
        other => other,
    }
}

/// True if `value` is a frozen wrapper.
pub fn is_frozen(value: &Tree) -> bool {
    matches!(value, Tree::Frozen(_))
}
