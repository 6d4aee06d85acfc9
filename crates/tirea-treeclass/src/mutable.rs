//! Scoped mutability for locked instances.
//!
//! Instances are locked once constructed. A [`MutableScope`] unlocks every
//! instance in a tree for as long as the guard lives and locks them all
//! again when it drops, including on early return and unwinding.

use crate::{Tree, TreeResult};
use std::ops::{Deref, DerefMut};
use tracing::trace;

/// Drop guard that keeps a tree's instances unlocked.
///
/// ```
/// use tirea_treeclass::{Args, Field, MutableScope, Tree, TreeClass};
///
/// let class = TreeClass::builder("Counter")
///     .field(Field::new("count").default(0))
///     .build()
///     .unwrap();
/// let mut tree = class.construct(Args::new()).unwrap();
/// {
///     let mut scope = MutableScope::new(&mut tree);
///     scope.as_node_mut().unwrap().set_attr("count", 1).unwrap();
/// }
/// assert_eq!(tree.as_node().unwrap().get("count").unwrap(), Tree::Int(1));
/// assert!(tree.as_node().unwrap().is_locked());
/// ```
pub struct MutableScope<'a> {
    tree: &'a mut Tree,
}

impl<'a> MutableScope<'a> {
    pub fn new(tree: &'a mut Tree) -> Self {
        set_locked(tree, false);
        trace!(kind = tree.type_name(), "entered mutable scope");
        Self { tree }
    }
}

impl Deref for MutableScope<'_> {
    type Target = Tree;

    fn deref(&self) -> &Tree {
        self.tree
    }
}

impl DerefMut for MutableScope<'_> {
    fn deref_mut(&mut self) -> &mut Tree {
        self.tree
    }
}

impl Drop for MutableScope<'_> {
    fn drop(&mut self) {
        set_locked(self.tree, true);
        trace!("left mutable scope");
    }
}

/// Set the lock flag of every instance in `tree`. Frozen values are
/// opaque and left alone.
pub(crate) fn set_locked(tree: &mut Tree, locked: bool) {
    match tree {
        Tree::List(items) | Tree::Tuple(items) => {
            for item in items {
                set_locked(item, locked);
            }
        }
        Tree::Dict(map) => {
            for value in map.values_mut() {
                set_locked(value, locked);
            }
        }
        Tree::Node(node) => {
            node.set_locked(locked);
            let names: Vec<String> = node.attrs().keys().cloned().collect();
            for name in names {
                if let Some(value) = node.attr_mut(&name) {
                    set_locked(value, locked);
                }
            }
        }
        _ => {}
    }
}

/// Run `f` on an unlocked copy of `tree` and return its result with the
/// re-locked copy. The original is untouched.
pub fn with_mutable<R, F>(tree: &Tree, f: F) -> TreeResult<(R, Tree)>
where
    F: FnOnce(&mut Tree) -> TreeResult<R>,
{
    let mut copy = tree.clone();
    let result = with_mutable_in_place(&mut copy, f)?;
    Ok((result, copy))
}

/// Run `f` on `tree` with its instances unlocked. The lock is restored
/// whether `f` succeeds, fails or panics.
pub fn with_mutable_in_place<R, F>(tree: &mut Tree, f: F) -> TreeResult<R>
where
    F: FnOnce(&mut Tree) -> TreeResult<R>,
{
    let mut scope = MutableScope::new(tree);
    let result = f(&mut *scope);
    drop(scope);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{freeze, leaves, Args, Field, TreeClass, TreeError};
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn nested() -> Tree {
        let inner = TreeClass::builder("Inner")
            .field(Field::new("value").default(3))
            .build()
            .unwrap();
        let outer = TreeClass::builder("Outer")
            .field(Field::new("inner"))
            .build()
            .unwrap();
        let inner = inner.construct(Args::new()).unwrap();
        outer.construct(Args::new().arg(inner)).unwrap()
    }

    fn all_locked(tree: &Tree) -> bool {
        match tree {
            Tree::Node(n) => n.is_locked() && n.attrs().values().all(all_locked),
            Tree::List(items) | Tree::Tuple(items) => items.iter().all(all_locked),
            Tree::Dict(map) => map.values().all(all_locked),
            _ => true,
        }
    }

    #[test]
    fn test_scope_unlocks_nested_and_relocks() {
        let mut tree = nested();
        {
            let mut scope = MutableScope::new(&mut tree);
            let inner = scope
                .as_node_mut()
                .and_then(|n| n.attr_mut("inner"))
                .and_then(Tree::as_node_mut)
                .unwrap();
            inner.set_attr("value", 9).unwrap();
        }
        assert!(all_locked(&tree));
        assert_eq!(leaves(&tree, None), vec![Tree::Int(9)]);
    }

    #[test]
    fn test_with_mutable_leaves_original_untouched() {
        let tree = nested();
        let (old, updated) = with_mutable(&tree, |t| {
            let node = t.as_node_mut().ok_or_else(|| TreeError::invalid_operation("no node"))?;
            node.set_attr("extra", 1)?;
            Ok(node.attr("inner").cloned())
        })
        .unwrap();
        assert!(old.is_some());
        assert!(tree.as_node().unwrap().attr("extra").is_none());
        assert_eq!(
            updated.as_node().unwrap().attr("extra"),
            Some(&Tree::Int(1))
        );
        assert!(all_locked(&updated));
    }

    #[test]
    fn test_lock_restored_on_error() {
        let mut tree = nested();
        let err = with_mutable_in_place(&mut tree, |t| {
            t.as_node_mut().unwrap().set_attr("extra", 1)?;
            Err::<(), _>(TreeError::invalid_value("boom"))
        })
        .unwrap_err();
        assert!(matches!(err, TreeError::InvalidValue { .. }));
        assert!(all_locked(&tree));

        let err = tree.as_node_mut().unwrap().set_attr("extra", 2).unwrap_err();
        assert!(err.is_immutable());
    }

    #[test]
    fn test_lock_restored_on_panic() {
        let mut tree = nested();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _scope = MutableScope::new(&mut tree);
            panic!("inside scope");
        }));
        assert!(outcome.is_err());
        assert!(all_locked(&tree));
    }

    #[test]
    fn test_frozen_subtrees_are_not_touched() {
        let frozen = freeze(nested());
        let mut tree = Tree::list([frozen.clone()]);
        set_locked(&mut tree, false);
        assert_eq!(tree, Tree::list([frozen]));
        let Tree::List(items) = &tree else {
            panic!("expected list");
        };
        let inner = items[0].as_frozen().unwrap().to_tree();
        assert!(inner.as_node().unwrap().is_locked());
    }
}
