//! Broadcasting map over tree leaves.

use crate::{flatten, structure_of, unflatten, IsLeaf, Tree, TreeError, TreeResult};

/// A function lifted to work leafwise over trees. Build one with
/// [`bcmap`].
pub struct Bcmap<'a, F> {
    func: F,
    is_leaf: IsLeaf<'a>,
}

/// Lift `func` so it maps over the leaves of its first argument.
///
/// Arguments whose structure equals the first argument's are zipped with
/// it leaf by leaf; every other argument is passed unchanged to each call.
/// Results are assembled into the first argument's shape.
///
/// ```
/// use tirea_treeclass::{bcmap, BinaryOp, Tree};
///
/// let add = bcmap(|xs: &[Tree]| xs[0].binary(BinaryOp::Add, &xs[1]));
/// let tree = Tree::list([Tree::from(1), Tree::from(2), Tree::from(3)]);
/// assert_eq!(
///     add.call(&[tree, Tree::Int(1)]).unwrap(),
///     Tree::list([Tree::from(2), Tree::from(3), Tree::from(4)]),
/// );
/// ```
pub fn bcmap<'a, F>(func: F) -> Bcmap<'a, F>
where
    F: Fn(&[Tree]) -> TreeResult<Tree>,
{
    Bcmap {
        func,
        is_leaf: None,
    }
}

impl<'a, F> Bcmap<'a, F>
where
    F: Fn(&[Tree]) -> TreeResult<Tree>,
{
    /// Leaf predicate applied when flattening the first argument.
    pub fn is_leaf(mut self, is_leaf: &'a dyn Fn(&Tree) -> bool) -> Self {
        self.is_leaf = Some(is_leaf);
        self
    }

    /// Call the lifted function.
    ///
    /// Broadcast arguments are not checked up front: an argument that
    /// does not fit a leaf fails inside `func` at that leaf.
    pub fn call(&self, args: &[Tree]) -> TreeResult<Tree> {
        let Some((first, rest)) = args.split_first() else {
            return Err(TreeError::invalid_operation(
                "bcmap needs at least one argument",
            ));
        };
        let (leaves, def) = flatten(first, self.is_leaf);
        let zipped = rest
            .iter()
            .map(|arg| {
                if structure_of(arg, None) == def {
                    def.flatten_up_to(arg).map(Some)
                } else {
                    Ok(None)
                }
            })
            .collect::<TreeResult<Vec<_>>>()?;

        let mut row = Vec::with_capacity(args.len());
        let mut out = Vec::with_capacity(leaves.len());
        for (i, leaf) in leaves.into_iter().enumerate() {
            row.clear();
            row.push(leaf);
            for (arg, items) in rest.iter().zip(&zipped) {
                row.push(match items {
                    Some(items) => items[i].clone(),
                    None => arg.clone(),
                });
            }
            out.push((self.func)(&row)?);
        }
        unflatten(&def, out)
    }
}
