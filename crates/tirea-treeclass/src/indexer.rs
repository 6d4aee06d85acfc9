//! The `.at` indexed update engine.
//!
//! `tree.at(selector)` picks a subset of leaves, either by path (every
//! leaf whose trace starts with the path) or by a boolean mask tree, and
//! returns an [`At`] that reads or rewrites exactly that subset. Every
//! operation returns a new tree; the input is never modified.
//!
//! ```
//! use tirea_treeclass::{leaves, tree_compare, CompareOp, Tree};
//!
//! let tree = Tree::list([Tree::from(-1), Tree::from(2), Tree::from(-3)]);
//! let negative = tree_compare(&tree, CompareOp::Lt, &Tree::Int(0), None).unwrap();
//! let out = tree.at(negative).unwrap().set(0).unwrap();
//! assert_eq!(leaves(&out, None), vec![Tree::Int(0), Tree::Int(2), Tree::Int(0)]);
//! ```

use crate::mutable::with_mutable_in_place;
use crate::{
    flatten_with_trace, is_frozen, parse_path, unflatten, Args, Array, BinaryOp, DType, IsLeaf,
    Path, Scalar, Seg, Tree, TreeDef, TreeError, TreeResult,
};
use std::fmt;
use tracing::trace;

/// What `.at` should select.
#[derive(Clone, Debug, PartialEq)]
pub enum Selector {
    /// Leaves whose trace starts with this path.
    Path(Path),
    /// Leaves where this boolean tree is true.
    Mask(Tree),
    /// Every leaf.
    All,
}

impl From<&str> for Selector {
    fn from(path: &str) -> Self {
        Selector::Path(parse_path(path))
    }
}

impl From<String> for Selector {
    fn from(path: String) -> Self {
        Selector::Path(parse_path(&path))
    }
}

impl From<usize> for Selector {
    fn from(index: usize) -> Self {
        Selector::Path(Path::root().index(index))
    }
}

impl From<Path> for Selector {
    fn from(path: Path) -> Self {
        Selector::Path(path)
    }
}

/// Strings and non-negative integers are paths; anything else is a mask
/// candidate.
impl From<Tree> for Selector {
    fn from(tree: Tree) -> Self {
        match tree {
            Tree::Str(path) => Selector::Path(parse_path(&path)),
            Tree::Int(i) if i >= 0 => Selector::Path(Path::root().index(i as usize)),
            other => Selector::Mask(other),
        }
    }
}

/// Resolved selection.
#[derive(Clone, Debug)]
enum Where {
    All,
    Path(Path),
    Mask(Tree),
    And(Box<Where>, Box<Where>),
}

impl fmt::Display for Where {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Where::All => f.write_str("..."),
            Where::Path(p) => write!(f, "'{p}'"),
            Where::Mask(_) => f.write_str("<mask>"),
            Where::And(a, b) => write!(f, "{a} & {b}"),
        }
    }
}

/// Selection state of one leaf.
#[derive(Clone, Debug)]
enum Pick {
    Scalar(bool),
    Array(Array),
}

impl Pick {
    fn from_mask_leaf(leaf: &Tree) -> TreeResult<Pick> {
        match leaf {
            Tree::Bool(b) => Ok(Pick::Scalar(*b)),
            Tree::None => Ok(Pick::Scalar(false)),
            Tree::Array(a) if a.dtype() == DType::Bool => Ok(Pick::Array(a.clone())),
            other => Err(TreeError::NonBooleanMask {
                found: other.to_string(),
            }),
        }
    }

    /// Selected at every position.
    fn is_true(&self) -> bool {
        match self {
            Pick::Scalar(b) => *b,
            Pick::Array(m) => !m.is_empty() && m.all(),
        }
    }

    /// Selected at some position.
    fn any(&self) -> bool {
        match self {
            Pick::Scalar(b) => *b,
            Pick::Array(m) => m.any(),
        }
    }

    fn condition(&self) -> Array {
        match self {
            Pick::Scalar(b) => Array::scalar(*b),
            Pick::Array(m) => m.clone(),
        }
    }

    fn and(self, other: Pick) -> TreeResult<Pick> {
        Ok(match (self, other) {
            (Pick::Scalar(a), Pick::Scalar(b)) => Pick::Scalar(a && b),
            (Pick::Scalar(s), Pick::Array(m)) | (Pick::Array(m), Pick::Scalar(s)) => {
                if s {
                    Pick::Array(m)
                } else {
                    Pick::Array(Array::full(m.shape(), false))
                }
            }
            (Pick::Array(a), Pick::Array(b)) => Pick::Array(a.logical_and(&b)?),
        })
    }

    fn into_tree(self) -> Tree {
        match self {
            Pick::Scalar(b) => Tree::Bool(b),
            Pick::Array(m) => Tree::Array(m),
        }
    }
}

impl Where {
    fn picks(&self, traced: &[(Path, Tree)], def: &TreeDef) -> TreeResult<Vec<Pick>> {
        match self {
            Where::All => Ok(vec![Pick::Scalar(true); traced.len()]),
            Where::Path(path) => Ok(traced
                .iter()
                .map(|(trace, _)| Pick::Scalar(path.is_prefix_of(trace)))
                .collect()),
            Where::Mask(mask) => def
                .flatten_up_to(mask)?
                .iter()
                .map(Pick::from_mask_leaf)
                .collect(),
            Where::And(a, b) => a
                .picks(traced, def)?
                .into_iter()
                .zip(b.picks(traced, def)?)
                .map(|(x, y)| x.and(y))
                .collect(),
        }
    }
}

fn unsupported(tree: &Tree, found: &Tree) -> TreeError {
    TreeError::UnsupportedSelector {
        message: format!(
            "indexing a {} with a {} is not supported.\n\
             Supported selectors:\n\
             >>> tree.at(\"field_name\")?.get()\n\
             >>> tree.at(tree_compare(&tree, CompareOp::Gt, &Tree::Int(0), None)?)?.get()\n\
             >>> tree.at(Selector::All)?.get()",
            tree.type_name(),
            found.type_name()
        ),
    }
}

fn max_depth(tree: &Tree) -> usize {
    let stop = |t: &Tree| is_frozen(t) || t.is_none();
    let (traced, _) = flatten_with_trace(tree, Some(&stop));
    traced.iter().map(|(p, _)| p.len()).max().unwrap_or(0)
}

fn is_method_path(tree: &Tree, path: &Path) -> bool {
    let (Some(parent), Some(Seg::Key(name))) = (path.parent(), path.last()) else {
        return false;
    };
    tree.get_path(&parent)
        .ok()
        .and_then(Tree::as_node)
        .is_some_and(|node| node.class().method(name).is_some())
}

fn validate_path(tree: &Tree, path: &Path) -> TreeResult<()> {
    if tree.get_path(path).is_ok() || is_method_path(tree, path) {
        return Ok(());
    }
    let depth = max_depth(tree);
    if path.len() > depth {
        return Err(TreeError::PathOutOfBounds {
            path: path.clone(),
            max_depth: depth,
        });
    }
    Err(TreeError::attribute_not_found(path.clone()))
}

fn resolve(tree: &Tree, selector: Selector) -> TreeResult<Where> {
    match selector {
        Selector::Path(path) => {
            validate_path(tree, &path)?;
            Ok(Where::Path(path))
        }
        Selector::Mask(mask) if mask.type_tag() == tree.type_tag() => Ok(Where::Mask(mask)),
        Selector::Mask(other) => Err(unsupported(tree, &other)),
        Selector::All => Ok(Where::All),
    }
}

fn scalar_value(value: &Tree) -> Option<Scalar> {
    match value {
        Tree::Bool(_) | Tree::Int(_) | Tree::Float(_) => value.as_scalar(),
        _ => None,
    }
}

fn get_leaf(leaf: &Tree, pick: &Pick) -> TreeResult<Tree> {
    match leaf {
        Tree::Array(a) => Ok(Tree::Array(match pick {
            Pick::Scalar(true) => a.clone(),
            Pick::Scalar(false) => Array::empty(a.dtype()),
            Pick::Array(m) => a.boolean_index(m)?,
        })),
        _ if pick.is_true() => Ok(leaf.clone()),
        _ => Ok(Tree::None),
    }
}

fn set_leaf(leaf: &Tree, pick: &Pick, value: &Tree) -> TreeResult<Tree> {
    match leaf {
        Tree::Array(a) => match scalar_value(value) {
            Some(s) => Ok(Tree::Array(Array::select(
                &pick.condition(),
                &Array::scalar(s),
                a,
            )?)),
            None if pick.is_true() => Ok(value.clone()),
            None => Ok(leaf.clone()),
        },
        _ if matches!(pick, Pick::Scalar(true)) => Ok(value.clone()),
        _ => Ok(leaf.clone()),
    }
}

fn apply_leaf<F>(leaf: &Tree, pick: &Pick, f: &mut F) -> TreeResult<Tree>
where
    F: FnMut(&Tree) -> TreeResult<Tree>,
{
    if !pick.any() {
        return Ok(leaf.clone());
    }
    let value = f(leaf)?;
    if let (Tree::Array(a), Tree::Array(v)) = (leaf, &value) {
        if v.shape() == a.shape() {
            return Ok(Tree::Array(Array::select(&pick.condition(), v, a)?));
        }
    }
    set_leaf(leaf, pick, &value)
}

/// A selection of leaves inside a tree. Created by [`Tree::at`].
pub struct At<'a> {
    tree: &'a Tree,
    selection: Where,
    is_leaf: IsLeaf<'a>,
}

impl Tree {
    /// Select leaves for reading or functional update.
    ///
    /// Resolution, first match wins: a path; a mask of the same top-level
    /// kind as this tree (the same class for instances); [`Selector::All`].
    /// Anything else fails with [`TreeError::UnsupportedSelector`].
    pub fn at(&self, selector: impl Into<Selector>) -> TreeResult<At<'_>> {
        let selection = resolve(self, selector.into())?;
        trace!(selection = %selection, "at");
        Ok(At {
            tree: self,
            selection,
            is_leaf: None,
        })
    }
}

impl<'a> At<'a> {
    /// Leaf predicate used by every operation on this selection.
    pub fn is_leaf(mut self, is_leaf: &'a dyn Fn(&Tree) -> bool) -> Self {
        self.is_leaf = Some(is_leaf);
        self
    }

    /// Narrow the selection.
    ///
    /// Two paths concatenate. A mask combined with anything is ANDed
    /// leafwise with it. [`Selector::All`] leaves the selection unchanged.
    pub fn at(self, selector: impl Into<Selector>) -> TreeResult<At<'a>> {
        let selection = match (self.selection, selector.into()) {
            (current, Selector::All) => current,
            (Where::Path(base), Selector::Path(next)) => {
                let subtree = self.tree.get_path(&base)?;
                validate_path(subtree, &next).map_err(|e| e.with_prefix(&base))?;
                Where::Path(base.join(&next))
            }
            (Where::All, next) => resolve(self.tree, next)?,
            (current, next) => {
                Where::And(Box::new(current), Box::new(resolve(self.tree, next)?))
            }
        };
        trace!(selection = %selection, "at");
        Ok(At {
            tree: self.tree,
            selection,
            is_leaf: self.is_leaf,
        })
    }

    fn picks(&self) -> TreeResult<(Vec<(Path, Tree)>, TreeDef, Vec<Pick>)> {
        let (traced, def) = flatten_with_trace(self.tree, self.is_leaf);
        let picks = self.selection.picks(&traced, &def)?;
        Ok((traced, def, picks))
    }

    /// The selection as a boolean tree shaped like the tree.
    pub fn mask(&self) -> TreeResult<Tree> {
        let (_, def, picks) = self.picks()?;
        unflatten(&def, picks.into_iter().map(Pick::into_tree).collect())
    }

    /// Read the selection, keeping the tree's structure.
    ///
    /// Unselected leaves become `None`. Array leaves under a mask are
    /// reduced to their selected elements, which changes their shape.
    pub fn get(&self) -> TreeResult<Tree> {
        trace!(selection = %self.selection, "get");
        let (traced, def, picks) = self.picks()?;
        let out = match &self.selection {
            Where::Path(path) => traced
                .into_iter()
                .map(|(trace, leaf)| {
                    if path.is_prefix_of(&trace) {
                        leaf
                    } else {
                        Tree::None
                    }
                })
                .collect(),
            _ => traced
                .iter()
                .zip(&picks)
                .map(|((_, leaf), pick)| get_leaf(leaf, pick))
                .collect::<TreeResult<Vec<_>>>()?,
        };
        unflatten(&def, out)
    }

    /// The subtree a path selection points at.
    ///
    /// For mask selections this is the same as [`At::get`].
    pub fn value(&self) -> TreeResult<Tree> {
        match &self.selection {
            Where::Path(path) => self.tree.get_path(path).cloned(),
            _ => self.get(),
        }
    }

    /// Replace the selected leaves with `value`.
    ///
    /// A value with the same kind and structure as the tree is applied
    /// leaf by leaf, so the output of [`At::get`] can be written back.
    /// Otherwise it is broadcast: array leaves take a scalar elementwise,
    /// and take a non-scalar only when fully selected; other leaves are
    /// replaced when selected. Path selections follow the same rules; a
    /// path that points at `None` holds no leaves and is replaced outright.
    pub fn set(&self, value: impl Into<Tree>) -> TreeResult<Tree> {
        let value = value.into();
        trace!(selection = %self.selection, "set");
        if let Where::Path(path) = &self.selection {
            if self.tree.get_path(path)?.is_none() {
                let mut out = self.tree.clone();
                *out.get_path_mut(path)? = value;
                return Ok(out);
            }
        }
        let (traced, def, picks) = self.picks()?;
        let leafwise = if value.type_tag() == self.tree.type_tag() {
            def.flatten_up_to(&value).ok()
        } else {
            None
        };
        let out = if let Some(values) = leafwise {
            traced
                .iter()
                .zip(&picks)
                .zip(&values)
                .map(|(((_, leaf), pick), v)| set_leaf(leaf, pick, v))
                .collect::<TreeResult<Vec<_>>>()?
        } else {
            traced
                .iter()
                .zip(&picks)
                .map(|((_, leaf), pick)| set_leaf(leaf, pick, &value))
                .collect::<TreeResult<Vec<_>>>()?
        };
        unflatten(&def, out)
    }

    /// Replace each selected leaf with `f(leaf)`.
    ///
    /// `f` only runs on leaves with at least one selected position. Array
    /// results of the leaf's shape and scalar results are merged
    /// elementwise; anything else replaces a fully selected leaf.
    pub fn apply<F>(&self, mut f: F) -> TreeResult<Tree>
    where
        F: FnMut(&Tree) -> TreeResult<Tree>,
    {
        trace!(selection = %self.selection, "apply");
        let (traced, def, picks) = self.picks()?;
        let out = traced
            .iter()
            .zip(&picks)
            .map(|((_, leaf), pick)| apply_leaf(leaf, pick, &mut f))
            .collect::<TreeResult<Vec<_>>>()?;
        unflatten(&def, out)
    }

    /// Left fold over the selected parts of the selected leaves.
    ///
    /// Without an initializer the first selected leaf is the seed; with no
    /// selected leaves and no initializer this fails with
    /// [`TreeError::EmptyReduce`].
    pub fn reduce<F>(&self, mut f: F, initializer: Option<Tree>) -> TreeResult<Tree>
    where
        F: FnMut(Tree, Tree) -> TreeResult<Tree>,
    {
        trace!(selection = %self.selection, "reduce");
        let (traced, _, picks) = self.picks()?;
        let mut selected = Vec::new();
        for ((_, leaf), pick) in traced.iter().zip(&picks) {
            if pick.any() && (leaf.as_array().is_some() || pick.is_true()) {
                selected.push(get_leaf(leaf, pick)?);
            }
        }
        let mut items = selected.into_iter();
        let seed = match initializer {
            Some(init) => init,
            None => items.next().ok_or(TreeError::EmptyReduce)?,
        };
        items.try_fold(seed, &mut f)
    }

    /// Call the method named by the last path segment.
    ///
    /// The earlier segments address the receiver. The method runs on an
    /// unlocked copy of the tree; the result is returned with the updated,
    /// re-locked copy. The original tree is not modified.
    pub fn call(&self, args: Args) -> TreeResult<(Tree, Tree)> {
        let Where::Path(path) = &self.selection else {
            return Err(TreeError::invalid_operation(
                "method calls need a path selector",
            ));
        };
        let (Some(receiver), Some(Seg::Key(name))) = (path.parent(), path.last()) else {
            return Err(TreeError::invalid_operation(format!(
                "path '{path}' does not name a method"
            )));
        };
        trace!(path = %path, "call");
        let mut copy = self.tree.clone();
        let result = with_mutable_in_place(&mut copy, |tree| {
            let target = tree.get_path_mut(&receiver)?;
            let found = target.type_name();
            match target.as_node_mut() {
                Some(node) => node.call_mut(name, args),
                None => Err(TreeError::not_a_node(receiver.clone(), found)),
            }
        })?;
        Ok((result, copy))
    }

    fn apply_op(&self, op: BinaryOp, value: Tree) -> TreeResult<Tree> {
        self.apply(|leaf| leaf.binary(op, &value))
    }

    pub fn add(&self, value: impl Into<Tree>) -> TreeResult<Tree> {
        self.apply_op(BinaryOp::Add, value.into())
    }

    pub fn subtract(&self, value: impl Into<Tree>) -> TreeResult<Tree> {
        self.apply_op(BinaryOp::Sub, value.into())
    }

    pub fn multiply(&self, value: impl Into<Tree>) -> TreeResult<Tree> {
        self.apply_op(BinaryOp::Mul, value.into())
    }

    pub fn divide(&self, value: impl Into<Tree>) -> TreeResult<Tree> {
        self.apply_op(BinaryOp::Div, value.into())
    }

    pub fn power(&self, value: impl Into<Tree>) -> TreeResult<Tree> {
        self.apply_op(BinaryOp::Pow, value.into())
    }

    pub fn min(&self, value: impl Into<Tree>) -> TreeResult<Tree> {
        self.apply_op(BinaryOp::Min, value.into())
    }

    pub fn max(&self, value: impl Into<Tree>) -> TreeResult<Tree> {
        self.apply_op(BinaryOp::Max, value.into())
    }
}

impl fmt::Debug for At<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "At(where={})", self.selection)
    }
}
