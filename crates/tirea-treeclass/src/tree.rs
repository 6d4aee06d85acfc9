//! The dynamic tree value.

use crate::{Array, Frozen, Node, Path, Scalar, Seg, TreeError, TreeResult, TypeKey};
use std::collections::BTreeMap;

/// An owned, arbitrarily nested value.
///
/// Containers and tree class instances are structural nodes; scalars,
/// strings and arrays are leaves. `None` and [`Frozen`] are structural
/// positions that contribute no leaves.
///
/// `PartialEq` is strict native equality (variants must match, arrays must
/// agree on dtype). Use [`is_tree_equal`](crate::is_tree_equal) for
/// structural equality that compares arrays by value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Tree {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Array),
    List(Vec<Tree>),
    Tuple(Vec<Tree>),
    Dict(BTreeMap<String, Tree>),
    Node(Node),
    Frozen(Frozen),
}

/// Runtime kind of a tree value, used as the key of dispatch tables.
///
/// Every tree class gets its own tag through its [`TypeKey`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeTag {
    None,
    Bool,
    Int,
    Float,
    Str,
    Array,
    List,
    Tuple,
    Dict,
    Node(TypeKey),
    Frozen,
}

impl Tree {
    /// Build a tuple.
    pub fn tuple(items: impl IntoIterator<Item = Tree>) -> Tree {
        Tree::Tuple(items.into_iter().collect())
    }

    /// Build a list.
    pub fn list(items: impl IntoIterator<Item = Tree>) -> Tree {
        Tree::List(items.into_iter().collect())
    }

    /// Build a dict from key/value pairs.
    pub fn dict<K, V>(items: impl IntoIterator<Item = (K, V)>) -> Tree
    where
        K: Into<String>,
        V: Into<Tree>,
    {
        Tree::Dict(
            items
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Tree::None => TypeTag::None,
            Tree::Bool(_) => TypeTag::Bool,
            Tree::Int(_) => TypeTag::Int,
            Tree::Float(_) => TypeTag::Float,
            Tree::Str(_) => TypeTag::Str,
            Tree::Array(_) => TypeTag::Array,
            Tree::List(_) => TypeTag::List,
            Tree::Tuple(_) => TypeTag::Tuple,
            Tree::Dict(_) => TypeTag::Dict,
            Tree::Node(n) => TypeTag::Node(n.type_key()),
            Tree::Frozen(_) => TypeTag::Frozen,
        }
    }

    /// Human readable kind for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Tree::None => "NoneType",
            Tree::Bool(_) => "bool",
            Tree::Int(_) => "int",
            Tree::Float(_) => "float",
            Tree::Str(_) => "str",
            Tree::Array(_) => "ndarray",
            Tree::List(_) => "list",
            Tree::Tuple(_) => "tuple",
            Tree::Dict(_) => "dict",
            Tree::Node(_) => "treeclass",
            Tree::Frozen(_) => "frozen",
        }
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Tree::None)
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Tree::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Tree::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float value; integers are widened.
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Tree::Float(f) => Some(*f),
            Tree::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tree::Str(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Tree::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Items of a list or tuple.
    #[inline]
    pub fn as_seq(&self) -> Option<&[Tree]> {
        match self {
            Tree::List(items) | Tree::Tuple(items) => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn as_dict(&self) -> Option<&BTreeMap<String, Tree>> {
        match self {
            Tree::Dict(map) => Some(map),
            _ => None,
        }
    }

    #[inline]
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Tree::Node(n) => Some(n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_node_mut(&mut self) -> Option<&mut Node> {
        match self {
            Tree::Node(n) => Some(n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_frozen(&self) -> Option<&Frozen> {
        match self {
            Tree::Frozen(f) => Some(f),
            _ => None,
        }
    }

    /// Numeric scalar view: bools, ints, floats and 0-d arrays.
    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Tree::Bool(b) => Some(Scalar::Bool(*b)),
            Tree::Int(i) => Some(Scalar::Int(*i)),
            Tree::Float(f) => Some(Scalar::Float(*f)),
            Tree::Array(a) => a.as_scalar(),
            _ => None,
        }
    }

    /// True for values that are always leaves regardless of `is_leaf`.
    pub(crate) fn is_atom(&self) -> bool {
        matches!(
            self,
            Tree::Bool(_) | Tree::Int(_) | Tree::Float(_) | Tree::Str(_) | Tree::Array(_)
        )
    }

    /// Direct child addressed by one path segment.
    ///
    /// Node attributes are returned raw (frozen values stay wrapped).
    pub fn child(&self, seg: &Seg) -> Option<&Tree> {
        match (self, seg) {
            (Tree::List(items) | Tree::Tuple(items), Seg::Index(i)) => items.get(*i),
            (Tree::Dict(map), Seg::Key(k)) => map.get(k),
            (Tree::Node(node), Seg::Key(k)) => node.attr(k),
            _ => None,
        }
    }

    /// Mutable child access. Bypasses the instance lock; callers are
    /// responsible for only using it on copies.
    pub(crate) fn child_mut(&mut self, seg: &Seg) -> Option<&mut Tree> {
        match (self, seg) {
            (Tree::List(items) | Tree::Tuple(items), Seg::Index(i)) => items.get_mut(*i),
            (Tree::Dict(map), Seg::Key(k)) => map.get_mut(k),
            (Tree::Node(node), Seg::Key(k)) => node.attr_mut(k),
            _ => None,
        }
    }

    /// Subtree at `path`.
    pub fn get_path(&self, path: &Path) -> TreeResult<&Tree> {
        let mut current = self;
        for seg in path {
            current = current
                .child(seg)
                .ok_or_else(|| TreeError::attribute_not_found(path.clone()))?;
        }
        Ok(current)
    }

    pub(crate) fn get_path_mut(&mut self, path: &Path) -> TreeResult<&mut Tree> {
        let mut current = self;
        for seg in path {
            current = current
                .child_mut(seg)
                .ok_or_else(|| TreeError::attribute_not_found(path.clone()))?;
        }
        Ok(current)
    }
}

impl From<bool> for Tree {
    fn from(v: bool) -> Self {
        Tree::Bool(v)
    }
}

impl From<i32> for Tree {
    fn from(v: i32) -> Self {
        Tree::Int(i64::from(v))
    }
}

impl From<i64> for Tree {
    fn from(v: i64) -> Self {
        Tree::Int(v)
    }
}

impl From<f64> for Tree {
    fn from(v: f64) -> Self {
        Tree::Float(v)
    }
}

impl From<&str> for Tree {
    fn from(v: &str) -> Self {
        Tree::Str(v.to_owned())
    }
}

impl From<String> for Tree {
    fn from(v: String) -> Self {
        Tree::Str(v)
    }
}

impl From<Scalar> for Tree {
    fn from(v: Scalar) -> Self {
        match v {
            Scalar::Bool(b) => Tree::Bool(b),
            Scalar::Int(i) => Tree::Int(i),
            Scalar::Float(f) => Tree::Float(f),
        }
    }
}

impl From<Array> for Tree {
    fn from(v: Array) -> Self {
        Tree::Array(v)
    }
}

impl From<Node> for Tree {
    fn from(v: Node) -> Self {
        Tree::Node(v)
    }
}

impl From<Frozen> for Tree {
    fn from(v: Frozen) -> Self {
        Tree::Frozen(v)
    }
}

impl From<Vec<Tree>> for Tree {
    fn from(v: Vec<Tree>) -> Self {
        Tree::List(v)
    }
}

impl From<BTreeMap<String, Tree>> for Tree {
    fn from(v: BTreeMap<String, Tree>) -> Self {
        Tree::Dict(v)
    }
}

impl<T: Into<Tree>> From<Option<T>> for Tree {
    fn from(v: Option<T>) -> Self {
        v.map_or(Tree::None, Into::into)
    }
}
