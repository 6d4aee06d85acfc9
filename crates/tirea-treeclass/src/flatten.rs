//! Flatten/unflatten and structural tokens.
//!
//! `flatten` walks a tree depth-first and returns its leaves in order plus
//! a [`TreeDef`] describing everything else. Containers recurse into their
//! items, tree class instances into the children their codec exposes.
//! `None` and frozen values are structural positions with no leaves.

use crate::registry::{codec_for, NodeAux};
use crate::{Frozen, Path, Seg, Tree, TreeError, TreeResult};
use std::collections::BTreeMap;

/// Optional predicate that stops descent: values for which it returns
/// true are treated as leaves.
pub type IsLeaf<'a> = Option<&'a dyn Fn(&Tree) -> bool>;

/// Structural token of a tree. Two trees with equal tokens have the same
/// shape and static data.
#[derive(Clone, Debug, PartialEq)]
pub enum TreeDef {
    Leaf,
    None,
    List(Vec<TreeDef>),
    Tuple(Vec<TreeDef>),
    Dict(Vec<(String, TreeDef)>),
    Node(NodeAux, Vec<TreeDef>),
    Frozen(Frozen),
}

impl TreeDef {
    /// Number of leaves a tree with this structure has.
    pub fn num_leaves(&self) -> usize {
        match self {
            TreeDef::Leaf => 1,
            TreeDef::None | TreeDef::Frozen(_) => 0,
            TreeDef::List(items) | TreeDef::Tuple(items) | TreeDef::Node(_, items) => {
                items.iter().map(TreeDef::num_leaves).sum()
            }
            TreeDef::Dict(items) => items.iter().map(|(_, d)| d.num_leaves()).sum(),
        }
    }

    /// Flatten `tree` only as deep as this structure.
    ///
    /// Where this structure has a leaf, the whole corresponding subtree of
    /// `tree` is returned as one item. Positions with no leaves (`None`,
    /// frozen) accept anything and contribute nothing.
    pub fn flatten_up_to(&self, tree: &Tree) -> TreeResult<Vec<Tree>> {
        let mut out = Vec::with_capacity(self.num_leaves());
        self.collect_up_to(tree, &mut out)?;
        Ok(out)
    }

    fn collect_up_to(&self, tree: &Tree, out: &mut Vec<Tree>) -> TreeResult<()> {
        match (self, tree) {
            (TreeDef::Leaf, _) => out.push(tree.clone()),
            (TreeDef::None | TreeDef::Frozen(_), _) => {}
            (TreeDef::List(defs), Tree::List(items)) | (TreeDef::Tuple(defs), Tree::Tuple(items))
                if defs.len() == items.len() =>
            {
                for (def, item) in defs.iter().zip(items) {
                    def.collect_up_to(item, out)?;
                }
            }
            (TreeDef::Dict(defs), Tree::Dict(map))
                if defs.len() == map.len() && defs.iter().all(|(k, _)| map.contains_key(k)) =>
            {
                for (key, def) in defs {
                    if let Some(item) = map.get(key) {
                        def.collect_up_to(item, out)?;
                    }
                }
            }
            (TreeDef::Node(aux, defs), Tree::Node(node))
                if aux.class.type_key() == node.type_key() =>
            {
                let (children, _) = codec_for(node.type_key()).decompose(node);
                if children.len() != defs.len() {
                    return Err(self.mismatch(tree));
                }
                for (def, child) in defs.iter().zip(&children) {
                    def.collect_up_to(child, out)?;
                }
            }
            _ => return Err(self.mismatch(tree)),
        }
        Ok(())
    }

    fn mismatch(&self, tree: &Tree) -> TreeError {
        TreeError::structure_mismatch(self.describe(), tree.type_name())
    }

    /// Short description used in error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            TreeDef::Leaf => "leaf".into(),
            TreeDef::None => "None".into(),
            TreeDef::List(items) => format!("list of {}", items.len()),
            TreeDef::Tuple(items) => format!("tuple of {}", items.len()),
            TreeDef::Dict(items) => {
                let keys: Vec<&str> = items.iter().map(|(k, _)| k.as_str()).collect();
                format!("dict with keys {keys:?}")
            }
            TreeDef::Node(aux, _) => aux.class.name().to_owned(),
            TreeDef::Frozen(_) => "frozen".into(),
        }
    }
}

fn walk<F>(tree: &Tree, is_leaf: IsLeaf<'_>, path: &mut Path, sink: &mut F) -> TreeDef
where
    F: FnMut(&Path, &Tree),
{
    if is_leaf.is_some_and(|f| f(tree)) {
        sink(path, tree);
        return TreeDef::Leaf;
    }
    match tree {
        Tree::None => TreeDef::None,
        Tree::Frozen(f) => TreeDef::Frozen(f.clone()),
        Tree::List(items) => TreeDef::List(walk_seq(items, is_leaf, path, sink)),
        Tree::Tuple(items) => TreeDef::Tuple(walk_seq(items, is_leaf, path, sink)),
        Tree::Dict(map) => TreeDef::Dict(
            map.iter()
                .map(|(k, v)| {
                    path.push(Seg::key(k.as_str()));
                    let def = walk(v, is_leaf, path, sink);
                    path.pop();
                    (k.clone(), def)
                })
                .collect(),
        ),
        Tree::Node(node) => {
            let (children, aux) = codec_for(node.type_key()).decompose(node);
            let defs = aux
                .names
                .iter()
                .zip(&children)
                .map(|(name, child)| {
                    path.push(Seg::key(name.as_str()));
                    let def = walk(child, is_leaf, path, sink);
                    path.pop();
                    def
                })
                .collect();
            TreeDef::Node(aux, defs)
        }
        Tree::Bool(_) | Tree::Int(_) | Tree::Float(_) | Tree::Str(_) | Tree::Array(_) => {
            sink(path, tree);
            TreeDef::Leaf
        }
    }
}

fn walk_seq<F>(items: &[Tree], is_leaf: IsLeaf<'_>, path: &mut Path, sink: &mut F) -> Vec<TreeDef>
where
    F: FnMut(&Path, &Tree),
{
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            path.push(Seg::Index(i));
            let def = walk(item, is_leaf, path, sink);
            path.pop();
            def
        })
        .collect()
}

/// Leaves in depth-first order and the structure of `tree`.
pub fn flatten(tree: &Tree, is_leaf: IsLeaf<'_>) -> (Vec<Tree>, TreeDef) {
    let mut leaves = Vec::new();
    let def = walk(tree, is_leaf, &mut Path::root(), &mut |_: &Path, leaf: &Tree| {
        leaves.push(leaf.clone())
    });
    (leaves, def)
}

/// Like [`flatten`] but pairs every leaf with its trace.
pub fn flatten_with_trace(tree: &Tree, is_leaf: IsLeaf<'_>) -> (Vec<(Path, Tree)>, TreeDef) {
    let mut leaves = Vec::new();
    let def = walk(tree, is_leaf, &mut Path::root(), &mut |path: &Path, leaf: &Tree| {
        leaves.push((path.clone(), leaf.clone()))
    });
    (leaves, def)
}

/// Leaves of `tree` in depth-first order.
pub fn leaves(tree: &Tree, is_leaf: IsLeaf<'_>) -> Vec<Tree> {
    flatten(tree, is_leaf).0
}

/// Structure of `tree` without collecting leaves.
pub fn structure_of(tree: &Tree, is_leaf: IsLeaf<'_>) -> TreeDef {
    walk(tree, is_leaf, &mut Path::root(), &mut |_: &Path, _: &Tree| {})
}

/// Rebuild a tree from its structure and leaves.
pub fn unflatten(def: &TreeDef, leaves: Vec<Tree>) -> TreeResult<Tree> {
    let expected = def.num_leaves();
    if leaves.len() != expected {
        return Err(TreeError::structure_mismatch(
            format!("{expected} leaves"),
            format!("{} leaves", leaves.len()),
        ));
    }
    let mut iter = leaves.into_iter();
    build(def, &mut iter)
}

fn build(def: &TreeDef, leaves: &mut std::vec::IntoIter<Tree>) -> TreeResult<Tree> {
    Ok(match def {
        TreeDef::Leaf => leaves
            .next()
            .ok_or_else(|| TreeError::structure_mismatch("a leaf", "no leaves left"))?,
        TreeDef::None => Tree::None,
        TreeDef::Frozen(f) => Tree::Frozen(f.clone()),
        TreeDef::List(defs) => Tree::List(build_seq(defs, leaves)?),
        TreeDef::Tuple(defs) => Tree::Tuple(build_seq(defs, leaves)?),
        TreeDef::Dict(defs) => Tree::Dict(
            defs.iter()
                .map(|(k, d)| Ok((k.clone(), build(d, leaves)?)))
                .collect::<TreeResult<BTreeMap<_, _>>>()?,
        ),
        TreeDef::Node(aux, defs) => {
            let children = build_seq(defs, leaves)?;
            Tree::Node(codec_for(aux.class.type_key()).recompose(aux, children)?)
        }
    })
}

fn build_seq(defs: &[TreeDef], leaves: &mut std::vec::IntoIter<Tree>) -> TreeResult<Vec<Tree>> {
    defs.iter().map(|d| build(d, leaves)).collect()
}

/// Map `f` over the leaves of `tree`.
///
/// Each tree in `rest` is flattened up to the structure of `tree`, and `f`
/// receives the matching items alongside each leaf.
pub fn tree_map<F>(tree: &Tree, rest: &[&Tree], is_leaf: IsLeaf<'_>, mut f: F) -> TreeResult<Tree>
where
    F: FnMut(&Tree, &[Tree]) -> TreeResult<Tree>,
{
    let (leaves, def) = flatten(tree, is_leaf);
    let others = rest
        .iter()
        .map(|other| def.flatten_up_to(other))
        .collect::<TreeResult<Vec<_>>>()?;
    let mut row = Vec::with_capacity(others.len());
    let mut mapped = Vec::with_capacity(leaves.len());
    for (i, leaf) in leaves.iter().enumerate() {
        row.clear();
        row.extend(others.iter().map(|o| o[i].clone()));
        mapped.push(f(leaf, &row)?);
    }
    unflatten(&def, mapped)
}
