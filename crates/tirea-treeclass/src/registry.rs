//! Node type registry: how tree class instances decompose into children.
//!
//! Every tree class registers a [`NodeCodec`] under its [`TypeKey`] when it
//! is built. Flattening looks the codec up to split an instance into its
//! children plus static [`NodeAux`] data, and unflattening uses it to
//! rebuild the instance without running the constructor.

use crate::{Field, Node, Tree, TreeClass, TreeError, TreeResult};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::debug;

/// Process-unique identity of a tree class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeKey(u64);

impl TypeKey {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TypeKey(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Static part of a decomposed instance.
///
/// Together with the children (in `names` order) this is enough to rebuild
/// an equivalent instance.
#[derive(Clone, Debug)]
pub struct NodeAux {
    pub class: Arc<TreeClass>,
    /// Child attribute names; also the trace segments of the children.
    pub names: Vec<String>,
    /// Attributes that are not children.
    pub statics: BTreeMap<String, Tree>,
    pub dynamic_fields: Vec<Field>,
    pub locked: bool,
}

/// Structural equality. The lock flag is not part of the structure.
impl PartialEq for NodeAux {
    fn eq(&self, other: &Self) -> bool {
        self.class.type_key() == other.class.type_key()
            && self.names == other.names
            && self.statics == other.statics
            && self
                .dynamic_fields
                .iter()
                .map(Field::name)
                .eq(other.dynamic_fields.iter().map(Field::name))
    }
}

/// Decompose/recompose pair for a node type.
pub trait NodeCodec: Send + Sync {
    /// Split an instance into ordered children and static data.
    fn decompose(&self, node: &Node) -> (Vec<Tree>, NodeAux);

    /// Rebuild an instance. Must not run constructors, callbacks or
    /// validators.
    fn recompose(&self, aux: &NodeAux, children: Vec<Tree>) -> TreeResult<Node>;
}

/// Default codec: field values are children, everything else is static.
#[derive(Clone, Copy, Debug, Default)]
pub struct FieldCodec;

impl NodeCodec for FieldCodec {
    fn decompose(&self, node: &Node) -> (Vec<Tree>, NodeAux) {
        let mut statics = node.attrs().clone();
        let mut names = Vec::new();
        let mut children = Vec::new();
        for name in node.field_names() {
            if let Some(value) = statics.remove(name) {
                names.push(name.to_owned());
                children.push(value);
            }
        }
        let aux = NodeAux {
            class: Arc::clone(node.class()),
            names,
            statics,
            dynamic_fields: node.dynamic_fields().to_vec(),
            locked: node.is_locked(),
        };
        (children, aux)
    }

    fn recompose(&self, aux: &NodeAux, children: Vec<Tree>) -> TreeResult<Node> {
        if children.len() != aux.names.len() {
            return Err(TreeError::structure_mismatch(
                format!("{} children", aux.names.len()),
                format!("{} children", children.len()),
            ));
        }
        let mut attrs = aux.statics.clone();
        attrs.extend(aux.names.iter().cloned().zip(children));
        Ok(Node::from_parts(
            Arc::clone(&aux.class),
            attrs,
            aux.dynamic_fields.clone(),
            aux.locked,
        ))
    }
}

/// Policy for registering a type that is already registered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Overwrite {
    #[default]
    Deny,
    Allow,
}

type CodecMap = HashMap<TypeKey, Arc<dyn NodeCodec>>;

static CODECS: OnceLock<RwLock<CodecMap>> = OnceLock::new();

fn codecs() -> &'static RwLock<CodecMap> {
    CODECS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register the codec of a node type.
///
/// Fails with [`TreeError::DuplicateRegistration`] when the type is
/// already registered and `overwrite` is [`Overwrite::Deny`].
pub fn register_node(
    key: TypeKey,
    type_name: &str,
    codec: Arc<dyn NodeCodec>,
    overwrite: Overwrite,
) -> TreeResult<()> {
    let mut map = codecs().write().unwrap_or_else(PoisonError::into_inner);
    if overwrite == Overwrite::Deny && map.contains_key(&key) {
        return Err(TreeError::DuplicateRegistration {
            type_name: type_name.to_owned(),
        });
    }
    map.insert(key, codec);
    debug!(type_name = %type_name, key = %key, ?overwrite, "registered node codec");
    Ok(())
}

/// True if a codec is registered for `key`.
pub fn is_registered(key: TypeKey) -> bool {
    codecs()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(&key)
}

pub(crate) fn codec_for(key: TypeKey) -> Arc<dyn NodeCodec> {
    codecs()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
        .cloned()
        .unwrap_or_else(|| Arc::new(FieldCodec))
}

/// Ordered fields of a tree class instance, including fields registered
/// on the instance after construction.
pub fn fields(tree: &Tree) -> TreeResult<Vec<Field>> {
    match tree {
        Tree::Node(node) => Ok(node.fields()),
        other => Err(TreeError::not_a_node(
            crate::Path::root(),
            other.type_name(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{flatten, unflatten, Args};

    #[test]
    fn test_type_keys_are_unique() {
        let a = TypeKey::next();
        let b = TypeKey::next();
        assert_ne!(a, b);
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_duplicate_registration() {
        let class = TreeClass::builder("Dup")
            .field(Field::new("a").default(1))
            .build()
            .unwrap();
        assert!(is_registered(class.type_key()));

        let err = register_node(
            class.type_key(),
            class.name(),
            Arc::new(FieldCodec),
            Overwrite::Deny,
        )
        .unwrap_err();
        assert!(matches!(err, TreeError::DuplicateRegistration { .. }));

        register_node(
            class.type_key(),
            class.name(),
            Arc::new(FieldCodec),
            Overwrite::Allow,
        )
        .unwrap();
    }

    #[test]
    fn test_field_codec_splits_fields_from_statics() {
        let class = TreeClass::builder("WithStatic")
            .field(Field::new("a").default(1))
            .field(Field::new("b").default(2))
            .post_init(|node| node.set_attr("note", "static"))
            .build()
            .unwrap();
        let node = class.instantiate(Args::new()).unwrap();

        let (children, aux) = FieldCodec.decompose(&node);
        assert_eq!(children, vec![Tree::Int(1), Tree::Int(2)]);
        assert_eq!(aux.names, ["a", "b"]);
        assert_eq!(aux.statics.get("note"), Some(&Tree::from("static")));
        assert!(aux.locked);

        let rebuilt = FieldCodec
            .recompose(&aux, vec![Tree::Int(10), Tree::Int(20)])
            .unwrap();
        assert_eq!(rebuilt.attr("a"), Some(&Tree::Int(10)));
        assert_eq!(rebuilt.attr("note"), Some(&Tree::from("static")));
        assert!(rebuilt.is_locked());

        assert!(FieldCodec.recompose(&aux, vec![Tree::Int(1)]).is_err());
    }

    /// Exposes only `weight` as a child; `bias` rides along as static data.
    struct WeightOnly;

    impl NodeCodec for WeightOnly {
        fn decompose(&self, node: &Node) -> (Vec<Tree>, NodeAux) {
            let mut statics = node.attrs().clone();
            let weight = statics.remove("weight").unwrap_or_default();
            let aux = NodeAux {
                class: Arc::clone(node.class()),
                names: vec!["weight".into()],
                statics,
                dynamic_fields: Vec::new(),
                locked: node.is_locked(),
            };
            (vec![weight], aux)
        }

        fn recompose(&self, aux: &NodeAux, children: Vec<Tree>) -> TreeResult<Node> {
            FieldCodec.recompose(aux, children)
        }
    }

    #[test]
    fn test_custom_codec_controls_leaves() {
        let class = TreeClass::builder("Linear")
            .field(Field::new("weight").default(0.5))
            .field(Field::new("bias").default(0.1))
            .codec(WeightOnly)
            .build()
            .unwrap();
        let tree = class.construct(Args::new()).unwrap();

        let (leaves, def) = flatten(&tree, None);
        assert_eq!(leaves, vec![Tree::Float(0.5)]);
        let rebuilt = unflatten(&def, vec![Tree::Float(2.0)]).unwrap();
        let node = rebuilt.as_node().unwrap();
        assert_eq!(node.attr("weight"), Some(&Tree::Float(2.0)));
        assert_eq!(node.attr("bias"), Some(&Tree::Float(0.1)));
    }

    #[test]
    fn test_fields_query() {
        let class = TreeClass::builder("Q")
            .field(Field::new("a").default(1))
            .build()
            .unwrap();
        let tree = class.construct(Args::new()).unwrap();
        let names: Vec<_> = fields(&tree)
            .unwrap()
            .iter()
            .map(|f| f.name().to_owned())
            .collect();
        assert_eq!(names, ["a"]);
        assert!(matches!(
            fields(&Tree::Int(1)),
            Err(TreeError::NotANode { .. })
        ));
    }
}
