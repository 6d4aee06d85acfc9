//! Tree class instances and the attribute protocol.

use crate::{unfreeze, Args, Field, Path, Tree, TreeClass, TreeError, TreeResult, TypeKey};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An instance of a [`TreeClass`].
///
/// Field values are the node's children. Any other attribute is static
/// data carried through flatten/unflatten unchanged. After construction the
/// instance is locked: `set_attr` and `del_attr` fail until the node is
/// inside a [`MutableScope`](crate::MutableScope).
#[derive(Clone)]
pub struct Node {
    class: Arc<TreeClass>,
    attrs: BTreeMap<String, Tree>,
    dynamic_fields: Vec<Field>,
    locked: bool,
}

impl Node {
    /// Assemble an instance without running the constructor.
    pub fn from_parts(
        class: Arc<TreeClass>,
        attrs: BTreeMap<String, Tree>,
        dynamic_fields: Vec<Field>,
        locked: bool,
    ) -> Self {
        Self {
            class,
            attrs,
            dynamic_fields,
            locked,
        }
    }

    #[inline]
    pub fn class(&self) -> &Arc<TreeClass> {
        &self.class
    }

    #[inline]
    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    #[inline]
    pub fn type_key(&self) -> TypeKey {
        self.class.type_key()
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub(crate) fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// Declared fields followed by fields registered on this instance.
    pub fn fields(&self) -> Vec<Field> {
        self.class
            .fields()
            .iter()
            .chain(&self.dynamic_fields)
            .cloned()
            .collect()
    }

    /// Field names in field order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.class
            .fields()
            .iter()
            .chain(&self.dynamic_fields)
            .map(Field::name)
    }

    pub fn is_field(&self, name: &str) -> bool {
        self.field_names().any(|n| n == name)
    }

    /// Fields added after construction by assigning a tree class instance.
    #[inline]
    pub fn dynamic_fields(&self) -> &[Field] {
        &self.dynamic_fields
    }

    /// All attributes, fields and static data alike.
    #[inline]
    pub fn attrs(&self) -> &BTreeMap<String, Tree> {
        &self.attrs
    }

    /// Raw attribute value; frozen values stay wrapped.
    #[inline]
    pub fn attr(&self, name: &str) -> Option<&Tree> {
        self.attrs.get(name)
    }

    pub(crate) fn attr_mut(&mut self, name: &str) -> Option<&mut Tree> {
        self.attrs.get_mut(name)
    }

    pub(crate) fn insert_raw(&mut self, name: &str, value: Tree) {
        self.attrs.insert(name.to_owned(), value);
    }

    pub(crate) fn take_raw(&mut self, name: &str) -> Option<Tree> {
        self.attrs.remove(name)
    }

    /// Attribute value with one frozen layer removed.
    pub fn get(&self, name: &str) -> TreeResult<Tree> {
        self.attrs
            .get(name)
            .cloned()
            .map(unfreeze)
            .ok_or_else(|| TreeError::attribute_not_found(Path::root().key(name)))
    }

    /// Assign an attribute.
    ///
    /// Fails on a locked instance. Assigning a tree class instance to a
    /// name that is not a field registers it as a field of this instance.
    pub fn set_attr(&mut self, name: &str, value: impl Into<Tree>) -> TreeResult<()> {
        let value = value.into();
        if self.locked {
            return Err(TreeError::ImmutableSet {
                key: name.to_owned(),
                value: value.to_string(),
            });
        }
        if let Tree::Node(child) = &value {
            if !self.is_field(name) {
                let field = Field::new(name).ty(child.class_name());
                self.dynamic_fields.push(field);
            }
        }
        self.attrs.insert(name.to_owned(), value);
        Ok(())
    }

    /// Delete an attribute. Fails on a locked instance.
    pub fn del_attr(&mut self, name: &str) -> TreeResult<Tree> {
        if self.locked {
            return Err(TreeError::ImmutableDelete {
                key: name.to_owned(),
            });
        }
        let removed = self
            .attrs
            .remove(name)
            .ok_or_else(|| TreeError::attribute_not_found(Path::root().key(name)))?;
        self.dynamic_fields.retain(|f| f.name() != name);
        Ok(removed)
    }

    /// Call a method on a copy of this instance.
    ///
    /// The copy keeps the lock, so a method that assigns attributes fails.
    /// Use `tree.at("method").call(args)` to run mutating methods.
    pub fn call(&self, name: &str, args: Args) -> TreeResult<Tree> {
        let mut receiver = self.clone();
        receiver.call_mut(name, args)
    }

    pub(crate) fn call_mut(&mut self, name: &str, args: Args) -> TreeResult<Tree> {
        let method = self
            .class
            .method(name)
            .cloned()
            .ok_or_else(|| TreeError::MethodNotFound {
                class: self.class_name().to_owned(),
                name: name.to_owned(),
            })?;
        method(self, args)
    }
}

/// Instances are equal when they share a class, attributes and dynamic
/// fields. The lock flag is ignored.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.type_key() == other.type_key()
            && self.attrs == other.attrs
            && self
                .dynamic_fields
                .iter()
                .map(Field::name)
                .eq(other.dynamic_fields.iter().map(Field::name))
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("class", &self.class_name())
            .field("attrs", &self.attrs)
            .field("locked", &self.locked)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{freeze, TreeClass};

    fn point_class() -> Arc<TreeClass> {
        TreeClass::builder("Point")
            .field(Field::new("x").default(1))
            .field(Field::new("y").default(2))
            .method("norm1", |node, _| {
                let x = node.get("x")?.as_float().unwrap_or(0.0);
                let y = node.get("y")?.as_float().unwrap_or(0.0);
                Ok(Tree::Float(x.abs() + y.abs()))
            })
            .method("bump", |node, _| {
                let x = node.get("x")?.as_int().unwrap_or(0);
                node.set_attr("x", x + 1)?;
                Ok(Tree::None)
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_locked_instance_rejects_writes() {
        let class = point_class();
        let mut node = class.instantiate(Args::new()).unwrap();
        assert!(node.is_locked());

        let err = node.set_attr("x", 5).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot set x=5. Use `.at['x'].set(5)` instead."
        );
        let err = node.del_attr("x").unwrap_err();
        assert_eq!(err.to_string(), "Cannot delete x.");
        assert_eq!(node.get("x").unwrap(), Tree::Int(1));
    }

    #[test]
    fn test_unlocked_instance_registers_dynamic_fields() {
        let class = point_class();
        let mut node = class.instantiate(Args::new()).unwrap();
        node.set_locked(false);

        let child = class.instantiate(Args::new()).unwrap();
        node.set_attr("child", child).unwrap();
        node.set_attr("label", "static").unwrap();

        assert_eq!(node.dynamic_fields().len(), 1);
        assert_eq!(node.dynamic_fields()[0].name(), "child");
        assert_eq!(node.dynamic_fields()[0].type_hint(), Some("Point"));
        assert!(node.is_field("child"));
        assert!(!node.is_field("label"));

        node.del_attr("child").unwrap();
        assert!(node.dynamic_fields().is_empty());
    }

    #[test]
    fn test_get_unfreezes_one_layer() {
        let class = point_class();
        let mut node = class.instantiate(Args::new()).unwrap();
        node.set_locked(false);
        node.set_attr("x", freeze(7)).unwrap();
        assert_eq!(node.get("x").unwrap(), Tree::Int(7));
        assert!(matches!(node.attr("x"), Some(Tree::Frozen(_))));
        assert!(matches!(
            node.get("missing"),
            Err(TreeError::AttributeNotFound { .. })
        ));
    }

    #[test]
    fn test_call_runs_on_locked_copy() {
        let class = point_class();
        let node = class.instantiate(Args::new()).unwrap();
        assert_eq!(node.call("norm1", Args::new()).unwrap(), Tree::Float(3.0));

        let err = node.call("bump", Args::new()).unwrap_err();
        assert!(err.is_immutable());
        assert!(matches!(
            node.call("nope", Args::new()),
            Err(TreeError::MethodNotFound { .. })
        ));
    }

    #[test]
    fn test_equality_ignores_lock() {
        let class = point_class();
        let a = class.instantiate(Args::new()).unwrap();
        let mut b = a.clone();
        b.set_locked(false);
        assert_eq!(a, b);
    }
}
