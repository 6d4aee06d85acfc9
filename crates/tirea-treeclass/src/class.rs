//! Tree class declaration and the generated constructor.

use crate::registry::{register_node, FieldCodec, NodeCodec, Overwrite, TypeKey};
use crate::{freeze, Field, FieldKind, Node, Tree, TreeError, TreeResult, TypeTag};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Attribute name reserved for the instance lock flag.
pub const FROZEN_SENTINEL: &str = "__frozen__";

/// Hooks owned by the attribute protocol; classes may not define them.
const RESERVED_HOOKS: [&str; 4] = [
    "__setattr__",
    "__delattr__",
    "__getattribute__",
    "__getattr__",
];

/// A method callable on instances.
pub type Method = Arc<dyn Fn(&mut Node, Args) -> TreeResult<Tree> + Send + Sync>;

/// A user constructor body replacing the generated one.
pub type InitFn = Arc<dyn Fn(&mut Node, Args) -> TreeResult<()> + Send + Sync>;

/// Hook run after the constructor body.
pub type PostInit = Arc<dyn Fn(&mut Node) -> TreeResult<()> + Send + Sync>;

/// Positional and keyword arguments of a call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args {
    positional: Vec<Tree>,
    keyword: Vec<(String, Tree)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Tree>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Append a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Tree>) -> Self {
        self.keyword.push((name.into(), value.into()));
        self
    }

    #[inline]
    pub fn positional(&self) -> &[Tree] {
        &self.positional
    }

    #[inline]
    pub fn keyword(&self) -> &[(String, Tree)] {
        &self.keyword
    }

    /// Keyword argument by name.
    pub fn kw(&self, name: &str) -> Option<&Tree> {
        self.keyword
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Argument passed either by keyword `name` or at position `index`.
    pub fn lookup(&self, index: usize, name: &str) -> Option<&Tree> {
        self.kw(name).or_else(|| self.positional.get(index))
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

impl From<Vec<Tree>> for Args {
    fn from(positional: Vec<Tree>) -> Self {
        Self {
            positional,
            keyword: Vec::new(),
        }
    }
}

/// A declared tree class.
///
/// Built with [`TreeClass::builder`]; the field map is merged from the base
/// class and cached here.
pub struct TreeClass {
    name: String,
    key: TypeKey,
    base: Option<Arc<TreeClass>>,
    fields: Vec<Field>,
    methods: BTreeMap<String, Method>,
    init: Option<InitFn>,
    post_init: Option<PostInit>,
}

impl TreeClass {
    /// Start declaring a class.
    pub fn builder(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder {
            name: name.into(),
            base: None,
            fields: Vec::new(),
            methods: Vec::new(),
            init: None,
            post_init: None,
            codec: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn type_key(&self) -> TypeKey {
        self.key
    }

    #[inline]
    pub fn type_tag(&self) -> TypeTag {
        TypeTag::Node(self.key)
    }

    #[inline]
    pub fn base(&self) -> Option<&Arc<TreeClass>> {
        self.base.as_ref()
    }

    /// Ordered field map, base fields first.
    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// True if `self` is `other` or derives from it.
    pub fn is_subclass_of(&self, other: &TreeClass) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.key == other.key {
                return true;
            }
            current = class.base.as_deref();
        }
        false
    }

    /// Constructor parameters in call order.
    pub fn params(&self) -> Vec<&Field> {
        let mut params: Vec<&Field> = self.fields.iter().filter(|f| f.is_init()).collect();
        params.sort_by_key(|f| f.arg_kind());
        params
    }

    /// Construct an instance and wrap it as a tree.
    pub fn construct(self: &Arc<Self>, args: Args) -> TreeResult<Tree> {
        self.instantiate(args).map(Tree::Node)
    }

    /// Construct an instance.
    ///
    /// Defaults are assigned first, then the constructor body runs (the
    /// generated one or the class's `init_fn`), then the class's own
    /// `post_init`. Afterwards each field's callbacks transform its value in
    /// declaration order, `frozen` fields are frozen, and the instance is
    /// locked.
    pub fn instantiate(self: &Arc<Self>, args: Args) -> TreeResult<Node> {
        let mut node = Node::from_parts(Arc::clone(self), BTreeMap::new(), Vec::new(), false);
        for field in &self.fields {
            if let Some(default) = field.default_value() {
                node.insert_raw(field.name(), default.clone());
            }
        }

        match &self.init {
            Some(init) => init(&mut node, args)?,
            None => self.bind(&mut node, args)?,
        }

        if let Some(hook) = &self.post_init {
            hook(&mut node)?;
        }

        for field in node.fields() {
            let Some(mut value) = node.take_raw(field.name()) else {
                continue;
            };
            for (callback, f) in field.callbacks() {
                value = f(value).map_err(|source| TreeError::Callback {
                    field: field.name().to_owned(),
                    callback: callback.clone(),
                    source: Box::new(source),
                })?;
            }
            if field.is_frozen() {
                value = freeze(value);
            }
            node.insert_raw(field.name(), value);
        }

        node.set_locked(true);
        trace!(class = %self.name, "constructed instance");
        Ok(node)
    }

    /// Generated constructor body: bind arguments to fields.
    fn bind(&self, node: &mut Node, args: Args) -> TreeResult<()> {
        let params = self.params();
        let positional: Vec<&Field> = params
            .iter()
            .copied()
            .filter(|f| f.arg_kind() != FieldKind::KwOnly)
            .collect();

        let Args {
            positional: values,
            keyword,
        } = args;
        if values.len() > positional.len() {
            return Err(TreeError::TooManyPositional {
                class: self.name.clone(),
                expected: positional.len(),
                given: values.len(),
            });
        }

        let mut assigned: HashSet<&str> = HashSet::new();
        for (field, value) in positional.iter().zip(values) {
            node.insert_raw(field.name(), value);
            assigned.insert(field.name());
        }

        for (name, value) in keyword {
            let field = params
                .iter()
                .find(|f| f.param_name() == name && f.arg_kind() != FieldKind::PosOnly)
                .ok_or_else(|| TreeError::UnexpectedArgument {
                    class: self.name.clone(),
                    name: name.clone(),
                })?;
            if !assigned.insert(field.name()) {
                return Err(TreeError::MultipleValues {
                    class: self.name.clone(),
                    name,
                });
            }
            node.insert_raw(field.name(), value);
        }

        for field in &params {
            if !assigned.contains(field.name()) && field.default_value().is_none() {
                return Err(TreeError::MissingArgument {
                    class: self.name.clone(),
                    name: field.param_name().to_owned(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for TreeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields.iter().map(Field::name).collect();
        let methods: Vec<&str> = self.method_names().collect();
        f.debug_struct("TreeClass")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("base", &self.base.as_ref().map(|b| b.name()))
            .field("fields", &fields)
            .field("methods", &methods)
            .finish()
    }
}

/// Builder for [`TreeClass`].
///
/// ```
/// use tirea_treeclass::{Args, Field, Tree, TreeClass};
///
/// let class = TreeClass::builder("Pair")
///     .field(Field::new("a").default(1))
///     .field(Field::new("b").default(2))
///     .build()
///     .unwrap();
///
/// let pair = class.construct(Args::new().kwarg("b", 5)).unwrap();
/// assert_eq!(pair.to_string(), "Pair(a=1, b=5)");
/// ```
pub struct ClassBuilder {
    name: String,
    base: Option<Arc<TreeClass>>,
    fields: Vec<Field>,
    methods: Vec<(String, Method)>,
    init: Option<InitFn>,
    post_init: Option<PostInit>,
    codec: Option<Arc<dyn NodeCodec>>,
}

impl ClassBuilder {
    /// Derive from `base`: inherit its fields and methods.
    pub fn extends(mut self, base: &Arc<TreeClass>) -> Self {
        self.base = Some(Arc::clone(base));
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Node, Args) -> TreeResult<Tree> + Send + Sync + 'static,
    {
        self.methods.push((name.into(), Arc::new(f)));
        self
    }

    /// Replace the generated constructor body.
    pub fn init_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Node, Args) -> TreeResult<()> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(f));
        self
    }

    /// Hook run after the constructor body, before callbacks.
    pub fn post_init<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Node) -> TreeResult<()> + Send + Sync + 'static,
    {
        self.post_init = Some(Arc::new(f));
        self
    }

    /// Use a custom codec instead of [`FieldCodec`].
    pub fn codec(mut self, codec: impl NodeCodec + 'static) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    /// Validate the declaration, merge inherited fields and register the
    /// class.
    pub fn build(self) -> TreeResult<Arc<TreeClass>> {
        let name = self.name;

        for (method, _) in &self.methods {
            if RESERVED_HOOKS.contains(&method.as_str()) {
                return Err(TreeError::ReservedHook {
                    class: name,
                    hook: method.clone(),
                });
            }
        }

        let mut fields: Vec<Field> = self
            .base
            .as_ref()
            .map(|b| b.fields.clone())
            .unwrap_or_default();
        let mut declared: HashSet<String> = HashSet::new();
        for field in self.fields {
            if field.name() == "self" {
                return Err(TreeError::ReservedFieldName {
                    name: field.name().to_owned(),
                });
            }
            if field.name() == FROZEN_SENTINEL {
                warn!(class = %name, field = FROZEN_SENTINEL, "skipping reserved attribute name");
                continue;
            }
            if let Some(default @ (Tree::List(_) | Tree::Dict(_))) = field.default_value() {
                return Err(TreeError::MutableDefault {
                    field: field.name().to_owned(),
                    found: default.type_name(),
                });
            }
            if !declared.insert(field.name().to_owned()) {
                return Err(TreeError::DuplicateField {
                    class: name,
                    field: field.name().to_owned(),
                });
            }
            match fields.iter_mut().find(|f| f.name() == field.name()) {
                Some(slot) => *slot = field,
                None => fields.push(field),
            }
        }

        check_signature(&name, &fields)?;

        let mut methods = self
            .base
            .as_ref()
            .map(|b| b.methods.clone())
            .unwrap_or_default();
        methods.extend(self.methods);

        let class = Arc::new(TreeClass {
            name,
            key: TypeKey::next(),
            base: self.base,
            fields,
            methods,
            init: self.init,
            post_init: self.post_init,
        });

        let codec = self.codec.unwrap_or_else(|| Arc::new(FieldCodec));
        register_node(class.key, &class.name, codec, Overwrite::Deny)?;
        debug!(
            class = %class.name,
            key = %class.key,
            fields = class.fields.len(),
            methods = class.methods.len(),
            "built tree class"
        );
        Ok(class)
    }
}

fn check_signature(class: &str, fields: &[Field]) -> TreeResult<()> {
    let mut params: Vec<&Field> = fields.iter().filter(|f| f.is_init()).collect();
    params.sort_by_key(|f| f.arg_kind());

    let mut seen: HashSet<&str> = HashSet::new();
    let mut saw_default = false;
    for field in params {
        if !seen.insert(field.param_name()) {
            return Err(TreeError::DuplicateParameter {
                class: class.to_owned(),
                name: field.param_name().to_owned(),
            });
        }
        if field.arg_kind() == FieldKind::KwOnly {
            continue;
        }
        if field.default_value().is_some() {
            saw_default = true;
        } else if saw_default {
            return Err(TreeError::NonDefaultAfterDefault {
                class: class.to_owned(),
                name: field.param_name().to_owned(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaves;

    fn ab_class() -> Arc<TreeClass> {
        TreeClass::builder("AB")
            .field(Field::new("a").default(1))
            .field(Field::new("b").default(2))
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_construction_and_leaf_order() {
        let tree = ab_class().construct(Args::new()).unwrap();
        assert_eq!(leaves(&tree, None), vec![Tree::Int(1), Tree::Int(2)]);
    }

    #[test]
    fn test_positional_and_keyword_binding() {
        let class = ab_class();
        let node = class.instantiate(Args::new().arg(10).kwarg("b", 20)).unwrap();
        assert_eq!(node.attr("a"), Some(&Tree::Int(10)));
        assert_eq!(node.attr("b"), Some(&Tree::Int(20)));

        let err = class
            .instantiate(Args::new().arg(1).arg(2).arg(3))
            .unwrap_err();
        assert!(matches!(
            err,
            TreeError::TooManyPositional {
                expected: 2,
                given: 3,
                ..
            }
        ));

        let err = class.instantiate(Args::new().kwarg("c", 1)).unwrap_err();
        assert!(matches!(err, TreeError::UnexpectedArgument { .. }));

        let err = class
            .instantiate(Args::new().arg(1).kwarg("a", 1))
            .unwrap_err();
        assert!(matches!(err, TreeError::MultipleValues { .. }));
    }

    #[test]
    fn test_missing_required_argument() {
        let class = TreeClass::builder("Req")
            .field(Field::new("x"))
            .build()
            .unwrap();
        let err = class.instantiate(Args::new()).unwrap_err();
        assert_eq!(err.to_string(), "Req() missing required argument `x`");
    }

    #[test]
    fn test_parameter_kinds_order_and_restrictions() {
        let class = TreeClass::builder("Kinds")
            .field(Field::new("k").kind(FieldKind::KwOnly))
            .field(Field::new("p").kind(FieldKind::PosOnly))
            .field(Field::new("q"))
            .build()
            .unwrap();
        let names: Vec<&str> = class.params().iter().map(|f| f.name()).collect();
        assert_eq!(names, ["p", "q", "k"]);

        let node = class
            .instantiate(Args::new().arg(1).arg(2).kwarg("k", 3))
            .unwrap();
        assert_eq!(node.attr("p"), Some(&Tree::Int(1)));
        assert_eq!(node.attr("k"), Some(&Tree::Int(3)));

        let err = class
            .instantiate(Args::new().kwarg("p", 1).kwarg("q", 2).kwarg("k", 3))
            .unwrap_err();
        assert!(matches!(err, TreeError::UnexpectedArgument { .. }));

        let err = class
            .instantiate(Args::new().arg(1).arg(2).arg(3))
            .unwrap_err();
        assert!(matches!(err, TreeError::TooManyPositional { .. }));
    }

    #[test]
    fn test_init_false_fields_get_default_only() {
        let class = TreeClass::builder("Hidden")
            .field(Field::new("a"))
            .field(Field::new("counter").default(0).init(false))
            .build()
            .unwrap();
        let node = class.instantiate(Args::new().arg(5)).unwrap();
        assert_eq!(node.attr("counter"), Some(&Tree::Int(0)));
        let err = class
            .instantiate(Args::new().arg(5).kwarg("counter", 1))
            .unwrap_err();
        assert!(matches!(err, TreeError::UnexpectedArgument { .. }));
    }

    #[test]
    fn test_alias_renames_parameter() {
        let class = TreeClass::builder("Aliased")
            .field(Field::new("_rate").alias("rate"))
            .build()
            .unwrap();
        let node = class.instantiate(Args::new().kwarg("rate", 0.5)).unwrap();
        assert_eq!(node.attr("_rate"), Some(&Tree::Float(0.5)));
        assert!(class
            .instantiate(Args::new().kwarg("_rate", 0.5))
            .is_err());
    }

    #[test]
    fn test_declaration_errors() {
        let err = TreeClass::builder("Bad")
            .field(Field::new("self"))
            .build()
            .unwrap_err();
        assert!(matches!(err, TreeError::ReservedFieldName { .. }));

        let err = TreeClass::builder("Bad")
            .field(Field::new("xs").default(Tree::list([])))
            .build()
            .unwrap_err();
        assert!(matches!(err, TreeError::MutableDefault { found: "list", .. }));

        let err = TreeClass::builder("Bad")
            .field(Field::new("a"))
            .field(Field::new("a"))
            .build()
            .unwrap_err();
        assert!(matches!(err, TreeError::DuplicateField { .. }));

        let err = TreeClass::builder("Bad")
            .field(Field::new("a").alias("x"))
            .field(Field::new("b").alias("x"))
            .build()
            .unwrap_err();
        assert!(matches!(err, TreeError::DuplicateParameter { .. }));

        let err = TreeClass::builder("Bad")
            .field(Field::new("a").default(1))
            .field(Field::new("b"))
            .build()
            .unwrap_err();
        assert!(matches!(err, TreeError::NonDefaultAfterDefault { .. }));

        let err = TreeClass::builder("Bad")
            .method("__setattr__", |_, _| Ok(Tree::None))
            .build()
            .unwrap_err();
        assert!(matches!(err, TreeError::ReservedHook { .. }));
        assert!(err.is_declaration());
    }

    #[test]
    fn test_kw_only_without_default_may_follow_defaults() {
        let class = TreeClass::builder("Ok")
            .field(Field::new("a").default(1))
            .field(Field::new("b").kind(FieldKind::KwOnly))
            .build();
        assert!(class.is_ok());
    }

    #[test]
    fn test_sentinel_field_is_skipped() {
        let class = TreeClass::builder("Sentinel")
            .field(Field::new(FROZEN_SENTINEL).default(true))
            .field(Field::new("a").default(1))
            .build()
            .unwrap();
        assert_eq!(class.fields().len(), 1);
        assert!(class.field(FROZEN_SENTINEL).is_none());
    }

    #[test]
    fn test_inheritance_overrides_in_place() {
        let base = TreeClass::builder("Base")
            .field(Field::new("a").default(1))
            .field(Field::new("b").default(2))
            .method("who", |_, _| Ok(Tree::from("base")))
            .method("shared", |_, _| Ok(Tree::from("base")))
            .build()
            .unwrap();
        let derived = TreeClass::builder("Derived")
            .extends(&base)
            .field(Field::new("a").default(10))
            .field(Field::new("c").default(3))
            .method("who", |_, _| Ok(Tree::from("derived")))
            .build()
            .unwrap();

        let names: Vec<&str> = derived.fields().iter().map(Field::name).collect();
        assert_eq!(names, ["a", "b", "c"]);
        let tree = derived.construct(Args::new()).unwrap();
        assert_eq!(
            leaves(&tree, None),
            vec![Tree::Int(10), Tree::Int(2), Tree::Int(3)]
        );

        let node = tree.as_node().unwrap();
        assert_eq!(node.call("who", Args::new()).unwrap(), Tree::from("derived"));
        assert_eq!(node.call("shared", Args::new()).unwrap(), Tree::from("base"));
        assert!(derived.is_subclass_of(&base));
        assert!(!base.is_subclass_of(&derived));
    }

    #[test]
    fn test_callbacks_run_after_post_init_and_errors_name_the_field() {
        let class = TreeClass::builder("Scaled")
            .field(Field::new("x").callback("double", |v| {
                Ok(Tree::Int(v.as_int().unwrap_or(0) * 2))
            }))
            .post_init(|node| {
                let x = node.get("x")?.as_int().unwrap_or(0);
                node.set_attr("x", x + 1)
            })
            .build()
            .unwrap();
        let node = class.instantiate(Args::new().arg(1)).unwrap();
        assert_eq!(node.attr("x"), Some(&Tree::Int(4)));

        let strict = TreeClass::builder("Strict")
            .field(Field::new("age").validator("non_negative", |v| {
                if v.as_int().is_some_and(|a| a >= 0) {
                    Ok(())
                } else {
                    Err(TreeError::invalid_value("age must be non-negative"))
                }
            }))
            .build()
            .unwrap();
        let err = strict.instantiate(Args::new().arg(-1)).unwrap_err();
        assert!(err.to_string().starts_with("for field=`age`"));
        assert!(err.to_string().contains("age must be non-negative"));
    }

    #[test]
    fn test_frozen_fields_are_frozen_last() {
        let class = TreeClass::builder("Cfg")
            .field(
                Field::new("lr")
                    .default(0.1)
                    .frozen(true)
                    .validator("is_float", |v| {
                        if matches!(v, Tree::Float(_)) {
                            Ok(())
                        } else {
                            Err(TreeError::invalid_value("expected float"))
                        }
                    }),
            )
            .field(Field::new("w").default(1.0))
            .build()
            .unwrap();
        let tree = class.construct(Args::new()).unwrap();
        let node = tree.as_node().unwrap();
        assert!(matches!(node.attr("lr"), Some(Tree::Frozen(_))));
        assert_eq!(node.get("lr").unwrap(), Tree::Float(0.1));
        assert_eq!(leaves(&tree, None), vec![Tree::Float(1.0)]);
    }

    #[test]
    fn test_custom_init_keeps_defaults_and_post_init_registers_children() {
        let leaf = TreeClass::builder("Leaf")
            .field(Field::new("v").default(0))
            .build()
            .unwrap();
        let leaf_for_init = Arc::clone(&leaf);
        let class = TreeClass::builder("Parent")
            .field(Field::new("scale").default(2))
            .init_fn(move |node, args| {
                let v = args.lookup(0, "v").cloned().unwrap_or(Tree::Int(0));
                let child = leaf_for_init.construct(Args::new().kwarg("v", v))?;
                node.set_attr("child", child)
            })
            .build()
            .unwrap();

        let tree = class.construct(Args::new().arg(7)).unwrap();
        let node = tree.as_node().unwrap();
        assert_eq!(node.attr("scale"), Some(&Tree::Int(2)));
        assert_eq!(node.dynamic_fields().len(), 1);
        assert_eq!(leaves(&tree, None), vec![Tree::Int(2), Tree::Int(7)]);
    }
}
