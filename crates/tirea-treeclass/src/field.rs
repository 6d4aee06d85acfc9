//! Field descriptors.

use crate::{Tree, TreeError, TreeResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A construction-time transform. Validators are callbacks that return
/// their input unchanged.
pub type Callback = Arc<dyn Fn(Tree) -> TreeResult<Tree> + Send + Sync>;

/// How a field is passed to the generated constructor.
///
/// The derived order is the parameter order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldKind {
    PosOnly,
    #[default]
    PosOrKw,
    KwOnly,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::PosOnly => "POS_ONLY",
            FieldKind::PosOrKw => "POS_OR_KW",
            FieldKind::KwOnly => "KW_ONLY",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "POS_ONLY" => Ok(FieldKind::PosOnly),
            "POS_OR_KW" => Ok(FieldKind::PosOrKw),
            "KW_ONLY" => Ok(FieldKind::KwOnly),
            other => Err(TreeError::InvalidFieldKind {
                token: other.to_owned(),
            }),
        }
    }
}

/// Declaration of one attribute of a tree class.
///
/// ```
/// use tirea_treeclass::{Field, FieldKind, Tree, TreeError};
///
/// let field = Field::new("rate")
///     .ty("float")
///     .default(0.1)
///     .kind(FieldKind::KwOnly)
///     .validator("positive", |v| match v.as_float() {
///         Some(x) if x > 0.0 => Ok(()),
///         _ => Err(TreeError::invalid_value("rate must be positive")),
///     });
/// assert_eq!(field.name(), "rate");
/// assert!(field.default_value().is_some());
/// ```
#[derive(Clone)]
pub struct Field {
    name: String,
    ty: Option<String>,
    default: Option<Tree>,
    init: bool,
    repr: bool,
    kind: FieldKind,
    metadata: Map<String, Value>,
    callbacks: Vec<(String, Callback)>,
    alias: Option<String>,
    frozen: bool,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
            default: None,
            init: true,
            repr: true,
            kind: FieldKind::PosOrKw,
            metadata: Map::new(),
            callbacks: Vec::new(),
            alias: None,
            frozen: false,
        }
    }

    /// Declared type, informational only.
    pub fn ty(mut self, ty: impl Into<String>) -> Self {
        self.ty = Some(ty.into());
        self
    }

    pub fn default(mut self, value: impl Into<Tree>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Whether the field is a constructor parameter.
    pub fn init(mut self, init: bool) -> Self {
        self.init = init;
        self
    }

    /// Whether the field is shown by `Display`.
    pub fn repr(mut self, repr: bool) -> Self {
        self.repr = repr;
        self
    }

    pub fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Append a named transform run at construction time.
    pub fn callback<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Tree) -> TreeResult<Tree> + Send + Sync + 'static,
    {
        self.callbacks.push((name.into(), Arc::new(f)));
        self
    }

    /// Append a named check run at construction time.
    pub fn validator<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Tree) -> TreeResult<()> + Send + Sync + 'static,
    {
        self.callback(name, move |value| {
            f(&value)?;
            Ok(value)
        })
    }

    /// Constructor parameter name used instead of the field name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Freeze the value once construction finishes.
    pub fn frozen(mut self, frozen: bool) -> Self {
        self.frozen = frozen;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn type_hint(&self) -> Option<&str> {
        self.ty.as_deref()
    }

    #[inline]
    pub fn default_value(&self) -> Option<&Tree> {
        self.default.as_ref()
    }

    #[inline]
    pub fn is_init(&self) -> bool {
        self.init
    }

    #[inline]
    pub fn is_repr(&self) -> bool {
        self.repr
    }

    #[inline]
    pub fn arg_kind(&self) -> FieldKind {
        self.kind
    }

    #[inline]
    pub fn metadata_map(&self) -> &Map<String, Value> {
        &self.metadata
    }

    #[inline]
    pub fn callbacks(&self) -> &[(String, Callback)] {
        &self.callbacks
    }

    #[inline]
    pub fn alias_name(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Name of the constructor parameter: the alias if set.
    #[inline]
    pub fn param_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let callbacks: Vec<&str> = self.callbacks.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("type", &self.ty)
            .field("default", &self.default)
            .field("init", &self.init)
            .field("repr", &self.repr)
            .field("kind", &self.kind)
            .field("metadata", &self.metadata)
            .field("callbacks", &callbacks)
            .field("alias", &self.alias)
            .field("frozen", &self.frozen)
            .finish()
    }
}
