//! Error types for tree operations.

use crate::Path;
use thiserror::Error;

/// Result type alias for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors that can occur while declaring, constructing, mutating or
/// indexing trees.
#[derive(Debug, Error)]
pub enum TreeError {
    // ------------------------------------------------------------------
    // Declaration time
    // ------------------------------------------------------------------
    /// A field uses a name reserved for the receiver.
    #[error("field name cannot be `{name}`")]
    ReservedFieldName {
        /// The rejected name.
        name: String,
    },

    /// A field default is a mutable container.
    #[error("mutable default {found} is not allowed for field `{field}`")]
    MutableDefault {
        /// Field name.
        field: String,
        /// Kind of the rejected default.
        found: &'static str,
    },

    /// Unknown argument-kind token.
    #[error("invalid field kind `{token}`, expected one of POS_ONLY, POS_OR_KW, KW_ONLY")]
    InvalidFieldKind {
        /// The token that failed to parse.
        token: String,
    },

    /// The same field is declared twice in one class body.
    #[error("field `{field}` is declared more than once in `{class}`")]
    DuplicateField {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
    },

    /// Two constructor parameters share a name (usually through an alias).
    #[error("duplicate constructor parameter `{name}` in `{class}`")]
    DuplicateParameter {
        /// Class name.
        class: String,
        /// Parameter name.
        name: String,
    },

    /// A positional parameter without default follows one with a default.
    #[error("non-default parameter `{name}` follows a default parameter in `{class}`")]
    NonDefaultAfterDefault {
        /// Class name.
        class: String,
        /// Parameter name.
        name: String,
    },

    /// The class tries to define a hook owned by the tree protocol.
    #[error("cannot define `{hook}` in `{class}`")]
    ReservedHook {
        /// Class name.
        class: String,
        /// Hook name.
        hook: String,
    },

    /// A node type was registered twice without overwrite permission.
    #[error("node type `{type_name}` is already registered")]
    DuplicateRegistration {
        /// Class name of the node type.
        type_name: String,
    },

    // ------------------------------------------------------------------
    // Construction time
    // ------------------------------------------------------------------
    /// A field callback failed during construction.
    #[error("for field=`{field}`: on applying `{callback}`: {source}")]
    Callback {
        /// Field whose callback failed.
        field: String,
        /// Callback name.
        callback: String,
        /// The error raised by the callback.
        #[source]
        source: Box<TreeError>,
    },

    /// A required constructor argument was not supplied.
    #[error("{class}() missing required argument `{name}`")]
    MissingArgument {
        /// Class name.
        class: String,
        /// Parameter name.
        name: String,
    },

    /// A keyword argument does not match any keyword-capable parameter.
    #[error("{class}() got an unexpected keyword argument `{name}`")]
    UnexpectedArgument {
        /// Class name.
        class: String,
        /// Keyword name.
        name: String,
    },

    /// A parameter received both a positional and a keyword value.
    #[error("{class}() got multiple values for argument `{name}`")]
    MultipleValues {
        /// Class name.
        class: String,
        /// Parameter name.
        name: String,
    },

    /// More positional arguments than positional parameters.
    #[error("{class}() takes {expected} positional arguments but {given} were given")]
    TooManyPositional {
        /// Class name.
        class: String,
        /// Number of positional parameters.
        expected: usize,
        /// Number of positional arguments given.
        given: usize,
    },

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------
    /// Assignment on a locked instance.
    #[error("Cannot set {key}={value}. Use `.at['{key}'].set({value})` instead.")]
    ImmutableSet {
        /// Attribute name.
        key: String,
        /// Rendered value that was being assigned.
        value: String,
    },

    /// Deletion on a locked instance.
    #[error("Cannot delete {key}.")]
    ImmutableDelete {
        /// Attribute name.
        key: String,
    },

    // ------------------------------------------------------------------
    // Selectors
    // ------------------------------------------------------------------
    /// The `.at` selector has an unsupported type.
    #[error("{message}")]
    UnsupportedSelector {
        /// Description with a usage hint.
        message: String,
    },

    /// A mask leaf is not boolean.
    #[error("all mask leaves must be boolean, found {found}")]
    NonBooleanMask {
        /// Rendered offending leaf.
        found: String,
    },

    /// The path is deeper than any leaf of the tree.
    #[error("path {path} is out of bounds (max depth: {max_depth})")]
    PathOutOfBounds {
        /// Requested path.
        path: Path,
        /// Deepest trace found in the tree.
        max_depth: usize,
    },

    /// The path does not name an attribute, element or key.
    #[error("attribute not found: {path}")]
    AttributeNotFound {
        /// Requested path.
        path: Path,
    },

    /// Two trees do not share the required structure.
    #[error("structure mismatch: expected {expected}, found {found}")]
    StructureMismatch {
        /// Expected structure.
        expected: String,
        /// Found structure or kind.
        found: String,
    },

    /// A mask is neither a predicate nor a matching boolean tree.
    #[error("mask must be a predicate or a tree with the same structure as the tree: {message}")]
    InvalidMask {
        /// Detail.
        message: String,
    },

    // ------------------------------------------------------------------
    // Frozen values
    // ------------------------------------------------------------------
    /// An operator was applied to a frozen value.
    #[error(
        "Cannot apply `{op}` operation to a frozen object.\n\
         Unfreeze the object first by unmasking the frozen mask:\n\
         >>> let tree = tree_unmask(&tree, Mask::all())?;"
    )]
    FrozenOperation {
        /// Operator symbol.
        op: &'static str,
    },

    // ------------------------------------------------------------------
    // Misc
    // ------------------------------------------------------------------
    /// Reduction over zero leaves without an initializer.
    #[error("reduce of a selection with no leaves and no initializer")]
    EmptyReduce,

    /// Method lookup failed.
    #[error("`{class}` has no method `{name}`")]
    MethodNotFound {
        /// Class name.
        class: String,
        /// Method name.
        name: String,
    },

    /// A tree class instance was required.
    #[error("expected a tree class instance at {path}, found {found}")]
    NotANode {
        /// Location.
        path: Path,
        /// Kind found instead.
        found: &'static str,
    },

    /// Binary operator on incompatible leaves.
    #[error("unsupported operand type(s) for {op}: `{lhs}` and `{rhs}`")]
    LeafType {
        /// Operator symbol.
        op: &'static str,
        /// Left operand kind.
        lhs: &'static str,
        /// Right operand kind.
        rhs: &'static str,
    },

    /// Array shapes are incompatible.
    #[error("shape mismatch: {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        /// Left shape.
        lhs: Vec<usize>,
        /// Right shape.
        rhs: Vec<usize>,
    },

    /// A value is not acceptable (callbacks, casts, overflow).
    #[error("invalid value: {message}")]
    InvalidValue {
        /// Description of what went wrong.
        message: String,
    },

    /// Invalid operation error.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of what went wrong.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TreeError {
    /// Create an attribute not found error.
    #[inline]
    pub fn attribute_not_found(path: Path) -> Self {
        TreeError::AttributeNotFound { path }
    }

    /// Create a not-a-node error.
    #[inline]
    pub fn not_a_node(path: Path, found: &'static str) -> Self {
        TreeError::NotANode { path, found }
    }

    /// Create a structure mismatch error.
    #[inline]
    pub fn structure_mismatch(expected: impl ToString, found: impl ToString) -> Self {
        TreeError::StructureMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Create a leaf type error for a binary operator.
    #[inline]
    pub fn leaf_type(op: &'static str, lhs: &'static str, rhs: &'static str) -> Self {
        TreeError::LeafType { op, lhs, rhs }
    }

    /// Create an invalid value error.
    #[inline]
    pub fn invalid_value(message: impl Into<String>) -> Self {
        TreeError::InvalidValue {
            message: message.into(),
        }
    }

    /// Create an invalid operation error.
    #[inline]
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        TreeError::InvalidOperation {
            message: message.into(),
        }
    }

    /// True for both immutability violations.
    pub fn is_immutable(&self) -> bool {
        matches!(
            self,
            TreeError::ImmutableSet { .. } | TreeError::ImmutableDelete { .. }
        )
    }

    /// True for errors raised while declaring a class.
    pub fn is_declaration(&self) -> bool {
        matches!(
            self,
            TreeError::ReservedFieldName { .. }
                | TreeError::MutableDefault { .. }
                | TreeError::InvalidFieldKind { .. }
                | TreeError::DuplicateField { .. }
                | TreeError::DuplicateParameter { .. }
                | TreeError::NonDefaultAfterDefault { .. }
                | TreeError::ReservedHook { .. }
                | TreeError::DuplicateRegistration { .. }
        )
    }

    /// Add a path prefix to this error.
    ///
    /// Used when a lookup on a subtree fails and the error should report
    /// the location relative to the outer tree. Depth limits grow by the
    /// prefix length.
    pub fn with_prefix(self, prefix: &Path) -> Self {
        match self {
            TreeError::PathOutOfBounds { path, max_depth } => TreeError::PathOutOfBounds {
                path: prefix.join(&path),
                max_depth: max_depth + prefix.len(),
            },
            TreeError::AttributeNotFound { path } => TreeError::AttributeNotFound {
                path: prefix.join(&path),
            },
            TreeError::NotANode { path, found } => TreeError::NotANode {
                path: prefix.join(&path),
                found,
            },
            other => other,
        }
    }
}
