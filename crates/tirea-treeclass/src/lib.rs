//! Immutable tree classes with field metadata, leaf freezing and indexed
//! updates.
//!
//! `tirea-treeclass` models nested data as a [`Tree`]: scalars, strings
//! and arrays are leaves; lists, tuples, dicts and tree class instances
//! are structure. Instances are declared from [`Field`]s, locked after
//! construction, and updated only by producing new trees.
//!
//! # Core Concepts
//!
//! - **TreeClass**: A class declared from fields; building it registers a
//!   flatten/unflatten codec for its instances
//! - **Node**: An instance, locked once constructed
//! - **freeze / tree_mask**: Hide leaves from traversal and bring them back
//! - **`.at`**: Select leaves by path or boolean mask and read, set or
//!   transform exactly those leaves
//! - **is_tree_equal**: Structural equality that compares arrays by value
//!
//! # Functional Updates
//!
//! ```text
//! Tree' = tree.at(selector).set(value)
//! ```
//!
//! - The input tree is never modified
//! - Mutating methods run on a copy inside a [`MutableScope`]
//!
//! # Quick Start
//!
//! ```
//! use tirea_treeclass::{is_tree_equal, Args, Field, Tree, TreeClass};
//!
//! let point = TreeClass::builder("Point")
//!     .field(Field::new("x").default(0))
//!     .field(Field::new("y").default(0))
//!     .build()
//!     .unwrap();
//!
//! let p = point.construct(Args::new().arg(1).arg(2)).unwrap();
//! assert_eq!(p.to_string(), "Point(x=1, y=2)");
//!
//! // Instances are locked
//! let mut locked = p.clone();
//! assert!(locked.as_node_mut().unwrap().set_attr("x", 5).is_err());
//!
//! // Updates return a new tree
//! let moved = p.at("x").unwrap().set(5).unwrap();
//! assert_eq!(moved.to_string(), "Point(x=5, y=2)");
//! assert!(!is_tree_equal(&p, &moved));
//! ```
//!
//! # Freezing and Masking
//!
//! ```
//! use tirea_treeclass::{leaves, tree_mask, tree_unmask, Array, Mask, Tree};
//!
//! let tree = Tree::list([Tree::from(1), Tree::Array(Array::float(vec![0.5, 1.5]))]);
//!
//! // Non-differentiable leaves (the int) are frozen by default
//! let masked = tree_mask(&tree, Mask::default(), None).unwrap();
//! assert_eq!(leaves(&masked, None).len(), 1);
//!
//! let restored = tree_unmask(&masked, Mask::all()).unwrap();
//! assert_eq!(restored, tree);
//! ```

mod array;
mod bcmap;
mod class;
mod error;
mod field;
mod flatten;
mod freeze;
mod indexer;
mod json;
mod mask;
mod mutable;
mod node;
mod ops;
mod path;
mod pprint;
mod registry;
mod tree;
mod tree_util;

// Core types
pub use array::{Array, DType, Scalar};
pub use error::{TreeError, TreeResult};
pub use path::{parse_path, Path, Seg};
pub use tree::{Tree, TypeTag};

// Classes and instances
pub use class::{Args, ClassBuilder, InitFn, Method, PostInit, TreeClass, FROZEN_SENTINEL};
pub use field::{Callback, Field, FieldKind};
pub use mutable::{with_mutable, with_mutable_in_place, MutableScope};
pub use node::Node;
pub use registry::{
    fields, is_registered, register_node, FieldCodec, NodeAux, NodeCodec, Overwrite, TypeKey,
};

// Traversal
pub use flatten::{
    flatten, flatten_with_trace, leaves, structure_of, tree_map, unflatten, IsLeaf, TreeDef,
};
pub use tree_util::{is_tree_equal, tree_copy, tree_hash};

// Freezing and masking
pub use freeze::{def_freeze, freeze, is_frozen, unfreeze, FreezeHandler, Frozen};
pub use mask::{def_nondiff, is_nondiff, tree_mask, tree_unmask, Mask, NondiffHandler};

// Leafwise operations and indexing
pub use bcmap::{bcmap, Bcmap};
pub use indexer::{At, Selector};
pub use ops::{tree_binary, tree_compare, BinaryOp, CompareOp, UnaryOp};

// Re-export serde_json::Value for convenience
pub use serde_json::Value;
