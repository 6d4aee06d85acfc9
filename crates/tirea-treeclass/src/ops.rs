//! Leaf operators and their tree-wide broadcast forms.
//!
//! Operators work on single leaves with Python-like semantics: integers
//! promote to floats, `/` is true division, `+` concatenates strings, and
//! arrays operate elementwise against scalars or same-shape arrays. Any
//! operator touching a frozen value fails with
//! [`TreeError::FrozenOperation`].

use crate::{bcmap, Array, DType, IsLeaf, Scalar, Tree, TreeError, TreeResult};
use std::cmp::Ordering;

/// Binary leaf operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Min,
    Max,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "**",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

/// Comparison leaf operator. Results are booleans, or boolean arrays for
/// array operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn test(self, ord: Option<Ordering>) -> bool {
        match (self, ord) {
            (CompareOp::Eq, Some(o)) => o == Ordering::Equal,
            (CompareOp::Ne, Some(o)) => o != Ordering::Equal,
            (CompareOp::Ne, None) => true,
            (CompareOp::Lt, Some(o)) => o == Ordering::Less,
            (CompareOp::Le, Some(o)) => o != Ordering::Greater,
            (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
            (CompareOp::Ge, Some(o)) => o != Ordering::Less,
            (_, None) => false,
        }
    }
}

/// Unary leaf operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Abs,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Abs => "abs",
            UnaryOp::Not => "not",
        }
    }
}

/// Numeric scalar leaves. 0-d arrays are arrays, not numbers.
fn number(tree: &Tree) -> Option<Scalar> {
    match tree {
        Tree::Bool(b) => Some(Scalar::Bool(*b)),
        Tree::Int(i) => Some(Scalar::Int(*i)),
        Tree::Float(f) => Some(Scalar::Float(*f)),
        _ => None,
    }
}

/// Array view of an operand; numbers become 0-d arrays.
fn array_operand(tree: &Tree) -> Option<Array> {
    match tree {
        Tree::Array(a) => Some(a.clone()),
        other => number(other).map(Array::scalar),
    }
}

fn as_i64(s: Scalar) -> i64 {
    match s {
        Scalar::Bool(b) => i64::from(b),
        Scalar::Int(i) => i,
        Scalar::Float(f) => f as i64,
    }
}

fn overflow(op: BinaryOp) -> TreeError {
    TreeError::invalid_value(format!("integer overflow in `{}`", op.symbol()))
}

fn scalar_binary(op: BinaryOp, a: Scalar, b: Scalar) -> TreeResult<Scalar> {
    let integral = a.dtype() != DType::Float && b.dtype() != DType::Float;
    let (x, y) = (a.as_f64(), b.as_f64());
    if integral {
        let (i, j) = (as_i64(a), as_i64(b));
        let int = |v: Option<i64>| v.map(Scalar::Int).ok_or_else(|| overflow(op));
        return match op {
            BinaryOp::Add => int(i.checked_add(j)),
            BinaryOp::Sub => int(i.checked_sub(j)),
            BinaryOp::Mul => int(i.checked_mul(j)),
            BinaryOp::Div if j == 0 => Err(TreeError::invalid_value("division by zero")),
            BinaryOp::Div => Ok(Scalar::Float(x / y)),
            BinaryOp::Pow => match u32::try_from(j) {
                Ok(exp) => int(i.checked_pow(exp)),
                Err(_) if j < 0 => Ok(Scalar::Float(x.powf(y))),
                Err(_) => Err(overflow(op)),
            },
            BinaryOp::Min => Ok(if j < i { b } else { a }),
            BinaryOp::Max => Ok(if j > i { b } else { a }),
            BinaryOp::And | BinaryOp::Or if a.dtype() == DType::Bool && b.dtype() == DType::Bool => {
                let (p, q) = (a.truthy(), b.truthy());
                Ok(Scalar::Bool(if op == BinaryOp::And { p && q } else { p || q }))
            }
            BinaryOp::And => Ok(Scalar::Int(i & j)),
            BinaryOp::Or => Ok(Scalar::Int(i | j)),
        };
    }
    match op {
        BinaryOp::Add => Ok(Scalar::Float(x + y)),
        BinaryOp::Sub => Ok(Scalar::Float(x - y)),
        BinaryOp::Mul => Ok(Scalar::Float(x * y)),
        BinaryOp::Div if y == 0.0 => Err(TreeError::invalid_value("float division by zero")),
        BinaryOp::Div => Ok(Scalar::Float(x / y)),
        BinaryOp::Pow => Ok(Scalar::Float(x.powf(y))),
        BinaryOp::Min => Ok(if y < x { b } else { a }),
        BinaryOp::Max => Ok(if y > x { b } else { a }),
        BinaryOp::And | BinaryOp::Or => Err(TreeError::leaf_type(
            op.symbol(),
            a.dtype().name(),
            b.dtype().name(),
        )),
    }
}

fn scalar_compare(op: CompareOp, a: Scalar, b: Scalar) -> Scalar {
    let ord = if a.dtype() != DType::Float && b.dtype() != DType::Float {
        Some(as_i64(a).cmp(&as_i64(b)))
    } else {
        a.as_f64().partial_cmp(&b.as_f64())
    };
    Scalar::Bool(op.test(ord))
}

impl Tree {
    /// Apply a binary operator to two leaves.
    ///
    /// ```
    /// use tirea_treeclass::{BinaryOp, Tree};
    ///
    /// assert_eq!(Tree::Int(1).binary(BinaryOp::Add, &Tree::Float(0.5)).unwrap(), Tree::Float(1.5));
    /// assert_eq!(Tree::Int(3).binary(BinaryOp::Div, &Tree::Int(2)).unwrap(), Tree::Float(1.5));
    /// assert!(Tree::Int(1).binary(BinaryOp::Add, &Tree::from("a")).is_err());
    /// ```
    pub fn binary(&self, op: BinaryOp, rhs: &Tree) -> TreeResult<Tree> {
        match (self, rhs) {
            (Tree::Frozen(_), _) | (_, Tree::Frozen(_)) => {
                return Err(TreeError::FrozenOperation { op: op.symbol() })
            }
            (Tree::Str(a), Tree::Str(b)) if op == BinaryOp::Add => {
                return Ok(Tree::Str(format!("{a}{b}")))
            }
            _ => {}
        }
        if let (Some(x), Some(y)) = (number(self), number(rhs)) {
            return Ok(scalar_binary(op, x, y)?.into());
        }
        match (array_operand(self), array_operand(rhs)) {
            (Some(a), Some(b)) => Ok(Tree::Array(a.zip_with(&b, |x, y| scalar_binary(op, x, y))?)),
            _ => Err(TreeError::leaf_type(op.symbol(), self.type_name(), rhs.type_name())),
        }
    }

    /// Compare two leaves.
    ///
    /// Equality between unrelated kinds is `false`; ordering between them
    /// is an error.
    pub fn compare(&self, op: CompareOp, rhs: &Tree) -> TreeResult<Tree> {
        match (self, rhs) {
            (Tree::Frozen(_), _) | (_, Tree::Frozen(_)) => {
                return Err(TreeError::FrozenOperation { op: op.symbol() })
            }
            (Tree::Str(a), Tree::Str(b)) => return Ok(Tree::Bool(op.test(Some(a.cmp(b))))),
            _ => {}
        }
        if let (Some(x), Some(y)) = (number(self), number(rhs)) {
            return Ok(scalar_compare(op, x, y).into());
        }
        match (array_operand(self), array_operand(rhs)) {
            (Some(a), Some(b)) => Ok(Tree::Array(
                a.zip_with(&b, |x, y| Ok(scalar_compare(op, x, y)))?,
            )),
            _ => match op {
                CompareOp::Eq => Ok(Tree::Bool(self == rhs)),
                CompareOp::Ne => Ok(Tree::Bool(self != rhs)),
                _ => Err(TreeError::leaf_type(op.symbol(), self.type_name(), rhs.type_name())),
            },
        }
    }

    /// Apply a unary operator to a leaf.
    pub fn unary(&self, op: UnaryOp) -> TreeResult<Tree> {
        let scalar = |s: Scalar| -> TreeResult<Scalar> {
            match (op, s) {
                (UnaryOp::Not, Scalar::Bool(b)) => Ok(Scalar::Bool(!b)),
                (UnaryOp::Not, other) => {
                    Err(TreeError::leaf_type(op.symbol(), other.dtype().name(), ""))
                }
                (UnaryOp::Neg, Scalar::Float(f)) => Ok(Scalar::Float(-f)),
                (UnaryOp::Abs, Scalar::Float(f)) => Ok(Scalar::Float(f.abs())),
                (UnaryOp::Neg, other) => as_i64(other)
                    .checked_neg()
                    .map(Scalar::Int)
                    .ok_or_else(|| TreeError::invalid_value("integer overflow in `-`")),
                (UnaryOp::Abs, other) => as_i64(other)
                    .checked_abs()
                    .map(Scalar::Int)
                    .ok_or_else(|| TreeError::invalid_value("integer overflow in `abs`")),
            }
        };
        match self {
            Tree::Frozen(_) => Err(TreeError::FrozenOperation { op: op.symbol() }),
            Tree::Array(a) => Ok(Tree::Array(a.map(scalar)?)),
            other => match number(other) {
                Some(s) => Ok(scalar(s)?.into()),
                None => Err(TreeError::leaf_type(op.symbol(), other.type_name(), "")),
            },
        }
    }
}

/// Apply `op` leafwise. `rhs` is zipped with `lhs` when it has the same
/// structure and broadcast otherwise.
pub fn tree_binary(lhs: &Tree, op: BinaryOp, rhs: &Tree, is_leaf: IsLeaf<'_>) -> TreeResult<Tree> {
    let mapped = bcmap(|args: &[Tree]| args[0].binary(op, &args[1]));
    let mapped = match is_leaf {
        Some(pred) => mapped.is_leaf(pred),
        None => mapped,
    };
    mapped.call(&[lhs.clone(), rhs.clone()])
}

/// Compare leafwise, producing a boolean mask tree.
///
/// ```
/// use tirea_treeclass::{leaves, tree_compare, CompareOp, Tree};
///
/// let tree = Tree::list([Tree::from(-1), Tree::from(2)]);
/// let mask = tree_compare(&tree, CompareOp::Gt, &Tree::Int(0), None).unwrap();
/// assert_eq!(leaves(&mask, None), vec![Tree::Bool(false), Tree::Bool(true)]);
/// ```
pub fn tree_compare(lhs: &Tree, op: CompareOp, rhs: &Tree, is_leaf: IsLeaf<'_>) -> TreeResult<Tree> {
    let mapped = bcmap(|args: &[Tree]| args[0].compare(op, &args[1]));
    let mapped = match is_leaf {
        Some(pred) => mapped.is_leaf(pred),
        None => mapped,
    };
    mapped.call(&[lhs.clone(), rhs.clone()])
}
