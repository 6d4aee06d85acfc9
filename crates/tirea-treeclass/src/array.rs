//! Minimal n-dimensional numeric array used as an opaque tree leaf.
//!
//! Arrays are row-major with an `Arc`-shared buffer, so cloning a tree that
//! holds large arrays only copies the skeleton. Every operation returns a
//! new array; buffers are never written in place.
//!
//! Broadcasting is deliberately narrow: two operands must have the same
//! shape, or one of them must be 0-d.

use crate::{TreeError, TreeResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Element type of an [`Array`], ordered by promotion rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    Int,
    Float,
}

impl DType {
    /// True for floating point element types.
    #[inline]
    pub fn is_inexact(self) -> bool {
        matches!(self, DType::Float)
    }

    /// Name as printed in error messages.
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int => "int64",
            DType::Float => "float64",
        }
    }

    fn tag(self) -> u8 {
        match self {
            DType::Bool => 0,
            DType::Int => 1,
            DType::Float => 2,
        }
    }
}

/// A single array element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Scalar {
    /// Element type of this scalar.
    pub fn dtype(self) -> DType {
        match self {
            Scalar::Bool(_) => DType::Bool,
            Scalar::Int(_) => DType::Int,
            Scalar::Float(_) => DType::Float,
        }
    }

    /// Numeric value as `f64`.
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Bool(b) => f64::from(u8::from(b)),
            Scalar::Int(i) => i as f64,
            Scalar::Float(f) => f,
        }
    }

    /// Python-style truthiness.
    pub fn truthy(self) -> bool {
        match self {
            Scalar::Bool(b) => b,
            Scalar::Int(i) => i != 0,
            Scalar::Float(f) => f != 0.0,
        }
    }

    /// Convert to another element type.
    pub fn cast(self, dtype: DType) -> Scalar {
        match dtype {
            DType::Bool => Scalar::Bool(self.truthy()),
            DType::Int => match self {
                Scalar::Bool(b) => Scalar::Int(i64::from(b)),
                Scalar::Int(i) => Scalar::Int(i),
                Scalar::Float(f) => Scalar::Int(f as i64),
            },
            DType::Float => Scalar::Float(self.as_f64()),
        }
    }

    /// Value equality across element types (`1 == 1.0 == true`).
    pub fn loose_eq(self, other: Scalar) -> bool {
        match (self, other) {
            (Scalar::Float(_), _) | (_, Scalar::Float(_)) => self.as_f64() == other.as_f64(),
            _ => self.cast(DType::Int) == other.cast(DType::Int),
        }
    }

    /// Equality used for hashed keys: [`Scalar::loose_eq`], except that
    /// NaN equals NaN so keys stay reflexive.
    pub(crate) fn key_eq(self, other: Scalar) -> bool {
        self.loose_eq(other) || (self.as_f64().is_nan() && other.as_f64().is_nan())
    }

    /// Canonical bits used for hashing. Agrees with [`Scalar::loose_eq`]
    /// for every value that survives an `f64` round trip.
    pub(crate) fn hash_bits(self) -> u64 {
        let f = self.as_f64();
        if f.is_nan() {
            f64::NAN.to_bits()
        } else if f == 0.0 {
            0
        } else {
            f.to_bits()
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Buffer {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl Buffer {
    fn len(&self) -> usize {
        match self {
            Buffer::Bool(v) => v.len(),
            Buffer::Int(v) => v.len(),
            Buffer::Float(v) => v.len(),
        }
    }

    fn dtype(&self) -> DType {
        match self {
            Buffer::Bool(_) => DType::Bool,
            Buffer::Int(_) => DType::Int,
            Buffer::Float(_) => DType::Float,
        }
    }

    fn get(&self, i: usize) -> Scalar {
        match self {
            Buffer::Bool(v) => Scalar::Bool(v[i]),
            Buffer::Int(v) => Scalar::Int(v[i]),
            Buffer::Float(v) => Scalar::Float(v[i]),
        }
    }

    fn collect(dtype: DType, values: impl IntoIterator<Item = Scalar>) -> Self {
        let values = values.into_iter().map(|s| s.cast(dtype));
        match dtype {
            DType::Bool => Buffer::Bool(values.map(|s| s.truthy()).collect()),
            DType::Int => Buffer::Int(
                values
                    .map(|s| match s {
                        Scalar::Int(i) => i,
                        other => other.as_f64() as i64,
                    })
                    .collect(),
            ),
            DType::Float => Buffer::Float(values.map(Scalar::as_f64).collect()),
        }
    }
}

/// An n-dimensional array of booleans, integers or floats.
#[derive(Clone, Debug)]
pub struct Array {
    shape: Vec<usize>,
    data: Arc<Buffer>,
}

impl Array {
    fn from_buffer(shape: Vec<usize>, data: Buffer) -> Self {
        Self {
            shape,
            data: Arc::new(data),
        }
    }

    /// 1-D boolean array.
    pub fn bool(values: Vec<bool>) -> Self {
        Self::from_buffer(vec![values.len()], Buffer::Bool(values))
    }

    /// 1-D integer array.
    pub fn int(values: Vec<i64>) -> Self {
        Self::from_buffer(vec![values.len()], Buffer::Int(values))
    }

    /// 1-D float array.
    pub fn float(values: Vec<f64>) -> Self {
        Self::from_buffer(vec![values.len()], Buffer::Float(values))
    }

    /// 0-d array holding one value.
    pub fn scalar(value: impl Into<Scalar>) -> Self {
        let value = value.into();
        Self::from_buffer(Vec::new(), Buffer::collect(value.dtype(), [value]))
    }

    /// Array of `shape` where every element is `value`.
    pub fn full(shape: &[usize], value: impl Into<Scalar>) -> Self {
        let value = value.into();
        let len = shape.iter().product();
        Self::from_buffer(
            shape.to_vec(),
            Buffer::collect(value.dtype(), std::iter::repeat(value).take(len)),
        )
    }

    /// Empty 1-D array of the given element type.
    pub fn empty(dtype: DType) -> Self {
        Self::from_buffer(vec![0], Buffer::collect(dtype, []))
    }

    /// Build an array from row-major elements, promoting to the widest
    /// element type present (`fallback` when `values` is empty).
    pub fn from_scalars(shape: Vec<usize>, values: Vec<Scalar>, fallback: DType) -> TreeResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(TreeError::ShapeMismatch {
                lhs: shape,
                rhs: vec![values.len()],
            });
        }
        let dtype = values.iter().map(|s| s.dtype()).max().unwrap_or(fallback);
        Ok(Self::from_buffer(shape, Buffer::collect(dtype, values)))
    }

    /// Same elements with a new shape.
    pub fn reshape(&self, shape: Vec<usize>) -> TreeResult<Self> {
        if shape.iter().product::<usize>() != self.len() {
            return Err(TreeError::ShapeMismatch {
                lhs: self.shape.clone(),
                rhs: shape,
            });
        }
        Ok(Self {
            shape,
            data: Arc::clone(&self.data),
        })
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// True when the element type is floating point.
    #[inline]
    pub fn is_inexact(&self) -> bool {
        self.dtype().is_inexact()
    }

    /// Element at a flat (row-major) index.
    pub fn get(&self, index: usize) -> Option<Scalar> {
        (index < self.len()).then(|| self.data.get(index))
    }

    /// Iterate over the elements in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = Scalar> + '_ {
        (0..self.len()).map(move |i| self.data.get(i))
    }

    /// The only element of a 0-d array.
    pub fn as_scalar(&self) -> Option<Scalar> {
        if self.shape.is_empty() {
            self.get(0)
        } else {
            None
        }
    }

    /// True if every element is truthy. Vacuously true when empty.
    pub fn all(&self) -> bool {
        self.iter().all(Scalar::truthy)
    }

    /// True if any element is truthy.
    pub fn any(&self) -> bool {
        self.iter().any(Scalar::truthy)
    }

    /// Shape and values equal; element types may differ.
    pub fn array_equal(&self, other: &Array) -> bool {
        self.shape == other.shape && self.iter().zip(other.iter()).all(|(a, b)| a.loose_eq(b))
    }

    /// Equality used for hashed keys: same dtype, shape and elements under
    /// [`Scalar::key_eq`]. Agrees with [`Array::digest`].
    pub(crate) fn key_equal(&self, other: &Array) -> bool {
        self.dtype() == other.dtype()
            && self.shape == other.shape
            && self.iter().zip(other.iter()).all(|(a, b)| a.key_eq(b))
    }

    /// Apply `f` to every element.
    pub fn map<F>(&self, mut f: F) -> TreeResult<Array>
    where
        F: FnMut(Scalar) -> TreeResult<Scalar>,
    {
        let values = self.iter().map(&mut f).collect::<TreeResult<Vec<_>>>()?;
        Array::from_scalars(self.shape.clone(), values, self.dtype())
    }

    /// Combine two arrays elementwise, broadcasting a 0-d operand.
    pub fn zip_with<F>(&self, other: &Array, mut f: F) -> TreeResult<Array>
    where
        F: FnMut(Scalar, Scalar) -> TreeResult<Scalar>,
    {
        let shape = broadcast_shape(&self.shape, &other.shape)?;
        let len = shape.iter().product();
        let values = (0..len)
            .map(|i| f(self.broadcast_get(i), other.broadcast_get(i)))
            .collect::<TreeResult<Vec<_>>>()?;
        Array::from_scalars(shape, values, self.dtype().max(other.dtype()))
    }

    /// Elementwise conditional select: `condition ? if_true : if_false`.
    ///
    /// `condition` must be boolean. Any operand may be 0-d and is then
    /// broadcast. The result takes the wider element type of the branches.
    pub fn select(condition: &Array, if_true: &Array, if_false: &Array) -> TreeResult<Array> {
        if condition.dtype() != DType::Bool {
            return Err(TreeError::NonBooleanMask {
                found: format!("array of dtype {}", condition.dtype().name()),
            });
        }
        let shape = broadcast_shape(&condition.shape, &if_true.shape)?;
        let shape = broadcast_shape(&shape, &if_false.shape)?;
        let dtype = if_true.dtype().max(if_false.dtype());
        let len = shape.iter().product();
        let values = (0..len).map(|i| {
            if condition.broadcast_get(i).truthy() {
                if_true.broadcast_get(i)
            } else {
                if_false.broadcast_get(i)
            }
        });
        Ok(Array::from_buffer(shape, Buffer::collect(dtype, values)))
    }

    /// Size-reducing selection of the elements where `mask` is true.
    ///
    /// Always returns a 1-D array. A 0-d mask selects everything or
    /// nothing.
    pub fn boolean_index(&self, mask: &Array) -> TreeResult<Array> {
        if mask.dtype() != DType::Bool {
            return Err(TreeError::NonBooleanMask {
                found: format!("array of dtype {}", mask.dtype().name()),
            });
        }
        if !mask.shape.is_empty() && mask.shape != self.shape {
            return Err(TreeError::ShapeMismatch {
                lhs: self.shape.clone(),
                rhs: mask.shape.clone(),
            });
        }
        let values: Vec<Scalar> = self
            .iter()
            .enumerate()
            .filter(|(i, _)| mask.broadcast_get(*i).truthy())
            .map(|(_, v)| v)
            .collect();
        let len = values.len();
        Ok(Array::from_buffer(
            vec![len],
            Buffer::collect(self.dtype(), values),
        ))
    }

    /// Elementwise AND of two boolean arrays.
    pub fn logical_and(&self, other: &Array) -> TreeResult<Array> {
        for a in [self, other] {
            if a.dtype() != DType::Bool {
                return Err(TreeError::NonBooleanMask {
                    found: format!("array of dtype {}", a.dtype().name()),
                });
            }
        }
        self.zip_with(other, |a, b| Ok(Scalar::Bool(a.truthy() && b.truthy())))
    }

    /// SHA-256 digest over element type, shape and little-endian element bytes.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update([self.dtype().tag()]);
        for dim in &self.shape {
            hasher.update((*dim as u64).to_le_bytes());
        }
        match self.data.as_ref() {
            Buffer::Bool(v) => {
                for b in v {
                    hasher.update([u8::from(*b)]);
                }
            }
            Buffer::Int(v) => {
                for i in v {
                    hasher.update(i.to_le_bytes());
                }
            }
            Buffer::Float(v) => {
                for f in v {
                    hasher.update(Scalar::Float(*f).hash_bits().to_le_bytes());
                }
            }
        }
        hasher.finalize().into()
    }

    /// Hash consistent with [`Array::array_equal`].
    pub(crate) fn hash_content<H: Hasher>(&self, state: &mut H) {
        self.shape.hash(state);
        for v in self.iter() {
            v.hash_bits().hash(state);
        }
    }

    fn broadcast_get(&self, i: usize) -> Scalar {
        if self.shape.is_empty() {
            self.data.get(0)
        } else {
            self.data.get(i)
        }
    }
}

/// Strict equality: same shape, same element type, same elements.
impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.data == other.data
    }
}

fn broadcast_shape(a: &[usize], b: &[usize]) -> TreeResult<Vec<usize>> {
    if a == b || b.is_empty() {
        Ok(a.to_vec())
    } else if a.is_empty() {
        Ok(b.to_vec())
    } else {
        Err(TreeError::ShapeMismatch {
            lhs: a.to_vec(),
            rhs: b.to_vec(),
        })
    }
}
