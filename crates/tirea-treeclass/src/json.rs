//! JSON interop.
//!
//! JSON has no tuples, arrays, instances or frozen wrappers, so the
//! mapping is lossy in one direction: `to_json` renders arrays as nested
//! lists, instances as objects of their attributes and frozen values as
//! the value they wrap. Reading JSON only ever produces `None`, scalars,
//! strings, lists and dicts.

use crate::{Array, Scalar, Tree, TreeResult};
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};

impl Tree {
    /// Convert a JSON value.
    ///
    /// Integers that fit in `i64` become `Int`; every other number becomes
    /// `Float`.
    pub fn from_json(value: &Value) -> Tree {
        match value {
            Value::Null => Tree::None,
            Value::Bool(b) => Tree::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Tree::Int(i),
                None => Tree::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Tree::Str(s.clone()),
            Value::Array(items) => Tree::List(items.iter().map(Tree::from_json).collect()),
            Value::Object(map) => Tree::Dict(
                map.iter()
                    .map(|(k, v)| (k.clone(), Tree::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Parse a JSON document.
    ///
    /// ```
    /// use tirea_treeclass::Tree;
    ///
    /// let tree = Tree::from_json_str(r#"{"a": [1, 2.5, null]}"#).unwrap();
    /// assert_eq!(
    ///     tree,
    ///     Tree::dict([("a", Tree::list([Tree::from(1), Tree::from(2.5), Tree::None]))]),
    /// );
    /// ```
    pub fn from_json_str(s: &str) -> TreeResult<Tree> {
        let value: Value = serde_json::from_str(s)?;
        Ok(Tree::from_json(&value))
    }

    /// Render as JSON. Non-finite floats become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            Tree::None => Value::Null,
            Tree::Bool(b) => Value::Bool(*b),
            Tree::Int(i) => Value::from(*i),
            Tree::Float(x) => float_json(*x),
            Tree::Str(s) => Value::String(s.clone()),
            Tree::Array(a) => array_json(a, a.shape(), 0),
            Tree::List(items) | Tree::Tuple(items) => {
                Value::Array(items.iter().map(Tree::to_json).collect())
            }
            Tree::Dict(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
            Tree::Node(node) => Value::Object(
                node.attrs()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
            Tree::Frozen(frozen) => frozen.to_tree().to_json(),
        }
    }
}

fn float_json(x: f64) -> Value {
    Number::from_f64(x).map_or(Value::Null, Value::Number)
}

fn scalar_json(s: Scalar) -> Value {
    match s {
        Scalar::Bool(b) => Value::Bool(b),
        Scalar::Int(i) => Value::from(i),
        Scalar::Float(x) => float_json(x),
    }
}

fn array_json(array: &Array, shape: &[usize], offset: usize) -> Value {
    match shape {
        [] => array.get(offset).map_or(Value::Null, scalar_json),
        [n, rest @ ..] => {
            let stride: usize = rest.iter().product();
            Value::Array(
                (0..*n)
                    .map(|i| array_json(array, rest, offset + i * stride))
                    .collect(),
            )
        }
    }
}

impl From<Value> for Tree {
    fn from(value: Value) -> Self {
        Tree::from_json(&value)
    }
}

impl From<&Value> for Tree {
    fn from(value: &Value) -> Self {
        Tree::from_json(value)
    }
}

impl Serialize for Tree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{freeze, Args, Field, TreeClass, TreeError};
    use serde_json::json;

    #[test]
    fn test_from_json() {
        let tree = Tree::from(json!({
            "name": "layer",
            "sizes": [1, 2, 3],
            "rate": 0.5,
            "bias": null,
            "on": true
        }));
        assert_eq!(
            tree,
            Tree::dict([
                ("bias", Tree::None),
                ("name", Tree::from("layer")),
                ("on", Tree::from(true)),
                ("rate", Tree::from(0.5)),
                ("sizes", Tree::list([Tree::from(1), Tree::from(2), Tree::from(3)])),
            ])
        );
    }

    #[test]
    fn test_to_json_arrays_and_tuples() {
        let matrix = Array::int(vec![1, 2, 3, 4]).reshape(vec![2, 2]).unwrap();
        let tree = Tree::tuple([Tree::Array(matrix), Tree::Array(Array::scalar(1.5))]);
        assert_eq!(tree.to_json(), json!([[[1, 2], [3, 4]], 1.5]));
        assert_eq!(Tree::Float(f64::INFINITY).to_json(), json!(null));
    }

    #[test]
    fn test_to_json_nodes_and_frozen() {
        let class = TreeClass::builder("Config")
            .field(Field::new("lr").default(0.1))
            .field(Field::new("name").default("adam").frozen(true))
            .build()
            .unwrap();
        let node = class.construct(Args::new()).unwrap();
        assert_eq!(node.to_json(), json!({"lr": 0.1, "name": "adam"}));
        assert_eq!(freeze(Tree::list([Tree::from(1)])).to_json(), json!([1]));
    }

    #[test]
    fn test_serialize_matches_to_json() {
        let tree = Tree::dict([("a", Tree::list([Tree::from(1), Tree::None]))]);
        let text = serde_json::to_string(&tree).unwrap();
        assert_eq!(text, r#"{"a":[1,null]}"#);
    }

    #[test]
    fn test_invalid_json() {
        let err = Tree::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, TreeError::Serialization(_)));
    }
}
