//! Python-like `Display` for trees.

use crate::{Array, Frozen, Node, Scalar, Tree};
use std::fmt;

fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    if x.is_nan() {
        f.write_str("nan")
    } else if x.is_infinite() {
        f.write_str(if x > 0.0 { "inf" } else { "-inf" })
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        write!(f, "{x:.1}")
    } else {
        write!(f, "{x}")
    }
}

fn write_str_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in s.chars() {
        match c {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("'")
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(true) => f.write_str("True"),
            Scalar::Bool(false) => f.write_str("False"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write_float(f, *x),
        }
    }
}

/// Array element in numpy style: integral floats end in a bare dot.
fn write_element(f: &mut fmt::Formatter<'_>, s: Scalar) -> fmt::Result {
    match s {
        Scalar::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 => {
            write!(f, "{x:.0}.")
        }
        other => write!(f, "{other}"),
    }
}

fn write_block(
    f: &mut fmt::Formatter<'_>,
    array: &Array,
    shape: &[usize],
    offset: usize,
    depth: usize,
) -> fmt::Result {
    f.write_str("[")?;
    match shape {
        [] => {}
        [n] => {
            for i in 0..*n {
                if i > 0 {
                    f.write_str(" ")?;
                }
                if let Some(s) = array.get(offset + i) {
                    write_element(f, s)?;
                }
            }
        }
        [n, rest @ ..] => {
            let stride: usize = rest.iter().product();
            for i in 0..*n {
                if i > 0 {
                    write!(f, "\n{:width$}", "", width = depth + 1)?;
                }
                write_block(f, array, rest, offset + i * stride, depth + 1)?;
            }
        }
    }
    f.write_str("]")
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_scalar() {
            Some(s) => write_element(f, s),
            None => write_block(f, self, self.shape(), 0, 0),
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Tree]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tree::None => f.write_str("None"),
            Tree::Bool(b) => write!(f, "{}", Scalar::Bool(*b)),
            Tree::Int(i) => write!(f, "{i}"),
            Tree::Float(x) => write_float(f, *x),
            Tree::Str(s) => write_str_literal(f, s),
            Tree::Array(a) => write!(f, "{a}"),
            Tree::List(items) => {
                f.write_str("[")?;
                write_items(f, items)?;
                f.write_str("]")
            }
            Tree::Tuple(items) => {
                f.write_str("(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Tree::Dict(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_str_literal(f, k)?;
                    write!(f, ": {v}")?;
                }
                f.write_str("}")
            }
            Tree::Node(node) => write!(f, "{node}"),
            Tree::Frozen(frozen) => write!(f, "{frozen}"),
        }
    }
}

/// `Name(a=1, b=2)`; fields declared with `repr(false)` are hidden.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.class_name())?;
        let mut first = true;
        for field in self.fields().iter().filter(|field| field.is_repr()) {
            let Some(value) = self.attr(field.name()) else {
                continue;
            };
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}={value}", field.name())?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Frozen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frozen::Hashable(inner) => write!(f, "#{inner}"),
            Frozen::Array(a) => write!(f, "#{a}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{freeze, Args, Field, TreeClass};

    #[test]
    fn test_scalars() {
        assert_eq!(Tree::None.to_string(), "None");
        assert_eq!(Tree::Bool(true).to_string(), "True");
        assert_eq!(Tree::Int(-3).to_string(), "-3");
        assert_eq!(Tree::Float(2.0).to_string(), "2.0");
        assert_eq!(Tree::Float(0.25).to_string(), "0.25");
        assert_eq!(Tree::Float(f64::NAN).to_string(), "nan");
        assert_eq!(Tree::from("it's").to_string(), "'it\\'s'");
    }

    #[test]
    fn test_containers() {
        assert_eq!(Tree::list([Tree::from(1), Tree::from(2)]).to_string(), "[1, 2]");
        assert_eq!(Tree::tuple([Tree::from(1)]).to_string(), "(1,)");
        assert_eq!(Tree::Tuple(vec![]).to_string(), "()");
        assert_eq!(
            Tree::dict([("a", Tree::from(1)), ("b", Tree::None)]).to_string(),
            "{'a': 1, 'b': None}"
        );
    }

    #[test]
    fn test_arrays() {
        assert_eq!(Array::int(vec![1, 2, 3]).to_string(), "[1 2 3]");
        assert_eq!(Array::float(vec![1.0, 2.5]).to_string(), "[1. 2.5]");
        assert_eq!(Array::bool(vec![true, false]).to_string(), "[True False]");
        assert_eq!(Array::scalar(4i64).to_string(), "4");
        assert_eq!(Array::empty(crate::DType::Int).to_string(), "[]");
        let matrix = Array::int(vec![1, 2, 3, 4]).reshape(vec![2, 2]).unwrap();
        assert_eq!(matrix.to_string(), "[[1 2]\n [3 4]]");
    }

    #[test]
    fn test_frozen_prefix() {
        assert_eq!(freeze(1).to_string(), "#1");
        assert_eq!(freeze(Array::int(vec![1, 2])).to_string(), "#[1 2]");
    }

    #[test]
    fn test_node_hides_repr_false_fields() {
        let class = TreeClass::builder("Shown")
            .field(Field::new("a").default(1))
            .field(Field::new("secret").default("x").repr(false))
            .field(Field::new("c").default(freeze(2.0)))
            .build()
            .unwrap();
        let node = class.construct(Args::new()).unwrap();
        assert_eq!(node.to_string(), "Shown(a=1, c=#2.0)");
    }
}
