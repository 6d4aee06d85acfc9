//! Paths that address a position inside a tree.
//!
//! A path is the sequence of attribute names, dict keys and positional
//! indices leading from the root to a subtree. Flattening records one path
//! (the leaf's *trace*) per leaf, and the path-based `.at` selector matches
//! traces by prefix.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of a trace.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seg {
    /// Attribute name or dict key.
    Key(String),
    /// Position inside a list or tuple.
    Index(usize),
}

impl Seg {
    #[inline]
    pub fn key(k: impl Into<String>) -> Self {
        Seg::Key(k.into())
    }

    /// The attribute name or dict key, if this step is one.
    #[inline]
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Seg::Key(k) => Some(k),
            Seg::Index(_) => None,
        }
    }
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Key(k) => f.write_str(k),
            Seg::Index(i) => write!(f, "[{i}]"),
        }
    }
}

impl From<String> for Seg {
    fn from(s: String) -> Self {
        Seg::Key(s)
    }
}

impl From<&str> for Seg {
    fn from(s: &str) -> Self {
        Seg::Key(s.to_owned())
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i)
    }
}

/// Route from the root of a tree to one of its subtrees.
///
/// Displays in accessor form: keys joined by dots, indices in brackets.
///
/// ```
/// use tirea_treeclass::Path;
///
/// let trace = Path::root().key("blocks").index(1).key("bias");
/// assert_eq!(trace.to_string(), "blocks[1].bias");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path(Vec<Seg>);

impl Path {
    /// The empty route, addressing the whole tree.
    #[inline]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    #[inline]
    pub fn key(mut self, k: impl Into<String>) -> Self {
        self.0.push(Seg::Key(k.into()));
        self
    }

    #[inline]
    pub fn index(mut self, i: usize) -> Self {
        self.0.push(Seg::Index(i));
        self
    }

    #[inline]
    pub fn push(&mut self, seg: Seg) {
        self.0.push(seg);
    }

    #[inline]
    pub fn pop(&mut self) -> Option<Seg> {
        self.0.pop()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of steps; a leaf's trace length is its depth.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn last(&self) -> Option<&Seg> {
        self.0.last()
    }

    /// `self` followed by every step of `tail`.
    pub fn join(&self, tail: &Path) -> Path {
        let mut joined = self.clone();
        joined.0.extend_from_slice(&tail.0);
        joined
    }

    /// True when `trace` starts with every step of `self`.
    ///
    /// This is how path selection decides which leaves it covers: a leaf
    /// is selected when the selector is a prefix of its trace.
    ///
    /// ```
    /// use tirea_treeclass::path;
    ///
    /// let block = path!("blocks", 0);
    /// assert!(block.is_prefix_of(&path!("blocks", 0, "weight")));
    /// assert!(block.is_prefix_of(&block));
    /// assert!(!block.is_prefix_of(&path!("blocks", 1, "weight")));
    /// ```
    #[inline]
    pub fn is_prefix_of(&self, trace: &Path) -> bool {
        trace.0.starts_with(&self.0)
    }

    /// The route to the enclosing subtree; `None` at the root.
    pub fn parent(&self) -> Option<Path> {
        let (_, init) = self.0.split_last()?;
        Some(Path(init.to_vec()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Seg> {
        self.0.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 && seg.as_key().is_some() {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl IntoIterator for Path {
    type Item = Seg;
    type IntoIter = std::vec::IntoIter<Seg>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Seg;
    type IntoIter = std::slice::Iter<'a, Seg>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for Path {
    type Output = Seg;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

/// Parse a dotted path such as `"encoder.layers[0].weight"`.
///
/// Dots separate keys. `[n]` and bare all-digit segments become index
/// segments; any other bracketed text (optionally quoted) becomes a key.
/// Empty segments are skipped, so `""` is the root path.
///
/// ```
/// use tirea_treeclass::{parse_path, path};
///
/// assert_eq!(parse_path("a.b[0].c"), path!("a", "b", 0, "c"));
/// assert_eq!(parse_path("items.1"), path!("items", 1));
/// assert_eq!(parse_path("cfg['lr']"), path!("cfg", "lr"));
/// ```
pub fn parse_path(path: &str) -> Path {
    let mut result = Path::root();
    for part in path.split('.') {
        let (head, mut rest) = match part.find('[') {
            Some(pos) => part.split_at(pos),
            None => (part, ""),
        };
        if !head.is_empty() {
            result.push(bare_segment(head));
        }
        while let Some(body) = rest.strip_prefix('[') {
            match body.find(']') {
                Some(end) => {
                    result.push(bracket_segment(&body[..end]));
                    rest = &body[end + 1..];
                }
                None => {
                    // Unclosed bracket: keep the remainder verbatim as a key.
                    result.push(Seg::key(rest));
                    rest = "";
                }
            }
        }
        if !rest.is_empty() {
            result.push(Seg::key(rest));
        }
    }
    result
}

fn bare_segment(text: &str) -> Seg {
    match text.parse::<usize>() {
        Ok(i) if text.bytes().all(|b| b.is_ascii_digit()) => Seg::Index(i),
        _ => Seg::key(text),
    }
}

fn bracket_segment(text: &str) -> Seg {
    let text = text.trim();
    for quote in ['\'', '"'] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|t| t.strip_suffix(quote))
        {
            return Seg::key(inner);
        }
    }
    bare_segment(text)
}

/// Build a [`Path`] from keys (string literals) and indices (integers).
///
/// ```
/// use tirea_treeclass::{path, Path};
///
/// assert_eq!(path!("blocks", 1, "bias"), Path::root().key("blocks").index(1).key("bias"));
/// assert!(path!().is_empty());
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {{
        let mut p = $crate::Path::root();
        $(
            p.push($crate::path!(@seg $seg));
        )+
        p
    }};
    (@seg $seg:expr) => {
        $crate::Seg::from($seg)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_indexing() {
        let trace = Path::root().key("blocks").index(1).key("bias");
        assert_eq!(trace.len(), 3);
        assert_eq!(trace[0], Seg::key("blocks"));
        assert_eq!(trace[1], Seg::Index(1));
        assert_eq!(trace, path!("blocks", 1, "bias"));
    }

    #[test]
    fn test_accessor_display() {
        assert_eq!(path!("blocks", 1, "bias").to_string(), "blocks[1].bias");
        assert_eq!(path!(1, "a").to_string(), "[1].a");
        assert_eq!(path!(0, 2).to_string(), "[0][2]");
        assert_eq!(Path::root().to_string(), "");
    }

    #[test]
    fn test_join_and_parent() {
        let joined = path!("encoder").join(&path!("blocks", 2));
        assert_eq!(joined, path!("encoder", "blocks", 2));
        assert_eq!(joined.parent(), Some(path!("encoder", "blocks")));
        assert_eq!(path!("x").parent(), Some(Path::root()));
        assert_eq!(Path::root().parent(), None);
    }

    #[test]
    fn test_prefix_is_stepwise() {
        assert!(Path::root().is_prefix_of(&path!("a")));
        assert!(path!("a").is_prefix_of(&path!("a", 0)));
        assert!(!path!("a", 1).is_prefix_of(&path!("a", 0)));
        // Steps are compared whole, not as text.
        assert!(!path!("ab").is_prefix_of(&path!("a", "b")));
    }

    #[test]
    fn test_parse_path_forms() {
        assert!(parse_path("").is_empty());
        assert_eq!(parse_path("bias"), path!("bias"));
        assert_eq!(parse_path("encoder.bias"), path!("encoder", "bias"));
        assert_eq!(parse_path("a[0][1]"), path!("a", 0, 1));
        assert_eq!(parse_path("a.0"), path!("a", 0));
        assert_eq!(parse_path("d[\"k\"]"), path!("d", "k"));
        assert_eq!(parse_path("x[abc]"), path!("x", "abc"));
        assert_eq!(parse_path("x[1"), path!("x", "[1"));
    }

    #[test]
    fn test_parse_path_inverts_display() {
        let trace = path!("encoder", "blocks", 3, "bias");
        assert_eq!(parse_path(&trace.to_string()), trace);
    }

    #[test]
    fn test_serializes_as_flat_array() {
        let trace = path!("blocks", 0);
        let json = serde_json::to_string(&trace).unwrap();
        assert_eq!(json, r#"["blocks",0]"#);
        let back: Path = serde_json::from_str(&json).unwrap();
        assert_eq!(back, trace);
    }
}
