//! The generic document tree.
//!
//! Every resolution step works on [`Node`] rather than on the typed
//! configuration. A node is a closed union of scalars, sequences and
//! order-preserving mappings, so path traversal is plain pattern matching.

use derive_more::Display;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::path::{APPEND, Path, parse_index};
use crate::{Error, Result};

/// Ordered mapping with unique string keys.
pub type Mapping = IndexMap<String, Node>;

/// A leaf value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Display)]
#[serde(untagged)]
pub enum Scalar {
    #[display("")]
    Null,
    #[display("{_0}")]
    Bool(bool),
    #[display("{_0}")]
    Int(i64),
    #[display("{_0}")]
    Float(f64),
    #[display("{_0}")]
    String(String),
}

impl Scalar {
    /// Read free text the way a config file would: booleans and numbers
    /// become native, everything else stays a string.
    ///
    /// Only text that prints back unchanged is converted, so `0123` and
    /// `1.10` stay strings.
    pub fn infer(text: &str) -> Self {
        match text {
            "true" => return Scalar::Bool(true),
            "false" => return Scalar::Bool(false),
            _ => {}
        }
        if let Ok(i) = text.parse::<i64>() {
            if i.to_string() == text {
                return Scalar::Int(i);
            }
        }
        if text.contains('.') {
            if let Ok(f) = text.parse::<f64>() {
                if f.is_finite() && f.to_string() == text {
                    return Scalar::Float(f);
                }
            }
        }
        Scalar::String(text.to_string())
    }
}

/// A document node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Scalar(Scalar),
    Sequence(Vec<Node>),
    Mapping(Mapping),
}

impl Default for Node {
    fn default() -> Self {
        Node::Scalar(Scalar::Null)
    }
}

impl Node {
    pub fn null() -> Self {
        Self::default()
    }

    pub fn mapping() -> Self {
        Node::Mapping(Mapping::new())
    }

    pub fn sequence() -> Self {
        Node::Sequence(Vec::new())
    }

    /// Build a node from any serializable value.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        let json = serde_json::to_value(value)?;
        Ok(serde_json::from_value(json)?)
    }

    /// Decode this node into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let json = serde_json::to_value(self)?;
        Ok(serde_json::from_value(json)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Node::Scalar(Scalar::Null) => "null",
            Node::Scalar(Scalar::Bool(_)) => "boolean",
            Node::Scalar(Scalar::Int(_)) | Node::Scalar(Scalar::Float(_)) => "number",
            Node::Scalar(Scalar::String(_)) => "string",
            Node::Sequence(_) => "sequence",
            Node::Mapping(_) => "mapping",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Scalar(Scalar::Null))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Node::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a direct mapping child.
    pub fn field(&self, key: &str) -> Option<&Node> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    /// Render a node for embedding into a larger string.
    ///
    /// Scalars use their plain text form, containers are rendered as JSON.
    pub fn to_text(&self) -> String {
        match self {
            Node::Scalar(s) => s.to_string(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }

    pub fn get(&self, path: &str) -> Result<&Node> {
        self.get_path(&Path::parse(path))
    }

    pub fn get_path(&self, path: &Path) -> Result<&Node> {
        let mut current = self;
        for (depth, segment) in path.segments().iter().enumerate() {
            let next = match current {
                Node::Mapping(map) => map.get(segment),
                Node::Sequence(items) => parse_index(segment).and_then(|i| items.get(i)),
                Node::Scalar(_) => None,
            };
            current = next.ok_or_else(|| Error::NotFound(path.prefix(depth + 1).to_string()))?;
        }
        Ok(current)
    }

    pub fn get_path_mut(&mut self, path: &Path) -> Result<&mut Node> {
        let mut current = self;
        for (depth, segment) in path.segments().iter().enumerate() {
            let next = match current {
                Node::Mapping(map) => map.get_mut(segment),
                Node::Sequence(items) => parse_index(segment).and_then(|i| items.get_mut(i)),
                Node::Scalar(_) => None,
            };
            current = next.ok_or_else(|| Error::NotFound(path.prefix(depth + 1).to_string()))?;
        }
        Ok(current)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.get_path(path).is_ok()
    }

    /// Write `value` at `path`, creating intermediate containers.
    ///
    /// An existing sequence element is overwritten; the index one past the
    /// end (or `-`) grows the sequence.
    pub fn set(&mut self, path: &str, value: Node) -> Result<()> {
        self.set_path(&Path::parse(path), value)
    }

    pub fn set_path(&mut self, path: &Path, value: Node) -> Result<()> {
        let Some(last) = path.last() else {
            *self = value;
            return Ok(());
        };

        match self.container_mut(path, true)? {
            Node::Mapping(map) => {
                map.insert(last.to_string(), value);
            }
            Node::Sequence(items) => {
                let index = sequence_position(path, last, items.len())?;
                if index < items.len() {
                    items[index] = value;
                } else {
                    items.push(value);
                }
            }
            other => return Err(not_a_container(path, other)),
        }
        Ok(())
    }

    /// Insert `value` at `path`, creating intermediate containers.
    ///
    /// Unlike [`Node::set`], an index into a sequence shifts the element at
    /// that position and everything after it to the right.
    pub fn insert(&mut self, path: &str, value: Node) -> Result<()> {
        self.insert_path(&Path::parse(path), value)
    }

    pub fn insert_path(&mut self, path: &Path, value: Node) -> Result<()> {
        let Some(last) = path.last() else {
            *self = value;
            return Ok(());
        };

        match self.container_mut(path, true)? {
            Node::Mapping(map) => {
                map.insert(last.to_string(), value);
            }
            Node::Sequence(items) => {
                let index = sequence_position(path, last, items.len())?;
                items.insert(index, value);
            }
            other => return Err(not_a_container(path, other)),
        }
        Ok(())
    }

    /// Remove and return the node at `path`.
    pub fn delete(&mut self, path: &str) -> Result<Node> {
        self.delete_path(&Path::parse(path))
    }

    pub fn delete_path(&mut self, path: &Path) -> Result<Node> {
        let Some(last) = path.last() else {
            return Err(Error::InvalidPath {
                path: path.to_string(),
                message: "cannot remove the document root".to_string(),
            });
        };

        let removed = match self.container_mut(path, false)? {
            Node::Mapping(map) => map.shift_remove(last),
            Node::Sequence(items) => match parse_index(last) {
                Some(i) if i < items.len() => Some(items.remove(i)),
                _ => None,
            },
            Node::Scalar(_) => None,
        };
        removed.ok_or_else(|| Error::NotFound(path.to_string()))
    }

    /// Swap the existing node at `path` for `value`, returning the old node.
    pub fn replace_path(&mut self, path: &Path, value: Node) -> Result<Node> {
        let slot = self.get_path_mut(path)?;
        Ok(std::mem::replace(slot, value))
    }

    /// Walk to the parent container of `path`.
    fn container_mut(&mut self, path: &Path, create: bool) -> Result<&mut Node> {
        let segments = path.segments();
        let Some((_, parents)) = segments.split_last() else {
            return Ok(self);
        };

        let mut current = self;
        for (depth, segment) in parents.iter().enumerate() {
            let lookahead = &segments[depth + 1];
            current = match current {
                Node::Mapping(map) => {
                    if create && !map.contains_key(segment) {
                        map.insert(segment.clone(), empty_container_for(lookahead));
                    }
                    map.get_mut(segment)
                        .ok_or_else(|| Error::NotFound(path.prefix(depth + 1).to_string()))?
                }
                Node::Sequence(items) => {
                    let len = items.len();
                    let index = if segment == APPEND {
                        len
                    } else {
                        parse_index(segment).ok_or_else(|| Error::InvalidPath {
                            path: path.to_string(),
                            message: format!("'{}' is not a sequence index", segment),
                        })?
                    };
                    if index == len && create {
                        items.push(empty_container_for(lookahead));
                    }
                    items
                        .get_mut(index)
                        .ok_or_else(|| Error::NotFound(path.prefix(depth + 1).to_string()))?
                }
                other => return Err(not_a_container(&path.prefix(depth), other)),
            };
        }
        Ok(current)
    }
}

fn empty_container_for(segment: &str) -> Node {
    if segment == APPEND || parse_index(segment).is_some() {
        Node::sequence()
    } else {
        Node::mapping()
    }
}

fn sequence_position(path: &Path, segment: &str, len: usize) -> Result<usize> {
    if segment == APPEND {
        return Ok(len);
    }
    match parse_index(segment) {
        Some(i) if i <= len => Ok(i),
        Some(i) => Err(Error::InvalidPath {
            path: path.to_string(),
            message: format!("index {} out of range for sequence of length {}", i, len),
        }),
        None => Err(Error::InvalidPath {
            path: path.to_string(),
            message: format!("'{}' is not a sequence index", segment),
        }),
    }
}

fn not_a_container(path: &Path, node: &Node) -> Error {
    Error::TypeMismatch {
        path: path.to_string(),
        expected: "mapping or sequence",
        found: node.kind(),
    }
}

impl From<Scalar> for Node {
    fn from(s: Scalar) -> Self {
        Node::Scalar(s)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Scalar(Scalar::String(s.to_string()))
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Scalar(Scalar::String(s))
    }
}

impl From<i64> for Node {
    fn from(i: i64) -> Self {
        Node::Scalar(Scalar::Int(i))
    }
}

impl From<i32> for Node {
    fn from(i: i32) -> Self {
        Node::Scalar(Scalar::Int(i64::from(i)))
    }
}

impl From<f64> for Node {
    fn from(f: f64) -> Self {
        Node::Scalar(Scalar::Float(f))
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Scalar(Scalar::Bool(b))
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::Sequence(items)
    }
}

impl From<Mapping> for Node {
    fn from(map: Mapping) -> Self {
        Node::Mapping(map)
    }
}
