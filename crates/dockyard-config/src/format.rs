//! Text formats for configuration documents.
//!
//! YAML maps directly onto the document tree. For KDL, each node becomes a
//! mapping entry named after the node:
//! - `version "v1beta1"` - a single argument is a scalar
//! - `tags "dev" "latest"` - several arguments form a sequence
//! - `api image="registry/api"` - properties form a mapping
//! - `api { image "registry/api" }` - children form a mapping
//! - `deployments { - { name "api" } - { name "web" } }` - children named `-`
//!   form a sequence
//! - `dev` - a bare node is null

use crate::{ConfigError, ConfigResult};
use dockyard_core::{Mapping, Node, Scalar};
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::path::Path;

/// Name of child nodes that make up a sequence.
const ITEM: &str = "-";

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Kdl,
}

impl DocumentFormat {
    /// Pick the format from a file extension. Anything but `.kdl` is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("kdl") => DocumentFormat::Kdl,
            _ => DocumentFormat::Yaml,
        }
    }
}

/// Parse configuration text into a document.
pub fn parse_document(text: &str, format: DocumentFormat) -> ConfigResult<Node> {
    match format {
        DocumentFormat::Yaml => parse_yaml(text),
        DocumentFormat::Kdl => parse_kdl(text),
    }
}

/// Parse YAML text. An empty file is an empty mapping.
pub fn parse_yaml(text: &str) -> ConfigResult<Node> {
    if text.trim().is_empty() {
        return Ok(Node::mapping());
    }
    Ok(serde_yaml::from_str(text)?)
}

/// Parse KDL text into a document.
pub fn parse_kdl(text: &str) -> ConfigResult<Node> {
    let doc: KdlDocument = text.parse()?;
    document_to_node(&doc)
}

fn document_to_node(doc: &KdlDocument) -> ConfigResult<Node> {
    let nodes = doc.nodes();
    if !nodes.is_empty() && nodes.iter().all(|n| n.name().value() == ITEM) {
        return nodes
            .iter()
            .map(node_value)
            .collect::<ConfigResult<Vec<_>>>()
            .map(Node::Sequence);
    }

    let mut map = Mapping::new();
    for node in nodes {
        let key = node.name().value();
        if key == ITEM {
            return Err(ConfigError::InvalidValue {
                field: key.to_string(),
                message: "sequence items cannot be mixed with named nodes".to_string(),
            });
        }
        if map.contains_key(key) {
            return Err(ConfigError::Duplicate(key.to_string()));
        }
        map.insert(key.to_string(), node_value(node)?);
    }
    Ok(Node::Mapping(map))
}

fn node_value(node: &KdlNode) -> ConfigResult<Node> {
    let args = get_all_args(node);
    let props = get_props(node);

    match node.children() {
        Some(children) => {
            if !args.is_empty() {
                return Err(mixed_content(node));
            }
            let inner = document_to_node(children)?;
            if props.is_empty() {
                return Ok(inner);
            }
            match inner {
                Node::Mapping(mut map) => {
                    for (key, value) in props {
                        if map.contains_key(&key) {
                            return Err(ConfigError::Duplicate(key));
                        }
                        map.insert(key, value);
                    }
                    Ok(Node::Mapping(map))
                }
                _ => Err(mixed_content(node)),
            }
        }
        None if !props.is_empty() => {
            if !args.is_empty() {
                return Err(mixed_content(node));
            }
            Ok(Node::Mapping(props.into_iter().collect()))
        }
        None => match args.len() {
            0 => Ok(Node::null()),
            1 => Ok(args.into_iter().next().unwrap_or_default()),
            _ => Ok(Node::Sequence(args)),
        },
    }
}

// Helper functions for extracting values from KDL nodes

fn get_all_args(node: &KdlNode) -> Vec<Node> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| scalar(e.value()))
        .collect()
}

fn get_props(node: &KdlNode) -> Vec<(String, Node)> {
    node.entries()
        .iter()
        .filter_map(|e| {
            e.name()
                .map(|name| (name.value().to_string(), scalar(e.value())))
        })
        .collect()
}

fn scalar(value: &KdlValue) -> Node {
    if let Some(s) = value.as_string() {
        return Node::from(s);
    }
    if let Some(b) = value.as_bool() {
        return Node::from(b);
    }
    if let Some(i) = value.as_integer() {
        return match i64::try_from(i) {
            Ok(i) => Node::from(i),
            Err(_) => Node::Scalar(Scalar::Float(i as f64)),
        };
    }
    if let Some(f) = value.as_float() {
        return Node::from(f);
    }
    Node::null()
}

fn mixed_content(node: &KdlNode) -> ConfigError {
    ConfigError::InvalidValue {
        field: node.name().value().to_string(),
        message: "arguments cannot be combined with properties or children".to_string(),
    }
}
