//! Core domain types for Dockyard.
//!
//! This crate contains:
//! - The generic document tree every resolution step operates on
//! - Slash-delimited document paths
//! - The typed project configuration decoded from a resolved document

pub mod config;
pub mod error;
pub mod node;
pub mod path;

pub use error::{Error, Result};
pub use node::{Mapping, Node, Scalar};
pub use path::Path;
