//! Configuration resolution for Dockyard.
//!
//! This crate turns a raw project document into the final configuration:
//! - Structural patches and document merging
//! - Profile resolution, including parents from other projects
//! - Variable substitution from flags, environment and interactive input
//! - YAML and KDL parsing, plus file and git loaders for external documents

pub mod error;
pub mod format;
pub mod git;
pub mod input;
pub mod loader;
pub mod merge;
pub mod patch;
pub mod pipeline;
pub mod predefined;
pub mod profile;
pub mod project;
pub mod variables;

pub use error::{ConfigError, ConfigResult};
pub use input::{Environment, InputProvider, NonInteractive, ProcessEnv, PromptParams};
pub use loader::{CompositeLoader, FileLoader, LoadedDocument, SourceLoader};
pub use merge::{MergeKeys, MergeStrategy, merge};
pub use pipeline::{load_config, resolve_document};
pub use profile::ProfileResolver;
pub use project::ConfigLoader;
pub use variables::{VariableResolver, VariableResolverBuilder};
