//! Configuration resolution errors.

use dockyard_core::config::PatchOperation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KDL parse error: {0}")]
    Kdl(#[from] kdl::KdlError),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Document(#[from] dockyard_core::Error),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("duplicate definition: {0}")]
    Duplicate(String),

    #[error("profile '{0}' not found")]
    ProfileNotFound(String),

    #[error("invalid profile '{name}': {message}")]
    InvalidProfile { name: String, message: String },

    #[error("cycle detected in profile parents: {0}")]
    CyclicProfile(String),

    #[error("patch {op} {path} failed: {reason}")]
    Patch {
        op: PatchOperation,
        path: String,
        reason: String,
    },

    #[error("undefined variable '{name}': {reason}")]
    UndefinedVariable { name: String, reason: String },

    #[error("invalid value for variable '{name}': {message}")]
    Validation { name: String, message: String },

    #[error("variable '{0}' resolves to a value that references another variable")]
    RecursiveVariable(String),

    #[error("invalid variable flag '{0}': expected name=value")]
    InvalidFlag(String),

    #[error("failed to load {location}: {cause}")]
    SourceLoad {
        location: String,
        #[source]
        cause: Box<ConfigError>,
    },

    #[error("command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Wrap an error raised while fetching or parsing an external document.
    pub fn source_load(location: impl Into<String>, cause: ConfigError) -> Self {
        ConfigError::SourceLoad {
            location: location.into(),
            cause: Box::new(cause),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
