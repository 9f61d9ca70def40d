//! Locating and loading a project's configuration file.

use crate::loader::{CompositeLoader, read_document};
use crate::pipeline::{load_config, parse_vars, resolve_document};
use crate::profile::{ProfileResolver, list_profiles};
use crate::variables::VariableResolver;
use crate::{ConfigError, ConfigResult};
use dockyard_core::Node;
use dockyard_core::config::{Config, ProfileConfig, Variable};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File names searched for, in order.
pub const CONFIG_FILE_NAMES: &[&str] = &["dockyard.yaml", "dockyard.yml", "dockyard.kdl"];

/// A parsed project configuration file.
///
/// The raw document is read once and can be resolved any number of times,
/// for different profiles or variable overrides.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
    project_dir: PathBuf,
    raw: Node,
    loader: CompositeLoader,
}

impl ConfigLoader {
    /// Find the configuration file in `dir`.
    pub fn find(dir: &Path) -> ConfigResult<Self> {
        let path = CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                ConfigError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!(
                        "no {} found in {}",
                        CONFIG_FILE_NAMES.join(", "),
                        dir.display()
                    ),
                ))
            })?;
        Self::open(&path)
    }

    /// Read the configuration file at `path`.
    pub fn open(path: &Path) -> ConfigResult<Self> {
        debug!(path = %path.display(), "loading project configuration");
        let raw = read_document(path)?;
        if raw.as_mapping().is_none() {
            return Err(ConfigError::InvalidValue {
                field: path.display().to_string(),
                message: format!("expected a mapping at the top level, found {}", raw.kind()),
            });
        }

        let project_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Self {
            path: path.to_path_buf(),
            loader: CompositeLoader::default(),
            project_dir,
            raw,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// The document as read from disk.
    pub fn raw(&self) -> &Node {
        &self.raw
    }

    pub fn profiles(&self) -> ConfigResult<Vec<ProfileConfig>> {
        list_profiles(&self.raw)
    }

    pub fn variables(&self) -> ConfigResult<Vec<Variable>> {
        parse_vars(&self.raw)
    }

    /// Resolve the document for `profile`.
    pub fn resolve(&self, profile: Option<&str>, variables: &mut VariableResolver) -> ConfigResult<Node> {
        let profiles = ProfileResolver::new(&self.loader).with_base_dir(&self.project_dir);
        resolve_document(&self.raw, profile, &profiles, variables)
    }

    /// Resolve and decode the document for `profile`.
    pub fn load(&self, profile: Option<&str>, variables: &mut VariableResolver) -> ConfigResult<Config> {
        let profiles = ProfileResolver::new(&self.loader).with_base_dir(&self.project_dir);
        load_config(&self.raw, profile, &profiles, variables)
    }
}
