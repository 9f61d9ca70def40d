//! Loading external configuration documents.

use crate::format::{DocumentFormat, parse_document};
use crate::git::GitLoader;
use crate::{ConfigError, ConfigResult};
use dockyard_core::Node;
use dockyard_core::config::SourceConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name looked up when a source points at a directory.
pub const DEFAULT_CONFIG_NAME: &str = "dockyard.yaml";

/// A document loaded from a source.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub document: Node,
    /// Directory the document was read from. Relative `path` sources
    /// declared inside it resolve against this directory.
    pub dir: PathBuf,
}

/// Fetches and parses the document a [`SourceConfig`] points at.
///
/// `base_dir` is the directory of the document that declared the source.
pub trait SourceLoader {
    fn load(&self, source: &SourceConfig, base_dir: &Path) -> ConfigResult<LoadedDocument>;

    /// Stable identity of the document `source` resolves to. Two sources
    /// with the same identity load the same document.
    fn identity(&self, source: &SourceConfig, _base_dir: &Path) -> String {
        source_identity(source)
    }
}

/// Read and parse a configuration file, choosing the format by extension.
pub fn read_document(path: &Path) -> ConfigResult<Node> {
    let text = std::fs::read_to_string(path)?;
    parse_document(&text, DocumentFormat::from_path(path))
}

/// Identity of a source, independent of where it is checked out.
pub fn source_identity(source: &SourceConfig) -> String {
    let config_name = source.config_name.as_deref().unwrap_or(DEFAULT_CONFIG_NAME);
    match &source.git {
        Some(_) => {
            let sub_path = source.sub_path.as_deref().unwrap_or("").trim_matches('/');
            format!("{}#{}:{}", repository_identity(source), sub_path, config_name)
        }
        None => format!(
            "path:{}:{}",
            source.path.as_deref().unwrap_or("."),
            config_name
        ),
    }
}

/// Identity of the repository and reference a git source checks out,
/// ignoring which file inside it is read.
pub fn repository_identity(source: &SourceConfig) -> String {
    let reference = source
        .revision
        .as_deref()
        .or(source.tag.as_deref())
        .or(source.branch.as_deref())
        .unwrap_or("HEAD");
    format!(
        "git:{}@{}",
        normalize_git_url(source.git.as_deref().unwrap_or("")),
        reference
    )
}

fn normalize_git_url(git: &str) -> String {
    let normalized = match url::Url::parse(git) {
        Ok(url) => url.to_string(),
        // scp-like syntax such as git@github.com:org/repo.git
        Err(_) => git.to_string(),
    };
    normalized
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .to_string()
}

/// Loads documents from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl FileLoader {
    /// The file a source points at. Relative paths are resolved against
    /// `base_dir` and directories resolve to the config file inside them.
    pub fn config_path(&self, source: &SourceConfig, base_dir: &Path) -> PathBuf {
        let path = base_dir.join(source.path.as_deref().unwrap_or("."));
        if path.is_dir() || source.config_name.is_some() {
            path.join(source.config_name.as_deref().unwrap_or(DEFAULT_CONFIG_NAME))
        } else {
            path
        }
    }
}

impl SourceLoader for FileLoader {
    fn load(&self, source: &SourceConfig, base_dir: &Path) -> ConfigResult<LoadedDocument> {
        let path = self.config_path(source, base_dir);
        debug!(path = %path.display(), "loading config from path");
        let document =
            read_document(&path).map_err(|e| ConfigError::source_load(path.display().to_string(), e))?;
        let dir = match path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => base_dir.to_path_buf(),
        };
        Ok(LoadedDocument { document, dir })
    }

    fn identity(&self, source: &SourceConfig, base_dir: &Path) -> String {
        let path = self.config_path(source, base_dir);
        let path = path.canonicalize().unwrap_or(path);
        format!("path:{}", path.display())
    }
}

/// Dispatches to the git or file loader depending on the source.
#[derive(Debug, Clone)]
pub struct CompositeLoader {
    file: FileLoader,
    git: GitLoader,
}

impl CompositeLoader {
    pub fn new(git: GitLoader) -> Self {
        Self {
            file: FileLoader,
            git,
        }
    }
}

impl Default for CompositeLoader {
    /// Uses the default git checkout cache.
    fn default() -> Self {
        Self::new(GitLoader::new(GitLoader::default_cache_dir()))
    }
}

impl SourceLoader for CompositeLoader {
    fn load(&self, source: &SourceConfig, base_dir: &Path) -> ConfigResult<LoadedDocument> {
        if source.git.is_some() {
            self.git.load(source, base_dir)
        } else {
            self.file.load(source, base_dir)
        }
    }

    fn identity(&self, source: &SourceConfig, base_dir: &Path) -> String {
        if source.git.is_some() {
            self.git.identity(source, base_dir)
        } else {
            self.file.identity(source, base_dir)
        }
    }
}
