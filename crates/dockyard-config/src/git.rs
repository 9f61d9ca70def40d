//! Git-hosted configuration sources.
//!
//! Repositories are cloned once into a cache directory named after the hash
//! of the repository and reference, and reused by later loads. A checkout
//! only appears under its final name once the clone and the revision
//! checkout have both succeeded.

use crate::loader::{DEFAULT_CONFIG_NAME, LoadedDocument, SourceLoader, read_document, repository_identity};
use crate::{ConfigError, ConfigResult};
use dockyard_core::config::SourceConfig;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Clones git sources and reads the configuration inside them.
#[derive(Debug, Clone)]
pub struct GitLoader {
    cache_dir: PathBuf,
}

impl GitLoader {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// `$HOME/.dockyard/dependencies`, or a temp directory without a home.
    pub fn default_cache_dir() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
            .join(".dockyard")
            .join("dependencies")
    }

    /// Directory a source is checked out into. Sources that differ only in
    /// `subPath` or `configName` share a checkout.
    pub fn checkout_dir(&self, source: &SourceConfig) -> PathBuf {
        let hash = hex::encode(Sha256::digest(repository_identity(source).as_bytes()));
        self.cache_dir.join(&hash[..16])
    }

    /// Clone the repository unless it is already checked out.
    pub fn checkout(&self, source: &SourceConfig) -> ConfigResult<PathBuf> {
        let url = source.git.as_deref().ok_or_else(|| ConfigError::InvalidValue {
            field: "source.git".to_string(),
            message: "git url is empty".to_string(),
        })?;
        let dir = self.checkout_dir(source);
        if dir.join(".git").exists() {
            debug!(dir = %dir.display(), "reusing git checkout");
            return Ok(dir);
        }

        std::fs::create_dir_all(&self.cache_dir)?;
        let staging = staging_dir(&dir);
        if staging.exists() {
            std::fs::remove_dir_all(&staging)?;
        }

        info!(url, dir = %dir.display(), "cloning configuration source");
        if let Err(e) = clone_into(source, url, &staging) {
            if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                debug!(dir = %staging.display(), error = %cleanup, "failed to remove partial checkout");
            }
            return Err(e);
        }
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        std::fs::rename(&staging, &dir)?;
        Ok(dir)
    }
}

impl SourceLoader for GitLoader {
    fn load(&self, source: &SourceConfig, _base_dir: &Path) -> ConfigResult<LoadedDocument> {
        let location = source.git.clone().unwrap_or_default();
        let mut dir = self
            .checkout(source)
            .map_err(|e| ConfigError::source_load(location.clone(), e))?;

        if let Some(sub_path) = &source.sub_path {
            dir = dir.join(sub_path.trim_start_matches('/'));
        }
        let path = dir.join(source.config_name.as_deref().unwrap_or(DEFAULT_CONFIG_NAME));
        let document = read_document(&path).map_err(|e| ConfigError::source_load(location, e))?;
        Ok(LoadedDocument { document, dir })
    }
}

fn staging_dir(dir: &Path) -> PathBuf {
    let mut name = dir.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    dir.with_file_name(name)
}

fn clone_into(source: &SourceConfig, url: &str, dir: &Path) -> ConfigResult<()> {
    run_git(&clone_args(source, url, dir), None)?;
    if let Some(revision) = &source.revision {
        run_git(&["checkout".to_string(), revision.clone()], Some(dir))?;
    }
    Ok(())
}

/// Arguments for `git clone`. A pinned revision needs the full history.
fn clone_args(source: &SourceConfig, url: &str, dir: &Path) -> Vec<String> {
    let mut args = vec!["clone".to_string()];
    if !source.disable_shallow && source.revision.is_none() {
        args.extend(["--depth".to_string(), "1".to_string()]);
    }
    if let Some(reference) = source.tag.as_ref().or(source.branch.as_ref()) {
        args.extend(["--branch".to_string(), reference.clone()]);
    }
    args.extend(source.clone_args.iter().cloned());
    args.push(url.to_string());
    args.push(dir.display().to_string());
    args
}

fn run_git(args: &[String], dir: Option<&Path>) -> ConfigResult<String> {
    let mut command = Command::new("git");
    command.args(args);
    if let Some(dir) = dir {
        command.current_dir(dir);
    }

    let output = command.output()?;
    if !output.status.success() {
        return Err(ConfigError::Command {
            command: format!("git {}", args.join(" ")),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
