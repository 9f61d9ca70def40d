//! Predefined variables.
//!
//! These names resolve without a `vars` definition:
//! - `${DOCKYARD_TIMESTAMP}` - Unix timestamp
//! - `${DOCKYARD_DATE}` - ISO date (YYYY-MM-DD)
//! - `${DOCKYARD_RANDOM}` - Six random lowercase alphanumeric characters
//! - `${DOCKYARD_GIT_BRANCH}` - Current branch of the project repository
//! - `${DOCKYARD_GIT_COMMIT}` - Short (7 char) commit SHA of the project repository
//! - `${DOCKYARD_PROFILE}` - Active profile, empty without one

use dockyard_core::Node;
use std::path::PathBuf;
use std::process::Command;

pub const TIMESTAMP: &str = "DOCKYARD_TIMESTAMP";
pub const DATE: &str = "DOCKYARD_DATE";
pub const RANDOM: &str = "DOCKYARD_RANDOM";
pub const GIT_BRANCH: &str = "DOCKYARD_GIT_BRANCH";
pub const GIT_COMMIT: &str = "DOCKYARD_GIT_COMMIT";
pub const PROFILE: &str = "DOCKYARD_PROFILE";

/// Source of predefined variable values.
#[derive(Debug, Clone, Default)]
pub struct PredefinedVariables {
    /// Directory git commands run in. `None` disables the git variables.
    pub project_dir: Option<PathBuf>,
    /// Profile being resolved.
    pub profile: Option<String>,
}

impl PredefinedVariables {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: Some(project_dir.into()),
            profile: None,
        }
    }

    pub fn is_predefined(name: &str) -> bool {
        matches!(
            name,
            TIMESTAMP | DATE | RANDOM | GIT_BRANCH | GIT_COMMIT | PROFILE
        )
    }

    /// Resolve a predefined name. Returns `None` for other names and when the
    /// value cannot be determined (e.g. outside a git repository).
    pub fn resolve(&self, name: &str) -> Option<Node> {
        match name {
            TIMESTAMP => Some(Node::from(chrono::Utc::now().timestamp())),
            DATE => Some(Node::from(chrono::Utc::now().format("%Y-%m-%d").to_string())),
            RANDOM => Some(Node::from(random_suffix())),
            PROFILE => Some(Node::from(self.profile.clone().unwrap_or_default())),
            GIT_BRANCH => self
                .run_git(&["rev-parse", "--abbrev-ref", "HEAD"])
                .filter(|branch| branch != "HEAD")
                .map(Node::from),
            GIT_COMMIT => self
                .run_git(&["rev-parse", "HEAD"])
                .map(|sha| Node::from(sha.chars().take(7).collect::<String>())),
            _ => None,
        }
    }

    fn run_git(&self, args: &[&str]) -> Option<String> {
        let dir = self.project_dir.as_ref()?;
        Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .ok()
            .filter(|o| o.status.success())
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

fn random_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string().chars().take(6).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_predefined() {
        assert!(PredefinedVariables::is_predefined("DOCKYARD_TIMESTAMP"));
        assert!(!PredefinedVariables::is_predefined("NAMESPACE"));
    }

    #[test]
    fn test_date_format() {
        let vars = PredefinedVariables::default();
        let date = vars.resolve(DATE).unwrap();
        let date = date.as_str().unwrap();
        assert_eq!(date.len(), 10);
        assert_eq!(date.matches('-').count(), 2);
    }

    #[test]
    fn test_random_suffix() {
        let vars = PredefinedVariables::default();
        let value = vars.resolve(RANDOM).unwrap();
        let value = value.as_str().unwrap();
        assert_eq!(value.len(), 6);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_profile() {
        let mut vars = PredefinedVariables::default();
        assert_eq!(vars.resolve(PROFILE).unwrap().as_str(), Some(""));
        vars.profile = Some("production".into());
        assert_eq!(vars.resolve(PROFILE).unwrap().as_str(), Some("production"));
    }

    #[test]
    fn test_git_without_project_dir() {
        let vars = PredefinedVariables::default();
        assert!(vars.resolve(GIT_COMMIT).is_none());
        assert!(vars.resolve("SOMETHING_ELSE").is_none());
    }
}
