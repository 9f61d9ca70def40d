//! Capabilities the variable resolver reaches outside of the document for.
//!
//! Both are injected so that resolution stays deterministic under test.

use crate::ConfigResult;
use std::collections::HashMap;

/// Read access to environment variables.
pub trait Environment {
    /// Returns `None` when the variable is unset.
    fn var(&self, name: &str) -> Option<String>;
}

/// The environment of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Everything needed to ask the user for one value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptParams {
    /// Variable being asked for.
    pub name: String,
    pub question: String,
    /// Answer used when the user just confirms.
    pub default_value: Option<String>,
    pub validation_pattern: Option<String>,
    pub validation_message: Option<String>,
    /// Allowed answers. Empty means free text.
    pub options: Vec<String>,
    /// Input should not be echoed.
    pub is_password: bool,
    /// Why the previous answer was rejected, when re-asking.
    pub previous_error: Option<String>,
}

/// Asks the user for variable values. Calls block until an answer arrives.
pub trait InputProvider {
    /// Returns `None` when no interactive input is available, in which case
    /// the resolver falls back to the variable's default.
    fn prompt(&mut self, params: &PromptParams) -> ConfigResult<Option<String>>;
}

/// Never asks; every prompt falls through to the default value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl InputProvider for NonInteractive {
    fn prompt(&mut self, _params: &PromptParams) -> ConfigResult<Option<String>> {
        Ok(None)
    }
}
