//! Variable substitution for configuration documents.
//!
//! Placeholders have the form `${NAME}`. Every name is resolved at most once
//! per resolver and cached, in this order:
//! - values pre-seeded from `name=value` flags
//! - the matching `vars` definition, according to its `source`
//! - predefined variables such as `${DOCKYARD_TIMESTAMP}` (names without a definition)
//! - environment, then interactive input (names without a definition)
//!
//! A string that consists of exactly one placeholder takes the native type of
//! the value. Defaults and predefined values keep the type they were declared
//! with; text from flags, the environment or input is read as a boolean or a
//! number when it looks like one. Placeholders inside a longer string are
//! replaced by the value's text.

use crate::input::{Environment, InputProvider, NonInteractive, ProcessEnv, PromptParams};
use crate::predefined::PredefinedVariables;
use crate::{ConfigError, ConfigResult};
use dockyard_core::config::{Variable, VariableSource};
use dockyard_core::{Node, Path, Scalar};
use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Number of answers accepted for one variable before giving up.
pub const MAX_PROMPT_ATTEMPTS: usize = 5;

// Regex for matching ${NAME} placeholders
static VAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Resolves and substitutes variables. One instance corresponds to one run.
pub struct VariableResolver {
    vars: Vec<Variable>,
    cache: IndexMap<String, Node>,
    // names whose cached value is free text
    text_values: IndexSet<String>,
    env: Box<dyn Environment>,
    input: Box<dyn InputProvider>,
    predefined: PredefinedVariables,
}

impl std::fmt::Debug for VariableResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableResolver")
            .field("vars", &self.vars)
            .field("cache", &self.cache.keys().collect::<Vec<_>>())
            .field("predefined", &self.predefined)
            .finish()
    }
}

impl VariableResolver {
    /// A resolver reading the process environment that never prompts.
    pub fn new(vars: Vec<Variable>) -> Self {
        VariableResolverBuilder::new().with_vars(vars).build()
    }

    pub fn builder() -> VariableResolverBuilder {
        VariableResolverBuilder::new()
    }

    pub fn defined_vars(&self) -> &[Variable] {
        &self.vars
    }

    /// Replace the variable definitions. Values already resolved stay cached.
    pub fn update_vars(&mut self, vars: Vec<Variable>) {
        self.vars = vars;
    }

    /// Forget every resolved value, including flag overrides.
    pub fn reset_cache(&mut self) {
        self.cache.clear();
        self.text_values.clear();
    }

    /// Set the profile reported by `${DOCKYARD_PROFILE}`.
    pub fn set_profile(&mut self, profile: Option<&str>) {
        self.predefined.profile = profile.map(str::to_string);
    }

    /// Snapshot of every resolved value.
    pub fn resolved_variables(&self) -> IndexMap<String, Node> {
        self.cache.clone()
    }

    /// Parse `name=value` overrides and seed the cache with them.
    ///
    /// Later duplicates win. Nothing is cached if any flag is malformed.
    pub fn convert_flags<S: AsRef<str>>(&mut self, flags: &[S]) -> ConfigResult<IndexMap<String, Node>> {
        let mut parsed = IndexMap::new();
        for flag in flags {
            let flag = flag.as_ref();
            let (name, value) = flag
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidFlag(flag.to_string()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(ConfigError::InvalidFlag(flag.to_string()));
            }
            if VAR_REGEX.is_match(value) {
                return Err(ConfigError::RecursiveVariable(name.to_string()));
            }
            parsed.insert(name.to_string(), Node::from(value));
        }

        for (name, value) in &parsed {
            self.cache.insert(name.clone(), value.clone());
            self.text_values.insert(name.clone());
        }
        Ok(parsed)
    }

    /// Names referenced anywhere in `doc`, in document order.
    pub fn find_variables(&self, doc: &Node) -> IndexSet<String> {
        let mut found = IndexSet::new();
        collect_names(doc, &Path::root(), &[], &mut found);
        found
    }

    /// Resolve every referenced variable and return the substituted document.
    pub fn fill_variables(&mut self, doc: &Node) -> ConfigResult<Node> {
        self.fill_variables_exclude(doc, &[])
    }

    /// Like [`VariableResolver::fill_variables`], but placeholders below any of
    /// `excluded` are neither resolved nor substituted.
    pub fn fill_variables_exclude(&mut self, doc: &Node, excluded: &[&str]) -> ConfigResult<Node> {
        let excluded: Vec<Path> = excluded.iter().map(|p| Path::parse(p)).collect();

        let mut names = IndexSet::new();
        collect_names(doc, &Path::root(), &excluded, &mut names);
        for name in &names {
            self.resolve(name)?;
        }

        self.substitute(doc, &Path::root(), &excluded)
    }

    /// Resolve one variable, consulting the cache first.
    pub fn resolve(&mut self, name: &str) -> ConfigResult<Node> {
        if let Some(value) = self.cache.get(name) {
            return Ok(value.clone());
        }

        let value = self.resolve_uncached(name)?;
        if references_variable(value.node()) {
            return Err(ConfigError::RecursiveVariable(name.to_string()));
        }
        debug!(variable = name, "resolved variable");
        let value = match value {
            Resolved::Text(node) => {
                self.text_values.insert(name.to_string());
                node
            }
            Resolved::Typed(node) => node,
        };
        self.cache.insert(name.to_string(), value.clone());
        Ok(value)
    }

    fn resolve_uncached(&mut self, name: &str) -> ConfigResult<Resolved> {
        let definition = self.vars.iter().find(|v| v.name == name).cloned();
        let Some(definition) = definition else {
            if let Some(value) = self.predefined.resolve(name) {
                return Ok(Resolved::Typed(value));
            }
            return self.resolve_any(&Variable::new(name));
        };

        match definition.source {
            VariableSource::None => definition.default.clone().map(Resolved::Typed).ok_or_else(|| {
                undefined(name, "source is 'none' and no default is set")
            }),
            VariableSource::Env => self
                .env
                .var(name)
                .map(|value| Resolved::Text(Node::from(value)))
                .or_else(|| definition.default.clone().map(Resolved::Typed))
                .ok_or_else(|| undefined(name, "environment variable is not set and no default is set")),
            VariableSource::Input => match self.ask(&definition)? {
                Some(value) => Ok(value),
                None => definition
                    .default
                    .clone()
                    .map(Resolved::Typed)
                    .ok_or_else(|| undefined(name, "no input available and no default is set")),
            },
            VariableSource::Default | VariableSource::All => self.resolve_any(&definition),
        }
    }

    /// Environment, then input, then the default.
    fn resolve_any(&mut self, definition: &Variable) -> ConfigResult<Resolved> {
        if let Some(value) = self.env.var(&definition.name) {
            return Ok(Resolved::Text(Node::from(value)));
        }
        if let Some(value) = self.ask(definition)? {
            return Ok(value);
        }
        definition
            .default
            .clone()
            .map(Resolved::Typed)
            .ok_or_else(|| undefined(&definition.name, "no value found in environment, input or defaults"))
    }

    /// Prompt until a valid answer arrives. `None` means no input is available.
    fn ask(&mut self, definition: &Variable) -> ConfigResult<Option<Resolved>> {
        let name = definition.name.as_str();
        let pattern = definition
            .validation_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| ConfigError::Validation {
                name: name.to_string(),
                message: format!("invalid validation pattern: {}", e),
            })?;

        let mut params = PromptParams {
            name: name.to_string(),
            question: definition
                .question
                .clone()
                .unwrap_or_else(|| format!("Please enter a value for {}", name)),
            default_value: definition.default.as_ref().map(Node::to_text),
            validation_pattern: definition.validation_pattern.clone(),
            validation_message: definition.validation_message.clone(),
            options: definition.options.clone(),
            is_password: definition.password,
            previous_error: None,
        };

        for _ in 0..MAX_PROMPT_ATTEMPTS {
            let Some(answer) = self.input.prompt(&params)? else {
                return Ok(None);
            };
            if answer.is_empty() {
                if let Some(default) = &definition.default {
                    return Ok(Some(Resolved::Typed(default.clone())));
                }
            }
            match validate_answer(definition, &answer, pattern.as_ref()) {
                Ok(()) => return Ok(Some(Resolved::Text(Node::from(answer)))),
                Err(message) => params.previous_error = Some(message),
            }
        }

        Err(ConfigError::Validation {
            name: name.to_string(),
            message: params.previous_error.unwrap_or_default(),
        })
    }

    fn substitute(&self, node: &Node, path: &Path, excluded: &[Path]) -> ConfigResult<Node> {
        if is_excluded(path, excluded) {
            return Ok(node.clone());
        }

        match node {
            Node::Scalar(Scalar::String(s)) => self.substitute_str(s),
            Node::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.substitute(item, &path.child(i.to_string()), excluded))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Node::Sequence),
            Node::Mapping(map) => {
                let mut out = IndexMap::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key.clone(), self.substitute(value, &path.child(key.as_str()), excluded)?);
                }
                Ok(Node::Mapping(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn substitute_str(&self, input: &str) -> ConfigResult<Node> {
        let mut matches = VAR_REGEX.captures_iter(input);
        let Some(first) = matches.next() else {
            return Ok(Node::from(input));
        };

        // A lone placeholder keeps the value's type.
        let whole = &first[0];
        if whole.len() == input.len() {
            let name = &first[1];
            let value = self.cached(name)?;
            if self.text_values.contains(name) {
                return Ok(native(value));
            }
            return Ok(value.clone());
        }

        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for caps in VAR_REGEX.captures_iter(input) {
            let Some(m) = caps.get(0) else { continue };
            out.push_str(&input[last..m.start()]);
            out.push_str(&self.cached(&caps[1])?.to_text());
            last = m.end();
        }
        out.push_str(&input[last..]);
        Ok(Node::from(out))
    }

    fn cached(&self, name: &str) -> ConfigResult<&Node> {
        self.cache
            .get(name)
            .ok_or_else(|| undefined(name, "variable was not resolved"))
    }
}

/// Builder for creating a [`VariableResolver`].
pub struct VariableResolverBuilder {
    vars: Vec<Variable>,
    env: Box<dyn Environment>,
    input: Box<dyn InputProvider>,
    predefined: PredefinedVariables,
}

impl VariableResolverBuilder {
    pub fn new() -> Self {
        Self {
            vars: Vec::new(),
            env: Box::new(ProcessEnv),
            input: Box::new(NonInteractive),
            predefined: PredefinedVariables::default(),
        }
    }

    pub fn with_vars(mut self, vars: Vec<Variable>) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_env(mut self, env: impl Environment + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    pub fn with_input(mut self, input: impl InputProvider + 'static) -> Self {
        self.input = Box::new(input);
        self
    }

    pub fn with_predefined(mut self, predefined: PredefinedVariables) -> Self {
        self.predefined = predefined;
        self
    }

    pub fn build(self) -> VariableResolver {
        VariableResolver {
            vars: self.vars,
            cache: IndexMap::new(),
            text_values: IndexSet::new(),
            env: self.env,
            input: self.input,
            predefined: self.predefined,
        }
    }
}

impl Default for VariableResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_names(node: &Node, path: &Path, excluded: &[Path], found: &mut IndexSet<String>) {
    if is_excluded(path, excluded) {
        return;
    }
    match node {
        Node::Scalar(Scalar::String(s)) => {
            for caps in VAR_REGEX.captures_iter(s) {
                found.insert(caps[1].to_string());
            }
        }
        Node::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_names(item, &path.child(i.to_string()), excluded, found);
            }
        }
        Node::Mapping(map) => {
            for (key, value) in map {
                collect_names(value, &path.child(key.as_str()), excluded, found);
            }
        }
        Node::Scalar(_) => {}
    }
}

fn is_excluded(path: &Path, excluded: &[Path]) -> bool {
    excluded.iter().any(|e| e.contains(path))
}

/// A freshly resolved value and whether it arrived as free text.
enum Resolved {
    Text(Node),
    Typed(Node),
}

impl Resolved {
    fn node(&self) -> &Node {
        match self {
            Resolved::Text(node) | Resolved::Typed(node) => node,
        }
    }
}

fn references_variable(value: &Node) -> bool {
    match value {
        Node::Scalar(Scalar::String(s)) => VAR_REGEX.is_match(s),
        Node::Sequence(items) => items.iter().any(references_variable),
        Node::Mapping(map) => map.values().any(references_variable),
        Node::Scalar(_) => false,
    }
}

fn native(value: &Node) -> Node {
    match value {
        Node::Scalar(Scalar::String(s)) => Node::Scalar(Scalar::infer(s)),
        other => other.clone(),
    }
}

fn validate_answer(definition: &Variable, answer: &str, pattern: Option<&Regex>) -> Result<(), String> {
    if !definition.options.is_empty() && !definition.options.iter().any(|o| o == answer) {
        return Err(format!(
            "answer must be one of: {}",
            definition.options.join(", ")
        ));
    }
    if let Some(pattern) = pattern {
        if !pattern.is_match(answer) {
            return Err(definition
                .validation_message
                .clone()
                .unwrap_or_else(|| format!("answer must match {}", pattern.as_str())));
        }
    }
    Ok(())
}

fn undefined(name: &str, reason: &str) -> ConfigError {
    ConfigError::UndefinedVariable {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
