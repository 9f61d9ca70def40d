//! Resolution pipeline: profile, then variables, then the typed decode.

use crate::profile::ProfileResolver;
use crate::variables::VariableResolver;
use crate::{ConfigError, ConfigResult};
use dockyard_core::Node;
use dockyard_core::config::{Config, Variable};
use std::collections::HashSet;
use tracing::debug;

/// Subtrees left untouched by variable substitution.
pub const UNRESOLVED_SECTIONS: &[&str] = &["profiles"];

/// Decode the `vars` section of a document. Names must be unique.
pub fn parse_vars(doc: &Node) -> ConfigResult<Vec<Variable>> {
    let vars: Vec<Variable> = match doc.field("vars") {
        None => return Ok(Vec::new()),
        Some(node) if node.is_null() => return Ok(Vec::new()),
        Some(node) => node.decode().map_err(|e| ConfigError::InvalidValue {
            field: "vars".to_string(),
            message: e.to_string(),
        })?,
    };

    let mut seen = HashSet::new();
    for var in &vars {
        if var.name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "vars".to_string(),
                message: "variable name is required".to_string(),
            });
        }
        if !seen.insert(var.name.as_str()) {
            return Err(ConfigError::Duplicate(format!("variable {}", var.name)));
        }
    }
    Ok(vars)
}

/// Apply `profile` to `raw` and substitute every variable outside of the
/// profile definitions. `raw` is left as it was.
pub fn resolve_document(
    raw: &Node,
    profile: Option<&str>,
    profiles: &ProfileResolver<'_>,
    variables: &mut VariableResolver,
) -> ConfigResult<Node> {
    variables.set_profile(profile);
    let merged = profiles.resolve(raw, profile)?;

    variables.update_vars(parse_vars(&merged)?);
    let resolved = variables.fill_variables_exclude(&merged, UNRESOLVED_SECTIONS)?;
    debug!(
        profile = profile.unwrap_or("<none>"),
        variables = variables.resolved_variables().len(),
        "resolved configuration"
    );
    Ok(resolved)
}

/// Resolve `raw` and decode the result into a [`Config`].
pub fn load_config(
    raw: &Node,
    profile: Option<&str>,
    profiles: &ProfileResolver<'_>,
    variables: &mut VariableResolver,
) -> ConfigResult<Config> {
    let resolved = resolve_document(raw, profile, profiles, variables)?;
    Ok(resolved.decode()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::FileLoader;
    use serde_json::json;
    use std::collections::HashMap;

    fn doc(value: serde_json::Value) -> Node {
        serde_json::from_value(value).unwrap()
    }

    fn variables(env: &[(&str, &str)]) -> VariableResolver {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        VariableResolver::builder().with_env(env).build()
    }

    fn project() -> Node {
        doc(json!({
            "version": "v1beta1",
            "vars": [
                {"name": "NAMESPACE", "source": "env", "default": "dev"},
                {"name": "REPLICAS", "source": "none", "default": 1}
            ],
            "images": {"api": {"image": "registry/api", "tags": ["${DOCKYARD_PROFILE}"]}},
            "deployments": [{
                "name": "api",
                "namespace": "${NAMESPACE}",
                "helm": {"values": {"replicas": "${REPLICAS}"}}
            }],
            "profiles": [{
                "name": "prod",
                "patches": [
                    {"op": "replace", "path": "/deployments/0/namespace", "value": "prod-${NAMESPACE}"},
                    {"op": "add", "path": "/deployments/0/helm/values/tier", "value": "${TIER}"}
                ]
            }]
        }))
    }

    #[test]
    fn test_resolve_without_profile() {
        let loader = FileLoader;
        let profiles = ProfileResolver::new(&loader);
        let mut vars = variables(&[]);
        let raw = project();

        let resolved = resolve_document(&raw, None, &profiles, &mut vars).unwrap();
        assert_eq!(resolved.get("/deployments/0/namespace").unwrap().as_str(), Some("dev"));
        assert_eq!(
            resolved.get("/deployments/0/helm/values/replicas").unwrap(),
            &Node::from(1)
        );
        assert_eq!(resolved.get("/images/api/tags/0").unwrap().as_str(), Some(""));
        // profile definitions keep their placeholders and are not resolved
        assert_eq!(
            resolved.get("/profiles/0/patches/1/value").unwrap().as_str(),
            Some("${TIER}")
        );
        assert!(!vars.resolved_variables().contains_key("TIER"));
        assert_eq!(raw, project());
    }

    #[test]
    fn test_resolve_with_profile_and_flags() {
        let loader = FileLoader;
        let profiles = ProfileResolver::new(&loader);
        let mut vars = variables(&[("NAMESPACE", "team"), ("TIER", "gold")]);
        vars.convert_flags(&["REPLICAS=3"]).unwrap();

        let resolved = resolve_document(&project(), Some("prod"), &profiles, &mut vars).unwrap();
        assert_eq!(
            resolved.get("/deployments/0/namespace").unwrap().as_str(),
            Some("prod-team")
        );
        assert_eq!(
            resolved.get("/deployments/0/helm/values").unwrap(),
            &doc(json!({"replicas": 3, "tier": "gold"}))
        );
        assert_eq!(resolved.get("/images/api/tags/0").unwrap().as_str(), Some("prod"));
    }

    #[test]
    fn test_load_config_decodes() {
        let loader = FileLoader;
        let profiles = ProfileResolver::new(&loader);
        let mut vars = variables(&[("TIER", "silver")]);

        let config = load_config(&project(), Some("prod"), &profiles, &mut vars).unwrap();
        assert_eq!(config.version, "v1beta1");
        assert_eq!(config.deployments[0].name, "api");
        assert_eq!(config.deployments[0].namespace.as_deref(), Some("prod-dev"));
        assert_eq!(config.vars.len(), 2);
        assert_eq!(config.profiles[0].name, "prod");
    }

    #[test]
    fn test_undefined_variable_aborts() {
        let loader = FileLoader;
        let profiles = ProfileResolver::new(&loader);
        let mut vars = variables(&[]);
        let err = resolve_document(&project(), Some("prod"), &profiles, &mut vars).unwrap_err();
        assert!(matches!(err, ConfigError::UndefinedVariable { ref name, .. } if name == "TIER"));
    }

    #[test]
    fn test_parse_vars() {
        assert!(parse_vars(&doc(json!({}))).unwrap().is_empty());
        let vars = parse_vars(&doc(json!({"vars": [{"name": "A"}, {"name": "B", "source": "input"}]})))
            .unwrap();
        assert_eq!(vars.len(), 2);

        assert!(matches!(
            parse_vars(&doc(json!({"vars": [{"name": "A"}, {"name": "A"}]}))),
            Err(ConfigError::Duplicate(_))
        ));
        assert!(matches!(
            parse_vars(&doc(json!({"vars": [{"question": "no name"}]}))),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
