//! Structural patches.
//!
//! Patches run in order against a working copy of the document, so every
//! operation sees the effect of the ones before it. Any failure discards the
//! working copy: a patch list is applied completely or not at all.

use crate::{ConfigError, ConfigResult};
use dockyard_core::config::{PatchConfig, PatchOperation};
use dockyard_core::{Node, Path};
use tracing::trace;

/// Apply `patches` to a copy of `doc`.
pub fn apply(doc: &Node, patches: &[PatchConfig]) -> ConfigResult<Node> {
    let mut working = doc.clone();
    for patch in patches {
        apply_one(&mut working, patch)?;
    }
    Ok(working)
}

fn apply_one(doc: &mut Node, patch: &PatchConfig) -> ConfigResult<()> {
    let path = Path::parse(&patch.path);
    trace!(op = %patch.op, path = %path, "applying patch");

    match patch.op {
        PatchOperation::Add => {
            let value = required_value(patch)?;
            doc.insert_path(&path, value)
                .map_err(|e| patch_error(patch.op, &path, e))?;
        }
        PatchOperation::Remove => {
            doc.delete_path(&path)
                .map_err(|e| patch_error(patch.op, &path, e))?;
        }
        PatchOperation::Replace => {
            let value = required_value(patch)?;
            doc.replace_path(&path, value)
                .map_err(|e| patch_error(patch.op, &path, e))?;
        }
        PatchOperation::Move => {
            let from = required_from(patch)?;
            if from != path && from.contains(&path) {
                return Err(ConfigError::Patch {
                    op: patch.op,
                    path: path.to_string(),
                    reason: format!("cannot move {} into one of its own children", from),
                });
            }
            let value = doc
                .delete_path(&from)
                .map_err(|e| patch_error(patch.op, &from, e))?;
            doc.insert_path(&path, value)
                .map_err(|e| patch_error(patch.op, &path, e))?;
        }
        PatchOperation::Copy => {
            let from = required_from(patch)?;
            let value = doc
                .get_path(&from)
                .map_err(|e| patch_error(patch.op, &from, e))?
                .clone();
            doc.insert_path(&path, value)
                .map_err(|e| patch_error(patch.op, &path, e))?;
        }
    }
    Ok(())
}

fn required_value(patch: &PatchConfig) -> ConfigResult<Node> {
    patch.value.clone().ok_or_else(|| ConfigError::Patch {
        op: patch.op,
        path: patch.path.clone(),
        reason: "missing value".to_string(),
    })
}

fn required_from(patch: &PatchConfig) -> ConfigResult<Path> {
    match patch.from.as_deref() {
        Some(from) => Ok(Path::parse(from)),
        None => Err(ConfigError::Patch {
            op: patch.op,
            path: patch.path.clone(),
            reason: "missing from".to_string(),
        }),
    }
}

fn patch_error(op: PatchOperation, path: &Path, err: dockyard_core::Error) -> ConfigError {
    ConfigError::Patch {
        op,
        path: path.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Node {
        serde_json::from_value(value).unwrap()
    }

    fn patches(value: serde_json::Value) -> Vec<PatchConfig> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_add_to_mapping_and_sequence() {
        let base = doc(json!({"images": {"api": {"tags": ["a", "c"]}}}));
        let result = apply(
            &base,
            &patches(json!([
                {"op": "add", "path": "/images/api/tags/1", "value": "b"},
                {"op": "add", "path": "/images/api/tags/-", "value": "d"},
                {"op": "add", "path": "/images/api/dockerfile", "value": "./Dockerfile.dev"}
            ])),
        )
        .unwrap();
        assert_eq!(
            result,
            doc(json!({"images": {"api": {
                "tags": ["a", "b", "c", "d"],
                "dockerfile": "./Dockerfile.dev"
            }}}))
        );
    }

    #[test]
    fn test_add_overwrites_mapping_key() {
        let base = doc(json!({"deployments": [{"name": "api", "namespace": "a"}]}));
        let result = apply(
            &base,
            &patches(json!([{"op": "add", "path": "deployments/0/namespace", "value": "b"}])),
        )
        .unwrap();
        assert_eq!(result.get("/deployments/0/namespace").unwrap().as_str(), Some("b"));
    }

    #[test]
    fn test_remove_and_replace() {
        let base = doc(json!({"dev": {"ports": [{"imageName": "api"}], "sync": []}, "version": "v1"}));
        let result = apply(
            &base,
            &patches(json!([
                {"op": "remove", "path": "/dev/ports"},
                {"op": "replace", "path": "/version", "value": "v2"}
            ])),
        )
        .unwrap();
        assert_eq!(result, doc(json!({"dev": {"sync": []}, "version": "v2"})));
    }

    #[test]
    fn test_replace_requires_existing() {
        let base = doc(json!({"images": {}}));
        let err = apply(
            &base,
            &patches(json!([{"op": "replace", "path": "/images/api", "value": {}}])),
        )
        .unwrap_err();
        match err {
            ConfigError::Patch { op, path, .. } => {
                assert_eq!(op, PatchOperation::Replace);
                assert_eq!(path, "/images/api");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_move_and_copy() {
        let base = doc(json!({"images": {"api": {"image": "api"}}, "deployments": [{"name": "api"}]}));
        let result = apply(
            &base,
            &patches(json!([
                {"op": "copy", "from": "/images/api", "path": "/images/worker"},
                {"op": "move", "from": "/deployments/0", "path": "/deployments/-"},
                {"op": "move", "from": "/images/api", "path": "/images/backend"}
            ])),
        )
        .unwrap();
        assert_eq!(
            result,
            doc(json!({
                "images": {"worker": {"image": "api"}, "backend": {"image": "api"}},
                "deployments": [{"name": "api"}]
            }))
        );
    }

    #[test]
    fn test_operations_see_previous_results() {
        let base = doc(json!({}));
        let result = apply(
            &base,
            &patches(json!([
                {"op": "add", "path": "/images", "value": {"api": {"image": "api"}}},
                {"op": "replace", "path": "/images/api/image", "value": "api:2"}
            ])),
        )
        .unwrap();
        assert_eq!(result, doc(json!({"images": {"api": {"image": "api:2"}}})));
    }

    #[test]
    fn test_failed_patch_list_is_all_or_nothing() {
        let base = doc(json!({"images": {"api": {"image": "api"}}}));
        let err = apply(
            &base,
            &patches(json!([
                {"op": "replace", "path": "/images/api/image", "value": "changed"},
                {"op": "remove", "path": "/images/missing"}
            ])),
        );
        assert!(err.is_err());
        assert_eq!(base, doc(json!({"images": {"api": {"image": "api"}}})));
    }

    #[test]
    fn test_missing_from_and_value() {
        let base = doc(json!({"a": 1}));
        assert!(apply(&base, &patches(json!([{"op": "copy", "path": "/b"}]))).is_err());
        assert!(apply(&base, &patches(json!([{"op": "add", "path": "/b"}]))).is_err());
        assert!(
            apply(
                &base,
                &patches(json!([{"op": "move", "from": "/missing", "path": "/b"}]))
            )
            .is_err()
        );
    }

    #[test]
    fn test_move_into_own_child_rejected() {
        let base = doc(json!({"a": {"b": 1}}));
        let err = apply(
            &base,
            &patches(json!([{"op": "move", "from": "/a", "path": "/a/b/c"}])),
        );
        assert!(matches!(err, Err(ConfigError::Patch { .. })));
    }

    #[test]
    fn test_remove_append_token_fails() {
        let base = doc(json!({"tags": ["a"]}));
        assert!(apply(&base, &patches(json!([{"op": "remove", "path": "/tags/-"}]))).is_err());
    }
}
