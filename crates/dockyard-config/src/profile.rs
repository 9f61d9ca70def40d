//! Profile resolution.
//!
//! A profile derives a document from the root it is declared in. Parents are
//! resolved first and merged in order; the profile's own `replace`, `merge`,
//! `strategicMerge` and `patches` are then applied on top, in that order.
//!
//! Parents loaded from a `source` are resolved inside their own document, so
//! relative `path` sources declared there are relative to that document.

use crate::loader::SourceLoader;
use crate::merge::{MergeKeys, MergeStrategy, merge_with_keys};
use crate::{ConfigError, ConfigResult, patch};
use dockyard_core::Node;
use dockyard_core::config::ProfileConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sections never changed by applying a profile.
pub const PROTECTED_SECTIONS: &[&str] = &["profiles", "vars"];

/// Identity of the document passed to [`ProfileResolver::resolve`].
const ROOT_SOURCE: &str = "";

/// Resolves named profiles into merged documents.
pub struct ProfileResolver<'a> {
    loader: &'a dyn SourceLoader,
    base_dir: PathBuf,
    merge_keys: MergeKeys,
    protected: Vec<String>,
}

impl<'a> ProfileResolver<'a> {
    pub fn new(loader: &'a dyn SourceLoader) -> Self {
        Self {
            loader,
            base_dir: PathBuf::from("."),
            merge_keys: MergeKeys::default(),
            protected: PROTECTED_SECTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Directory of the root document. Defaults to the working directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn with_merge_keys(mut self, merge_keys: MergeKeys) -> Self {
        self.merge_keys = merge_keys;
        self
    }

    pub fn with_protected(mut self, sections: Vec<String>) -> Self {
        self.protected = sections;
        self
    }

    /// Apply `profile` to `root`. Without a profile the result is a copy of
    /// `root`.
    pub fn resolve(&self, root: &Node, profile: Option<&str>) -> ConfigResult<Node> {
        match profile {
            None => Ok(root.clone()),
            Some(name) => {
                debug!(profile = name, "resolving profile");
                self.resolve_profile(root, ROOT_SOURCE, &self.base_dir, name, &mut Vec::new())
            }
        }
    }

    fn resolve_profile(
        &self,
        root: &Node,
        source_id: &str,
        dir: &Path,
        name: &str,
        stack: &mut Vec<(String, String)>,
    ) -> ConfigResult<Node> {
        check_cycle(stack, source_id, name)?;
        let profile = find_profile(root, name)?;

        stack.push((source_id.to_string(), name.to_string()));
        let result = self.apply_profile(root, source_id, dir, &profile, stack);
        stack.pop();
        result
    }

    fn apply_profile(
        &self,
        root: &Node,
        source_id: &str,
        dir: &Path,
        profile: &ProfileConfig,
        stack: &mut Vec<(String, String)>,
    ) -> ConfigResult<Node> {
        let mut doc: Option<Node> = None;
        for parent in profile.parent_entries() {
            let resolved = match &parent.source {
                Some(source) => {
                    let identity = self.loader.identity(source, dir);
                    check_cycle(stack, &identity, &parent.profile)?;
                    debug!(profile = %parent.profile, source = %identity, "loading parent profile");
                    let external = self.loader.load(source, dir)?;
                    self.resolve_profile(&external.document, &identity, &external.dir, &parent.profile, stack)?
                }
                None => self.resolve_profile(root, source_id, dir, &parent.profile, stack)?,
            };
            doc = Some(match doc {
                Some(base) => merge_with_keys(&base, &resolved, MergeStrategy::Merge, &self.merge_keys),
                None => resolved,
            });
        }
        let mut doc = doc.unwrap_or_else(|| root.clone());

        let name = profile.name.as_str();
        if let Some(replace) = &profile.replace {
            doc = merge_with_keys(&doc, replace, MergeStrategy::Replace, &self.merge_keys);
        }
        if let Some(merge) = &profile.merge {
            doc = merge_with_keys(&doc, merge, MergeStrategy::Merge, &self.merge_keys);
        }
        if let Some(strategic) = &profile.strategic_merge {
            doc = merge_with_keys(&doc, strategic, MergeStrategy::StrategicMerge, &self.merge_keys);
        }
        if !profile.patches.is_empty() {
            debug!(profile = name, count = profile.patches.len(), "applying patches");
            doc = patch::apply(&doc, &profile.patches)?;
        }

        self.restore_protected(root, doc)
    }

    fn restore_protected(&self, root: &Node, mut doc: Node) -> ConfigResult<Node> {
        let Some(map) = doc.as_mapping_mut() else {
            return Err(ConfigError::InvalidValue {
                field: "/".to_string(),
                message: "profile result must be a mapping".to_string(),
            });
        };
        for section in &self.protected {
            match root.field(section) {
                Some(original) => {
                    map.insert(section.clone(), original.clone());
                }
                None => {
                    map.shift_remove(section.as_str());
                }
            }
        }
        Ok(doc)
    }
}

/// Every profile declared in `root`, in declaration order.
pub fn list_profiles(root: &Node) -> ConfigResult<Vec<ProfileConfig>> {
    let Some(profiles) = root.field("profiles") else {
        return Ok(Vec::new());
    };
    if profiles.is_null() {
        return Ok(Vec::new());
    }
    let items = profiles.as_sequence().ok_or_else(|| ConfigError::InvalidValue {
        field: "profiles".to_string(),
        message: format!("expected a sequence, found {}", profiles.kind()),
    })?;
    items.iter().map(decode_profile).collect()
}

/// The profile called `name` in `root`.
pub fn find_profile(root: &Node, name: &str) -> ConfigResult<ProfileConfig> {
    let entry = root
        .field("profiles")
        .and_then(Node::as_sequence)
        .and_then(|items| {
            items
                .iter()
                .find(|item| item.field("name").and_then(Node::as_str) == Some(name))
        })
        .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string()))?;
    decode_profile(entry)
}

fn decode_profile(entry: &Node) -> ConfigResult<ProfileConfig> {
    let name = entry
        .field("name")
        .map(Node::to_text)
        .unwrap_or_default();
    let profile: ProfileConfig = entry.decode().map_err(|e| ConfigError::InvalidProfile {
        name: name.clone(),
        message: e.to_string(),
    })?;

    let overlays = [
        ("replace", &profile.replace),
        ("merge", &profile.merge),
        ("strategicMerge", &profile.strategic_merge),
    ];
    for (field, value) in overlays {
        if let Some(value) = value {
            if value.as_mapping().is_none() {
                return Err(ConfigError::InvalidProfile {
                    name,
                    message: format!("{} must be a mapping, found {}", field, value.kind()),
                });
            }
        }
    }
    Ok(profile)
}

fn check_cycle(stack: &[(String, String)], source_id: &str, name: &str) -> ConfigResult<()> {
    let Some(start) = stack
        .iter()
        .position(|(source, profile)| source == source_id && profile == name)
    else {
        return Ok(());
    };

    let chain: Vec<String> = stack[start..]
        .iter()
        .map(|(source, profile)| describe(source, profile))
        .chain(std::iter::once(describe(source_id, name)))
        .collect();
    Err(ConfigError::CyclicProfile(chain.join(" -> ")))
}

fn describe(source_id: &str, name: &str) -> String {
    if source_id == ROOT_SOURCE {
        name.to_string()
    } else {
        format!("{}@{}", name, source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{FileLoader, LoadedDocument, source_identity};
    use dockyard_core::config::SourceConfig;
    use serde_json::json;
    use std::cell::Cell;
    use std::collections::HashMap;

    fn doc(value: serde_json::Value) -> Node {
        serde_json::from_value(value).unwrap()
    }

    /// Serves documents by source path and counts loads.
    #[derive(Default)]
    struct MapLoader {
        docs: HashMap<String, Node>,
        loads: Cell<usize>,
    }

    impl MapLoader {
        fn with(mut self, path: &str, node: Node) -> Self {
            self.docs.insert(path.to_string(), node);
            self
        }
    }

    impl SourceLoader for MapLoader {
        fn load(&self, source: &SourceConfig, base_dir: &Path) -> ConfigResult<LoadedDocument> {
            self.loads.set(self.loads.get() + 1);
            let path = source.path.clone().unwrap_or_default();
            let document = self.docs.get(&path).cloned().ok_or_else(|| {
                ConfigError::source_load(
                    source_identity(source),
                    ConfigError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "no such document",
                    )),
                )
            })?;
            Ok(LoadedDocument {
                document,
                dir: base_dir.join(path),
            })
        }
    }

    #[test]
    fn test_no_profile_returns_root() {
        let loader = MapLoader::default();
        let root = doc(json!({"version": "v1beta1", "profiles": [{"name": "p"}]}));
        let resolved = ProfileResolver::new(&loader).resolve(&root, None).unwrap();
        assert_eq!(resolved, root);
    }

    #[test]
    fn test_profile_not_found() {
        let loader = MapLoader::default();
        let root = doc(json!({"profiles": [{"name": "dev"}]}));
        let err = ProfileResolver::new(&loader)
            .resolve(&root, Some("prod"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ProfileNotFound(name) if name == "prod"));

        let empty = doc(json!({"version": "v1beta1"}));
        assert!(matches!(
            ProfileResolver::new(&loader).resolve(&empty, Some("prod")),
            Err(ConfigError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn test_steps_apply_in_order() {
        let loader = MapLoader::default();
        let root = doc(json!({
            "images": {"api": {"image": "registry/api"}},
            "deployments": [{"name": "api", "namespace": "default", "replicas": 1}],
            "profiles": [{
                "name": "prod",
                "replace": {"images": {"web": {"image": "registry/web"}}},
                "merge": {"dev": {"ports": [{"imageSelector": "web"}]}},
                "strategicMerge": {"deployments": [{"name": "api", "replicas": 3}, {"name": "worker"}]},
                "patches": [{"op": "replace", "path": "/deployments/1/name", "value": "queue"}]
            }]
        }));

        let resolved = ProfileResolver::new(&loader).resolve(&root, Some("prod")).unwrap();
        let mut expected = doc(json!({
            "images": {"web": {"image": "registry/web"}},
            "deployments": [
                {"name": "api", "namespace": "default", "replicas": 3},
                {"name": "queue"}
            ],
            "dev": {"ports": [{"imageSelector": "web"}]}
        }));
        expected
            .insert("/profiles", root.field("profiles").unwrap().clone())
            .unwrap();
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_parents_merge_in_order() {
        let loader = MapLoader::default();
        let root = doc(json!({
            "deployments": [{"name": "api", "namespace": "default"}],
            "profiles": [
                {"name": "debug", "merge": {"dev": {"logs": {"enabled": true}}}},
                {"name": "remote", "patches": [
                    {"op": "replace", "path": "/deployments/0/namespace", "value": "remote"}
                ]},
                {"name": "child", "parents": [{"profile": "debug"}, {"profile": "remote"}],
                 "merge": {"version": "v1beta1"}}
            ]
        }));

        let resolved = ProfileResolver::new(&loader).resolve(&root, Some("child")).unwrap();
        assert_eq!(resolved.get("/dev/logs/enabled").unwrap(), &Node::from(true));
        assert_eq!(
            resolved.get("/deployments/0/namespace").unwrap().as_str(),
            Some("remote")
        );
        assert_eq!(resolved.get("/version").unwrap().as_str(), Some("v1beta1"));
    }

    #[test]
    fn test_legacy_parent() {
        let loader = MapLoader::default();
        let root = doc(json!({
            "profiles": [
                {"name": "base", "merge": {"a": 1}},
                {"name": "child", "parent": "base", "merge": {"b": 2}}
            ]
        }));
        let resolved = ProfileResolver::new(&loader).resolve(&root, Some("child")).unwrap();
        assert_eq!(resolved.get("/a").unwrap(), &Node::from(1));
        assert_eq!(resolved.get("/b").unwrap(), &Node::from(2));
    }

    #[test]
    fn test_cyclic_parents() {
        let loader = MapLoader::default();
        let root = doc(json!({
            "profiles": [
                {"name": "a", "parent": "b"},
                {"name": "b", "parents": [{"profile": "a"}]}
            ]
        }));
        let err = ProfileResolver::new(&loader).resolve(&root, Some("a")).unwrap_err();
        match err {
            ConfigError::CyclicProfile(chain) => assert_eq!(chain, "a -> b -> a"),
            other => panic!("unexpected error: {:?}", other),
        }

        let own = doc(json!({"profiles": [{"name": "self", "parent": "self"}]}));
        assert!(matches!(
            ProfileResolver::new(&loader).resolve(&own, Some("self")),
            Err(ConfigError::CyclicProfile(_))
        ));
    }

    #[test]
    fn test_same_name_in_other_source_is_not_a_cycle() {
        let shared = doc(json!({
            "images": {"api": {"image": "shared/api"}},
            "profiles": [{"name": "prod", "merge": {"dev": {"replicas": 2}}}]
        }));
        let loader = MapLoader::default().with("../shared", shared);
        let root = doc(json!({
            "profiles": [{
                "name": "prod",
                "parents": [{"source": {"path": "../shared"}, "profile": "prod"}],
                "merge": {"version": "v1beta1"}
            }]
        }));

        let resolved = ProfileResolver::new(&loader).resolve(&root, Some("prod")).unwrap();
        assert_eq!(loader.loads.get(), 1);
        assert_eq!(resolved.get("/images/api/image").unwrap().as_str(), Some("shared/api"));
        assert_eq!(resolved.get("/dev/replicas").unwrap(), &Node::from(2));
        assert_eq!(resolved.get("/version").unwrap().as_str(), Some("v1beta1"));
        // profiles come from the declaring root, not the external document
        assert_eq!(resolved.get("/profiles").unwrap(), root.field("profiles").unwrap());
    }

    #[test]
    fn test_cycle_through_external_source() {
        let shared = doc(json!({
            "profiles": [{
                "name": "base",
                "parents": [{"source": {"path": "shared"}, "profile": "base"}]
            }]
        }));
        let loader = MapLoader::default().with("shared", shared);
        let root = doc(json!({
            "profiles": [{"name": "dev", "parents": [{"source": {"path": "shared"}, "profile": "base"}]}]
        }));

        let err = ProfileResolver::new(&loader).resolve(&root, Some("dev")).unwrap_err();
        match err {
            ConfigError::CyclicProfile(chain) => assert_eq!(
                chain,
                "base@path:shared:dockyard.yaml -> base@path:shared:dockyard.yaml"
            ),
            other => panic!("unexpected error: {:?}", other),
        }
        // the cycle is caught before the source is loaded a second time
        assert_eq!(loader.loads.get(), 1);
    }

    #[test]
    fn test_nested_path_sources_are_relative_to_their_document() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let common = base.join("common");
        std::fs::create_dir_all(&common).unwrap();
        std::fs::write(
            base.join("dockyard.yaml"),
            "profiles:\n  - name: remote\n    parents:\n      - source:\n          path: common\n        profile: shared\n    merge:\n      from: base\n",
        )
        .unwrap();
        std::fs::write(
            common.join("dockyard.yaml"),
            "images:\n  api:\n    image: common/api\nprofiles:\n  - name: shared\n",
        )
        .unwrap();
        let root = doc(json!({
            "profiles": [{"name": "dev", "parents": [{"source": {"path": "base"}, "profile": "remote"}]}]
        }));

        let loader = FileLoader;
        let resolved = ProfileResolver::new(&loader)
            .with_base_dir(dir.path())
            .resolve(&root, Some("dev"))
            .unwrap();
        assert_eq!(resolved.get("/images/api/image").unwrap().as_str(), Some("common/api"));
        assert_eq!(resolved.get("/from").unwrap().as_str(), Some("base"));

        // a project-level `common` does not exist, so resolving from the
        // root directory would fail
        assert!(!dir.path().join("common").exists());
    }

    #[test]
    fn test_source_load_error_propagates() {
        let loader = MapLoader::default();
        let root = doc(json!({
            "profiles": [{"name": "dev", "parents": [{"source": {"path": "missing"}, "profile": "x"}]}]
        }));
        assert!(matches!(
            ProfileResolver::new(&loader).resolve(&root, Some("dev")),
            Err(ConfigError::SourceLoad { .. })
        ));
    }

    #[test]
    fn test_protected_sections_are_restored() {
        let loader = MapLoader::default();
        let root = doc(json!({
            "vars": [{"name": "NAMESPACE", "default": "dev"}],
            "profiles": [{
                "name": "p",
                "patches": [
                    {"op": "copy", "from": "/vars/0/name", "path": "/label"},
                    {"op": "remove", "path": "/vars"},
                    {"op": "add", "path": "/profiles/-", "value": {"name": "injected"}}
                ]
            }]
        }));
        let resolved = ProfileResolver::new(&loader).resolve(&root, Some("p")).unwrap();
        assert_eq!(resolved.get("/label").unwrap().as_str(), Some("NAMESPACE"));
        assert_eq!(resolved.get("/vars").unwrap(), root.field("vars").unwrap());
        assert_eq!(resolved.get("/profiles").unwrap(), root.field("profiles").unwrap());
        // the raw document is untouched
        assert!(root.get("/label").is_err());
    }

    #[test]
    fn test_failed_patch_aborts() {
        let loader = MapLoader::default();
        let root = doc(json!({
            "profiles": [{"name": "p", "patches": [{"op": "remove", "path": "/missing"}]}]
        }));
        assert!(matches!(
            ProfileResolver::new(&loader).resolve(&root, Some("p")),
            Err(ConfigError::Patch { .. })
        ));
    }

    #[test]
    fn test_invalid_profile_shape() {
        let loader = MapLoader::default();
        let root = doc(json!({"profiles": [{"name": "p", "merge": ["not", "a", "mapping"]}]}));
        assert!(matches!(
            ProfileResolver::new(&loader).resolve(&root, Some("p")),
            Err(ConfigError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn test_list_profiles() {
        let root = doc(json!({"profiles": [{"name": "dev"}, {"name": "prod", "parent": "dev"}]}));
        let names: Vec<_> = list_profiles(&root)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["dev", "prod"]);
        assert!(list_profiles(&doc(json!({}))).unwrap().is_empty());
        assert!(list_profiles(&doc(json!({"profiles": "dev"}))).is_err());
    }
}
