//! Direct and flattened dependencies derived from a lock artifact.

use crate::dependency::{Dependency, DependencyKind, DependencyRange};
use crate::lock::{split_library_key, LockArtifact, LockLibrary, TargetLibrary, TargetSelection};
use crate::version::{PackageVersion, VersionRange};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Runtime entries ending with this mark a package that ships no binary for
/// the target.
const PLACEHOLDER_SUFFIX: &str = "_._";
const NATIVE_SEGMENT: &str = "/native/";
const NATIVE_ASSET_TYPE: &str = "native";

#[derive(Debug, Default)]
pub struct DependencyGraph {
    pub direct: Vec<DependencyRange>,
    pub flattened: Vec<Dependency>,
}

impl DependencyGraph {
    /// Recomputes dependencies from `artifact`. A missing artifact yields
    /// empty lists.
    pub fn from_artifact(
        artifact: Option<&LockArtifact>,
        selection: &TargetSelection,
        want_direct: bool,
        want_flattened: bool,
    ) -> Self {
        let Some(artifact) = artifact else {
            return Self::default();
        };
        Self {
            direct: if want_direct {
                direct_from(artifact)
            } else {
                Vec::new()
            },
            flattened: if want_flattened {
                flattened_from(artifact, selection)
            } else {
                Vec::new()
            },
        }
    }
}

fn flattened_from(artifact: &LockArtifact, selection: &TargetSelection) -> Vec<Dependency> {
    let mut catalog: HashMap<(&str, PackageVersion), &LockLibrary> = HashMap::new();
    for (key, library) in &artifact.libraries {
        if let Some((name, version)) = parse_library_key(key) {
            catalog.insert((name, version), library);
        }
    }

    let Some((target_name, libraries)) = selection.select(artifact) else {
        debug!("deps: lock artifact has no targets");
        return Vec::new();
    };
    debug!("deps: using target {target_name}");

    let mut dependencies = Vec::new();
    for (key, target_library) in libraries {
        let Some((name, version)) = parse_library_key(key) else {
            continue;
        };
        let Some(library) = catalog.get(&(name, version.clone())) else {
            continue;
        };

        let kind = DependencyKind::from_tag(&library.kind);
        let mut dependency = Dependency::new(name, version, kind);
        if kind == DependencyKind::Project {
            if let Some(project_path) = &library.msbuild_project {
                dependency = dependency.with_project_path(project_path);
            }
        }
        if kind == DependencyKind::Package {
            if let Some(root) = probe_package_root(artifact, library) {
                dependency.binaries = runtime_binaries(&root, target_library);
            }
        }
        dependencies.push(dependency);
    }
    dependencies
}

fn direct_from(artifact: &LockArtifact) -> Vec<DependencyRange> {
    let Some(spec) = &artifact.project else {
        return Vec::new();
    };
    let mut direct = Vec::new();

    let restore_framework = spec
        .restore
        .as_ref()
        .and_then(|restore| restore.frameworks.first());
    if let Some((_, framework)) = restore_framework {
        for (unique_name, reference) in &framework.project_references {
            let name = Path::new(unique_name)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| unique_name.clone());
            direct.push(DependencyRange::project(name, &reference.project_path));
        }
    }

    if let Some((_, framework)) = spec.frameworks.first() {
        for (name, dependency) in &framework.dependencies {
            if dependency.auto_referenced {
                continue;
            }
            let version = dependency.version.as_deref().and_then(|text| {
                VersionRange::parse(text)
                    .map_err(|err| warn!("deps: ignoring version of {name}: {err}"))
                    .ok()
            });
            direct.push(DependencyRange {
                name: name.clone(),
                version,
                kind: DependencyKind::Package,
                project_path: None,
            });
        }
    }
    direct
}

fn parse_library_key(key: &str) -> Option<(&str, PackageVersion)> {
    let (name, version) = split_library_key(key)?;
    match PackageVersion::parse(version) {
        Ok(version) => Some((name, version)),
        Err(err) => {
            debug!("deps: skipping library {key}: {err}");
            None
        }
    }
}

/// First package folder that contains the library directory.
fn probe_package_root(artifact: &LockArtifact, library: &LockLibrary) -> Option<PathBuf> {
    let relative = library.path.as_deref()?;
    artifact
        .package_folders
        .keys()
        .map(|folder| Path::new(folder).join(os_relative(relative)))
        .find(|candidate| candidate.is_dir())
}

fn runtime_binaries(root: &Path, library: &TargetLibrary) -> Vec<PathBuf> {
    let runtime = library
        .runtime
        .keys()
        .filter(|path| is_binary_entry(path));
    let runtime_targets = library
        .runtime_targets
        .iter()
        .filter(|(path, target)| {
            is_binary_entry(path) && target.asset_type.as_deref() != Some(NATIVE_ASSET_TYPE)
        })
        .map(|(path, _)| path);
    runtime
        .chain(runtime_targets)
        .map(|path| root.join(os_relative(path)))
        .collect()
}

fn is_binary_entry(path: &str) -> bool {
    !path.ends_with(PLACEHOLDER_SUFFIX) && !path.contains(NATIVE_SEGMENT)
}

fn os_relative(path: &str) -> PathBuf {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn artifact(packages: &Path) -> eyre::Result<LockArtifact> {
        let missing = packages.join("missing").to_string_lossy().into_owned();
        let present = packages.to_string_lossy().into_owned();
        let json = serde_json::json!({
            "version": 3,
            "targets": {
                "net8.0": {
                    "Engine.Core/4.2.0": {
                        "type": "package",
                        "runtime": {
                            "lib/net8.0/Engine.Core.dll": {},
                            "lib/net8.0/_._": {},
                            "runtimes/linux-x64/native/libengine.so": {}
                        },
                        "runtimeTargets": {
                            "runtimes/win/lib/net8.0/Engine.Core.Win.dll": { "assetType": "runtime", "rid": "win" },
                            "runtimes/win-x64/lib/engine_native.dll": { "assetType": "native", "rid": "win-x64" }
                        }
                    },
                    "Game.Shared/1.0.0": { "type": "project" },
                    "Orphan/1.0.0": { "type": "package" }
                }
            },
            "libraries": {
                "Engine.Core/4.2.0": { "type": "package", "path": "engine.core/4.2.0" },
                "Game.Shared/1.0.0": { "type": "project", "path": "../Shared/Game.Shared.toml", "msbuildProject": "../Shared/Game.Shared.toml" }
            },
            "packageFolders": {
                missing: {},
                present: {}
            },
            "project": {
                "restore": {
                    "projectUniqueName": "/work/Game/Game.toml",
                    "frameworks": {
                        "net8.0": {
                            "projectReferences": {
                                "/work/Shared/Game.Shared.toml": { "projectPath": "/work/Shared/Game.Shared.toml" }
                            }
                        }
                    }
                },
                "frameworks": {
                    "net8.0": {
                        "dependencies": {
                            "Engine.Core": { "target": "Package", "version": "[4.2.0, )" },
                            "Platform.Sdk": { "target": "Package", "version": "[8.0.0, )", "autoReferenced": true }
                        }
                    }
                }
            }
        });
        Ok(serde_json::from_value(json)?)
    }

    #[test]
    fn missing_artifact_yields_empty_lists() {
        let graph = DependencyGraph::from_artifact(None, &TargetSelection::Last, true, true);
        assert!(graph.direct.is_empty());
        assert!(graph.flattened.is_empty());
    }

    #[test]
    fn flattened_binaries_skip_placeholders_and_native_entries() -> eyre::Result<()> {
        let packages = tempfile::tempdir()?;
        let root = packages.path().join("engine.core").join("4.2.0");
        std::fs::create_dir_all(&root)?;
        let artifact = artifact(packages.path())?;

        let graph = DependencyGraph::from_artifact(Some(&artifact), &TargetSelection::Last, false, true);
        let names: Vec<_> = graph.flattened.iter().map(|dep| dep.name.as_str()).collect();
        assert_eq!(names, vec!["Engine.Core", "Game.Shared"]);

        let engine = &graph.flattened[0];
        assert_eq!(engine.kind, DependencyKind::Package);
        assert_eq!(
            engine.binaries,
            vec![
                root.join("lib").join("net8.0").join("Engine.Core.dll"),
                root.join("runtimes")
                    .join("win")
                    .join("lib")
                    .join("net8.0")
                    .join("Engine.Core.Win.dll"),
            ]
        );

        let shared = &graph.flattened[1];
        assert_eq!(shared.kind, DependencyKind::Project);
        assert_eq!(
            shared.project_path.as_deref(),
            Some(Path::new("../Shared/Game.Shared.toml"))
        );
        assert!(shared.binaries.is_empty());
        Ok(())
    }

    #[test]
    fn library_type_tags_are_case_insensitive() -> eyre::Result<()> {
        let packages = tempfile::tempdir()?;
        let root = packages.path().join("engine.core").join("4.2.0");
        std::fs::create_dir_all(&root)?;
        let mut artifact = artifact(packages.path())?;
        for library in artifact.libraries.values_mut() {
            library.kind = library.kind.to_ascii_uppercase();
        }

        let graph = DependencyGraph::from_artifact(Some(&artifact), &TargetSelection::Last, false, true);
        let engine = &graph.flattened[0];
        assert_eq!(engine.kind, DependencyKind::Package);
        assert_eq!(engine.binaries.len(), 2);
        let shared = &graph.flattened[1];
        assert_eq!(shared.kind, DependencyKind::Project);
        assert!(shared.project_path.is_some());
        Ok(())
    }

    #[test]
    fn packages_without_a_folder_have_no_binaries() -> eyre::Result<()> {
        let packages = tempfile::tempdir()?;
        let artifact = artifact(packages.path())?;
        let graph = DependencyGraph::from_artifact(Some(&artifact), &TargetSelection::Last, false, true);
        assert!(graph.flattened[0].binaries.is_empty());
        Ok(())
    }

    #[test]
    fn direct_dependencies_skip_auto_referenced_packages() -> eyre::Result<()> {
        let packages = tempfile::tempdir()?;
        let artifact = artifact(packages.path())?;
        let graph = DependencyGraph::from_artifact(Some(&artifact), &TargetSelection::Last, true, false);
        assert!(graph.flattened.is_empty());
        assert_eq!(
            graph.direct,
            vec![
                DependencyRange::project("Game.Shared", "/work/Shared/Game.Shared.toml"),
                DependencyRange::package("Engine.Core", VersionRange::parse("[4.2.0, )")?),
            ]
        );
        Ok(())
    }
}
