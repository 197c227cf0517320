//! The resolved-lock artifact written by package restore.
//!
//! The artifact records the library catalog, one resolved library list per
//! target, the package folders used for the restore and the package spec of
//! the project itself.

use eyre::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub type TargetLibraries = IndexMap<String, TargetLibrary>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockArtifact {
    #[serde(default)]
    pub version: u32,
    /// Catalog keyed by `Name/Version`.
    #[serde(default)]
    pub libraries: IndexMap<String, LockLibrary>,
    /// Target name to resolved libraries keyed by `Name/Version`.
    #[serde(default)]
    pub targets: IndexMap<String, TargetLibraries>,
    /// Package folder roots, probed in order.
    #[serde(default)]
    pub package_folders: IndexMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<PackageSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockLibrary {
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Package directory relative to a package folder, `/` separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msbuild_project: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetLibrary {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: IndexMap<String, String>,
    /// Runtime binaries keyed by their path inside the package.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub runtime: IndexMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub runtime_targets: IndexMap<String, RuntimeTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore: Option<RestoreMetadata>,
    #[serde(default)]
    pub frameworks: IndexMap<String, FrameworkSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreMetadata {
    #[serde(default)]
    pub project_unique_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(default)]
    pub frameworks: IndexMap<String, RestoreFramework>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreFramework {
    #[serde(default)]
    pub project_references: IndexMap<String, ProjectReferenceSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectReferenceSpec {
    pub project_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkSpec {
    #[serde(default)]
    pub dependencies: IndexMap<String, DependencySpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub auto_referenced: bool,
}

impl LockArtifact {
    /// Reads an artifact. A missing file is `Ok(None)`; unreadable or
    /// malformed content is an error.
    pub fn read_from_path(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lock artifact {}", path.display()))?;
        let artifact = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse lock artifact {}", path.display()))?;
        Ok(Some(artifact))
    }

    pub fn write_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write lock artifact {}", path.display()))?;
        Ok(())
    }
}

/// Which resolved target list of the artifact to use.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TargetSelection {
    First,
    /// The most recently computed target.
    #[default]
    Last,
    /// A target by name, falling back to `Last` when the artifact lacks it.
    Named(String),
}

impl TargetSelection {
    pub fn select<'a>(&self, artifact: &'a LockArtifact) -> Option<(&'a str, &'a TargetLibraries)> {
        let entry = match self {
            TargetSelection::First => artifact.targets.first(),
            TargetSelection::Last => artifact.targets.last(),
            TargetSelection::Named(name) => artifact
                .targets
                .get_key_value(name.as_str())
                .or_else(|| artifact.targets.last()),
        };
        entry.map(|(name, libraries)| (name.as_str(), libraries))
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "first" => TargetSelection::First,
            "last" | "" => TargetSelection::Last,
            name => TargetSelection::Named(name.to_string()),
        }
    }
}

impl FromStr for TargetSelection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl fmt::Display for TargetSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSelection::First => f.write_str("first"),
            TargetSelection::Last => f.write_str("last"),
            TargetSelection::Named(name) => f.write_str(name),
        }
    }
}

impl Serialize for TargetSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TargetSelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::from_name(&text))
    }
}

/// Splits a `Name/Version` library key.
pub fn split_library_key(key: &str) -> Option<(&str, &str)> {
    key.rsplit_once('/')
        .filter(|(name, version)| !name.is_empty() && !version.is_empty())
}
