//! `Lodestone.toml`: session settings, evaluation properties, package
//! constraints and declarative upgraders.

use crate::binaries::BinaryRegistry;
use crate::lock::TargetSelection;
use crate::project_system::TomlBuildSystem;
use crate::session::{LoadParameters, PackageSession};
use crate::store::{FolderPackageStore, PackageConstraints};
use crate::upgrade::{DeclarativeUpgrader, UpgradePolicy, UpgraderDescriptor, UpgraderRegistry};
use crate::version::{PackageVersion, VersionRange};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const CONFIG_FILE: &str = "Lodestone.toml";
/// Extra package folders, searched before the configured ones.
pub const PACKAGES_ENV: &str = "LODESTONE_PACKAGES";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LodestoneConfig {
    #[serde(default)]
    pub session: SessionConfig,
    /// Properties passed to every project evaluation.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Ranges every package store lookup must satisfy.
    #[serde(default)]
    pub constraints: BTreeMap<String, VersionRange>,
    #[serde(default)]
    pub upgraders: Vec<UpgraderConfig>,
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionConfig {
    #[serde(default)]
    pub target: TargetSelection,
    #[serde(default = "default_auto_restore")]
    pub auto_restore: bool,
    #[serde(default)]
    pub upgrade_policy: UpgradePolicy,
    /// Build configuration used when evaluating projects.
    #[serde(default)]
    pub configuration: Option<String>,
    #[serde(default)]
    pub package_folders: Vec<PathBuf>,
    /// Program and arguments run on restore; the project path is appended.
    #[serde(default)]
    pub restore_command: Vec<String>,
}

fn default_auto_restore() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target: TargetSelection::default(),
            auto_restore: default_auto_restore(),
            upgrade_policy: UpgradePolicy::default(),
            configuration: None,
            package_folders: Vec::new(),
            restore_command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct UpgraderConfig {
    pub package: String,
    pub minimum_version: PackageVersion,
    pub updated_range: VersionRange,
    #[serde(default)]
    pub description: Option<String>,
}

impl LodestoneConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Loads `path` when given, otherwise the nearest `Lodestone.toml` above
    /// `start_dir`, otherwise the defaults.
    pub fn load(path: Option<&Path>, start_dir: &Path) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match find_nearest_config(start_dir) {
            Some(found) => {
                debug!("using config {}", found.display());
                Self::from_file(&found)
            }
            None => Ok(Self::default()),
        }
    }

    fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Folders from `LODESTONE_PACKAGES` followed by the configured ones,
    /// the latter relative to the config file.
    pub fn package_folders(&self) -> Vec<PathBuf> {
        let mut folders: Vec<PathBuf> = std::env::var_os(PACKAGES_ENV)
            .map(|value| std::env::split_paths(&value).collect())
            .unwrap_or_default();
        let base = self.base_dir();
        folders.extend(
            self.session
                .package_folders
                .iter()
                .map(|folder| base.join(folder)),
        );
        folders
    }

    pub fn upgrader_registry(&self) -> UpgraderRegistry {
        let registry = UpgraderRegistry::new();
        for upgrader in &self.upgraders {
            let descriptor = UpgraderDescriptor::new(
                upgrader.package.clone(),
                upgrader.minimum_version.clone(),
                upgrader.updated_range.clone(),
            );
            registry.register(Arc::new(DeclarativeUpgrader::new(
                descriptor,
                upgrader.description.clone(),
            )));
        }
        registry
    }

    pub fn load_parameters(&self) -> LoadParameters {
        let constraints: PackageConstraints = self
            .constraints
            .iter()
            .map(|(name, range)| (name.clone(), range.clone()))
            .collect();
        LoadParameters {
            build_configuration: self.session.configuration.clone(),
            extra_properties: self.properties.clone(),
            auto_restore: self.session.auto_restore,
            upgrade_policy: self.session.upgrade_policy,
            upgrade_prompt: None,
            package_constraints: constraints,
        }
    }

    /// A session wired with the TOML build system, a folder store over
    /// [`Self::package_folders`] and the process-wide binary registry.
    pub fn build_session(&self) -> PackageSession {
        let build = TomlBuildSystem::new().with_restore_command(self.session.restore_command.clone());
        let store = FolderPackageStore::new(self.package_folders());
        PackageSession::new(
            Arc::new(build),
            Arc::new(store),
            Arc::new(self.upgrader_registry()),
        )
        .with_binaries(BinaryRegistry::shared())
        .with_target_selection(self.session.target.clone())
    }
}

/// The closest `Lodestone.toml`, starting at `start_dir` and walking up.
pub fn find_nearest_config(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}
