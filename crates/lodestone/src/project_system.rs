//! Build-system collaborator: project evaluation, package-reference rewrites,
//! lock artifacts and restore.

use crate::lock::LockArtifact;
use async_trait::async_trait;
use eyre::{Context, Result, bail};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const LOCK_ARTIFACT_DIR: &str = "obj";
pub const LOCK_ARTIFACT_FILE: &str = "project.lock.json";
pub const RESTORE_LOCK_FILE: &str = "restore.lock";
/// Extensions of project files that can be loaded as project dependencies.
pub const PROJECT_EXTENSIONS: &[&str] = &["toml"];

pub const PROPERTY_NAME: &str = "name";
pub const PROPERTY_VERSION: &str = "version";
pub const PROPERTY_OUTPUT_TYPE: &str = "output-type";
pub const PROPERTY_TARGET_PATH: &str = "target-path";
pub const PROPERTY_PLATFORM: &str = "platform";
pub const PROPERTY_ANDROID_APPLICATION: &str = "android-application";

pub const ITEM_PACKAGE_REFERENCE: &str = "PackageReference";
pub const ITEM_PROJECT_REFERENCE: &str = "ProjectReference";
pub const METADATA_VERSION: &str = "Version";

/// `<project dir>/obj/project.lock.json`
pub fn lock_artifact_path(project_path: &Path) -> PathBuf {
    project_dir(project_path)
        .join(LOCK_ARTIFACT_DIR)
        .join(LOCK_ARTIFACT_FILE)
}

/// `<project dir>/obj/restore.lock`
pub fn restore_lock_path(project_path: &Path) -> PathBuf {
    project_dir(project_path)
        .join(LOCK_ARTIFACT_DIR)
        .join(RESTORE_LOCK_FILE)
}

pub fn is_project_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            PROJECT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn project_dir(project_path: &Path) -> &Path {
    project_path.parent().unwrap_or(Path::new("."))
}

#[derive(Debug, Clone, Default)]
pub struct EvaluationOptions {
    /// Named configuration whose overrides apply; unknown names are ignored.
    pub configuration: Option<String>,
    /// Extra properties; these win over anything the project defines.
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectItem {
    pub kind: String,
    pub include: String,
    pub metadata: BTreeMap<String, String>,
}

impl ProjectItem {
    pub fn metadata(&self, name: &str) -> Option<&str> {
        self.metadata.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectEvaluation {
    pub properties: BTreeMap<String, String>,
    pub items: Vec<ProjectItem>,
}

impl ProjectEvaluation {
    /// A property value; empty values count as absent.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn items<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a ProjectItem> + 'a {
        self.items.iter().filter(move |item| item.kind == kind)
    }
}

#[async_trait]
pub trait BuildSystem: Send + Sync {
    fn evaluate_project(&self, path: &Path, options: &EvaluationOptions) -> Result<ProjectEvaluation>;

    /// Rewrites the version of the named package reference. Returns whether
    /// the file changed; nothing is written when the version already matches.
    fn set_package_reference_version(&self, path: &Path, name: &str, version: &str) -> Result<bool>;

    fn read_lock_artifact(&self, path: &Path) -> Result<Option<LockArtifact>> {
        LockArtifact::read_from_path(&lock_artifact_path(path))
    }

    /// Restores packages, refreshing the lock artifact.
    async fn restore(&self, path: &Path) -> Result<()>;
}

/// Project definitions stored as TOML.
///
/// ```toml
/// [project]
/// name = "Game"
/// output-type = "exe"
///
/// [package-references]
/// "Engine.Core" = "4.2"
/// "Engine.Physics" = { version = "[4.0,5.0)" }
///
/// [project-references]
/// paths = ["../Game.Shared/Game.Shared.toml"]
///
/// [configurations.Release]
/// platform = "Windows"
/// ```
#[derive(Debug, Clone, Default)]
pub struct TomlBuildSystem {
    restore_command: Option<Vec<String>>,
}

impl TomlBuildSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program and arguments run from the project directory on restore, with
    /// the project path appended.
    pub fn with_restore_command(mut self, command: Vec<String>) -> Self {
        self.restore_command = Some(command).filter(|command| !command.is_empty());
        self
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ProjectFile {
    #[serde(default)]
    project: BTreeMap<String, toml::Value>,
    #[serde(default)]
    package_references: IndexMap<String, PackageReferenceConfig>,
    #[serde(default)]
    project_references: ProjectReferencesConfig,
    #[serde(default)]
    configurations: BTreeMap<String, BTreeMap<String, toml::Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PackageReferenceConfig {
    Simple(String),
    Detailed {
        #[serde(default)]
        version: Option<String>,
    },
}

impl PackageReferenceConfig {
    fn version(&self) -> Option<&str> {
        match self {
            PackageReferenceConfig::Simple(version) => Some(version),
            PackageReferenceConfig::Detailed { version } => version.as_deref(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProjectReferencesConfig {
    #[serde(default)]
    paths: Vec<String>,
}

fn property_text(value: &toml::Value) -> String {
    match value {
        toml::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn read_project_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read project {}", path.display()))
}

#[async_trait]
impl BuildSystem for TomlBuildSystem {
    fn evaluate_project(&self, path: &Path, options: &EvaluationOptions) -> Result<ProjectEvaluation> {
        let content = read_project_file(path)?;
        let file: ProjectFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse project {}", path.display()))?;

        let mut properties: BTreeMap<String, String> = file
            .project
            .iter()
            .map(|(key, value)| (key.clone(), property_text(value)))
            .collect();
        if let Some(configuration) = &options.configuration {
            match file.configurations.get(configuration) {
                Some(overrides) => {
                    for (key, value) in overrides {
                        properties.insert(key.clone(), property_text(value));
                    }
                }
                None => debug!(
                    "load: configuration {configuration} not defined by {}, skipping",
                    path.display()
                ),
            }
        }
        properties.extend(options.properties.clone());

        let mut items = Vec::new();
        for (name, reference) in &file.package_references {
            let mut metadata = BTreeMap::new();
            if let Some(version) = reference.version() {
                metadata.insert(METADATA_VERSION.to_string(), version.to_string());
            }
            items.push(ProjectItem {
                kind: ITEM_PACKAGE_REFERENCE.to_string(),
                include: name.clone(),
                metadata,
            });
        }
        for reference in &file.project_references.paths {
            items.push(ProjectItem {
                kind: ITEM_PROJECT_REFERENCE.to_string(),
                include: reference.clone(),
                metadata: BTreeMap::new(),
            });
        }

        Ok(ProjectEvaluation { properties, items })
    }

    fn set_package_reference_version(&self, path: &Path, name: &str, version: &str) -> Result<bool> {
        let content = read_project_file(path)?;
        let mut document: toml::Table = toml::from_str(&content)
            .with_context(|| format!("Failed to parse project {}", path.display()))?;

        let Some(references) = document
            .get_mut("package-references")
            .and_then(toml::Value::as_table_mut)
        else {
            return Ok(false);
        };
        let Some(reference) = references.get_mut(name) else {
            return Ok(false);
        };

        let current = match &*reference {
            toml::Value::String(current) => Some(current.as_str()),
            toml::Value::Table(table) => table.get("version").and_then(toml::Value::as_str),
            _ => None,
        };
        if current == Some(version) {
            return Ok(false);
        }
        match reference {
            toml::Value::Table(table) => {
                table.insert("version".to_string(), toml::Value::String(version.to_string()));
            }
            other => *other = toml::Value::String(version.to_string()),
        }

        let updated = toml::to_string_pretty(&document)?;
        std::fs::write(path, updated)
            .with_context(|| format!("Failed to write project {}", path.display()))?;
        debug!("upgrade: set {name} to {version} in {}", path.display());
        Ok(true)
    }

    async fn restore(&self, path: &Path) -> Result<()> {
        let Some(command) = &self.restore_command else {
            debug!(
                "restore: no restore command configured, keeping lock artifact of {}",
                path.display()
            );
            return Ok(());
        };
        let (program, args) = command
            .split_first()
            .ok_or_else(|| eyre::eyre!("empty restore command"))?;
        debug!("restore: running {program} for {}", path.display());
        let status = tokio::process::Command::new(program)
            .args(args)
            .arg(path)
            .current_dir(project_dir(path))
            .status()
            .await
            .with_context(|| format!("Failed to run restore command {program}"))?;
        if !status.success() {
            bail!("restore of {} failed with {status}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PROJECT: &str = r#"
[project]
name = "Game"
output-type = "exe"
android-application = false

[package-references]
"Engine.Core" = "1.0"
"Engine.Physics" = { version = "[4.0,5.0)" }

[project-references]
paths = ["../Shared/Shared.toml"]

[configurations.Release]
platform = "Windows"
"#;

    #[test]
    fn evaluation_applies_configuration_and_extra_properties() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("Game.toml");
        std::fs::write(&path, PROJECT)?;

        let options = EvaluationOptions {
            configuration: Some("Release".to_string()),
            properties: BTreeMap::from([("name".to_string(), "Game.Desktop".to_string())]),
        };
        let evaluation = TomlBuildSystem::new().evaluate_project(&path, &options)?;
        assert_eq!(evaluation.property(PROPERTY_NAME), Some("Game.Desktop"));
        assert_eq!(evaluation.property(PROPERTY_PLATFORM), Some("Windows"));
        assert_eq!(evaluation.property(PROPERTY_ANDROID_APPLICATION), Some("false"));

        let references: Vec<_> = evaluation
            .items(ITEM_PACKAGE_REFERENCE)
            .map(|item| (item.include.as_str(), item.metadata(METADATA_VERSION)))
            .collect();
        assert_eq!(
            references,
            vec![("Engine.Core", Some("1.0")), ("Engine.Physics", Some("[4.0,5.0)"))]
        );
        assert_eq!(evaluation.items(ITEM_PROJECT_REFERENCE).count(), 1);
        Ok(())
    }

    #[test]
    fn rewriting_a_reference_only_writes_on_change() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("Game.toml");
        std::fs::write(&path, PROJECT)?;
        let build = TomlBuildSystem::new();

        assert!(build.set_package_reference_version(&path, "Engine.Core", "2.0")?);
        assert!(!build.set_package_reference_version(&path, "Engine.Core", "2.0")?);
        assert!(build.set_package_reference_version(&path, "Engine.Physics", "5.0")?);
        assert!(!build.set_package_reference_version(&path, "Engine.Audio", "1.0")?);

        let evaluation = build.evaluate_project(&path, &EvaluationOptions::default())?;
        let versions: BTreeMap<_, _> = evaluation
            .items(ITEM_PACKAGE_REFERENCE)
            .map(|item| (item.include.clone(), item.metadata(METADATA_VERSION).map(str::to_string)))
            .collect();
        assert_eq!(versions["Engine.Core"].as_deref(), Some("2.0"));
        assert_eq!(versions["Engine.Physics"].as_deref(), Some("5.0"));
        Ok(())
    }

    #[test]
    fn artifact_paths_live_under_obj() {
        let path = Path::new("/work/Game/Game.toml");
        assert_eq!(
            lock_artifact_path(path),
            Path::new("/work/Game/obj/project.lock.json")
        );
        assert_eq!(restore_lock_path(path), Path::new("/work/Game/obj/restore.lock"));
        assert!(is_project_extension(Path::new("../Shared/Shared.TOML")));
        assert!(!is_project_extension(Path::new("../Shared/Shared.csproj")));
    }
}
