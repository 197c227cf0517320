#![allow(dead_code)]

use lodestone::{
    FolderPackageStore, LockArtifact, PackageSession, PackageUpgrader, PackageVersion,
    TomlBuildSystem, UpgradeHookContext, UpgraderDescriptor, UpgraderRegistry, VersionRange,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Upgrader that counts hook invocations and answers with a fixed result.
pub struct CountingUpgrader {
    descriptor: UpgraderDescriptor,
    succeed: bool,
    calls: AtomicUsize,
}

impl CountingUpgrader {
    pub fn new(package: &str, minimum: &str, target: &str) -> eyre::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            descriptor: UpgraderDescriptor::new(
                package,
                PackageVersion::parse(minimum)?,
                VersionRange::parse(target)?,
            ),
            succeed: true,
            calls: AtomicUsize::new(0),
        }))
    }

    pub fn failing(package: &str, minimum: &str, target: &str) -> eyre::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            descriptor: UpgraderDescriptor::new(
                package,
                PackageVersion::parse(minimum)?,
                VersionRange::parse(target)?,
            ),
            succeed: false,
            calls: AtomicUsize::new(0),
        }))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PackageUpgrader for CountingUpgrader {
    fn descriptor(&self) -> &UpgraderDescriptor {
        &self.descriptor
    }

    fn upgrade_before_assemblies_loaded(&self, _context: &UpgradeHookContext<'_>) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.succeed
    }
}

pub fn session_with(upgraders: &[Arc<CountingUpgrader>], store_roots: Vec<PathBuf>) -> PackageSession {
    let registry = UpgraderRegistry::new();
    for upgrader in upgraders {
        registry.register(upgrader.clone());
    }
    PackageSession::new(
        Arc::new(TomlBuildSystem::new()),
        Arc::new(FolderPackageStore::new(store_roots)),
        Arc::new(registry),
    )
}

/// Writes `<root>/<name>/<name>.toml` and returns its path.
pub fn write_project(root: &Path, name: &str, content: &str) -> eyre::Result<PathBuf> {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{name}.toml"));
    std::fs::write(&path, content)?;
    Ok(path)
}

pub fn write_lock_artifact(project: &Path, artifact: &serde_json::Value) -> eyre::Result<()> {
    let dir = project
        .parent()
        .ok_or_else(|| eyre::eyre!("project has no directory"))?
        .join("obj");
    let artifact: LockArtifact = serde_json::from_value(artifact.clone())?;
    artifact.write_to_path(&dir.join("project.lock.json"))
}

/// Version text of a package reference as currently written in `project`.
pub fn reference_version(project: &Path, package: &str) -> eyre::Result<Option<String>> {
    let document: toml::Table = toml::from_str(&std::fs::read_to_string(project)?)?;
    let version = document
        .get("package-references")
        .and_then(|references| references.get(package))
        .and_then(|reference| match reference {
            toml::Value::String(version) => Some(version.clone()),
            other => other
                .get("version")
                .and_then(toml::Value::as_str)
                .map(str::to_string),
        });
    Ok(version)
}
