use crate::version::{PackageVersion, VersionRange};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, trace};

/// Extra per-package ranges every store lookup must also satisfy.
pub type PackageConstraints = HashMap<String, VersionRange>;

pub trait PackageStore: Send + Sync {
    /// Path of the package definition for `name`, or `None` when no stored
    /// version satisfies both `range` and the constraints.
    fn find_package_file(
        &self,
        name: &str,
        range: &VersionRange,
        constraints: &PackageConstraints,
    ) -> Option<PathBuf>;
}

/// Packages installed as `<root>/<lowercase name>/<version>/<name>.toml`.
///
/// The highest satisfying version wins; on a tie the earlier root wins.
#[derive(Debug, Clone, Default)]
pub struct FolderPackageStore {
    roots: Vec<PathBuf>,
}

impl FolderPackageStore {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Every installed version of `name` with its definition file, across all roots.
    pub fn installed_versions(&self, name: &str) -> Vec<(PackageVersion, PathBuf)> {
        let mut versions = Vec::new();
        for root in &self.roots {
            let package_dir = root.join(name.to_lowercase());
            let Ok(entries) = std::fs::read_dir(&package_dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let dir_name = entry.file_name();
                let Some(dir_name) = dir_name.to_str() else {
                    continue;
                };
                let Ok(version) = PackageVersion::parse(dir_name) else {
                    trace!("store: ignoring {}", entry.path().display());
                    continue;
                };
                let file = entry.path().join(format!("{name}.toml"));
                if file.is_file() {
                    versions.push((version, file));
                }
            }
        }
        versions
    }
}

impl PackageStore for FolderPackageStore {
    fn find_package_file(
        &self,
        name: &str,
        range: &VersionRange,
        constraints: &PackageConstraints,
    ) -> Option<PathBuf> {
        let constraint = constraints
            .iter()
            .find(|(constrained, _)| constrained.eq_ignore_ascii_case(name))
            .map(|(_, range)| range);

        let mut best: Option<(PackageVersion, PathBuf)> = None;
        for (version, file) in self.installed_versions(name) {
            if !range.satisfies(&version) {
                continue;
            }
            if constraint.is_some_and(|constraint| !constraint.satisfies(&version)) {
                continue;
            }
            if best.as_ref().map_or(true, |(current, _)| version > *current) {
                best = Some((version, file));
            }
        }

        match &best {
            Some((version, file)) => debug!("store: {name} {range} resolved to {version} at {}", file.display()),
            None => debug!("store: no installed version of {name} satisfies {range}"),
        }
        best.map(|(_, file)| file)
    }
}
