//! Projects and the packages they own.

use crate::dependency::{Dependency, DependencyKind, DependencyRange};
use crate::version::PackageVersion;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lifecycle of a package within a session. Transitions only move forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PackageState {
    #[default]
    Unloaded,
    DependenciesReady,
    AssembliesReady,
    AssetsReady,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageMeta {
    pub name: String,
    pub version: PackageVersion,
}

#[derive(Debug)]
pub struct Package {
    meta: RwLock<PackageMeta>,
    state: RwLock<PackageState>,
    direct: RwLock<Vec<DependencyRange>>,
    flattened: RwLock<Vec<Arc<Dependency>>>,
}

impl Package {
    pub fn new(name: impl Into<String>, version: PackageVersion) -> Self {
        Self {
            meta: RwLock::new(PackageMeta {
                name: name.into(),
                version,
            }),
            state: RwLock::new(PackageState::Unloaded),
            direct: RwLock::new(Vec::new()),
            flattened: RwLock::new(Vec::new()),
        }
    }

    pub fn meta(&self) -> PackageMeta {
        self.meta.read().clone()
    }

    pub fn name(&self) -> String {
        self.meta.read().name.clone()
    }

    pub fn version(&self) -> PackageVersion {
        self.meta.read().version.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.meta.write().name = name.into();
    }

    pub fn set_version(&self, version: PackageVersion) {
        self.meta.write().version = version;
    }

    pub fn state(&self) -> PackageState {
        *self.state.read()
    }

    /// Moves the state forward. Returns false and leaves the state untouched
    /// when `state` is not later than the current one.
    pub fn advance_state(&self, state: PackageState) -> bool {
        let mut current = self.state.write();
        if state > *current {
            *current = state;
            true
        } else {
            false
        }
    }

    pub fn direct_dependencies(&self) -> Vec<DependencyRange> {
        self.direct.read().clone()
    }

    pub fn flattened_dependencies(&self) -> Vec<Arc<Dependency>> {
        self.flattened.read().clone()
    }

    pub(crate) fn replace_direct(&self, direct: Vec<DependencyRange>) {
        *self.direct.write() = direct;
    }

    pub(crate) fn replace_flattened(&self, flattened: Vec<Arc<Dependency>>) {
        *self.flattened.write() = flattened;
    }

    /// Names compare case-insensitively, versions by value.
    pub fn matches(&self, name: &str, version: &PackageVersion) -> bool {
        let meta = self.meta.read();
        meta.name.eq_ignore_ascii_case(name) && &meta.version == version
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectFlavor {
    /// A project file evaluated by the build system.
    Solution,
    /// A package loaded from the package store.
    Standalone,
}

impl ProjectFlavor {
    pub fn dependency_kind(self) -> DependencyKind {
        match self {
            ProjectFlavor::Solution => DependencyKind::Project,
            ProjectFlavor::Standalone => DependencyKind::Package,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectType {
    #[default]
    Library,
    Executable,
}

impl ProjectType {
    /// `exe`, `winexe` and `appcontainerexe` output types, as well as Android
    /// applications, are executables.
    pub fn from_properties(output_type: Option<&str>, android_application: Option<&str>) -> Self {
        let is_exe = output_type.is_some_and(|kind| {
            ["exe", "winexe", "appcontainerexe"]
                .iter()
                .any(|exe| kind.eq_ignore_ascii_case(exe))
        });
        let is_android = android_application.is_some_and(|flag| flag.eq_ignore_ascii_case("true"));
        if is_exe || is_android {
            ProjectType::Executable
        } else {
            ProjectType::Library
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformType {
    #[default]
    Shared,
    Windows,
    UWP,
    Android,
    #[serde(rename = "iOS")]
    IOS,
    Linux,
    #[serde(rename = "macOS")]
    MacOS,
}

impl PlatformType {
    pub fn from_property(value: &str) -> Option<Self> {
        let platform = match value.trim().to_ascii_lowercase().as_str() {
            "shared" => PlatformType::Shared,
            "windows" | "win" => PlatformType::Windows,
            "uwp" => PlatformType::UWP,
            "android" => PlatformType::Android,
            "ios" => PlatformType::IOS,
            "linux" => PlatformType::Linux,
            "macos" | "osx" => PlatformType::MacOS,
            _ => return None,
        };
        Some(platform)
    }
}

impl fmt::Display for PlatformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlatformType::Shared => "Shared",
            PlatformType::Windows => "Windows",
            PlatformType::UWP => "UWP",
            PlatformType::Android => "Android",
            PlatformType::IOS => "iOS",
            PlatformType::Linux => "Linux",
            PlatformType::MacOS => "macOS",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProjectInfo {
    pub project_type: ProjectType,
    pub platform: PlatformType,
    pub target_path: Option<PathBuf>,
}

/// A project owns exactly one package.
#[derive(Debug)]
pub struct Project {
    path: PathBuf,
    flavor: ProjectFlavor,
    package: Arc<Package>,
    info: RwLock<ProjectInfo>,
    binaries: RwLock<Vec<PathBuf>>,
    pub(crate) load_lock: tokio::sync::Mutex<()>,
}

impl Project {
    /// A project file evaluated by the build system. Its package is named
    /// after the file stem until evaluation says otherwise.
    pub fn solution(path: impl AsRef<Path>) -> Arc<Self> {
        let path = normalize_path(path.as_ref());
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Arc::new(Self::with_package(
            path,
            ProjectFlavor::Solution,
            Package::new(name, PackageVersion::new(1, 0, 0, 0)),
        ))
    }

    pub fn standalone(path: impl AsRef<Path>, name: impl Into<String>, version: PackageVersion) -> Arc<Self> {
        Arc::new(Self::with_package(
            normalize_path(path.as_ref()),
            ProjectFlavor::Standalone,
            Package::new(name, version),
        ))
    }

    fn with_package(path: PathBuf, flavor: ProjectFlavor, package: Package) -> Self {
        Self {
            path,
            flavor,
            package: Arc::new(package),
            info: RwLock::new(ProjectInfo::default()),
            binaries: RwLock::new(Vec::new()),
            load_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }

    pub fn flavor(&self) -> ProjectFlavor {
        self.flavor
    }

    pub fn package(&self) -> &Arc<Package> {
        &self.package
    }

    pub fn name(&self) -> String {
        self.package.name()
    }

    pub fn info(&self) -> ProjectInfo {
        self.info.read().clone()
    }

    pub fn update_info(&self, update: impl FnOnce(&mut ProjectInfo)) {
        update(&mut self.info.write());
    }

    /// Binaries a standalone package adopted from the dependency that loaded it.
    pub fn binaries(&self) -> Vec<PathBuf> {
        self.binaries.read().clone()
    }

    pub fn add_binaries(&self, binaries: impl IntoIterator<Item = PathBuf>) {
        let mut current = self.binaries.write();
        for binary in binaries {
            if !current.contains(&binary) {
                current.push(binary);
            }
        }
    }
}

/// Canonical path when the file exists, otherwise an absolute path.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
