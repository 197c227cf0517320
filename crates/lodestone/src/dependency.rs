use crate::package::Package;
use crate::version::{PackageVersion, VersionRange};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Project,
    Package,
}

impl DependencyKind {
    /// Classifies a lock artifact `type` tag; anything but `project` is a package.
    pub fn from_tag(tag: &str) -> Self {
        if tag.eq_ignore_ascii_case("project") {
            DependencyKind::Project
        } else {
            DependencyKind::Package
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyKind::Project => f.write_str("project"),
            DependencyKind::Package => f.write_str("package"),
        }
    }
}

/// A resolved dependency: exact version, kind and the binaries it contributes.
///
/// The resolved package is held weakly; packages are owned by the session.
#[derive(Debug)]
pub struct Dependency {
    pub name: String,
    pub version: PackageVersion,
    pub kind: DependencyKind,
    /// Project file of a project dependency, relative to the referencing project.
    pub project_path: Option<PathBuf>,
    pub binaries: Vec<PathBuf>,
    package: RwLock<Option<Weak<Package>>>,
}

impl Dependency {
    pub fn new(name: impl Into<String>, version: PackageVersion, kind: DependencyKind) -> Self {
        Self {
            name: name.into(),
            version,
            kind,
            project_path: None,
            binaries: Vec::new(),
            package: RwLock::new(None),
        }
    }

    pub fn with_project_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_path = Some(path.into());
        self
    }

    /// The loaded package backing this dependency, if it is still alive.
    pub fn package(&self) -> Option<Arc<Package>> {
        self.package.read().as_ref().and_then(Weak::upgrade)
    }

    pub fn set_package(&self, package: &Arc<Package>) {
        *self.package.write() = Some(Arc::downgrade(package));
    }

    pub fn is_resolved(&self) -> bool {
        self.package().is_some()
    }
}

/// A declared, unresolved dependency. `version: None` accepts any version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyRange {
    pub name: String,
    pub version: Option<VersionRange>,
    pub kind: DependencyKind,
    pub project_path: Option<PathBuf>,
}

impl DependencyRange {
    pub fn package(name: impl Into<String>, version: VersionRange) -> Self {
        Self {
            name: name.into(),
            version: Some(version),
            kind: DependencyKind::Package,
            project_path: None,
        }
    }

    pub fn project(name: impl Into<String>, project_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            version: None,
            kind: DependencyKind::Project,
            project_path: Some(project_path.into()),
        }
    }

    pub fn min_version(&self) -> Option<&PackageVersion> {
        self.version.as_ref().and_then(VersionRange::min_version)
    }
}

impl fmt::Display for DependencyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} {}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

/// A package reference as written in a project definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageReference {
    pub name: String,
    pub version: VersionRange,
}

impl PackageReference {
    pub fn new(name: impl Into<String>, version: VersionRange) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    pub fn to_range(&self) -> DependencyRange {
        DependencyRange::package(self.name.clone(), self.version.clone())
    }
}
