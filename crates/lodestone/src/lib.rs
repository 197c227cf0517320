//! Lodestone loads a session of projects and packages: it turns restore lock
//! artifacts into dependency graphs, stages package upgrades before anything
//! is loaded, and registers the binaries dependencies contribute.

pub mod binaries;
pub mod commands;
pub mod config;
pub mod dependency;
pub mod error;
pub mod file_lock;
pub mod graph;
pub mod loader;
pub mod lock;
pub mod package;
pub mod project_system;
pub mod session;
pub mod store;
pub mod upgrade;
pub mod utils;
pub mod version;

pub use binaries::{BinaryRegistry, LoadedBinary, ResolveContext};
pub use config::LodestoneConfig;
pub use dependency::{Dependency, DependencyKind, DependencyRange, PackageReference};
pub use error::{LoadError, LoadOutcome};
pub use file_lock::FileLock;
pub use graph::DependencyGraph;
pub use lock::{LockArtifact, TargetSelection};
pub use package::{Package, PackageState, PlatformType, Project, ProjectFlavor, ProjectType};
pub use project_system::{BuildSystem, TomlBuildSystem};
pub use session::{LoadContext, LoadParameters, PackageSession};
pub use store::{FolderPackageStore, PackageConstraints, PackageStore};
pub use upgrade::{
    PackageUpgrader, PendingUpgrade, UpgradeDecision, UpgradeHookContext, UpgradePolicy,
    UpgradePrompt, UpgraderDescriptor, UpgraderRegistry,
};
pub use version::{PackageVersion, VersionError, VersionRange};
