//! Package upgraders, upgrade planning and the approval gate.

use crate::dependency::{DependencyRange, PackageReference};
use crate::error::LoadError;
use crate::package::{Package, Project};
use crate::session::{LoadParameters, PackageSession};
use crate::version::{PackageVersion, VersionRange};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// What an upgrader governs: the package, the oldest version it can migrate
/// from and the range it migrates to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgraderDescriptor {
    pub package_name: String,
    pub minimum_version: PackageVersion,
    pub updated_version_range: VersionRange,
}

impl UpgraderDescriptor {
    pub fn new(
        package_name: impl Into<String>,
        minimum_version: PackageVersion,
        updated_version_range: VersionRange,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            minimum_version,
            updated_version_range,
        }
    }

    /// The version references are rewritten to.
    pub fn target_version(&self) -> Option<&PackageVersion> {
        self.updated_version_range.min_version()
    }

    pub(crate) fn target_text(&self) -> String {
        self.target_version()
            .map(ToString::to_string)
            .unwrap_or_else(|| self.updated_version_range.to_string())
    }
}

/// Everything an upgrader hook gets to look at.
pub struct UpgradeHookContext<'a> {
    pub parameters: &'a LoadParameters,
    pub session: &'a PackageSession,
    pub package: &'a Arc<Package>,
    pub dependency: &'a DependencyRange,
    pub dependency_package: Option<&'a Arc<Package>>,
}

pub trait PackageUpgrader: Send + Sync {
    fn descriptor(&self) -> &UpgraderDescriptor;

    /// Runs after the package reference was rewritten and before binaries are
    /// loaded. Returning false aborts the project's load.
    fn upgrade_before_assemblies_loaded(&self, context: &UpgradeHookContext<'_>) -> bool;
}

/// Upgrader declared in configuration; it only rewrites the reference.
#[derive(Clone, Debug)]
pub struct DeclarativeUpgrader {
    descriptor: UpgraderDescriptor,
    description: Option<String>,
}

impl DeclarativeUpgrader {
    pub fn new(descriptor: UpgraderDescriptor, description: Option<String>) -> Self {
        Self {
            descriptor,
            description,
        }
    }
}

impl PackageUpgrader for DeclarativeUpgrader {
    fn descriptor(&self) -> &UpgraderDescriptor {
        &self.descriptor
    }

    fn upgrade_before_assemblies_loaded(&self, context: &UpgradeHookContext<'_>) -> bool {
        info!(
            "upgrade: {} now references {} {}{}",
            context.package.name(),
            self.descriptor.package_name,
            self.descriptor.target_text(),
            self.description
                .as_deref()
                .map(|description| format!(" ({description})"))
                .unwrap_or_default()
        );
        true
    }
}

/// Upgraders by package name. Populated at startup, read during load passes.
#[derive(Default)]
pub struct UpgraderRegistry {
    upgraders: RwLock<HashMap<String, Arc<dyn PackageUpgrader>>>,
}

impl UpgraderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an upgrader, replacing any previous one for the same package.
    pub fn register(&self, upgrader: Arc<dyn PackageUpgrader>) {
        let key = upgrader.descriptor().package_name.to_lowercase();
        self.upgraders.write().insert(key, upgrader);
    }

    pub fn lookup(&self, package_name: &str) -> Option<Arc<dyn PackageUpgrader>> {
        self.upgraders
            .read()
            .get(&package_name.to_lowercase())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.upgraders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.upgraders.read().is_empty()
    }
}

impl fmt::Debug for UpgraderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.upgraders.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("UpgraderRegistry")
            .field("packages", &names)
            .finish()
    }
}

/// An upgrade one project needs. Copies are independent: each one tracks the
/// reference of the project it was planned or propagated into.
#[derive(Clone)]
pub struct PendingUpgrade {
    pub upgrader: Arc<dyn PackageUpgrader>,
    pub dependency: DependencyRange,
    pub dependency_package: Option<Arc<Package>>,
}

impl PendingUpgrade {
    pub fn new(
        upgrader: Arc<dyn PackageUpgrader>,
        dependency: DependencyRange,
        dependency_package: Option<Arc<Package>>,
    ) -> Self {
        Self {
            upgrader,
            dependency,
            dependency_package,
        }
    }

    pub fn descriptor(&self) -> &UpgraderDescriptor {
        self.upgrader.descriptor()
    }

    pub fn is_for(&self, upgrader: &Arc<dyn PackageUpgrader>) -> bool {
        same_upgrader(&self.upgrader, upgrader)
    }
}

impl fmt::Debug for PendingUpgrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingUpgrade")
            .field("upgrader", self.descriptor())
            .field("dependency", &self.dependency)
            .field(
                "dependency_package",
                &self.dependency_package.as_ref().map(|package| package.name()),
            )
            .finish()
    }
}

fn same_upgrader(left: &Arc<dyn PackageUpgrader>, right: &Arc<dyn PackageUpgrader>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(left) as *const (),
        Arc::as_ptr(right) as *const (),
    )
}

pub struct UpgradePlanner<'a> {
    registry: &'a UpgraderRegistry,
}

impl<'a> UpgradePlanner<'a> {
    pub fn new(registry: &'a UpgraderRegistry) -> Self {
        Self { registry }
    }

    /// Extends `pending` with the upgrades `references` require.
    ///
    /// References without an upgrader, references whose upgrader is already
    /// pending, and references already at or past the upgrader's target are
    /// skipped. A reference below the upgrader's minimum version fails the
    /// whole plan.
    pub fn plan(
        &self,
        project: &Project,
        references: &[PackageReference],
        mut pending: Vec<PendingUpgrade>,
    ) -> Result<Vec<PendingUpgrade>, LoadError> {
        for reference in references {
            let Some(upgrader) = self.registry.lookup(&reference.name) else {
                continue;
            };
            if pending.iter().any(|upgrade| upgrade.is_for(&upgrader)) {
                continue;
            }

            let descriptor = upgrader.descriptor();
            let declared = reference.version.min_version();
            if let (Some(declared), Some(target)) = (declared, descriptor.target_version()) {
                if declared >= target {
                    debug!(
                        "upgrade: {} {} is already current",
                        reference.name, reference.version
                    );
                    continue;
                }
            }
            if let Some(declared) = declared {
                if *declared < descriptor.minimum_version {
                    return Err(LoadError::UnsupportedUpgrade {
                        project: project.name(),
                        dependency: reference.name.clone(),
                        from: reference.version.clone(),
                        to: descriptor.target_text(),
                        minimum: descriptor.minimum_version.clone(),
                    });
                }
            }

            info!(
                "upgrade: upgrading project [{}] to use [{}] from version [{}] to [{}] will be required",
                project.name(),
                reference.name,
                reference.version,
                descriptor.target_text()
            );
            pending.push(PendingUpgrade::new(upgrader.clone(), reference.to_range(), None));
        }
        Ok(pending)
    }

    /// Copies the upgrades of a referenced project whose upgrader is not
    /// pending yet. Returns how many were added.
    pub fn propagate(from: &[PendingUpgrade], into: &mut Vec<PendingUpgrade>) -> usize {
        let mut added = 0;
        for upgrade in from {
            if into.iter().any(|existing| existing.is_for(&upgrade.upgrader)) {
                continue;
            }
            into.push(upgrade.clone());
            added += 1;
        }
        added
    }
}

/// Standing answer to upgrade requests, pinned by `UpgradeAll` or
/// `DoNotUpgradeAny` decisions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpgradePolicy {
    #[default]
    AskEveryTime,
    AlwaysUpgrade,
    NeverUpgrade,
}

impl FromStr for UpgradePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ask" | "ask-every-time" => Ok(UpgradePolicy::AskEveryTime),
            "always" | "always-upgrade" => Ok(UpgradePolicy::AlwaysUpgrade),
            "never" | "never-upgrade" => Ok(UpgradePolicy::NeverUpgrade),
            other => Err(format!(
                "unknown upgrade policy `{other}` (expected ask, always or never)"
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpgradeDecision {
    Upgrade,
    UpgradeAll,
    DoNotUpgrade,
    DoNotUpgradeAny,
}

impl UpgradeDecision {
    pub fn should_upgrade(self) -> bool {
        matches!(self, UpgradeDecision::Upgrade | UpgradeDecision::UpgradeAll)
    }
}

/// Asked once per project that needs upgrades, unless the policy is pinned.
pub type UpgradePrompt = Arc<dyn Fn(&Package, &[PendingUpgrade]) -> UpgradeDecision + Send + Sync>;

/// Decides whether `package` may apply `pending`. Without a prompt the
/// answer is `Upgrade`. `UpgradeAll` and `DoNotUpgradeAny` pin `policy`.
pub fn request_approval(
    policy: &mut UpgradePolicy,
    prompt: Option<&UpgradePrompt>,
    package: &Package,
    pending: &[PendingUpgrade],
) -> UpgradeDecision {
    match *policy {
        UpgradePolicy::AlwaysUpgrade => UpgradeDecision::Upgrade,
        UpgradePolicy::NeverUpgrade => UpgradeDecision::DoNotUpgrade,
        UpgradePolicy::AskEveryTime => {
            let Some(prompt) = prompt else {
                return UpgradeDecision::Upgrade;
            };
            let decision = prompt(package, pending);
            match decision {
                UpgradeDecision::UpgradeAll => *policy = UpgradePolicy::AlwaysUpgrade,
                UpgradeDecision::DoNotUpgradeAny => *policy = UpgradePolicy::NeverUpgrade,
                UpgradeDecision::Upgrade | UpgradeDecision::DoNotUpgrade => {}
            }
            decision
        }
    }
}
