use crate::version::{PackageVersion, VersionRange};
use std::path::PathBuf;
use thiserror::Error;

/// Fatal outcomes of a load pass. Each one leaves the failing project below
/// `DependenciesReady` and is never retried.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(
        "upgrading project [{project}] to use [{dependency}] from version [{from}] to [{to}] \
         is not supported (supported only from version [{minimum}])"
    )]
    UnsupportedUpgrade {
        project: String,
        dependency: String,
        from: VersionRange,
        to: String,
        minimum: PackageVersion,
    },
    #[error(
        "error while upgrading package [{package}] for [{dependency}] from version [{from}] to [{to}]"
    )]
    UpgradeHookFailed {
        package: String,
        dependency: String,
        from: String,
        to: String,
    },
    #[error("unable to load project [{}]: {message}", path.display())]
    ProjectLoad { path: PathBuf, message: String },
}

/// How a load pass ended when it did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The package was already at `DependenciesReady` or later.
    AlreadyReady,
    /// Dependencies were resolved and the package advanced to `DependenciesReady`.
    Ready,
    /// The pass completed but at least one dependency failed to load.
    Incomplete,
    /// Required upgrades were declined by policy.
    UpgradeDeclined,
    /// The project is already being processed higher up the current pass.
    Skipped,
}

impl LoadOutcome {
    pub fn is_ready(self) -> bool {
        matches!(self, LoadOutcome::AlreadyReady | LoadOutcome::Ready)
    }
}
