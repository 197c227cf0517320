//! Prints the dependency graph recorded in a project's lock artifact.

use crate::commands::write_output;
use crate::config::LodestoneConfig;
use crate::lock::{LockArtifact, TargetSelection};
use crate::package::Package;
use crate::project_system::lock_artifact_path;
use clap::Args;
use eyre::{Result, bail};
use lodestone_content::{Codec, encode_value};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Args)]
pub struct DepsArgs {
    /// Project file whose lock artifact is read
    pub project: PathBuf,
    /// Target list to use: `first`, `last` or a target name
    #[arg(long)]
    pub target: Option<TargetSelection>,
    /// Output encoding
    #[arg(long, default_value = "text")]
    pub format: Codec,
    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Serializable view of a package's dependency lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencySnapshot {
    pub package: String,
    pub target: Option<String>,
    pub direct: Vec<DirectEntry>,
    pub flattened: Vec<FlattenedEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectEntry {
    pub name: String,
    pub kind: String,
    pub version: Option<String>,
    pub project_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedEntry {
    pub name: String,
    pub version: String,
    pub kind: String,
    pub project_path: Option<String>,
    pub binaries: Vec<String>,
}

impl DependencySnapshot {
    pub fn of(package: &Package, target: Option<String>) -> Self {
        let direct = package
            .direct_dependencies()
            .into_iter()
            .map(|dependency| DirectEntry {
                name: dependency.name.clone(),
                kind: dependency.kind.to_string(),
                version: dependency.version.as_ref().map(ToString::to_string),
                project_path: dependency
                    .project_path
                    .as_ref()
                    .map(|path| path.display().to_string()),
            })
            .collect();
        let flattened = package
            .flattened_dependencies()
            .iter()
            .map(|dependency| FlattenedEntry {
                name: dependency.name.clone(),
                version: dependency.version.to_string(),
                kind: dependency.kind.to_string(),
                project_path: dependency
                    .project_path
                    .as_ref()
                    .map(|path| path.display().to_string()),
                binaries: dependency
                    .binaries
                    .iter()
                    .map(|binary| binary.display().to_string())
                    .collect(),
            })
            .collect();
        Self {
            package: package.name(),
            target,
            direct,
            flattened,
        }
    }
}

pub async fn deps_command(args: DepsArgs, config: &LodestoneConfig) -> Result<()> {
    if !args.project.is_file() {
        bail!("project file {} does not exist", args.project.display());
    }

    let selection = args.target.unwrap_or_else(|| config.session.target.clone());
    let session = config.build_session().with_target_selection(selection.clone());
    let project = session.open_project(&args.project);
    session.update_dependencies(&project, true, true);

    let target = LockArtifact::read_from_path(&lock_artifact_path(project.path()))?
        .and_then(|artifact| selection.select(&artifact).map(|(name, _)| name.to_string()));
    let snapshot = DependencySnapshot::of(project.package(), target);
    info!(
        "deps: {} has {} direct and {} flattened dependencies",
        snapshot.package,
        snapshot.direct.len(),
        snapshot.flattened.len()
    );

    let bytes = encode_value(args.format.serializer().as_ref(), &snapshot)?;
    write_output(args.output.as_deref(), &bytes)
}
