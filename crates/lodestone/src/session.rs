//! The package session: projects, their packages and the collaborators used
//! to load them.

use crate::binaries::BinaryRegistry;
use crate::dependency::DependencyKind;
use crate::error::{LoadError, LoadOutcome};
use crate::graph::DependencyGraph;
use crate::lock::TargetSelection;
use crate::package::{normalize_path, Package, Project};
use crate::project_system::BuildSystem;
use crate::store::{PackageConstraints, PackageStore};
use crate::upgrade::{PendingUpgrade, UpgradePolicy, UpgradePrompt, UpgraderRegistry};
use crate::version::PackageVersion;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Options for a load pass.
#[derive(Clone)]
pub struct LoadParameters {
    /// Named configuration used when evaluating projects.
    pub build_configuration: Option<String>,
    pub extra_properties: BTreeMap<String, String>,
    /// Run package restore before rebuilding dependencies.
    pub auto_restore: bool,
    pub upgrade_policy: UpgradePolicy,
    pub upgrade_prompt: Option<UpgradePrompt>,
    pub package_constraints: PackageConstraints,
}

impl Default for LoadParameters {
    fn default() -> Self {
        Self {
            build_configuration: None,
            extra_properties: BTreeMap::new(),
            auto_restore: true,
            upgrade_policy: UpgradePolicy::AskEveryTime,
            upgrade_prompt: None,
            package_constraints: PackageConstraints::new(),
        }
    }
}

impl fmt::Debug for LoadParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadParameters")
            .field("build_configuration", &self.build_configuration)
            .field("extra_properties", &self.extra_properties)
            .field("auto_restore", &self.auto_restore)
            .field("upgrade_policy", &self.upgrade_policy)
            .field("upgrade_prompt", &self.upgrade_prompt.is_some())
            .field("package_constraints", &self.package_constraints)
            .finish()
    }
}

/// State threaded through one load pass and all of its recursive calls.
pub struct LoadContext<'p> {
    pub parameters: &'p LoadParameters,
    /// Starts from the session's pinned policy; approval decisions may pin it.
    pub policy: UpgradePolicy,
    pub(crate) visiting: HashSet<PathBuf>,
}

impl<'p> LoadContext<'p> {
    pub fn new(parameters: &'p LoadParameters) -> Self {
        Self {
            parameters,
            policy: parameters.upgrade_policy,
            visiting: HashSet::new(),
        }
    }
}

pub struct PackageSession {
    pub(crate) build: Arc<dyn BuildSystem>,
    pub(crate) store: Arc<dyn PackageStore>,
    pub(crate) upgraders: Arc<UpgraderRegistry>,
    pub(crate) binaries: Arc<BinaryRegistry>,
    target_selection: TargetSelection,
    projects: Mutex<Vec<Arc<Project>>>,
    pending_upgrades: Mutex<HashMap<PathBuf, Vec<PendingUpgrade>>>,
    pinned_policy: Mutex<Option<UpgradePolicy>>,
}

impl PackageSession {
    pub fn new(
        build: Arc<dyn BuildSystem>,
        store: Arc<dyn PackageStore>,
        upgraders: Arc<UpgraderRegistry>,
    ) -> Self {
        Self {
            build,
            store,
            upgraders,
            binaries: Arc::new(BinaryRegistry::new()),
            target_selection: TargetSelection::default(),
            projects: Mutex::new(Vec::new()),
            pending_upgrades: Mutex::new(HashMap::new()),
            pinned_policy: Mutex::new(None),
        }
    }

    pub fn with_binaries(mut self, binaries: Arc<BinaryRegistry>) -> Self {
        self.binaries = binaries;
        self
    }

    pub fn with_target_selection(mut self, selection: TargetSelection) -> Self {
        self.target_selection = selection;
        self
    }

    pub fn binaries(&self) -> &Arc<BinaryRegistry> {
        &self.binaries
    }

    pub fn upgraders(&self) -> &Arc<UpgraderRegistry> {
        &self.upgraders
    }

    pub fn target_selection(&self) -> &TargetSelection {
        &self.target_selection
    }

    /// Adds a project unless one with the same path is already part of the
    /// session, in which case that one is returned.
    pub fn add_project(&self, project: Arc<Project>) -> Arc<Project> {
        let mut projects = self.projects.lock();
        if let Some(existing) = projects.iter().find(|known| known.path() == project.path()) {
            return existing.clone();
        }
        projects.push(project.clone());
        project
    }

    /// Adds the project file at `path` as a solution project.
    pub fn open_project(&self, path: &Path) -> Arc<Project> {
        self.add_project(Project::solution(path))
    }

    pub fn find_project(&self, path: &Path) -> Option<Arc<Project>> {
        let path = normalize_path(path);
        self.projects
            .lock()
            .iter()
            .find(|project| project.path() == path)
            .cloned()
    }

    pub fn projects(&self) -> Vec<Arc<Project>> {
        self.projects.lock().clone()
    }

    /// A loaded package matching (name, version, kind).
    pub fn find_package(
        &self,
        name: &str,
        version: &PackageVersion,
        kind: DependencyKind,
    ) -> Option<Arc<Package>> {
        self.projects
            .lock()
            .iter()
            .filter(|project| project.flavor().dependency_kind() == kind)
            .map(|project| project.package())
            .find(|package| package.matches(name, version))
            .cloned()
    }

    /// Upgrades recorded for `project` by its last load pass.
    pub fn pending_upgrades(&self, project: &Project) -> Vec<PendingUpgrade> {
        self.pending_upgrades
            .lock()
            .get(project.path())
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn record_pending_upgrades(&self, project: &Project, pending: Vec<PendingUpgrade>) {
        self.pending_upgrades
            .lock()
            .insert(project.path().to_path_buf(), pending);
    }

    /// Recomputes the project's direct and/or flattened dependencies from its
    /// lock artifact. The selected lists are replaced, never merged; an
    /// unreadable artifact counts as missing.
    pub fn update_dependencies(&self, project: &Project, want_direct: bool, want_flattened: bool) {
        let artifact = match self.build.read_lock_artifact(project.path()) {
            Ok(artifact) => artifact,
            Err(err) => {
                warn!(
                    "deps: ignoring lock artifact of {}: {err:#}",
                    project.path().display()
                );
                None
            }
        };
        if artifact.is_none() {
            debug!("deps: no lock artifact for {}", project.path().display());
        }

        let graph = DependencyGraph::from_artifact(
            artifact.as_ref(),
            &self.target_selection,
            want_direct,
            want_flattened,
        );
        let package = project.package();
        if want_flattened {
            let flattened: Vec<_> = graph.flattened.into_iter().map(Arc::new).collect();
            for dependency in &flattened {
                if let Some(loaded) = self.find_package(&dependency.name, &dependency.version, dependency.kind) {
                    dependency.set_package(&loaded);
                }
            }
            debug!(
                "deps: {} has {} flattened dependencies",
                project.name(),
                flattened.len()
            );
            package.replace_flattened(flattened);
        }
        if want_direct {
            package.replace_direct(graph.direct);
        }
    }

    /// Loads one project file and everything it depends on.
    pub async fn load_project(
        &self,
        path: &Path,
        parameters: &LoadParameters,
    ) -> (Arc<Project>, Result<LoadOutcome, LoadError>) {
        let mut results = self.load_projects(&[path.to_path_buf()], parameters).await;
        results.remove(0)
    }

    /// Loads several project files with one shared upgrade policy. A failure
    /// of one project does not affect the others.
    pub async fn load_projects(
        &self,
        paths: &[PathBuf],
        parameters: &LoadParameters,
    ) -> Vec<(Arc<Project>, Result<LoadOutcome, LoadError>)> {
        let projects: Vec<_> = paths.iter().map(|path| self.open_project(path)).collect();

        // A policy pinned by an earlier answer applies unless the caller
        // asked for a fixed one.
        let mut context = LoadContext::new(parameters);
        if parameters.upgrade_policy == UpgradePolicy::AskEveryTime {
            if let Some(pinned) = *self.pinned_policy.lock() {
                context.policy = pinned;
            }
        }

        let mut results = Vec::with_capacity(projects.len());
        for project in projects {
            let outcome = self.ensure_loaded(project.clone(), &mut context).await;
            results.push((project, outcome));
        }

        if context.policy != parameters.upgrade_policy {
            *self.pinned_policy.lock() = Some(context.policy);
        }
        results
    }
}

impl fmt::Debug for PackageSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageSession")
            .field("projects", &self.projects.lock().len())
            .field("upgraders", &self.upgraders)
            .field("target_selection", &self.target_selection)
            .finish()
    }
}
