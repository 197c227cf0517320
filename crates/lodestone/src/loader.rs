//! The dependency pre-load pass: upgrade planning, restore, graph rebuild and
//! recursive loading of every flattened dependency.

use crate::dependency::{Dependency, DependencyKind, PackageReference};
use crate::error::{LoadError, LoadOutcome};
use crate::file_lock::FileLock;
use crate::package::{normalize_path, PackageState, PlatformType, Project, ProjectFlavor, ProjectType};
use crate::project_system::{
    is_project_extension, restore_lock_path, EvaluationOptions, ProjectEvaluation,
    ITEM_PACKAGE_REFERENCE, ITEM_PROJECT_REFERENCE, METADATA_VERSION, PROPERTY_ANDROID_APPLICATION,
    PROPERTY_NAME, PROPERTY_OUTPUT_TYPE, PROPERTY_PLATFORM, PROPERTY_TARGET_PATH, PROPERTY_VERSION,
};
use crate::session::{LoadContext, LoadParameters, PackageSession};
use crate::upgrade::{request_approval, PendingUpgrade, UpgradeHookContext, UpgradePlanner};
use crate::version::{PackageVersion, VersionRange};
use eyre::{eyre, Result};
use futures_util::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

impl PackageSession {
    /// Brings `project` to `DependenciesReady`.
    ///
    /// Idempotent: a package already at `DependenciesReady` or later is left
    /// alone. Concurrent callers for the same project wait for the first
    /// one. Recursion into a project already being processed by this pass
    /// returns `Skipped`.
    pub fn ensure_loaded<'a, 'p: 'a>(
        &'a self,
        project: Arc<Project>,
        context: &'a mut LoadContext<'p>,
    ) -> BoxFuture<'a, Result<LoadOutcome, LoadError>> {
        async move {
            if project.package().state() >= PackageState::DependenciesReady {
                return Ok(LoadOutcome::AlreadyReady);
            }
            let key = project.path().to_path_buf();
            if !context.visiting.insert(key.clone()) {
                warn!(
                    "load: {} references itself through its dependencies, skipping",
                    project.path().display()
                );
                return Ok(LoadOutcome::Skipped);
            }
            let result = self.load_dependencies(&project, context).await;
            context.visiting.remove(&key);
            result
        }
        .boxed()
    }

    async fn load_dependencies(
        &self,
        project: &Arc<Project>,
        context: &mut LoadContext<'_>,
    ) -> Result<LoadOutcome, LoadError> {
        let _guard = project.load_lock.lock().await;
        let package = project.package().clone();
        if package.state() >= PackageState::DependenciesReady {
            return Ok(LoadOutcome::AlreadyReady);
        }
        info!("load: processing dependencies of {}", project.name());

        let mut pending = Vec::new();
        let mut references = Vec::new();
        if project.flavor() == ProjectFlavor::Solution {
            match self.evaluate(project, context.parameters) {
                Ok(evaluation) => {
                    apply_evaluation(project, &evaluation);
                    references = package_references(project, &evaluation);
                    for referenced_path in project_references(project, &evaluation) {
                        let Some(referenced) = self.find_project(&referenced_path) else {
                            debug!(
                                "load: {} is not part of the session, skipping",
                                referenced_path.display()
                            );
                            continue;
                        };
                        if let Err(err) = self.ensure_loaded(referenced.clone(), context).await {
                            error!(
                                "load: unexpected error while loading project [{}]: {err}",
                                referenced.path().display()
                            );
                            continue;
                        }
                        let added = UpgradePlanner::propagate(&self.pending_upgrades(&referenced), &mut pending);
                        if added > 0 {
                            debug!(
                                "upgrade: {} inherits {added} upgrades from {}",
                                project.name(),
                                referenced.name()
                            );
                        }
                    }
                }
                Err(err) => {
                    let err = LoadError::ProjectLoad {
                        path: project.path().to_path_buf(),
                        message: format!("{err:#}"),
                    };
                    error!("load: {err}");
                }
            }
        }

        let pending = UpgradePlanner::new(&self.upgraders).plan(project, &references, pending)?;
        self.record_pending_upgrades(project, pending.clone());

        if !pending.is_empty() {
            let decision = request_approval(
                &mut context.policy,
                context.parameters.upgrade_prompt.as_ref(),
                &package,
                &pending,
            );
            if !decision.should_upgrade() {
                error!(
                    "upgrade: necessary package migration for [{}] has not been allowed",
                    project.name()
                );
                return Ok(LoadOutcome::UpgradeDeclined);
            }
            self.apply_upgrades(project, &pending, context.parameters)?;
        }

        if context.parameters.auto_restore && project.flavor() == ProjectFlavor::Solution {
            if let Err(err) = self.restore_locked(project).await {
                error!("restore: unable to restore {}: {err:#}", project.path().display());
            }
        }

        self.recheck_platform(project, context.parameters);
        self.update_dependencies(project, true, true);

        let mut failed = false;
        for dependency in package.flattened_dependencies() {
            if !self.load_dependency(project, &dependency, context).await {
                failed = true;
            }
        }

        if failed {
            warn!(
                "load: {} stays below dependencies-ready, some dependencies failed to load",
                project.name()
            );
            return Ok(LoadOutcome::Incomplete);
        }
        package.advance_state(PackageState::DependenciesReady);
        info!("load: {} {} is dependencies-ready", package.name(), package.version());
        Ok(LoadOutcome::Ready)
    }

    /// The upgrades `project` would need, including those inherited from
    /// referenced projects already in the session. No file or package state
    /// is touched; unlike a load pass, failures of referenced projects are
    /// returned.
    pub fn plan_upgrades(
        &self,
        project: &Project,
        parameters: &LoadParameters,
    ) -> Result<Vec<PendingUpgrade>, LoadError> {
        let mut visiting = HashSet::new();
        self.plan_upgrades_in(project, parameters, &mut visiting)
    }

    fn plan_upgrades_in(
        &self,
        project: &Project,
        parameters: &LoadParameters,
        visiting: &mut HashSet<PathBuf>,
    ) -> Result<Vec<PendingUpgrade>, LoadError> {
        if project.flavor() != ProjectFlavor::Solution || !visiting.insert(project.path().to_path_buf()) {
            return Ok(Vec::new());
        }
        let evaluation = self
            .evaluate(project, parameters)
            .map_err(|err| LoadError::ProjectLoad {
                path: project.path().to_path_buf(),
                message: format!("{err:#}"),
            })?;

        let mut pending = Vec::new();
        for referenced_path in project_references(project, &evaluation) {
            let Some(referenced) = self.find_project(&referenced_path) else {
                continue;
            };
            let inherited = self.plan_upgrades_in(&referenced, parameters, visiting)?;
            UpgradePlanner::propagate(&inherited, &mut pending);
        }
        UpgradePlanner::new(&self.upgraders).plan(project, &package_references(project, &evaluation), pending)
    }

    fn evaluate(&self, project: &Project, parameters: &LoadParameters) -> Result<ProjectEvaluation> {
        let options = EvaluationOptions {
            configuration: parameters.build_configuration.clone(),
            properties: parameters.extra_properties.clone(),
        };
        self.build.evaluate_project(project.path(), &options)
    }

    /// Rewrites each pending reference and runs its hook. A hook returning
    /// false stops the pass.
    fn apply_upgrades(
        &self,
        project: &Arc<Project>,
        pending: &[PendingUpgrade],
        parameters: &LoadParameters,
    ) -> Result<(), LoadError> {
        for upgrade in pending {
            let descriptor = upgrade.descriptor();
            if let Some(target) = descriptor.target_version() {
                match self.build.set_package_reference_version(
                    project.path(),
                    &upgrade.dependency.name,
                    &target.to_string(),
                ) {
                    Ok(true) => info!(
                        "upgrade: {} now references {} {target}",
                        project.name(),
                        upgrade.dependency.name
                    ),
                    Ok(false) => {}
                    Err(err) => warn!(
                        "upgrade: unable to rewrite {} in {}: {err:#}",
                        upgrade.dependency.name,
                        project.path().display()
                    ),
                }
            }

            let hook_context = UpgradeHookContext {
                parameters,
                session: self,
                package: project.package(),
                dependency: &upgrade.dependency,
                dependency_package: upgrade.dependency_package.as_ref(),
            };
            if !upgrade.upgrader.upgrade_before_assemblies_loaded(&hook_context) {
                let err = LoadError::UpgradeHookFailed {
                    package: project.name(),
                    dependency: upgrade.dependency.name.clone(),
                    from: upgrade
                        .dependency
                        .version
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "*".to_string()),
                    to: descriptor.target_text(),
                };
                error!("upgrade: {err}");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Restores under the project's restore lock so concurrent processes do
    /// not restore the same project at once.
    async fn restore_locked(&self, project: &Project) -> Result<()> {
        let lock_path = restore_lock_path(project.path());
        let lock = tokio::task::spawn_blocking(move || FileLock::wait(&lock_path))
            .await
            .map_err(|err| eyre!("restore lock task failed: {err}"))??;
        debug!("restore: holding {}", lock.path().display());
        let result = self.build.restore(project.path()).await;
        drop(lock);
        result
    }

    /// Executables still on the shared platform get their platform from a
    /// fresh evaluation, since restore may have changed the project.
    fn recheck_platform(&self, project: &Project, parameters: &LoadParameters) {
        if project.flavor() != ProjectFlavor::Solution {
            return;
        }
        let info = project.info();
        if info.project_type != ProjectType::Executable || info.platform != PlatformType::Shared {
            return;
        }
        match self.evaluate(project, parameters) {
            Ok(evaluation) => {
                let platform = platform_of(&evaluation);
                project.update_info(|info| info.platform = platform);
            }
            Err(err) => error!(
                "load: unable to re-evaluate the platform of {}: {err:#}",
                project.path().display()
            ),
        }
    }

    /// Registers the dependency's binaries and makes sure its package is
    /// loaded. Returns false on a fatal failure of the dependency.
    async fn load_dependency(
        &self,
        project: &Project,
        dependency: &Dependency,
        context: &mut LoadContext<'_>,
    ) -> bool {
        for binary in &dependency.binaries {
            self.binaries.register_dependency(binary.clone());
        }

        if dependency.is_resolved() {
            return true;
        }
        if let Some(loaded) = self.find_package(&dependency.name, &dependency.version, dependency.kind) {
            dependency.set_package(&loaded);
            return true;
        }

        let Some(file) = self.dependency_file(project, dependency, context.parameters) else {
            debug!(
                "load: no definition found for {} {}, leaving it unresolved",
                dependency.name, dependency.version
            );
            return true;
        };

        let loaded = match dependency.kind {
            DependencyKind::Project => Project::solution(&file),
            DependencyKind::Package => {
                Project::standalone(&file, dependency.name.clone(), dependency.version.clone())
            }
        };
        let loaded = self.add_project(loaded);

        let ok = match self.ensure_loaded(loaded.clone(), context).await {
            Ok(LoadOutcome::UpgradeDeclined) => false,
            Ok(_) => true,
            Err(err) => {
                error!(
                    "load: unable to load dependency {} {} from {}: {err}",
                    dependency.name,
                    dependency.version,
                    file.display()
                );
                false
            }
        };

        let package = loaded.package();
        package.set_name(dependency.name.clone());
        package.set_version(dependency.version.clone());
        if loaded.flavor() == ProjectFlavor::Standalone {
            loaded.add_binaries(dependency.binaries.iter().cloned());
        }
        dependency.set_package(package);
        ok
    }

    fn dependency_file(
        &self,
        project: &Project,
        dependency: &Dependency,
        parameters: &LoadParameters,
    ) -> Option<PathBuf> {
        let file = match dependency.kind {
            DependencyKind::Project => {
                let relative = dependency.project_path.as_ref()?;
                if !is_project_extension(relative) {
                    debug!(
                        "load: {} is not a supported project file",
                        relative.display()
                    );
                    return None;
                }
                normalize_path(&project.directory().join(relative))
            }
            DependencyKind::Package => self.store.find_package_file(
                &dependency.name,
                &VersionRange::exact(dependency.version.clone()),
                &parameters.package_constraints,
            )?,
        };
        file.is_file().then_some(file)
    }
}

fn apply_evaluation(project: &Project, evaluation: &ProjectEvaluation) {
    let package = project.package();
    if let Some(name) = evaluation.property(PROPERTY_NAME) {
        package.set_name(name);
    }
    if let Some(version) = evaluation.property(PROPERTY_VERSION) {
        match PackageVersion::parse(version) {
            Ok(version) => package.set_version(version),
            Err(err) => warn!(
                "load: ignoring version of {}: {err}",
                project.path().display()
            ),
        }
    }

    let target_path = evaluation
        .property(PROPERTY_TARGET_PATH)
        .map(|target| project.directory().join(target));
    let project_type = ProjectType::from_properties(
        evaluation.property(PROPERTY_OUTPUT_TYPE),
        evaluation.property(PROPERTY_ANDROID_APPLICATION),
    );
    project.update_info(|info| {
        info.target_path = target_path;
        info.project_type = project_type;
        if project_type == ProjectType::Executable && info.platform == PlatformType::Shared {
            info.platform = platform_of(evaluation);
        }
    });
}

fn platform_of(evaluation: &ProjectEvaluation) -> PlatformType {
    evaluation
        .property(PROPERTY_PLATFORM)
        .and_then(PlatformType::from_property)
        .unwrap_or_default()
}

/// Package references with a parseable version. Others cannot be upgraded
/// and are skipped.
fn package_references(project: &Project, evaluation: &ProjectEvaluation) -> Vec<PackageReference> {
    let mut references = Vec::new();
    for item in evaluation.items(ITEM_PACKAGE_REFERENCE) {
        let Some(version) = item.metadata(METADATA_VERSION) else {
            continue;
        };
        match VersionRange::parse(version) {
            Ok(range) => references.push(PackageReference::new(item.include.clone(), range)),
            Err(err) => warn!(
                "load: ignoring reference {} of {}: {err}",
                item.include,
                project.path().display()
            ),
        }
    }
    references
}

fn project_references(project: &Project, evaluation: &ProjectEvaluation) -> Vec<PathBuf> {
    evaluation
        .items(ITEM_PROJECT_REFERENCE)
        .map(|item| normalize_path(&project.directory().join(&item.include)))
        .filter(|path| path.is_file())
        .collect()
}
