mod common;

use common::{CountingUpgrader, reference_version, session_with, write_project};
use lodestone::{
    LoadContext, LoadError, LoadOutcome, LoadParameters, Package, PackageState, PendingUpgrade,
    UpgradeDecision, UpgradePolicy, UpgradePrompt,
};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const OUTDATED: &str = r#"
[project]
name = "X"

[package-references]
"PackageA" = "1.0"
"#;

#[tokio::test]
async fn outdated_reference_is_rewritten_and_the_hook_runs_once() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_project(dir.path(), "X", OUTDATED)?;
    let upgrader = CountingUpgrader::new("PackageA", "1.0", "2.0")?;
    let session = session_with(&[upgrader.clone()], Vec::new());
    let parameters = LoadParameters::default();

    let (project, outcome) = session.load_project(&path, &parameters).await;
    assert_eq!(outcome?, LoadOutcome::Ready);
    assert_eq!(reference_version(&path, "PackageA")?.as_deref(), Some("2.0"));
    assert_eq!(upgrader.calls(), 1);
    assert_eq!(session.pending_upgrades(&project).len(), 1);
    assert_eq!(project.package().state(), PackageState::DependenciesReady);

    let (_, again) = session.load_project(&path, &parameters).await;
    assert_eq!(again?, LoadOutcome::AlreadyReady);
    assert_eq!(upgrader.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn reference_below_the_minimum_fails_without_touching_the_file() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let content = "[package-references]\n\"PackageA\" = \"0.5\"\n";
    let path = write_project(dir.path(), "Y", content)?;
    let upgrader = CountingUpgrader::new("PackageA", "1.0", "2.0")?;
    let session = session_with(&[upgrader.clone()], Vec::new());

    let (project, outcome) = session.load_project(&path, &LoadParameters::default()).await;
    match outcome {
        Err(LoadError::UnsupportedUpgrade {
            project: name,
            dependency,
            minimum,
            ..
        }) => {
            assert_eq!(name, "Y");
            assert_eq!(dependency, "PackageA");
            assert_eq!(minimum.to_string(), "1.0");
        }
        other => eyre::bail!("expected an unsupported upgrade, got {other:?}"),
    }
    assert_eq!(std::fs::read_to_string(&path)?, content);
    assert_eq!(upgrader.calls(), 0);
    assert_eq!(project.package().state(), PackageState::Unloaded);
    Ok(())
}

#[tokio::test]
async fn current_references_need_no_upgrade() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let content = "[package-references]\n\"PackageA\" = \"[2.0,3.0)\"\n";
    let path = write_project(dir.path(), "Current", content)?;
    let upgrader = CountingUpgrader::new("PackageA", "1.0", "2.0")?;
    let session = session_with(&[upgrader.clone()], Vec::new());

    let (project, outcome) = session.load_project(&path, &LoadParameters::default()).await;
    assert_eq!(outcome?, LoadOutcome::Ready);
    assert!(session.pending_upgrades(&project).is_empty());
    assert_eq!(std::fs::read_to_string(&path)?, content);
    assert_eq!(upgrader.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn upgrades_propagate_from_referenced_projects() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let b = write_project(
        dir.path(),
        "B",
        "[package-references]\n\"PackageA\" = \"1.0\"\n",
    )?;
    let a = write_project(
        dir.path(),
        "A",
        r#"
[package-references]
"PackageA" = "1.2"

[project-references]
paths = ["../B/B.toml"]
"#,
    )?;
    let upgrader = CountingUpgrader::new("PackageA", "1.0", "2.0")?;
    let session = session_with(&[upgrader.clone()], Vec::new());

    let results = session
        .load_projects(&[a.clone(), b.clone()], &LoadParameters::default())
        .await;
    for (project, outcome) in &results {
        match outcome {
            Ok(outcome) => assert!(outcome.is_ready(), "{} ended as {outcome:?}", project.name()),
            Err(err) => eyre::bail!("{} failed: {err}", project.name()),
        }
    }

    let project_a = session
        .find_project(&a)
        .ok_or_else(|| eyre::eyre!("A should be in the session"))?;
    let pending = session.pending_upgrades(&project_a);
    assert_eq!(pending.len(), 1);
    // The copy inherited from B keeps B's reference.
    assert_eq!(
        pending[0].dependency.min_version().map(ToString::to_string).as_deref(),
        Some("1.0")
    );

    // One hook call per project.
    assert_eq!(upgrader.calls(), 2);
    assert_eq!(reference_version(&a, "PackageA")?.as_deref(), Some("2.0"));
    assert_eq!(reference_version(&b, "PackageA")?.as_deref(), Some("2.0"));
    Ok(())
}

#[tokio::test]
async fn upgrades_reach_projects_that_only_reference_the_outdated_project() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let b = write_project(
        dir.path(),
        "B",
        "[package-references]\n\"PackageA\" = \"1.0\"\n",
    )?;
    let a_content = "[project-references]\npaths = [\"../B/B.toml\"]\n";
    let a = write_project(dir.path(), "A", a_content)?;
    let upgrader = CountingUpgrader::new("PackageA", "1.0", "2.0")?;
    let session = session_with(&[upgrader.clone()], Vec::new());

    let results = session
        .load_projects(&[a.clone(), b.clone()], &LoadParameters::default())
        .await;
    for (project, outcome) in &results {
        match outcome {
            Ok(outcome) => assert!(outcome.is_ready(), "{} ended as {outcome:?}", project.name()),
            Err(err) => eyre::bail!("{} failed: {err}", project.name()),
        }
    }

    let project_a = session
        .find_project(&a)
        .ok_or_else(|| eyre::eyre!("A should be in the session"))?;
    let pending = session.pending_upgrades(&project_a);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].dependency.name, "PackageA");

    // B runs the hook for its own reference, A for the inherited one.
    assert_eq!(upgrader.calls(), 2);
    assert_eq!(reference_version(&b, "PackageA")?.as_deref(), Some("2.0"));
    // A has no reference of its own to rewrite.
    assert_eq!(std::fs::read_to_string(&a)?, a_content);
    assert_eq!(reference_version(&a, "PackageA")?, None);
    Ok(())
}

#[tokio::test]
async fn declined_upgrades_leave_the_project_unloaded() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_project(dir.path(), "X", OUTDATED)?;
    let upgrader = CountingUpgrader::new("PackageA", "1.0", "2.0")?;
    let session = session_with(&[upgrader.clone()], Vec::new());
    let parameters = LoadParameters {
        upgrade_policy: UpgradePolicy::NeverUpgrade,
        ..LoadParameters::default()
    };

    let (project, outcome) = session.load_project(&path, &parameters).await;
    assert_eq!(outcome?, LoadOutcome::UpgradeDeclined);
    assert_eq!(reference_version(&path, "PackageA")?.as_deref(), Some("1.0"));
    assert_eq!(upgrader.calls(), 0);
    assert_eq!(project.package().state(), PackageState::Unloaded);
    Ok(())
}

#[tokio::test]
async fn a_blanket_refusal_is_asked_only_once() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let first = write_project(dir.path(), "First", OUTDATED)?;
    let second = write_project(dir.path(), "Second", OUTDATED)?;
    let upgrader = CountingUpgrader::new("PackageA", "1.0", "2.0")?;
    let session = session_with(&[upgrader.clone()], Vec::new());

    let asked = Arc::new(AtomicUsize::new(0));
    let counter = asked.clone();
    let prompt: UpgradePrompt = Arc::new(move |_: &Package, _: &[PendingUpgrade]| {
        counter.fetch_add(1, Ordering::SeqCst);
        UpgradeDecision::DoNotUpgradeAny
    });
    let parameters = LoadParameters {
        upgrade_prompt: Some(prompt),
        ..LoadParameters::default()
    };

    let results = session.load_projects(&[first, second], &parameters).await;
    for (_, outcome) in &results {
        assert!(matches!(outcome, Ok(LoadOutcome::UpgradeDeclined)));
    }
    assert_eq!(asked.load(Ordering::SeqCst), 1);

    // The refusal stays pinned for later calls on the same session.
    let third = write_project(dir.path(), "Third", OUTDATED)?;
    let (_, outcome) = session.load_project(&third, &parameters).await;
    assert_eq!(outcome?, LoadOutcome::UpgradeDeclined);
    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert_eq!(upgrader.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn a_failing_hook_stops_the_load() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_project(dir.path(), "X", OUTDATED)?;
    let upgrader = CountingUpgrader::failing("PackageA", "1.0", "2.0")?;
    let session = session_with(&[upgrader.clone()], Vec::new());

    let (project, outcome) = session.load_project(&path, &LoadParameters::default()).await;
    let err = match outcome {
        Err(err @ LoadError::UpgradeHookFailed { .. }) => err,
        other => eyre::bail!("expected a hook failure, got {other:?}"),
    };
    assert_eq!(
        err.to_string(),
        "error while upgrading package [X] for [PackageA] from version [1.0] to [2.0]"
    );
    assert_eq!(upgrader.calls(), 1);
    assert_eq!(project.package().state(), PackageState::Unloaded);
    Ok(())
}

#[tokio::test]
async fn plans_are_computed_without_side_effects() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_project(dir.path(), "X", OUTDATED)?;
    let upgrader = CountingUpgrader::new("PackageA", "1.0", "2.0")?;
    let session = session_with(&[upgrader.clone()], Vec::new());
    let project = session.open_project(&path);

    let pending = session.plan_upgrades(&project, &LoadParameters::default())?;
    assert_eq!(pending.len(), 1);
    assert_eq!(std::fs::read_to_string(&path)?, OUTDATED);
    assert_eq!(upgrader.calls(), 0);
    assert_eq!(project.package().state(), PackageState::Unloaded);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_loads_of_one_project_upgrade_once() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_project(dir.path(), "X", OUTDATED)?;
    let upgrader = CountingUpgrader::new("PackageA", "1.0", "2.0")?;
    let session = Arc::new(session_with(&[upgrader.clone()], Vec::new()));
    let project = session.open_project(&path);

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let session = session.clone();
        let project = project.clone();
        tasks.push(tokio::spawn(async move {
            let parameters = LoadParameters::default();
            let mut context = LoadContext::new(&parameters);
            session.ensure_loaded(project, &mut context).await
        }));
    }

    let mut outcomes = HashSet::new();
    for task in tasks {
        outcomes.insert(format!("{:?}", task.await??));
    }
    let expected: HashSet<String> = ["Ready", "AlreadyReady"].iter().map(|s| s.to_string()).collect();
    assert_eq!(outcomes, expected);
    assert_eq!(upgrader.calls(), 1);
    Ok(())
}
