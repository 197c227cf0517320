//! Loads projects into a session and reports their state.

use crate::commands::{existing_projects, parse_property};
use crate::config::LodestoneConfig;
use crate::error::LoadOutcome;
use crate::package::Package;
use crate::upgrade::{PendingUpgrade, UpgradeDecision, UpgradePolicy, UpgradePrompt};
use clap::Args;
use eyre::{Result, bail};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Args)]
pub struct LoadArgs {
    /// Project files to load
    #[arg(required = true)]
    pub projects: Vec<PathBuf>,
    /// How to answer upgrade requests: ask, always or never
    #[arg(long)]
    pub upgrade_policy: Option<UpgradePolicy>,
    /// Skip package restore
    #[arg(long)]
    pub no_restore: bool,
    /// Build configuration used for evaluation
    #[arg(long)]
    pub configuration: Option<String>,
    /// Extra evaluation property
    #[arg(short = 'p', long = "property", value_parser = parse_property)]
    pub properties: Vec<(String, String)>,
}

pub async fn load_command(args: LoadArgs, config: &LodestoneConfig) -> Result<()> {
    let paths = existing_projects(&args.projects)?;
    let session = config.build_session();

    let mut parameters = config.load_parameters();
    if let Some(policy) = args.upgrade_policy {
        parameters.upgrade_policy = policy;
    }
    if args.no_restore {
        parameters.auto_restore = false;
    }
    if args.configuration.is_some() {
        parameters.build_configuration = args.configuration.clone();
    }
    parameters.extra_properties.extend(args.properties);
    if std::io::stdin().is_terminal() {
        parameters.upgrade_prompt = Some(terminal_prompt());
    }

    let results = session.load_projects(&paths, &parameters).await;
    let mut failures = 0;
    for (project, result) in &results {
        let package = project.package();
        match result {
            Ok(outcome) => {
                println!(
                    "{} {} [{:?}] {:?}, {} dependencies",
                    package.name(),
                    package.version(),
                    package.state(),
                    outcome,
                    package.flattened_dependencies().len()
                );
                if !outcome.is_ready() && *outcome != LoadOutcome::Skipped {
                    failures += 1;
                }
            }
            Err(err) => {
                error!("load: {err}");
                failures += 1;
            }
        }
    }
    info!(
        "load: {} binaries registered",
        session.binaries().registered_dependencies().len()
    );

    if failures > 0 {
        bail!("{failures} of {} projects did not load", results.len());
    }
    Ok(())
}

/// Asks on the terminal: y(es), a(ll), n(o) or none.
fn terminal_prompt() -> UpgradePrompt {
    Arc::new(|package: &Package, pending: &[PendingUpgrade]| {
        println!("{} needs package upgrades:", package.name());
        for upgrade in pending {
            println!("  {} -> {}", upgrade.dependency, upgrade.descriptor().target_text());
        }
        print!("Upgrade? [y]es / [a]ll / [n]o / n[o]ne: ");
        let _ = std::io::stdout().flush();

        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return UpgradeDecision::DoNotUpgrade;
        }
        parse_decision(&answer)
    })
}

fn parse_decision(answer: &str) -> UpgradeDecision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => UpgradeDecision::Upgrade,
        "a" | "all" => UpgradeDecision::UpgradeAll,
        "o" | "none" => UpgradeDecision::DoNotUpgradeAny,
        _ => UpgradeDecision::DoNotUpgrade,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_map_to_decisions() {
        assert_eq!(parse_decision("Y\n"), UpgradeDecision::Upgrade);
        assert_eq!(parse_decision("all"), UpgradeDecision::UpgradeAll);
        assert_eq!(parse_decision("none"), UpgradeDecision::DoNotUpgradeAny);
        assert_eq!(parse_decision(""), UpgradeDecision::DoNotUpgrade);
    }
}
