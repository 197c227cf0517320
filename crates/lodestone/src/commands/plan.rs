//! Dry-run of the upgrade planner.

use crate::commands::{existing_projects, parse_property};
use crate::config::LodestoneConfig;
use clap::Args;
use eyre::{Result, bail};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    /// Project files to plan for; references between them are followed
    #[arg(required = true)]
    pub projects: Vec<PathBuf>,
    /// Build configuration used for evaluation
    #[arg(long)]
    pub configuration: Option<String>,
    /// Extra evaluation property
    #[arg(short = 'p', long = "property", value_parser = parse_property)]
    pub properties: Vec<(String, String)>,
}

pub async fn plan_command(args: PlanArgs, config: &LodestoneConfig) -> Result<()> {
    let paths = existing_projects(&args.projects)?;
    let session = config.build_session();
    let mut parameters = config.load_parameters();
    if args.configuration.is_some() {
        parameters.build_configuration = args.configuration.clone();
    }
    parameters.extra_properties.extend(args.properties);

    let projects: Vec<_> = paths.iter().map(|path| session.open_project(path)).collect();
    let mut failures = 0;
    for project in &projects {
        match session.plan_upgrades(project, &parameters) {
            Ok(pending) if pending.is_empty() => {
                println!("{}: up to date", project.name());
            }
            Ok(pending) => {
                println!("{}:", project.name());
                for upgrade in &pending {
                    let descriptor = upgrade.descriptor();
                    println!(
                        "  {} -> {}",
                        upgrade.dependency,
                        descriptor.target_text()
                    );
                }
            }
            Err(err) => {
                error!("upgrade: {err}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} projects cannot be upgraded", projects.len());
    }
    info!("upgrade: planned {} projects", projects.len());
    Ok(())
}
