//! Command implementations for the lodestone CLI

pub mod content;
pub mod deps;
pub mod load;
pub mod plan;

pub use content::content_command;
pub use deps::deps_command;
pub use load::load_command;
pub use plan::plan_command;

use eyre::{Result, bail};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Parses a `KEY=VALUE` command-line property.
pub fn parse_property(text: &str) -> Result<(String, String), String> {
    match text.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{text}`")),
    }
}

/// Writes to `path`, or to stdout when no path is given.
pub(crate) fn write_output(path: Option<&Path>, bytes: &[u8]) -> Result<()> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, bytes)?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            if !bytes.ends_with(b"\n") {
                stdout.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}

pub(crate) fn existing_projects(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    for path in paths {
        if !path.is_file() {
            bail!("project file {} does not exist", path.display());
        }
    }
    Ok(paths.to_vec())
}
