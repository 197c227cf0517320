//! Registry of binaries contributed by loaded packages, resolvable by name.

use crate::package::normalize_path;
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

pub const KNOWN_BINARY_EXTENSIONS: &[&str] = &["dll", "so", "dylib", "exe"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedBinary {
    pub name: String,
    pub path: PathBuf,
}

/// Where name resolution looks before falling back to registered dependencies.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    pub search_directory: Option<PathBuf>,
}

impl ResolveContext {
    pub fn in_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            search_directory: Some(directory.into()),
        }
    }
}

/// Append-only set of dependency binaries plus the binaries loaded so far.
/// Safe to share between concurrent load passes.
#[derive(Debug, Default)]
pub struct BinaryRegistry {
    loaded: RwLock<IndexMap<PathBuf, LoadedBinary>>,
    dependencies: RwLock<IndexSet<PathBuf>>,
}

impl BinaryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every session of this process.
    pub fn shared() -> Arc<BinaryRegistry> {
        static SHARED: OnceLock<Arc<BinaryRegistry>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(BinaryRegistry::new())).clone()
    }

    /// Makes a binary known for later resolution. Returns false when the path
    /// was already registered.
    ///
    /// When two registered binaries share a name, resolution keeps returning
    /// the first one.
    pub fn register_dependency(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        let mut dependencies = self.dependencies.write();
        if dependencies.contains(&path) {
            return false;
        }
        if let Some(name) = binary_name(&path) {
            if let Some(existing) = dependencies
                .iter()
                .find(|known| binary_name(known).is_some_and(|known| known.eq_ignore_ascii_case(&name)))
            {
                warn!(
                    "load: binary {name} registered from {} and {}; the first one wins",
                    existing.display(),
                    path.display()
                );
            }
        }
        dependencies.insert(path);
        true
    }

    pub fn registered_dependencies(&self) -> Vec<PathBuf> {
        self.dependencies.read().iter().cloned().collect()
    }

    /// Records a binary as loaded. Loading the same path twice returns the
    /// existing entry.
    pub fn load_from_path(&self, path: &Path) -> io::Result<LoadedBinary> {
        let path = normalize_path(path);
        if let Some(loaded) = self.loaded.read().get(&path) {
            return Ok(loaded.clone());
        }
        if !path.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("binary {} does not exist", path.display()),
            ));
        }
        let name = binary_name(&path).unwrap_or_default();
        let binary = LoadedBinary {
            name,
            path: path.clone(),
        };
        let mut loaded = self.loaded.write();
        let entry = loaded.entry(path).or_insert(binary);
        debug!("load: loaded binary {}", entry.path.display());
        Ok(entry.clone())
    }

    pub fn unload(&self, path: &Path) -> bool {
        self.loaded.write().shift_remove(&normalize_path(path)).is_some()
    }

    pub fn loaded(&self) -> Vec<LoadedBinary> {
        self.loaded.read().values().cloned().collect()
    }

    /// Resolves a binary by simple name: loaded binaries first, then the
    /// context's search directory with each known extension, then registered
    /// dependencies in registration order.
    pub fn resolve(&self, name: &str, context: &ResolveContext) -> Option<LoadedBinary> {
        if let Some(loaded) = self
            .loaded
            .read()
            .values()
            .find(|binary| binary.name.eq_ignore_ascii_case(name))
        {
            return Some(loaded.clone());
        }

        if let Some(directory) = &context.search_directory {
            for extension in KNOWN_BINARY_EXTENSIONS {
                let candidate = directory.join(format!("{name}.{extension}"));
                if candidate.is_file() {
                    if let Ok(binary) = self.load_from_path(&candidate) {
                        return Some(binary);
                    }
                }
            }
        }

        let candidates: Vec<PathBuf> = self
            .dependencies
            .read()
            .iter()
            .filter(|path| binary_name(path).is_some_and(|stem| stem.eq_ignore_ascii_case(name)))
            .cloned()
            .collect();
        for candidate in candidates {
            match self.load_from_path(&candidate) {
                Ok(binary) => return Some(binary),
                Err(err) => debug!("load: skipping {}: {err}", candidate.display()),
            }
        }
        None
    }
}

fn binary_name(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) -> eyre::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"bin")?;
        Ok(())
    }

    #[test]
    fn resolution_order_is_loaded_then_search_dir_then_dependencies() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let registered = dir.path().join("packages").join("Engine.Core.dll");
        let local = dir.path().join("bin").join("Engine.Core.so");
        touch(&registered)?;
        touch(&local)?;

        let registry = BinaryRegistry::new();
        assert!(registry.register_dependency(&registered));
        assert!(!registry.register_dependency(&registered));

        let with_search = ResolveContext::in_directory(dir.path().join("bin"));
        let binary = registry
            .resolve("Engine.Core", &with_search)
            .ok_or_else(|| eyre::eyre!("should resolve"))?;
        assert_eq!(binary.path, normalize_path(&local));

        // Already loaded now, so the search directory is not consulted again.
        let again = registry
            .resolve("ENGINE.core", &ResolveContext::default())
            .ok_or_else(|| eyre::eyre!("should resolve"))?;
        assert_eq!(again, binary);

        assert!(registry.unload(&local));
        let fallback = registry
            .resolve("Engine.Core", &ResolveContext::default())
            .ok_or_else(|| eyre::eyre!("should resolve"))?;
        assert_eq!(fallback.path, normalize_path(&registered));
        Ok(())
    }

    #[test]
    fn first_registered_duplicate_wins() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let first = dir.path().join("a").join("Shared.dll");
        let second = dir.path().join("b").join("Shared.dll");
        touch(&first)?;
        touch(&second)?;

        let registry = BinaryRegistry::new();
        registry.register_dependency(&first);
        registry.register_dependency(&second);
        let binary = registry
            .resolve("Shared", &ResolveContext::default())
            .ok_or_else(|| eyre::eyre!("should resolve"))?;
        assert_eq!(binary.path, normalize_path(&first));
        Ok(())
    }

    #[test]
    fn missing_binaries_do_not_load() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let registry = BinaryRegistry::new();
        registry.register_dependency(dir.path().join("Ghost.dll"));
        assert!(registry.load_from_path(&dir.path().join("Ghost.dll")).is_err());
        assert!(registry.resolve("Ghost", &ResolveContext::default()).is_none());
        assert!(registry.loaded().is_empty());
        Ok(())
    }
}
