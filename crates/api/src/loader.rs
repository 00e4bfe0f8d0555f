//! Dynamic module loader.
//!
//! Modules live on disk as `<modules_dir>/<vendor>/<module>/module.json`. A
//! module with `"server": true` has a server entry point, which is resolved
//! by name in the statically linked [`ModuleCatalog`] and called once at
//! boot. Each entry returns the module's namespace tree.
//!
//! One bad module never stops the boot: its failure is recorded in the
//! [`LoadReport`] and the remaining modules load normally.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use routeforge_core::{ComposeError, Namespace, RouterNode};

pub const MODULE_MANIFEST: &str = "module.json";

/// Vendor and module names are joined with this in third-party keys.
pub const VENDOR_SEPARATOR: char = '$';

/// Server entry point of a module.
pub type ModuleEntry = fn() -> anyhow::Result<RouterNode>;

/// Entry points linked into this binary, by `vendor/module` name.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    entries: BTreeMap<String, ModuleEntry>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, vendor: &str, module: &str, entry: ModuleEntry) -> Self {
        self.entries.insert(format!("{vendor}/{module}"), entry);
        self
    }

    pub fn get(&self, vendor: &str, module: &str) -> Option<ModuleEntry> {
        self.entries.get(&format!("{vendor}/{module}")).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ModuleManifest {
    #[serde(default)]
    server: bool,
}

/// A module found on disk that declares a server entry point.
#[derive(Debug, Clone)]
pub struct DiscoveredModule {
    /// `vendor/module`.
    pub name: String,
    /// Namespace key the module is mounted under.
    pub key: String,
    pub dir: PathBuf,
    /// `None` when the catalog has no entry for this module.
    pub entry: Option<ModuleEntry>,
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub modules: Vec<DiscoveredModule>,
    pub failures: Vec<ModuleLoadError>,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("cannot read modules directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ModuleLoadError {
    #[error("module {module}: unreadable {path}: {message}")]
    Manifest {
        module: String,
        path: PathBuf,
        message: String,
    },

    #[error("module {module}: no server entry point is linked into this binary")]
    NotInCatalog { module: String },

    #[error("module {module}: server entry point failed: {message}")]
    EntryFailed { module: String, message: String },

    #[error("module {module}: server entry point panicked: {message}")]
    Panicked { module: String, message: String },

    #[error("module {module}: server entry point did not return a namespace")]
    NotANamespace { module: String },

    #[error("module {module}: {source}")]
    Compose {
        module: String,
        #[source]
        source: ComposeError,
    },
}

impl ModuleLoadError {
    pub fn module(&self) -> &str {
        match self {
            ModuleLoadError::Manifest { module, .. }
            | ModuleLoadError::NotInCatalog { module }
            | ModuleLoadError::EntryFailed { module, .. }
            | ModuleLoadError::Panicked { module, .. }
            | ModuleLoadError::NotANamespace { module }
            | ModuleLoadError::Compose { module, .. } => module,
        }
    }
}

/// Outcome of loading every discovered module.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Successfully loaded modules, keyed by namespace key.
    pub tree: Namespace,
    /// Keys of the modules in `tree`, in load order.
    pub loaded: Vec<String>,
    pub failures: Vec<ModuleLoadError>,
}

/// Namespace key for a module: first-party modules are addressed by module
/// name alone, others as `vendor$module`.
pub fn module_key(vendor: &str, module: &str, first_party: &str) -> String {
    if vendor == first_party {
        module.to_string()
    } else {
        format!("{vendor}{VENDOR_SEPARATOR}{module}")
    }
}

/// Scan `dir` for modules with a server entry point.
///
/// Vendors and modules are visited in name order. A missing directory means
/// no modules.
pub fn discover(dir: &Path, catalog: &ModuleCatalog, first_party: &str) -> Result<Discovery, DiscoveryError> {
    let mut discovery = Discovery::default();
    if !dir.exists() {
        tracing::warn!(dir = %dir.display(), "modules directory does not exist");
        return Ok(discovery);
    }

    for vendor_dir in sorted_subdirs(dir)? {
        let vendor = file_name(&vendor_dir);
        for module_dir in sorted_subdirs(&vendor_dir)? {
            let module = file_name(&module_dir);
            let name = format!("{vendor}/{module}");
            let manifest_path = module_dir.join(MODULE_MANIFEST);
            if !manifest_path.is_file() {
                continue;
            }

            let manifest = match read_manifest(&manifest_path) {
                Ok(m) => m,
                Err(message) => {
                    discovery.failures.push(ModuleLoadError::Manifest {
                        module: name,
                        path: manifest_path,
                        message,
                    });
                    continue;
                }
            };
            if !manifest.server {
                tracing::debug!(module = %name, "module has no server entry point");
                continue;
            }

            discovery.modules.push(DiscoveredModule {
                key: module_key(&vendor, &module, first_party),
                entry: catalog.get(&vendor, &module),
                dir: module_dir,
                name,
            });
        }
    }
    Ok(discovery)
}

/// Call every module's entry point, sequentially, and merge the results.
pub fn load_modules(modules: Vec<DiscoveredModule>) -> LoadReport {
    let mut report = LoadReport::default();
    for module in modules {
        // Flatten each module under its own key so a malformed tree is
        // rejected here and never reaches the shared manifest.
        let loaded = load_one(&module).and_then(|namespace| {
            Namespace::new()
                .nest(module.key.clone(), namespace.clone())
                .flatten()
                .map(|_| namespace)
                .map_err(|source| ModuleLoadError::Compose {
                    module: module.name.clone(),
                    source,
                })
        });
        match loaded {
            Ok(namespace) => match report.tree.merge(module.key.clone(), namespace.into()) {
                Ok(()) => {
                    tracing::info!(module = %module.name, key = %module.key, "module loaded");
                    report.loaded.push(module.key);
                }
                Err(source) => report.failures.push(ModuleLoadError::Compose {
                    module: module.name,
                    source,
                }),
            },
            Err(err) => report.failures.push(err),
        }
    }
    for failure in &report.failures {
        tracing::warn!(module = failure.module(), error = %failure, "module skipped");
    }
    report
}

/// [`discover`] then [`load_modules`]; discovery failures end up in the report.
pub fn load_from_dir(dir: &Path, catalog: &ModuleCatalog, first_party: &str) -> Result<LoadReport, DiscoveryError> {
    let discovery = discover(dir, catalog, first_party)?;
    let mut report = load_modules(discovery.modules);
    for failure in &discovery.failures {
        tracing::warn!(module = failure.module(), error = %failure, "module skipped");
    }
    report.failures.splice(0..0, discovery.failures);
    Ok(report)
}

fn load_one(module: &DiscoveredModule) -> Result<Namespace, ModuleLoadError> {
    let entry = module.entry.ok_or_else(|| ModuleLoadError::NotInCatalog {
        module: module.name.clone(),
    })?;

    match panic::catch_unwind(AssertUnwindSafe(entry)) {
        Ok(Ok(RouterNode::Namespace(namespace))) => Ok(namespace),
        Ok(Ok(RouterNode::Leaf(_))) => Err(ModuleLoadError::NotANamespace {
            module: module.name.clone(),
        }),
        Ok(Err(err)) => Err(ModuleLoadError::EntryFailed {
            module: module.name.clone(),
            message: format!("{err:#}"),
        }),
        Err(payload) => Err(ModuleLoadError::Panicked {
            module: module.name.clone(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn read_manifest(path: &Path) -> Result<ModuleManifest, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&raw).map_err(|e| e.to_string())
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    let io = |source| DiscoveryError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io)? {
        let path = entry.map_err(io)?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use routeforge_core::context::RequestContext;
    use routeforge_core::{ApiResult, Controller, Reply};
    use std::fs;

    async fn noop(_ctx: RequestContext) -> ApiResult<Reply> {
        Ok(Reply::empty())
    }

    fn good() -> anyhow::Result<RouterNode> {
        let list = Controller::get("/items").callback(noop)?;
        Ok(Namespace::new().nest("items", Namespace::new().route("list", list)).into())
    }

    fn failing() -> anyhow::Result<RouterNode> {
        anyhow::bail!("database unreachable")
    }

    fn panicking() -> anyhow::Result<RouterNode> {
        panic!("entry point exploded")
    }

    fn leaf() -> anyhow::Result<RouterNode> {
        Ok(Controller::get("/").callback(noop)?.into())
    }

    fn write_module(root: &Path, vendor: &str, module: &str, manifest: &str) {
        let dir = root.join(vendor).join(module);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MODULE_MANIFEST), manifest).unwrap();
    }

    #[test]
    fn keys_follow_vendor_convention() {
        assert_eq!(module_key("routeforge", "wallet", "routeforge"), "wallet");
        assert_eq!(module_key("acme", "calendar", "routeforge"), "acme$calendar");
    }

    #[test]
    fn one_failing_module_does_not_block_the_others() {
        let dir = tempfile::tempdir().unwrap();
        for module in ["a", "b", "c", "d"] {
            write_module(dir.path(), "routeforge", module, r#"{"server": true}"#);
        }
        let catalog = ModuleCatalog::new()
            .register("routeforge", "a", good)
            .register("routeforge", "b", good)
            .register("routeforge", "c", failing)
            .register("routeforge", "d", good);

        let report = load_from_dir(dir.path(), &catalog, "routeforge").unwrap();
        assert_eq!(report.loaded, vec!["a", "b", "d"]);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            &report.failures[0],
            ModuleLoadError::EntryFailed { module, message }
                if module == "routeforge/c" && message.contains("database unreachable")
        ));
        assert_eq!(report.tree.flatten().unwrap().len(), 3);
    }

    fn duplicated() -> anyhow::Result<RouterNode> {
        Ok(Namespace::new()
            .route("list", Controller::get("/a").callback(noop)?)
            .route("list", Controller::get("/b").callback(noop)?)
            .into())
    }

    fn clashing_params() -> anyhow::Result<RouterNode> {
        Ok(Namespace::new()
            .route("get", Controller::get("/items/:id").callback(noop)?)
            .route("remove", Controller::delete("/items/:name").callback(noop)?)
            .into())
    }

    #[test]
    fn malformed_module_trees_are_skipped_before_composition() {
        let dir = tempfile::tempdir().unwrap();
        for module in ["a", "bad", "clash", "d"] {
            write_module(dir.path(), "routeforge", module, r#"{"server": true}"#);
        }
        let catalog = ModuleCatalog::new()
            .register("routeforge", "a", good)
            .register("routeforge", "bad", duplicated)
            .register("routeforge", "clash", clashing_params)
            .register("routeforge", "d", good);

        let report = load_from_dir(dir.path(), &catalog, "routeforge").unwrap();
        assert_eq!(report.loaded, vec!["a", "d"]);
        assert_eq!(report.failures.len(), 2);
        assert!(matches!(
            &report.failures[0],
            ModuleLoadError::Compose { module, source: ComposeError::KeyCollision(key) }
                if module == "routeforge/bad" && key == "bad.list"
        ));
        assert!(matches!(
            &report.failures[1],
            ModuleLoadError::Compose { source: ComposeError::ConflictingParams { .. }, .. }
        ));

        let manifest = routeforge_core::compose_manifest(&report.tree).unwrap();
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn every_failure_kind_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "acme", "calendar", r#"{"server": true}"#);
        write_module(dir.path(), "acme", "docs", r#"{"server": false}"#);
        write_module(dir.path(), "acme", "garbled", "{not json");
        write_module(dir.path(), "routeforge", "boom", r#"{"server": true}"#);
        write_module(dir.path(), "routeforge", "leafy", r#"{"server": true}"#);
        write_module(dir.path(), "routeforge", "unlinked", r#"{"server": true}"#);
        fs::create_dir_all(dir.path().join("routeforge").join("assets-only")).unwrap();

        let catalog = ModuleCatalog::new()
            .register("acme", "calendar", good)
            .register("routeforge", "boom", panicking)
            .register("routeforge", "leafy", leaf);

        let report = load_from_dir(dir.path(), &catalog, "routeforge").unwrap();
        assert_eq!(report.loaded, vec!["acme$calendar"]);

        let kinds: Vec<_> = report
            .failures
            .iter()
            .map(|f| match f {
                ModuleLoadError::Manifest { .. } => "manifest",
                ModuleLoadError::NotInCatalog { .. } => "not_in_catalog",
                ModuleLoadError::EntryFailed { .. } => "entry_failed",
                ModuleLoadError::Panicked { .. } => "panicked",
                ModuleLoadError::NotANamespace { .. } => "not_a_namespace",
                ModuleLoadError::Compose { .. } => "compose",
            })
            .collect();
        assert_eq!(kinds, vec!["manifest", "panicked", "not_a_namespace", "not_in_catalog"]);

        let routes = report.tree.flatten().unwrap();
        assert!(routes.get("acme$calendar.items.list").is_some());
    }

    #[test]
    fn missing_directory_means_no_modules() {
        let dir = tempfile::tempdir().unwrap();
        let report = load_from_dir(&dir.path().join("nope"), &ModuleCatalog::new(), "routeforge").unwrap();
        assert!(report.loaded.is_empty());
        assert!(report.failures.is_empty());
    }
}
