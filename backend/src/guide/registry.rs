use anyhow::{Context, Result, anyhow};
use fxhash::FxHashMap;
use std::path::Path;
use std::sync::Arc;

use super::Layout;

/// Layout tables shipped with the service.
const BUILTIN_LAYOUTS: &[(&str, &str)] = &[
    (
        "petrobras-v1.json",
        include_str!("../../layouts/petrobras-v1.json"),
    ),
    (
        "petrobras-v2.json",
        include_str!("../../layouts/petrobras-v2.json"),
    ),
];

pub const DEFAULT_LAYOUT: &str = "petrobras-v1";

/// Every known layout, keyed by version.
#[derive(Clone, Debug)]
pub struct LayoutRegistry {
    layouts: FxHashMap<String, Arc<Layout>>,
    default_version: String,
}

impl LayoutRegistry {
    pub fn new(default_version: impl Into<String>) -> LayoutRegistry {
        LayoutRegistry {
            layouts: FxHashMap::default(),
            default_version: default_version.into(),
        }
    }

    /// A registry holding the built-in layouts.
    pub fn builtin() -> Result<LayoutRegistry> {
        let mut registry = LayoutRegistry::new(DEFAULT_LAYOUT);
        for (name, text) in BUILTIN_LAYOUTS {
            let layout =
                Layout::from_json(text).with_context(|| format!("built-in layout {name}"))?;
            registry.insert(layout);
        }
        Ok(registry)
    }

    /// Adds `layout`, returning the one it replaces.
    pub fn insert(&mut self, layout: Layout) -> Option<Arc<Layout>> {
        self.layouts
            .insert(layout.version.clone(), Arc::new(layout))
    }

    /// Loads every `*.json` file in `dir`. A file whose version is already
    /// registered replaces the earlier table.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read layouts directory {}", dir.display()))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        for path in &paths {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let layout = Layout::from_json(&text)
                .with_context(|| format!("Invalid layout {}", path.display()))?;
            log::info!("Loaded layout {} from {}", layout.version, path.display());
            if self.insert(layout).is_some() {
                log::info!("Layout from {} replaces an earlier table", path.display());
            }
        }
        Ok(paths.len())
    }

    pub fn set_default(&mut self, version: &str) -> Result<()> {
        if !self.layouts.contains_key(version) {
            return Err(anyhow!("Unknown default layout {version}"));
        }
        self.default_version = version.to_owned();
        Ok(())
    }

    pub fn default_version(&self) -> &str {
        &self.default_version
    }

    pub fn get(&self, version: &str) -> Option<Arc<Layout>> {
        self.layouts.get(version).cloned()
    }

    /// The named layout, or the default one when `version` is `None`.
    pub fn resolve(&self, version: Option<&str>) -> Option<Arc<Layout>> {
        self.get(version.unwrap_or(&self.default_version))
    }

    /// All layouts, ordered by version.
    pub fn layouts(&self) -> Vec<Arc<Layout>> {
        let mut layouts: Vec<_> = self.layouts.values().cloned().collect();
        layouts.sort_by(|a, b| a.version.cmp(&b.version));
        layouts
    }

    pub fn versions(&self) -> Vec<String> {
        self.layouts().iter().map(|l| l.version.clone()).collect()
    }
}
