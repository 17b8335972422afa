use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::guide::LayoutRegistry;

/// Everything a request needs, loaded once at startup and never mutated.
pub struct AppContext {
    pub config: Config,
    pub layouts: LayoutRegistry,
    pub template: Arc<[u8]>,
}

impl AppContext {
    pub fn new(config: Config, layouts: LayoutRegistry, template: Vec<u8>) -> AppContext {
        AppContext {
            config,
            layouts,
            template: Arc::from(template),
        }
    }

    /// Reads the template and layout tables named by `config`.
    pub fn load(config: Config) -> Result<AppContext> {
        let layouts = load_layouts(&config)?;
        let template = std::fs::read(&config.template)
            .with_context(|| format!("Base template not found: {}", config.template.display()))?;
        log::info!(
            "Base template {} ({} bytes)",
            config.template.display(),
            template.len()
        );
        Ok(AppContext::new(config, layouts, template))
    }
}

/// Built-in layouts plus the configured directory, with the configured
/// default.
pub fn load_layouts(config: &Config) -> Result<LayoutRegistry> {
    let mut layouts = LayoutRegistry::builtin()?;
    if let Some(dir) = &config.layouts_dir {
        layouts.load_dir(dir)?;
    }
    layouts.set_default(&config.default_layout)?;
    log::info!(
        "Layouts: {} (default {})",
        layouts.versions().join(", "),
        layouts.default_version()
    );
    Ok(layouts)
}
