use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::guide::DEFAULT_LAYOUT;

/// Service settings, read from a JSON file and then overridden from the
/// command line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// The blank guide every request is stamped onto.
    pub template: PathBuf,
    /// Extra layout tables, `*.json`.
    pub layouts_dir: Option<PathBuf>,
    /// Front-end files served under `/`.
    pub static_dir: Option<PathBuf>,
    pub default_layout: String,
    pub download_name: String,
    /// Largest accepted request body, in bytes.
    pub body_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "0.0.0.0".to_owned(),
            port: 5000,
            template: PathBuf::from("Guia_Petrobras_base.pdf"),
            layouts_dir: None,
            static_dir: None,
            default_layout: DEFAULT_LAYOUT.to_owned(),
            download_name: "GUIA_CONSULTA_PREENCHIDA.pdf".to_owned(),
            body_limit: 1024 * 1024,
        }
    }
}

impl Config {
    /// Loads `path`, or `config.json` from the user config directory if it
    /// exists, or falls back to the defaults.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        if let Some(path) = path {
            return Config::from_file(path);
        }
        if let Some(path) = Config::user_config_file() {
            if path.is_file() {
                return Config::from_file(&path);
            }
        }
        Ok(Config::default())
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        log::info!("Using config {}", path.display());
        Ok(config)
    }

    fn user_config_file() -> Option<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "guia-backend")?;
        Some(dirs.config_dir().join("config.json"))
    }

    /// Binds the listen socket. `host` may be an address or a host name.
    pub async fn listen(&self) -> Result<tokio::net::TcpListener> {
        tokio::net::TcpListener::bind((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("Failed to bind {}:{}", self.host, self.port))
    }
}
