use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::config::palette::PaletteRegistry;
use crate::notes::repository::DEFAULT_COLLECTION;

pub mod palette;

pub use palette::{CardPalette, PaletteName, Rgb};

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "Notecards";
const APP_NAME: &str = "notecards";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if self.paths.config_file.exists() {
            return self.load();
        }
        let mut cfg = AppConfig::default();
        cfg.post_load(&self.paths)?;
        self.write_default_config(&cfg)?;
        tracing::info!(path = %self.paths.config_file.display(), "wrote default config");
        Ok(cfg)
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    /// Callers create the config directory first.
    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let rendered = toml::to_string_pretty(cfg).context("serializing default config")?;
        fs::write(&self.paths.config_file, rendered).with_context(|| {
            format!("writing default config {}", self.paths.config_file.display())
        })
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var("NOTECARDS_CONFIG").ok().map(PathBuf::from);
        let override_data = env::var("NOTECARDS_DATA").ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        Ok(Self::rooted(config_dir, config_file, data_root, project_dirs.state_dir()))
    }

    /// Lays out every path under one directory. Used by tests and when both
    /// overrides point at the same place.
    pub fn under(root: &Path) -> Self {
        let config_dir = root.join("config");
        let config_file = config_dir.join("config.toml");
        Self::rooted(config_dir, config_file, root.join("data"), None)
    }

    fn rooted(
        config_dir: PathBuf,
        config_file: PathBuf,
        data_root: PathBuf,
        state_dir: Option<&Path>,
    ) -> Self {
        let database_path = data_root.join("notecards.db");
        let state_dir = state_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_root.join("state"));
        let log_dir = state_dir.join("logs");
        Self {
            config_dir,
            config_file,
            data_dir: data_root,
            database_path,
            log_dir,
            state_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.config_dir,
            &self.data_dir,
            &self.log_dir,
            &self.state_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Ask before deleting a note. When off, delete confirms itself.
    pub confirm_delete: bool,
    pub store: StoreOptions,
    pub cards: CardOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            confirm_delete: true,
            store: StoreOptions::default(),
            cards: CardOptions::default(),
        }
    }
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.store
            .resolve(paths)
            .context("resolving store paths")?;
        if !PaletteRegistry::default().contains(&self.cards.palette) {
            tracing::warn!(?self.cards.palette, "unknown palette in config, falling back to warm");
            self.cards.palette = PaletteName::Warm;
        }
        if self.cards.columns == 0 {
            tracing::warn!("cards.columns must be at least 1, using 1");
            self.cards.columns = 1;
        }
        if self.store.collection.trim().is_empty() {
            self.store.collection = DEFAULT_COLLECTION.to_string();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Sqlite
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    pub backend: StoreBackend,
    pub collection: String,
    #[serde(skip)]
    pub database_path: PathBuf,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            collection: DEFAULT_COLLECTION.to_string(),
            database_path: PathBuf::new(),
        }
    }
}

impl StoreOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CardOptions {
    pub columns: u16,
    pub preview_lines: u16,
    pub palette: PaletteName,
}

impl Default for CardOptions {
    fn default() -> Self {
        Self {
            columns: 2,
            preview_lines: 4,
            palette: PaletteName::Warm,
        }
    }
}
