use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::scanner::DEFAULT_EXTS;

const CONFIG_FILE_NAME: &str = "phgrid.conf";

#[derive(Serialize, Deserialize, Clone)]
pub struct ScanConfig {
    pub extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct GuiConfig {
    pub font_scale: Option<f32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub columns: Option<usize>,
    pub thumb_size: Option<u32>,
    pub section_order: Option<String>,
}

impl Default for GuiConfig {
    fn default() -> Self {
        Self {
            font_scale: Some(1.0),
            width: Some(1280),
            height: Some(720),
            columns: Some(4),
            thumb_size: Some(256),
            section_order: None,
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
struct Config {
    #[serde(default)]
    scan: ScanConfig,
    #[serde(default)]
    gui: GuiConfig,
}

pub struct AppContext {
    pub scan: ScanConfig,
    pub gui: GuiConfig,
    config_path: PathBuf,
}

impl AppContext {
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir().context("no config dir found")?;
        fs::create_dir_all(&config_dir)?;
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read {}", config_path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("failed to parse {}", config_path.display()))?
        } else {
            // First run: write the defaults so users have a file to edit
            let config = Config::default();
            if let Ok(s) = toml::to_string_pretty(&config) {
                let _ = fs::write(&config_path, s);
            }
            config
        };

        Ok(Self {
            scan: config.scan,
            gui: config.gui,
            config_path,
        })
    }

    /// Persist GUI settings (window size etc.) on exit.
    pub fn save_gui_config(&self, gui: &GuiConfig) -> Result<()> {
        let config = Config {
            scan: self.scan.clone(),
            gui: gui.clone(),
        };
        let content = toml::to_string_pretty(&config)?;
        fs::write(&self.config_path, content)
            .with_context(|| format!("failed to write {}", self.config_path.display()))?;
        Ok(())
    }
}
