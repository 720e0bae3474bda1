use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::fixes::ContrastPolicy;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_MAX_ITERATIONS: usize = 8;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_iterations: Option<usize>,
    pub contrast_policy: Option<ContrastPolicy>,
    /// Command line used to start the axe tool server, first element is the
    /// program.
    pub axe_server_command: Option<Vec<String>>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("a11yfix").join("config.json"))
    }

    /// The API credential is a hard precondition; checked before any
    /// subprocess or network connection is opened.
    pub fn resolve_api_key(&self) -> Result<String> {
        std::env::var("A11YFIX_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .or_else(|| self.api_key.clone())
            .ok_or_else(|| {
                anyhow!(
                    "no API key configured; set A11YFIX_API_KEY or add \"api_key\" to the config file"
                )
            })
    }

    pub fn resolve_base_url(&self) -> String {
        std::env::var("A11YFIX_BASE_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn resolve_model(&self) -> String {
        self.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn resolve_max_iterations(&self) -> usize {
        self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS)
    }

    pub fn resolve_contrast_policy(&self) -> ContrastPolicy {
        self.contrast_policy.unwrap_or_default()
    }

    /// Program and arguments for the axe server subprocess.
    pub fn resolve_axe_command(&self) -> (String, Vec<String>) {
        match self.axe_server_command.as_deref() {
            Some([program, args @ ..]) => (program.clone(), args.to_vec()),
            _ => (
                "npx".to_string(),
                vec!["-y".to_string(), "axe-mcp-server".to_string()],
            ),
        }
    }
}
