use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use llm_session_core::DEFAULT_SYSTEM_PROMPT;
use llm_session_loop::GenerationConfig;

use crate::error::{Result, SessionError};

const CONFIG_FILE_PATH: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    pub system_prompt: String,
    pub generation: GenerationConfig,
    /// Default for sessions opened without an explicit choice.
    pub use_tmp_path: bool,
    /// Name of the scratch directory created next to the model directory.
    pub tmp_dir_name: String,
    pub backend_type: String,
    pub reuse_kv: bool,
    pub metrics_retention: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            generation: GenerationConfig::default(),
            use_tmp_path: true,
            tmp_dir_name: "tmp".to_string(),
            backend_type: "opencl".to_string(),
            reuse_kv: true,
            metrics_retention: 1024,
        }
    }
}

fn home_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".llm-session")
}

fn home_config_json_path() -> PathBuf {
    home_config_dir().join("config.json")
}

fn parse_bool_env(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

impl SessionConfig {
    /// Loads `~/.llm-session/config.json`, falling back to `config.toml` in
    /// the working directory, then applies environment overrides. Missing or
    /// unreadable files leave the defaults in place.
    pub fn load() -> Self {
        let mut config = Self::default();

        let json_path = home_config_json_path();
        let mut loaded = false;
        if json_path.exists() {
            match Self::from_path(&json_path) {
                Ok(file_config) => {
                    config = file_config;
                    loaded = true;
                }
                Err(error) => log::warn!("Ignoring {}: {}", json_path.display(), error),
            }
        }

        if !loaded && Path::new(CONFIG_FILE_PATH).exists() {
            match Self::from_path(Path::new(CONFIG_FILE_PATH)) {
                Ok(file_config) => config = file_config,
                Err(error) => log::warn!("Ignoring {}: {}", CONFIG_FILE_PATH, error),
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Reads a config file, choosing the format by extension (`.json` or TOML).
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|error| SessionError::Config(format!("{}: {}", path.display(), error)))?;
        let is_json = path
            .extension()
            .map(|extension| extension.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            serde_json::from_str(&content).map_err(|error| SessionError::Config(error.to_string()))
        } else {
            toml::from_str(&content).map_err(|error| SessionError::Config(error.to_string()))
        }
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(prompt) = lookup("LLM_SESSION_SYSTEM_PROMPT") {
            self.system_prompt = prompt;
        }
        if let Some(max_new_tokens) = lookup("LLM_SESSION_MAX_NEW_TOKENS") {
            match max_new_tokens.trim().parse() {
                Ok(value) => self.generation.max_new_tokens = value,
                Err(error) => log::warn!(
                    "Ignoring LLM_SESSION_MAX_NEW_TOKENS={}: {}",
                    max_new_tokens,
                    error
                ),
            }
        }
        if let Some(end_marker) = lookup("LLM_SESSION_END_MARKER") {
            self.generation.end_marker = end_marker;
        }
        if let Some(backend) = lookup("LLM_SESSION_BACKEND") {
            self.backend_type = backend;
        }
        if let Some(use_tmp_path) = lookup("LLM_SESSION_USE_TMP_PATH") {
            self.use_tmp_path = parse_bool_env(&use_tmp_path);
        }
    }
}
