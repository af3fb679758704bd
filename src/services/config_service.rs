use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use super::affordance::AffordanceSide;
use super::file_service::get_app_data_dir;
use crate::error::ClarifyError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Tuning for selection capture and presentation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub debounce_ms: u64,
    pub panel_breakpoint_px: f64,
    pub affordance_gap_px: f64,
    pub affordance_size: f64,
    /// Which edge of the message container the control sits outside of
    pub affordance_side: AffordanceSide,
    pub swipe_dismiss_px: f64,
    pub context_messages: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            panel_breakpoint_px: 768.0,
            affordance_gap_px: 12.0,
            affordance_size: 28.0,
            affordance_side: AffordanceSide::Right,
            swipe_dismiss_px: 80.0,
            context_messages: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn get_config_path() -> Result<PathBuf, ClarifyError> {
    Ok(get_app_data_dir()?.join("config.json"))
}

pub fn load_config_from(config_path: &Path) -> Result<Config, ClarifyError> {
    if !config_path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(config_path)
        .map_err(|e| ClarifyError::Config(format!("Failed to read config: {}", e)))?;
    serde_json::from_str(&content)
        .map_err(|e| ClarifyError::Config(format!("Failed to parse config: {}", e)))
}

pub fn save_config_to(config_path: &Path, config: &Config) -> Result<(), ClarifyError> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ClarifyError::Config(format!("Failed to serialize config: {}", e)))?;
    fs::write(config_path, content)
        .map_err(|e| ClarifyError::Config(format!("Failed to write config: {}", e)))?;
    Ok(())
}

pub fn load_config() -> Result<Config, ClarifyError> {
    load_config_from(&get_config_path()?)
}

pub fn save_config(config: &Config) -> Result<(), ClarifyError> {
    save_config_to(&get_config_path()?, config)
}

fn update_config(apply: impl FnOnce(&mut Config)) -> Result<(), ClarifyError> {
    let mut config = load_config().unwrap_or_default();
    apply(&mut config);
    save_config(&config)
}

pub fn set_api_key(key: &str) -> Result<(), ClarifyError> {
    update_config(|config| config.api_key = Some(key.to_string()))
}

pub fn set_base_url(url: &str) -> Result<(), ClarifyError> {
    update_config(|config| config.base_url = Some(url.to_string()))
}

pub fn set_model(model: &str) -> Result<(), ClarifyError> {
    update_config(|config| config.model = Some(model.to_string()))
}

pub fn set_engine_config(engine: EngineConfig) -> Result<(), ClarifyError> {
    update_config(|config| config.engine = engine)
}

/// Resolved LLM settings: (base_url, model, api_key), with defaults applied
/// for anything unset or blank.
pub fn effective_llm_settings(config: &Config) -> (String, String, String) {
    let pick = |value: &Option<String>, default: &str| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
            .to_string()
    };
    (
        pick(&config.base_url, DEFAULT_BASE_URL),
        pick(&config.model, DEFAULT_MODEL),
        pick(&config.api_key, ""),
    )
}

pub fn get_effective_config() -> Result<(String, String, String), ClarifyError> {
    Ok(effective_llm_settings(&load_config()?))
}
