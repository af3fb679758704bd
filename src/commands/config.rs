use crate::services::config_service::{self, EngineConfig};

#[tauri::command]
pub fn get_config() -> Result<config_service::Config, String> {
    Ok(config_service::load_config()?)
}

#[tauri::command]
pub fn set_api_key(key: String) -> Result<(), String> {
    Ok(config_service::set_api_key(&key)?)
}

#[tauri::command]
pub fn set_base_url(url: String) -> Result<(), String> {
    Ok(config_service::set_base_url(&url)?)
}

#[tauri::command]
pub fn set_model(model: String) -> Result<(), String> {
    Ok(config_service::set_model(&model)?)
}

/// Takes effect for conversations opened afterwards
#[tauri::command]
pub fn set_engine_config(engine: EngineConfig) -> Result<(), String> {
    Ok(config_service::set_engine_config(engine)?)
}
