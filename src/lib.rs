mod error;
pub mod models;
pub mod services;

#[cfg(feature = "desktop")]
mod commands;
#[cfg(feature = "desktop")]
mod state;

pub use error::ClarifyError;

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use commands::*;
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marginalia_lib=info")),
        )
        .init();

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .manage(state::AppState::default())
        .invoke_handler(tauri::generate_handler![
            // Config commands
            get_config,
            set_api_key,
            set_base_url,
            set_model,
            set_engine_config,
            // Conversation commands
            list_conversations,
            create_conversation,
            open_conversation,
            close_conversation,
            delete_conversation,
            add_message,
            update_message,
            // Selection commands
            observe_selection,
            clear_selection,
            refresh_affordance,
            activate_affordance,
            get_highlights,
            // Clarification commands
            list_clarifications,
            submit_clarification,
            set_active_clarification,
            close_clarification,
            delete_clarification,
            get_surface,
            set_surface_override,
            dismiss_surface,
            begin_swipe,
            track_swipe,
            end_swipe,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
