pub mod affordance;
pub mod anchor_resolver;
pub mod clarification_store;
pub mod clarify_service;
pub mod config_service;
pub mod file_service;
pub mod llm_client;
pub mod rendered_content;
pub mod selection_capture;
pub mod session;
pub mod surface;
