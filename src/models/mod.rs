pub mod api_model;
pub mod config_model;
