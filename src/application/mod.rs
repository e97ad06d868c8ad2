pub mod polling;
pub mod settings_store;
pub mod use_cases;
pub mod view_model;
