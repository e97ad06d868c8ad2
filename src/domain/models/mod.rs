pub mod build;
pub mod entity;
pub mod settings;
