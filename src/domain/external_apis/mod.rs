pub mod host;
pub mod travis;
