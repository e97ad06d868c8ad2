pub mod discovery;
pub mod error_api;
pub mod identity;
pub mod storage;
