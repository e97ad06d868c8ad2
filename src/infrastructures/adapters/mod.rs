pub mod primary;
pub mod secondary;
