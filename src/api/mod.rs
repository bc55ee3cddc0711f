pub mod actor;
pub mod leave;
