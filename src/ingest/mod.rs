pub mod handler;
pub mod translate;
pub mod types;
