pub mod aggregate;
pub mod config;
pub mod discover;
pub mod display;
pub mod errors;
pub mod invoke;
pub mod memory;
pub mod plan;
pub mod record;
pub mod session;
pub mod types;
