// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod config;
pub mod dashboard;
pub mod logger;
pub mod payload;
pub mod results_grid;
pub mod upload;

