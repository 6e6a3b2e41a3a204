pub mod agent;
pub mod config;
pub mod errors;
pub mod handler;
pub mod knowledge;
pub mod memory;
pub mod models;
pub mod observer;
pub mod prompt_template;
pub mod providers;
pub mod registry;
