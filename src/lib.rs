pub mod actuator;
pub mod config;
pub mod confirm;
pub mod errors;
pub mod host;
pub mod identity;
pub mod models;
pub mod pipeline;
pub mod profiles;
pub mod service;
pub mod sources;
pub mod switching;
