pub mod app;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod layout;
pub mod orchestrator;
pub mod output;
pub mod portal;
pub mod prompt;
pub mod transfer;
