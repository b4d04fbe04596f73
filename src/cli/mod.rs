//! CLI module for goalrunner
//!
//! Handles command-line argument parsing and configuration management.

pub mod args;
pub mod config;

pub use args::{Args, Commands, Verbosity};
pub use config::{ActorConfig, ApiConfig, Config, PathsConfig, TOKEN_ENV};
