//! Configuration module for realtimeify
//!
//! Provides configuration management including CLI arguments,
//! config files, and session settings.

mod settings;

pub use settings::*;
