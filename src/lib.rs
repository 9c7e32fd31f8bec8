//! tether SSH client library
//!
//! This module exposes the core functionality for use in integration tests
//! and the main binary.

// Public modules for integration testing
pub mod config;
pub mod error;
pub mod relay;
pub mod runner;
pub mod ssh;
pub mod terminal;

// Public modules for the binary
pub mod cli;
pub mod logging;
pub mod picker;

// Internal modules
pub(crate) mod security_log;
