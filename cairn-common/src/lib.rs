//! Cairn Common
//!
//! Common utilities shared by the Cairn PKI crates.
//!
//! This crate provides:
//! - Component-based structured logging with scheme context
//! - A small `env_logger` bootstrap for binaries and tests

pub mod logging;

pub use logging::{Component, LogLevel, Logger, LoggingConfig};
