//! Common utilities and types shared across the meeting client crates.

#![warn(clippy::pedantic)]

/// Module for common data types
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for tracing subscriber bootstrap
pub mod observability;
