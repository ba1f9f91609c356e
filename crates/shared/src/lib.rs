//! Shared types, errors, and configuration for Tally.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for type-safe entity references
//! - Application-wide error types
//! - Configuration management, including the canonical chart-of-accounts codes

pub mod config;
pub mod error;
pub mod types;

pub use config::{AccountCodes, AppConfig, ChartConfig, PostingConfig};
pub use error::AppError;
