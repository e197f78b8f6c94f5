//! Shared types, errors, and configuration for Holdtree.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for type-safe entity references
//! - Application-wide error types
//! - Configuration management, including the hierarchy bounds

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, HierarchyConfig, RootPolicy};
pub use error::{AppError, AppResult};
