//! Core business logic for Holdtree.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! The company tree, its invariants and the access scopes derived from it live here.
//!
//! # Modules
//!
//! - `hierarchy` - Company tree storage seam, traversal, validation, level repair
//!   and RBAC scope resolution

pub mod hierarchy;
