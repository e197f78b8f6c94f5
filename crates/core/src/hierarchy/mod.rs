//! Company hierarchy management for Holdtree.
//!
//! A single holding company at the root, subsidiaries below it, stored as a
//! flat table of parent pointers. This module keeps that tree consistent
//! under edits and derives access scopes from it.
//!
//! # Modules
//!
//! - `store` - Tree Store seam (`CompanyStore`, transactions)
//! - `memory` - In-memory Tree Store
//! - `traversal` - Bounded descendant/ancestor walks
//! - `validator` - Invariant checks run before every write
//! - `levels` - Level Consistency Engine (fixed-point repair, audit)
//! - `scope` - RBAC Scope Resolver
//! - `cache` - Descendant-set cache for scope resolution
//! - `service` - Transactional mutation coordinator

pub mod cache;
pub mod error;
pub mod levels;
pub mod memory;
pub mod scope;
pub mod service;
pub mod store;
pub mod traversal;
pub mod types;
pub mod validator;

#[cfg(test)]
mod service_props;

pub use cache::ScopeCache;
pub use error::HierarchyError;
pub use levels::LevelRepairEngine;
pub use memory::{MemoryCompanyStore, MemoryTransaction};
pub use scope::{Actor, CompanyScope, Role, ScopeResolver};
pub use service::HierarchyService;
pub use store::{CompanyStore, StoreTransaction, TransactionalStore};
pub use traversal::{DescendantWalk, TraversalEngine};
pub use types::{CompanyNode, LevelMismatch, NewCompany, RepairReport, ReparentOutcome};
pub use validator::{HierarchyValidator, Placement};
