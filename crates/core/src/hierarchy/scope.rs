//! RBAC Scope Resolver.
//!
//! Turns an actor's role and home company into the set of companies the
//! actor may act on. Scoped-resource repositories call this once per request
//! and filter their own queries with the result.

use std::collections::BTreeSet;
use std::sync::Arc;

use holdtree_shared::{HierarchyConfig, types::CompanyId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::hierarchy::cache::{DescendantSet, ScopeCache};
use crate::hierarchy::error::HierarchyError;
use crate::hierarchy::store::CompanyStore;
use crate::hierarchy::traversal::TraversalEngine;

/// Role of an actor, as far as company scoping is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Platform operator; sees every company.
    SuperAdmin,
    /// Equivalent to `SuperAdmin` for scoping.
    Administrator,
    /// Company administrator; sees the home company and its descendants.
    Admin,
    /// Regular user; sees the home company only.
    User,
}

impl Role {
    /// Parse a role from a string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "superadmin" => Some(Self::SuperAdmin),
            "administrator" => Some(Self::Administrator),
            "admin" => Some(Self::Admin),
            "user" => Some(Self::User),
            _ => None,
        }
    }

    /// Returns the string representation of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "superadmin",
            Self::Administrator => "administrator",
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// Returns true for roles that bypass company scoping.
    #[must_use]
    pub fn is_superadmin_like(&self) -> bool {
        matches!(self, Self::SuperAdmin | Self::Administrator)
    }
}

/// The party a scope is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Actor's role.
    pub role: Role,
    /// Actor's home company, if any.
    pub company_id: Option<CompanyId>,
}

impl Actor {
    /// Creates an actor.
    #[must_use]
    pub fn new(role: Role, company_id: Option<CompanyId>) -> Self {
        Self { role, company_id }
    }
}

/// Companies an actor may act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "company_ids", rename_all = "snake_case")]
pub enum CompanyScope {
    /// No filter applies.
    Unscoped,
    /// Only these companies; an empty set means no access.
    Companies(BTreeSet<CompanyId>),
}

impl CompanyScope {
    /// A scope granting nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::Companies(BTreeSet::new())
    }

    /// Returns true if `company_id` is inside the scope.
    #[must_use]
    pub fn allows(&self, company_id: CompanyId) -> bool {
        match self {
            Self::Unscoped => true,
            Self::Companies(ids) => ids.contains(&company_id),
        }
    }

    /// Returns true if the scope grants no company at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Companies(ids) if ids.is_empty())
    }

    /// Returns true if no filter applies.
    #[must_use]
    pub fn is_unscoped(&self) -> bool {
        matches!(self, Self::Unscoped)
    }

    /// The allowed IDs, or `None` when unscoped.
    #[must_use]
    pub fn company_ids(&self) -> Option<&BTreeSet<CompanyId>> {
        match self {
            Self::Unscoped => None,
            Self::Companies(ids) => Some(ids),
        }
    }
}

/// Resolves scopes through the Traversal Engine, optionally cached.
pub struct ScopeResolver<'s, S: ?Sized> {
    store: &'s S,
    config: HierarchyConfig,
    cache: Option<&'s ScopeCache>,
}

impl<'s, S: CompanyStore + ?Sized> ScopeResolver<'s, S> {
    /// Creates an uncached resolver.
    pub fn new(store: &'s S, config: HierarchyConfig) -> Self {
        Self {
            store,
            config,
            cache: None,
        }
    }

    /// Uses `cache` for descendant sets.
    #[must_use]
    pub fn with_cache(mut self, cache: &'s ScopeCache) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn walk(&self, company_id: CompanyId) -> Result<DescendantSet, HierarchyError> {
        Ok(Arc::new(
            TraversalEngine::new(self.store, self.config)
                .descendant_ids(company_id)
                .await?,
        ))
    }

    async fn descendant_set(&self, company_id: CompanyId) -> Result<DescendantSet, HierarchyError> {
        let Some(cache) = self.cache else {
            return self.walk(company_id).await;
        };
        if let Some(hit) = cache.get(company_id) {
            return Ok(hit);
        }

        let generation = cache.generation();
        let ids = self.walk(company_id).await?;
        if !cache.insert_if_current(company_id, Arc::clone(&ids), generation) {
            debug!(company_id = %company_id, "Tree changed during scope walk, not caching");
        }
        Ok(ids)
    }

    /// Computes the scope of `actor`.
    pub async fn resolve(&self, actor: &Actor) -> Result<CompanyScope, HierarchyError> {
        if actor.role.is_superadmin_like() {
            return Ok(CompanyScope::Unscoped);
        }
        let Some(home) = actor.company_id else {
            debug!(role = actor.role.as_str(), "Actor has no home company, empty scope");
            return Ok(CompanyScope::none());
        };

        let mut ids = BTreeSet::from([home]);
        if actor.role == Role::Admin {
            ids.extend(self.descendant_set(home).await?.iter().copied());
        }
        debug!(
            role = actor.role.as_str(),
            company_id = %home,
            companies = ids.len(),
            "Resolved company scope"
        );
        Ok(CompanyScope::Companies(ids))
    }

    /// Returns true if `target` is `home` or one of its descendants.
    pub async fn validate_access(
        &self,
        home: CompanyId,
        target: CompanyId,
    ) -> Result<bool, HierarchyError> {
        if home == target {
            return Ok(true);
        }
        Ok(self.descendant_set(home).await?.contains(&target))
    }

    /// Returns true if `actor` may act on `target`.
    pub async fn can_access(
        &self,
        actor: &Actor,
        target: CompanyId,
    ) -> Result<bool, HierarchyError> {
        if actor.role.is_superadmin_like() {
            return Ok(true);
        }
        let Some(home) = actor.company_id else {
            return Ok(false);
        };
        match actor.role {
            Role::Admin => self.validate_access(home, target).await,
            _ => Ok(home == target),
        }
    }
}
