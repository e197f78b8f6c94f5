//! Hierarchy service: the single entry point for tree mutations.
//!
//! Every mutation runs validate, persist, level repair inside one store
//! transaction behind an in-process writer gate. Returning early with an
//! error drops the transaction, which discards its writes. The scope cache
//! is invalidated only after a successful commit.

use holdtree_shared::{HierarchyConfig, RootPolicy, types::CompanyId};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::hierarchy::cache::ScopeCache;
use crate::hierarchy::error::HierarchyError;
use crate::hierarchy::levels::LevelRepairEngine;
use crate::hierarchy::scope::{Actor, CompanyScope, ScopeResolver};
use crate::hierarchy::store::{CompanyStore, StoreTransaction, TransactionalStore};
use crate::hierarchy::traversal::TraversalEngine;
use crate::hierarchy::types::{
    CompanyNode, LevelMismatch, NewCompany, RepairReport, ReparentOutcome,
};
use crate::hierarchy::validator::{HierarchyValidator, Placement};

/// Coordinates hierarchy mutations and reads over a [`TransactionalStore`].
pub struct HierarchyService<B> {
    backend: B,
    config: HierarchyConfig,
    cache: Option<ScopeCache>,
    writer: Mutex<()>,
}

async fn load<S: CompanyStore + ?Sized>(
    store: &S,
    id: CompanyId,
) -> Result<CompanyNode, HierarchyError> {
    store
        .find_by_id(id)
        .await?
        .ok_or(HierarchyError::CompanyNotFound(id))
}

impl<B: TransactionalStore> HierarchyService<B> {
    /// Creates a service with a scope cache sized from `config`.
    pub fn new(backend: B, config: HierarchyConfig) -> Self {
        Self {
            cache: Some(ScopeCache::from_config(&config)),
            ..Self::without_cache(backend, config)
        }
    }

    /// Creates a service that resolves every scope from the store.
    pub fn without_cache(backend: B, config: HierarchyConfig) -> Self {
        Self {
            backend,
            config,
            cache: None,
            writer: Mutex::new(()),
        }
    }

    /// The underlying store.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Active hierarchy settings.
    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    /// The scope cache, if enabled.
    pub fn cache(&self) -> Option<&ScopeCache> {
        self.cache.as_ref()
    }

    async fn finish(&self, tx: B::Tx) -> Result<(), HierarchyError> {
        tx.commit().await?;
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
        Ok(())
    }

    /// Repairs the levels below `id`. Roots are pinned at zero, so their
    /// children are repaired one by one instead.
    async fn realign(&self, tx: &B::Tx, id: CompanyId) -> Result<RepairReport, HierarchyError> {
        let engine = LevelRepairEngine::new(tx, self.config);
        let node = load(tx, id).await?;
        if !node.is_root() {
            return engine.repair(id).await;
        }

        let mut report = RepairReport::default();
        for child in tx.find_active_children(&[id]).await? {
            report.absorb(engine.repair(child.id).await?);
        }
        Ok(report)
    }

    /// Creates a company.
    ///
    /// The level is derived from the parent and clamped to the maximum.
    pub async fn create_node(&self, input: NewCompany) -> Result<CompanyNode, HierarchyError> {
        let _gate = self.writer.lock().await;
        let tx = self.backend.begin().await?;

        let (code, placement) = HierarchyValidator::new(&tx, self.config)
            .validate_create(&input)
            .await?;
        if placement.clamped {
            warn!(code = %code, level = placement.level, "New company level clamped to maximum");
        }

        let node = CompanyNode::new(
            code,
            input.name.trim(),
            placement.parent_id(),
            placement.level,
        );
        let node = tx.insert(node).await?;
        self.finish(tx).await?;

        info!(
            company_id = %node.id,
            code = %node.code,
            parent_id = ?node.parent_id,
            level = node.level,
            "Company created"
        );
        Ok(node)
    }

    /// Moves a company under `new_parent`, or promotes it to root with `None`.
    ///
    /// Moving to the current parent is a no-op. Promotion while another root
    /// is active follows [`RootPolicy`].
    pub async fn reparent_node(
        &self,
        id: CompanyId,
        new_parent: Option<CompanyId>,
    ) -> Result<ReparentOutcome, HierarchyError> {
        let _gate = self.writer.lock().await;
        let tx = self.backend.begin().await?;

        let node = load(&tx, id).await?;
        if !node.is_active {
            return Err(HierarchyError::CompanyInactive(id));
        }
        if node.parent_id == new_parent {
            debug!(company_id = %id, "Company already under requested parent");
            return Ok(ReparentOutcome {
                previous_parent_id: node.parent_id,
                company: node,
                demoted_root_id: None,
                repair: RepairReport::default(),
            });
        }

        let validation = HierarchyValidator::new(&tx, self.config)
            .validate_reparent(&node, new_parent)
            .await;
        let outcome = match validation {
            Ok(placement) => self.move_node(&tx, node, placement).await?,
            Err(HierarchyError::MultipleRootsNotAllowed { existing })
                if self.config.root_policy == RootPolicy::DemoteExisting =>
            {
                self.promote_demoting(&tx, node, existing).await?
            }
            Err(err) => return Err(err),
        };
        self.finish(tx).await?;

        info!(
            company_id = %id,
            from = ?outcome.previous_parent_id,
            to = ?outcome.company.parent_id,
            level = outcome.company.level,
            corrected = outcome.repair.corrected,
            "Company re-parented"
        );
        Ok(outcome)
    }

    async fn move_node(
        &self,
        tx: &B::Tx,
        mut node: CompanyNode,
        placement: Placement,
    ) -> Result<ReparentOutcome, HierarchyError> {
        if placement.clamped {
            warn!(
                company_id = %node.id,
                level = placement.level,
                "Moved company level clamped to maximum"
            );
        }
        let id = node.id;
        let previous_parent_id = node.parent_id;
        node.parent_id = placement.parent_id();
        node.level = placement.level;
        node.touch();
        tx.update(node).await?;

        let repair = self.realign(tx, id).await?;
        Ok(ReparentOutcome {
            company: load(tx, id).await?,
            previous_parent_id,
            demoted_root_id: None,
            repair,
        })
    }

    /// Promotes `node` to root and moves the current root `existing` under it.
    async fn promote_demoting(
        &self,
        tx: &B::Tx,
        mut node: CompanyNode,
        existing: CompanyId,
    ) -> Result<ReparentOutcome, HierarchyError> {
        let id = node.id;

        // The old root goes first so there is never a moment with two roots.
        let mut old_root = load(tx, existing).await?;
        old_root.parent_id = Some(id);
        old_root.level = self.config.child_level(0).0;
        old_root.touch();
        tx.update(old_root).await?;

        let previous_parent_id = node.parent_id;
        node.parent_id = None;
        node.level = 0;
        node.touch();
        tx.update(node).await?;

        warn!(
            company_id = %id,
            demoted_root_id = %existing,
            "Existing root demoted under promoted company"
        );

        let repair = self.realign(tx, id).await?;
        Ok(ReparentOutcome {
            company: load(tx, id).await?,
            previous_parent_id,
            demoted_root_id: Some(existing),
            repair,
        })
    }

    /// Soft-deletes a company. Its descendants stay stored but drop out of
    /// every traversal until it is reactivated.
    pub async fn deactivate_node(&self, id: CompanyId) -> Result<CompanyNode, HierarchyError> {
        let _gate = self.writer.lock().await;
        let tx = self.backend.begin().await?;

        let mut node = load(&tx, id).await?;
        if !node.is_active {
            debug!(company_id = %id, "Company already inactive");
            return Ok(node);
        }
        if node.is_root() {
            return Err(HierarchyError::RootRequired(id));
        }

        node.is_active = false;
        node.touch();
        let node = tx.update(node).await?;
        self.finish(tx).await?;

        info!(company_id = %id, code = %node.code, "Company deactivated");
        Ok(node)
    }

    /// Brings a soft-deleted company back, re-deriving its level.
    pub async fn reactivate_node(&self, id: CompanyId) -> Result<CompanyNode, HierarchyError> {
        let _gate = self.writer.lock().await;
        let tx = self.backend.begin().await?;

        let mut node = load(&tx, id).await?;
        if node.is_active {
            debug!(company_id = %id, "Company already active");
            return Ok(node);
        }

        let placement = HierarchyValidator::new(&tx, self.config)
            .validate_reactivate(&node)
            .await?;
        node.is_active = true;
        node.level = placement.level;
        node.touch();
        tx.update(node).await?;

        let repair = self.realign(&tx, id).await?;
        let node = load(&tx, id).await?;
        self.finish(tx).await?;

        info!(
            company_id = %id,
            code = %node.code,
            level = node.level,
            corrected = repair.corrected,
            "Company reactivated"
        );
        Ok(node)
    }

    /// Changes the code and name of an active company.
    pub async fn rename_node(
        &self,
        id: CompanyId,
        code: &str,
        name: &str,
    ) -> Result<CompanyNode, HierarchyError> {
        let _gate = self.writer.lock().await;
        let tx = self.backend.begin().await?;

        let mut node = load(&tx, id).await?;
        let code = HierarchyValidator::new(&tx, self.config)
            .validate_rename(&node, code)
            .await?;
        node.code = code;
        node.name = name.trim().to_string();
        node.touch();
        let node = tx.update(node).await?;
        self.finish(tx).await?;

        info!(company_id = %id, code = %node.code, "Company renamed");
        Ok(node)
    }

    /// Recomputes the level of every active company.
    pub async fn repair_all(&self) -> Result<RepairReport, HierarchyError> {
        let _gate = self.writer.lock().await;
        let tx = self.backend.begin().await?;

        let report = LevelRepairEngine::new(&tx, self.config).repair_all().await?;
        self.finish(tx).await?;
        Ok(report)
    }

    /// Loads a company, active or not.
    pub async fn get(&self, id: CompanyId) -> Result<CompanyNode, HierarchyError> {
        load(&self.backend, id).await
    }

    /// Finds the active company holding `code`.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<CompanyNode>, HierarchyError> {
        self.backend.find_active_by_code(code.trim()).await
    }

    /// Active descendants of `id`, ordered by level then name.
    pub async fn descendants(&self, id: CompanyId) -> Result<Vec<CompanyNode>, HierarchyError> {
        TraversalEngine::new(&self.backend, self.config)
            .descendants(id)
            .await
    }

    /// Active ancestors of `id`, nearest parent first.
    pub async fn ancestors(&self, id: CompanyId) -> Result<Vec<CompanyNode>, HierarchyError> {
        TraversalEngine::new(&self.backend, self.config)
            .ancestors(id)
            .await
    }

    /// Returns true if `candidate` sits below `ancestor`.
    pub async fn is_descendant_of(
        &self,
        candidate: CompanyId,
        ancestor: CompanyId,
    ) -> Result<bool, HierarchyError> {
        TraversalEngine::new(&self.backend, self.config)
            .is_descendant_of(candidate, ancestor)
            .await
    }

    fn resolver(&self) -> ScopeResolver<'_, B> {
        let resolver = ScopeResolver::new(&self.backend, self.config);
        match &self.cache {
            Some(cache) => resolver.with_cache(cache),
            None => resolver,
        }
    }

    /// Companies `actor` may act on.
    pub async fn resolve_scope(&self, actor: &Actor) -> Result<CompanyScope, HierarchyError> {
        self.resolver().resolve(actor).await
    }

    /// Returns true if `target` is `home` or one of its descendants.
    pub async fn validate_access(
        &self,
        home: CompanyId,
        target: CompanyId,
    ) -> Result<bool, HierarchyError> {
        self.resolver().validate_access(home, target).await
    }

    /// Returns true if `actor` may act on `target`.
    pub async fn can_access(&self, actor: &Actor, target: CompanyId) -> Result<bool, HierarchyError> {
        self.resolver().can_access(actor, target).await
    }

    /// Lists companies whose stored level is out of line, without writing.
    pub async fn audit_levels(&self) -> Result<Vec<LevelMismatch>, HierarchyError> {
        LevelRepairEngine::new(&self.backend, self.config)
            .audit()
            .await
    }
}
