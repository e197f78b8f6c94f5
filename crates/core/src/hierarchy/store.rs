//! Tree Store seam.
//!
//! The store is a flat table of parent pointers. It knows nothing about
//! tree-wide invariants; callers validate before writing.

use async_trait::async_trait;
use holdtree_shared::types::CompanyId;

use crate::hierarchy::error::HierarchyError;
use crate::hierarchy::types::CompanyNode;

/// Persistence of company nodes.
#[async_trait]
pub trait CompanyStore: Send + Sync {
    /// Finds a node by ID, active or not.
    async fn find_by_id(&self, id: CompanyId) -> Result<Option<CompanyNode>, HierarchyError>;

    /// Finds the active node holding `code`.
    async fn find_active_by_code(&self, code: &str)
    -> Result<Option<CompanyNode>, HierarchyError>;

    /// Loads the active children of every node in `parent_ids`.
    ///
    /// This is one frontier step of a breadth-first walk: a single query
    /// regardless of how many parents are passed.
    async fn find_active_children(
        &self,
        parent_ids: &[CompanyId],
    ) -> Result<Vec<CompanyNode>, HierarchyError>;

    /// Lists active nodes without a parent.
    async fn find_active_roots(&self) -> Result<Vec<CompanyNode>, HierarchyError>;

    /// Counts active nodes without a parent.
    async fn count_active_roots(&self) -> Result<u64, HierarchyError> {
        Ok(self.find_active_roots().await?.len() as u64)
    }

    /// Lists every active node.
    async fn list_active(&self) -> Result<Vec<CompanyNode>, HierarchyError>;

    /// Inserts a node.
    ///
    /// Fails with [`HierarchyError::DuplicateCode`] if an active node
    /// already uses the code.
    async fn insert(&self, node: CompanyNode) -> Result<CompanyNode, HierarchyError>;

    /// Replaces a stored node.
    async fn update(&self, node: CompanyNode) -> Result<CompanyNode, HierarchyError>;
}

/// A store that can group writes into one atomic unit.
#[async_trait]
pub trait TransactionalStore: CompanyStore {
    /// The transaction handle. Dropping it without committing discards its writes.
    type Tx: StoreTransaction;

    /// Starts a transaction.
    async fn begin(&self) -> Result<Self::Tx, HierarchyError>;
}

/// A store scoped to one open transaction.
#[async_trait]
pub trait StoreTransaction: CompanyStore + Sized {
    /// Makes every write of the transaction visible.
    async fn commit(self) -> Result<(), HierarchyError>;
}
