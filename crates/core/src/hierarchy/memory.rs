//! In-memory Tree Store.
//!
//! Backs unit and property tests, and any embedding that does not need a
//! database. Transactions take the store's writer gate, work on a private
//! copy and write back only the nodes they changed on commit, so an aborted
//! mutation leaves no trace.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use holdtree_shared::types::CompanyId;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::hierarchy::error::HierarchyError;
use crate::hierarchy::store::{CompanyStore, StoreTransaction, TransactionalStore};
use crate::hierarchy::types::CompanyNode;

type NodeMap = BTreeMap<CompanyId, CompanyNode>;

/// Thread-safe in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryCompanyStore {
    nodes: Arc<RwLock<NodeMap>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryCompanyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `nodes` as-is, without any validation.
    ///
    /// Useful to reproduce corrupted data.
    #[must_use]
    pub fn with_nodes(nodes: impl IntoIterator<Item = CompanyNode>) -> Self {
        let map = nodes.into_iter().map(|n| (n.id, n)).collect();
        Self {
            nodes: Arc::new(RwLock::new(map)),
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Returns every stored node, active or not, ordered by ID.
    pub async fn snapshot(&self) -> Vec<CompanyNode> {
        self.nodes.read().await.values().cloned().collect()
    }
}

/// Open transaction on a [`MemoryCompanyStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<RwLock<NodeMap>>,
    base: NodeMap,
    working: RwLock<NodeMap>,
    _writer: OwnedMutexGuard<()>,
}

#[async_trait]
impl TransactionalStore for MemoryCompanyStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, HierarchyError> {
        let guard = Arc::clone(&self.writer).lock_owned().await;
        let base = self.nodes.read().await.clone();
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.nodes),
            working: RwLock::new(base.clone()),
            base,
            _writer: guard,
        })
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn commit(self) -> Result<(), HierarchyError> {
        let working = self.working.into_inner();
        let mut shared = self.shared.write().await;
        for (id, node) in working {
            if self.base.get(&id) != Some(&node) {
                shared.insert(id, node);
            }
        }
        Ok(())
    }
}

fn sort_by_level_then_name(nodes: &mut [CompanyNode]) {
    nodes.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.name.cmp(&b.name)));
}

fn active_children(map: &NodeMap, parent_ids: &[CompanyId]) -> Vec<CompanyNode> {
    let mut children: Vec<CompanyNode> = map
        .values()
        .filter(|n| n.is_active)
        .filter(|n| n.parent_id.is_some_and(|p| parent_ids.contains(&p)))
        .cloned()
        .collect();
    sort_by_level_then_name(&mut children);
    children
}

fn active_roots(map: &NodeMap) -> Vec<CompanyNode> {
    map.values()
        .filter(|n| n.is_active && n.parent_id.is_none())
        .cloned()
        .collect()
}

fn active_code_holder<'a>(map: &'a NodeMap, code: &str) -> Option<&'a CompanyNode> {
    map.values().find(|n| n.is_active && n.code == code)
}

fn insert_node(map: &mut NodeMap, node: CompanyNode) -> Result<CompanyNode, HierarchyError> {
    if node.is_active && active_code_holder(map, &node.code).is_some() {
        return Err(HierarchyError::DuplicateCode(node.code));
    }
    map.insert(node.id, node.clone());
    Ok(node)
}

fn update_node(map: &mut NodeMap, node: CompanyNode) -> Result<CompanyNode, HierarchyError> {
    if !map.contains_key(&node.id) {
        return Err(HierarchyError::CompanyNotFound(node.id));
    }
    // Mirrors the partial unique index on (code) WHERE is_active.
    if node.is_active
        && active_code_holder(map, &node.code).is_some_and(|holder| holder.id != node.id)
    {
        return Err(HierarchyError::DuplicateCode(node.code));
    }
    map.insert(node.id, node.clone());
    Ok(node)
}

macro_rules! impl_memory_store {
    ($ty:ty, $field:ident) => {
        #[async_trait]
        impl CompanyStore for $ty {
            async fn find_by_id(
                &self,
                id: CompanyId,
            ) -> Result<Option<CompanyNode>, HierarchyError> {
                Ok(self.$field.read().await.get(&id).cloned())
            }

            async fn find_active_by_code(
                &self,
                code: &str,
            ) -> Result<Option<CompanyNode>, HierarchyError> {
                Ok(active_code_holder(&*self.$field.read().await, code).cloned())
            }

            async fn find_active_children(
                &self,
                parent_ids: &[CompanyId],
            ) -> Result<Vec<CompanyNode>, HierarchyError> {
                Ok(active_children(&*self.$field.read().await, parent_ids))
            }

            async fn find_active_roots(&self) -> Result<Vec<CompanyNode>, HierarchyError> {
                Ok(active_roots(&*self.$field.read().await))
            }

            async fn list_active(&self) -> Result<Vec<CompanyNode>, HierarchyError> {
                let mut nodes: Vec<CompanyNode> = self
                    .$field
                    .read()
                    .await
                    .values()
                    .filter(|n| n.is_active)
                    .cloned()
                    .collect();
                sort_by_level_then_name(&mut nodes);
                Ok(nodes)
            }

            async fn insert(&self, node: CompanyNode) -> Result<CompanyNode, HierarchyError> {
                insert_node(&mut *self.$field.write().await, node)
            }

            async fn update(&self, node: CompanyNode) -> Result<CompanyNode, HierarchyError> {
                update_node(&mut *self.$field.write().await, node)
            }
        }
    };
}

impl_memory_store!(MemoryCompanyStore, nodes);
impl_memory_store!(MemoryTransaction, working);
