//! Traversal Engine: descendant and ancestor closures over the active tree.
//!
//! Both directions are explicit bounded walks over parent pointers, one
//! store query per level, so they behave the same on every storage backend
//! and terminate on corrupted data. Hitting a cap truncates the result and
//! logs a warning; read paths never fail because the tree is malformed.

use std::collections::{BTreeSet, HashSet};

use holdtree_shared::{HierarchyConfig, types::CompanyId};
use tracing::{debug, warn};

use crate::hierarchy::error::HierarchyError;
use crate::hierarchy::store::CompanyStore;
use crate::hierarchy::types::CompanyNode;

/// Result of a downward walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescendantWalk {
    /// Reached nodes, ordered by level then name.
    pub nodes: Vec<CompanyNode>,
    /// True if unexpanded nodes remained when the depth cap was hit.
    pub depth_capped: bool,
    /// True if the result-size cap cut the walk short.
    pub size_capped: bool,
}

impl DescendantWalk {
    /// Returns true if the walk did not see the whole subtree.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.depth_capped || self.size_capped
    }
}

/// Bounded breadth-first traversal over a [`CompanyStore`].
pub struct TraversalEngine<'s, S: ?Sized> {
    store: &'s S,
    config: HierarchyConfig,
}

impl<'s, S: CompanyStore + ?Sized> TraversalEngine<'s, S> {
    /// Creates an engine reading from `store` with the bounds in `config`.
    pub fn new(store: &'s S, config: HierarchyConfig) -> Self {
        Self { store, config }
    }

    /// Every active node below `id`, ordered by level then name.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails.
    pub async fn descendants(&self, id: CompanyId) -> Result<Vec<CompanyNode>, HierarchyError> {
        Ok(self.walk_down(id).await?.nodes)
    }

    /// IDs of every active node below `id`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails.
    pub async fn descendant_ids(&self, id: CompanyId) -> Result<BTreeSet<CompanyId>, HierarchyError> {
        Ok(self
            .walk_down(id)
            .await?
            .nodes
            .into_iter()
            .map(|n| n.id)
            .collect())
    }

    /// Walks down from `id` one frontier at a time.
    ///
    /// `id` itself is never part of the result, even when corrupted data
    /// loops back to it.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails.
    pub async fn walk_down(&self, id: CompanyId) -> Result<DescendantWalk, HierarchyError> {
        let mut walk = DescendantWalk::default();
        let mut visited: HashSet<CompanyId> = HashSet::from([id]);
        let mut frontier = vec![id];
        let mut depth = 0u32;

        while !frontier.is_empty() {
            if depth >= self.config.max_traversal_depth {
                let remaining = self.store.find_active_children(&frontier).await?;
                if remaining.iter().any(|c| !visited.contains(&c.id)) {
                    walk.depth_capped = true;
                    warn!(
                        company_id = %id,
                        max_depth = self.config.max_traversal_depth,
                        "Descendant walk hit the depth cap, result truncated"
                    );
                }
                break;
            }

            let children = self.store.find_active_children(&frontier).await?;
            let mut next = Vec::with_capacity(children.len());
            for child in children {
                if !visited.insert(child.id) {
                    continue;
                }
                if walk.nodes.len() >= self.config.max_descendants {
                    walk.size_capped = true;
                    break;
                }
                next.push(child.id);
                walk.nodes.push(child);
            }

            if walk.size_capped {
                warn!(
                    company_id = %id,
                    max_descendants = self.config.max_descendants,
                    "Descendant walk hit the result cap, result truncated"
                );
                break;
            }

            frontier = next;
            depth += 1;
        }

        walk.nodes
            .sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.name.cmp(&b.name)));
        debug!(
            company_id = %id,
            descendants = walk.nodes.len(),
            depth,
            "Descendant walk complete"
        );
        Ok(walk)
    }

    /// Active ancestors of `id`, nearest parent first.
    ///
    /// The walk stops at the first missing or inactive parent, at a repeated
    /// node, or at the depth cap. An unknown `id` has no ancestors.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails.
    pub async fn ancestors(&self, id: CompanyId) -> Result<Vec<CompanyNode>, HierarchyError> {
        let Some(start) = self.store.find_by_id(id).await? else {
            return Ok(Vec::new());
        };

        let mut chain = Vec::new();
        let mut seen: HashSet<CompanyId> = HashSet::from([id]);
        let mut next = start.parent_id;
        let mut hops = 0u32;

        while let Some(parent_id) = next {
            if hops >= self.config.max_traversal_depth {
                warn!(
                    company_id = %id,
                    max_depth = self.config.max_traversal_depth,
                    "Ancestor walk hit the depth cap, result truncated"
                );
                break;
            }
            if !seen.insert(parent_id) {
                warn!(
                    company_id = %id,
                    repeated_id = %parent_id,
                    "Cycle found while walking ancestors"
                );
                break;
            }

            let Some(parent) = self.store.find_by_id(parent_id).await? else {
                warn!(company_id = %id, parent_id = %parent_id, "Dangling parent reference");
                break;
            };
            if !parent.is_active {
                break;
            }

            next = parent.parent_id;
            chain.push(parent);
            hops += 1;
        }

        Ok(chain)
    }

    /// Returns true if `needle` is `start` or lies on the stored parent chain
    /// above it.
    ///
    /// Unlike [`Self::ancestors`] the walk goes through inactive nodes, since
    /// a soft-deleted link is restored as-is on reactivation. It ends at a
    /// root, a dangling reference or a repeated node.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails.
    pub async fn lineage_contains(
        &self,
        start: CompanyId,
        needle: CompanyId,
    ) -> Result<bool, HierarchyError> {
        let mut seen: HashSet<CompanyId> = HashSet::new();
        let mut next = Some(start);

        while let Some(id) = next {
            if id == needle {
                return Ok(true);
            }
            if !seen.insert(id) {
                warn!(
                    company_id = %start,
                    repeated_id = %id,
                    "Cycle found in stored parent chain"
                );
                return Ok(false);
            }
            next = self.store.find_by_id(id).await?.and_then(|n| n.parent_id);
        }

        Ok(false)
    }

    /// Returns true if `candidate_id` is among the descendants of `ancestor_id`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails.
    pub async fn is_descendant_of(
        &self,
        candidate_id: CompanyId,
        ancestor_id: CompanyId,
    ) -> Result<bool, HierarchyError> {
        if candidate_id == ancestor_id {
            return Ok(false);
        }
        Ok(self
            .walk_down(ancestor_id)
            .await?
            .nodes
            .iter()
            .any(|n| n.id == candidate_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::memory::MemoryCompanyStore;

    fn node(code: &str, parent: Option<&CompanyNode>) -> CompanyNode {
        let level = parent.map_or(0, |p| p.level + 1);
        CompanyNode::new(code, code, parent.map(|p| p.id), level)
    }

    /// PDV -> (ENU -> ENU-EXP), PTG
    fn sample() -> (MemoryCompanyStore, [CompanyNode; 4]) {
        let h = node("PDV", None);
        let a = node("ENU", Some(&h));
        let b = node("ENU-EXP", Some(&a));
        let c = node("PTG", Some(&h));
        let store =
            MemoryCompanyStore::with_nodes([h.clone(), a.clone(), b.clone(), c.clone()]);
        (store, [h, a, b, c])
    }

    fn chain(len: usize) -> Vec<CompanyNode> {
        let mut nodes: Vec<CompanyNode> = vec![node("N0", None)];
        for i in 1..len {
            let next = node(&format!("N{i}"), nodes.last());
            nodes.push(next);
        }
        nodes
    }

    #[tokio::test]
    async fn test_descendants_ordered_by_level_then_name() {
        let (store, [h, a, b, c]) = sample();
        let engine = TraversalEngine::new(&store, HierarchyConfig::default());

        let ids: Vec<_> = engine
            .descendants(h.id)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![a.id, c.id, b.id]);
    }

    #[tokio::test]
    async fn test_ancestors_nearest_first() {
        let (store, [h, a, b, _]) = sample();
        let engine = TraversalEngine::new(&store, HierarchyConfig::default());

        let ids: Vec<_> = engine
            .ancestors(b.id)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![a.id, h.id]);
        assert!(engine.ancestors(h.id).await.unwrap().is_empty());
        assert!(engine.ancestors(CompanyId::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_is_descendant_of() {
        let (store, [h, a, b, c]) = sample();
        let engine = TraversalEngine::new(&store, HierarchyConfig::default());

        assert!(engine.is_descendant_of(b.id, h.id).await.unwrap());
        assert!(engine.is_descendant_of(b.id, a.id).await.unwrap());
        assert!(!engine.is_descendant_of(b.id, c.id).await.unwrap());
        assert!(!engine.is_descendant_of(h.id, b.id).await.unwrap());
        assert!(!engine.is_descendant_of(h.id, h.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_inactive_node_hides_its_subtree() {
        let (store, [h, a, b, c]) = sample();
        let mut gone = a.clone();
        gone.is_active = false;
        store.update(gone).await.unwrap();
        let engine = TraversalEngine::new(&store, HierarchyConfig::default());

        let ids: Vec<_> = engine
            .descendants(h.id)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![c.id]);
        assert!(engine.ancestors(b.id).await.unwrap().is_empty());
        // Still stored.
        assert!(store.find_by_id(a.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lineage_walks_through_inactive_nodes() {
        let (store, [h, a, b, c]) = sample();
        let mut gone = a.clone();
        gone.is_active = false;
        store.update(gone).await.unwrap();
        let engine = TraversalEngine::new(&store, HierarchyConfig::default());

        assert!(engine.lineage_contains(b.id, a.id).await.unwrap());
        assert!(engine.lineage_contains(b.id, h.id).await.unwrap());
        assert!(engine.lineage_contains(b.id, b.id).await.unwrap());
        assert!(!engine.lineage_contains(b.id, c.id).await.unwrap());
        assert!(!engine.lineage_contains(h.id, a.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_lineage_stops_on_corrupted_loop() {
        let mut a = node("A", None);
        let mut b = node("B", None);
        a.parent_id = Some(b.id);
        b.parent_id = Some(a.id);
        let c = node("C", Some(&a));
        let store = MemoryCompanyStore::with_nodes([a.clone(), b.clone(), c.clone()]);
        let engine = TraversalEngine::new(&store, HierarchyConfig::default());

        assert!(engine.lineage_contains(c.id, b.id).await.unwrap());
        assert!(!engine.lineage_contains(a.id, CompanyId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_depth_cap_truncates() {
        let nodes = chain(6);
        let store = MemoryCompanyStore::with_nodes(nodes.clone());
        let config = HierarchyConfig {
            max_traversal_depth: 3,
            ..HierarchyConfig::default()
        };
        let engine = TraversalEngine::new(&store, config);

        let walk = engine.walk_down(nodes[0].id).await.unwrap();
        assert_eq!(walk.nodes.len(), 3);
        assert!(walk.depth_capped);
        assert!(!walk.size_capped);

        let ancestors = engine.ancestors(nodes[5].id).await.unwrap();
        assert_eq!(ancestors.len(), 3);
        assert_eq!(ancestors[0].id, nodes[4].id);
    }

    #[tokio::test]
    async fn test_depth_cap_not_flagged_when_subtree_fits_exactly() {
        let nodes = chain(4);
        let store = MemoryCompanyStore::with_nodes(nodes.clone());
        let config = HierarchyConfig {
            max_traversal_depth: 3,
            ..HierarchyConfig::default()
        };
        let walk = TraversalEngine::new(&store, config)
            .walk_down(nodes[0].id)
            .await
            .unwrap();
        assert_eq!(walk.nodes.len(), 3);
        assert!(!walk.is_truncated());
    }

    #[tokio::test]
    async fn test_size_cap_truncates() {
        let h = node("PDV", None);
        let mut nodes = vec![h.clone()];
        for i in 0..10 {
            nodes.push(node(&format!("C{i:02}"), Some(&h)));
        }
        let store = MemoryCompanyStore::with_nodes(nodes);
        let config = HierarchyConfig {
            max_descendants: 4,
            ..HierarchyConfig::default()
        };

        let walk = TraversalEngine::new(&store, config)
            .walk_down(h.id)
            .await
            .unwrap();
        assert_eq!(walk.nodes.len(), 4);
        assert!(walk.size_capped);
    }

    #[tokio::test]
    async fn test_cycle_terminates_and_excludes_origin() {
        let mut a = node("A", None);
        let mut b = node("B", None);
        a.parent_id = Some(b.id);
        b.parent_id = Some(a.id);
        let store = MemoryCompanyStore::with_nodes([a.clone(), b.clone()]);
        let engine = TraversalEngine::new(&store, HierarchyConfig::default());

        let down: Vec<_> = engine
            .descendants(a.id)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(down, vec![b.id]);

        let up: Vec<_> = engine
            .ancestors(a.id)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(up, vec![b.id]);
    }
}
