//! Property-based tests for HierarchyService.
//!
//! Random trees are built through the service, then hit with random
//! re-parent, promotion, deactivation and reactivation sequences. After
//! every operation, accepted or rejected, stored parent chains must be
//! acyclic, the tree must have one root, and the part still attached to the
//! root must have consistent levels and a transitively closed descendant
//! relation.

use std::collections::BTreeSet;

use holdtree_shared::{HierarchyConfig, RootPolicy, types::CompanyId};
use proptest::prelude::*;
use proptest::sample::Index;

use crate::hierarchy::error::HierarchyError;
use crate::hierarchy::memory::MemoryCompanyStore;
use crate::hierarchy::service::HierarchyService;
use crate::hierarchy::store::CompanyStore;
use crate::hierarchy::types::NewCompany;

type Service = HierarchyService<MemoryCompanyStore>;

#[derive(Debug, Clone)]
enum Op {
    Move(Index, Index),
    Promote(Index),
    Deactivate(Index),
    Reactivate(Index),
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

fn config(policy: RootPolicy) -> HierarchyConfig {
    HierarchyConfig {
        max_traversal_depth: 64,
        root_policy: policy,
        ..HierarchyConfig::default()
    }
}

/// Strategy for tree shapes: entry `i` picks the parent of node `i + 1`
/// among the nodes created before it.
fn arb_shape() -> impl Strategy<Value = Vec<Index>> {
    prop::collection::vec(any::<Index>(), 0..24)
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (any::<Index>(), any::<Index>()).prop_map(|(node, target)| Op::Move(node, target)),
        1 => any::<Index>().prop_map(Op::Promote),
        2 => any::<Index>().prop_map(Op::Deactivate),
        2 => any::<Index>().prop_map(Op::Reactivate),
    ]
}

async fn build(service: &Service, shape: &[Index]) -> Vec<CompanyId> {
    let root = service
        .create_node(NewCompany::root("N00", "N00"))
        .await
        .unwrap();
    let mut ids = vec![root.id];
    for (i, pick) in shape.iter().enumerate() {
        let parent = ids[pick.index(ids.len())];
        let code = format!("N{:02}", i + 1);
        let node = service
            .create_node(NewCompany::child(code.clone(), code, parent))
            .await
            .unwrap();
        ids.push(node.id);
    }
    ids
}

async fn descendant_set(service: &Service, id: CompanyId) -> BTreeSet<CompanyId> {
    service
        .descendants(id)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect()
}

/// True if `needle` is `start` or on its stored parent chain, active or not.
async fn on_stored_chain(service: &Service, start: CompanyId, needle: CompanyId) -> bool {
    let store = service.backend();
    let mut cursor = Some(start);
    let mut hops = 0;
    while let Some(id) = cursor {
        if id == needle {
            return true;
        }
        hops += 1;
        assert!(hops <= 64, "stored parent chain loops");
        cursor = store.find_by_id(id).await.unwrap().unwrap().parent_id;
    }
    false
}

async fn check_invariants(service: &Service, ids: &[CompanyId]) -> Result<(), TestCaseError> {
    let store = service.backend();
    let roots = store.find_active_roots().await.unwrap();
    prop_assert_eq!(roots.len(), 1);
    let root = roots[0].id;
    let max_level = service.config().max_level;
    let mut attached = BTreeSet::new();

    for &id in ids {
        let node = store.find_by_id(id).await.unwrap().unwrap();

        // Follow stored parent pointers by hand, through inactive nodes too;
        // they must reach the root.
        let mut depth = 0u32;
        let mut all_active = node.is_active;
        let mut cursor = node.parent_id;
        while let Some(parent_id) = cursor {
            depth += 1;
            prop_assert!(depth as usize <= ids.len(), "parent chain of {} loops", node.code);
            let parent = store.find_by_id(parent_id).await.unwrap().unwrap();
            all_active &= parent.is_active;
            cursor = parent.parent_id;
        }
        if !node.is_active {
            continue;
        }

        let below = descendant_set(service, id).await;
        prop_assert!(!below.contains(&id));
        for &d in &below {
            prop_assert!(descendant_set(service, d).await.is_subset(&below));
        }

        if all_active {
            prop_assert_eq!(node.level, depth.min(max_level));
            if id != root {
                attached.insert(id);
            }
        }
    }

    prop_assert_eq!(descendant_set(service, root).await, attached);
    prop_assert!(service.audit_levels().await.unwrap().is_empty());
    Ok(())
}

async fn apply(service: &Service, ids: &[CompanyId], op: &Op) -> Result<(), TestCaseError> {
    match op {
        Op::Move(pick_node, pick_target) => {
            let node = ids[pick_node.index(ids.len())];
            let target = ids[pick_target.index(ids.len())];
            let before = service.get(node).await.unwrap();
            let target_active = service.get(target).await.unwrap().is_active;
            let would_cycle = on_stored_chain(service, target, node).await;

            let result = service.reparent_node(node, Some(target)).await;
            if !before.is_active {
                prop_assert!(
                    matches!(result, Err(HierarchyError::CompanyInactive(_))),
                    "expected inactive rejection, got {:?}",
                    result
                );
            } else if before.parent_id == Some(target) {
                let outcome = result.map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(outcome.repair.corrected, 0);
            } else if node == target || (target_active && would_cycle) {
                prop_assert!(
                    matches!(result, Err(HierarchyError::CycleDetected { .. })),
                    "expected cycle rejection, got {:?}",
                    result
                );
            } else if !target_active {
                prop_assert!(
                    matches!(result, Err(HierarchyError::ParentNotFound(_))),
                    "expected missing parent, got {:?}",
                    result
                );
            } else {
                let outcome = result.map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(outcome.company.parent_id, Some(target));
                prop_assert_eq!(outcome.previous_parent_id, before.parent_id);
            }
        }
        Op::Promote(pick_node) => {
            let node = ids[pick_node.index(ids.len())];
            let before = service.get(node).await.unwrap();
            let result = service.reparent_node(node, None).await;

            if !before.is_active {
                prop_assert!(
                    matches!(result, Err(HierarchyError::CompanyInactive(_))),
                    "expected inactive rejection, got {:?}",
                    result
                );
            } else if before.is_root() {
                prop_assert!(result.is_ok());
            } else if service.config().root_policy == RootPolicy::DemoteExisting {
                let outcome = result.map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert!(outcome.company.is_root());
                prop_assert!(outcome.demoted_root_id.is_some());
            } else {
                prop_assert!(
                    matches!(result, Err(HierarchyError::MultipleRootsNotAllowed { .. })),
                    "expected root rejection, got {:?}",
                    result
                );
            }
        }
        Op::Deactivate(pick_node) => {
            let node = ids[pick_node.index(ids.len())];
            let before = service.get(node).await.unwrap();
            let result = service.deactivate_node(node).await;

            if before.is_active && before.is_root() {
                prop_assert!(
                    matches!(result, Err(HierarchyError::RootRequired(_))),
                    "expected root rejection, got {:?}",
                    result
                );
            } else {
                let after = result.map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert!(!after.is_active);
            }
        }
        Op::Reactivate(pick_node) => {
            let node = ids[pick_node.index(ids.len())];
            let before = service.get(node).await.unwrap();
            let parent_active = match before.parent_id {
                Some(parent_id) => service.get(parent_id).await.unwrap().is_active,
                None => true,
            };
            let result = service.reactivate_node(node).await;

            if before.is_active || parent_active {
                // Moves never close a loop, so reactivation never finds one.
                let after = result.map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert!(after.is_active);
            } else {
                prop_assert!(
                    matches!(result, Err(HierarchyError::ParentNotFound(_))),
                    "expected missing parent, got {:?}",
                    result
                );
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // =========================================================================
    // Trees built through the service satisfy every structural invariant
    // =========================================================================

    #[test]
    fn prop_random_trees_are_consistent(shape in arb_shape()) {
        runtime().block_on(async {
            let service = HierarchyService::new(MemoryCompanyStore::new(), config(RootPolicy::Reject));
            let ids = build(&service, &shape).await;
            check_invariants(&service, &ids).await
        })?;
    }

    // =========================================================================
    // Mutation sequences never break the invariants, and cycles are always
    // rejected, soft-deleted links included
    // =========================================================================

    #[test]
    fn prop_reparent_sequences_keep_invariants(
        shape in arb_shape(),
        ops in prop::collection::vec(arb_op(), 1..12),
        demote in any::<bool>(),
    ) {
        let policy = if demote { RootPolicy::DemoteExisting } else { RootPolicy::Reject };
        runtime().block_on(async {
            let service = HierarchyService::new(MemoryCompanyStore::new(), config(policy));
            let ids = build(&service, &shape).await;

            for op in &ops {
                apply(&service, &ids, op).await?;
                check_invariants(&service, &ids).await?;
            }

            // The closure is already a fixed point.
            let report = service.repair_all().await.unwrap();
            prop_assert_eq!(report.corrected, 0);
            Ok::<(), TestCaseError>(())
        })?;
    }

    // =========================================================================
    // Descendant walks are deterministic
    // =========================================================================

    #[test]
    fn prop_descendants_are_stable(shape in arb_shape(), pick in any::<Index>()) {
        runtime().block_on(async {
            let service = HierarchyService::new(MemoryCompanyStore::new(), config(RootPolicy::Reject));
            let ids = build(&service, &shape).await;
            let id = ids[pick.index(ids.len())];

            let first = service.descendants(id).await.unwrap();
            let second = service.descendants(id).await.unwrap();
            prop_assert_eq!(first, second);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
