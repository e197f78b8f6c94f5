//! Level Consistency Engine.
//!
//! `level` is cached data derived from the parent chain. After a structural
//! change the engine recomputes it for the affected subtree with a bounded
//! fixed-point loop: each pass re-reads parents and rewrites every level that
//! disagrees, and the loop ends on the first pass that changes nothing.

use std::collections::{HashMap, HashSet, VecDeque};

use holdtree_shared::{HierarchyConfig, types::CompanyId};
use tracing::{debug, error, info, warn};

use crate::hierarchy::error::HierarchyError;
use crate::hierarchy::store::CompanyStore;
use crate::hierarchy::traversal::TraversalEngine;
use crate::hierarchy::types::{CompanyNode, LevelMismatch, RepairReport};

/// Outcome of a single pass.
#[derive(Debug, Default)]
struct PassOutcome {
    corrected: usize,
    first_corrected: Option<CompanyId>,
}

/// Orders `nodes` so every parent in the set precedes its children.
///
/// Nodes whose parent lies outside the set start the order. The second
/// vector holds the IDs never reached from such a start: members of a
/// parent cycle and whatever hangs below one, in input order.
fn parents_first(nodes: Vec<CompanyNode>) -> (Vec<CompanyNode>, Vec<CompanyId>) {
    let ids: HashSet<CompanyId> = nodes.iter().map(|n| n.id).collect();
    let mut children: HashMap<CompanyId, Vec<usize>> = HashMap::new();
    let mut queue = VecDeque::new();
    for (i, node) in nodes.iter().enumerate() {
        match node.parent_id.filter(|p| ids.contains(p)) {
            Some(parent_id) => children.entry(parent_id).or_default().push(i),
            None => queue.push_back(i),
        }
    }

    let mut placed = vec![false; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(i) = queue.pop_front() {
        if std::mem::replace(&mut placed[i], true) {
            continue;
        }
        order.push(i);
        if let Some(kids) = children.get(&nodes[i].id) {
            queue.extend(kids.iter().copied());
        }
    }
    let looped: Vec<CompanyId> = nodes
        .iter()
        .zip(&placed)
        .filter(|&(_, &done)| !done)
        .map(|(n, _)| n.id)
        .collect();

    let mut slots: Vec<Option<CompanyNode>> = nodes.into_iter().map(Some).collect();
    let ordered = order.into_iter().filter_map(|i| slots[i].take()).collect();
    (ordered, looped)
}

/// Recomputes cached levels through a [`CompanyStore`].
pub struct LevelRepairEngine<'s, S: ?Sized> {
    store: &'s S,
    config: HierarchyConfig,
}

impl<'s, S: CompanyStore + ?Sized> LevelRepairEngine<'s, S> {
    /// Creates an engine writing through `store`.
    pub fn new(store: &'s S, config: HierarchyConfig) -> Self {
        Self { store, config }
    }

    /// Realigns the levels of `id` and every active node below it.
    ///
    /// Roots are skipped: their level is pinned to zero by whoever made them
    /// root.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::ConsistencyRepairExhausted`] if the pass
    /// budget runs out before a pass completes without corrections, or if
    /// the subtree contains a parent cycle.
    pub async fn repair(&self, id: CompanyId) -> Result<RepairReport, HierarchyError> {
        let node = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(HierarchyError::CompanyNotFound(id))?;
        if node.is_root() {
            debug!(company_id = %id, "Skipping level repair for root company");
            return Ok(RepairReport::skipped());
        }

        let traversal = TraversalEngine::new(self.store, self.config);
        let mut report = RepairReport::default();

        for pass in 1..=self.config.max_repair_passes {
            report.passes = pass;

            let Some(head) = self.store.find_by_id(id).await? else {
                return Err(HierarchyError::CompanyNotFound(id));
            };
            let mut subtree = vec![head];
            subtree.extend(traversal.descendants(id).await?);
            let size = subtree.len();

            let outcome = self.run_pass(pass, subtree, &mut report).await?;
            debug!(
                company_id = %id,
                pass,
                nodes = size,
                corrected = outcome.corrected,
                "Level repair pass"
            );
            if outcome.corrected == 0 {
                if report.corrected > 0 {
                    info!(
                        company_id = %id,
                        passes = pass,
                        corrected = report.corrected,
                        "Subtree levels repaired"
                    );
                }
                return Ok(report);
            }
        }

        error!(
            company_id = %id,
            passes = self.config.max_repair_passes,
            corrected = report.corrected,
            "Level repair did not converge"
        );
        Err(HierarchyError::ConsistencyRepairExhausted {
            company_id: id,
            passes: self.config.max_repair_passes,
        })
    }

    /// Realigns every active node: roots to zero, then children to their
    /// parent's level plus one until nothing changes.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::ConsistencyRepairExhausted`] if the pass
    /// budget runs out or an active parent cycle exists.
    pub async fn repair_all(&self) -> Result<RepairReport, HierarchyError> {
        let mut report = RepairReport::default();

        let roots = self.store.find_active_roots().await?;
        let mut anchor = roots.first().map(|r| r.id);
        if roots.len() > 1 {
            warn!(roots = roots.len(), "More than one active root company");
        }
        for mut root in roots {
            if root.level != 0 {
                info!(
                    company_id = %root.id,
                    code = %root.code,
                    from = root.level,
                    "Resetting root level to 0"
                );
                root.level = 0;
                root.touch();
                self.store.update(root).await?;
                report.corrected += 1;
            }
        }

        for pass in 1..=self.config.max_repair_passes {
            report.passes = pass;
            let nodes = self.store.list_active().await?;
            let size = nodes.len();
            let outcome = self.run_pass(pass, nodes, &mut report).await?;
            debug!(
                pass,
                nodes = size,
                corrected = outcome.corrected,
                "Full level repair pass"
            );
            if outcome.corrected == 0 {
                info!(passes = pass, corrected = report.corrected, "Full level repair complete");
                return Ok(report);
            }
            if anchor.is_none() {
                anchor = outcome.first_corrected;
            }
        }

        error!(
            passes = self.config.max_repair_passes,
            corrected = report.corrected,
            "Full level repair did not converge"
        );
        match anchor {
            Some(company_id) => Err(HierarchyError::ConsistencyRepairExhausted {
                company_id,
                passes: self.config.max_repair_passes,
            }),
            None => Ok(report),
        }
    }

    /// Lists every active node whose stored level disagrees with its parent's.
    ///
    /// Read-only; nodes with an unresolvable parent are left out.
    pub async fn audit(&self) -> Result<Vec<LevelMismatch>, HierarchyError> {
        let nodes = self.store.list_active().await?;
        let levels: HashMap<CompanyId, u32> = nodes.iter().map(|n| (n.id, n.level)).collect();

        let mismatches: Vec<LevelMismatch> = nodes
            .iter()
            .filter_map(|node| {
                let expected = match node.parent_id {
                    None => 0,
                    Some(parent_id) => self.config.child_level(*levels.get(&parent_id)?).0,
                };
                (expected != node.level).then(|| LevelMismatch {
                    company_id: node.id,
                    code: node.code.clone(),
                    stored_level: node.level,
                    expected_level: expected,
                })
            })
            .collect();

        if !mismatches.is_empty() {
            warn!(count = mismatches.len(), "Companies with inconsistent levels");
        }
        Ok(mismatches)
    }

    /// One pass over `nodes`: every non-root node gets its parent's level
    /// plus one. Parents are visited before their children, so on an acyclic
    /// tree a single pass is enough and the next one only confirms it.
    ///
    /// A parent cycle has no fixed point short of the level cap, so it fails
    /// the pass before anything is written.
    async fn run_pass(
        &self,
        pass: u32,
        nodes: Vec<CompanyNode>,
        report: &mut RepairReport,
    ) -> Result<PassOutcome, HierarchyError> {
        let mut levels: HashMap<CompanyId, u32> = nodes.iter().map(|n| (n.id, n.level)).collect();
        let mut outcome = PassOutcome::default();

        let (ordered, looped) = parents_first(nodes);
        if let Some(&company_id) = looped.first() {
            error!(
                company_id = %company_id,
                companies = looped.len(),
                pass,
                "Parent chain loops back on itself, level repair aborted"
            );
            return Err(HierarchyError::ConsistencyRepairExhausted {
                company_id,
                passes: pass,
            });
        }

        for mut node in ordered {
            let Some(parent_id) = node.parent_id else {
                continue;
            };
            let parent_level = match levels.get(&parent_id) {
                Some(level) => *level,
                None => match self.store.find_by_id(parent_id).await? {
                    Some(parent) if parent.is_active => parent.level,
                    _ => {
                        warn!(
                            company_id = %node.id,
                            parent_id = %parent_id,
                            "Cannot resolve parent during level repair, skipping"
                        );
                        continue;
                    }
                },
            };

            let (expected, clamped) = self.config.child_level(parent_level);
            if clamped && !report.clamped.contains(&node.id) {
                warn!(
                    company_id = %node.id,
                    code = %node.code,
                    max_level = self.config.max_level,
                    "Company level exceeds maximum, clamping"
                );
                report.clamped.push(node.id);
            }
            if expected == node.level {
                continue;
            }

            debug!(company_id = %node.id, from = node.level, to = expected, "Correcting level");
            node.level = expected;
            node.touch();
            levels.insert(node.id, expected);
            outcome.corrected += 1;
            outcome.first_corrected.get_or_insert(node.id);
            self.store.update(node).await?;
        }

        report.corrected += outcome.corrected;
        Ok(outcome)
    }
}
