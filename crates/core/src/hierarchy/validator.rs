//! Hierarchy Invariant Validator.
//!
//! Gates every mutation: single active root, no cycles, unique codes among
//! active nodes. The validator only rejects; it never repairs or demotes.

use holdtree_shared::{HierarchyConfig, types::CompanyId};

use crate::hierarchy::error::HierarchyError;
use crate::hierarchy::store::CompanyStore;
use crate::hierarchy::traversal::TraversalEngine;
use crate::hierarchy::types::{CompanyNode, NewCompany};

/// Maximum length of a company code.
pub const MAX_CODE_LEN: usize = 50;

/// Where a node may be placed, as computed by the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// The resolved parent, `None` for a root placement.
    pub parent: Option<CompanyNode>,
    /// Level the node gets at this placement.
    pub level: u32,
    /// True if the level was clamped to the configured maximum.
    pub clamped: bool,
}

impl Placement {
    fn root() -> Self {
        Self {
            parent: None,
            level: 0,
            clamped: false,
        }
    }

    /// The parent ID of this placement.
    #[must_use]
    pub fn parent_id(&self) -> Option<CompanyId> {
        self.parent.as_ref().map(|p| p.id)
    }
}

/// Normalizes a company code and checks its shape.
///
/// # Errors
///
/// Returns [`HierarchyError::InvalidCode`] for an empty, overlong or
/// whitespace-containing code.
pub fn normalize_code(code: &str) -> Result<String, HierarchyError> {
    let trimmed = code.trim();
    if trimmed.is_empty()
        || trimmed.chars().count() > MAX_CODE_LEN
        || trimmed.chars().any(char::is_whitespace)
    {
        return Err(HierarchyError::InvalidCode(code.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Invariant checks run before any write.
pub struct HierarchyValidator<'s, S: ?Sized> {
    store: &'s S,
    config: HierarchyConfig,
}

impl<'s, S: CompanyStore + ?Sized> HierarchyValidator<'s, S> {
    /// Creates a validator reading from `store`.
    pub fn new(store: &'s S, config: HierarchyConfig) -> Self {
        Self { store, config }
    }

    /// Fails if an active node other than `except` holds `code`.
    pub async fn ensure_code_available(
        &self,
        code: &str,
        except: Option<CompanyId>,
    ) -> Result<(), HierarchyError> {
        match self.store.find_active_by_code(code).await? {
            Some(holder) if Some(holder.id) != except => {
                Err(HierarchyError::DuplicateCode(code.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Fails if an active root other than `except` exists.
    pub async fn ensure_root_slot_free(
        &self,
        except: Option<CompanyId>,
    ) -> Result<(), HierarchyError> {
        let roots = self.store.find_active_roots().await?;
        match roots.into_iter().find(|r| Some(r.id) != except) {
            Some(existing) => Err(HierarchyError::MultipleRootsNotAllowed {
                existing: existing.id,
            }),
            None => Ok(()),
        }
    }

    /// Loads `parent_id`, which must exist and be active.
    pub async fn resolve_active_parent(
        &self,
        parent_id: CompanyId,
    ) -> Result<CompanyNode, HierarchyError> {
        match self.store.find_by_id(parent_id).await? {
            Some(parent) if parent.is_active => Ok(parent),
            _ => Err(HierarchyError::ParentNotFound(parent_id)),
        }
    }

    async fn lineage_contains(
        &self,
        start: CompanyId,
        needle: CompanyId,
    ) -> Result<bool, HierarchyError> {
        TraversalEngine::new(self.store, self.config)
            .lineage_contains(start, needle)
            .await
    }

    fn place_under(&self, parent: CompanyNode) -> Placement {
        let (level, clamped) = self.config.child_level(parent.level);
        Placement {
            parent: Some(parent),
            level,
            clamped,
        }
    }

    /// Checks a create request and computes the new node's placement.
    ///
    /// The returned code is the normalized one.
    pub async fn validate_create(
        &self,
        input: &NewCompany,
    ) -> Result<(String, Placement), HierarchyError> {
        let code = normalize_code(&input.code)?;
        self.ensure_code_available(&code, None).await?;

        let placement = match input.parent_id {
            None => {
                self.ensure_root_slot_free(None).await?;
                Placement::root()
            }
            Some(parent_id) => self.place_under(self.resolve_active_parent(parent_id).await?),
        };
        Ok((code, placement))
    }

    /// Checks moving `node` under `new_parent` (`None` promotes it to root).
    ///
    /// A promotion while another root is active fails with
    /// [`HierarchyError::MultipleRootsNotAllowed`] naming that root; what to
    /// do about it is the caller's decision.
    pub async fn validate_reparent(
        &self,
        node: &CompanyNode,
        new_parent: Option<CompanyId>,
    ) -> Result<Placement, HierarchyError> {
        if !node.is_active {
            return Err(HierarchyError::CompanyInactive(node.id));
        }

        let Some(target_id) = new_parent else {
            self.ensure_root_slot_free(Some(node.id)).await?;
            return Ok(Placement::root());
        };

        let cycle = HierarchyError::CycleDetected {
            company_id: node.id,
            target_parent_id: target_id,
        };
        if target_id == node.id {
            return Err(cycle);
        }

        let parent = self.resolve_active_parent(target_id).await?;
        // Inactive links count too: the target may sit below `node` behind a
        // soft-deleted company.
        if self.lineage_contains(target_id, node.id).await? {
            return Err(cycle);
        }

        if node.is_root() {
            return Err(HierarchyError::RootRequired(node.id));
        }

        Ok(self.place_under(parent))
    }

    /// Checks bringing a soft-deleted node back into the active tree.
    pub async fn validate_reactivate(
        &self,
        node: &CompanyNode,
    ) -> Result<Placement, HierarchyError> {
        self.ensure_code_available(&node.code, Some(node.id)).await?;
        match node.parent_id {
            None => {
                self.ensure_root_slot_free(Some(node.id)).await?;
                Ok(Placement::root())
            }
            Some(parent_id) => {
                let parent = self.resolve_active_parent(parent_id).await?;
                if self.lineage_contains(parent_id, node.id).await? {
                    return Err(HierarchyError::CycleDetected {
                        company_id: node.id,
                        target_parent_id: parent_id,
                    });
                }
                Ok(self.place_under(parent))
            }
        }
    }

    /// Checks changing the code of `node`.
    pub async fn validate_rename(
        &self,
        node: &CompanyNode,
        new_code: &str,
    ) -> Result<String, HierarchyError> {
        if !node.is_active {
            return Err(HierarchyError::CompanyInactive(node.id));
        }
        let code = normalize_code(new_code)?;
        self.ensure_code_available(&code, Some(node.id)).await?;
        Ok(code)
    }
}
