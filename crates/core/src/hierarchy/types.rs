//! Hierarchy domain types.

use chrono::{DateTime, Utc};
use holdtree_shared::types::CompanyId;
use serde::{Deserialize, Serialize};

/// One company in the organizational tree.
///
/// `level` is derived data: it mirrors the number of parent hops to the
/// root and is only ever rewritten by the level repair engine or when the
/// node is created or moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyNode {
    /// Immutable identifier.
    pub id: CompanyId,
    /// Short human identifier, unique among active nodes.
    pub code: String,
    /// Display name; descendants are ordered by level then name.
    pub name: String,
    /// Parent company, `None` for the holding.
    pub parent_id: Option<CompanyId>,
    /// Distance to the root, capped at the configured maximum.
    pub level: u32,
    /// Soft-delete flag.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl CompanyNode {
    /// Builds a new active node with a fresh ID.
    #[must_use]
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        parent_id: Option<CompanyId>,
        level: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CompanyId::new(),
            code: code.into(),
            name: name.into(),
            parent_id,
            level,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the node has no parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Stamps `updated_at` with the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Input for creating a company.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewCompany {
    /// Company code (must be unique among active companies).
    pub code: String,
    /// Company name.
    pub name: String,
    /// Parent company, `None` to create the holding.
    pub parent_id: Option<CompanyId>,
}

impl NewCompany {
    /// Input for the holding company.
    #[must_use]
    pub fn root(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            parent_id: None,
        }
    }

    /// Input for a subsidiary of `parent_id`.
    #[must_use]
    pub fn child(code: impl Into<String>, name: impl Into<String>, parent_id: CompanyId) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            parent_id: Some(parent_id),
        }
    }
}

/// Summary of a level repair run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Number of passes executed.
    pub passes: u32,
    /// Total number of level corrections written.
    pub corrected: usize,
    /// Nodes whose derived level exceeded the cap and was clamped.
    pub clamped: Vec<CompanyId>,
    /// True when the repair was skipped because the node is a root.
    pub skipped: bool,
}

impl RepairReport {
    /// Report for a repair that did nothing.
    #[must_use]
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// Folds another report into this one.
    pub fn absorb(&mut self, other: Self) {
        self.passes += other.passes;
        self.corrected += other.corrected;
        for id in other.clamped {
            if !self.clamped.contains(&id) {
                self.clamped.push(id);
            }
        }
        self.skipped &= other.skipped;
    }
}

/// A node whose stored level disagrees with its derived level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelMismatch {
    /// The node.
    pub company_id: CompanyId,
    /// The node's code.
    pub code: String,
    /// Level currently stored.
    pub stored_level: u32,
    /// Level derived from the parent chain.
    pub expected_level: u32,
}

/// Result of a re-parent operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReparentOutcome {
    /// The moved node after the change.
    pub company: CompanyNode,
    /// Parent before the move.
    pub previous_parent_id: Option<CompanyId>,
    /// Former root demoted under the promoted node, if any.
    pub demoted_root_id: Option<CompanyId>,
    /// Level repair summary.
    pub repair: RepairReport,
}
