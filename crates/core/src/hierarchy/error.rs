//! Hierarchy error types.
//!
//! Every failure of a tree mutation or query surfaces as one of these
//! variants. Validation failures are client errors; a failed level repair
//! or a storage failure is a server error and aborts the transaction.

use holdtree_shared::{AppError, types::CompanyId};
use thiserror::Error;

/// Errors that can occur during hierarchy operations.
#[derive(Debug, Error)]
pub enum HierarchyError {
    /// Another active company already uses this code.
    #[error("Company code '{0}' already exists")]
    DuplicateCode(String),

    /// The requested parent does not exist or is inactive.
    #[error("Parent company not found: {0}")]
    ParentNotFound(CompanyId),

    /// The operation would create a second active root.
    #[error("Holding company {existing} already exists")]
    MultipleRootsNotAllowed {
        /// The currently active root.
        existing: CompanyId,
    },

    /// The operation would make a company its own ancestor.
    #[error("Moving company {company_id} under {target_parent_id} would create a cycle")]
    CycleDetected {
        /// The company being moved.
        company_id: CompanyId,
        /// The requested parent.
        target_parent_id: CompanyId,
    },

    /// The level repair loop did not reach a fixed point.
    #[error("Level repair for company {company_id} did not converge after {passes} passes")]
    ConsistencyRepairExhausted {
        /// The company whose subtree was being repaired.
        company_id: CompanyId,
        /// Number of passes run.
        passes: u32,
    },

    /// The operation would leave the tree without an active root.
    #[error("Company {0} is the active holding and cannot be removed from the root")]
    RootRequired(CompanyId),

    /// Company not found.
    #[error("Company not found: {0}")]
    CompanyNotFound(CompanyId),

    /// Company is soft-deleted and cannot be mutated.
    #[error("Company {0} is inactive")]
    CompanyInactive(CompanyId),

    /// Company code is empty or malformed.
    #[error("Invalid company code '{0}'")]
    InvalidCode(String),

    /// Persistence failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl HierarchyError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidCode(_) => 400,
            Self::CompanyNotFound(_) | Self::ParentNotFound(_) => 404,
            Self::DuplicateCode(_) | Self::MultipleRootsNotAllowed { .. } => 409,
            Self::CycleDetected { .. } | Self::RootRequired(_) | Self::CompanyInactive(_) => 422,
            Self::ConsistencyRepairExhausted { .. } | Self::Storage(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateCode(_) => "DUPLICATE_CODE",
            Self::ParentNotFound(_) => "PARENT_NOT_FOUND",
            Self::MultipleRootsNotAllowed { .. } => "MULTIPLE_ROOTS_NOT_ALLOWED",
            Self::CycleDetected { .. } => "CYCLE_DETECTED",
            Self::ConsistencyRepairExhausted { .. } => "CONSISTENCY_REPAIR_EXHAUSTED",
            Self::RootRequired(_) => "ROOT_REQUIRED",
            Self::CompanyNotFound(_) => "COMPANY_NOT_FOUND",
            Self::CompanyInactive(_) => "COMPANY_INACTIVE",
            Self::InvalidCode(_) => "INVALID_CODE",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<HierarchyError> for AppError {
    fn from(err: HierarchyError) -> Self {
        let message = err.to_string();
        match err {
            HierarchyError::DuplicateCode(_) | HierarchyError::MultipleRootsNotAllowed { .. } => {
                Self::Conflict(message)
            }
            HierarchyError::ParentNotFound(_) | HierarchyError::CompanyNotFound(_) => {
                Self::NotFound(message)
            }
            HierarchyError::InvalidCode(_) => Self::Validation(message),
            HierarchyError::CycleDetected { .. }
            | HierarchyError::RootRequired(_)
            | HierarchyError::CompanyInactive(_) => Self::BusinessRule(message),
            HierarchyError::ConsistencyRepairExhausted { .. } => Self::Internal(message),
            HierarchyError::Storage(_) => Self::Database(message),
        }
    }
}
