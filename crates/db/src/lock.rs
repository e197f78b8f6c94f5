//! Hierarchy write lock.
//!
//! Every hierarchy mutation takes a PostgreSQL transaction-scoped advisory
//! lock before touching the tree, so re-parent and level repair sequences
//! from different processes never interleave. The lock is released by
//! commit or rollback; nothing needs to unlock it explicitly.
//!
//! # Usage
//!
//! ```ignore
//! use holdtree_db::lock::lock_hierarchy;
//!
//! let txn = db.begin().await?;
//! lock_hierarchy(&txn).await?;
//! // ... read and write companies ...
//! txn.commit().await?;
//! ```

use sea_orm::{ConnectionTrait, DatabaseTransaction, DbBackend, DbErr};

/// Advisory lock key shared by every hierarchy writer ("HOLDTREE" in ASCII).
pub const HIERARCHY_LOCK_KEY: i64 = 0x484F_4C44_5452_4545;

/// SQL taking the hierarchy lock for the rest of the transaction.
#[must_use]
pub fn lock_sql() -> String {
    format!("SELECT pg_advisory_xact_lock({HIERARCHY_LOCK_KEY})")
}

/// Takes the hierarchy lock on `txn`, waiting for any other holder.
///
/// Does nothing on backends without advisory locks.
///
/// # Errors
///
/// Returns an error if the lock statement fails.
pub async fn lock_hierarchy(txn: &DatabaseTransaction) -> Result<(), DbErr> {
    if txn.get_database_backend() != DbBackend::Postgres {
        return Ok(());
    }
    txn.execute_unprepared(&lock_sql()).await?;
    Ok(())
}
