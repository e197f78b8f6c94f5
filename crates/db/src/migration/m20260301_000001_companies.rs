//! Companies migration.
//!
//! Creates the self-referencing `companies` table. Two partial unique indexes
//! back the hierarchy rules at the database level: codes are unique among
//! active companies, and at most one active company has no parent.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(COMPANIES_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP TABLE IF EXISTS companies CASCADE;")
            .await?;
        Ok(())
    }
}

const COMPANIES_SQL: &str = r"
-- Company tree stored as parent pointers
CREATE TABLE companies (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    code VARCHAR(50) NOT NULL,
    name VARCHAR(255) NOT NULL,
    parent_id UUID REFERENCES companies(id),
    level INTEGER NOT NULL DEFAULT 0,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_companies_level CHECK (level >= 0),
    CONSTRAINT chk_companies_not_own_parent CHECK (parent_id IS NULL OR parent_id <> id),
    CONSTRAINT chk_companies_root_level CHECK (parent_id IS NOT NULL OR level = 0)
);

-- Codes are reusable once the holder is soft-deleted
CREATE UNIQUE INDEX idx_companies_code_active ON companies(code) WHERE is_active;

-- At most one active root
CREATE UNIQUE INDEX idx_companies_single_root ON companies((parent_id IS NULL))
    WHERE parent_id IS NULL AND is_active;

-- Frontier lookups: children of a set of parents, ordered by level then name
CREATE INDEX idx_companies_parent ON companies(parent_id, level, name) WHERE is_active;
";
