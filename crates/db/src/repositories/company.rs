//! Company repository: the `SeaORM` Tree Store.
//!
//! `CompanyRepository<DatabaseConnection>` serves reads and opens
//! transactions; `CompanyRepository<DatabaseTransaction>` is the store handed
//! to the hierarchy engines for the duration of one mutation.

use async_trait::async_trait;
use chrono::Utc;
use holdtree_core::hierarchy::{
    CompanyNode, CompanyStore, HierarchyError, StoreTransaction, TransactionalStore,
};
use holdtree_shared::types::CompanyId;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Select, Set, SqlErr,
    TransactionTrait,
};
use tracing::debug;

use crate::entities::companies;
use crate::lock::lock_hierarchy;

/// Name of the partial unique index on active codes.
const CODE_INDEX: &str = "idx_companies_code_active";

/// Company repository over any `SeaORM` connection or transaction.
#[derive(Debug, Clone)]
pub struct CompanyRepository<C = DatabaseConnection> {
    db: C,
}

impl<C> CompanyRepository<C> {
    /// Creates a new company repository.
    #[must_use]
    pub const fn new(db: C) -> Self {
        Self { db }
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> &C {
        &self.db
    }
}

fn storage(err: DbErr) -> HierarchyError {
    HierarchyError::Storage(err.to_string())
}

/// Maps a write error, recognising the active-code unique index.
fn write_error(err: DbErr, code: &str) -> HierarchyError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(message)) if message.contains(CODE_INDEX) => {
            HierarchyError::DuplicateCode(code.to_string())
        }
        _ => storage(err),
    }
}

/// Converts a row into a domain node.
///
/// # Errors
///
/// Returns [`HierarchyError::Storage`] if the stored level is negative.
pub fn to_node(model: companies::Model) -> Result<CompanyNode, HierarchyError> {
    let level = u32::try_from(model.level).map_err(|_| {
        HierarchyError::Storage(format!(
            "company {} has negative level {}",
            model.id, model.level
        ))
    })?;

    Ok(CompanyNode {
        id: CompanyId::from_uuid(model.id),
        code: model.code,
        name: model.name,
        parent_id: model.parent_id.map(CompanyId::from_uuid),
        level,
        is_active: model.is_active,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

/// Converts a domain node into a fully set active model.
///
/// # Errors
///
/// Returns [`HierarchyError::Storage`] if the level does not fit the column.
pub fn to_active_model(node: &CompanyNode) -> Result<companies::ActiveModel, HierarchyError> {
    let level = i32::try_from(node.level).map_err(|_| {
        HierarchyError::Storage(format!("company {} level {} out of range", node.id, node.level))
    })?;

    Ok(companies::ActiveModel {
        id: Set(node.id.into_inner()),
        code: Set(node.code.clone()),
        name: Set(node.name.clone()),
        parent_id: Set(node.parent_id.map(CompanyId::into_inner)),
        level: Set(level),
        is_active: Set(node.is_active),
        created_at: Set(node.created_at.into()),
        updated_at: Set(node.updated_at.into()),
    })
}

fn to_nodes(models: Vec<companies::Model>) -> Result<Vec<CompanyNode>, HierarchyError> {
    models.into_iter().map(to_node).collect()
}

/// Active children of every company in `parent_ids`, ordered by level then name.
#[must_use]
pub fn active_children_query(parent_ids: &[CompanyId]) -> Select<companies::Entity> {
    companies::Entity::find()
        .filter(companies::Column::ParentId.is_in(parent_ids.iter().map(|id| id.into_inner())))
        .filter(companies::Column::IsActive.eq(true))
        .order_by_asc(companies::Column::Level)
        .order_by_asc(companies::Column::Name)
}

fn active_roots_query() -> Select<companies::Entity> {
    companies::Entity::find()
        .filter(companies::Column::ParentId.is_null())
        .filter(companies::Column::IsActive.eq(true))
        .order_by_asc(companies::Column::CreatedAt)
}

#[async_trait]
impl<C> CompanyStore for CompanyRepository<C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn find_by_id(&self, id: CompanyId) -> Result<Option<CompanyNode>, HierarchyError> {
        companies::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(storage)?
            .map(to_node)
            .transpose()
    }

    async fn find_active_by_code(
        &self,
        code: &str,
    ) -> Result<Option<CompanyNode>, HierarchyError> {
        companies::Entity::find()
            .filter(companies::Column::Code.eq(code))
            .filter(companies::Column::IsActive.eq(true))
            .one(&self.db)
            .await
            .map_err(storage)?
            .map(to_node)
            .transpose()
    }

    async fn find_active_children(
        &self,
        parent_ids: &[CompanyId],
    ) -> Result<Vec<CompanyNode>, HierarchyError> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = active_children_query(parent_ids)
            .all(&self.db)
            .await
            .map_err(storage)?;
        to_nodes(rows)
    }

    async fn find_active_roots(&self) -> Result<Vec<CompanyNode>, HierarchyError> {
        let rows = active_roots_query().all(&self.db).await.map_err(storage)?;
        to_nodes(rows)
    }

    async fn count_active_roots(&self) -> Result<u64, HierarchyError> {
        active_roots_query().count(&self.db).await.map_err(storage)
    }

    async fn list_active(&self) -> Result<Vec<CompanyNode>, HierarchyError> {
        let rows = companies::Entity::find()
            .filter(companies::Column::IsActive.eq(true))
            .order_by_asc(companies::Column::Level)
            .order_by_asc(companies::Column::Name)
            .all(&self.db)
            .await
            .map_err(storage)?;
        to_nodes(rows)
    }

    async fn insert(&self, node: CompanyNode) -> Result<CompanyNode, HierarchyError> {
        let model = to_active_model(&node)?
            .insert(&self.db)
            .await
            .map_err(|e| write_error(e, &node.code))?;
        to_node(model)
    }

    async fn update(&self, node: CompanyNode) -> Result<CompanyNode, HierarchyError> {
        let model = to_active_model(&node)?
            .update(&self.db)
            .await
            .map_err(|e| match e {
                DbErr::RecordNotUpdated => HierarchyError::CompanyNotFound(node.id),
                other => write_error(other, &node.code),
            })?;
        to_node(model)
    }
}

#[async_trait]
impl TransactionalStore for CompanyRepository<DatabaseConnection> {
    type Tx = CompanyRepository<DatabaseTransaction>;

    async fn begin(&self) -> Result<Self::Tx, HierarchyError> {
        let txn = self.db.begin().await.map_err(storage)?;
        lock_hierarchy(&txn).await.map_err(storage)?;
        debug!("Hierarchy transaction started");
        Ok(CompanyRepository::new(txn))
    }
}

#[async_trait]
impl StoreTransaction for CompanyRepository<DatabaseTransaction> {
    async fn commit(self) -> Result<(), HierarchyError> {
        self.db.commit().await.map_err(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, QueryTrait};
    use uuid::Uuid;

    fn row(code: &str, parent_id: Option<Uuid>, level: i32) -> companies::Model {
        let now = Utc::now().into();
        companies::Model {
            id: Uuid::now_v7(),
            code: code.to_string(),
            name: format!("{code} name"),
            parent_id,
            level,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_find_by_id_maps_row() {
        let holding = row("PDV", None, 0);
        let child = row("ENU", Some(holding.id), 1);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![child.clone()]])
            .into_connection();
        let repo = CompanyRepository::new(db);

        let node = repo
            .find_by_id(CompanyId::from_uuid(child.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(node.code, "ENU");
        assert_eq!(node.level, 1);
        assert_eq!(node.parent_id, Some(CompanyId::from_uuid(holding.id)));
        assert!(!node.is_root());
    }

    #[tokio::test]
    async fn test_negative_level_is_storage_error() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row("BAD", None, -1)]])
            .into_connection();
        let repo = CompanyRepository::new(db);

        let result = repo.find_active_by_code("BAD").await;
        assert!(matches!(result, Err(HierarchyError::Storage(_))));
    }

    #[tokio::test]
    async fn test_empty_frontier_skips_query() {
        // No query results are queued: any query would fail.
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let repo = CompanyRepository::new(db);
        assert!(repo.find_active_children(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn test_children_query_is_one_in_list() {
        let ids = [CompanyId::new(), CompanyId::new()];
        let sql = active_children_query(&ids)
            .build(DatabaseBackend::Postgres)
            .to_string();

        assert!(sql.contains(r#""companies"."parent_id" IN ("#));
        assert!(sql.contains(r#""companies"."is_active" = TRUE"#));
        assert!(sql.contains(r#"ORDER BY "companies"."level" ASC, "companies"."name" ASC"#));
    }

    #[test]
    fn test_active_model_sets_every_column() {
        let node = CompanyNode::new("PTG", "Pertagas", Some(CompanyId::new()), 3);
        let active = to_active_model(&node).unwrap();
        assert_eq!(active.level.clone().unwrap(), 3);
        assert_eq!(active.code.clone().unwrap(), "PTG");
        assert_eq!(
            active.parent_id.clone().unwrap(),
            node.parent_id.map(CompanyId::into_inner)
        );
    }
}
