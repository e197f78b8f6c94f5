//! Company scope filtering for scoped-resource queries.
//!
//! Repositories of reports, documents and users resolve the caller's
//! [`CompanyScope`] once per request and narrow their own queries with it.
//! They never walk the tree themselves.

use holdtree_core::hierarchy::CompanyScope;
use sea_orm::{ColumnTrait, QueryFilter};

/// Restricts `query` to rows whose `column` lies inside `scope`.
///
/// An unscoped actor gets the query back unchanged; an empty scope matches
/// no row at all.
pub fn apply_company_scope<Q, Col>(query: Q, column: Col, scope: &CompanyScope) -> Q
where
    Q: QueryFilter,
    Col: ColumnTrait,
{
    match scope.company_ids() {
        None => query,
        Some(ids) => query.filter(column.is_in(ids.iter().map(|id| id.into_inner()))),
    }
}
