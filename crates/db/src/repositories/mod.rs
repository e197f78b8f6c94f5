//! Repository layer for database operations.

pub mod company;
pub mod scope;

pub use company::CompanyRepository;
pub use scope::apply_company_scope;
