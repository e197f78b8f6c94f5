//! `SeaORM` entity definitions.

pub mod companies;

pub mod prelude {
    //! Entity re-exports.
    pub use super::companies::Entity as Companies;
}
