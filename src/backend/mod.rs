//! Storage backends implementing [`QueryBuilder`](crate::specification::QueryBuilder)
//! and [`SpecificationExecutor`](crate::executor::SpecificationExecutor).

pub mod document;
pub mod relational;

pub use document::{DocumentExecutor, DocumentQueryBuilder, DocumentStore};
pub use relational::{SeaOrmExecutor, SqlQueryBuilder};
