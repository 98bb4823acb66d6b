//! # crudsearch
//!
//! Filterable search endpoints over statically registered entity models.
//!
//! A request's query string (`lastName=Doe&height_gte=170`) or a textual filter
//! (`height >= 170 and addresses.city = 'Bern'`) is parsed, resolved against the
//! registered [`metadata`], and compiled into a backend-neutral [`Specification`].
//! The relational backend renders it as a sea-query `SELECT`; the document backend
//! evaluates it over JSON documents in memory.
//!
//! ```rust,ignore
//! let metadata: Arc<dyn EntityMetadata> = Arc::new(registry);
//! let factory = SeaOrmExecutorFactory::new(db, Arc::clone(&metadata));
//! let people = Arc::new(SearchService::new(metadata, factory.executor::<person::Entity>()));
//! let app = search_router("/people", people);
//! ```

pub mod backend;
pub mod errors;
pub mod executor;
pub mod expression;
pub mod joins;
pub mod metadata;
pub mod models;
pub mod pagination;
pub mod routes;
pub mod service;
pub mod sort;
pub mod specification;
pub mod validation;
pub mod value;

#[cfg(test)]
mod fixtures;

pub use errors::{FilterError, FilterErrors, SearchError};
pub use executor::{
    Direction, DocumentExecutorFactory, ExecutorCache, Pageable, SeaOrmExecutorFactory, SortOrder,
    SpecificationExecutor,
};
pub use expression::{Expression, ExpressionResolver, Operator, parse};
pub use joins::{JoinGraphBuilder, JoinHandler, JoinHandlers, JoinInfo, JoinType};
pub use metadata::{
    AliasResolver, AliasResolvers, Association, EntityMetadata, EntityModel, EntityName,
    EntityRegistry, FieldDescriptor, JoinMapping,
};
pub use models::{SearchConfig, SearchOptions};
pub use routes::search_router;
pub use service::{SearchRequest, SearchResults, SearchService};
pub use specification::{QueryBuilder, Specification, to_specification};
pub use validation::{DeniedFieldsValidator, ExpressionValidator, MaxValuesValidator};
pub use value::{ConversionService, DefaultConversionService, Value, ValueType};
