//! # Specification Executors
//!
//! A [`SpecificationExecutor`] runs a [`Specification`] against one storage backend
//! and returns root entities. Executors are created per entity type by a factory and
//! memoized in an [`ExecutorCache`] for the factory's lifetime.
//!
//! Factories own their backend handle and release it in `close`, so the connection
//! lifecycle is explicit:
//!
//! ```rust,ignore
//! let factory = SeaOrmExecutorFactory::new(db, Arc::new(registry));
//! let people = factory.executor::<person::Entity>();
//! let adults = people.find_all(&spec).await?;
//! factory.close().await?;
//! ```

use crate::backend::document::{DocumentExecutor, DocumentStore};
use crate::backend::relational::SeaOrmExecutor;
use crate::errors::SearchError;
use crate::metadata::{EntityMetadata, FieldDescriptor};
use crate::specification::Specification;
use async_trait::async_trait;
use dashmap::DashMap;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait};
use serde::de::DeserializeOwned;
use std::any::{Any, TypeId};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// `DESC` (any case) is descending, anything else ascending.
    #[must_use]
    pub fn parse(order: &str) -> Self {
        if order.trim().eq_ignore_ascii_case("DESC") {
            Self::Desc
        } else {
            Self::Asc
        }
    }
}

/// Sort key on a field of the root entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SortOrder {
    pub field: Arc<FieldDescriptor>,
    pub direction: Direction,
}

/// Window and order of a result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pageable {
    pub offset: u64,
    /// `None` returns every match
    pub limit: Option<u64>,
    pub sort: Vec<SortOrder>,
}

impl Pageable {
    #[must_use]
    pub fn unpaged() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: Some(limit),
            sort: Vec::new(),
        }
    }

    #[must_use]
    pub fn sorted_by(mut self, field: Arc<FieldDescriptor>, direction: Direction) -> Self {
        self.sort.push(SortOrder { field, direction });
        self
    }
}

#[async_trait]
pub trait SpecificationExecutor<T: Send + 'static>: Send + Sync {
    /// Every entity matching `spec`, each once.
    ///
    /// # Errors
    ///
    /// Returns unmapped paths as filter errors and backend failures unchanged.
    async fn find_all(&self, spec: &Specification<T>) -> Result<Vec<T>, SearchError> {
        self.find(spec, &Pageable::unpaged()).await
    }

    /// One sorted window of the entities matching `spec`.
    ///
    /// # Errors
    ///
    /// Returns unmapped paths as filter errors and backend failures unchanged.
    async fn find(&self, spec: &Specification<T>, pageable: &Pageable)
    -> Result<Vec<T>, SearchError>;

    /// Number of distinct entities matching `spec`.
    ///
    /// # Errors
    ///
    /// Returns unmapped paths as filter errors and backend failures unchanged.
    async fn count(&self, spec: &Specification<T>) -> Result<u64, SearchError>;
}

/// One executor per entity type, created on first request.
#[derive(Default)]
pub struct ExecutorCache {
    executors: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ExecutorCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached executor for `T`, created with `create` on a miss.
    pub fn get_or_insert_with<T, F>(&self, create: F) -> Arc<dyn SpecificationExecutor<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Arc<dyn SpecificationExecutor<T>>,
    {
        let type_id = TypeId::of::<T>();
        if let Some(cached) = self
            .executors
            .get(&type_id)
            .and_then(|entry| downcast::<T>(entry.value()))
        {
            return cached;
        }

        let created = create();
        tracing::debug!(entity = std::any::type_name::<T>(), "Created specification executor");
        let stored = self.executors.entry(type_id).or_insert_with(|| {
            let erased: Arc<dyn Any + Send + Sync> = Arc::new(Arc::clone(&created));
            erased
        });
        downcast::<T>(stored.value()).unwrap_or(created)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    pub fn clear(&self) {
        self.executors.clear();
    }
}

fn downcast<T: Send + 'static>(
    entry: &Arc<dyn Any + Send + Sync>,
) -> Option<Arc<dyn SpecificationExecutor<T>>> {
    entry
        .as_ref()
        .downcast_ref::<Arc<dyn SpecificationExecutor<T>>>()
        .cloned()
}

impl std::fmt::Debug for ExecutorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorCache")
            .field("executors", &self.executors.len())
            .finish()
    }
}

/// Executors over a Sea-ORM connection.
pub struct SeaOrmExecutorFactory {
    db: DatabaseConnection,
    metadata: Arc<dyn EntityMetadata>,
    cache: ExecutorCache,
}

impl SeaOrmExecutorFactory {
    #[must_use]
    pub fn new(db: DatabaseConnection, metadata: Arc<dyn EntityMetadata>) -> Self {
        Self {
            db,
            metadata,
            cache: ExecutorCache::new(),
        }
    }

    /// Executor for the model of entity `E`.
    pub fn executor<E>(&self) -> Arc<dyn SpecificationExecutor<E::Model>>
    where
        E: EntityTrait,
        E::Model: Send + Sync + 'static,
    {
        self.cache.get_or_insert_with(|| {
            Arc::new(SeaOrmExecutor::<E>::new(
                self.db.clone(),
                Arc::clone(&self.metadata),
            ))
        })
    }

    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Drops every executor and closes the connection.
    ///
    /// # Errors
    ///
    /// Returns the driver's error when the pool fails to shut down.
    pub async fn close(self) -> Result<(), DbErr> {
        self.cache.clear();
        tracing::debug!("Closing search database connection");
        self.db.close().await
    }
}

/// Executors over a [`DocumentStore`].
pub struct DocumentExecutorFactory {
    store: Arc<DocumentStore>,
    metadata: Arc<dyn EntityMetadata>,
    cache: ExecutorCache,
}

impl DocumentExecutorFactory {
    #[must_use]
    pub fn new(store: Arc<DocumentStore>, metadata: Arc<dyn EntityMetadata>) -> Self {
        Self {
            store,
            metadata,
            cache: ExecutorCache::new(),
        }
    }

    pub fn executor<T>(&self) -> Arc<dyn SpecificationExecutor<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.cache.get_or_insert_with(|| {
            Arc::new(DocumentExecutor::<T>::new(
                Arc::clone(&self.store),
                Arc::clone(&self.metadata),
            ))
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Drops every executor and empties the store.
    pub fn close(self) {
        self.cache.clear();
        self.store.clear();
    }
}
