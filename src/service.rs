//! # Search Service
//!
//! [`SearchService`] runs the whole pipeline for one entity type: query parameters
//! are resolved into an [`Expression`], checked by the configured validators, turned
//! into a [`Specification`] over the cached join graph, and handed to an executor.
//!
//! ```rust,ignore
//! let metadata: Arc<dyn EntityMetadata> = Arc::new(registry);
//! let factory = SeaOrmExecutorFactory::new(db, Arc::clone(&metadata));
//! let people = SearchService::new(metadata, factory.executor::<person::Entity>())
//!     .validator(MaxValuesValidator::new(50))
//!     .config(SearchConfig::default());
//!
//! let results = people.search(&params).await?;
//! ```
//!
//! Every offense of a request (syntax, unknown fields, bad values, bad sort keys,
//! validation) is reported together in one [`FilterErrors`].

use crate::errors::{FilterErrors, SearchError};
use crate::executor::{Pageable, SpecificationExecutor};
use crate::expression::{Expression, ExpressionResolver, parse};
use crate::joins::{JoinGraphBuilder, JoinHandlers};
use crate::metadata::{AliasResolvers, EntityMetadata, EntityName};
use crate::models::{SearchConfig, SearchOptions};
use crate::pagination::parse_pagination;
use crate::sort::parse_sorting;
use crate::specification::{Specification, to_specification};
use crate::validation::{ExpressionValidator, validate_all};
use crate::value::{ConversionService, DefaultConversionService};
use indexmap::IndexMap;
use std::sync::Arc;

/// A compiled request, ready for an executor.
#[derive(Debug, Clone)]
pub struct SearchRequest<T> {
    pub specification: Specification<T>,
    pub pageable: Pageable,
}

/// One page of results and the total number of matches.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

pub struct SearchService<T> {
    root: EntityName,
    metadata: Arc<dyn EntityMetadata>,
    aliases: AliasResolvers,
    conversion: Arc<dyn ConversionService>,
    joins: Arc<JoinGraphBuilder>,
    validators: Vec<Arc<dyn ExpressionValidator>>,
    executor: Arc<dyn SpecificationExecutor<T>>,
    config: SearchConfig,
}

impl<T: Send + 'static> SearchService<T> {
    /// Service for entities of type `T`, which must be registered in `metadata`.
    #[must_use]
    pub fn new(
        metadata: Arc<dyn EntityMetadata>,
        executor: Arc<dyn SpecificationExecutor<T>>,
    ) -> Self {
        let joins = Arc::new(JoinGraphBuilder::new(
            Arc::clone(&metadata),
            JoinHandlers::new(),
        ));
        Self {
            root: EntityName::of::<T>(),
            metadata,
            aliases: AliasResolvers::new(),
            conversion: Arc::new(DefaultConversionService),
            joins,
            validators: Vec::new(),
            executor,
            config: SearchConfig::default(),
        }
    }

    #[must_use]
    pub fn aliases(mut self, aliases: AliasResolvers) -> Self {
        self.aliases = aliases;
        self
    }

    #[must_use]
    pub fn conversion(mut self, conversion: impl ConversionService + 'static) -> Self {
        self.conversion = Arc::new(conversion);
        self
    }

    /// Join graph builder to use, e.g. one shared by several services.
    #[must_use]
    pub fn join_graph(mut self, joins: Arc<JoinGraphBuilder>) -> Self {
        self.joins = joins;
        self
    }

    /// Own join graph builder with `handlers`.
    #[must_use]
    pub fn join_handlers(mut self, handlers: JoinHandlers) -> Self {
        self.joins = Arc::new(JoinGraphBuilder::new(Arc::clone(&self.metadata), handlers));
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: impl ExpressionValidator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    #[must_use]
    pub fn config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn root(&self) -> EntityName {
        self.root
    }

    /// Name used in `Content-Range` headers: the table or collection of `T`.
    #[must_use]
    pub fn resource_name(&self) -> String {
        self.metadata
            .storage_name(self.root)
            .unwrap_or_else(|| self.root.simple().to_string())
    }

    fn resolver(&self) -> ExpressionResolver<'_> {
        ExpressionResolver::new(
            self.metadata.as_ref(),
            &self.aliases,
            self.conversion.as_ref(),
        )
        .null_token(&self.config.null_token)
        .operator_suffixes(self.config.operator_suffixes)
    }

    /// Parses and resolves a textual filter.
    ///
    /// # Errors
    ///
    /// Returns every syntax, resolution and conversion offense.
    pub fn parse(&self, filter: &str) -> Result<Expression, FilterErrors> {
        let node = parse(filter)?;
        self.resolver().resolve(self.root, &node)
    }

    /// Resolves query parameters: every non-reserved key is a field filter, and a
    /// `filter` key adds a textual filter ANDed with them.
    ///
    /// # Errors
    ///
    /// Returns the offenses of the field filters and the textual filter together.
    pub fn expression_from_params(
        &self,
        params: &IndexMap<String, Vec<String>>,
    ) -> Result<Expression, FilterErrors> {
        let fields: IndexMap<String, Vec<String>> = params
            .iter()
            .filter(|(key, _)| !self.config.is_reserved(key))
            .map(|(key, values)| (key.clone(), values.clone()))
            .collect();

        let mut errors = FilterErrors::new();
        let flat = self
            .resolver()
            .resolve_params(self.root, &fields)
            .map_err(|offenses| errors.append(offenses))
            .ok();
        let text = match params.get("filter").and_then(|values| values.last()) {
            Some(filter) if !filter.trim().is_empty() => self
                .parse(filter)
                .map_err(|offenses| errors.append(offenses))
                .ok(),
            _ => None,
        };

        match (flat, text) {
            (Some(flat), Some(text)) if errors.is_empty() => Ok(Expression::and(vec![flat, text])),
            (Some(flat), None) if errors.is_empty() => Ok(flat),
            _ => Err(errors),
        }
    }

    /// Validates `expression` and builds its specification over the join graph of `T`.
    ///
    /// # Errors
    ///
    /// Returns every validator offense.
    pub fn specification(&self, expression: Expression) -> Result<Specification<T>, FilterErrors> {
        validate_all(&self.validators, &expression)?;
        Ok(to_specification(expression, self.joins.joins_for(self.root)))
    }

    /// Compiles query parameters into a specification with its page and sort.
    ///
    /// # Errors
    ///
    /// Returns the offenses of filtering and sorting together.
    pub fn request(
        &self,
        params: &IndexMap<String, Vec<String>>,
    ) -> Result<SearchRequest<T>, FilterErrors> {
        let options = SearchOptions::from_params(params);
        let mut errors = FilterErrors::new();

        let specification = match self.expression_from_params(params) {
            Ok(expression) => self
                .specification(expression)
                .map_err(|offenses| errors.append(offenses))
                .ok(),
            Err(offenses) => {
                errors.append(offenses);
                None
            }
        };
        let sort = parse_sorting(&options, &self.resolver(), self.root)
            .map_err(|offense| errors.push(offense))
            .ok();

        match (specification, sort) {
            (Some(specification), Some(sort)) if errors.is_empty() => {
                let (offset, limit) = parse_pagination(
                    &options,
                    self.config.default_page_size,
                    self.config.max_page_size,
                );
                Ok(SearchRequest {
                    specification,
                    pageable: Pageable {
                        offset,
                        limit: Some(limit),
                        sort,
                    },
                })
            }
            _ => Err(errors),
        }
    }

    /// Runs a search from query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Filter`] for bad input and [`SearchError::Backend`]
    /// when the executor fails.
    pub async fn search(
        &self,
        params: &IndexMap<String, Vec<String>>,
    ) -> Result<SearchResults<T>, SearchError> {
        let request = self.request(params)?;
        tracing::debug!(
            entity = %self.root,
            offset = request.pageable.offset,
            limit = ?request.pageable.limit,
            "Running search"
        );

        let items = self
            .executor
            .find(&request.specification, &request.pageable)
            .await?;
        let total = self.executor.count(&request.specification).await?;
        Ok(SearchResults {
            items,
            total,
            offset: request.pageable.offset,
            limit: request.pageable.limit.unwrap_or(total),
        })
    }

    /// Every entity matching an already built specification.
    ///
    /// # Errors
    ///
    /// Returns the executor's error unchanged.
    pub async fn find_all(&self, specification: &Specification<T>) -> Result<Vec<T>, SearchError> {
        self.executor.find_all(specification).await
    }
}

impl<T> std::fmt::Debug for SearchService<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("root", &self.root)
            .field("validators", &self.validators.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
