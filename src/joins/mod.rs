//! # Entity Join Graph
//!
//! Every association reachable from a root entity, deduplicated by join name, with
//! the join type and fetch mode chosen by an ordered chain of [`JoinHandler`]s.
//!
//! ## Join names
//!
//! An association to an entity is keyed by the qualified name of its target type, so
//! two paths reaching the same type share one entry. A plural field of primitive values
//! (a tags table, an array or map column) is keyed `<declaring type>.<field>`.
//!
//! ## Handlers
//!
//! The first handler whose [`JoinHandler::supports`] holds decides the [`JoinInfo`]. A
//! [`DefaultJoinHandler`] (left join, not fetched) is always consulted last.
//!
//! ```rust,ignore
//! let handlers = JoinHandlers::new()
//!     .with(FieldJoinHandler::new::<Person>("employer", JoinInfo::new(JoinType::Inner, true)))
//!     .with(AssociationJoinHandler::new(Association::ManyToMany, JoinInfo::left()));
//! let builder = JoinGraphBuilder::new(registry, handlers);
//! let joins = builder.joins_for(EntityName::of::<Person>());
//! ```

mod graph;

pub use graph::{JoinGraphBuilder, compute_entity_joins};

use crate::metadata::{Association, EntityName, FieldDescriptor};
use indexmap::IndexMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinType {
    Inner,
    #[default]
    Left,
    Right,
}

/// How one association is joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct JoinInfo {
    pub join_type: JoinType,
    /// Also load the associated data in the same round trip
    pub fetched: bool,
}

impl JoinInfo {
    #[must_use]
    pub const fn new(join_type: JoinType, fetched: bool) -> Self {
        Self {
            join_type,
            fetched,
        }
    }

    /// Left join, not fetched.
    #[must_use]
    pub const fn left() -> Self {
        Self::new(JoinType::Left, false)
    }
}

pub trait JoinHandler: Send + Sync {
    fn supports(&self, field: &FieldDescriptor) -> bool;

    fn handle(&self, field: &FieldDescriptor) -> JoinInfo;
}

/// Catch-all: left join, not fetched.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultJoinHandler;

impl JoinHandler for DefaultJoinHandler {
    fn supports(&self, _field: &FieldDescriptor) -> bool {
        true
    }

    fn handle(&self, _field: &FieldDescriptor) -> JoinInfo {
        JoinInfo::left()
    }
}

/// Explicit join for one field of one entity type.
#[derive(Debug, Clone)]
pub struct FieldJoinHandler {
    owner: EntityName,
    field: String,
    info: JoinInfo,
}

impl FieldJoinHandler {
    #[must_use]
    pub fn new<T: ?Sized + 'static>(field: impl Into<String>, info: JoinInfo) -> Self {
        Self::named(EntityName::of::<T>(), field, info)
    }

    #[must_use]
    pub fn named(owner: EntityName, field: impl Into<String>, info: JoinInfo) -> Self {
        Self {
            owner,
            field: field.into(),
            info,
        }
    }
}

impl JoinHandler for FieldJoinHandler {
    fn supports(&self, field: &FieldDescriptor) -> bool {
        field.owner == self.owner && field.name == self.field
    }

    fn handle(&self, _field: &FieldDescriptor) -> JoinInfo {
        self.info
    }
}

/// Join for every field of one association kind.
#[derive(Debug, Clone)]
pub struct AssociationJoinHandler {
    association: Association,
    info: JoinInfo,
}

impl AssociationJoinHandler {
    #[must_use]
    pub fn new(association: Association, info: JoinInfo) -> Self {
        Self { association, info }
    }
}

impl JoinHandler for AssociationJoinHandler {
    fn supports(&self, field: &FieldDescriptor) -> bool {
        field.association == Some(self.association)
    }

    fn handle(&self, _field: &FieldDescriptor) -> JoinInfo {
        self.info
    }
}

/// Ordered handler chain, first match wins.
#[derive(Clone, Default)]
pub struct JoinHandlers(Vec<Arc<dyn JoinHandler>>);

impl JoinHandlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, handler: impl JoinHandler + 'static) -> Self {
        self.0.push(Arc::new(handler));
        self
    }

    /// Join info of the first supporting handler, the default handler otherwise.
    #[must_use]
    pub fn info(&self, field: &FieldDescriptor) -> JoinInfo {
        self.0
            .iter()
            .find(|handler| handler.supports(field))
            .map_or_else(
                || DefaultJoinHandler.handle(field),
                |handler| handler.handle(field),
            )
    }
}

impl std::fmt::Debug for JoinHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinHandlers")
            .field("handlers", &self.0.len())
            .finish()
    }
}

/// Dedup key of an association field.
#[must_use]
pub fn join_name(field: &FieldDescriptor) -> String {
    match field.target_entity() {
        Some(target) => target.qualified().to_string(),
        None => format!("{}.{}", field.owner.qualified(), field.name),
    }
}

/// One association traversal of the join graph.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityJoin {
    /// Dot-separated field names from the root
    pub field_path: String,
    pub join_name: String,
    pub join_type: JoinType,
    pub fetched: bool,
    /// Descriptor of every association on the way, the joined one last
    pub hops: Vec<Arc<FieldDescriptor>>,
}

impl EntityJoin {
    #[must_use]
    pub fn info(&self) -> JoinInfo {
        JoinInfo::new(self.join_type, self.fetched)
    }
}

/// Join graph of one root entity, keyed by join name in discovery order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityJoins {
    root: Option<EntityName>,
    joins: IndexMap<String, EntityJoin>,
}

impl EntityJoins {
    #[must_use]
    pub fn new(root: EntityName) -> Self {
        Self {
            root: Some(root),
            joins: IndexMap::new(),
        }
    }

    /// No joins at all, for expressions that never leave the root.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn root(&self) -> Option<EntityName> {
        self.root
    }

    #[must_use]
    pub fn get(&self, join_name: &str) -> Option<&EntityJoin> {
        self.joins.get(join_name)
    }

    #[must_use]
    pub fn contains(&self, join_name: &str) -> bool {
        self.joins.contains_key(join_name)
    }

    pub(crate) fn insert(&mut self, join: EntityJoin) {
        self.joins.insert(join.join_name.clone(), join);
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityJoin> {
        self.joins.values()
    }

    /// Joins that also load their associated data.
    pub fn fetched(&self) -> impl Iterator<Item = &EntityJoin> {
        self.iter().filter(|join| join.fetched)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.joins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Join info recorded for `field`, left join and not fetched when absent.
    #[must_use]
    pub fn info_for(&self, field: &FieldDescriptor) -> JoinInfo {
        self.get(&join_name(field))
            .map_or_else(JoinInfo::left, EntityJoin::info)
    }
}
