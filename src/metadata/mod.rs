//! # Entity Metadata
//!
//! Field descriptors of the searchable entity types. Nothing here is discovered at
//! runtime: entity types are registered up front in an [`EntityRegistry`], which
//! flattens inherited fields, drops static ones, and caches the result per type.
//!
//! ```rust,ignore
//! let registry = EntityRegistry::new()
//!     .register(
//!         EntityModel::new::<Person>()
//!             .table("people")
//!             .field(FieldDescriptor::scalar("first_name", ValueType::String))
//!             .field(
//!                 FieldDescriptor::to_many::<Address>("addresses", Association::OneToMany)
//!                     .join_on(JoinMapping::foreign_key("id", "person_id")),
//!             ),
//!     )
//!     .register(EntityModel::new::<Address>().table("addresses"));
//! ```

pub mod alias;
pub mod registry;

pub use alias::{AliasResolver, AliasResolvers, StaticAliases};
pub use registry::{EntityModel, EntityRegistry};

use crate::value::ValueType;
use std::fmt;
use std::sync::Arc;

/// Identity of a registered entity type.
///
/// The qualified name doubles as the join-graph key for associations targeting the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityName(&'static str);

impl EntityName {
    /// Name of a Rust type, e.g. `app::models::Person`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(std::any::type_name::<T>())
    }

    /// Explicit name, for types known only by name (e.g. document collections).
    #[must_use]
    pub const fn named(name: &'static str) -> Self {
        Self(name)
    }

    #[must_use]
    pub fn qualified(&self) -> &'static str {
        self.0
    }

    /// Last path segment of the qualified name.
    #[must_use]
    pub fn simple(&self) -> &'static str {
        self.0.rsplit("::").next().unwrap_or(self.0)
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Shape of a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Scalar,
    Collection,
    Map,
    Array,
    Entity,
}

/// Association marker: the field references other data rather than holding a plain value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Association {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
    /// Collection of primitives stored apart from the owner (e.g. a tags table)
    ElementCollection,
}

/// How the relational backend reaches an association's rows from its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinMapping {
    /// `owner.local = target.remote`
    ForeignKey { local: String, remote: String },
    /// `owner.local_key = link.owner_column` and `link.target_column = target.remote_key`
    JoinTable {
        table: String,
        local_key: String,
        owner_column: String,
        target_column: String,
        remote_key: String,
    },
    /// `owner.local_key = element.owner_column`, values in `element.element_column`
    ElementTable {
        table: String,
        local_key: String,
        owner_column: String,
        element_column: String,
    },
}

impl JoinMapping {
    pub fn foreign_key(local: impl Into<String>, remote: impl Into<String>) -> Self {
        Self::ForeignKey {
            local: local.into(),
            remote: remote.into(),
        }
    }

    pub fn join_table(
        table: impl Into<String>,
        local_key: impl Into<String>,
        owner_column: impl Into<String>,
        target_column: impl Into<String>,
        remote_key: impl Into<String>,
    ) -> Self {
        Self::JoinTable {
            table: table.into(),
            local_key: local_key.into(),
            owner_column: owner_column.into(),
            target_column: target_column.into(),
            remote_key: remote_key.into(),
        }
    }

    pub fn element_table(
        table: impl Into<String>,
        local_key: impl Into<String>,
        owner_column: impl Into<String>,
        element_column: impl Into<String>,
    ) -> Self {
        Self::ElementTable {
            table: table.into(),
            local_key: local_key.into(),
            owner_column: owner_column.into(),
            element_column: element_column.into(),
        }
    }
}

/// Where a field lives in the backend: its column (or document key) and, for
/// associations, how to join it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storage {
    pub column: String,
    pub join: Option<JoinMapping>,
}

/// Metadata of one field of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Declaring type; filled in on registration
    pub owner: EntityName,
    pub name: String,
    pub kind: ElementKind,
    /// Type of the field itself (of one element for plural fields)
    pub declared: ValueType,
    /// Type parameters of plural fields: `[element]`, or `[key, value]` for maps
    pub element_types: Vec<ValueType>,
    pub association: Option<Association>,
    pub is_static: bool,
    pub storage: Storage,
}

impl FieldDescriptor {
    fn new(name: impl Into<String>, kind: ElementKind, declared: ValueType) -> Self {
        let name = name.into();
        Self {
            owner: EntityName::named(""),
            storage: Storage {
                column: name.clone(),
                join: None,
            },
            name,
            kind,
            declared,
            element_types: Vec::new(),
            association: None,
            is_static: false,
        }
    }

    /// Plain value field.
    pub fn scalar(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, ElementKind::Scalar, value_type)
    }

    /// Value object whose fields live with its owner.
    pub fn embedded<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::new(name, ElementKind::Entity, ValueType::Entity(EntityName::of::<T>()))
    }

    /// Single-valued association to `T`.
    pub fn to_one<T: ?Sized + 'static>(name: impl Into<String>, association: Association) -> Self {
        Self::to_one_named(name, EntityName::of::<T>(), association)
    }

    pub fn to_one_named(
        name: impl Into<String>,
        target: EntityName,
        association: Association,
    ) -> Self {
        let mut field = Self::new(name, ElementKind::Entity, ValueType::Entity(target));
        field.association = Some(association);
        field
    }

    /// Collection-valued association to `T`.
    pub fn to_many<T: ?Sized + 'static>(name: impl Into<String>, association: Association) -> Self {
        Self::to_many_named(name, EntityName::of::<T>(), association)
    }

    pub fn to_many_named(
        name: impl Into<String>,
        target: EntityName,
        association: Association,
    ) -> Self {
        let target = ValueType::Entity(target);
        let mut field = Self::new(name, ElementKind::Collection, target.clone());
        field.element_types = vec![target];
        field.association = Some(association);
        field
    }

    /// Collection of primitives held inline (document arrays, array columns).
    pub fn collection(name: impl Into<String>, element: ValueType) -> Self {
        let mut field = Self::new(name, ElementKind::Collection, element.clone());
        field.element_types = vec![element];
        field
    }

    /// Collection of primitives stored in its own table.
    pub fn element_collection(
        name: impl Into<String>,
        element: ValueType,
        mapping: JoinMapping,
    ) -> Self {
        let mut field = Self::collection(name, element);
        field.association = Some(Association::ElementCollection);
        field.storage.join = Some(mapping);
        field
    }

    pub fn array(name: impl Into<String>, element: ValueType) -> Self {
        let mut field = Self::new(name, ElementKind::Array, element.clone());
        field.element_types = vec![element];
        field
    }

    /// Map field; filters apply to its values.
    pub fn map(name: impl Into<String>, key: ValueType, value: ValueType) -> Self {
        let mut field = Self::new(name, ElementKind::Map, value.clone());
        field.element_types = vec![key, value];
        field
    }

    /// Column (or document key) name when it differs from the field name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.storage.column = column.into();
        self
    }

    #[must_use]
    pub fn join_on(mut self, mapping: JoinMapping) -> Self {
        self.storage.join = Some(mapping);
        self
    }

    #[must_use]
    pub fn association(mut self, association: Association) -> Self {
        self.association = Some(association);
        self
    }

    #[must_use]
    pub fn static_field(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// `true` for collections, arrays and maps.
    #[must_use]
    pub fn is_plural(&self) -> bool {
        matches!(
            self.kind,
            ElementKind::Collection | ElementKind::Array | ElementKind::Map
        )
    }

    /// Type a single filter value of this field converts to.
    #[must_use]
    pub fn element_type(&self) -> &ValueType {
        if self.is_plural() {
            self.element_types.last().unwrap_or(&self.declared)
        } else {
            &self.declared
        }
    }

    /// Entity type reached by navigating through this field.
    #[must_use]
    pub fn target_entity(&self) -> Option<EntityName> {
        match self.element_type() {
            ValueType::Entity(target) => Some(*target),
            _ => None,
        }
    }

    /// `owner.name`, for diagnostics.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }
}

/// Shared, cached descriptor list of one entity type.
pub type Descriptors = Arc<[Arc<FieldDescriptor>]>;

/// Source of entity metadata consumed by the search pipeline.
pub trait EntityMetadata: Send + Sync {
    fn is_entity_type(&self, entity: EntityName) -> bool;

    /// Whether fields carrying `marker` are traversed as joins.
    fn is_association_marker(&self, marker: Association) -> bool {
        let _ = marker;
        true
    }

    /// Descriptors of `entity`, inherited fields included and static fields excluded.
    fn field_descriptors_of(&self, entity: EntityName) -> Option<Descriptors>;

    /// Table or collection holding `entity`.
    fn storage_name(&self, entity: EntityName) -> Option<String>;

    /// Descriptor of one field of `entity`.
    fn field(&self, entity: EntityName, name: &str) -> Option<Arc<FieldDescriptor>> {
        self.field_descriptors_of(entity)?
            .iter()
            .find(|field| field.name == name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Person;
    struct Address;

    #[test]
    fn test_entity_name_of_type() {
        let name = EntityName::of::<Person>();
        assert!(name.qualified().ends_with("tests::Person"));
        assert_eq!(name.simple(), "Person");
        assert_eq!(EntityName::named("Person").simple(), "Person");
    }

    #[test]
    fn test_plural_element_type() {
        let tags = FieldDescriptor::collection("tags", ValueType::String);
        assert!(tags.is_plural());
        assert_eq!(tags.element_type(), &ValueType::String);
        assert_eq!(tags.target_entity(), None);

        let labels = FieldDescriptor::map("labels", ValueType::String, ValueType::Integer);
        assert_eq!(labels.element_type(), &ValueType::Integer);
    }

    #[test]
    fn test_association_target() {
        let addresses = FieldDescriptor::to_many::<Address>("addresses", Association::OneToMany);
        assert_eq!(addresses.target_entity(), Some(EntityName::of::<Address>()));
        assert_eq!(addresses.kind, ElementKind::Collection);

        let home = FieldDescriptor::to_one::<Address>("home", Association::ManyToOne)
            .join_on(JoinMapping::foreign_key("home_id", "id"));
        assert!(!home.is_plural());
        assert_eq!(home.storage.column, "home");
        assert!(home.storage.join.is_some());
    }

    #[test]
    fn test_column_override() {
        let field = FieldDescriptor::scalar("firstName", ValueType::String).column("first_name");
        assert_eq!(field.name, "firstName");
        assert_eq!(field.storage.column, "first_name");
    }
}
