//! Statically registered entity metadata.

use super::{Descriptors, EntityMetadata, EntityName, FieldDescriptor};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Registration of one entity type.
#[derive(Debug, Clone)]
pub struct EntityModel {
    name: EntityName,
    storage: Option<String>,
    parent: Option<EntityName>,
    fields: Vec<FieldDescriptor>,
}

impl EntityModel {
    #[must_use]
    pub fn new<T: ?Sized + 'static>() -> Self {
        Self::named(EntityName::of::<T>())
    }

    #[must_use]
    pub fn named(name: EntityName) -> Self {
        Self {
            name,
            storage: None,
            parent: None,
            fields: Vec::new(),
        }
    }

    /// Table (relational) or collection (document) name. Defaults to the simple type name.
    #[must_use]
    pub fn table(mut self, storage: impl Into<String>) -> Self {
        self.storage = Some(storage.into());
        self
    }

    /// Inherit the fields of `P`.
    #[must_use]
    pub fn extends<P: ?Sized + 'static>(self) -> Self {
        self.extends_named(EntityName::of::<P>())
    }

    #[must_use]
    pub fn extends_named(mut self, parent: EntityName) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn field(mut self, mut field: FieldDescriptor) -> Self {
        field.owner = self.name;
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn name(&self) -> EntityName {
        self.name
    }
}

/// [`EntityMetadata`] backed by a table of registered [`EntityModel`]s.
///
/// Flattened descriptor lists are computed on first use and cached for the
/// registry's lifetime.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    models: HashMap<EntityName, EntityModel>,
    descriptors: DashMap<EntityName, Descriptors>,
}

impl EntityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn register(mut self, model: EntityModel) -> Self {
        self.descriptors.clear();
        self.models.insert(model.name, model);
        self
    }

    #[must_use]
    pub fn model(&self, entity: EntityName) -> Option<&EntityModel> {
        self.models.get(&entity)
    }

    /// Own fields first, then inherited ones not shadowed by a subtype field.
    fn flatten(&self, entity: EntityName) -> Descriptors {
        let mut seen_types = HashSet::new();
        let mut names = HashSet::new();
        let mut fields = Vec::new();
        let mut current = self.models.get(&entity);

        while let Some(model) = current {
            if !seen_types.insert(model.name) {
                tracing::warn!(entity = %entity, "Cyclic entity inheritance, stopping at {}", model.name);
                break;
            }
            for field in &model.fields {
                if !field.is_static && names.insert(field.name.clone()) {
                    fields.push(Arc::new(field.clone()));
                }
            }
            current = model.parent.and_then(|parent| self.models.get(&parent));
        }

        fields.into()
    }
}

impl EntityMetadata for EntityRegistry {
    fn is_entity_type(&self, entity: EntityName) -> bool {
        self.models.contains_key(&entity)
    }

    fn field_descriptors_of(&self, entity: EntityName) -> Option<Descriptors> {
        if let Some(cached) = self.descriptors.get(&entity) {
            return Some(Arc::clone(cached.value()));
        }
        if !self.models.contains_key(&entity) {
            return None;
        }

        let computed = self.flatten(entity);
        tracing::debug!(entity = %entity, fields = computed.len(), "Cached field descriptors");
        Some(Arc::clone(
            self.descriptors.entry(entity).or_insert(computed).value(),
        ))
    }

    fn storage_name(&self, entity: EntityName) -> Option<String> {
        self.models.get(&entity).map(|model| {
            model
                .storage
                .clone()
                .unwrap_or_else(|| model.name.simple().to_string())
        })
    }
}
