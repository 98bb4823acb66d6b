use super::{EntityJoin, EntityJoins, JoinHandlers, join_name};
use crate::metadata::{EntityMetadata, EntityName, FieldDescriptor};
use dashmap::DashMap;
use std::sync::Arc;

/// Computes the join graph of `root`.
///
/// Fields are visited in name order at every level, so the result only depends on
/// the set of fields, never on the order they were registered in. Terminates on
/// cyclic type graphs since every recorded join name is visited once.
#[must_use]
pub fn compute_entity_joins(
    metadata: &dyn EntityMetadata,
    root: EntityName,
    handlers: &JoinHandlers,
) -> EntityJoins {
    let mut joins = EntityJoins::new(root);
    let mut traversal = Traversal {
        metadata,
        root,
        handlers,
        joins: &mut joins,
    };
    traversal.visit(root, "", &[]);
    joins
}

struct Traversal<'a> {
    metadata: &'a dyn EntityMetadata,
    root: EntityName,
    handlers: &'a JoinHandlers,
    joins: &'a mut EntityJoins,
}

impl Traversal<'_> {
    fn visit(&mut self, entity: EntityName, parent_path: &str, parent_hops: &[Arc<FieldDescriptor>]) {
        let Some(descriptors) = self.metadata.field_descriptors_of(entity) else {
            return;
        };
        let mut fields: Vec<&Arc<FieldDescriptor>> = descriptors
            .iter()
            .filter(|field| !field.is_static && self.is_association(field))
            .collect();
        fields.sort_by(|a, b| a.name.cmp(&b.name));

        for field in fields {
            let target = field.target_entity();
            if target == Some(self.root) {
                continue;
            }
            let name = join_name(field);
            if self.joins.contains(&name) {
                continue;
            }

            let field_path = if parent_path.is_empty() {
                field.name.clone()
            } else {
                format!("{parent_path}.{}", field.name)
            };
            let mut hops = parent_hops.to_vec();
            hops.push(Arc::clone(field));
            let info = self.handlers.info(field);

            self.joins.insert(EntityJoin {
                field_path: field_path.clone(),
                join_name: name,
                join_type: info.join_type,
                fetched: info.fetched,
                hops: hops.clone(),
            });

            if let Some(target) = target {
                self.visit(target, &field_path, &hops);
            }
        }
    }

    fn is_association(&self, field: &FieldDescriptor) -> bool {
        field
            .association
            .is_some_and(|marker| self.metadata.is_association_marker(marker))
    }
}

/// Memoizing join graph source for one handler chain.
pub struct JoinGraphBuilder {
    metadata: Arc<dyn EntityMetadata>,
    handlers: JoinHandlers,
    cache: DashMap<EntityName, Arc<EntityJoins>>,
}

impl JoinGraphBuilder {
    #[must_use]
    pub fn new(metadata: Arc<dyn EntityMetadata>, handlers: JoinHandlers) -> Self {
        Self {
            metadata,
            handlers,
            cache: DashMap::new(),
        }
    }

    /// Join graph of `root`, computed on first request.
    #[must_use]
    pub fn joins_for(&self, root: EntityName) -> Arc<EntityJoins> {
        if let Some(cached) = self.cache.get(&root) {
            return Arc::clone(cached.value());
        }
        let computed = Arc::new(compute_entity_joins(
            self.metadata.as_ref(),
            root,
            &self.handlers,
        ));
        tracing::debug!(entity = %root, joins = computed.len(), "Computed join graph");
        Arc::clone(self.cache.entry(root).or_insert(computed).value())
    }

    #[must_use]
    pub fn handlers(&self) -> &JoinHandlers {
        &self.handlers
    }
}

impl std::fmt::Debug for JoinGraphBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinGraphBuilder")
            .field("handlers", &self.handlers)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, Address, Company, Country, Person};
    use crate::joins::{AssociationJoinHandler, FieldJoinHandler, JoinInfo, JoinType};
    use crate::metadata::{Association, EntityModel, EntityRegistry, JoinMapping};
    use crate::value::ValueType;

    fn paths(joins: &EntityJoins) -> Vec<&str> {
        joins.iter().map(|join| join.field_path.as_str()).collect()
    }

    #[test]
    fn test_single_association() {
        struct Owner;
        struct Item;
        let registry = EntityRegistry::new()
            .register(
                EntityModel::new::<Owner>()
                    .field(FieldDescriptor::scalar("name", ValueType::String))
                    .field(FieldDescriptor::to_many::<Item>("addresses", Association::OneToMany)),
            )
            .register(
                EntityModel::new::<Item>().field(FieldDescriptor::scalar("city", ValueType::String)),
            );

        let joins = compute_entity_joins(&registry, EntityName::of::<Owner>(), &JoinHandlers::new());
        assert_eq!(joins.len(), 1);
        let join = joins.iter().next().unwrap();
        assert_eq!(join.field_path, "addresses");
        assert_eq!(join.join_name, std::any::type_name::<Item>());
        assert_eq!(join.join_type, JoinType::Left);
        assert!(!join.fetched);
    }

    #[test]
    fn test_cycles_terminate_and_root_is_never_joined() {
        let registry = fixtures::registry();
        let joins = compute_entity_joins(&registry, fixtures::person(), &JoinHandlers::new());
        assert!(joins.iter().all(|join| !join.field_path.ends_with("resident")));
        assert!(!joins.contains(fixtures::person().qualified()));
    }

    #[test]
    fn test_diamond_is_deduplicated() {
        let registry = fixtures::registry();
        let joins = compute_entity_joins(&registry, fixtures::person(), &JoinHandlers::new());
        // Country is reachable through addresses and through employer
        assert_eq!(
            paths(&joins),
            vec!["addresses", "addresses.country", "employer", "tags"]
        );
        let country = joins.get(EntityName::of::<Country>().qualified()).unwrap();
        assert_eq!(country.hops.len(), 2);
        assert_eq!(country.hops[0].name, "addresses");
        assert!(joins.contains(EntityName::of::<Company>().qualified()));
        assert!(joins.contains(&format!("{}.tags", fixtures::person().qualified())));
    }

    #[test]
    fn test_handlers_decide_join_info() {
        let registry = fixtures::registry();
        let handlers = JoinHandlers::new()
            .with(FieldJoinHandler::new::<Person>(
                "employer",
                JoinInfo::new(JoinType::Inner, true),
            ))
            .with(AssociationJoinHandler::new(
                Association::ManyToOne,
                JoinInfo::new(JoinType::Right, false),
            ));
        let joins = compute_entity_joins(&registry, fixtures::person(), &handlers);

        let employer = joins.get(EntityName::of::<Company>().qualified()).unwrap();
        assert_eq!(employer.info(), JoinInfo::new(JoinType::Inner, true));
        let country = joins.get(EntityName::of::<Country>().qualified()).unwrap();
        assert_eq!(country.join_type, JoinType::Right);
        let addresses = joins.get(EntityName::of::<Address>().qualified()).unwrap();
        assert_eq!(addresses.info(), JoinInfo::left());
        assert_eq!(joins.fetched().count(), 1);
    }

    #[test]
    fn test_registration_order_does_not_matter() {
        struct Hub;
        struct Leaf;
        let forward = EntityRegistry::new()
            .register(
                EntityModel::new::<Hub>()
                    .field(FieldDescriptor::to_one::<Leaf>("a", Association::ManyToOne))
                    .field(FieldDescriptor::to_one::<Leaf>("b", Association::OneToOne)),
            )
            .register(EntityModel::new::<Leaf>());
        let backward = EntityRegistry::new()
            .register(
                EntityModel::new::<Hub>()
                    .field(FieldDescriptor::to_one::<Leaf>("b", Association::OneToOne))
                    .field(FieldDescriptor::to_one::<Leaf>("a", Association::ManyToOne)),
            )
            .register(EntityModel::new::<Leaf>());
        let handlers = JoinHandlers::new().with(AssociationJoinHandler::new(
            Association::OneToOne,
            JoinInfo::new(JoinType::Inner, true),
        ));

        let root = EntityName::of::<Hub>();
        let first = compute_entity_joins(&forward, root, &handlers);
        let second = compute_entity_joins(&backward, root, &handlers);
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(first.iter().next().unwrap().field_path, "a");
    }

    #[test]
    fn test_plain_fields_and_unmarked_joins_are_ignored() {
        struct Root;
        struct Other;
        let registry = EntityRegistry::new()
            .register(
                EntityModel::new::<Root>()
                    .field(FieldDescriptor::scalar("name", ValueType::String))
                    .field(FieldDescriptor::collection("aliases", ValueType::String))
                    .field(
                        FieldDescriptor::to_one::<Other>("other", Association::ManyToOne)
                            .join_on(JoinMapping::foreign_key("other_id", "id"))
                            .static_field(),
                    ),
            )
            .register(EntityModel::new::<Other>());
        let joins = compute_entity_joins(&registry, EntityName::of::<Root>(), &JoinHandlers::new());
        assert!(joins.is_empty());
    }

    #[test]
    fn test_builder_memoizes_per_root() {
        let registry: Arc<dyn EntityMetadata> = Arc::new(fixtures::registry());
        let builder = JoinGraphBuilder::new(Arc::clone(&registry), JoinHandlers::new());
        let first = builder.joins_for(fixtures::person());
        let second = builder.joins_for(fixtures::person());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            *first,
            compute_entity_joins(registry.as_ref(), fixtures::person(), &JoinHandlers::new())
        );

        let address = builder.joins_for(EntityName::of::<Address>());
        assert!(address.contains(fixtures::person().qualified()));
    }
}
