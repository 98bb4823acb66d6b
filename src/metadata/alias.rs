//! External field aliases.
//!
//! Clients may address a field by a public name (`firstName`) that differs from the
//! registered field name (`first_name`). Resolvers are consulted in order; the
//! first mapping wins and an unmapped name passes through unchanged.

use super::EntityName;
use std::collections::HashMap;
use std::sync::Arc;

pub trait AliasResolver: Send + Sync {
    /// Internal field name for `external` on `entity`, or `None` when unmapped.
    fn resolve(&self, entity: EntityName, external: &str) -> Option<String>;
}

impl<F> AliasResolver for F
where
    F: Fn(EntityName, &str) -> Option<String> + Send + Sync,
{
    fn resolve(&self, entity: EntityName, external: &str) -> Option<String> {
        self(entity, external)
    }
}

/// Ordered chain of resolvers.
#[derive(Clone, Default)]
pub struct AliasResolvers(Vec<Arc<dyn AliasResolver>>);

impl AliasResolvers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, resolver: impl AliasResolver + 'static) -> Self {
        self.0.push(Arc::new(resolver));
        self
    }

    /// Internal name of `external`; identity when no resolver maps it.
    #[must_use]
    pub fn resolve(&self, entity: EntityName, external: &str) -> String {
        self.0
            .iter()
            .find_map(|resolver| resolver.resolve(entity, external))
            .unwrap_or_else(|| external.to_string())
    }
}

impl std::fmt::Debug for AliasResolvers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasResolvers")
            .field("resolvers", &self.0.len())
            .finish()
    }
}

/// Table of aliases per entity type.
#[derive(Debug, Clone, Default)]
pub struct StaticAliases {
    aliases: HashMap<(EntityName, String), String>,
}

impl StaticAliases {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn alias<T: ?Sized + 'static>(
        self,
        external: impl Into<String>,
        internal: impl Into<String>,
    ) -> Self {
        self.alias_for(EntityName::of::<T>(), external, internal)
    }

    #[must_use]
    pub fn alias_for(
        mut self,
        entity: EntityName,
        external: impl Into<String>,
        internal: impl Into<String>,
    ) -> Self {
        self.aliases
            .insert((entity, external.into()), internal.into());
        self
    }
}

impl AliasResolver for StaticAliases {
    fn resolve(&self, entity: EntityName, external: &str) -> Option<String> {
        self.aliases
            .get(&(entity, external.to_string()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Person;
    struct Address;

    #[test]
    fn test_unmapped_name_is_identity() {
        let resolvers = AliasResolvers::new();
        assert_eq!(
            resolvers.resolve(EntityName::of::<Person>(), "firstName"),
            "firstName"
        );
    }

    #[test]
    fn test_static_aliases_are_per_entity() {
        let resolvers = AliasResolvers::new().with(
            StaticAliases::new()
                .alias::<Person>("firstName", "first_name")
                .alias::<Address>("zip", "postal_code"),
        );
        assert_eq!(
            resolvers.resolve(EntityName::of::<Person>(), "firstName"),
            "first_name"
        );
        assert_eq!(resolvers.resolve(EntityName::of::<Person>(), "zip"), "zip");
        assert_eq!(
            resolvers.resolve(EntityName::of::<Address>(), "zip"),
            "postal_code"
        );
    }

    #[test]
    fn test_first_resolver_wins() {
        let resolvers = AliasResolvers::new()
            .with(|_: EntityName, name: &str| (name == "a").then(|| "first".to_string()))
            .with(|_: EntityName, _: &str| Some("second".to_string()));
        assert_eq!(resolvers.resolve(EntityName::named("X"), "a"), "first");
        assert_eq!(resolvers.resolve(EntityName::named("X"), "b"), "second");
    }
}
