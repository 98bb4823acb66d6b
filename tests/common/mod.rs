#![allow(dead_code)]

use chrono::NaiveDate;
use crudsearch::backend::DocumentStore;
use crudsearch::{
    AliasResolvers, Association, EntityMetadata, EntityModel, EntityRegistry, FieldDescriptor,
    JoinMapping, ValueType, metadata::StaticAliases,
};
use indexmap::IndexMap;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, DbErr, Schema};
use sea_orm_migration::prelude::*;
use serde::Serialize;
use std::sync::Arc;

pub mod address;
pub mod company;
pub mod country;
pub mod person;
pub mod person_tag;

pub const STATUS: &[&str] = &["Active", "Retired"];

/// Metadata of the test schema, shared by both backends.
pub fn registry() -> EntityRegistry {
    EntityRegistry::new()
        .register(
            EntityModel::new::<person::Model>()
                .table("people")
                .field(FieldDescriptor::scalar("id", ValueType::Integer))
                .field(FieldDescriptor::scalar("firstName", ValueType::String).column("first_name"))
                .field(FieldDescriptor::scalar("lastName", ValueType::String).column("last_name"))
                .field(FieldDescriptor::scalar("height", ValueType::Integer))
                .field(FieldDescriptor::scalar("email", ValueType::String))
                .field(FieldDescriptor::scalar("status", ValueType::Enum(STATUS)))
                .field(FieldDescriptor::scalar("birthDate", ValueType::Date).column("birth_date"))
                .field(FieldDescriptor::element_collection(
                    "tags",
                    ValueType::String,
                    JoinMapping::element_table("person_tags", "id", "person_id", "tag"),
                ))
                .field(
                    FieldDescriptor::to_many::<address::Model>("addresses", Association::OneToMany)
                        .join_on(JoinMapping::foreign_key("id", "person_id")),
                )
                .field(
                    FieldDescriptor::to_one::<company::Model>("employer", Association::ManyToOne)
                        .join_on(JoinMapping::foreign_key("employer_id", "id")),
                ),
        )
        .register(
            EntityModel::new::<address::Model>()
                .table("addresses")
                .field(FieldDescriptor::scalar("id", ValueType::Integer))
                .field(FieldDescriptor::scalar("street", ValueType::String))
                .field(FieldDescriptor::scalar("city", ValueType::String))
                .field(
                    FieldDescriptor::to_one::<country::Model>("country", Association::ManyToOne)
                        .join_on(JoinMapping::foreign_key("country_id", "id")),
                ),
        )
        .register(
            EntityModel::new::<company::Model>()
                .table("companies")
                .field(FieldDescriptor::scalar("id", ValueType::Integer))
                .field(FieldDescriptor::scalar("name", ValueType::String))
                .field(
                    FieldDescriptor::to_one::<country::Model>("country", Association::ManyToOne)
                        .join_on(JoinMapping::foreign_key("country_id", "id")),
                ),
        )
        .register(
            EntityModel::new::<country::Model>()
                .table("countries")
                .field(FieldDescriptor::scalar("id", ValueType::Integer))
                .field(FieldDescriptor::scalar("code", ValueType::String)),
        )
}

pub fn metadata() -> Arc<dyn EntityMetadata> {
    Arc::new(registry())
}

/// External parameter names accepted besides the field names.
pub fn aliases() -> AliasResolvers {
    AliasResolvers::new().with(
        StaticAliases::new()
            .alias::<person::Model>("surname", "lastName")
            .alias::<person::Model>("company", "employer"),
    )
}

fn date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

pub fn people() -> Vec<person::Model> {
    let row = |id, first: &str, last: &str, height, email: Option<&str>, status: &str, birth, employer| {
        person::Model {
            id,
            first_name: first.to_string(),
            last_name: last.to_string(),
            height,
            email: email.map(String::from),
            status: status.to_string(),
            birth_date: birth,
            employer_id: employer,
        }
    };
    vec![
        row(1, "John", "Doe", 180, Some("john@example.com"), "Active", date(1985, 4, 12), Some(10)),
        row(2, "Jane", "Doe", 165, None, "Retired", date(1950, 1, 30), None),
        row(3, "Max", "Muster", 172, Some("max@example.ch"), "Active", date(1992, 11, 2), Some(11)),
        row(4, "Anna", "Berg", 158, Some("anna@example.com"), "Active", None, Some(10)),
    ]
}

pub fn addresses() -> Vec<address::Model> {
    let row = |id, person_id, street: &str, city: &str, country_id| address::Model {
        id,
        person_id,
        street: street.to_string(),
        city: city.to_string(),
        country_id: Some(country_id),
    };
    vec![
        row(100, 1, "Main", "Bern", 1),
        row(101, 1, "Side", "Basel", 1),
        row(102, 3, "Main", "Berlin", 2),
        row(103, 4, "Lake", "Geneva", 1),
    ]
}

pub fn countries() -> Vec<country::Model> {
    vec![
        country::Model {
            id: 1,
            code: "CH".to_string(),
        },
        country::Model {
            id: 2,
            code: "DE".to_string(),
        },
    ]
}

pub fn companies() -> Vec<company::Model> {
    vec![
        company::Model {
            id: 10,
            name: "Acme".to_string(),
            country_id: Some(1),
        },
        company::Model {
            id: 11,
            name: "Globex".to_string(),
            country_id: Some(2),
        },
    ]
}

pub fn tags() -> Vec<person_tag::Model> {
    let row = |id, person_id, tag: &str| person_tag::Model {
        id,
        person_id,
        tag: tag.to_string(),
    };
    vec![row(1, 1, "rust"), row(2, 1, "sql"), row(3, 2, "go"), row(4, 4, "rust")]
}

pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    seed(&db).await?;
    Ok(db)
}

async fn seed(db: &DatabaseConnection) -> Result<(), DbErr> {
    for model in countries() {
        country::ActiveModel::from(model).insert(db).await?;
    }
    for model in companies() {
        company::ActiveModel::from(model).insert(db).await?;
    }
    for model in people() {
        person::ActiveModel::from(model).insert(db).await?;
    }
    for model in addresses() {
        address::ActiveModel::from(model).insert(db).await?;
    }
    for model in tags() {
        person_tag::ActiveModel::from(model).insert(db).await?;
    }
    Ok(())
}

fn documents<T: Serialize>(models: Vec<T>) -> Vec<serde_json::Value> {
    models
        .iter()
        .map(|model| serde_json::to_value(model).expect("models serialize"))
        .collect()
}

/// The same rows as the database, one collection per table.
pub fn setup_test_store() -> DocumentStore {
    let store = DocumentStore::new();
    store.insert_all("people", documents(people()));
    store.insert_all("addresses", documents(addresses()));
    store.insert_all("countries", documents(countries()));
    store.insert_all("companies", documents(companies()));
    store.insert_all("person_tags", documents(tags()));
    store
}

/// Query parameters from `key=value` pairs, repeated keys grouped.
pub fn params(pairs: &[(&str, &str)]) -> IndexMap<String, Vec<String>> {
    let mut params: IndexMap<String, Vec<String>> = IndexMap::new();
    for (key, value) in pairs {
        params
            .entry((*key).to_string())
            .or_default()
            .push((*value).to_string());
    }
    params
}

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(CreateSearchTables)]
    }
}

pub struct CreateSearchTables;

#[async_trait::async_trait]
impl MigrationName for CreateSearchTables {
    fn name(&self) -> &'static str {
        "m20240101_000001_create_search_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for CreateSearchTables {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let schema = Schema::new(manager.get_database_backend());
        manager
            .create_table(schema.create_table_from_entity(country::Entity))
            .await?;
        manager
            .create_table(schema.create_table_from_entity(company::Entity))
            .await?;
        manager
            .create_table(schema.create_table_from_entity(person::Entity))
            .await?;
        manager
            .create_table(schema.create_table_from_entity(address::Entity))
            .await?;
        manager
            .create_table(schema.create_table_from_entity(person_tag::Entity))
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in ["person_tags", "addresses", "people", "companies", "countries"] {
            manager
                .drop_table(Table::drop().table(Alias::new(table)).to_owned())
                .await?;
        }
        Ok(())
    }
}

/// Ids of `models`, sorted.
pub fn ids(models: &[person::Model]) -> Vec<i32> {
    let mut ids: Vec<i32> = models.iter().map(|model| model.id).collect();
    ids.sort_unstable();
    ids
}

