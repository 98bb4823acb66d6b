//! Entity model shared by the unit tests.
//!
//! ```text
//! Person ──addresses──> Address ──country──> Country
//!   │                     └──resident──> Person
//!   └──employer──> Company ──country──> Country
//! ```

use crate::metadata::{
    Association, EntityModel, EntityName, EntityRegistry, FieldDescriptor, JoinMapping,
};
use crate::value::ValueType;

#[derive(Debug)]
pub struct Person;
pub struct Address;
pub struct Company;
pub struct Country;
pub struct Location;

pub const STATUS: &[&str] = &["Active", "Retired"];

pub fn person() -> EntityName {
    EntityName::of::<Person>()
}

pub fn registry() -> EntityRegistry {
    EntityRegistry::new()
        .register(
            EntityModel::new::<Person>()
                .table("people")
                .field(FieldDescriptor::scalar("id", ValueType::Integer))
                .field(FieldDescriptor::scalar("firstName", ValueType::String).column("first_name"))
                .field(FieldDescriptor::scalar("lastName", ValueType::String).column("last_name"))
                .field(FieldDescriptor::scalar("height", ValueType::Integer))
                .field(FieldDescriptor::scalar("email", ValueType::String))
                .field(FieldDescriptor::scalar("birthDate", ValueType::Date).column("birth_date"))
                .field(FieldDescriptor::scalar("status", ValueType::Enum(STATUS)))
                .field(FieldDescriptor::embedded::<Location>("location"))
                .field(FieldDescriptor::element_collection(
                    "tags",
                    ValueType::String,
                    JoinMapping::element_table("person_tags", "id", "person_id", "tag"),
                ))
                .field(
                    FieldDescriptor::to_many::<Address>("addresses", Association::OneToMany)
                        .join_on(JoinMapping::foreign_key("id", "person_id")),
                )
                .field(
                    FieldDescriptor::to_one::<Company>("employer", Association::ManyToOne)
                        .join_on(JoinMapping::foreign_key("employer_id", "id")),
                ),
        )
        .register(
            EntityModel::new::<Address>()
                .table("addresses")
                .field(FieldDescriptor::scalar("id", ValueType::Integer))
                .field(FieldDescriptor::scalar("street", ValueType::String))
                .field(FieldDescriptor::scalar("city", ValueType::String))
                .field(
                    FieldDescriptor::to_one::<Country>("country", Association::ManyToOne)
                        .join_on(JoinMapping::foreign_key("country_id", "id")),
                )
                .field(
                    FieldDescriptor::to_one::<Person>("resident", Association::ManyToOne)
                        .join_on(JoinMapping::foreign_key("person_id", "id")),
                ),
        )
        .register(
            EntityModel::new::<Company>()
                .table("companies")
                .field(FieldDescriptor::scalar("id", ValueType::Integer))
                .field(FieldDescriptor::scalar("name", ValueType::String))
                .field(
                    FieldDescriptor::to_one::<Country>("country", Association::ManyToOne)
                        .join_on(JoinMapping::foreign_key("country_id", "id")),
                ),
        )
        .register(
            EntityModel::new::<Country>()
                .table("countries")
                .field(FieldDescriptor::scalar("id", ValueType::Integer))
                .field(FieldDescriptor::scalar("code", ValueType::String)),
        )
        .register(
            EntityModel::new::<Location>()
                .field(FieldDescriptor::scalar("city", ValueType::String).column("location_city")),
        )
}
