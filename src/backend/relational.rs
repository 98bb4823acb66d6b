//! Relational backend: specifications rendered as sea-query `SELECT` statements
//! and executed through Sea-ORM.
//!
//! The root entity is aliased `t0` and every join gets the next `tN` alias:
//!
//! ```sql
//! SELECT DISTINCT "t0".* FROM "people" AS "t0"
//!   LEFT JOIN "addresses" AS "t1" ON "t0"."id" = "t1"."person_id"
//! WHERE "t1"."city" = 'Bern'
//! ```

use crate::errors::{FilterError, SearchError};
use crate::executor::{Direction, Pageable, SpecificationExecutor};
use crate::joins::{JoinInfo, JoinType};
use crate::metadata::{EntityMetadata, EntityName, FieldDescriptor, JoinMapping};
use crate::specification::{QueryBuilder, Specification};
use crate::value::Value;
use async_trait::async_trait;
use sea_orm::sea_query::{
    Alias, Asterisk, Condition, Expr, Func, JoinType as SqlJoinType, Order, Query, SelectStatement,
    SimpleExpr,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait};
use std::marker::PhantomData;
use std::sync::Arc;

const ROOT_ALIAS: &str = "t0";

/// A table alias, and a column of it for value paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlPath {
    alias: String,
    column: Option<String>,
    /// Column of an element table, holding one element per row
    element: bool,
}

impl SqlPath {
    fn table(alias: String) -> Self {
        Self {
            alias,
            column: None,
            element: false,
        }
    }

    /// Resolver-checked paths always end in a value column.
    fn expr(&self) -> Expr {
        Expr::col((
            Alias::new(&self.alias),
            Alias::new(self.column.as_deref().unwrap_or_default()),
        ))
    }

    fn column_of(&self, column: &str) -> Expr {
        Expr::col((Alias::new(&self.alias), Alias::new(column)))
    }
}

#[derive(Debug, Clone)]
struct SqlJoin {
    join_type: SqlJoinType,
    table: String,
    alias: String,
    on: SimpleExpr,
}

/// [`QueryBuilder`] collecting joins for one `SELECT` over the root table.
pub struct SqlQueryBuilder<'m> {
    metadata: &'m dyn EntityMetadata,
    root: EntityName,
    /// Dialect the statement is built for; decides how case-sensitive matching renders
    backend: DatabaseBackend,
    table: String,
    joins: Vec<SqlJoin>,
    distinct: bool,
}

impl<'m> SqlQueryBuilder<'m> {
    /// # Errors
    ///
    /// Returns [`FilterError::Mapping`] when `root` has no table.
    pub fn new(
        metadata: &'m dyn EntityMetadata,
        root: EntityName,
        backend: DatabaseBackend,
    ) -> Result<Self, FilterError> {
        let table = metadata
            .storage_name(root)
            .ok_or_else(|| FilterError::mapping(root.simple(), "entity has no table"))?;
        Ok(Self {
            metadata,
            root,
            backend,
            table,
            joins: Vec::new(),
            distinct: false,
        })
    }

    fn next_alias(&self) -> String {
        format!("t{}", self.joins.len() + 1)
    }

    fn table_of(&self, entity: EntityName, field: &FieldDescriptor) -> Result<String, FilterError> {
        self.metadata.storage_name(entity).ok_or_else(|| {
            FilterError::mapping(
                &field.name,
                format!("{} has no table", entity.simple()),
            )
        })
    }

    fn push_join(&mut self, join_type: SqlJoinType, table: String, alias: &str, on: SimpleExpr) {
        self.joins.push(SqlJoin {
            join_type,
            table,
            alias: alias.to_string(),
            on,
        });
    }

    /// `SELECT [DISTINCT] t0.* FROM <root table> AS t0 <joins> [WHERE condition]`.
    #[must_use]
    pub fn select(&self, condition: Option<Condition>) -> SelectStatement {
        let mut select = Query::select();
        select
            .column((Alias::new(ROOT_ALIAS), Asterisk))
            .from_as(Alias::new(&self.table), Alias::new(ROOT_ALIAS));
        if self.distinct {
            select.distinct();
        }
        for join in &self.joins {
            select.join_as(
                join.join_type,
                Alias::new(&join.table),
                Alias::new(&join.alias),
                join.on.clone(),
            );
        }
        if let Some(condition) = condition {
            select.cond_where(condition);
        }
        select
    }

    fn single(expr: SimpleExpr) -> Condition {
        Condition::all().add(expr)
    }
}

/// Results are root rows, so a join may never invent a root: `Right` keeps every
/// root like `Left` does.
fn sql_join_type(join_type: JoinType) -> SqlJoinType {
    match join_type {
        JoinType::Inner => SqlJoinType::InnerJoin,
        JoinType::Left | JoinType::Right => SqlJoinType::LeftJoin,
    }
}

/// `LIKE` wildcards as `GLOB` ones; `GLOB` metacharacters are bracketed to stay literal.
fn glob_pattern(pattern: &str) -> String {
    let mut glob = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '%' => glob.push('*'),
            '_' => glob.push('?'),
            '*' | '?' | '[' => {
                glob.push('[');
                glob.push(c);
                glob.push(']');
            }
            _ => glob.push(c),
        }
    }
    glob
}

/// Bind value of a filter value.
#[must_use]
pub fn sql_value(value: &Value) -> sea_orm::Value {
    match value {
        Value::Null => sea_orm::Value::String(None),
        Value::String(text) | Value::Enum(text) => text.clone().into(),
        Value::Integer(number) => (*number).into(),
        Value::Float(number) => (*number).into(),
        Value::Boolean(flag) => (*flag).into(),
        Value::Uuid(id) => (*id).into(),
        Value::Date(date) => (*date).into(),
        Value::DateTime(timestamp) => (*timestamp).into(),
    }
}

impl QueryBuilder for SqlQueryBuilder<'_> {
    type Path = SqlPath;
    type Predicate = Condition;

    fn root(&mut self) -> SqlPath {
        SqlPath::table(ROOT_ALIAS.to_string())
    }

    fn distinct(&mut self) {
        self.distinct = true;
    }

    fn join(
        &mut self,
        parent: &SqlPath,
        field: &FieldDescriptor,
        join: JoinInfo,
    ) -> Result<SqlPath, FilterError> {
        let mapping = field
            .storage
            .join
            .as_ref()
            .ok_or_else(|| FilterError::mapping(&field.name, "association has no join mapping"))?;
        let join_type = sql_join_type(join.join_type);

        match mapping {
            JoinMapping::ForeignKey { local, remote } => {
                let target = field.target_entity().ok_or_else(|| {
                    FilterError::mapping(&field.name, "foreign key join needs an entity target")
                })?;
                let table = self.table_of(target, field)?;
                let alias = self.next_alias();
                let on = parent
                    .column_of(local)
                    .equals((Alias::new(&alias), Alias::new(remote)));
                self.push_join(join_type, table, &alias, on);
                Ok(SqlPath::table(alias))
            }
            JoinMapping::JoinTable {
                table: link,
                local_key,
                owner_column,
                target_column,
                remote_key,
            } => {
                let target = field.target_entity().ok_or_else(|| {
                    FilterError::mapping(&field.name, "join table needs an entity target")
                })?;
                let table = self.table_of(target, field)?;
                let link_alias = self.next_alias();
                let on = parent
                    .column_of(local_key)
                    .equals((Alias::new(&link_alias), Alias::new(owner_column)));
                self.push_join(join_type, link.clone(), &link_alias, on);

                let alias = self.next_alias();
                let on = Expr::col((Alias::new(&link_alias), Alias::new(target_column)))
                    .equals((Alias::new(&alias), Alias::new(remote_key)));
                self.push_join(join_type, table, &alias, on);
                Ok(SqlPath::table(alias))
            }
            JoinMapping::ElementTable {
                table,
                local_key,
                owner_column,
                element_column,
            } => {
                let alias = self.next_alias();
                let on = parent
                    .column_of(local_key)
                    .equals((Alias::new(&alias), Alias::new(owner_column)));
                self.push_join(join_type, table.clone(), &alias, on);
                Ok(SqlPath {
                    alias,
                    column: Some(element_column.clone()),
                    element: true,
                })
            }
        }
    }

    fn get(&mut self, parent: &SqlPath, field: &FieldDescriptor) -> Result<SqlPath, FilterError> {
        if parent.column.is_some() {
            return Err(FilterError::mapping(
                &field.name,
                "a column has no nested fields",
            ));
        }
        // embedded value objects live in the owner's table
        if field.target_entity().is_some() {
            return Ok(SqlPath::table(parent.alias.clone()));
        }
        Ok(SqlPath {
            alias: parent.alias.clone(),
            column: Some(field.storage.column.clone()),
            element: false,
        })
    }

    fn and(&self, predicates: Vec<Condition>) -> Condition {
        predicates
            .into_iter()
            .fold(Condition::all(), Condition::add)
    }

    fn or(&self, predicates: Vec<Condition>) -> Condition {
        predicates
            .into_iter()
            .fold(Condition::any(), Condition::add)
    }

    fn not(&self, predicate: Condition) -> Condition {
        predicate.not()
    }

    fn equal(&self, path: &SqlPath, value: &Value) -> Condition {
        Self::single(path.expr().eq(sql_value(value)))
    }

    fn is_null(&self, path: &SqlPath) -> Condition {
        Self::single(path.expr().is_null())
    }

    fn is_member(&self, path: &SqlPath, value: &Value) -> Condition {
        if path.element {
            self.equal(path, value)
        } else {
            Self::single(Expr::cust_with_exprs(
                "$1 = ANY($2)",
                [SimpleExpr::from(sql_value(value)), path.expr().into()],
            ))
        }
    }

    /// Case-sensitive on every dialect. SQLite's `LIKE` ignores ASCII case, so it
    /// gets `GLOB`; MySQL compares binary.
    fn like(&self, path: &SqlPath, pattern: &str) -> Condition {
        match self.backend {
            DatabaseBackend::Sqlite => Self::single(Expr::cust_with_exprs(
                "$1 GLOB $2",
                [
                    SimpleExpr::from(path.expr()),
                    SimpleExpr::from(glob_pattern(pattern)),
                ],
            )),
            DatabaseBackend::MySql => Self::single(Expr::cust_with_exprs(
                "$1 LIKE BINARY $2",
                [
                    SimpleExpr::from(path.expr()),
                    SimpleExpr::from(pattern.to_string()),
                ],
            )),
            _ => Self::single(path.expr().like(pattern)),
        }
    }

    fn ilike(&self, path: &SqlPath, pattern: &str) -> Condition {
        Self::single(
            SimpleExpr::FunctionCall(Func::upper(path.expr())).like(pattern.to_uppercase()),
        )
    }

    fn less_than(&self, path: &SqlPath, value: &Value) -> Condition {
        Self::single(path.expr().lt(sql_value(value)))
    }

    fn less_than_or_equal(&self, path: &SqlPath, value: &Value) -> Condition {
        Self::single(path.expr().lte(sql_value(value)))
    }

    fn greater_than(&self, path: &SqlPath, value: &Value) -> Condition {
        Self::single(path.expr().gt(sql_value(value)))
    }

    fn greater_than_or_equal(&self, path: &SqlPath, value: &Value) -> Condition {
        Self::single(path.expr().gte(sql_value(value)))
    }

    fn in_values(&self, path: &SqlPath, values: &[Value]) -> Condition {
        Self::single(path.expr().is_in(values.iter().map(sql_value)))
    }
}

/// Executes specifications of a Sea-ORM entity.
pub struct SeaOrmExecutor<E: EntityTrait> {
    db: DatabaseConnection,
    metadata: Arc<dyn EntityMetadata>,
    root: EntityName,
    _entity: PhantomData<fn() -> E>,
}

impl<E: EntityTrait> SeaOrmExecutor<E> {
    /// The entity's model type is the registered root.
    #[must_use]
    pub fn new(db: DatabaseConnection, metadata: Arc<dyn EntityMetadata>) -> Self {
        Self {
            db,
            metadata,
            root: EntityName::of::<E::Model>(),
            _entity: PhantomData,
        }
    }

    fn statement(
        &self,
        backend: DatabaseBackend,
        spec: &Specification<E::Model>,
        pageable: &Pageable,
    ) -> Result<SelectStatement, SearchError> {
        let mut builder = SqlQueryBuilder::new(self.metadata.as_ref(), self.root, backend)?;
        let condition = spec.to_predicate(&mut builder)?;
        let mut select = builder.select(condition);

        for order in &pageable.sort {
            let direction = match order.direction {
                Direction::Asc => Order::Asc,
                Direction::Desc => Order::Desc,
            };
            select.order_by(
                (Alias::new(ROOT_ALIAS), Alias::new(&order.field.storage.column)),
                direction,
            );
        }
        if let Some(limit) = pageable.limit {
            select.limit(limit);
        }
        if pageable.offset > 0 {
            select.offset(pageable.offset);
        }
        Ok(select)
    }

    /// Runs `spec` on `conn`, e.g. a read-only transaction.
    ///
    /// # Errors
    ///
    /// Returns unmapped paths as filter errors and database failures as backend errors.
    pub async fn find_with<C: ConnectionTrait>(
        &self,
        conn: &C,
        spec: &Specification<E::Model>,
        pageable: &Pageable,
    ) -> Result<Vec<E::Model>, SearchError> {
        let backend = conn.get_database_backend();
        let select = self.statement(backend, spec, pageable)?;
        let statement = backend.build(&select);
        tracing::debug!(entity = %self.root, sql = %statement, "Executing search");
        Ok(E::find().from_raw_sql(statement).all(conn).await?)
    }

    /// Counts the distinct entities matching `spec` on `conn`.
    ///
    /// # Errors
    ///
    /// Returns unmapped paths as filter errors and database failures as backend errors.
    pub async fn count_with<C: ConnectionTrait>(
        &self,
        conn: &C,
        spec: &Specification<E::Model>,
    ) -> Result<u64, SearchError> {
        let backend = conn.get_database_backend();
        let matches = self.statement(backend, spec, &Pageable::unpaged())?;
        let mut count = Query::select();
        count
            .expr_as(Expr::cust("COUNT(*)"), Alias::new("num_items"))
            .from_subquery(matches, Alias::new("matches"));
        let statement = backend.build(&count);

        let total = match conn.query_one(statement).await? {
            Some(row) => row.try_get::<i64>("", "num_items")?,
            None => 0,
        };
        Ok(u64::try_from(total).unwrap_or(0))
    }
}

#[async_trait]
impl<E> SpecificationExecutor<E::Model> for SeaOrmExecutor<E>
where
    E: EntityTrait,
    E::Model: Send + Sync + 'static,
{
    async fn find(
        &self,
        spec: &Specification<E::Model>,
        pageable: &Pageable,
    ) -> Result<Vec<E::Model>, SearchError> {
        self.find_with(&self.db, spec, pageable).await
    }

    async fn count(&self, spec: &Specification<E::Model>) -> Result<u64, SearchError> {
        self.count_with(&self.db, spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{ExpressionResolver, parse};
    use crate::fixtures::{self, Person};
    use crate::joins::{FieldJoinHandler, JoinHandlers, compute_entity_joins};
    use crate::metadata::{AliasResolvers, EntityRegistry};
    use crate::specification::to_specification;
    use crate::value::DefaultConversionService;

    fn render(registry: &EntityRegistry, source: &str, handlers: &JoinHandlers) -> String {
        render_for(DatabaseBackend::Sqlite, registry, source, handlers)
    }

    fn render_for(
        backend: DatabaseBackend,
        registry: &EntityRegistry,
        source: &str,
        handlers: &JoinHandlers,
    ) -> String {
        let aliases = AliasResolvers::new();
        let node = parse(source).unwrap();
        let expression = ExpressionResolver::new(registry, &aliases, &DefaultConversionService)
            .resolve(fixtures::person(), &node)
            .unwrap();
        let joins = Arc::new(compute_entity_joins(registry, fixtures::person(), handlers));
        let spec: Specification<Person> = to_specification(expression, joins);

        let mut builder = SqlQueryBuilder::new(registry, fixtures::person(), backend).unwrap();
        let condition = spec.to_predicate(&mut builder).unwrap();
        backend.build(&builder.select(condition)).to_string()
    }

    fn sql(source: &str) -> String {
        render(&fixtures::registry(), source, &JoinHandlers::new())
    }

    #[test]
    fn test_root_column_filter() {
        let sql = sql("firstName = 'John'");
        assert!(sql.starts_with(r#"SELECT DISTINCT "t0".* FROM "people" AS "t0""#), "{sql}");
        assert!(sql.contains(r#""t0"."first_name" = 'John'"#), "{sql}");
        assert!(!sql.contains("JOIN"), "{sql}");
    }

    #[test]
    fn test_foreign_key_join() {
        let sql = sql("addresses.city = 'Bern'");
        assert!(
            sql.contains(r#"LEFT JOIN "addresses" AS "t1" ON "t0"."id" = "t1"."person_id""#),
            "{sql}"
        );
        assert!(sql.contains(r#""t1"."city" = 'Bern'"#), "{sql}");
    }

    #[test]
    fn test_nested_join_chain_is_shared() {
        let sql = sql("addresses.city = 'Bern' and addresses.country.code = 'CH'");
        assert_eq!(sql.matches("JOIN").count(), 2, "{sql}");
        assert!(
            sql.contains(r#"LEFT JOIN "countries" AS "t2" ON "t1"."country_id" = "t2"."id""#),
            "{sql}"
        );
    }

    #[test]
    fn test_element_collection_membership() {
        let sql = sql("tags = 'rust'");
        assert!(
            sql.contains(r#"LEFT JOIN "person_tags" AS "t1" ON "t0"."id" = "t1"."person_id""#),
            "{sql}"
        );
        assert!(sql.contains(r#""t1"."tag" = 'rust'"#), "{sql}");
    }

    #[test]
    fn test_embedded_columns_stay_on_owner() {
        let sql = sql("location.city = 'Bern'");
        assert!(sql.contains(r#""t0"."location_city" = 'Bern'"#), "{sql}");
    }

    #[test]
    fn test_operators() {
        let sql = sql("height >= 150 and email is null and lastName in ('Doe', 'Smith')");
        assert!(sql.contains(r#""t0"."height" >= 150"#), "{sql}");
        assert!(sql.contains(r#""t0"."email" IS NULL"#), "{sql}");
        assert!(sql.contains(r#""t0"."last_name" IN ('Doe', 'Smith')"#), "{sql}");

        let sql = self::sql("firstName imatches 'jo%'");
        assert!(sql.contains(r#"UPPER("t0"."first_name") LIKE 'JO%'"#), "{sql}");

        let sql = self::sql("not firstName = 'John'");
        assert!(sql.contains("NOT"), "{sql}");
    }

    #[test]
    fn test_matches_is_case_sensitive_on_every_dialect() {
        let registry = fixtures::registry();
        let handlers = JoinHandlers::new();
        let source = "lastName matches 'd*_[x'";

        let sql = render_for(DatabaseBackend::Sqlite, &registry, source, &handlers);
        assert!(sql.contains(r#""t0"."last_name" GLOB 'd*?[[]x'"#), "{sql}");

        let sql = render_for(DatabaseBackend::Postgres, &registry, source, &handlers);
        assert!(sql.contains(r#""t0"."last_name" LIKE 'd%_[x'"#), "{sql}");

        let sql = render_for(DatabaseBackend::MySql, &registry, source, &handlers);
        assert!(sql.contains("`t0`.`last_name` LIKE BINARY 'd%_[x'"), "{sql}");
    }

    #[test]
    fn test_right_join_keeps_every_root() {
        let handlers = JoinHandlers::new().with(FieldJoinHandler::new::<Person>(
            "employer",
            JoinInfo::new(JoinType::Right, true),
        ));
        let sql = render(&fixtures::registry(), "employer.name = 'Acme'", &handlers);
        assert!(sql.contains(r#"LEFT JOIN "companies""#), "{sql}");
        assert!(!sql.contains("RIGHT JOIN"), "{sql}");
    }

    #[test]
    fn test_fetch_join_is_rendered() {
        let handlers = JoinHandlers::new().with(FieldJoinHandler::new::<Person>(
            "employer",
            JoinInfo::new(JoinType::Inner, true),
        ));
        let sql = render(&fixtures::registry(), "height > 1", &handlers);
        assert!(
            sql.contains(r#"INNER JOIN "companies" AS "t1" ON "t0"."employer_id" = "t1"."id""#),
            "{sql}"
        );
    }

    #[test]
    fn test_missing_join_mapping_is_reported() {
        use crate::metadata::{Association, EntityModel};
        use crate::value::ValueType;

        let registry = EntityRegistry::new()
            .register(
                EntityModel::new::<Person>()
                    .table("people")
                    .field(FieldDescriptor::scalar("id", ValueType::Integer))
                    .field(FieldDescriptor::to_one::<fixtures::Company>(
                        "employer",
                        Association::ManyToOne,
                    )),
            )
            .register(
                EntityModel::new::<fixtures::Company>()
                    .field(FieldDescriptor::scalar("name", ValueType::String)),
            );
        let aliases = AliasResolvers::new();
        let expression = ExpressionResolver::new(&registry, &aliases, &DefaultConversionService)
            .resolve(fixtures::person(), &parse("employer.name = 'x'").unwrap())
            .unwrap();
        let joins = Arc::new(compute_entity_joins(
            &registry,
            fixtures::person(),
            &JoinHandlers::new(),
        ));
        let spec: Specification<Person> = to_specification(expression, joins);
        let mut builder =
            SqlQueryBuilder::new(&registry, fixtures::person(), DatabaseBackend::Sqlite).unwrap();
        let errors = spec.to_predicate(&mut builder).unwrap_err();
        assert!(matches!(
            errors.iter().next(),
            Some(FilterError::Mapping { path, .. }) if path == "employer.name"
        ));
    }
}
