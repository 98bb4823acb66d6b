//! Document backend: specifications evaluated in memory over JSON documents.
//!
//! Collections are keyed by the entity's storage name and every field by its
//! storage column. Associations with a [`JoinMapping`] are looked up in other
//! collections the way the relational backend joins tables; associations without
//! one, and embedded value objects, are nested in their owner document.
//!
//! A root document matches when any of its *binding rows* satisfies the predicate.
//! A binding row holds one candidate per join, so `addresses.city = 'Bern' and
//! addresses.street = 'Main'` needs one address with both, as in SQL. Comparisons
//! with missing values are unknown, never true.

use crate::errors::{FilterError, SearchError};
use crate::executor::{Direction, Pageable, SpecificationExecutor};
use crate::joins::{JoinInfo, JoinType};
use crate::metadata::{EntityMetadata, EntityName, FieldDescriptor, JoinMapping};
use crate::specification::{QueryBuilder, Specification};
use crate::value::Value;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// Named collections of JSON documents.
#[derive(Debug, Default)]
pub struct DocumentStore {
    collections: DashMap<String, Arc<Vec<Json>>>,
}

impl DocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, collection: &str, document: Json) {
        let mut entry = self.collections.entry(collection.to_string()).or_default();
        Arc::make_mut(entry.value_mut()).push(document);
    }

    pub fn insert_all(&self, collection: &str, documents: impl IntoIterator<Item = Json>) {
        let mut entry = self.collections.entry(collection.to_string()).or_default();
        Arc::make_mut(entry.value_mut()).extend(documents);
    }

    /// Snapshot of one collection; empty when it does not exist.
    #[must_use]
    pub fn collection(&self, name: &str) -> Arc<Vec<Json>> {
        self.collections
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .unwrap_or_default()
    }

    /// Number of documents in `collection`.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map_or(0, |entry| entry.value().len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections.iter().all(|entry| entry.value().is_empty())
    }

    pub fn clear(&self) {
        self.collections.clear();
    }
}

/// A binding (0 is the root document) and the keys to follow inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocPath {
    binding: usize,
    keys: Vec<String>,
}

impl DocPath {
    fn child(&self, key: &str) -> Self {
        let mut keys = self.keys.clone();
        keys.push(key.to_string());
        Self {
            binding: self.binding,
            keys,
        }
    }
}

/// Where the candidates of a binding come from.
#[derive(Debug, Clone)]
enum Source {
    /// Value (or each array element) under `key` of the parent
    Nested { key: String },
    /// Documents of `collection` whose `remote` equals the parent's `local`
    Reference {
        collection: String,
        local: String,
        remote: String,
    },
    /// Documents of `collection` linked through rows of `link`
    Link {
        link: String,
        local_key: String,
        owner_column: String,
        target_column: String,
        collection: String,
        remote_key: String,
    },
    /// `element_column` of the rows of `table` owned by the parent
    Elements {
        table: String,
        local_key: String,
        owner_column: String,
        element_column: String,
    },
}

#[derive(Debug, Clone)]
struct Binding {
    parent: DocPath,
    source: Source,
    join_type: JoinType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl Comparison {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Equal => ordering == Ordering::Equal,
            Self::LessThan => ordering == Ordering::Less,
            Self::LessThanOrEqual => ordering != Ordering::Greater,
            Self::GreaterThan => ordering == Ordering::Greater,
            Self::GreaterThanOrEqual => ordering != Ordering::Less,
        }
    }
}

/// Predicate over one binding row.
#[derive(Debug, Clone)]
pub enum DocPredicate {
    And(Vec<DocPredicate>),
    Or(Vec<DocPredicate>),
    Not(Box<DocPredicate>),
    Compare {
        path: DocPath,
        comparison: Comparison,
        value: Value,
    },
    IsNull(DocPath),
    Member {
        path: DocPath,
        value: Value,
    },
    Like {
        path: DocPath,
        pattern: String,
        case_insensitive: bool,
    },
    In {
        path: DocPath,
        values: Vec<Value>,
    },
}

/// Three-valued logic of SQL predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    fn from_bool(flag: bool) -> Self {
        if flag { Self::True } else { Self::False }
    }

    fn not(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Unknown => Self::Unknown,
        }
    }
}

/// [`QueryBuilder`] collecting the bindings of one evaluation.
pub struct DocumentQueryBuilder<'m> {
    metadata: &'m dyn EntityMetadata,
    root: EntityName,
    bindings: Vec<Binding>,
    distinct: bool,
}

impl<'m> DocumentQueryBuilder<'m> {
    #[must_use]
    pub fn new(metadata: &'m dyn EntityMetadata, root: EntityName) -> Self {
        Self {
            metadata,
            root,
            bindings: Vec::new(),
            distinct: false,
        }
    }

    #[must_use]
    pub fn root_entity(&self) -> EntityName {
        self.root
    }

    #[must_use]
    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    fn collection_of(&self, field: &FieldDescriptor) -> Result<String, FilterError> {
        let target = field.target_entity().ok_or_else(|| {
            FilterError::mapping(&field.name, "reference needs an entity target")
        })?;
        self.metadata.storage_name(target).ok_or_else(|| {
            FilterError::mapping(
                &field.name,
                format!("{} has no collection", target.simple()),
            )
        })
    }

    /// Whether `document` has a binding row satisfying `predicate`.
    #[must_use]
    pub fn matches(
        &self,
        store: &DocumentStore,
        document: &Json,
        predicate: Option<&DocPredicate>,
    ) -> bool {
        Evaluator::new(store, &self.bindings).matches(document, predicate)
    }
}

impl QueryBuilder for DocumentQueryBuilder<'_> {
    type Path = DocPath;
    type Predicate = DocPredicate;

    fn root(&mut self) -> DocPath {
        DocPath {
            binding: 0,
            keys: Vec::new(),
        }
    }

    fn distinct(&mut self) {
        self.distinct = true;
    }

    fn join(
        &mut self,
        parent: &DocPath,
        field: &FieldDescriptor,
        join: JoinInfo,
    ) -> Result<DocPath, FilterError> {
        let source = match &field.storage.join {
            None => Source::Nested {
                key: field.storage.column.clone(),
            },
            Some(JoinMapping::ForeignKey { local, remote }) => Source::Reference {
                collection: self.collection_of(field)?,
                local: local.clone(),
                remote: remote.clone(),
            },
            Some(JoinMapping::JoinTable {
                table,
                local_key,
                owner_column,
                target_column,
                remote_key,
            }) => Source::Link {
                link: table.clone(),
                local_key: local_key.clone(),
                owner_column: owner_column.clone(),
                target_column: target_column.clone(),
                collection: self.collection_of(field)?,
                remote_key: remote_key.clone(),
            },
            Some(JoinMapping::ElementTable {
                table,
                local_key,
                owner_column,
                element_column,
            }) => Source::Elements {
                table: table.clone(),
                local_key: local_key.clone(),
                owner_column: owner_column.clone(),
                element_column: element_column.clone(),
            },
        };
        self.bindings.push(Binding {
            parent: parent.clone(),
            source,
            join_type: join.join_type,
        });
        Ok(DocPath {
            binding: self.bindings.len(),
            keys: Vec::new(),
        })
    }

    fn get(&mut self, parent: &DocPath, field: &FieldDescriptor) -> Result<DocPath, FilterError> {
        Ok(parent.child(&field.storage.column))
    }

    fn and(&self, predicates: Vec<DocPredicate>) -> DocPredicate {
        DocPredicate::And(predicates)
    }

    fn or(&self, predicates: Vec<DocPredicate>) -> DocPredicate {
        DocPredicate::Or(predicates)
    }

    fn not(&self, predicate: DocPredicate) -> DocPredicate {
        DocPredicate::Not(Box::new(predicate))
    }

    fn equal(&self, path: &DocPath, value: &Value) -> DocPredicate {
        compare(path, Comparison::Equal, value)
    }

    fn is_null(&self, path: &DocPath) -> DocPredicate {
        DocPredicate::IsNull(path.clone())
    }

    fn is_member(&self, path: &DocPath, value: &Value) -> DocPredicate {
        DocPredicate::Member {
            path: path.clone(),
            value: value.clone(),
        }
    }

    fn like(&self, path: &DocPath, pattern: &str) -> DocPredicate {
        DocPredicate::Like {
            path: path.clone(),
            pattern: pattern.to_string(),
            case_insensitive: false,
        }
    }

    fn ilike(&self, path: &DocPath, pattern: &str) -> DocPredicate {
        DocPredicate::Like {
            path: path.clone(),
            pattern: pattern.to_lowercase(),
            case_insensitive: true,
        }
    }

    fn less_than(&self, path: &DocPath, value: &Value) -> DocPredicate {
        compare(path, Comparison::LessThan, value)
    }

    fn less_than_or_equal(&self, path: &DocPath, value: &Value) -> DocPredicate {
        compare(path, Comparison::LessThanOrEqual, value)
    }

    fn greater_than(&self, path: &DocPath, value: &Value) -> DocPredicate {
        compare(path, Comparison::GreaterThan, value)
    }

    fn greater_than_or_equal(&self, path: &DocPath, value: &Value) -> DocPredicate {
        compare(path, Comparison::GreaterThanOrEqual, value)
    }

    fn in_values(&self, path: &DocPath, values: &[Value]) -> DocPredicate {
        DocPredicate::In {
            path: path.clone(),
            values: values.to_vec(),
        }
    }
}

fn compare(path: &DocPath, comparison: Comparison, value: &Value) -> DocPredicate {
    DocPredicate::Compare {
        path: path.clone(),
        comparison,
        value: value.clone(),
    }
}

type Row<'a> = Vec<Option<&'a Json>>;

/// Expands documents into binding rows and evaluates predicates on them.
struct Evaluator<'s> {
    bindings: &'s [Binding],
    collections: HashMap<String, Arc<Vec<Json>>>,
}

impl<'s> Evaluator<'s> {
    fn new(store: &DocumentStore, bindings: &'s [Binding]) -> Self {
        let mut collections = HashMap::new();
        for binding in bindings {
            let names: Vec<&String> = match &binding.source {
                Source::Nested { .. } => Vec::new(),
                Source::Reference { collection, .. } => vec![collection],
                Source::Link {
                    link, collection, ..
                } => vec![link, collection],
                Source::Elements { table, .. } => vec![table],
            };
            for name in names {
                collections
                    .entry(name.clone())
                    .or_insert_with(|| store.collection(name));
            }
        }
        Self {
            bindings,
            collections,
        }
    }

    fn matches(&self, document: &Json, predicate: Option<&DocPredicate>) -> bool {
        let rows = self.rows(document);
        match predicate {
            None => !rows.is_empty(),
            Some(predicate) => rows
                .iter()
                .any(|row| evaluate(predicate, row) == Truth::True),
        }
    }

    fn rows<'a>(&'a self, document: &'a Json) -> Vec<Row<'a>> {
        let mut rows: Vec<Row<'a>> = vec![vec![Some(document)]];
        for binding in self.bindings {
            let mut expanded = Vec::with_capacity(rows.len());
            for row in rows {
                let candidates = resolve(row.as_slice(), &binding.parent)
                    .map(|owner| self.candidates(owner, &binding.source))
                    .unwrap_or_default();
                if candidates.is_empty() {
                    // outer joins keep the row with nothing bound
                    if binding.join_type != JoinType::Inner {
                        let mut row = row;
                        row.push(None);
                        expanded.push(row);
                    }
                    continue;
                }
                for candidate in candidates {
                    let mut next = row.clone();
                    next.push(Some(candidate));
                    expanded.push(next);
                }
            }
            rows = expanded;
        }
        rows
    }

    fn candidates<'a>(&'a self, owner: &'a Json, source: &Source) -> Vec<&'a Json> {
        match source {
            Source::Nested { key } => match owner.get(key) {
                None | Some(Json::Null) => Vec::new(),
                Some(Json::Array(items)) => items.iter().collect(),
                Some(value) => vec![value],
            },
            Source::Reference {
                collection,
                local,
                remote,
            } => match owner.get(local) {
                None | Some(Json::Null) => Vec::new(),
                Some(key) => self
                    .collection(collection)
                    .iter()
                    .filter(|document| document.get(remote) == Some(key))
                    .collect(),
            },
            Source::Link {
                link,
                local_key,
                owner_column,
                target_column,
                collection,
                remote_key,
            } => {
                let Some(key) = owner.get(local_key).filter(|key| !key.is_null()) else {
                    return Vec::new();
                };
                let targets: Vec<&Json> = self
                    .collection(link)
                    .iter()
                    .filter(|row| row.get(owner_column) == Some(key))
                    .filter_map(|row| row.get(target_column))
                    .collect();
                self.collection(collection)
                    .iter()
                    .filter(|document| {
                        document
                            .get(remote_key)
                            .is_some_and(|id| targets.contains(&id))
                    })
                    .collect()
            }
            Source::Elements {
                table,
                local_key,
                owner_column,
                element_column,
            } => {
                let Some(key) = owner.get(local_key).filter(|key| !key.is_null()) else {
                    return Vec::new();
                };
                self.collection(table)
                    .iter()
                    .filter(|row| row.get(owner_column) == Some(key))
                    .filter_map(|row| row.get(element_column))
                    .collect()
            }
        }
    }

    fn collection(&self, name: &str) -> &[Json] {
        self.collections
            .get(name)
            .map(|documents| documents.as_slice())
            .unwrap_or(&[])
    }
}

/// Value at `path` in `row`; `None` when unbound or missing.
fn resolve<'a>(row: &[Option<&'a Json>], path: &DocPath) -> Option<&'a Json> {
    let mut value = row.get(path.binding).copied().flatten()?;
    for key in &path.keys {
        value = value.get(key)?;
    }
    Some(value)
}

fn evaluate(predicate: &DocPredicate, row: &[Option<&Json>]) -> Truth {
    match predicate {
        DocPredicate::And(children) => {
            let mut result = Truth::True;
            for child in children {
                match evaluate(child, row) {
                    Truth::False => return Truth::False,
                    Truth::Unknown => result = Truth::Unknown,
                    Truth::True => {}
                }
            }
            result
        }
        DocPredicate::Or(children) => {
            let mut result = Truth::False;
            for child in children {
                match evaluate(child, row) {
                    Truth::True => return Truth::True,
                    Truth::Unknown => result = Truth::Unknown,
                    Truth::False => {}
                }
            }
            result
        }
        DocPredicate::Not(inner) => evaluate(inner, row).not(),
        DocPredicate::IsNull(path) => {
            Truth::from_bool(resolve(row, path).is_none_or(Json::is_null))
        }
        DocPredicate::Compare {
            path,
            comparison,
            value,
        } => match present(row, path) {
            None => Truth::Unknown,
            Some(json) => compare_json(json, value)
                .map_or(Truth::False, |ordering| {
                    Truth::from_bool(comparison.holds(ordering))
                }),
        },
        DocPredicate::Member { path, value } => match present(row, path) {
            None => Truth::Unknown,
            Some(Json::Array(items)) => Truth::from_bool(
                items
                    .iter()
                    .any(|item| compare_json(item, value) == Some(Ordering::Equal)),
            ),
            Some(json) => Truth::from_bool(compare_json(json, value) == Some(Ordering::Equal)),
        },
        DocPredicate::In { path, values } => match present(row, path) {
            None => Truth::Unknown,
            Some(json) => Truth::from_bool(
                values
                    .iter()
                    .any(|value| compare_json(json, value) == Some(Ordering::Equal)),
            ),
        },
        DocPredicate::Like {
            path,
            pattern,
            case_insensitive,
        } => match present(row, path) {
            None => Truth::Unknown,
            Some(json) => {
                let text = match json {
                    Json::String(text) => text.clone(),
                    other => other.to_string(),
                };
                let text = if *case_insensitive {
                    text.to_lowercase()
                } else {
                    text
                };
                Truth::from_bool(like_matches(&text, pattern))
            }
        },
    }
}

fn present<'a>(row: &[Option<&'a Json>], path: &DocPath) -> Option<&'a Json> {
    resolve(row, path).filter(|json| !json.is_null())
}

/// Orders a stored value against a filter value; `None` when incomparable.
fn compare_json(json: &Json, value: &Value) -> Option<Ordering> {
    let stored = match value {
        Value::Null => return None,
        Value::String(_) => Value::String(json.as_str()?.to_string()),
        Value::Enum(_) => Value::Enum(json.as_str()?.to_string()),
        Value::Integer(_) | Value::Float(_) => match json.as_i64() {
            Some(number) => Value::Integer(number),
            None => Value::Float(json.as_f64()?),
        },
        Value::Boolean(_) => Value::Boolean(json.as_bool()?),
        Value::Uuid(_) => Value::Uuid(Uuid::parse_str(json.as_str()?).ok()?),
        Value::Date(_) => {
            let text = json.as_str()?;
            Value::Date(NaiveDate::parse_from_str(text.get(..10)?, "%Y-%m-%d").ok()?)
        }
        Value::DateTime(_) => {
            let text = json.as_str()?;
            match DateTime::parse_from_rfc3339(text) {
                Ok(timestamp) => Value::DateTime(timestamp.with_timezone(&Utc)),
                Err(_) => Value::Date(NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?),
            }
        }
    };
    stored.compare(value)
}

/// SQL `LIKE`: `%` matches any run of characters, `_` exactly one.
fn like_matches(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '_' || c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}

/// Sort order of stored values; missing values first.
fn order_json(left: Option<&Json>, right: Option<&Json>) -> Ordering {
    match (left, right) {
        (None | Some(Json::Null), None | Some(Json::Null)) => Ordering::Equal,
        (None | Some(Json::Null), _) => Ordering::Less,
        (_, None | Some(Json::Null)) => Ordering::Greater,
        (Some(Json::Number(a)), Some(Json::Number(b))) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Some(Json::String(a)), Some(Json::String(b))) => a.cmp(b),
        (Some(Json::Bool(a)), Some(Json::Bool(b))) => a.cmp(b),
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}

/// Executes specifications over one collection of a [`DocumentStore`].
pub struct DocumentExecutor<T> {
    store: Arc<DocumentStore>,
    metadata: Arc<dyn EntityMetadata>,
    root: EntityName,
    _entity: PhantomData<fn() -> T>,
}

impl<T: 'static> DocumentExecutor<T> {
    #[must_use]
    pub fn new(store: Arc<DocumentStore>, metadata: Arc<dyn EntityMetadata>) -> Self {
        Self {
            store,
            metadata,
            root: EntityName::of::<T>(),
            _entity: PhantomData,
        }
    }

    /// Matching documents of the root collection, in storage order.
    fn matching(&self, spec: &Specification<T>) -> Result<Vec<Json>, SearchError> {
        let collection = self
            .metadata
            .storage_name(self.root)
            .ok_or_else(|| FilterError::mapping(self.root.simple(), "entity has no collection"))?;
        let mut builder = DocumentQueryBuilder::new(self.metadata.as_ref(), self.root);
        let predicate = spec.to_predicate(&mut builder)?;
        tracing::debug!(
            entity = %self.root,
            collection = %collection,
            joins = builder.bindings.len(),
            "Evaluating document search"
        );

        let evaluator = Evaluator::new(&self.store, &builder.bindings);
        Ok(self
            .store
            .collection(&collection)
            .iter()
            .filter(|document| evaluator.matches(document, predicate.as_ref()))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl<T> SpecificationExecutor<T> for DocumentExecutor<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    async fn find(&self, spec: &Specification<T>, pageable: &Pageable) -> Result<Vec<T>, SearchError> {
        let mut documents = self.matching(spec)?;
        if !pageable.sort.is_empty() {
            documents.sort_by(|left, right| {
                pageable
                    .sort
                    .iter()
                    .map(|order| {
                        let column = order.field.storage.column.as_str();
                        let ordering = order_json(left.get(column), right.get(column));
                        match order.direction {
                            Direction::Asc => ordering,
                            Direction::Desc => ordering.reverse(),
                        }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }

        let offset = usize::try_from(pageable.offset).unwrap_or(usize::MAX);
        let limit = pageable
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
        documents
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|document| serde_json::from_value(document).map_err(SearchError::backend))
            .collect()
    }

    async fn count(&self, spec: &Specification<T>) -> Result<u64, SearchError> {
        Ok(u64::try_from(self.matching(spec)?.len()).unwrap_or(u64::MAX))
    }
}
