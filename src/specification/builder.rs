use crate::errors::FilterError;
use crate::joins::JoinInfo;
use crate::metadata::FieldDescriptor;
use crate::value::Value;

/// Capability contract a storage backend offers to the specification compiler.
///
/// Paths are opaque handles to a queryable location (the root entity, a joined
/// association, a field of either). Predicates are backend conditions composed with
/// [`and`](Self::and), [`or`](Self::or) and [`not`](Self::not).
pub trait QueryBuilder {
    type Path: Clone;
    type Predicate;

    /// Path of the queried entity itself.
    fn root(&mut self) -> Self::Path;

    /// Each root entity at most once in the result, however many joined rows match.
    fn distinct(&mut self);

    /// Joins the association `field` of `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Mapping`] when the backend cannot join `field`.
    fn join(
        &mut self,
        parent: &Self::Path,
        field: &FieldDescriptor,
        join: JoinInfo,
    ) -> Result<Self::Path, FilterError>;

    /// Path of a plain or embedded field of `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Mapping`] when the backend has no storage for `field`.
    fn get(&mut self, parent: &Self::Path, field: &FieldDescriptor)
    -> Result<Self::Path, FilterError>;

    fn and(&self, predicates: Vec<Self::Predicate>) -> Self::Predicate;

    fn or(&self, predicates: Vec<Self::Predicate>) -> Self::Predicate;

    fn not(&self, predicate: Self::Predicate) -> Self::Predicate;

    fn equal(&self, path: &Self::Path, value: &Value) -> Self::Predicate;

    fn is_null(&self, path: &Self::Path) -> Self::Predicate;

    /// `value` is one of the elements of the plural field at `path`.
    fn is_member(&self, path: &Self::Path, value: &Value) -> Self::Predicate;

    /// SQL LIKE: `%` any run of characters, `_` one character.
    fn like(&self, path: &Self::Path, pattern: &str) -> Self::Predicate;

    fn ilike(&self, path: &Self::Path, pattern: &str) -> Self::Predicate;

    fn less_than(&self, path: &Self::Path, value: &Value) -> Self::Predicate;

    fn less_than_or_equal(&self, path: &Self::Path, value: &Value) -> Self::Predicate;

    fn greater_than(&self, path: &Self::Path, value: &Value) -> Self::Predicate;

    fn greater_than_or_equal(&self, path: &Self::Path, value: &Value) -> Self::Predicate;

    fn in_values(&self, path: &Self::Path, values: &[Value]) -> Self::Predicate;
}
