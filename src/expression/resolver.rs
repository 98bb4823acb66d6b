//! Field resolution and value conversion.
//!
//! Turns a parse tree or a flat parameter map into an [`Expression`], collecting
//! every resolution and conversion failure instead of stopping at the first.

use super::parser::{CompareOp, FieldRef, FilterNode, Literal};
use super::{Expression, FieldPath, Operator, PathSegment};
use crate::errors::{FilterError, FilterErrors};
use crate::metadata::{AliasResolvers, EntityMetadata, EntityName, FieldDescriptor};
use crate::value::{ConversionService, Value, ValueType};
use indexmap::IndexMap;
use std::sync::Arc;

/// Default literal standing for an explicit null in the flat parameter form.
pub const DEFAULT_NULL_TOKEN: &str = "$null";

/// Operator suffixes of flat parameter keys, longest first so `_ilike` is
/// tried before `_like` and `_gte` before `_gt`.
const SUFFIXES: &[(&str, Suffix)] = &[
    ("_ilike", Suffix::ILike),
    ("_like", Suffix::Like),
    ("_gte", Suffix::Gte),
    ("_lte", Suffix::Lte),
    ("_neq", Suffix::Neq),
    ("_gt", Suffix::Gt),
    ("_lt", Suffix::Lt),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Suffix {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
}

pub struct ExpressionResolver<'a> {
    metadata: &'a dyn EntityMetadata,
    aliases: &'a AliasResolvers,
    conversion: &'a dyn ConversionService,
    null_token: &'a str,
    operator_suffixes: bool,
}

impl<'a> ExpressionResolver<'a> {
    #[must_use]
    pub fn new(
        metadata: &'a dyn EntityMetadata,
        aliases: &'a AliasResolvers,
        conversion: &'a dyn ConversionService,
    ) -> Self {
        Self {
            metadata,
            aliases,
            conversion,
            null_token: DEFAULT_NULL_TOKEN,
            operator_suffixes: true,
        }
    }

    #[must_use]
    pub fn null_token(mut self, token: &'a str) -> Self {
        self.null_token = token;
        self
    }

    /// Whether flat keys such as `age_gte` are understood as `age >= ...`.
    #[must_use]
    pub fn operator_suffixes(mut self, enabled: bool) -> Self {
        self.operator_suffixes = enabled;
        self
    }

    /// Resolves an external dot-separated path against `root`.
    ///
    /// Every hop but the last must navigate to an entity (association or embedded
    /// value object); the last must be a value field.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::FieldResolution`] naming the offending path.
    pub fn resolve_path(&self, root: EntityName, path: &str) -> Result<FieldPath, FilterError> {
        if !self.metadata.is_entity_type(root) {
            return Err(FilterError::field_resolution(
                path,
                format!("{} is not a registered entity", root.simple()),
            ));
        }

        let names: Vec<&str> = path.split('.').collect();
        let mut segments = Vec::with_capacity(names.len());
        let mut current = root;

        for (index, external) in names.iter().enumerate() {
            if external.is_empty() {
                return Err(FilterError::field_resolution(path, "empty path segment"));
            }
            let internal = self.aliases.resolve(current, external);
            let field = self.metadata.field(current, &internal).ok_or_else(|| {
                FilterError::field_resolution(
                    path,
                    format!("{} has no field '{external}'", current.simple()),
                )
            })?;

            let declaring = current;
            let is_last = index + 1 == names.len();
            let target = navigable_target(self.metadata, &field);
            if is_last {
                if target.is_some() {
                    return Err(FilterError::field_resolution(
                        path,
                        format!("'{}' is an association, not a value field", field.name),
                    ));
                }
            } else {
                current = target.ok_or_else(|| {
                    FilterError::field_resolution(
                        path,
                        format!("'{}' is not an association", field.name),
                    )
                })?;
            }

            segments.push(PathSegment { declaring, field });
        }

        Ok(FieldPath::new(segments))
    }

    /// Resolves a sort key: a scalar field of the root entity itself.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::FieldResolution`] for unknown, nested or plural fields.
    pub fn resolve_sort_field(
        &self,
        root: EntityName,
        name: &str,
    ) -> Result<Arc<FieldDescriptor>, FilterError> {
        let path = self.resolve_path(root, name)?;
        match path.last() {
            Some(field) if path.len() == 1 && !field.is_plural() => Ok(Arc::clone(field)),
            _ => Err(FilterError::field_resolution(
                name,
                "only scalar fields of the searched entity can be sorted on",
            )),
        }
    }

    /// Resolves a parse tree.
    ///
    /// # Errors
    ///
    /// Returns every resolution, conversion and unsupported-feature offense.
    pub fn resolve(&self, root: EntityName, node: &FilterNode) -> Result<Expression, FilterErrors> {
        let mut errors = FilterErrors::new();
        let expression = self.visit(root, node, &mut errors);
        match expression {
            Some(expression) if errors.is_empty() => Ok(expression),
            _ => Err(errors),
        }
    }

    fn visit(
        &self,
        root: EntityName,
        node: &FilterNode,
        errors: &mut FilterErrors,
    ) -> Option<Expression> {
        match node {
            FilterNode::Compare { field, op, value } => {
                let path = record(self.resolve_path(root, &field.path), errors)?;
                let value = record(self.convert_literal(&path, value), errors)?;
                Some(Expression::simple(
                    path,
                    Operator::from(*op),
                    vec![value],
                    *op == CompareOp::NotEq,
                ))
            }
            FilterNode::IsNull { field, negated } => {
                let path = record(self.resolve_path(root, &field.path), errors)?;
                Some(Expression::simple(
                    path,
                    Operator::Equals,
                    vec![Value::Null],
                    *negated,
                ))
            }
            FilterNode::In {
                field,
                values,
                negated,
            } => {
                let path = record(self.resolve_path(root, &field.path), errors)?;
                let mut converted = Vec::with_capacity(values.len());
                for literal in values {
                    if let Some(value) = record(self.convert_literal(&path, literal), errors) {
                        converted.push(value);
                    }
                }
                (converted.len() == values.len())
                    .then(|| Expression::simple(path, Operator::In, converted, *negated))
            }
            FilterNode::Matches {
                field,
                pattern,
                case_insensitive,
            } => {
                let path = record(self.resolve_path(root, &field.path), errors)?;
                let value = record(pattern_value(&path, &pattern.text), errors)?;
                let operator = if *case_insensitive {
                    Operator::IMatches
                } else {
                    Operator::Matches
                };
                Some(Expression::simple(path, operator, vec![value], false))
            }
            FilterNode::Between { field, .. } => {
                self.report_between(root, field, errors);
                None
            }
            FilterNode::And(children) => self
                .visit_all(root, children, errors)
                .map(Expression::and),
            FilterNode::Or(children) => self
                .visit_all(root, children, errors)
                .map(Expression::or),
            FilterNode::Not(inner) => self
                .visit(root, inner, errors)
                .map(|inner| Expression::Not(Box::new(inner))),
        }
    }

    /// Visits every child, even after one has failed.
    fn visit_all(
        &self,
        root: EntityName,
        children: &[FilterNode],
        errors: &mut FilterErrors,
    ) -> Option<Vec<Expression>> {
        let resolved: Vec<Option<Expression>> = children
            .iter()
            .map(|child| self.visit(root, child, errors))
            .collect();
        resolved.into_iter().collect()
    }

    fn report_between(&self, root: EntityName, field: &FieldRef, errors: &mut FilterErrors) {
        if let Err(error) = self.resolve_path(root, &field.path) {
            errors.push(error);
        }
        errors.push(FilterError::NotImplemented {
            feature: "BETWEEN".to_string(),
        });
    }

    fn convert_literal(&self, path: &FieldPath, literal: &Literal) -> Result<Value, FilterError> {
        self.convert(path, &literal.text)
    }

    fn convert(&self, path: &FieldPath, raw: &str) -> Result<Value, FilterError> {
        let target = path
            .last()
            .map_or(&ValueType::String, |field| field.element_type());
        self.conversion
            .convert(raw, target)
            .map_err(|message| FilterError::Conversion {
                path: path.to_string(),
                value: raw.to_string(),
                target: target.to_string(),
                message,
            })
    }

    /// Resolves the flat parameter form: one value means equality, several mean
    /// membership, the null token means null, and every key is ANDed.
    ///
    /// # Errors
    ///
    /// Returns every resolution and conversion offense across all keys.
    pub fn resolve_params(
        &self,
        root: EntityName,
        params: &IndexMap<String, Vec<String>>,
    ) -> Result<Expression, FilterErrors> {
        let mut errors = FilterErrors::new();
        let mut children = Vec::with_capacity(params.len());

        for (key, raw_values) in params {
            if raw_values.is_empty() {
                continue;
            }
            let (path, suffix) = match self.resolve_key(root, key) {
                Ok(resolved) => resolved,
                Err(error) => {
                    errors.push(error);
                    continue;
                }
            };

            let mut values = Vec::with_capacity(raw_values.len());
            for raw in raw_values {
                let value = match suffix {
                    Suffix::Like | Suffix::ILike => pattern_value(&path, &contains_pattern(raw)),
                    Suffix::Gt | Suffix::Gte | Suffix::Lt | Suffix::Lte if raw == self.null_token => {
                        Err(unordered_null(&path, raw))
                    }
                    _ if raw == self.null_token => Ok(Value::Null),
                    _ => self.convert(&path, raw),
                };
                if let Some(value) = record(value, &mut errors) {
                    values.push(value);
                }
            }
            if values.len() == raw_values.len() {
                children.push(param_expression(path, suffix, values));
            }
        }

        if errors.is_empty() {
            Ok(Expression::and(children))
        } else {
            Err(errors)
        }
    }

    /// The full key is tried as a path first; suffixes apply only when it fails.
    fn resolve_key(&self, root: EntityName, key: &str) -> Result<(FieldPath, Suffix), FilterError> {
        let error = match self.resolve_path(root, key) {
            Ok(path) => return Ok((path, Suffix::Eq)),
            Err(error) => error,
        };
        if !self.operator_suffixes {
            return Err(error);
        }
        SUFFIXES
            .iter()
            .find_map(|(text, suffix)| {
                let base = key.strip_suffix(text)?;
                self.resolve_path(root, base)
                    .ok()
                    .map(|path| (path, *suffix))
            })
            .ok_or(error)
    }
}

fn record<T>(result: Result<T, FilterError>, errors: &mut FilterErrors) -> Option<T> {
    result.map_err(|error| errors.push(error)).ok()
}

/// Null has no order, so it cannot bound a range.
fn unordered_null(path: &FieldPath, raw: &str) -> FilterError {
    let target = path
        .last()
        .map_or(&ValueType::String, |field| field.element_type());
    FilterError::Conversion {
        path: path.to_string(),
        value: raw.to_string(),
        target: target.to_string(),
        message: "null cannot be compared by order".to_string(),
    }
}

/// Target entity of a field when a path may continue through it.
fn navigable_target(metadata: &dyn EntityMetadata, field: &FieldDescriptor) -> Option<EntityName> {
    let target = field.target_entity()?;
    let is_association = field
        .association
        .is_some_and(|marker| metadata.is_association_marker(marker));
    let is_embedded = field.association.is_none() && !field.is_plural();
    (is_association || is_embedded).then_some(target)
}

/// LIKE patterns only apply to textual fields; `*` is accepted for `%`.
fn pattern_value(path: &FieldPath, pattern: &str) -> Result<Value, FilterError> {
    let target = path
        .last()
        .map_or(&ValueType::String, |field| field.element_type());
    match target {
        ValueType::String | ValueType::Enum(_) => Ok(Value::String(pattern.replace('*', "%"))),
        other => Err(FilterError::Conversion {
            path: path.to_string(),
            value: pattern.to_string(),
            target: other.to_string(),
            message: "pattern matching requires a textual field".to_string(),
        }),
    }
}

/// `_like` parameters match anywhere unless the value carries its own wildcard.
fn contains_pattern(raw: &str) -> String {
    if raw.contains(['%', '*']) {
        raw.to_string()
    } else {
        format!("%{raw}%")
    }
}

fn param_expression(path: FieldPath, suffix: Suffix, values: Vec<Value>) -> Expression {
    match suffix {
        Suffix::Eq => equals_or_in(path, values, false),
        Suffix::Neq => equals_or_in(path, values, true),
        Suffix::Gt => per_value(&path, Operator::GreaterThan, values, Expression::and),
        Suffix::Gte => per_value(&path, Operator::GreaterThanOrEquals, values, Expression::and),
        Suffix::Lt => per_value(&path, Operator::LessThan, values, Expression::and),
        Suffix::Lte => per_value(&path, Operator::LessThanOrEquals, values, Expression::and),
        Suffix::Like => per_value(&path, Operator::Matches, values, Expression::or),
        Suffix::ILike => per_value(&path, Operator::IMatches, values, Expression::or),
    }
}

fn equals_or_in(path: FieldPath, values: Vec<Value>, negated: bool) -> Expression {
    if values.len() == 1 {
        Expression::simple(path, Operator::Equals, values, negated)
    } else {
        Expression::simple(path, Operator::In, values, negated)
    }
}

/// Each value of an ordering operator is its own bound; patterns are alternatives.
fn per_value(
    path: &FieldPath,
    operator: Operator,
    values: Vec<Value>,
    combine: fn(Vec<Expression>) -> Expression,
) -> Expression {
    let mut children: Vec<Expression> = values
        .into_iter()
        .map(|value| Expression::simple(path.clone(), operator, vec![value], false))
        .collect();
    if children.len() == 1 {
        children.remove(0)
    } else {
        combine(children)
    }
}
