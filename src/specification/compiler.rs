use super::QueryBuilder;
use crate::errors::{FilterError, FilterErrors};
use crate::expression::{Expression, FieldPath, LogicalOperator, Operator, SimpleExpression};
use crate::joins::EntityJoins;
use crate::metadata::FieldDescriptor;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One compilation run against one builder.
///
/// Paths are memoized by their dot-separated prefix, so every association is
/// joined once per query however many predicates go through it.
pub(super) struct Compiler<'b, B: QueryBuilder> {
    builder: &'b mut B,
    root: B::Path,
    paths: HashMap<String, B::Path>,
    errors: FilterErrors,
}

impl<'b, B: QueryBuilder> Compiler<'b, B> {
    pub(super) fn new(builder: &'b mut B) -> Self {
        let root = builder.root();
        Self {
            builder,
            root,
            paths: HashMap::new(),
            errors: FilterErrors::new(),
        }
    }

    pub(super) fn distinct(&mut self) {
        self.builder.distinct();
    }

    pub(super) fn finish(
        self,
        predicate: Option<B::Predicate>,
    ) -> Result<Option<B::Predicate>, FilterErrors> {
        self.errors.into_result(predicate)
    }

    /// Joins every fetched association of the graph, with its intermediate hops.
    pub(super) fn fetch_joins(&mut self, joins: &EntityJoins) {
        for join in joins.fetched() {
            let hops: Vec<&Arc<FieldDescriptor>> = join.hops.iter().collect();
            if let Err(error) = self.walk(&join.field_path, &hops, joins) {
                self.errors.push(error);
            }
        }
    }

    pub(super) fn expression(
        &mut self,
        expression: &Expression,
        joins: &EntityJoins,
    ) -> Option<B::Predicate> {
        match expression {
            Expression::Simple(simple) => match self.simple(simple, joins) {
                Ok(predicate) => Some(predicate),
                Err(error) => {
                    self.errors.push(error);
                    None
                }
            },
            Expression::Logical { op, children } => {
                let predicates: Vec<B::Predicate> = children
                    .iter()
                    .filter_map(|child| self.expression(child, joins))
                    .collect();
                match op {
                    LogicalOperator::And => self.fold_and(predicates),
                    LogicalOperator::Or => self.fold_or(predicates),
                }
            }
            Expression::Not(inner) => self
                .expression(inner, joins)
                .map(|predicate| self.negate(predicate)),
        }
    }

    pub(super) fn fold_and(&self, mut predicates: Vec<B::Predicate>) -> Option<B::Predicate> {
        match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(self.builder.and(predicates)),
        }
    }

    pub(super) fn fold_or(&self, mut predicates: Vec<B::Predicate>) -> Option<B::Predicate> {
        match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(self.builder.or(predicates)),
        }
    }

    pub(super) fn negate(&self, predicate: B::Predicate) -> B::Predicate {
        self.builder.not(predicate)
    }

    fn simple(
        &mut self,
        simple: &SimpleExpression,
        joins: &EntityJoins,
    ) -> Result<B::Predicate, FilterError> {
        let path = self.path(&simple.field, joins)?;
        let plural = simple.field.last().is_some_and(|field| field.is_plural());
        let first = || {
            simple.values.first().ok_or_else(|| {
                FilterError::mapping(
                    simple.field.as_str(),
                    format!("'{}' needs a value", simple.operator.symbol()),
                )
            })
        };
        let builder = &*self.builder;

        let predicate = match simple.operator {
            Operator::Equals => {
                let value = first()?;
                if value.is_null() {
                    builder.is_null(&path)
                } else if plural {
                    builder.is_member(&path, value)
                } else {
                    builder.equal(&path, value)
                }
            }
            Operator::In => {
                let (nulls, values): (Vec<&Value>, Vec<&Value>) =
                    simple.values.iter().partition(|value| value.is_null());
                let mut alternatives = if plural {
                    values
                        .iter()
                        .map(|value| builder.is_member(&path, value))
                        .collect()
                } else if values.is_empty() {
                    Vec::new()
                } else {
                    let values: Vec<Value> = values.into_iter().cloned().collect();
                    vec![builder.in_values(&path, &values)]
                };
                if !nulls.is_empty() {
                    alternatives.push(builder.is_null(&path));
                }
                match alternatives.len() {
                    0 => {
                        return Err(FilterError::mapping(
                            simple.field.as_str(),
                            "'in' needs a value",
                        ));
                    }
                    1 => alternatives.remove(0),
                    _ => builder.or(alternatives),
                }
            }
            Operator::LessThan => builder.less_than(&path, first()?),
            Operator::LessThanOrEquals => builder.less_than_or_equal(&path, first()?),
            Operator::GreaterThan => builder.greater_than(&path, first()?),
            Operator::GreaterThanOrEquals => builder.greater_than_or_equal(&path, first()?),
            Operator::Matches => builder.like(&path, &pattern(first()?)),
            Operator::IMatches => builder.ilike(&path, &pattern(first()?)),
        };

        Ok(if simple.negated {
            builder.not(predicate)
        } else {
            predicate
        })
    }

    fn path(&mut self, field: &FieldPath, joins: &EntityJoins) -> Result<B::Path, FilterError> {
        let hops: Vec<&Arc<FieldDescriptor>> =
            field.segments().iter().map(|segment| &segment.field).collect();
        self.walk(field.as_str(), &hops, joins)
    }

    /// Resolves `hops` from the root, reusing every prefix already built.
    fn walk(
        &mut self,
        full_path: &str,
        hops: &[&Arc<FieldDescriptor>],
        joins: &EntityJoins,
    ) -> Result<B::Path, FilterError> {
        let mut parent = self.root.clone();
        let mut prefix = String::with_capacity(full_path.len());

        for field in hops {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(&field.name);
            if let Some(known) = self.paths.get(&prefix) {
                parent = known.clone();
                continue;
            }

            let next = if field.association.is_some() {
                self.builder.join(&parent, field, joins.info_for(field))
            } else {
                self.builder.get(&parent, field)
            }
            .map_err(|error| match error {
                FilterError::Mapping { message, .. } => FilterError::mapping(full_path, message),
                other => other,
            })?;
            self.paths.insert(prefix.clone(), next.clone());
            parent = next;
        }

        Ok(parent)
    }
}

/// Text of a pattern value, `*` accepted for `%`.
fn pattern(value: &Value) -> String {
    match value {
        Value::String(text) | Value::Enum(text) => text.replace('*', "%"),
        other => other.to_string(),
    }
}
