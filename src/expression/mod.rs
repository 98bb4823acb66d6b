//! # Filter Expressions
//!
//! A filter reaches the search pipeline in one of two shapes:
//!
//! - the textual language (`firstName = 'John' and age >= 18`), lexed by
//!   [`lexer`] and parsed by [`parser`] into a [`FilterNode`] tree
//! - a flat multi-map of field path to raw values, as found in a query string
//!
//! [`ExpressionResolver`] turns either into an [`Expression`]: every field path is
//! resolved against the entity metadata and every raw value converted to the
//! declared type of its field.

pub mod lexer;
pub mod parser;
pub mod resolver;

pub use parser::{CompareOp, FieldRef, FilterNode, Literal, LiteralKind, parse};
pub use resolver::{DEFAULT_NULL_TOKEN, ExpressionResolver};

use crate::metadata::{EntityName, FieldDescriptor};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
    In,
    /// SQL LIKE pattern, case-sensitive
    Matches,
    /// SQL LIKE pattern, case-insensitive
    IMatches,
}

impl Operator {
    /// Operators comparing a field against exactly one value.
    #[must_use]
    pub fn is_single_valued(self) -> bool {
        !matches!(self, Self::In)
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::LessThan => "<",
            Self::LessThanOrEquals => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEquals => ">=",
            Self::In => "in",
            Self::Matches => "matches",
            Self::IMatches => "imatches",
        }
    }
}

impl From<CompareOp> for Operator {
    fn from(op: CompareOp) -> Self {
        match op {
            CompareOp::Eq | CompareOp::NotEq => Self::Equals,
            CompareOp::Lt => Self::LessThan,
            CompareOp::Le => Self::LessThanOrEquals,
            CompareOp::Gt => Self::GreaterThan,
            CompareOp::Ge => Self::GreaterThanOrEquals,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
}

/// One hop of a resolved field path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSegment {
    /// Type the field was looked up on
    pub declaring: EntityName,
    pub field: Arc<FieldDescriptor>,
}

/// Dot-separated path of internal field names from the root entity, with the
/// descriptor of every hop.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPath {
    path: String,
    segments: Vec<PathSegment>,
}

impl FieldPath {
    #[must_use]
    pub fn new(segments: Vec<PathSegment>) -> Self {
        let path = segments
            .iter()
            .map(|segment| segment.field.name.as_str())
            .collect::<Vec<_>>()
            .join(".");
        Self { path, segments }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Descriptor of the field the path ends in.
    #[must_use]
    pub fn last(&self) -> Option<&Arc<FieldDescriptor>> {
        self.segments.last().map(|segment| &segment.field)
    }

    /// Number of hops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleExpression {
    pub field: FieldPath,
    pub operator: Operator,
    pub values: Vec<Value>,
    pub negated: bool,
}

/// Resolved filter, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Simple(SimpleExpression),
    Logical {
        op: LogicalOperator,
        children: Vec<Expression>,
    },
    Not(Box<Expression>),
}

impl Expression {
    #[must_use]
    pub fn simple(field: FieldPath, operator: Operator, values: Vec<Value>, negated: bool) -> Self {
        Self::Simple(SimpleExpression {
            field,
            operator,
            values,
            negated,
        })
    }

    #[must_use]
    pub fn and(children: Vec<Expression>) -> Self {
        Self::Logical {
            op: LogicalOperator::And,
            children,
        }
    }

    #[must_use]
    pub fn or(children: Vec<Expression>) -> Self {
        Self::Logical {
            op: LogicalOperator::Or,
            children,
        }
    }

    /// Every simple expression of the tree, depth first.
    pub fn leaves(&self) -> Vec<&SimpleExpression> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, leaves: &mut Vec<&'a SimpleExpression>) {
        match self {
            Self::Simple(simple) => leaves.push(simple),
            Self::Logical { children, .. } => {
                for child in children {
                    child.collect_leaves(leaves);
                }
            }
            Self::Not(inner) => inner.collect_leaves(leaves),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(simple) => {
                let values: Vec<String> = simple.values.iter().map(ToString::to_string).collect();
                let not = if simple.negated { "not " } else { "" };
                if simple.operator == Operator::In {
                    write!(f, "{} {not}in ({})", simple.field, values.join(", "))
                } else {
                    write!(
                        f,
                        "{not}{} {} {}",
                        simple.field,
                        simple.operator.symbol(),
                        values.join(", ")
                    )
                }
            }
            Self::Logical { op, children } => {
                let joiner = match op {
                    LogicalOperator::And => " and ",
                    LogicalOperator::Or => " or ",
                };
                let parts: Vec<String> = children.iter().map(|child| format!("({child})")).collect();
                f.write_str(&parts.join(joiner))
            }
            Self::Not(inner) => write!(f, "not ({inner})"),
        }
    }
}
