//! # Specifications
//!
//! A [`Specification`] is a backend-neutral filter on entities of type `T`. It is
//! built from a resolved [`Expression`] and the root's join graph, composed with
//! [`and`](Specification::and), [`or`](Specification::or) and `!`, and realized by
//! handing any [`QueryBuilder`] to [`to_predicate`](Specification::to_predicate).
//!
//! The unrestricted specification matches everything and compiles to no predicate
//! at all. It is the identity of both `and` and `or`, and its negation is itself.

mod builder;
mod compiler;

pub use builder::QueryBuilder;

use crate::errors::FilterErrors;
use crate::expression::Expression;
use crate::joins::EntityJoins;
use compiler::Compiler;
use std::marker::PhantomData;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Unrestricted,
    Filter {
        expression: Arc<Expression>,
        joins: Arc<EntityJoins>,
    },
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
}

pub struct Specification<T> {
    node: Node,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Specification<T> {
    fn from_node(node: Node) -> Self {
        Self {
            node,
            _entity: PhantomData,
        }
    }

    /// Matches every entity.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::from_node(Node::Unrestricted)
    }

    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.node == Node::Unrestricted
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self.node, other.node) {
            (Node::Unrestricted, node) | (node, Node::Unrestricted) => Self::from_node(node),
            (left, right) => Self::from_node(Node::And(Box::new(left), Box::new(right))),
        }
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match (self.node, other.node) {
            (Node::Unrestricted, node) | (node, Node::Unrestricted) => Self::from_node(node),
            (left, right) => Self::from_node(Node::Or(Box::new(left), Box::new(right))),
        }
    }

    /// Compiles into a backend predicate; `None` when nothing restricts the result.
    ///
    /// Requests distinct root entities and materializes every fetch join of the
    /// join graph before compiling the filter itself.
    ///
    /// # Errors
    ///
    /// Returns every path the backend could not map.
    pub fn to_predicate<B: QueryBuilder>(
        &self,
        builder: &mut B,
    ) -> Result<Option<B::Predicate>, FilterErrors> {
        let mut compiler = Compiler::new(builder);
        compiler.distinct();

        let mut graphs: Vec<&Arc<EntityJoins>> = Vec::new();
        self.node.collect_joins(&mut graphs);
        for joins in graphs {
            compiler.fetch_joins(joins);
        }

        let predicate = self.node.compile(&mut compiler);
        compiler.finish(predicate)
    }
}

impl Node {
    fn collect_joins<'a>(&'a self, graphs: &mut Vec<&'a Arc<EntityJoins>>) {
        match self {
            Self::Unrestricted => {}
            Self::Filter { joins, .. } => {
                if !graphs.iter().any(|seen| Arc::ptr_eq(seen, joins)) {
                    graphs.push(joins);
                }
            }
            Self::And(left, right) | Self::Or(left, right) => {
                left.collect_joins(graphs);
                right.collect_joins(graphs);
            }
            Self::Not(inner) => inner.collect_joins(graphs),
        }
    }

    fn compile<B: QueryBuilder>(&self, compiler: &mut Compiler<'_, B>) -> Option<B::Predicate> {
        match self {
            Self::Unrestricted => None,
            Self::Filter { expression, joins } => compiler.expression(expression, joins),
            Self::And(left, right) => {
                let predicates = [left.compile(compiler), right.compile(compiler)];
                compiler.fold_and(predicates.into_iter().flatten().collect())
            }
            Self::Or(left, right) => {
                let predicates = [left.compile(compiler), right.compile(compiler)];
                compiler.fold_or(predicates.into_iter().flatten().collect())
            }
            Self::Not(inner) => inner.compile(compiler).map(|predicate| compiler.negate(predicate)),
        }
    }
}

impl<T> Clone for Specification<T> {
    fn clone(&self) -> Self {
        Self::from_node(self.node.clone())
    }
}

impl<T> Default for Specification<T> {
    fn default() -> Self {
        Self::unrestricted()
    }
}

impl<T> std::fmt::Debug for Specification<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Specification")
            .field("entity", &std::any::type_name::<T>())
            .field("node", &self.node)
            .finish()
    }
}

impl<T> std::ops::Not for Specification<T> {
    type Output = Self;

    fn not(self) -> Self {
        match self.node {
            Node::Unrestricted => self,
            node => Self::from_node(Node::Not(Box::new(node))),
        }
    }
}

/// Specification of entities matching `expression`, joined through `joins`.
#[must_use]
pub fn to_specification<T>(expression: Expression, joins: Arc<EntityJoins>) -> Specification<T> {
    Specification::from_node(Node::Filter {
        expression: Arc::new(expression),
        joins,
    })
}
