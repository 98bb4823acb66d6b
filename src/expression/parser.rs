//! Recursive-descent parser for the textual filter language.
//!
//! ```text
//! start            := expression EOF
//! expression       := or
//! or               := and ('or' and)*
//! and              := unary ('and' unary)*
//! unary            := 'not' unary | '(' expression ')' | predicate
//! predicate        := field_path comp_op value
//!                   | field_path 'is' ['not'] 'null'
//!                   | field_path ['not'] 'in' '(' value (',' value)* ')'
//!                   | field_path ('matches' | 'imatches') string_value
//!                   | field_path 'between' value 'and' value
//! ```
//!
//! Precedence is NOT > AND > OR. The parser never stops at the first problem: each
//! error is recorded as a diagnostic and parsing resumes at the next `and`, `or`
//! or `)`, so one pass reports everything wrong with the input.

use super::lexer::{Token, TokenKind, lex, line_column, unquote};
use crate::errors::{FilterError, FilterErrors, SyntaxDiagnostic};
use std::ops::Range;

const MAX_DEPTH: usize = 64;

/// Lexical category of a literal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    String,
    Number,
    Date,
    Boolean,
}

/// A value as written in the filter, quotes removed and escapes resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    pub kind: LiteralKind,
    pub text: String,
    pub span: Range<usize>,
}

/// A field path as written in the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub path: String,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl TryFrom<TokenKind> for CompareOp {
    type Error = ();

    fn try_from(kind: TokenKind) -> Result<Self, Self::Error> {
        match kind {
            TokenKind::Eq => Ok(Self::Eq),
            TokenKind::NotEq => Ok(Self::NotEq),
            TokenKind::Lt => Ok(Self::Lt),
            TokenKind::Le => Ok(Self::Le),
            TokenKind::Gt => Ok(Self::Gt),
            TokenKind::Ge => Ok(Self::Ge),
            _ => Err(()),
        }
    }
}

/// Parse tree of a filter, before field resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterNode {
    Compare {
        field: FieldRef,
        op: CompareOp,
        value: Literal,
    },
    IsNull {
        field: FieldRef,
        negated: bool,
    },
    In {
        field: FieldRef,
        values: Vec<Literal>,
        negated: bool,
    },
    Matches {
        field: FieldRef,
        pattern: Literal,
        case_insensitive: bool,
    },
    Between {
        field: FieldRef,
        low: Literal,
        high: Literal,
    },
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
}

/// Parses `source` into a [`FilterNode`].
///
/// # Errors
///
/// Returns every lexer and parser diagnostic found in the input.
pub fn parse(source: &str) -> Result<FilterNode, FilterErrors> {
    let mut parser = Parser::new(source);
    let node = parser.parse_start();
    match node {
        Some(node) if parser.errors.is_empty() => Ok(node),
        _ => {
            if parser.errors.is_empty() {
                parser.error_at_current("expected a filter expression");
            }
            Err(parser.errors)
        }
    }
}

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    errors: FilterErrors,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> Self {
        let tokens = lex(source);
        let mut parser = Self {
            source,
            tokens,
            pos: 0,
            depth: 0,
            errors: FilterErrors::new(),
        };
        parser.skip_unexpected();
        parser
    }

    fn current(&self) -> &Token {
        // `lex` always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn bump(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        self.skip_unexpected();
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Reports lexer fragments as diagnostics and steps over them.
    fn skip_unexpected(&mut self) {
        while self.current().kind == TokenKind::Unexpected {
            self.error_at_current("unrecognized input");
            self.pos += 1;
        }
    }

    fn error_at(&mut self, token: &Token, message: impl Into<String>) {
        let (line, column) = line_column(self.source, token.span.start);
        self.errors.push(FilterError::Syntax(SyntaxDiagnostic {
            line,
            column,
            token: token.text(self.source).to_string(),
            message: message.into(),
        }));
    }

    fn error_at_current(&mut self, message: impl Into<String>) {
        let token = self.current().clone();
        self.error_at(&token, message);
    }

    /// Skips to the next token the enclosing rules can continue from.
    fn recover(&mut self) {
        while !self.current().kind.is_recovery_point() {
            self.bump();
        }
    }

    fn parse_start(&mut self) -> Option<FilterNode> {
        let node = self.parse_or();
        while !self.at(TokenKind::Eof) {
            self.error_at_current("unexpected token after expression");
            self.bump();
            // keep collecting diagnostics from whatever follows
            if !self.current().kind.is_recovery_point() {
                self.parse_or();
            }
        }
        node
    }

    fn parse_or(&mut self) -> Option<FilterNode> {
        let mut children = vec![self.parse_and()];
        while self.eat(TokenKind::KwOr) {
            children.push(self.parse_and());
        }
        Self::combine(children, FilterNode::Or)
    }

    fn parse_and(&mut self) -> Option<FilterNode> {
        let mut children = vec![self.parse_unary()];
        while self.eat(TokenKind::KwAnd) {
            children.push(self.parse_unary());
        }
        Self::combine(children, FilterNode::And)
    }

    /// Single child passes through; any failed child fails the group.
    fn combine(
        children: Vec<Option<FilterNode>>,
        group: fn(Vec<FilterNode>) -> FilterNode,
    ) -> Option<FilterNode> {
        let mut nodes: Vec<FilterNode> = children.into_iter().collect::<Option<_>>()?;
        if nodes.len() == 1 {
            nodes.pop()
        } else {
            Some(group(nodes))
        }
    }

    fn parse_unary(&mut self) -> Option<FilterNode> {
        if self.depth >= MAX_DEPTH {
            self.error_at_current("expression nested too deeply");
            self.recover();
            return None;
        }
        self.depth += 1;
        let node = self.parse_unary_inner();
        self.depth -= 1;
        node
    }

    fn parse_unary_inner(&mut self) -> Option<FilterNode> {
        match self.current().kind {
            TokenKind::KwNot => {
                self.bump();
                let operand = self.parse_unary()?;
                Some(FilterNode::Not(Box::new(operand)))
            }
            TokenKind::ParenOpen => {
                self.bump();
                let inner = self.parse_or();
                if !self.eat(TokenKind::ParenClose) {
                    self.error_at_current("expected ')'");
                    self.recover();
                    return None;
                }
                inner
            }
            TokenKind::Ident => self.parse_predicate(),
            _ => {
                self.error_at_current("expected a field path, 'not' or '('");
                self.recover();
                None
            }
        }
    }

    fn parse_predicate(&mut self) -> Option<FilterNode> {
        let token = self.bump();
        let field = FieldRef {
            path: token.text(self.source).to_string(),
            span: token.span,
        };

        let kind = self.current().kind;
        let node = match kind {
            kind if kind.is_comparison() => self.parse_comparison(field),
            TokenKind::KwIs => {
                self.bump();
                let negated = self.eat(TokenKind::KwNot);
                if self.eat(TokenKind::KwNull) {
                    Some(FilterNode::IsNull { field, negated })
                } else {
                    self.error_at_current("expected 'null'");
                    None
                }
            }
            TokenKind::KwNot => {
                self.bump();
                if self.eat(TokenKind::KwIn) {
                    self.parse_in(field, true)
                } else {
                    self.error_at_current("expected 'in'");
                    None
                }
            }
            TokenKind::KwIn => {
                self.bump();
                self.parse_in(field, false)
            }
            TokenKind::KwMatches | TokenKind::KwImatches => {
                self.bump();
                let pattern = self.parse_string()?;
                Some(FilterNode::Matches {
                    field,
                    pattern,
                    case_insensitive: kind == TokenKind::KwImatches,
                })
            }
            TokenKind::KwBetween => {
                self.bump();
                let low = self.parse_value()?;
                if !self.eat(TokenKind::KwAnd) {
                    self.error_at_current("expected 'and'");
                    return None;
                }
                let high = self.parse_value()?;
                Some(FilterNode::Between { field, low, high })
            }
            _ => {
                self.error_at_current(
                    "expected an operator (=, !=, <, <=, >, >=, is, in, matches, imatches)",
                );
                None
            }
        };

        if node.is_none() {
            self.recover();
        }
        node
    }

    fn parse_comparison(&mut self, field: FieldRef) -> Option<FilterNode> {
        let token = self.bump();
        let Ok(op) = CompareOp::try_from(token.kind) else {
            self.errors.push(FilterError::UnsupportedOperator {
                token: token.text(self.source).to_string(),
            });
            return None;
        };
        let value = self.parse_value()?;
        Some(FilterNode::Compare { field, op, value })
    }

    fn parse_in(&mut self, field: FieldRef, negated: bool) -> Option<FilterNode> {
        if !self.eat(TokenKind::ParenOpen) {
            self.error_at_current("expected '('");
            return None;
        }
        let mut values = vec![self.parse_value()?];
        while self.eat(TokenKind::Comma) {
            values.push(self.parse_value()?);
        }
        if !self.eat(TokenKind::ParenClose) {
            self.error_at_current("expected ',' or ')'");
            return None;
        }
        Some(FilterNode::In {
            field,
            values,
            negated,
        })
    }

    fn parse_value(&mut self) -> Option<Literal> {
        let token = self.current().clone();
        if !token.kind.is_value() {
            self.error_at(&token, "expected a value");
            return None;
        }
        self.bump();

        let kind = match token.kind {
            TokenKind::String => LiteralKind::String,
            TokenKind::Date => LiteralKind::Date,
            TokenKind::Boolean => LiteralKind::Boolean,
            _ => LiteralKind::Number,
        };

        let raw = token.text(self.source);
        let text = if kind == LiteralKind::String {
            unquote(raw)
        } else {
            raw.to_string()
        };
        Some(Literal {
            kind,
            text,
            span: token.span,
        })
    }

    fn parse_string(&mut self) -> Option<Literal> {
        if self.at(TokenKind::String) {
            self.parse_value()
        } else {
            self.error_at_current("expected a quoted string");
            None
        }
    }
}
