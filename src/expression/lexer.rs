//! Lexer for the textual filter language.
//!
//! Produces span-based tokens; text is sliced from the source only when needed.
//! Consecutive unrecognized characters are coalesced into a single `Unexpected`
//! token so malformed input yields one diagnostic per fragment, not per character.

use logos::Logos;
use std::ops::Range;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum TokenKind {
    #[token("(")]
    ParenOpen,

    #[token(")")]
    ParenClose,

    #[token(",")]
    Comma,

    #[token("=")]
    #[token("==")]
    Eq,

    #[token("!=")]
    #[token("<>")]
    NotEq,

    #[token("<")]
    Lt,

    #[token("<=")]
    Le,

    #[token(">")]
    Gt,

    #[token(">=")]
    Ge,

    #[token("and", ignore(case))]
    KwAnd,

    #[token("or", ignore(case))]
    KwOr,

    #[token("not", ignore(case))]
    KwNot,

    #[token("is", ignore(case))]
    KwIs,

    #[token("null", ignore(case))]
    KwNull,

    #[token("in", ignore(case))]
    KwIn,

    #[token("matches", ignore(case))]
    KwMatches,

    #[token("imatches", ignore(case))]
    KwImatches,

    #[token("between", ignore(case))]
    KwBetween,

    #[token("true", ignore(case))]
    #[token("false", ignore(case))]
    Boolean,

    /// Single or double quoted, backslash escapes allowed
    #[regex(r#""(?:[^"\\]|\\.)*""#)]
    #[regex(r"'(?:[^'\\]|\\.)*'")]
    String,

    /// ISO-8601 date or date-time, unquoted
    #[regex(r"[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9](?:T[0-9][0-9]:[0-9][0-9](?::[0-9][0-9](?:\.[0-9]+)?)?(?:Z|[+-][0-9][0-9]:[0-9][0-9])?)?")]
    Date,

    #[regex(r"-?[0-9]+(?:\.[0-9]+)?")]
    Number,

    /// Dot-separated field path. Defined after the keywords so they take precedence.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*")]
    Ident,

    /// Consecutive unrecognized characters coalesced into one token
    Unexpected,

    Eof,
}

impl TokenKind {
    /// Comparison operators of `field_path comp_op value`.
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    /// Tokens that may start a `value`.
    #[must_use]
    pub fn is_value(self) -> bool {
        matches!(self, Self::String | Self::Number | Self::Date | Self::Boolean)
    }

    /// Tokens the parser resynchronizes on after an error.
    #[must_use]
    pub fn is_recovery_point(self) -> bool {
        matches!(self, Self::KwAnd | Self::KwOr | Self::ParenClose | Self::Eof)
    }
}

/// Zero-copy token: kind + byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

impl Token {
    #[inline]
    #[must_use]
    pub fn new(kind: TokenKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }

    /// Text of the token, `<EOF>` for the end marker.
    #[must_use]
    pub fn text<'src>(&self, source: &'src str) -> &'src str {
        if self.kind == TokenKind::Eof {
            "<EOF>"
        } else {
            &source[self.span.clone()]
        }
    }
}

/// Tokenizes `source`, always ending with an `Eof` token.
#[must_use]
pub fn lex(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);
    let mut error_span: Option<Range<usize>> = None;

    while let Some(result) = lexer.next() {
        match result {
            Ok(kind) => {
                if let Some(span) = error_span.take() {
                    tokens.push(Token::new(TokenKind::Unexpected, span));
                }
                tokens.push(Token::new(kind, lexer.span()));
            }
            Err(()) => {
                let span = lexer.span();
                error_span = Some(match error_span.take() {
                    Some(open) => open.start..span.end,
                    None => span,
                });
            }
        }
    }

    if let Some(span) = error_span.take() {
        tokens.push(Token::new(TokenKind::Unexpected, span));
    }
    tokens.push(Token::new(TokenKind::Eof, source.len()..source.len()));
    tokens
}

/// Strips the quotes of a string literal and resolves `\'`, `\"` and `\\`.
#[must_use]
pub fn unquote(literal: &str) -> String {
    let inner = literal
        .get(1..literal.len().saturating_sub(1))
        .unwrap_or_default();
    let mut text = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(escaped @ ('\'' | '"' | '\\')) => text.push(escaped),
                Some(other) => {
                    text.push('\\');
                    text.push(other);
                }
                None => text.push('\\'),
            }
        } else {
            text.push(c);
        }
    }
    text
}

/// 1-based line and column (in characters) of a byte offset.
#[must_use]
pub fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |index| index + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn test_comparison() {
        assert_eq!(
            kinds("firstName = 'John'"),
            vec![TokenKind::Ident, TokenKind::Eq, TokenKind::String, TokenKind::Eof]
        );
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(
            kinds("a IS NOT Null"),
            vec![
                TokenKind::Ident,
                TokenKind::KwIs,
                TokenKind::KwNot,
                TokenKind::KwNull,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        assert_eq!(
            kinds("android.notes"),
            vec![TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn test_values() {
        assert_eq!(
            kinds("150 -2.5 2024-01-31 2024-01-31T10:00:00Z true \"x\""),
            vec![
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Date,
                TokenKind::Date,
                TokenKind::Boolean,
                TokenKind::String,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("!= <= >= < > <>"),
            vec![
                TokenKind::NotEq,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::NotEq,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_unexpected_fragment_is_coalesced() {
        let source = "a = #$% 1";
        let tokens = lex(source);
        let unexpected: Vec<&Token> = tokens
            .iter()
            .filter(|token| token.kind == TokenKind::Unexpected)
            .collect();
        assert_eq!(unexpected.len(), 1);
        assert_eq!(unexpected[0].text(source), "#$%");
    }

    #[test]
    fn test_unquote_escapes() {
        assert_eq!(unquote(r"'O\'Brien'"), "O'Brien");
        assert_eq!(unquote(r#""say \"hi\"""#), "say \"hi\"");
        assert_eq!(unquote(r"'a\\b'"), r"a\b");
        assert_eq!(unquote(r"'50\%'"), r"50\%");
    }

    #[test]
    fn test_line_column() {
        let source = "a = 1\nand b = ";
        assert_eq!(line_column(source, 0), (1, 1));
        assert_eq!(line_column(source, 6), (2, 1));
        assert_eq!(line_column(source, source.len()), (2, 9));
    }
}
