//! # Error Handling for Search Endpoints
//!
//! Every stage of the filter pipeline (lexing, parsing, field resolution, value
//! conversion, validation) reports into one aggregated [`FilterErrors`] list instead
//! of failing on the first problem, so a client gets every offense of a request in a
//! single response.
//!
//! Backend failures (connectivity, timeouts, malformed stored documents) are wrapped
//! opaquely in [`SearchError::Backend`]. They are never interpreted or retried here.
//!
//! ## HTTP mapping
//!
//! [`SearchError`] implements [`IntoResponse`]:
//! - filter errors → `400 Bad Request` with a `details` list
//! - validation-only errors → `422 Unprocessable Entity`
//! - backend errors → `500 Internal Server Error`; the cause is logged through
//!   `tracing` and never sent to the client

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::Serialize;
use std::fmt;

/// Opaque error raised by a storage backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Position and message of a lexer or parser problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxDiagnostic {
    /// 1-based line of the offending token
    pub line: usize,
    /// 1-based column (in characters) of the offending token
    pub column: usize,
    /// Offending token text, `<EOF>` at end of input
    pub token: String,
    pub message: String,
}

impl fmt::Display for SyntaxDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}:{} at '{}': {}",
            self.line, self.column, self.token, self.message
        )
    }
}

/// A single offense found while turning filter input into an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterError {
    #[error("syntax error {0}")]
    Syntax(SyntaxDiagnostic),

    /// A grammar token with no operator mapping.
    #[error("unsupported operator '{token}'")]
    UnsupportedOperator { token: String },

    /// A path segment does not exist, or does not lead where it must.
    #[error("cannot resolve field '{path}': {message}")]
    FieldResolution { path: String, message: String },

    #[error("cannot convert '{value}' for field '{path}' to {target}: {message}")]
    Conversion {
        path: String,
        value: String,
        target: String,
        message: String,
    },

    #[error("invalid filter on '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("{feature} is not implemented")]
    NotImplemented { feature: String },

    /// The backend has no storage mapping for a resolved field or entity.
    #[error("no storage mapping for '{path}': {message}")]
    Mapping { path: String, message: String },
}

impl FilterError {
    pub fn field_resolution(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FieldResolution {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn mapping(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            path: path.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// Every offense found in one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FilterErrors(Vec<FilterError>);

impl FilterErrors {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: FilterError) {
        self.0.push(error);
    }

    pub fn append(&mut self, other: FilterErrors) {
        self.0.extend(other.0);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FilterError> {
        self.0.iter()
    }

    /// `Ok(value)` when nothing was recorded.
    ///
    /// # Errors
    ///
    /// Returns `self` when at least one offense was recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl From<FilterError> for FilterErrors {
    fn from(error: FilterError) -> Self {
        Self(vec![error])
    }
}

impl From<Vec<FilterError>> for FilterErrors {
    fn from(errors: Vec<FilterError>) -> Self {
        Self(errors)
    }
}

impl IntoIterator for FilterErrors {
    type Item = FilterError;
    type IntoIter = std::vec::IntoIter<FilterError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a FilterErrors {
    type Item = &'a FilterError;
    type IntoIter = std::slice::Iter<'a, FilterError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for FilterErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for FilterErrors {}

/// Failure of a search request: either bad filter input or the backend.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("invalid filter: {0}")]
    Filter(#[from] FilterErrors),

    #[error("search backend failed: {0}")]
    Backend(#[source] BoxError),
}

impl SearchError {
    pub fn backend(error: impl Into<BoxError>) -> Self {
        Self::Backend(error.into())
    }

    /// The filter offenses, if this is a filter failure.
    #[must_use]
    pub fn filter_errors(&self) -> Option<&FilterErrors> {
        match self {
            Self::Filter(errors) => Some(errors),
            Self::Backend(_) => None,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Filter(errors) if errors.iter().all(FilterError::is_validation) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Filter(_) => StatusCode::BAD_REQUEST,
            Self::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn log_internal(&self) {
        match self {
            Self::Backend(internal) => {
                tracing::error!(error = %internal, "Search backend error occurred");
            }
            Self::Filter(errors) => {
                tracing::debug!(offenses = errors.len(), error = %errors, "Rejected search filter");
            }
        }
    }
}

impl From<FilterError> for SearchError {
    fn from(error: FilterError) -> Self {
        Self::Filter(error.into())
    }
}

impl From<DbErr> for SearchError {
    fn from(error: DbErr) -> Self {
        Self::backend(error)
    }
}

/// Error response sent to users (sanitized)
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<FilterErrors>,
}

impl IntoResponse for SearchError {
    fn into_response(self) -> Response {
        self.log_internal();

        let status = self.status_code();
        let response = match self {
            Self::Filter(errors) => ErrorResponse {
                error: "Invalid search filter".to_string(),
                details: Some(errors),
            },
            Self::Backend(_) => ErrorResponse {
                error: "A database error occurred".to_string(),
                details: None,
            },
        };

        (status, Json(response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syntax() -> FilterError {
        FilterError::Syntax(SyntaxDiagnostic {
            line: 1,
            column: 12,
            token: "<EOF>".to_string(),
            message: "expected a value".to_string(),
        })
    }

    #[test]
    fn test_filter_errors_aggregate() {
        let mut errors = FilterErrors::new();
        assert!(errors.is_empty());
        errors.push(syntax());
        errors.append(FilterError::field_resolution("foo", "no such field").into());
        assert_eq!(errors.len(), 2);
        assert!(errors.clone().into_result(()).is_err());
        assert_eq!(FilterErrors::new().into_result(5), Ok(5));
    }

    #[test]
    fn test_display_lists_every_offense() {
        let errors = FilterErrors::from(vec![
            syntax(),
            FilterError::NotImplemented {
                feature: "BETWEEN".to_string(),
            },
        ]);
        let text = errors.to_string();
        assert!(text.contains("line 1:12 at '<EOF>': expected a value"));
        assert!(text.contains("BETWEEN is not implemented"));
    }

    #[test]
    fn test_status_codes() {
        let bad = SearchError::from(syntax());
        assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);

        let invalid = SearchError::from(FilterError::Validation {
            field: "age".to_string(),
            message: "too many values".to_string(),
        });
        assert_eq!(invalid.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let backend = SearchError::from(DbErr::Custom("connection reset".to_string()));
        assert_eq!(backend.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(backend.filter_errors().is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(FilterErrors::from(FilterError::field_resolution(
            "address.zip",
            "no such field",
        )))
        .unwrap();
        assert_eq!(json[0]["kind"], "field_resolution");
        assert_eq!(json[0]["path"], "address.zip");
    }

    #[test]
    fn test_backend_response_is_sanitized() {
        let response =
            SearchError::from(DbErr::Custom("password=hunter2".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
