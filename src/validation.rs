//! Validation Support
//!
//! Resolved expressions pass through every configured [`ExpressionValidator`] before
//! they become specifications. Offenses surface as [`FilterError::Validation`], and a
//! request rejected only by validators answers `422 Unprocessable Entity`.
//!
//! # Example
//!
//! ```rust,ignore
//! use crudsearch::validation::{ExpressionValidator, ValidationError, ValidationErrors};
//!
//! struct NoPatternsOnEmail;
//!
//! impl ExpressionValidator for NoPatternsOnEmail {
//!     fn validate(&self, expression: &Expression) -> Result<(), ValidationErrors> {
//!         let mut errors = ValidationErrors::new();
//!         for leaf in expression.leaves() {
//!             if leaf.field.as_str() == "email" && leaf.operator == Operator::Matches {
//!                 errors.add(ValidationError::new("email", "Pattern search is not allowed"));
//!             }
//!         }
//!         errors.result()
//!     }
//! }
//! ```

use crate::errors::{FilterError, FilterErrors};
use crate::expression::Expression;
use serde::Serialize;
use std::fmt;

/// Validation error with field name and message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Field path that failed validation
    pub field: String,
    /// Human-readable error message
    pub message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for FilterError {
    fn from(error: ValidationError) -> Self {
        Self::Validation {
            field: error.field,
            message: error.message,
        }
    }
}

/// Collection of validation errors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// `Ok` when nothing was added.
    ///
    /// # Errors
    ///
    /// Returns `self` when it holds at least one error.
    pub fn result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed with {} error(s):", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationErrors> for FilterErrors {
    fn from(errors: ValidationErrors) -> Self {
        errors
            .errors
            .into_iter()
            .map(FilterError::from)
            .collect::<Vec<_>>()
            .into()
    }
}

/// Check run on every resolved expression before it is compiled.
pub trait ExpressionValidator: Send + Sync {
    /// Return `Ok(())` if the expression is acceptable, otherwise every offense.
    ///
    /// # Errors
    ///
    /// Returns the offenses found in `expression`.
    fn validate(&self, expression: &Expression) -> Result<(), ValidationErrors>;
}

/// Caps the number of values a single condition may carry, e.g. in `in (...)` lists.
#[derive(Debug, Clone, Copy)]
pub struct MaxValuesValidator {
    max: usize,
}

impl MaxValuesValidator {
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl ExpressionValidator for MaxValuesValidator {
    fn validate(&self, expression: &Expression) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for leaf in expression.leaves() {
            if leaf.values.len() > self.max {
                errors.add(ValidationError::new(
                    leaf.field.as_str(),
                    format!(
                        "at most {} values allowed, got {}",
                        self.max,
                        leaf.values.len()
                    ),
                ));
            }
        }
        errors.result()
    }
}

/// Rejects filters on the given field paths and everything below them.
#[derive(Debug, Clone, Default)]
pub struct DeniedFieldsValidator {
    denied: Vec<String>,
}

impl DeniedFieldsValidator {
    pub fn new<I, S>(denied: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            denied: denied.into_iter().map(Into::into).collect(),
        }
    }

    fn is_denied(&self, path: &str) -> bool {
        self.denied.iter().any(|denied| {
            path == denied
                || path
                    .strip_prefix(denied.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}

impl ExpressionValidator for DeniedFieldsValidator {
    fn validate(&self, expression: &Expression) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for leaf in expression.leaves() {
            let path = leaf.field.as_str();
            if self.is_denied(path) {
                errors.add(ValidationError::new(path, "Filtering on this field is not allowed"));
            }
        }
        errors.result()
    }
}

/// Runs every validator and collects all of their offenses.
///
/// # Errors
///
/// Returns the union of the validators' offenses.
pub fn validate_all(
    validators: &[std::sync::Arc<dyn ExpressionValidator>],
    expression: &Expression,
) -> Result<(), FilterErrors> {
    let mut errors = FilterErrors::new();
    for validator in validators {
        if let Err(offenses) = validator.validate(expression) {
            errors.append(offenses.into());
        }
    }
    errors.into_result(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{ExpressionResolver, parse};
    use crate::fixtures;
    use crate::metadata::AliasResolvers;
    use crate::value::DefaultConversionService;
    use std::sync::Arc;

    fn expression(source: &str) -> Expression {
        let registry = fixtures::registry();
        let aliases = AliasResolvers::new();
        ExpressionResolver::new(&registry, &aliases, &DefaultConversionService)
            .resolve(fixtures::person(), &parse(source).unwrap())
            .unwrap()
    }

    #[test]
    fn test_max_values() {
        let validator = MaxValuesValidator::new(2);
        assert!(validator.validate(&expression("lastName in ('a', 'b')")).is_ok());

        let errors = validator
            .validate(&expression("lastName in ('a', 'b', 'c') or height = 3"))
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.errors()[0].field, "lastName");
    }

    #[test]
    fn test_denied_fields_cover_nested_paths() {
        let validator = DeniedFieldsValidator::new(["email", "employer"]);
        let errors = validator
            .validate(&expression(
                "email = 'x' and employer.name = 'Acme' and firstName = 'John'",
            ))
            .unwrap_err();
        let fields: Vec<&str> = errors.errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "employer.name"]);

        // prefix of a name is not a parent path
        let validator = DeniedFieldsValidator::new(["first"]);
        assert!(validator.validate(&expression("firstName = 'John'")).is_ok());
    }

    #[test]
    fn test_validate_all_collects_every_validator() {
        let validators: Vec<Arc<dyn ExpressionValidator>> = vec![
            Arc::new(MaxValuesValidator::new(1)),
            Arc::new(DeniedFieldsValidator::new(["height"])),
        ];
        let errors =
            validate_all(&validators, &expression("lastName in ('a', 'b') and height > 1"))
                .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(FilterError::is_validation));
    }

    #[test]
    fn test_display() {
        let mut errors = ValidationErrors::new();
        errors.add(ValidationError::new("email", "not allowed"));
        assert_eq!(
            errors.to_string(),
            "Validation failed with 1 error(s):\n  - email: not allowed"
        );
    }
}
