//! Typed filter values and the conversion of raw request strings into them.

use crate::metadata::EntityName;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Declared type of a field, the target of value conversion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Integer,
    Float,
    Boolean,
    Uuid,
    Date,
    DateTime,
    /// Enumeration with its variant names
    Enum(&'static [&'static str]),
    /// Reference to another entity type
    Entity(EntityName),
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Integer => f.write_str("integer"),
            Self::Float => f.write_str("float"),
            Self::Boolean => f.write_str("boolean"),
            Self::Uuid => f.write_str("uuid"),
            Self::Date => f.write_str("date"),
            Self::DateTime => f.write_str("datetime"),
            Self::Enum(variants) => write!(f, "one of [{}]", variants.join(", ")),
            Self::Entity(entity) => write!(f, "entity {}", entity.simple()),
        }
    }
}

/// A converted filter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Uuid(Uuid),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    /// Canonical variant name
    Enum(String),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) | Self::Enum(text) => Some(text),
            _ => None,
        }
    }

    /// Ordering between two values of compatible types.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::String(a), Self::String(b)) | (Self::Enum(a), Self::Enum(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Integer(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::Uuid(a), Self::Uuid(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::DateTime(b)) => Some(a.cmp(&b.date_naive())),
            (Self::DateTime(a), Self::Date(b)) => Some(a.date_naive().cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::String(text) => write!(f, "'{}'", text.replace('\'', "\\'")),
            Self::Integer(number) => write!(f, "{number}"),
            Self::Float(number) => write!(f, "{number}"),
            Self::Boolean(flag) => write!(f, "{flag}"),
            Self::Uuid(id) => write!(f, "'{id}'"),
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::DateTime(timestamp) => write!(f, "{}", timestamp.to_rfc3339()),
            Self::Enum(variant) => write!(f, "'{variant}'"),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::String(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::String(text)
    }
}

impl From<i64> for Value {
    fn from(number: i64) -> Self {
        Self::Integer(number)
    }
}

impl From<i32> for Value {
    fn from(number: i32) -> Self {
        Self::Integer(i64::from(number))
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Self::Float(number)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Self::Boolean(flag)
    }
}

impl From<Uuid> for Value {
    fn from(id: Uuid) -> Self {
        Self::Uuid(id)
    }
}

impl From<NaiveDate> for Value {
    fn from(date: NaiveDate) -> Self {
        Self::Date(date)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(timestamp: DateTime<Utc>) -> Self {
        Self::DateTime(timestamp)
    }
}

/// Converts raw request strings to the declared type of a field.
pub trait ConversionService: Send + Sync {
    /// # Errors
    ///
    /// Returns a human-readable reason when `raw` is not a valid `target`.
    fn convert(&self, raw: &str, target: &ValueType) -> Result<Value, String>;
}

/// Conversions for every [`ValueType`] except entity references.
///
/// Dates accept `YYYY-MM-DD`; date-times accept RFC 3339, a naive
/// `YYYY-MM-DDTHH:MM:SS[.f]` taken as UTC, or a bare date at midnight UTC.
/// Enum variants match case-insensitively.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConversionService;

impl DefaultConversionService {
    fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
            return Some(timestamp.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(naive.and_utc());
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
            return Some(naive.and_utc());
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }
}

impl ConversionService for DefaultConversionService {
    fn convert(&self, raw: &str, target: &ValueType) -> Result<Value, String> {
        match target {
            ValueType::String => Ok(Value::String(raw.to_string())),
            ValueType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| e.to_string()),
            ValueType::Float => raw
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| e.to_string()),
            ValueType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Boolean(true)),
                "false" | "0" => Ok(Value::Boolean(false)),
                _ => Err("expected true or false".to_string()),
            },
            ValueType::Uuid => Uuid::parse_str(raw.trim())
                .map(Value::Uuid)
                .map_err(|e| e.to_string()),
            ValueType::Date => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|e| e.to_string()),
            ValueType::DateTime => Self::parse_datetime(raw.trim())
                .map(Value::DateTime)
                .ok_or_else(|| "expected an ISO-8601 date or date-time".to_string()),
            ValueType::Enum(variants) => variants
                .iter()
                .find(|variant| variant.eq_ignore_ascii_case(raw.trim()))
                .map(|variant| Value::Enum((*variant).to_string()))
                .ok_or_else(|| format!("expected one of [{}]", variants.join(", "))),
            ValueType::Entity(entity) => Err(format!(
                "{} is an entity, not a value",
                entity.simple()
            )),
        }
    }
}
