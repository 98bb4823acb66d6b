use crate::expression::DEFAULT_NULL_TOKEN;
use indexmap::IndexMap;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// Query parameters controlling filtering, pagination, and sorting of a search.
///
/// Every query parameter that is not listed here is a field filter:
/// `lastName=Doe` means equality, a repeated key (`status=Active&status=Retired`)
/// means membership, and `$null` stands for null. Keys may carry an operator
/// suffix such as `height_gte=180` or `firstName_like=jo`.
///
/// # Filtering
/// The `filter` parameter holds a textual query that is ANDed with the field filters:
/// ```text
/// height > 150 and (addresses.city = 'Bern' or tags in ('rust', 'sql'))
/// ```
///
/// # Pagination
/// - **React Admin format:** `range=[0,9]`
/// - **Standard REST format:** `page=1&per_page=10` (1-based page numbers)
///
/// # Sorting
/// - **React Admin format:** `sort=["id", "ASC"]`
/// - **Standard REST format:** `sort_by=id&order=DESC`
#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema, Default)]
#[into_params(parameter_in = Query)]
pub struct SearchOptions {
    /// Textual filter query.
    ///
    /// Example: `height >= 180 and not lastName in ('Doe')`
    #[param(example = "height >= 180 and addresses.city = 'Bern'")]
    pub filter: Option<String>,
    /// Range for pagination in the format "[start, end]".
    ///
    /// Example: `[0,9]`
    #[param(example = "[0,9]")]
    pub range: Option<String>,
    /// Page number for standard REST pagination (1-based).
    #[param(example = 1)]
    pub page: Option<u64>,
    /// Number of items per page for standard REST pagination.
    #[param(example = 10)]
    pub per_page: Option<u64>,
    /// Sort order in the format '["column", "order"]', or a plain column name.
    ///
    /// Example: `["id", "ASC"]`
    #[param(example = r#"["id", "ASC"]"#)]
    pub sort: Option<String>,
    /// Column to sort by (standard REST format).
    #[param(example = "id")]
    pub sort_by: Option<String>,
    /// Sort direction, `ASC` or `DESC`.
    #[param(example = "ASC")]
    pub order: Option<String>,
}

impl SearchOptions {
    /// Picks the reserved keys out of a flat parameter map; the last value of a
    /// repeated key wins.
    #[must_use]
    pub fn from_params(params: &IndexMap<String, Vec<String>>) -> Self {
        let last = |key: &str| params.get(key).and_then(|values| values.last()).cloned();
        let number = |key: &str| last(key).and_then(|value| value.trim().parse::<u64>().ok());
        Self {
            filter: last("filter"),
            range: last("range"),
            page: number("page"),
            per_page: number("per_page"),
            sort: last("sort"),
            sort_by: last("sort_by"),
            order: last("order"),
        }
    }
}

/// Settings of a search endpoint.
///
/// Deserializable from any serde source; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Raw value standing for an explicit null in field filters
    pub null_token: String,
    pub default_page_size: u64,
    /// Upper bound of any requested page size
    pub max_page_size: u64,
    /// Whether keys like `height_gte` are understood as operators
    pub operator_suffixes: bool,
    /// Query keys that are never field filters
    pub reserved_params: Vec<String>,
}

impl SearchConfig {
    #[must_use]
    pub fn is_reserved(&self, key: &str) -> bool {
        self.reserved_params.iter().any(|reserved| reserved == key)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            null_token: DEFAULT_NULL_TOKEN.to_string(),
            default_page_size: 10,
            max_page_size: 100,
            operator_suffixes: true,
            reserved_params: ["filter", "range", "page", "per_page", "sort", "sort_by", "order"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}
