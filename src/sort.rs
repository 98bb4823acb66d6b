use crate::errors::FilterError;
use crate::executor::{Direction, SortOrder};
use crate::expression::ExpressionResolver;
use crate::metadata::EntityName;
use crate::models::SearchOptions;

const DEFAULT_SORT_COLUMN: &str = "id";
const DEFAULT_SORT_ORDER: &str = "ASC";

/// Parse JSON sort array format: `["column", "ASC"]`
fn parse_json_sort(json: &str) -> (String, String) {
    let sort_vec: Vec<String> = serde_json::from_str(json).unwrap_or(vec![
        DEFAULT_SORT_COLUMN.to_string(),
        DEFAULT_SORT_ORDER.to_string(),
    ]);
    (
        sort_vec
            .first()
            .cloned()
            .unwrap_or(DEFAULT_SORT_COLUMN.to_string()),
        sort_vec
            .get(1)
            .cloned()
            .unwrap_or(DEFAULT_SORT_ORDER.to_string()),
    )
}

/// Requested sort column and direction, supporting both React Admin and standard
/// REST formats. `None` when the request names no sort.
#[must_use]
pub fn parse_sort_params(params: &SearchOptions) -> Option<(String, Direction)> {
    let order = || Direction::parse(params.order.as_deref().unwrap_or(DEFAULT_SORT_ORDER));

    if let Some(sort_by) = &params.sort_by {
        // sort_by=column&order=ASC/DESC
        Some((sort_by.clone(), order()))
    } else if let Some(sort) = &params.sort {
        if sort.starts_with('[') {
            // sort=["column", "ASC"]
            let (column, direction) = parse_json_sort(sort);
            Some((column, Direction::parse(&direction)))
        } else {
            // sort=column&order=ASC/DESC
            Some((sort.clone(), order()))
        }
    } else {
        None
    }
}

/// Sort keys of a search on `root`.
///
/// Without a requested sort, results are ordered by `id` ascending when the root
/// entity has an `id` field, and left unordered otherwise.
///
/// # Errors
///
/// Returns [`FilterError::FieldResolution`] when the requested column is not a
/// scalar field of `root`.
pub fn parse_sorting(
    params: &SearchOptions,
    resolver: &ExpressionResolver<'_>,
    root: EntityName,
) -> Result<Vec<SortOrder>, FilterError> {
    match parse_sort_params(params) {
        Some((column, direction)) => {
            let field = resolver.resolve_sort_field(root, &column)?;
            Ok(vec![SortOrder { field, direction }])
        }
        None => Ok(resolver
            .resolve_sort_field(root, DEFAULT_SORT_COLUMN)
            .map(|field| SortOrder {
                field,
                direction: Direction::Asc,
            })
            .into_iter()
            .collect()),
    }
}
