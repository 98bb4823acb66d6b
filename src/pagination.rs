use crate::models::SearchOptions;
use axum::http::header::HeaderMap;

/// Parse a React Admin range `"[start, end]"`; `(0, 9)` when missing or malformed.
#[must_use]
pub fn parse_range(range_str: Option<&str>) -> (u64, u64) {
    range_str.map_or((0, 9), |r| {
        serde_json::from_str::<[u64; 2]>(r)
            .map(|range| (range[0], range[1]))
            .unwrap_or((0, 9))
    })
}

/// Offset and limit of the requested page.
///
/// `page`/`per_page` wins over `range`; without either, the first `default_size`
/// items are returned. The limit never exceeds `max_size` and is at least 1.
#[must_use]
pub fn parse_pagination(params: &SearchOptions, default_size: u64, max_size: u64) -> (u64, u64) {
    let (offset, limit) = if let (Some(page), Some(per_page)) = (params.page, params.per_page) {
        // Standard REST pagination (1-based page numbers)
        (page.saturating_sub(1).saturating_mul(per_page), per_page)
    } else if let Some(range) = &params.range {
        // React Admin pagination
        let (start, end) = parse_range(Some(range));
        (start, end.saturating_sub(start).saturating_add(1))
    } else {
        (0, default_size)
    };
    (offset, limit.clamp(1, max_size.max(1)))
}

/// Sanitize resource name by removing control characters for HTTP headers
fn sanitize_resource_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .collect()
}

/// Builds the `Content-Range` header `<resource> <first>-<last>/<total>`.
///
/// The resource name is stripped of characters that cannot appear in a header.
#[must_use]
pub fn calculate_content_range(
    offset: u64,
    limit: u64,
    total_count: u64,
    resource_name: &str,
) -> HeaderMap {
    let max_offset_limit = offset
        .saturating_add(limit)
        .saturating_sub(1)
        .min(total_count.saturating_sub(1));
    let safe_name = sanitize_resource_name(resource_name);
    let content_range = format!("{safe_name} {offset}-{max_offset_limit}/{total_count}");

    let mut headers = HeaderMap::new();
    if let Ok(value) = content_range.parse() {
        headers.insert("Content-Range", value);
    } else if let Ok(value) = format!("items {offset}-{max_offset_limit}/{total_count}").parse() {
        headers.insert("Content-Range", value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_range(headers: &HeaderMap) -> &str {
        headers.get("Content-Range").unwrap().to_str().unwrap()
    }

    #[test]
    fn test_content_range_normal() {
        let headers = calculate_content_range(0, 10, 100, "people");
        assert_eq!(content_range(&headers), "people 0-9/100");
    }

    #[test]
    fn test_content_range_strips_control_characters() {
        let headers = calculate_content_range(0, 10, 100, "people\r\nInjected: evil");
        let value = content_range(&headers);
        assert!(!value.contains('\r'));
        assert!(!value.contains('\n'));
        assert!(value.starts_with("peopleInjected: evil"));
    }

    #[test]
    fn test_content_range_does_not_overflow() {
        let headers = calculate_content_range(u64::MAX - 5, 10, u64::MAX, "people");
        assert!(content_range(&headers).starts_with("people"));

        let headers = calculate_content_range(0, 0, 0, "people");
        assert_eq!(content_range(&headers), "people 0-0/0");
    }

    #[test]
    fn test_content_range_last_partial_page() {
        let headers = calculate_content_range(0, 10, 5, "people");
        assert_eq!(content_range(&headers), "people 0-4/5");

        let headers = calculate_content_range(10, 10, 15, "people");
        assert_eq!(content_range(&headers), "people 10-14/15");
    }

    #[test]
    fn test_pagination_formats() {
        let rest = SearchOptions {
            page: Some(3),
            per_page: Some(20),
            range: Some("[0,4]".to_string()),
            ..SearchOptions::default()
        };
        assert_eq!(parse_pagination(&rest, 10, 100), (40, 20));

        let range = SearchOptions {
            range: Some("[10,19]".to_string()),
            ..SearchOptions::default()
        };
        assert_eq!(parse_pagination(&range, 10, 100), (10, 10));

        assert_eq!(parse_pagination(&SearchOptions::default(), 25, 100), (0, 25));
    }

    #[test]
    fn test_pagination_is_clamped() {
        let huge = SearchOptions {
            page: Some(1),
            per_page: Some(10_000),
            ..SearchOptions::default()
        };
        assert_eq!(parse_pagination(&huge, 10, 100), (0, 100));

        let zero = SearchOptions {
            page: Some(0),
            per_page: Some(0),
            ..SearchOptions::default()
        };
        assert_eq!(parse_pagination(&zero, 10, 100), (0, 1));
    }

    #[test]
    fn test_malformed_range_uses_default_window() {
        assert_eq!(parse_range(Some("[5]")), (0, 9));
        assert_eq!(parse_range(None), (0, 9));
    }
}
