//! Generic axum handler exposing a [`SearchService`] as `GET <path>`.
//!
//! Query parameters are documented by [`SearchOptions`](crate::models::SearchOptions);
//! the response is a JSON array with a `Content-Range` header:
//!
//! ```text
//! GET /people?lastName=Doe&height_gte=170&sort=["height","DESC"]&range=[0,9]
//! Content-Range: people 0-9/42
//! ```

use crate::errors::SearchError;
use crate::pagination::calculate_content_range;
use crate::service::SearchService;
use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use hyper::HeaderMap;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

/// Groups repeated query keys, keeping the order of first appearance.
fn group_params(pairs: Vec<(String, String)>) -> IndexMap<String, Vec<String>> {
    let mut params: IndexMap<String, Vec<String>> = IndexMap::new();
    for (key, value) in pairs {
        params.entry(key).or_default().push(value);
    }
    params
}

pub async fn search<T>(
    State(service): State<Arc<SearchService<T>>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<(HeaderMap, Json<Vec<T>>), SearchError>
where
    T: Serialize + Send + Sync + 'static,
{
    let results = service.search(&group_params(pairs)).await?;
    let headers = calculate_content_range(
        results.offset,
        results.limit,
        results.total,
        &service.resource_name(),
    );
    Ok((headers, Json(results.items)))
}

/// Router serving `service` at `path`.
pub fn search_router<T>(path: &str, service: Arc<SearchService<T>>) -> Router
where
    T: Serialize + Send + Sync + 'static,
{
    Router::new()
        .route(path, get(search::<T>))
        .with_state(service)
}
