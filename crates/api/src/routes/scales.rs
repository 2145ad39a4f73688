//! Feature-gated scale directory routes

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    catalog::Scale,
    error::{ApiError, ApiResult},
    state::AppState,
};

const SEARCH_LIMIT: i64 = 25;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<Scale>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub exported_at: String,
    pub scales: Vec<Scale>,
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchResponse>> {
    let query = params
        .q
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::Validation("Query parameter q is required".to_string()))?;

    let results = state.scales.search(&query, SEARCH_LIMIT).await?;
    Ok(Json(SearchResponse { query, results }))
}

pub async fn get_scale(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Scale>> {
    state
        .scales
        .get_by_slug(&slug)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn export(State(state): State<AppState>) -> ApiResult<Json<ExportResponse>> {
    let scales = state.scales.all().await?;
    Ok(Json(ExportResponse {
        exported_at: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
        scales,
    }))
}
