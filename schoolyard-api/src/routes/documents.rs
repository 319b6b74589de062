//! Document Collection Endpoints
//!
//! CRUD, query, count, search, batch, and stats operations over named
//! collections. The collection name is purely a namespace; collections come
//! into existence on first write.
//!
//! The literal segments `query`, `count`, `search`, `batch`, and `stats` are
//! reserved and cannot be used as document ids in URLs.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use schoolyard_core::{Filter, FilterOp, QuerySpec, SortOrder, ValidationError};
use schoolyard_store::CollectionStats;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/:collection", post(create_document))
        .route("/:collection/query", post(query_documents))
        .route("/:collection/count", post(count_documents))
        .route("/:collection/search", get(search_documents))
        .route(
            "/:collection/batch",
            post(batch_create).patch(batch_update),
        )
        .route("/:collection/stats", get(collection_stats))
        .route(
            "/:collection/:id",
            get(read_document)
                .patch(update_document)
                .delete(delete_document),
        )
}

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Body for document creation: an optional caller-chosen id plus the open
/// payload. Reserved fields (`createdAt`, `updatedAt`) are honored if the
/// caller supplies them.
#[derive(Debug, Deserialize)]
struct CreateDocumentRequest {
    id: Option<String>,
    #[serde(flatten)]
    data: Map<String, Value>,
}

/// One filter in wire form; the operator is parsed strictly, unknown names
/// are a 400.
#[derive(Debug, Deserialize)]
struct FilterClause {
    field: String,
    op: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    #[serde(default)]
    filters: Vec<FilterClause>,
    order_by: Option<String>,
    order: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

#[derive(Debug, Serialize)]
struct DocumentListResponse {
    documents: Vec<schoolyard_core::Document>,
    count: usize,
}

#[derive(Debug, Deserialize)]
struct CountRequest {
    #[serde(default)]
    filters: Vec<FilterClause>,
}

#[derive(Debug, Serialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
    /// Comma-separated top-level field names; defaults to content,title,name.
    fields: Option<String>,
    limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BatchCreateRequest {
    documents: Vec<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
struct BatchCreateResponse {
    ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BatchUpdateItem {
    id: String,
    #[serde(flatten)]
    data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct BatchUpdateRequest {
    updates: Vec<BatchUpdateItem>,
}

#[derive(Debug, Serialize)]
struct BatchUpdateResponse {
    updated: u64,
}

fn parse_filters(clauses: Vec<FilterClause>) -> ApiResult<Vec<Filter>> {
    clauses
        .into_iter()
        .map(|c| Ok(Filter::new(c.field, FilterOp::parse(&c.op)?, c.value)))
        .collect()
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn create_document(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(body): Json<CreateDocumentRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = state.store.create(&collection, body.data, body.id).await?;
    let doc = state
        .store
        .read(&collection, &id)
        .await?
        .ok_or_else(|| ApiError::internal("created document vanished"))?;
    Ok((StatusCode::CREATED, Json(doc)))
}

async fn read_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    match state.store.read(&collection, &id).await? {
        Some(doc) => Ok(Json(doc)),
        None => Err(ApiError::not_found(&collection, &id)),
    }
}

async fn update_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Json(partial): Json<Map<String, Value>>,
) -> ApiResult<impl IntoResponse> {
    if !state.store.update(&collection, &id, partial).await? {
        return Err(ApiError::not_found(&collection, &id));
    }
    let doc = state
        .store
        .read(&collection, &id)
        .await?
        .ok_or_else(|| ApiError::internal("updated document vanished"))?;
    Ok(Json(doc))
}

async fn delete_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    if !state.store.delete(&collection, &id).await? {
        return Err(ApiError::not_found(&collection, &id));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn query_documents(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(body): Json<QueryRequest>,
) -> ApiResult<impl IntoResponse> {
    let order = match body.order.as_deref() {
        Some(s) => SortOrder::parse(s)?,
        None => SortOrder::default(),
    };
    let spec = QuerySpec {
        filters: parse_filters(body.filters)?,
        order_by: body.order_by,
        order,
        limit: body.limit,
        offset: body.offset,
    };

    let documents = state.store.query(&collection, &spec).await?;
    let count = documents.len();
    Ok(Json(DocumentListResponse { documents, count }))
}

async fn count_documents(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(body): Json<CountRequest>,
) -> ApiResult<impl IntoResponse> {
    let filters = parse_filters(body.filters)?;
    let count = state.store.count(&collection, &filters).await?;
    Ok(Json(CountResponse { count }))
}

async fn search_documents(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<SearchParams>,
) -> ApiResult<impl IntoResponse> {
    let fields = params.fields.map(|csv| {
        csv.split(',')
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect()
    });

    let documents = state
        .store
        .search(&collection, &params.q, fields, params.limit)
        .await?;
    let count = documents.len();
    Ok(Json(DocumentListResponse { documents, count }))
}

async fn batch_create(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(body): Json<BatchCreateRequest>,
) -> ApiResult<impl IntoResponse> {
    if body.documents.is_empty() {
        return Err(ValidationError::EmptyBatch.into());
    }
    let ids = state.store.batch_create(&collection, body.documents).await?;
    Ok((StatusCode::CREATED, Json(BatchCreateResponse { ids })))
}

async fn batch_update(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(body): Json<BatchUpdateRequest>,
) -> ApiResult<impl IntoResponse> {
    if body.updates.is_empty() {
        return Err(ValidationError::EmptyBatch.into());
    }
    let updates = body
        .updates
        .into_iter()
        .map(|item| (item.id, item.data))
        .collect();
    let updated = state.store.batch_update(&collection, updates).await?;
    Ok(Json(BatchUpdateResponse { updated }))
}

async fn collection_stats(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> ApiResult<Json<CollectionStats>> {
    Ok(Json(state.store.stats(&collection).await?))
}
