// Catalog Grouping - Web Server
// REST API with Axum over the grouping engine and aggregation editing

use anyhow::anyhow;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use catalog_grouping::{
    editing, logging, search, setup_database, AggregationQuery, AppConfig, CatalogError, Entity,
    EntityPage, EntitySearch, GroupingEngine, GroupingRun,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    engine: Arc<GroupingEngine>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Failure of a handler: domain errors map to 404/400, the rest to 500
struct ApiError(anyhow::Error);

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<CatalogError>() {
            Some(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Some(_) => StatusCode::BAD_REQUEST,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %format!("{:#}", self.0), "request failed");
        }

        (status, Json(ApiResponse::err(format!("{:#}", self.0)))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Run storage/engine work on the blocking pool with the shared connection
async fn blocking<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection, &GroupingEngine) -> anyhow::Result<T> + Send + 'static,
{
    let db = Arc::clone(&state.db);
    let engine = Arc::clone(&state.engine);

    let result = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| anyhow!("database lock poisoned"))?;
        work(&conn, &engine)
    })
    .await
    .map_err(|e| anyhow!("worker task failed: {e}"))?;

    result.map_err(ApiError)
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Deserialize)]
struct GroupingRequest {
    category_id: Option<String>,
    entity_ids: Option<Vec<i64>>,
    similarity_threshold: Option<f64>,
    min_group_size: Option<usize>,
    max_group_size: Option<usize>,
    #[serde(default)]
    force_regenerate: bool,
}

#[derive(Debug, Deserialize)]
struct AddMemberParams {
    order: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ReorderRequest {
    order: i64,
}

#[derive(Debug, Deserialize)]
struct RatingRequest {
    rating: f64,
    comment: Option<String>,
}

#[derive(Serialize)]
struct InvalidateResponse {
    category_id: String,
    invalidated: bool,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/entities - Search entities by name, manufacturer, model or category
async fn search_entities(State(state): State<AppState>, Query(params): Query<EntitySearch>) -> ApiResult<EntityPage> {
    let page = blocking(&state, move |conn, _| search::search_entities(conn, &params)).await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// GET /api/entities/:id - One entity
async fn get_entity(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Entity> {
    let entity = blocking(&state, move |conn, _| search::get_entity(conn, id)).await?;
    Ok(Json(ApiResponse::ok(entity)))
}

/// POST /api/grouping - Run grouping for a scope
async fn run_grouping(State(state): State<AppState>, Json(request): Json<GroupingRequest>) -> ApiResult<GroupingRun> {
    let run = blocking(&state, move |conn, engine| {
        let mut options = engine.options().force_regenerate(request.force_regenerate);
        if let Some(category_id) = request.category_id {
            options = options.for_category(category_id);
        }
        if let Some(entity_ids) = request.entity_ids {
            options = options.for_entities(entity_ids);
        }
        if let Some(threshold) = request.similarity_threshold {
            options = options.with_threshold(threshold);
        }
        let min = request.min_group_size.unwrap_or(options.min_group_size);
        let max = request.max_group_size.unwrap_or(options.max_group_size);
        options = options.with_size_bounds(min, max);

        engine.group(conn, &options)
    })
    .await?;

    Ok(Json(ApiResponse::ok(run)))
}

/// GET /api/aggregations - List aggregations
async fn list_aggregations(
    State(state): State<AppState>,
    Query(query): Query<AggregationQuery>,
) -> ApiResult<Vec<catalog_grouping::Aggregation>> {
    let aggregations = blocking(&state, move |conn, _| editing::list_aggregations(conn, &query)).await?;
    Ok(Json(ApiResponse::ok(aggregations)))
}

/// GET /api/aggregations/:id - One aggregation with its members
async fn get_aggregation(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<catalog_grouping::Aggregation> {
    let aggregation = blocking(&state, move |conn, _| editing::get_aggregation(conn, id)).await?;
    Ok(Json(ApiResponse::ok(aggregation)))
}

/// POST /api/aggregations/:id/items/:entity_id - Add a member
async fn add_member(
    State(state): State<AppState>,
    Path((id, entity_id)): Path<(i64, i64)>,
    Query(params): Query<AddMemberParams>,
) -> ApiResult<catalog_grouping::Membership> {
    let item = blocking(&state, move |conn, _| editing::add_member(conn, id, entity_id, params.order)).await?;
    Ok(Json(ApiResponse::ok(item)))
}

/// DELETE /api/aggregations/:id/items/:item_id - Remove a member
async fn remove_member(State(state): State<AppState>, Path((id, item_id)): Path<(i64, i64)>) -> ApiResult<()> {
    blocking(&state, move |conn, _| editing::remove_member(conn, id, item_id)).await?;
    Ok(Json(ApiResponse::ok(())))
}

/// PUT /api/aggregations/:id/items/:item_id/order - Move a member
async fn reorder_member(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(i64, i64)>,
    Json(request): Json<ReorderRequest>,
) -> ApiResult<catalog_grouping::Membership> {
    let item = blocking(&state, move |conn, _| editing::reorder_member(conn, id, item_id, request.order)).await?;
    Ok(Json(ApiResponse::ok(item)))
}

/// POST /api/aggregations/:id/save - Mark as saved
async fn save_aggregation(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<catalog_grouping::Aggregation> {
    let aggregation = blocking(&state, move |conn, _| editing::save_aggregation(conn, id)).await?;
    Ok(Json(ApiResponse::ok(aggregation)))
}

/// DELETE /api/aggregations/:id - Delete with members and ratings
async fn delete_aggregation(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<()> {
    blocking(&state, move |conn, _| editing::delete_aggregation(conn, id)).await?;
    Ok(Json(ApiResponse::ok(())))
}

/// POST /api/ratings/aggregations/:id - Rate an aggregation
async fn rate_aggregation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<RatingRequest>,
) -> ApiResult<catalog_grouping::RatingSummary> {
    let summary = blocking(&state, move |conn, _| {
        editing::rate_aggregation(conn, id, request.rating, request.comment.as_deref())
    })
    .await?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// GET /api/ratings/aggregations/:id - Ratings, newest first
async fn get_ratings(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Vec<catalog_grouping::Rating>> {
    let ratings = blocking(&state, move |conn, _| editing::get_ratings(conn, id)).await?;
    Ok(Json(ApiResponse::ok(ratings)))
}

/// DELETE /api/categories/:id/significance - Forget significant characteristics
async fn invalidate_significance(
    State(state): State<AppState>,
    Path(category_id): Path<String>,
) -> ApiResult<InvalidateResponse> {
    let response = blocking(&state, move |conn, engine| {
        let invalidated = engine.invalidate_significance(conn, &category_id)?;
        Ok(InvalidateResponse {
            category_id,
            invalidated,
        })
    })
    .await?;
    Ok(Json(ApiResponse::ok(response)))
}

// ============================================================================
// Main Server
// ============================================================================

fn app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/entities", get(search_entities))
        .route("/entities/:id", get(get_entity))
        .route("/grouping", post(run_grouping))
        .route("/aggregations", get(list_aggregations))
        .route("/aggregations/:id", get(get_aggregation).delete(delete_aggregation))
        .route("/aggregations/:id/items/:item", post(add_member).delete(remove_member))
        .route("/aggregations/:id/items/:item/order", put(reorder_member))
        .route("/aggregations/:id/save", post(save_aggregation))
        .route("/ratings/aggregations/:id", post(rate_aggregation).get(get_ratings))
        .route("/categories/:id/significance", delete(invalidate_significance))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    println!("🌐 Catalog Grouping - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = AppConfig::load()?;

    let conn = Connection::open(&config.database_path)?;
    setup_database(&conn)?;
    println!("✓ Database opened: {:?}", config.database_path);

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        engine: Arc::new(GroupingEngine::new(&config)),
    };

    let listener = tokio::net::TcpListener::bind(config.server_addr.as_str()).await?;
    info!(addr = %config.server_addr, "server listening");

    println!("\n🚀 Server running on http://{}", config.server_addr);
    println!("   API: http://{}/api/aggregations", config.server_addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app(state)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: anyhow::Error) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_of(CatalogError::EntityNotFound(7).into()), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(CatalogError::InvalidOptions("min group size (5) exceeds max group size (2)".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(anyhow!("disk full")), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_invalid_grouping_options_are_bad_requests() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let engine = GroupingEngine::new(&AppConfig::default());

        let options = engine.options().with_size_bounds(5, 2);
        let err = engine.group(&conn, &options).unwrap_err();
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }
}
