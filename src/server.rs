//! HTTP RPC server.
//!
//! Exposes the read-only query surface over JSON. Writes never enter through
//! here; they come only from the ingestion pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | RPC method |
//! |--------|------|------------|
//! | `GET`  | `/health` | — |
//! | `POST` | `/api/v1/query` | `semantic_query` |
//! | `POST` | `/api/v1/get_doc` | `get_document` |
//! | `POST` | `/api/v1/find_concept` | `find_by_concept` |
//!
//! Request bodies carry the method name and params; responses echo the
//! request id:
//!
//! ```json
//! { "jsonrpc": "2.0", "method": "semantic_query",
//!   "params": { "query": "backups", "max_results": 5 }, "id": 1 }
//! ```
//!
//! # Error Contract
//!
//! Malformed JSON ⇒ 400, unknown path or method ⇒ 404, missing document ⇒
//! 404, invalid params ⇒ 400, internal failure ⇒ 500. Error bodies:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "document 7 not found" } }
//! ```

use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::embedding::Embedder;
use crate::get::{find_by_concept, get_document};
use crate::search::semantic_search_documents;

const DEFAULT_MAX_RESULTS: usize = 10;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    pool: SqlitePool,
    embedder: Arc<Embedder>,
}

/// Build the router over an open pool and embedder handle.
pub fn build_router(pool: SqlitePool, embedder: Arc<Embedder>) -> Router {
    let state = AppState { pool, embedder };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/v1/query", post(handle_query))
        .route("/api/v1/get_doc", post(handle_get_doc))
        .route("/api/v1/find_concept", post(handle_find_concept))
        .fallback(handle_unknown_path)
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process terminates.
pub async fn run_server(
    config: &Config,
    pool: SqlitePool,
    embedder: Arc<Embedder>,
) -> anyhow::Result<()> {
    let bind_addr = config.api.bind_addr();
    let app = build_router(pool, embedder);

    tracing::info!("RPC server listening on http://{}", bind_addr);
    println!("RPC server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error responses ============

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": { "code": self.code, "message": self.message }
        });
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

// ============ RPC envelope ============

#[derive(Deserialize)]
struct RpcRequest {
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Value,
}

fn rpc_result(id: &Value, result: Value) -> Json<Value> {
    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

fn parse_body(body: Result<Json<RpcRequest>, JsonRejection>) -> Result<RpcRequest, AppError> {
    match body {
        Ok(Json(request)) => Ok(request),
        Err(rejection) => Err(bad_request(rejection.body_text())),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, AppError> {
    serde_json::from_value(params).map_err(|e| bad_request(format!("Invalid params: {}", e)))
}

// ============ GET /health ============

async fn handle_health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============ POST /api/v1/query ============

#[derive(Deserialize)]
struct QueryParams {
    query: String,
    #[serde(default)]
    max_results: Option<usize>,
    #[serde(default)]
    include_content: bool,
    #[serde(default)]
    max_tokens: Option<usize>,
}

async fn handle_query(
    State(state): State<AppState>,
    body: Result<Json<RpcRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let request = parse_body(body)?;
    if request.method != "semantic_query" {
        return Err(not_found(format!("Unknown method: {}", request.method)));
    }

    let params: QueryParams = parse_params(request.params)?;
    if params.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let limit = params.max_results.unwrap_or(DEFAULT_MAX_RESULTS);

    let results = semantic_search_documents(&state.pool, &state.embedder, &params.query, limit)
        .await
        .map_err(|e| internal_error(e.to_string()))?;

    let mut documents = Vec::with_capacity(results.len());
    for result in &results {
        let mut doc = json!({
            "id": result.id,
            "path": result.path,
            "title": result.title,
            "category": result.category,
            "modified_at": result.modified_at,
            "score": result.score,
        });
        if params.include_content {
            let record = get_document(&state.pool, result.id, true, params.max_tokens)
                .await
                .map_err(|e| internal_error(e.to_string()))?;
            if let Some(record) = record {
                doc["content"] = json!(record.content);
            }
        }
        documents.push(doc);
    }

    Ok(rpc_result(
        &request.id,
        json!({ "count": documents.len(), "documents": documents }),
    ))
}

// ============ POST /api/v1/get_doc ============

#[derive(Deserialize)]
struct GetDocParams {
    document_id: i64,
    #[serde(default)]
    include_content: bool,
    #[serde(default)]
    max_tokens: Option<usize>,
}

async fn handle_get_doc(
    State(state): State<AppState>,
    body: Result<Json<RpcRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let request = parse_body(body)?;
    if request.method != "get_document" {
        return Err(not_found(format!("Unknown method: {}", request.method)));
    }

    let params: GetDocParams = parse_params(request.params)?;

    let record = get_document(
        &state.pool,
        params.document_id,
        params.include_content,
        params.max_tokens,
    )
    .await
    .map_err(|e| internal_error(e.to_string()))?;

    match record {
        Some(record) => Ok(rpc_result(
            &request.id,
            serde_json::to_value(record).map_err(|e| internal_error(e.to_string()))?,
        )),
        None => Err(not_found(format!(
            "document {} not found",
            params.document_id
        ))),
    }
}

// ============ POST /api/v1/find_concept ============

#[derive(Deserialize)]
struct FindConceptParams {
    concept: String,
    #[serde(default)]
    max_results: Option<usize>,
}

async fn handle_find_concept(
    State(state): State<AppState>,
    body: Result<Json<RpcRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let request = parse_body(body)?;
    if request.method != "find_by_concept" {
        return Err(not_found(format!("Unknown method: {}", request.method)));
    }

    let params: FindConceptParams = parse_params(request.params)?;
    if params.concept.trim().is_empty() {
        return Err(bad_request("concept must not be empty"));
    }
    let limit = params.max_results.unwrap_or(DEFAULT_MAX_RESULTS);

    let documents = find_by_concept(&state.pool, &params.concept, limit)
        .await
        .map_err(|e| internal_error(e.to_string()))?;

    Ok(rpc_result(
        &request.id,
        json!({
            "count": documents.len(),
            "documents": serde_json::to_value(&documents)
                .map_err(|e| internal_error(e.to_string()))?,
        }),
    ))
}

// ============ Fallback ============

async fn handle_unknown_path() -> AppError {
    not_found("Unknown path")
}
