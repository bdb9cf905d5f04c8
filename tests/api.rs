//! RPC surface round-trips: status codes, response envelopes, and parity
//! between the HTTP path and the direct engine call.

use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

use markdown_keeper::db;
use markdown_keeper::embedding::Embedder;
use markdown_keeper::parser::parse_markdown;
use markdown_keeper::schema::initialize_database;
use markdown_keeper::search::semantic_search_documents;
use markdown_keeper::server::build_router;
use markdown_keeper::store::upsert_document;

struct TestServer {
    _tmp: TempDir,
    pool: SqlitePool,
    embedder: Arc<Embedder>,
    base_url: String,
    doc_id: i64,
}

async fn start_server(docs: &[(&str, &str)]) -> TestServer {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect(&tmp.path().join("index.db")).await.unwrap();
    initialize_database(&pool).await.unwrap();
    let embedder = Arc::new(Embedder::fallback());

    let mut doc_id = 0;
    for (name, content) in docs {
        let path = tmp.path().join(name);
        std::fs::write(&path, content).unwrap();
        let parsed = parse_markdown(content, &path);
        let (id, _) = upsert_document(&pool, &embedder, &path, &parsed).await.unwrap();
        doc_id = id;
    }

    let app = build_router(pool.clone(), embedder.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        _tmp: tmp,
        pool,
        embedder,
        base_url: format!("http://{}", addr),
        doc_id,
    }
}

async fn rpc(server: &TestServer, path: &str, body: Value) -> (u16, Value) {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}{}", server.base_url, path))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    let payload: Value = response.json().await.unwrap();
    (status, payload)
}

#[tokio::test]
async fn test_health_returns_ok() {
    let server = start_server(&[]).await;
    let response = reqwest::get(format!("{}/health", server.base_url)).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_query_get_doc_and_find_concept() {
    let server = start_server(&[(
        "doc.md",
        "---\nconcepts: kubernetes\n---\n# API Doc\nhello from the api document",
    )])
    .await;

    let (status, payload) = rpc(
        &server,
        "/api/v1/query",
        json!({
            "jsonrpc": "2.0",
            "method": "semantic_query",
            "params": {"query": "api document", "max_results": 5,
                       "include_content": true, "max_tokens": 20},
            "id": 1,
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(payload["id"], 1);
    assert_eq!(payload["result"]["count"], 1);
    assert!(payload["result"]["documents"][0]["content"].is_string());

    let (status, payload) = rpc(
        &server,
        "/api/v1/get_doc",
        json!({
            "jsonrpc": "2.0",
            "method": "get_document",
            "params": {"document_id": server.doc_id, "include_content": true, "max_tokens": 20},
            "id": 2,
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(payload["id"], 2);
    assert_eq!(payload["result"]["title"], "API Doc");
    assert!(payload["result"]["content"].is_string());

    let (status, payload) = rpc(
        &server,
        "/api/v1/find_concept",
        json!({
            "jsonrpc": "2.0",
            "method": "find_by_concept",
            "params": {"concept": "kubernetes", "max_results": 5},
            "id": 3,
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(payload["id"], 3);
    assert_eq!(payload["result"]["count"], 1);
}

#[tokio::test]
async fn test_unknown_path_returns_404() {
    let server = start_server(&[]).await;
    let response = reqwest::get(format!("{}/unknown", server.base_url)).await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn test_malformed_json_returns_400() {
    let server = start_server(&[]).await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/v1/query", server.base_url))
        .header("content-type", "application/json")
        .body("not valid json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn test_unknown_method_returns_404() {
    let server = start_server(&[]).await;
    let (status, payload) = rpc(
        &server,
        "/api/v1/query",
        json!({
            "jsonrpc": "2.0",
            "method": "unknown_method",
            "params": {},
            "id": 1,
        }),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(payload["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_missing_document_returns_404() {
    let server = start_server(&[]).await;
    let (status, payload) = rpc(
        &server,
        "/api/v1/get_doc",
        json!({
            "jsonrpc": "2.0",
            "method": "get_document",
            "params": {"document_id": 99999},
            "id": 1,
        }),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(payload["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_empty_query_returns_400() {
    let server = start_server(&[]).await;
    let (status, payload) = rpc(
        &server,
        "/api/v1/query",
        json!({
            "jsonrpc": "2.0",
            "method": "semantic_query",
            "params": {"query": "   "},
            "id": 1,
        }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(payload["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_rpc_and_direct_query_return_identical_id_lists() {
    let server = start_server(&[
        ("k8s.md", "# Kubernetes Guide\nkubernetes cluster setup with kubeadm nodes"),
        ("backup.md", "# Backups\npostgres database backup dump compression"),
        ("dns.md", "# DNS Notes\ndomain name records resolution"),
        ("git.md", "# Git Notes\nbranching merging rebasing history"),
    ])
    .await;

    let query = "kubernetes cluster setup";

    let direct = semantic_search_documents(&server.pool, &server.embedder, query, 5)
        .await
        .unwrap();
    let direct_ids: Vec<i64> = direct.iter().map(|r| r.id).collect();

    let (status, payload) = rpc(
        &server,
        "/api/v1/query",
        json!({
            "jsonrpc": "2.0",
            "method": "semantic_query",
            "params": {"query": query, "max_results": 5},
            "id": 1,
        }),
    )
    .await;
    assert_eq!(status, 200);

    let api_ids: Vec<i64> = payload["result"]["documents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|doc| doc["id"].as_i64().unwrap())
        .collect();

    assert_eq!(direct_ids, api_ids);
}
