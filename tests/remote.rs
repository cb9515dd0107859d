//! Remote-mode tests against local stand-ins for the model API, the
//! document store, and the warehouse.
//!
//! Each stand-in is a small axum app bound to an ephemeral port; the
//! clients and sinks are pointed at it through their `base_url`.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use consumer_sense::client::{AnalysisClient, GeminiClient};
use consumer_sense::config::{DocumentStoreConfig, ModelConfig, WarehouseConfig};
use consumer_sense::sink_docstore::DocumentStoreSink;
use consumer_sense::sink_warehouse::WarehouseSink;
use consumer_sense_core::normalize::normalize;
use consumer_sense_core::schema::validate_document;
use consumer_sense_core::sink::{Artifact, PersistMode, PersistStatus, Sink};
use consumer_sense_core::upstream::MalformedResponse;
use consumer_sense_core::{AnalysisResult, AnalyticsRow, SourceMetadata, SourceType, ValidatedDocument};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn sample_document() -> ValidatedDocument {
    let result: AnalysisResult = serde_json::from_value(json!({
        "input_text": "Payments fail with card ending 4242",
        "analysis": {"sentiment": "negative", "score": -0.7, "themes": ["payments"]},
        "model": "gemini-2.5-flash",
        "processing_latency_ms": 950
    }))
    .unwrap();
    validate_document(normalize(
        &result,
        SourceType::ManualText,
        &SourceMetadata::new("api"),
    ))
    .unwrap()
}

// ─── Model API stand-in ─────────────────────────────────────────────

#[derive(Clone)]
struct ModelState {
    replies: Arc<Vec<(StatusCode, Value)>>,
    calls: Arc<AtomicUsize>,
    last_request: Arc<Mutex<Option<(HeaderMap, Value)>>>,
}

async fn generate_content(
    State(state): State<ModelState>,
    Path(model): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    assert_eq!(model, "gemini-test:generateContent");
    let n = state.calls.fetch_add(1, Ordering::SeqCst);
    *state.last_request.lock().unwrap() = Some((headers, body));
    let (status, reply) = state.replies[n.min(state.replies.len() - 1)].clone();
    (status, Json(reply))
}

fn candidate(parts: &[&str]) -> Value {
    let parts: Vec<Value> = parts.iter().map(|t| json!({ "text": t })).collect();
    json!({ "candidates": [{ "content": { "role": "model", "parts": parts } }] })
}

async fn model_stand_in(replies: Vec<(StatusCode, Value)>) -> (ModelConfig, ModelState) {
    let state = ModelState {
        replies: Arc::new(replies),
        calls: Arc::default(),
        last_request: Arc::default(),
    };
    let app = Router::new()
        .route("/v1beta/models/{model}", post(generate_content))
        .with_state(state.clone());
    let base_url = serve(app).await;
    let config = ModelConfig {
        provider: "gemini".to_string(),
        model: "gemini-test".to_string(),
        base_url,
        max_retries: 1,
        timeout_secs: 10,
        ..Default::default()
    };
    (config, state)
}

#[tokio::test]
async fn test_model_single_review_reply() {
    let reply = json!({
        "kind": "single_review",
        "sentiment": "Negative",
        "score": -0.7,
        "themes": "payments",
        "intent": "complaint",
        "action_items": ["Fix card retries"],
        "confidence": 0.9
    })
    .to_string();
    let (head, tail) = reply.split_at(reply.len() / 2);
    let (config, state) = model_stand_in(vec![(StatusCode::OK, candidate(&[head, tail]))]).await;

    let client = GeminiClient::with_api_key(&config, "test-key").unwrap();
    let result = client.analyze_text("Payments keep failing").await.unwrap();

    assert_eq!(result.model.as_deref(), Some("gemini-test"));
    assert_eq!(result.input_text.as_deref(), Some("Payments keep failing"));
    assert!(result.processing_latency_ms.is_some());
    let analysis = result.analysis.unwrap();
    assert_eq!(analysis["score"], json!(-0.7));
    assert_eq!(analysis["themes"], json!(["payments"]));
    assert_eq!(analysis["intent"], "complaint");

    let (headers, body) = state.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(headers.get("x-goog-api-key").unwrap(), "test-key");
    assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
    assert!(prompt.contains("Payments keep failing"));
}

#[tokio::test]
async fn test_model_prose_reply_is_malformed() {
    let (config, _state) = model_stand_in(vec![(
        StatusCode::OK,
        candidate(&["Sure! Here is the analysis: {\"kind\": \"single_review\"}"]),
    )])
    .await;

    let client = GeminiClient::with_api_key(&config, "test-key").unwrap();
    let err = client.analyze_text("anything").await.unwrap_err();
    assert!(
        err.downcast_ref::<MalformedResponse>().is_some(),
        "unexpected error: {:#}",
        err
    );
}

#[tokio::test]
async fn test_model_blocked_reply_is_malformed() {
    let (config, state) = model_stand_in(vec![(
        StatusCode::OK,
        json!({"promptFeedback": {"blockReason": "SAFETY"}}),
    )])
    .await;

    let client = GeminiClient::with_api_key(&config, "test-key").unwrap();
    let err = client.analyze_text("anything").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MalformedResponse>(),
        Some(MalformedResponse::NoContent(_))
    ));
    assert_eq!(state.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_model_retries_server_errors() {
    let ok = json!({"kind": "single_review", "sentiment": "positive", "score": 0.4}).to_string();
    let (config, state) = model_stand_in(vec![
        (StatusCode::SERVICE_UNAVAILABLE, json!({"error": "busy"})),
        (StatusCode::OK, candidate(&[&ok])),
    ])
    .await;

    let client = GeminiClient::with_api_key(&config, "test-key").unwrap();
    let result = client.analyze_text("Nice update").await.unwrap();
    assert_eq!(result.analysis.unwrap()["score"], json!(0.4));
    assert_eq!(state.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_model_client_errors_are_not_retried() {
    let (config, state) =
        model_stand_in(vec![(StatusCode::BAD_REQUEST, json!({"error": "bad key"}))]).await;

    let client = GeminiClient::with_api_key(&config, "test-key").unwrap();
    let err = client.analyze_text("hello").await.unwrap_err();
    assert!(err.to_string().contains("400"));
    assert_eq!(state.calls.load(Ordering::SeqCst), 1);
}

// ─── Document store stand-in ────────────────────────────────────────

type Received = Arc<Mutex<Vec<(Vec<String>, Option<String>, Value)>>>;

async fn create_document(
    State(received): State<Received>,
    Path((project, database, collection)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let auth = bearer(&headers);
    received
        .lock()
        .unwrap()
        .push((vec![project.clone(), database.clone(), collection.clone()], auth.clone(), body));
    if auth.as_deref() != Some("Bearer fs-token") {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": {"status": "PERMISSION_DENIED"}})),
        );
    }
    let name = format!(
        "projects/{}/databases/{}/documents/{}/auto123",
        project, database, collection
    );
    (StatusCode::OK, Json(json!({ "name": name })))
}

async fn docstore_stand_in() -> (DocumentStoreConfig, Received) {
    let received: Received = Arc::default();
    let app = Router::new()
        .route(
            "/v1/projects/{project}/databases/{database}/documents/{collection}",
            post(create_document),
        )
        .with_state(received.clone());
    let config = DocumentStoreConfig {
        project: Some("acme".to_string()),
        base_url: serve(app).await,
        ..Default::default()
    };
    (config, received)
}

#[tokio::test]
async fn test_document_store_creates_document() {
    let (config, received) = docstore_stand_in().await;
    let tmp = TempDir::new().unwrap();
    let sink = DocumentStoreSink::with_token(&config, tmp.path(), Some("fs-token".into()));
    let doc = sample_document();

    let record = sink.persist(Artifact::Document(&doc), PersistMode::Remote).await;

    assert_eq!(record.status, PersistStatus::Ok, "detail: {}", record.detail);
    assert_eq!(
        record.detail,
        "projects/acme/databases/(default)/documents/consumer_reviews/auto123"
    );
    assert_eq!(
        sink.remote_target().as_deref(),
        Some("firestore:acme/(default)/consumer_reviews")
    );

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let (path, _, body) = &received[0];
    assert_eq!(path, &vec!["acme", "(default)", "consumer_reviews"]);
    let fields = &body["fields"];
    assert_eq!(fields["review_id"]["stringValue"], doc.review_id.as_str());
    assert!(fields["created_at"]["timestampValue"].is_string());
    assert_eq!(fields["source"]["stringValue"], "manual_text");
    assert_eq!(
        fields["analysis"]["mapValue"]["fields"]["score"]["doubleValue"],
        json!(-0.7)
    );
    assert_eq!(fields["processing_latency_ms"]["integerValue"], "950");

    // Nothing is written locally in remote mode.
    assert!(!tmp.path().join("document_store").exists());
}

#[tokio::test]
async fn test_document_store_reports_http_errors() {
    let (config, _received) = docstore_stand_in().await;
    let tmp = TempDir::new().unwrap();
    let sink = DocumentStoreSink::with_token(&config, tmp.path(), Some("wrong".into()));
    let doc = sample_document();

    let record = sink.persist(Artifact::Document(&doc), PersistMode::Remote).await;
    assert_eq!(record.status, PersistStatus::Error);
    assert!(record.detail.contains("403"), "detail: {}", record.detail);
}

#[tokio::test]
async fn test_document_store_unreachable_is_an_error_record() {
    let config = DocumentStoreConfig {
        project: Some("acme".to_string()),
        base_url: "http://127.0.0.1:9".to_string(),
        timeout_secs: 2,
        ..Default::default()
    };
    let tmp = TempDir::new().unwrap();
    let sink = DocumentStoreSink::with_token(&config, tmp.path(), Some("fs-token".into()));

    let record = sink
        .persist(Artifact::Document(&sample_document()), PersistMode::Remote)
        .await;
    assert_eq!(record.status, PersistStatus::Error);
    assert!(record.detail.starts_with("Firestore request failed"));
}

// ─── Warehouse stand-in ─────────────────────────────────────────────

async fn insert_all(
    State(received): State<Received>,
    Path((project, dataset, table)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    received
        .lock()
        .unwrap()
        .push((vec![project, dataset, table.clone()], bearer(&headers), body));
    if table == "strict" {
        return Json(json!({
            "kind": "bigquery#tableDataInsertAllResponse",
            "insertErrors": [{"index": 0, "errors": [{"reason": "invalid", "message": "no such field: extra"}]}]
        }));
    }
    Json(json!({ "kind": "bigquery#tableDataInsertAllResponse" }))
}

async fn warehouse_stand_in(table: &str) -> (WarehouseConfig, Received) {
    let received: Received = Arc::default();
    let app = Router::new()
        .route(
            "/bigquery/v2/projects/{project}/datasets/{dataset}/tables/{table}/insertAll",
            post(insert_all),
        )
        .with_state(received.clone());
    let config = WarehouseConfig {
        table: Some(format!("acme.feedback.{}", table)),
        base_url: serve(app).await,
        ..Default::default()
    };
    (config, received)
}

#[tokio::test]
async fn test_warehouse_inserts_row() {
    let (config, received) = warehouse_stand_in("reviews").await;
    let tmp = TempDir::new().unwrap();
    let sink = WarehouseSink::with_token(&config, tmp.path(), Some("bq-token".into()));
    let doc = sample_document();
    let row = AnalyticsRow::from_document(&doc).unwrap();

    let record = sink.persist(Artifact::Row(&row), PersistMode::Remote).await;
    assert_eq!(record.status, PersistStatus::Ok, "detail: {}", record.detail);
    assert_eq!(record.detail, "inserted 1 row into acme.feedback.reviews");

    let received = received.lock().unwrap();
    let (path, auth, body) = &received[0];
    assert_eq!(path, &vec!["acme", "feedback", "reviews"]);
    assert_eq!(auth.as_deref(), Some("Bearer bq-token"));
    let rows = body["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0]["insertId"].is_string());
    assert_eq!(rows[0]["json"]["review_id"], doc.review_id.as_str());
    assert_eq!(rows[0]["json"]["themes"], json!(["payments"]));
    assert_eq!(rows[0]["json"]["metadata"]["upload_method"], "api");
}

#[tokio::test]
async fn test_warehouse_insert_errors_become_error_record() {
    let (config, _received) = warehouse_stand_in("strict").await;
    let tmp = TempDir::new().unwrap();
    let sink = WarehouseSink::with_token(&config, tmp.path(), Some("bq-token".into()));
    let row = AnalyticsRow::from_document(&sample_document()).unwrap();

    let record = sink.persist(Artifact::Row(&row), PersistMode::Remote).await;
    assert_eq!(record.status, PersistStatus::Error);
    assert!(record.detail.starts_with("insert errors: "));
    assert!(record.detail.contains("no such field: extra"));
}

#[tokio::test]
async fn test_warehouse_without_token_never_calls_out() {
    let (config, received) = warehouse_stand_in("reviews").await;
    let tmp = TempDir::new().unwrap();
    let sink = WarehouseSink::with_token(&config, tmp.path(), None);
    let row = AnalyticsRow::from_document(&sample_document()).unwrap();

    let record = sink.persist(Artifact::Row(&row), PersistMode::Remote).await;
    assert_eq!(record.status, PersistStatus::Error);
    assert!(record.detail.contains("GOOGLE_OAUTH_ACCESS_TOKEN"));
    assert!(received.lock().unwrap().is_empty());
    assert!(sink.remote_target().is_none());
}
