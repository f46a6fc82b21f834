//! HTTP adapter tests against an in-process mock backend.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde_json::{json, Value};

use field_survey::client::HttpApi;
use field_survey::config::Config;
use field_survey::error::TransportError;
use field_survey::models::{RecordPayload, RecordUpdate};
use field_survey::session::SessionContext;
use field_survey::traits::{RecordSink, SessionStore, TaskSource, UploadSink};

#[derive(Default)]
struct Seen {
    auth: Vec<String>,
    created: Vec<Value>,
    updated: Vec<(i64, Value)>,
    deleted: Vec<i64>,
    upload_content_type: Option<String>,
    upload_body: Vec<u8>,
}

type Shared = Arc<Mutex<Seen>>;

fn note_auth(seen: &Shared, headers: &HeaderMap) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    seen.lock().unwrap().auth.push(auth);
}

async fn tasks(
    State(seen): State<Shared>,
    headers: HeaderMap,
    Query(q): Query<std::collections::HashMap<String, String>>,
) -> Json<Value> {
    note_auth(&seen, &headers);
    assert_eq!(q.get("date").map(String::as_str), Some("2024-02-05"));
    Json(json!([{
        "id": 1,
        "title": "Produce sweep",
        "date": "2024-02-05",
        "status": "active",
        "item_count": 2,
        "created_at": "2024-02-04T18:00:00",
        "items": [
            {"id": 10, "task_id": 1, "category": "produce", "product_name": "Tomato", "sort_order": 0},
            {"id": 11, "task_id": 1, "category": "dairy", "product_name": "Milk", "sort_order": 1}
        ]
    }]))
}

async fn completion(Path((task_id, surveyor_id)): Path<(i64, i64)>) -> Json<Value> {
    Json(json!({
        "task_id": task_id,
        "surveyor_id": surveyor_id,
        "total_items": 2,
        "completed_items": 1,
        "total_records": 2,
        "items": [
            {"item_id": 10, "category": "produce", "product_name": "Tomato", "count": 2, "completed": true},
            {"item_id": 11, "category": "dairy", "product_name": "Milk", "count": 0, "completed": false}
        ]
    }))
}

async fn create(State(seen): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    seen.lock().unwrap().created.push(body);
    Json(json!({"success": true, "message": "saved", "record_id": 41}))
}

async fn update(
    State(seen): State<Shared>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Json<Value> {
    seen.lock().unwrap().updated.push((id, body));
    Json(json!({"success": true}))
}

async fn delete(State(seen): State<Shared>, Path(id): Path<i64>) -> (StatusCode, Json<Value>) {
    if id == 404 {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "record not found"})));
    }
    seen.lock().unwrap().deleted.push(id);
    (StatusCode::OK, Json(json!({"success": true})))
}

async fn list_records(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if auth != "Bearer good-token" {
        return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "expired"})));
    }
    (
        StatusCode::OK,
        Json(json!([{
            "id": 41, "item_id": 10, "surveyor_id": 7, "store_name": "Harbor Mart",
            "price": 5.99, "created_at": "2024-02-05T09:15:00.123456",
            "product_name": "Tomato", "category": "produce"
        }])),
    )
}

async fn upload(State(seen): State<Shared>, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let mut s = seen.lock().unwrap();
    s.upload_content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    s.upload_body = body.to_vec();
    Json(json!({
        "success": true,
        "url": "/static/photos/image_20240205_091500_ab12cd34.jpg",
        "filename": "image_20240205_091500_ab12cd34.jpg",
        "type": "image"
    }))
}

async fn spawn_backend() -> (SocketAddr, Shared) {
    let seen: Shared = Arc::new(Mutex::new(Seen::default()));
    let app = Router::new()
        .route("/api/tasks", get(tasks))
        .route("/api/tasks/{task_id}/completion/{surveyor_id}", get(completion))
        .route("/api/records", post(create).get(list_records))
        .route("/api/records/{id}", put(update).delete(delete))
        .route("/api/upload", post(upload))
        .with_state(seen.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, seen)
}

fn api(addr: SocketAddr, session: Arc<SessionContext>) -> HttpApi {
    let mut cfg = Config::minimal();
    cfg.api.base_url = format!("http://{}/", addr);
    HttpApi::new(&cfg.api, session).unwrap()
}

fn session(token: &str) -> Arc<SessionContext> {
    Arc::new(SessionContext::new(Some(token.to_string()), Some(7)))
}

#[tokio::test]
async fn fetches_tasks_and_completion_with_bearer_token() {
    let (addr, seen) = spawn_backend().await;
    let api = api(addr, session("good-token"));

    let date = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
    let tasks = api.fetch_tasks_for_date(date).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].items.len(), 2);
    assert_eq!(seen.lock().unwrap().auth, vec!["Bearer good-token".to_string()]);

    let snap = api.fetch_completion(1, 7).await.unwrap();
    assert_eq!(snap.task_id, 1);
    assert_eq!(snap.per_item_counts.get(&10), Some(&2));
    assert_eq!(snap.completed_item_count, 1);
}

#[tokio::test]
async fn creates_updates_and_deletes_records() {
    let (addr, seen) = spawn_backend().await;
    let api = api(addr, session("good-token"));

    let payload = RecordPayload {
        item_id: 10,
        surveyor_id: 7,
        store_name: "Harbor Mart".to_string(),
        store_address: None,
        price: 5.99,
        promotion_info: Some("2 for 1".to_string()),
        remark: None,
        latitude: Some(31.2304),
        longitude: Some(121.4737),
        photos: vec!["/static/photos/a.jpg".to_string()],
    };
    assert_eq!(api.create_record(&payload).await.unwrap(), 41);

    let update = RecordUpdate {
        price: Some(6.5),
        ..Default::default()
    };
    api.update_record(41, &update).await.unwrap();
    api.delete_record(41).await.unwrap();

    let err = api.delete_record(404).await.unwrap_err();
    assert_eq!(
        err,
        TransportError::Status {
            status: 404,
            message: "record not found".to_string()
        }
    );

    let s = seen.lock().unwrap();
    assert_eq!(s.created[0]["item_id"], 10);
    assert_eq!(s.created[0]["store_address"], Value::Null);
    assert_eq!(s.created[0]["photos"], json!(["/static/photos/a.jpg"]));
    assert_eq!(s.updated, vec![(41, json!({"price": 6.5}))]);
    assert_eq!(s.deleted, vec![41]);
}

#[tokio::test]
async fn uploads_multipart_file_part() {
    let (addr, seen) = spawn_backend().await;
    let api = api(addr, session("good-token"));

    let url = api
        .upload_file(b"JPEGBYTES".to_vec(), "shelf_wm.jpg")
        .await
        .unwrap();
    assert_eq!(url, "/static/photos/image_20240205_091500_ab12cd34.jpg");

    let s = seen.lock().unwrap();
    let content_type = s.upload_content_type.clone().unwrap();
    assert!(content_type.starts_with("multipart/form-data; boundary="));
    let body = String::from_utf8_lossy(&s.upload_body);
    assert!(body.contains(r#"name="file"; filename="shelf_wm.jpg""#));
    assert!(body.contains("Content-Type: image/jpeg") || body.contains("content-type: image/jpeg"));
    assert!(body.contains("JPEGBYTES"));
    assert!(body.contains(r#"name="type""#));
}

#[tokio::test]
async fn unauthorized_clears_session() {
    let (addr, _seen) = spawn_backend().await;
    let session = session("stale-token");
    let api = api(addr, session.clone());

    let err = api.list_records(7, None).await.unwrap_err();
    assert_eq!(err, TransportError::Unauthorized);
    assert_eq!(session.token(), None);
    assert_eq!(session.surveyor_id(), Some(7));
}

#[tokio::test]
async fn lists_records_with_fractional_timestamps() {
    let (addr, _seen) = spawn_backend().await;
    let api = api(addr, session("good-token"));

    let records = api.list_records(7, None).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, 41);
    assert_eq!(
        records[0].created_at.date(),
        NaiveDate::from_ymd_opt(2024, 2, 5).unwrap()
    );
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = api(addr, session("good-token"));
    let err = api.fetch_completion(1, 7).await.unwrap_err();
    assert!(matches!(err, TransportError::Network(_)));
}
