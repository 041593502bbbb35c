use actix_web::cookie::Cookie;
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use async_trait::async_trait;
use rusqlite::Connection;
use serde_json::{json, Value};
use sqlite_admin::api::{configure_routes, AppState};
use sqlite_admin::config::ServerConfig;
use sqlite_admin::server::configure_extractors;
use sqlite_admin::summarize::{SummarizeError, Summarizer};
use sqlite_admin::Row;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const SESSION: &str = "6f1c2b1e-7c39-4c2a-9a8e-2b8f7d7b2f10";

struct EchoSummarizer;

#[async_trait]
impl Summarizer for EchoSummarizer {
    async fn summarize(&self, table: &str, rows: &[Row]) -> Result<String, SummarizeError> {
        Ok(format!("{} has {} sampled rows", table, rows.len()))
    }
}

struct OfflineSummarizer;

#[async_trait]
impl Summarizer for OfflineSummarizer {
    async fn summarize(&self, _table: &str, _rows: &[Row]) -> Result<String, SummarizeError> {
        Err(SummarizeError::Unavailable("offline".to_string()))
    }
}

fn seed_database(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT);
        INSERT INTO users (name, email) VALUES ('Ann', 'a@x.com'), ('Bo', 'b@x.com');
        CREATE TABLE notes (body TEXT);
        INSERT INTO notes (body) VALUES ('first'), ('second');
        "#,
    )
    .unwrap();
}

struct Fixture {
    dir: TempDir,
    config: ServerConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.storage.upload_dir = dir.path().join("uploads");
        config.storage.default_db_path = dir.path().join("default.db");
        seed_database(&config.storage.default_db_path);
        Self { dir, config }
    }

    fn state(&self, summarizer: Arc<dyn Summarizer>) -> AppState {
        AppState::new(&self.config, summarizer)
    }

    /// Register a session pointing at a fresh copy of the seed database.
    fn active_session(&self, state: &AppState) -> PathBuf {
        let path = self.dir.path().join("active.db");
        let _ = std::fs::remove_file(&path);
        seed_database(&path);
        state.sessions.register(SESSION, path.clone());
        path
    }

    fn cookie(&self) -> Cookie<'static> {
        Cookie::new(self.config.session.cookie_name.clone(), SESSION)
    }
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(configure_extractors)
                .configure(configure_routes),
        )
        .await
    };
}

fn multipart(field: &str, filename: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = "----sqliteadminboundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"{n}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n",
            b = boundary,
            f = field,
            n = filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    (format!("multipart/form-data; boundary={}", boundary), body)
}

#[actix_rt::test]
async fn test_requests_without_session_are_rejected() {
    let fixture = Fixture::new();
    let state = fixture.state(Arc::new(EchoSummarizer));
    let app = app!(state);

    let req = test::TestRequest::get().uri("/api/tables").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "NO_DATABASE");

    let req = test::TestRequest::get().uri("/api/check-db").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"hasDb": false}));
}

#[actix_rt::test]
async fn test_missing_file_is_not_found() {
    let fixture = Fixture::new();
    let state = fixture.state(Arc::new(EchoSummarizer));
    let path = fixture.active_session(&state);
    std::fs::remove_file(path).unwrap();
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/tables")
        .cookie(fixture.cookie())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_list_and_read_tables() {
    let fixture = Fixture::new();
    let state = fixture.state(Arc::new(EchoSummarizer));
    fixture.active_session(&state);
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/tables")
        .cookie(fixture.cookie())
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let names: Vec<&str> = body["tables"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["notes", "users"]);

    let req = test::TestRequest::get()
        .uri("/api/table/users?ids=2")
        .cookie(fixture.cookie())
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["primaryKeyColumn"], "id");
    assert_eq!(body["rows"], json!([{"id": 2, "name": "Bo", "email": "b@x.com"}]));
    assert_eq!(body["columns"][0]["isPrimaryKey"], true);
    assert!(body.get("diagnostic").is_none());

    let req = test::TestRequest::get()
        .uri("/api/table/notes?ids=1")
        .cookie(fixture.cookie())
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["rows"].as_array().unwrap().len(), 2);
    assert_eq!(body["primaryKeyColumn"], Value::Null);
    assert!(body["diagnostic"].is_string());
}

#[actix_rt::test]
async fn test_unsafe_table_name_is_rejected() {
    let fixture = Fixture::new();
    let state = fixture.state(Arc::new(EchoSummarizer));
    let path = fixture.active_session(&state);
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/table/users%3B%20DROP%20TABLE%20users")
        .cookie(fixture.cookie())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "INVALID_IDENTIFIER");

    let conn = Connection::open(path).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 2);
}

#[actix_rt::test]
async fn test_edit_round_trip() {
    let fixture = Fixture::new();
    let state = fixture.state(Arc::new(EchoSummarizer));
    fixture.active_session(&state);
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/edit")
        .cookie(fixture.cookie())
        .set_json(json!({
            "action": "create",
            "table": "users",
            "data": {"id": "", "name": "Cy", "email": "c@x.com"}
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["lastInsertId"], 3);

    let req = test::TestRequest::post()
        .uri("/api/edit")
        .cookie(fixture.cookie())
        .set_json(json!({
            "action": "update",
            "table": "users",
            "data": {"id": 3, "email": "cy@x.com"},
            "id": 3
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["rowsAffected"], 1);

    let req = test::TestRequest::get()
        .uri("/api/table/users?ids=3")
        .cookie(fixture.cookie())
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["rows"], json!([{"id": 3, "name": "Cy", "email": "cy@x.com"}]));

    for expected in [1, 0] {
        let req = test::TestRequest::post()
            .uri("/api/edit")
            .cookie(fixture.cookie())
            .set_json(json!({"action": "delete", "table": "users", "id": 3}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["rowsAffected"], expected);
    }
}

#[actix_rt::test]
async fn test_edit_errors_map_to_statuses() {
    let fixture = Fixture::new();
    let state = fixture.state(Arc::new(EchoSummarizer));
    fixture.active_session(&state);
    let app = app!(state);

    let cases = [
        (
            json!({"action": "update", "table": "notes", "data": {"body": "x"}, "id": 1}),
            StatusCode::BAD_REQUEST,
            "NO_PRIMARY_KEY",
        ),
        (
            json!({"action": "update", "table": "users", "data": {"id": 1}, "id": 1}),
            StatusCode::BAD_REQUEST,
            "NO_COLUMNS",
        ),
        (
            json!({"action": "drop", "table": "users"}),
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
        ),
        (
            json!({"action": "delete", "table": "ghosts", "id": 1}),
            StatusCode::INTERNAL_SERVER_ERROR,
            "STORAGE_ERROR",
        ),
        (
            json!({"action": "create", "table": "users", "data": {"email": "z@x.com"}}),
            StatusCode::INTERNAL_SERVER_ERROR,
            "STORAGE_ERROR",
        ),
    ];
    for (payload, status, code) in cases {
        let req = test::TestRequest::post()
            .uri("/api/edit")
            .cookie(fixture.cookie())
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), status, "{}", payload);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], code, "{}", payload);
    }

    let req = test::TestRequest::post()
        .uri("/api/edit")
        .cookie(fixture.cookie())
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_summarize() {
    let fixture = Fixture::new();
    let state = fixture.state(Arc::new(EchoSummarizer));
    fixture.active_session(&state);
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/summarize")
        .cookie(fixture.cookie())
        .set_json(json!({"table": "users"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["summary"], "users has 2 sampled rows");

    let offline = fixture.state(Arc::new(OfflineSummarizer));
    fixture.active_session(&offline);
    let app = app!(offline);
    let req = test::TestRequest::post()
        .uri("/api/summarize")
        .cookie(fixture.cookie())
        .set_json(json!({"table": "users"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "SUMMARIZATION_UNAVAILABLE");
}

#[actix_rt::test]
async fn test_upload_sets_session_cookie() {
    let fixture = Fixture::new();
    let state = fixture.state(Arc::new(EchoSummarizer));
    let app = app!(state);

    let bytes = std::fs::read(&fixture.config.storage.default_db_path).unwrap();
    let (content_type, body) = multipart("dbFile", "shop.DB", &bytes);
    let req = test::TestRequest::post()
        .uri("/api/upload")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == fixture.config.session.cookie_name)
        .expect("session cookie")
        .into_owned();
    assert!(cookie.http_only().unwrap_or(false));
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["tables"].as_array().unwrap().len(), 2);

    let req = test::TestRequest::get()
        .uri("/api/check-db")
        .cookie(cookie.clone())
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"hasDb": true}));

    let stored = fixture
        .config
        .storage
        .upload_dir
        .join(format!("{}.db", cookie.value()));
    assert!(stored.is_file());
}

#[actix_rt::test]
async fn test_upload_validation() {
    let fixture = Fixture::new();
    let state = fixture.state(Arc::new(EchoSummarizer));
    let app = app!(state);

    let (content_type, body) = multipart("dbFile", "shop.sqlite", b"whatever");
    let req = test::TestRequest::post()
        .uri("/api/upload")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "INVALID_EXTENSION");

    let (content_type, body) = multipart("other", "shop.db", b"whatever");
    let req = test::TestRequest::post()
        .uri("/api/upload")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "MISSING_FILE");

    let (content_type, body) = multipart("dbFile", "shop.db", &[7u8; 4096]);
    let req = test::TestRequest::post()
        .uri("/api/upload")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(state.sessions.is_empty());
}

#[actix_rt::test]
async fn test_rejected_reupload_keeps_current_database() {
    let fixture = Fixture::new();
    let state = fixture.state(Arc::new(EchoSummarizer));
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/load-default-db")
        .cookie(fixture.cookie())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let (content_type, body) = multipart("dbFile", "shop.db", &[7u8; 4096]);
    let req = test::TestRequest::post()
        .uri("/api/upload")
        .cookie(fixture.cookie())
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri("/api/tables")
        .cookie(fixture.cookie())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["tables"].as_array().unwrap().len(), 2);

    let upload_dir = &fixture.config.storage.upload_dir;
    assert!(upload_dir.join(format!("{}.db", SESSION)).is_file());
    assert!(!upload_dir.join(format!("{}.db.upload", SESSION)).exists());
}

#[actix_rt::test]
async fn test_load_default_and_download() {
    let fixture = Fixture::new();
    let state = fixture.state(Arc::new(EchoSummarizer));
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/load-default-db")
        .cookie(fixture.cookie())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["tables"].as_array().unwrap().len(), 2);

    let req = test::TestRequest::get()
        .uri("/api/download")
        .cookie(fixture.cookie())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/octet-stream"
    );
    let disposition = resp
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"database_"));
    assert!(disposition.ends_with(".db\""));

    let bytes = test::read_body(resp).await;
    let original = std::fs::read(&fixture.config.storage.default_db_path).unwrap();
    assert_eq!(bytes.as_ref(), original.as_slice());
}

#[actix_rt::test]
async fn test_forged_session_ids_are_ignored() {
    let fixture = Fixture::new();
    let state = fixture.state(Arc::new(EchoSummarizer));
    state
        .sessions
        .register("../escape", fixture.dir.path().join("active.db"));
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/load-default-db")
        .cookie(Cookie::new(
            fixture.config.session.cookie_name.clone(),
            "../escape",
        ))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == fixture.config.session.cookie_name)
        .expect("session cookie")
        .into_owned();
    assert_ne!(cookie.value(), "../escape");
    assert!(!fixture.dir.path().join("escape.db").exists());
}

#[actix_rt::test]
async fn test_healthcheck() {
    let fixture = Fixture::new();
    let state = fixture.state(Arc::new(EchoSummarizer));
    let app = app!(state);

    let req = test::TestRequest::get().uri("/api/healthcheck").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
}
