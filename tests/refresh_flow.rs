use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use casedesk::{
    ApiClient, ApiError, FileSessionStore, MemorySessionStore, ReqwestTransport, SessionStore,
};

/// In-process stand-in for the records API
#[derive(Default)]
struct MockApi {
    access_token: Mutex<String>,
    refresh_token: Mutex<String>,
    issued: AtomicUsize,
    refresh_calls: AtomicUsize,
    case_calls: AtomicUsize,
}

type Reply = (StatusCode, Json<Value>);

impl MockApi {
    fn with_tokens(access: &str, refresh: &str) -> Arc<Self> {
        let api = Self::default();
        *api.access_token.lock().unwrap() = access.to_string();
        *api.refresh_token.lock().unwrap() = refresh.to_string();
        Arc::new(api)
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.access_token.lock().unwrap());
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == expected)
            .unwrap_or(false)
    }

    fn issue_pair(&self) -> Value {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 2;
        let access = format!("A{}", n);
        let refresh = format!("R{}", n);
        *self.access_token.lock().unwrap() = access.clone();
        *self.refresh_token.lock().unwrap() = refresh.clone();
        json!({ "access_token": access, "refresh_token": refresh })
    }
}

fn unauthorized() -> Reply {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "token expired"})),
    )
}

async fn login(State(api): State<Arc<MockApi>>, Json(body): Json<Value>) -> Reply {
    if body["identifier"] == "ama.mensah" && body["password"] == "correct-horse" {
        (StatusCode::OK, Json(api.issue_pair()))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Invalid credentials"})),
        )
    }
}

async fn refresh(State(api): State<Arc<MockApi>>, Json(body): Json<Value>) -> Reply {
    api.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let valid = body["refresh_token"] == *api.refresh_token.lock().unwrap();
    if valid {
        (StatusCode::OK, Json(api.issue_pair()))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "refresh token revoked"})),
        )
    }
}

async fn list_cases(State(api): State<Arc<MockApi>>, headers: HeaderMap) -> Reply {
    api.case_calls.fetch_add(1, Ordering::SeqCst);
    if !api.authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({"data": [{"id": 1, "title": "Burglary", "officer_id": 2}]})),
    )
}

async fn create_case(
    State(api): State<Arc<MockApi>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    if !api.authorized(&headers) {
        return unauthorized();
    }
    let content_types = headers.get_all("content-type").iter().count();
    (
        StatusCode::CREATED,
        Json(json!({"id": 2, "received": body, "content_type_headers": content_types})),
    )
}

async fn get_case(
    State(api): State<Arc<MockApi>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Reply {
    if !api.authorized(&headers) {
        return unauthorized();
    }
    if id == "1" {
        (StatusCode::OK, Json(json!({"id": 1, "title": "Burglary"})))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"message": "not found"})))
    }
}

async fn spawn_api(api: Arc<MockApi>) -> Result<String> {
    let app = Router::new()
        .route("/login", post(login))
        .route("/refresh-token", post(refresh))
        .route("/cases", get(list_cases).post(create_case))
        .route("/cases/:id", get(get_case))
        .with_state(api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok(format!("http://{}", addr))
}

fn client(base_url: &str, store: Arc<dyn SessionStore>) -> ApiClient {
    ApiClient::new(base_url, Arc::new(ReqwestTransport::default()), store)
}

#[tokio::test]
async fn login_then_list_cases() -> Result<()> {
    let api = MockApi::with_tokens("unused", "unused");
    let base_url = spawn_api(api.clone()).await?;
    let store = Arc::new(MemorySessionStore::default());
    let client = client(&base_url, store.clone());

    client.login("ama.mensah", "correct-horse").await?;
    let body = client.get("cases").await?;

    assert_eq!(body["data"][0]["title"], "Burglary");
    assert_eq!(store.load()?.access_token.as_deref(), Some("A2"));
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_request_error() -> Result<()> {
    let api = MockApi::with_tokens("A1", "R1");
    let base_url = spawn_api(api).await?;
    let store = Arc::new(MemorySessionStore::default());

    let err = client(&base_url, store.clone())
        .login("ama.mensah", "guess")
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(err.user_message(), "Invalid credentials");
    assert!(store.load()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn expired_access_token_is_refreshed_and_replayed() -> Result<()> {
    let api = MockApi::with_tokens("A1", "R1");
    let base_url = spawn_api(api.clone()).await?;
    let store = Arc::new(MemorySessionStore::with_tokens("stale", "R1"));

    let body = client(&base_url, store.clone()).get("/cases").await?;

    assert_eq!(body["data"][0]["id"], 1);
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.case_calls.load(Ordering::SeqCst), 2);
    let session = store.load()?;
    assert_eq!(session.access_token.as_deref(), Some("A2"));
    assert_eq!(session.refresh_token.as_deref(), Some("R2"));
    Ok(())
}

#[tokio::test]
async fn revoked_refresh_token_expires_session() -> Result<()> {
    let api = MockApi::with_tokens("A1", "R-current");
    let base_url = spawn_api(api.clone()).await?;
    let store = Arc::new(MemorySessionStore::with_tokens("stale", "R-revoked"));

    let err = client(&base_url, store.clone()).get("/cases").await.unwrap_err();

    assert!(matches!(err, ApiError::SessionExpired));
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.case_calls.load(Ordering::SeqCst), 1);
    assert!(store.load()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn concurrent_expired_requests_refresh_once() -> Result<()> {
    let api = MockApi::with_tokens("A1", "R1");
    let base_url = spawn_api(api.clone()).await?;
    let store = Arc::new(MemorySessionStore::with_tokens("stale", "R1"));
    let client = client(&base_url, store);

    let (a, b, c) = tokio::join!(
        client.get("/cases"),
        client.get("/cases"),
        client.get("/cases/1")
    );

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn missing_record_reports_server_message() -> Result<()> {
    let api = MockApi::with_tokens("A1", "R1");
    let base_url = spawn_api(api.clone()).await?;
    let store = Arc::new(MemorySessionStore::with_tokens("A1", "R1"));

    let err = client(&base_url, store).get("/cases/404").await.unwrap_err();

    match err {
        ApiError::Request { status, info } => {
            assert_eq!(status, 404);
            assert_eq!(info, json!({"message": "not found"}));
        }
        other => panic!("expected request error, got {:?}", other),
    }
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn post_sends_single_json_content_type() -> Result<()> {
    let api = MockApi::with_tokens("A1", "R1");
    let base_url = spawn_api(api).await?;
    let store = Arc::new(MemorySessionStore::with_tokens("A1", "R1"));

    let created = client(&base_url, store)
        .post("/cases", &json!({"title": "Fraud", "police_post_id": 4}))
        .await?;

    assert_eq!(created["received"], json!({"title": "Fraud", "police_post_id": 4}));
    assert_eq!(created["content_type_headers"], 1);
    Ok(())
}

#[tokio::test]
async fn file_store_survives_across_clients() -> Result<()> {
    let api = MockApi::with_tokens("unused", "unused");
    let base_url = spawn_api(api).await?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.toml");

    client(&base_url, Arc::new(FileSessionStore::new(&path)))
        .login("ama.mensah", "correct-horse")
        .await?;

    // A fresh client, as after a restart, picks the session up from disk
    let body = client(&base_url, Arc::new(FileSessionStore::new(&path)))
        .get("/cases")
        .await?;
    assert_eq!(body["data"][0]["officer_id"], 2);

    let restarted = client(&base_url, Arc::new(FileSessionStore::new(&path)));
    restarted.logout()?;
    assert!(!path.exists());
    Ok(())
}
