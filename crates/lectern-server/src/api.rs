use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    routing::{get, post},
    Json, Router,
};
use lectern_store::{AccountType, Database, UserAccount, UserAccountUpdate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::image_cache::ImageCache;

#[derive(Clone)]
pub struct AppState {
    pub image_cache: Arc<ImageCache>,
    pub database: Arc<Mutex<Database>>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/cache/purge", post(purge_cache))
        .route("/api/cache/items/purge", post(purge_items_cache))
        .route("/api/users", get(list_users))
        .route("/api/users/:id", get(get_user).patch(update_user))
        .route("/api/scans", get(list_scan_logs))
        .route("/api/scans/:name", get(get_scan_log))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize, Default)]
struct UserQuery {
    minimal: Option<String>,
}

impl UserQuery {
    fn is_minimal(&self) -> bool {
        matches!(self.minimal.as_deref(), Some("1") | Some("true"))
    }
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Resolve the bearer token to an active, unlocked account.
fn authenticate(headers: &HeaderMap, db: &Database) -> Result<UserAccount, ServerError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth).trim();

    match db.get_user_by_token(token)? {
        Some(user) if user.is_active && !user.is_locked => Ok(user),
        _ => Err(ServerError::Unauthorized),
    }
}

fn require_admin(user: &UserAccount) -> Result<(), ServerError> {
    if user.is_admin_or_up() {
        Ok(())
    } else {
        Err(ServerError::Forbidden("Admin access required".into()))
    }
}

// ─── Cache ───

async fn purge_cache(headers: HeaderMap, State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    {
        let db = state.database.lock().await;
        require_admin(&authenticate(&headers, &db)?)?;
    }
    state.image_cache.purge_all().await?;
    Ok(Json(serde_json::json!({ "purged": true })))
}

async fn purge_items_cache(headers: HeaderMap, State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    {
        let db = state.database.lock().await;
        require_admin(&authenticate(&headers, &db)?)?;
    }
    state.image_cache.purge_items().await?;
    Ok(Json(serde_json::json!({ "purged": true })))
}

// ─── Users ───

async fn list_users(headers: HeaderMap, State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    let db = state.database.lock().await;
    authenticate(&headers, &db)?;

    let users = db.list_users()?;
    let public: Vec<_> = users.iter().map(|u| u.to_public_json(&[])).collect();
    Ok(Json(serde_json::json!({ "users": public })))
}

async fn get_user(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, ServerError> {
    let db = state.database.lock().await;
    let requester = authenticate(&headers, &db)?;
    if requester.id() != id {
        require_admin(&requester)?;
    }

    let user = db.get_user(&id)?;
    let body = serde_json::to_value(user.to_browser_json(!requester.is_root(), query.is_minimal()))
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(Json(body))
}

async fn update_user(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UserAccountUpdate>,
) -> Result<Json<Value>, ServerError> {
    let db = state.database.lock().await;
    let requester = authenticate(&headers, &db)?;
    require_admin(&requester)?;

    let mut user = db.get_user(&id)?;
    if user.is_root() && !requester.is_root() {
        return Err(ServerError::Forbidden("Only root can modify the root account".into()));
    }
    match payload.account_type {
        Some(AccountType::Root) if !user.is_root() => {
            return Err(ServerError::BadRequest("Cannot promote an account to root".into()));
        }
        Some(t) if user.is_root() && t != AccountType::Root => {
            return Err(ServerError::BadRequest("Root account type cannot change".into()));
        }
        _ => {}
    }
    if let Some(username) = payload.username.as_deref().filter(|u| !u.is_empty()) {
        if let Some(existing) = db.get_user_by_username(username)? {
            if existing.id() != user.id() {
                return Err(ServerError::BadRequest(format!("Username {username} is already taken")));
            }
        }
    }

    let updated = user.apply_update(&payload);
    if updated {
        db.upsert_user(&user)?;
        info!(user = %user.id(), by = %requester.id(), "User account updated");
    }

    let body = serde_json::to_value(user.to_browser_json(!requester.is_root(), false))
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(Json(serde_json::json!({ "updated": updated, "user": body })))
}

// ─── Scan logs ───

/// Scan log files are `<date>_<runId>.txt`; anything else is refused.
fn validate_scan_log_name(name: &str) -> Result<(), ServerError> {
    if !name.ends_with(".txt")
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
    {
        return Err(ServerError::BadRequest(format!("Invalid scan log name: {name}")));
    }
    Ok(())
}

async fn list_scan_logs(headers: HeaderMap, State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    {
        let db = state.database.lock().await;
        require_admin(&authenticate(&headers, &db)?)?;
    }

    let mut names = Vec::new();
    match tokio::fs::read_dir(state.config.scan_log_path()).await {
        Ok(mut entries) => {
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if validate_scan_log_name(&name).is_ok() {
                    names.push(name);
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    // Newest first; names lead with the date.
    names.sort_unstable_by(|a, b| b.cmp(a));

    Ok(Json(serde_json::json!({ "logs": names })))
}

async fn get_scan_log(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ServerError> {
    {
        let db = state.database.lock().await;
        require_admin(&authenticate(&headers, &db)?)?;
    }
    validate_scan_log_name(&name)?;

    let path = state.config.scan_log_path().join(&name);
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ServerError::NotFound(format!("Scan log {name}")));
        }
        Err(e) => return Err(e.into()),
    };

    let mut lines = contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(serde_json::from_str::<Value>);
    let run = lines
        .next()
        .transpose()
        .map_err(|e| ServerError::Internal(format!("Corrupt scan log {name}: {e}")))?
        .unwrap_or(Value::Null);
    let logs = lines
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Internal(format!("Corrupt scan log {name}: {e}")))?;

    Ok(Json(serde_json::json!({ "run": run, "logs": logs })))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resize::ImageResizer;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use lectern_store::{Library, LogLevel, ScanKind, ScanRun};
    use std::path::{Path as FsPath, PathBuf};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct NoopResizer;

    #[async_trait]
    impl ImageResizer for NoopResizer {
        async fn resize(&self, _: &FsPath, _: &FsPath, _: u32, _: Option<u32>) -> Option<PathBuf> {
            None
        }
    }

    async fn test_state() -> (AppState, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig {
            metadata_path: dir.path().to_path_buf(),
            ..Default::default()
        };

        let db = Database::open_in_memory().unwrap();
        let mut root = UserAccount::new_root("root", Some("hash".into()));
        root.token = Some("root-token".into());
        db.upsert_user(&root).unwrap();
        let mut admin = UserAccount::new("a1", "admin", AccountType::Admin);
        admin.token = Some("admin-token".into());
        db.upsert_user(&admin).unwrap();
        let mut user = UserAccount::new("u1", "alice", AccountType::User);
        user.token = Some("user-token".into());
        db.upsert_user(&user).unwrap();

        let image_cache = ImageCache::new(config.cache_path(), None, Arc::new(NoopResizer))
            .await
            .unwrap();

        let state = AppState {
            image_cache: Arc::new(image_cache),
            database: Arc::new(Mutex::new(db)),
            config: Arc::new(config),
        };
        (state, dir)
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
        let response = build_router(state.clone()).oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _dir) = test_state().await;
        let (status, body) = send(&state, request("GET", "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_requires_token() {
        let (state, _dir) = test_state().await;
        let (status, body) = send(&state, request("GET", "/api/users", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());

        let (status, _) = send(&state, request("GET", "/api/users", Some("bogus"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_users_public_form() {
        let (state, _dir) = test_state().await;
        let (status, body) = send(&state, request("GET", "/api/users", Some("user-token"), None)).await;
        assert_eq!(status, StatusCode::OK);

        let users = body["users"].as_array().unwrap();
        assert_eq!(users.len(), 3);
        assert!(users.iter().all(|u| u.get("token").is_none() && u.get("passwordHash").is_none()));
    }

    #[tokio::test]
    async fn test_get_user_hides_root_token() {
        let (state, _dir) = test_state().await;

        let (status, body) = send(&state, request("GET", "/api/users/root", Some("admin-token"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token"], "");
        assert!(body.get("passwordHash").is_none());

        let (_, body) = send(&state, request("GET", "/api/users/root", Some("root-token"), None)).await;
        assert_eq!(body["token"], "root-token");

        let (_, body) = send(&state, request("GET", "/api/users/u1?minimal=1", Some("user-token"), None)).await;
        assert_eq!(body["id"], "u1");
        assert!(body.get("mediaProgress").is_none());
    }

    #[tokio::test]
    async fn test_get_other_user_requires_admin() {
        let (state, _dir) = test_state().await;
        let (status, _) = send(&state, request("GET", "/api/users/a1", Some("user-token"), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&state, request("GET", "/api/users/nope", Some("admin-token"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_user_reconciles_and_persists() {
        let (state, _dir) = test_state().await;
        let payload = serde_json::json!({
            "permissions": { "accessAllLibraries": false },
            "librariesAccessible": ["lib1"]
        });

        let (status, body) = send(&state, request("PATCH", "/api/users/u1", Some("admin-token"), Some(payload.clone()))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], true);
        assert_eq!(body["user"]["librariesAccessible"], serde_json::json!(["lib1"]));

        let (_, body) = send(&state, request("PATCH", "/api/users/u1", Some("admin-token"), Some(payload))).await;
        assert_eq!(body["updated"], false);

        let stored = state.database.lock().await.get_user("u1").unwrap();
        assert!(stored.can_access_library("lib1"));
        assert!(!stored.can_access_library("lib2"));

        let payload = serde_json::json!({ "permissions": { "accessAllLibraries": true } });
        let (_, body) = send(&state, request("PATCH", "/api/users/u1", Some("admin-token"), Some(payload))).await;
        assert_eq!(body["updated"], true);
        assert_eq!(body["user"]["librariesAccessible"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_update_user_guards() {
        let (state, _dir) = test_state().await;

        let (status, _) = send(
            &state,
            request("PATCH", "/api/users/u1", Some("user-token"), Some(serde_json::json!({ "isActive": false }))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &state,
            request("PATCH", "/api/users/root", Some("admin-token"), Some(serde_json::json!({ "username": "x" }))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &state,
            request("PATCH", "/api/users/u1", Some("admin-token"), Some(serde_json::json!({ "type": "root" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &state,
            request("PATCH", "/api/users/u1", Some("admin-token"), Some(serde_json::json!({ "username": "ADMIN" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_deactivated_user_is_rejected() {
        let (state, _dir) = test_state().await;
        let (status, _) = send(
            &state,
            request("PATCH", "/api/users/u1", Some("admin-token"), Some(serde_json::json!({ "isActive": false }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&state, request("GET", "/api/users/u1", Some("user-token"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_purge_routes() {
        let (state, _dir) = test_state().await;
        let covers = state.image_cache.cache_path().join("covers");
        tokio::fs::write(covers.join("li1_400.webp"), b"x").await.unwrap();

        let (status, _) = send(&state, request("POST", "/api/cache/purge", Some("user-token"), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(covers.join("li1_400.webp").exists());

        let (status, body) = send(&state, request("POST", "/api/cache/purge", Some("admin-token"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["purged"], true);
        assert!(covers.exists());
        assert!(!covers.join("li1_400.webp").exists());

        let (status, _) = send(&state, request("POST", "/api/cache/items/purge", Some("admin-token"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.image_cache.items_path().exists());
    }

    #[tokio::test]
    async fn test_scan_logs() {
        let (state, _dir) = test_state().await;

        let (_, body) = send(&state, request("GET", "/api/scans", Some("admin-token"), None)).await;
        assert_eq!(body["logs"], serde_json::json!([]));

        let library = Library {
            id: "lib1".into(),
            name: "Audiobooks".into(),
            media_type: Default::default(),
            folders: Vec::new(),
            display_order: 1,
        };
        let mut run = ScanRun::begin(&library, ScanKind::Scan);
        run.append_log(LogLevel::Info, ["Scanning", "folder"]);
        run.results_added = 2;
        run.finish();
        let path = run.persist(&state.config.scan_log_path()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();

        let (_, body) = send(&state, request("GET", "/api/scans", Some("admin-token"), None)).await;
        assert_eq!(body["logs"], serde_json::json!([name.clone()]));

        let (status, body) = send(&state, request("GET", &format!("/api/scans/{name}"), Some("admin-token"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["run"]["id"], run.id());
        assert_eq!(body["run"]["resultsAdded"], 2);
        assert_eq!(body["logs"][0]["message"], "Scanning folder");

        let (status, _) = send(&state, request("GET", "/api/scans/missing.txt", Some("admin-token"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&state, request("GET", "/api/scans/notes.md", Some("admin-token"), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
