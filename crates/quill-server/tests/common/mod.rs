//! Test utilities and common setup.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use quill::AppConfig;
use quill::api::{AppState, create_router};
use quill::assistant::{BackendRegistry, EchoBackend, ScriptedBackend};
use quill::store::{AllowList, EntityStore, SqliteEntityStore};
use quill_protocol::StreamResponse;
use serde_json::Value;

/// Config with a one-second idle timeout so stalled streams fail fast.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.stream.idle_timeout_secs = 1;
    config.stream.max_duration_secs = 5;
    config
}

pub fn test_registry() -> BackendRegistry {
    BackendRegistry::new("echo").with(EchoBackend::default())
}

pub fn app_with(config: AppConfig, registry: BackendRegistry) -> Router {
    create_router(AppState::new(config, registry, None))
}

/// Echo backend only, no entity store.
pub fn test_app() -> Router {
    app_with(test_config(), test_registry())
}

/// Echo backend plus one scripted backend named `scripted`.
pub fn scripted_app(backend: ScriptedBackend) -> Router {
    app_with(test_config(), test_registry().with(backend))
}

/// App backed by an in-memory store with a `tasks` table holding row 1.
pub async fn store_app(dev_mode: bool) -> (Router, SqliteEntityStore) {
    let allow = AllowList::new(BTreeMap::from([(
        "tasks".to_string(),
        BTreeSet::from(["title".to_string(), "done".to_string()]),
    )]));
    let store = SqliteEntityStore::in_memory(allow).await.unwrap();
    sqlx::query("CREATE TABLE tasks (id INTEGER PRIMARY KEY, title TEXT, done INTEGER, owner TEXT)")
        .execute(store.pool())
        .await
        .unwrap();
    sqlx::query("INSERT INTO tasks (id, title, done, owner) VALUES (1, 'draft', 0, 'ana')")
        .execute(store.pool())
        .await
        .unwrap();

    let mut config = test_config();
    config.dev_mode = dev_mode;
    let shared: Arc<dyn EntityStore> = Arc::new(store.clone());
    let app = create_router(AppState::new(config, test_registry(), Some(shared)));
    (app, store)
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Parse an SSE body into the events carried by its `data:` lines.
pub fn sse_events(body: &[u8]) -> Vec<StreamResponse> {
    let text = std::str::from_utf8(body).unwrap();
    text.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim_start()).unwrap())
        .collect()
}
