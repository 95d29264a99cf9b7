//! End-to-end coverage of the control-plane HTTP surface against the
//! scenarios enumerated in spec.md §8: happy-path register, duplicate
//! register, happy-path auth (slot allocation), gap reuse, and
//! exhaustion. Drives the real axum router with an in-memory store,
//! no network socket bound.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use rssh::api::routes::api_routes;
use rssh::api::state::AppState;
use rssh::api::types::{AgentSlot, GatekeeperMeta};
use rssh::config::ApiConfig;
use rssh::store::fake::FakeStore;
use rssh::store::keys;
use rssh::store::Store;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

fn router(store: Arc<FakeStore>) -> axum::Router {
    let state = Arc::new(AppState::new(store, ApiConfig::default()));
    api_routes(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn happy_path_register() {
    let store = Arc::new(FakeStore::new());
    let app = router(store.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/register/demo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let aid = body["agentID"]["aid"].as_str().unwrap();
    assert!(Uuid::parse_str(aid).is_ok());

    let record = store
        .get(&keys::domain_key("demo"), Duration::from_secs(1))
        .await
        .unwrap();
    let record: Value = serde_json::from_slice(&record).unwrap();
    assert_eq!(record["aid"].as_str().unwrap(), aid);
    assert!(record.get("private_key").is_none());
}

#[tokio::test]
async fn duplicate_register_is_rejected() {
    let store = Arc::new(FakeStore::new());
    let app = router(store.clone());

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/register/demo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/register/demo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::FORBIDDEN);
    let body = body_json(second).await;
    assert_eq!(body["error"]["msg"], "domain already registered.");
}

async fn publish_gatekeeper_meta(store: &FakeStore, low_port: u16, high_port: u16) {
    let meta = GatekeeperMeta {
        ssh_addr: "0.0.0.0".into(),
        ssh_port: 2223,
        low_port,
        high_port,
    };
    store
        .set(
            keys::GATEKEEPER_META_KEY,
            serde_json::to_vec(&meta).unwrap(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn happy_path_auth_allocates_low_port() {
    let store = Arc::new(FakeStore::new());
    publish_gatekeeper_meta(&store, 31240, 31241).await;
    let app = router(store.clone());

    let register = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/register/demo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let register_body = body_json(register).await;
    let identity = register_body["agentID"]["aid"].as_str().unwrap();

    let auth = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/auth/demo?identity={identity}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(auth.status(), StatusCode::OK);
    let body = body_json(auth).await;
    assert_eq!(body["connection"]["port"], 31240);
    assert_eq!(body["connection"]["gk"]["sshPort"], 2223);
    assert_eq!(body["connection"]["gk"]["lowPort"], 31240);
    assert_eq!(body["connection"]["gk"]["highPort"], 31241);
}

#[tokio::test]
async fn slot_gap_is_reused() {
    let store = Arc::new(FakeStore::new());
    publish_gatekeeper_meta(&store, 31240, 31242).await;
    store
        .set(
            &keys::slot_key(31240),
            serde_json::to_vec(&AgentSlot {
                domain: "other".into(),
                port: 31240,
                agent_id: Uuid::new_v4(),
                established: false,
            })
            .unwrap(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    store
        .set(
            &keys::slot_key(31242),
            serde_json::to_vec(&AgentSlot {
                domain: "other2".into(),
                port: 31242,
                agent_id: Uuid::new_v4(),
                established: false,
            })
            .unwrap(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    let app = router(store.clone());
    let register = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/register/demo2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let identity = body_json(register).await["agentID"]["aid"]
        .as_str()
        .unwrap()
        .to_string();

    let auth = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/auth/demo2?identity={identity}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(auth.status(), StatusCode::OK);
    let body = body_json(auth).await;
    assert_eq!(body["connection"]["port"], 31241);
}

#[tokio::test]
async fn exhausted_range_returns_503() {
    let store = Arc::new(FakeStore::new());
    publish_gatekeeper_meta(&store, 31240, 31240).await;
    store
        .set(
            &keys::slot_key(31240),
            serde_json::to_vec(&AgentSlot {
                domain: "other".into(),
                port: 31240,
                agent_id: Uuid::new_v4(),
                established: false,
            })
            .unwrap(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    let app = router(store.clone());
    let register = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/register/demo3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let identity = body_json(register).await["agentID"]["aid"]
        .as_str()
        .unwrap()
        .to_string();

    let auth = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/auth/demo3?identity={identity}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(auth.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn auth_with_wrong_identity_is_not_authorized() {
    let store = Arc::new(FakeStore::new());
    publish_gatekeeper_meta(&store, 31240, 31241).await;
    let app = router(store.clone());

    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/register/demo4")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let auth = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/auth/demo4?identity={}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(auth.status(), StatusCode::FORBIDDEN);
}
