//! API handler tests over the assembled router
//!
//! Runtime and launcher are inert stubs: these tests cover the HTTP surface
//! (status codes, response shapes), not orchestration itself.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use deskrelay_api::{ApiServer, ApiServerConfig};
use deskrelay_control::SessionManager;
use deskrelay_ports::{BandRange, PortAllocator};
use deskrelay_proto::{LaunchOutput, LaunchPorts, SessionRecord, SessionReport, StopDisposition};
use deskrelay_registry::SessionRegistry;
use deskrelay_runtime::{ContainerRuntime, RuntimeError, RuntimeResult, SessionLauncher};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

struct StubRuntime {
    fail_queries: bool,
}

#[async_trait]
impl ContainerRuntime for StubRuntime {
    async fn list_sessions(&self) -> RuntimeResult<Vec<SessionReport>> {
        if self.fail_queries {
            return Err(RuntimeError::CommandFailed {
                command: "docker ps".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "daemon unreachable".to_string(),
            });
        }
        Ok(Vec::new())
    }

    async fn capture_output(&self, id: &str) -> RuntimeResult<String> {
        Err(RuntimeError::CommandFailed {
            command: format!("docker logs {}", id),
            status: "exit status: 1".to_string(),
            stderr: "no such container".to_string(),
        })
    }

    async fn stop(&self, _id: &str) -> RuntimeResult<StopDisposition> {
        Ok(StopDisposition::AlreadyAbsent)
    }
}

struct FailingLauncher;

#[async_trait]
impl SessionLauncher for FailingLauncher {
    async fn launch(&self, _ports: LaunchPorts) -> RuntimeResult<LaunchOutput> {
        Ok(LaunchOutput {
            stdout: String::new(),
            stderr: "launcher disabled in tests".to_string(),
            success: false,
        })
    }
}

fn test_stack(fail_queries: bool) -> (Router, SessionRegistry) {
    let registry = SessionRegistry::new();
    let allocator = Arc::new(PortAllocator::new(
        BandRange::new(9222, 9224),
        BandRange::new(5900, 5902),
        BandRange::new(99, 101),
    ));
    let manager = Arc::new(SessionManager::new(
        registry.clone(),
        allocator,
        Arc::new(StubRuntime { fail_queries }),
        Arc::new(FailingLauncher),
    ));
    let server = ApiServer::new(
        ApiServerConfig::default(),
        manager,
        "127.0.0.1".to_string(),
    );
    (server.build_router(), registry)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_active_session_count() {
    let (router, registry) = test_stack(false);
    registry.insert(SessionRecord::discovered("abc".to_string(), 5900));
    registry.insert(SessionRecord::starting("half".to_string(), 5901, 9222, 99));

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    // provisional sessions are not active yet
    assert_eq!(json["active_sessions"], 1);
}

#[tokio::test]
async fn list_sessions_returns_id_keyed_map() {
    let (router, registry) = test_stack(false);
    registry.insert(SessionRecord::discovered("abc".to_string(), 5900));

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/sessions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["sessions"]["abc"]["remote_port"], 5900);
    assert_eq!(json["sessions"]["abc"]["status"], "running");
}

#[tokio::test]
async fn stop_unknown_session_is_success_with_note() {
    let (router, _registry) = test_stack(false);

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/sessions/ghost/stop")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["stopped"], "ghost");
    assert!(json["note"].as_str().unwrap().contains("already"));
}

#[tokio::test]
async fn create_launch_failure_maps_to_500_with_diagnostics() {
    let (router, _registry) = test_stack(false);

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/sessions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["code"], "launcher_failed");
    assert!(json["stderr"].as_str().unwrap().contains("disabled"));
}

#[tokio::test]
async fn discover_failure_maps_to_bad_gateway() {
    let (router, registry) = test_stack(true);
    registry.insert(SessionRecord::discovered("abc".to_string(), 5900));

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/sessions/discover")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["code"], "runtime_query_failed");
    // fail-soft: the registry still holds the session
    assert!(registry.contains("abc"));
}

#[tokio::test]
async fn cleanup_reports_removed_ids() {
    let (router, registry) = test_stack(false);
    // the stub runtime reports nothing running, so this session is stale
    registry.insert(SessionRecord::discovered("stale".to_string(), 5900));

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/sessions/cleanup")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["removed"], serde_json::json!(["stale"]));
    assert!(!registry.contains("stale"));
}
