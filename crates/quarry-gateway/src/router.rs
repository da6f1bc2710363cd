use axum::Router;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    chat_handler, health_handler, rag_chat_handler, rebuild_handler, root_handler,
};
use super::server::AppState;

pub(crate) fn build_router(state: AppState, max_body_size: usize) -> Router {
    let api = Router::new()
        .route("/chat", post(chat_handler))
        .route("/rag/chat", post(rag_chat_handler))
        .route("/knowledge/rebuild", post(rebuild_handler))
        .layer(RequestBodyLimitLayer::new(max_body_size));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use quarry_core::ChatOrchestrator;
    use quarry_core::orchestrator::ChatSettings;
    use quarry_index::{NOT_INITIALIZED, RetrievalService, RetrievalSettings};
    use quarry_llm::mock::{MockEmbedder, MockProvider};
    use quarry_llm::{AnyEmbedder, AnyProvider};
    use tower::ServiceExt;

    use super::*;

    fn test_state(provider: MockProvider, root: &std::path::Path) -> AppState {
        let settings = RetrievalSettings {
            root: root.to_path_buf(),
            ..RetrievalSettings::default()
        };
        let retrieval =
            RetrievalService::new(AnyEmbedder::Mock(MockEmbedder::new(32)), settings).unwrap();
        AppState {
            orchestrator: Arc::new(ChatOrchestrator::new(
                AnyProvider::Mock(provider),
                Arc::new(retrieval),
                ChatSettings::default(),
            )),
            started_at: Instant::now(),
        }
    }

    fn make_router(provider: MockProvider, root: &std::path::Path) -> Router {
        build_router(test_state(provider, root), 1_048_576)
    }

    fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn root_returns_banner() {
        let dir = tempfile::tempdir().unwrap();
        let app = make_router(MockProvider::default(), dir.path());
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
        let json = json_body(resp).await;
        assert!(json["message"].as_str().unwrap().contains("quarry"));
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn health_reports_knowledge_state() {
        let dir = tempfile::tempdir().unwrap();
        let app = make_router(MockProvider::default(), dir.path());
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
        let json = json_body(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["knowledge_base"]["state"], "uninitialized");
        assert_eq!(json["knowledge_base"]["chunks"], 0);
    }

    #[tokio::test]
    async fn chat_returns_model_reply() {
        let dir = tempfile::tempdir().unwrap();
        let app = make_router(MockProvider::with_responses(vec!["pong".into()]), dir.path());
        let resp = app
            .oneshot(post_json("/api/chat", &serde_json::json!({"message": "ping"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let json = json_body(resp).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["response"], "pong");
        assert_eq!(json["model"], "mock-model");
        assert_eq!(json["usage"]["total_tokens"], 2);
    }

    #[tokio::test]
    async fn rag_chat_before_build_returns_notice_context() {
        let dir = tempfile::tempdir().unwrap();
        let app = make_router(MockProvider::default(), dir.path());
        let resp = app
            .oneshot(post_json(
                "/api/rag/chat",
                &serde_json::json!({"message": "what is the pump schedule?", "top_k": 2}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let json = json_body(resp).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["context"], NOT_INITIALIZED);
        assert_eq!(json["response"], "mock response");
    }

    #[tokio::test]
    async fn rebuild_then_rag_chat_uses_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pumps.txt"), "pump impeller inspection monthly").unwrap();
        let state = test_state(MockProvider::default(), dir.path());

        let resp = build_router(state.clone(), 1_048_576)
            .oneshot(post_json("/api/knowledge/rebuild", &serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let json = json_body(resp).await;
        assert_eq!(json["documents_indexed"], 1);
        assert_eq!(json["chunks_indexed"], 1);

        let resp = build_router(state, 1_048_576)
            .oneshot(post_json(
                "/api/rag/chat",
                &serde_json::json!({"message": "pump impeller"}),
            ))
            .await
            .unwrap();
        let json = json_body(resp).await;
        assert_eq!(json["context"], "pump impeller inspection monthly");
    }

    #[tokio::test]
    async fn upstream_failure_is_bad_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let app = make_router(MockProvider::failing(), dir.path());
        let resp = app
            .oneshot(post_json("/api/chat", &serde_json::json!({"message": "ping"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), 502);
        let json = json_body(resp).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("status 500"));
    }

    #[tokio::test]
    async fn malformed_body_is_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = make_router(MockProvider::default(), dir.path());
        let resp = app
            .oneshot(post_json("/api/chat", &serde_json::json!({"text": "ping"})))
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn blank_message_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = make_router(MockProvider::default(), dir.path());
        let resp = app
            .oneshot(post_json("/api/rag/chat", &serde_json::json!({"message": "  "})))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(json_body(resp).await["success"], false);
    }

    #[tokio::test]
    async fn body_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(MockProvider::default(), dir.path()), 64);
        let req = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(vec![b'a'; 128]))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 413);
    }
}
