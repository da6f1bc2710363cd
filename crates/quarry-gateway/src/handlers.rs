use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use quarry_core::{ChatReply, ChatRequest};
use quarry_index::{IndexPhase, KnowledgeStatus};
use quarry_llm::provider::Usage;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::server::AppState;

#[derive(Deserialize)]
pub(crate) struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Deserialize)]
pub(crate) struct RagChatBody {
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Serialize)]
struct ChatResponse {
    success: bool,
    response: String,
    model: String,
    usage: Usage,
}

impl From<ChatReply> for ChatResponse {
    fn from(reply: ChatReply) -> Self {
        Self {
            success: true,
            response: reply.response,
            model: reply.model,
            usage: reply.usage.unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct RagChatResponse {
    #[serde(flatten)]
    chat: ChatResponse,
    context: String,
}

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct KnowledgeSummary {
    state: IndexPhase,
    chunks: usize,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    knowledge_base: KnowledgeSummary,
}

#[derive(Serialize)]
struct RebuildResponse {
    success: bool,
    documents_scanned: usize,
    documents_indexed: usize,
    chunks_indexed: usize,
    skipped: usize,
    duration_ms: u64,
}

fn require_message(message: &str) -> Result<(), ApiError> {
    if message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".into()));
    }
    Ok(())
}

pub(crate) async fn root_handler() -> impl IntoResponse {
    Json(RootResponse {
        message: "quarry retrieval-augmented chat over txt, pdf, and excel documents",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let KnowledgeStatus { state: phase, chunks, .. } = state.orchestrator.retrieval().status();
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        knowledge_base: KnowledgeSummary {
            state: phase,
            chunks,
        },
    })
}

pub(crate) async fn chat_handler(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_message(&body.message)?;
    let request = ChatRequest {
        message: body.message,
        model: body.model,
        max_tokens: body.max_tokens,
        top_k: None,
    };
    let reply = state.orchestrator.chat(&request).await?;
    Ok(Json(ChatResponse::from(reply)))
}

pub(crate) async fn rag_chat_handler(
    State(state): State<AppState>,
    Json(body): Json<RagChatBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_message(&body.message)?;
    let request = ChatRequest {
        message: body.message,
        model: body.model,
        max_tokens: body.max_tokens,
        top_k: body.top_k,
    };
    let reply = state.orchestrator.rag_chat(&request).await?;
    Ok(Json(RagChatResponse {
        chat: reply.reply.into(),
        context: reply.context,
    }))
}

pub(crate) async fn rebuild_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.orchestrator.retrieval().build().await?;
    Ok(Json(RebuildResponse {
        success: true,
        documents_scanned: report.documents_scanned,
        documents_indexed: report.documents_indexed,
        chunks_indexed: report.chunks_indexed,
        skipped: report.skipped(),
        duration_ms: report.duration_ms,
    }))
}
