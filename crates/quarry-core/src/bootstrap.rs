//! Backend construction from configuration.
//!
//! Models load once here, eagerly; the resulting values are owned by the caller and
//! injected into the retrieval service and orchestrator.

use std::path::PathBuf;
use std::time::Duration;

#[cfg(not(feature = "candle"))]
use anyhow::bail;
use anyhow::Context;
use quarry_index::RetrievalService;
use quarry_llm::openai::{OpenAiEmbedder, OpenAiProvider};
use quarry_llm::{AnyEmbedder, AnyProvider, Embedder};

use crate::config::{Config, EmbeddingBackend, EmbeddingConfig, LlmConfig, MultimodalConfig};

/// Priority: explicit `--config` > `QUARRY_CONFIG` env > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli {
        return path;
    }
    if let Ok(path) = std::env::var("QUARRY_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

/// # Errors
///
/// Returns an error if the HTTP client cannot be constructed.
pub fn create_provider(llm: &LlmConfig) -> anyhow::Result<AnyProvider> {
    if llm.api_key.is_empty() {
        tracing::warn!("llm.api_key is empty; requests will be sent without credentials");
    }
    let provider = OpenAiProvider::new(
        llm.api_key.clone(),
        llm.base_url.clone(),
        llm.model.clone(),
        llm.max_tokens,
    )
    .context("failed to create chat provider")?;
    Ok(AnyProvider::OpenAi(provider))
}

/// Build the text embedder used for retrieval.
///
/// # Errors
///
/// Returns an error if the backend is unavailable in this build or fails to load.
pub async fn create_embedder(
    embedding: &EmbeddingConfig,
    llm: &LlmConfig,
) -> anyhow::Result<AnyEmbedder> {
    let embedder = match embedding.backend {
        EmbeddingBackend::OpenAi => {
            let embedder = OpenAiEmbedder::connect(
                llm.api_key.clone(),
                llm.base_url.clone(),
                embedding.model.clone(),
                Duration::from_secs(embedding.timeout_secs),
            )
            .await
            .with_context(|| format!("failed to reach embedding model {}", embedding.model))?;
            AnyEmbedder::OpenAi(embedder)
        }
        EmbeddingBackend::Bert => load_bert(&embedding.model).await?,
    };
    tracing::info!(space = %embedder.space(), "text embedder loaded");
    Ok(embedder)
}

#[cfg(feature = "candle")]
async fn load_bert(repo_id: &str) -> anyhow::Result<AnyEmbedder> {
    use quarry_llm::candle_provider::{BertEmbedder, select_device};

    let repo_id = repo_id.to_owned();
    let embedder = tokio::task::spawn_blocking(move || {
        let device = select_device()?;
        BertEmbedder::load(&repo_id, &device)
    })
    .await
    .context("model loading task failed")?
    .context("failed to load BERT embedder")?;
    Ok(AnyEmbedder::Bert(embedder))
}

#[cfg(not(feature = "candle"))]
#[allow(clippy::unused_async)]
async fn load_bert(_repo_id: &str) -> anyhow::Result<AnyEmbedder> {
    bail!("embedding backend `bert` requires the `candle` feature")
}

/// Build the joint text/image embedder for the multimodal pass.
///
/// # Errors
///
/// Returns an error if candle support is not compiled in or the model fails to load.
#[cfg(feature = "candle")]
pub async fn create_multimodal_embedder(
    multimodal: &MultimodalConfig,
) -> anyhow::Result<AnyEmbedder> {
    use quarry_llm::candle_provider::{ClipEmbedder, select_device};

    let repo_id = multimodal.model.clone();
    let embedder = tokio::task::spawn_blocking(move || {
        let device = select_device()?;
        ClipEmbedder::load(&repo_id, &device)
    })
    .await
    .context("model loading task failed")?
    .context("failed to load CLIP embedder")?;
    tracing::info!(space = %embedder.space(), "multimodal embedder loaded");
    Ok(AnyEmbedder::Clip(embedder))
}

/// # Errors
///
/// Always fails: the joint backend needs the `candle` feature.
#[cfg(not(feature = "candle"))]
#[allow(clippy::unused_async)]
pub async fn create_multimodal_embedder(
    multimodal: &MultimodalConfig,
) -> anyhow::Result<AnyEmbedder> {
    bail!(
        "multimodal embedding with {} requires the `candle` feature",
        multimodal.model
    )
}

/// # Errors
///
/// Returns an error if the chunking configuration is invalid.
pub fn create_retrieval_service<E: Embedder>(
    config: &Config,
    embedder: E,
) -> anyhow::Result<RetrievalService<E>> {
    RetrievalService::new(embedder, config.retrieval_settings())
        .context("failed to create retrieval service")
}
