use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use super::{hub, run_blocking};
use crate::embed::{EmbedError, Embedder, Embedding, EmbeddingSpace};
use crate::error::LlmError;

struct Inner {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

/// Sentence embeddings from a BERT-family model (mean pooling, L2 normalized).
#[derive(Clone)]
pub struct BertEmbedder {
    inner: Arc<Inner>,
    space: EmbeddingSpace,
}

impl std::fmt::Debug for BertEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BertEmbedder")
            .field("space", &self.space)
            .field("device", &self.inner.device)
            .finish_non_exhaustive()
    }
}

impl BertEmbedder {
    /// Load a BERT embedding model from `HuggingFace` Hub.
    ///
    /// Inputs longer than the model's position table are truncated by the tokenizer.
    ///
    /// # Errors
    ///
    /// Returns an error if model download or loading fails.
    pub fn load(repo_id: &str, device: &Device) -> Result<Self, LlmError> {
        let files = hub::fetch(repo_id, None, true)?;
        let config_path = files
            .config
            .ok_or_else(|| LlmError::ModelLoad(format!("{repo_id} has no config.json")))?;

        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| LlmError::ModelLoad(format!("failed to read BERT config: {e}")))?;
        let config: BertConfig = serde_json::from_str(&config_str)?;
        let tokenizer = hub::load_tokenizer(&files.tokenizer, config.max_position_embeddings)?;

        // SAFETY: file is a valid safetensors downloaded from hf-hub, not modified during
        // VarBuilder lifetime
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[files.weights], DType::F32, device)? };
        let model = BertModel::load(vb, &config)?;
        let space = EmbeddingSpace::new("candle-bert", repo_id, config.hidden_size);

        tracing::info!(space = %space, "BERT embedder loaded");
        Ok(Self {
            inner: Arc::new(Inner {
                model,
                tokenizer,
                device: device.clone(),
            }),
            space,
        })
    }
}

impl Inner {
    fn embed_sync(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| LlmError::Inference(format!("tokenizer encode failed: {e}")))?;

        let token_ids = encoding.get_ids();
        if token_ids.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        let token_type_ids: Vec<u32> = vec![0; token_ids.len()];

        let run = || -> Result<Vec<f32>, candle_core::Error> {
            let input_ids = Tensor::new(token_ids, &self.device)?.unsqueeze(0)?;
            let token_type_ids =
                Tensor::new(token_type_ids.as_slice(), &self.device)?.unsqueeze(0)?;
            let hidden = self.model.forward(&input_ids, &token_type_ids, None)?;

            // Mean pooling over the sequence dimension
            let (_, seq_len, _) = hidden.dims3()?;
            #[allow(clippy::cast_precision_loss)]
            let pooled = (hidden.sum(1)? / seq_len as f64)?;
            pooled.squeeze(0)?.to_vec1::<f32>()
        };
        run().map_err(|e| EmbedError::Backend(LlmError::Candle(e)))
    }
}

impl Embedder for BertEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Embedding, EmbedError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        let inner = Arc::clone(&self.inner);
        let owned = text.to_owned();
        let vector = run_blocking(move || Ok(inner.embed_sync(&owned)))
            .await
            .map_err(EmbedError::Backend)??;
        Embedding::normalized(vector)
    }

    async fn embed_image(&self, _bytes: &[u8]) -> Result<Embedding, EmbedError> {
        Err(EmbedError::ImagesUnsupported {
            backend: "candle-bert",
        })
    }

    fn space(&self) -> &EmbeddingSpace {
        &self.space
    }
}
