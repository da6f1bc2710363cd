use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{self, ClipConfig, ClipModel};
use image::imageops::FilterType;
use tokenizers::Tokenizer;

use super::{hub, run_blocking};
use crate::embed::{EmbedError, Embedder, Embedding, EmbeddingSpace};
use crate::error::LlmError;

pub const CLIP_MAX_TOKENS: usize = 77;

/// Weights on the default branch are pickle only; this PR ref carries safetensors.
const SAFETENSORS_REVISION: &str = "refs/pr/15";

struct Inner {
    model: ClipModel,
    tokenizer: Tokenizer,
    device: Device,
    image_size: usize,
}

/// Joint text/image embeddings from a CLIP ViT model.
///
/// Text and images land in the same space, so one index can hold both.
#[derive(Clone)]
pub struct ClipEmbedder {
    inner: Arc<Inner>,
    space: EmbeddingSpace,
}

impl std::fmt::Debug for ClipEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipEmbedder")
            .field("space", &self.space)
            .field("device", &self.inner.device)
            .field("image_size", &self.inner.image_size)
            .finish_non_exhaustive()
    }
}

impl ClipEmbedder {
    /// Load a ViT-B/32 CLIP checkpoint from `HuggingFace` Hub.
    ///
    /// # Errors
    ///
    /// Returns an error if model download or loading fails.
    pub fn load(repo_id: &str, device: &Device) -> Result<Self, LlmError> {
        let revision = (repo_id == "openai/clip-vit-base-patch32").then_some(SAFETENSORS_REVISION);
        let files = hub::fetch(repo_id, revision, false)?;
        let tokenizer = hub::load_tokenizer(&files.tokenizer, CLIP_MAX_TOKENS)?;

        let config = ClipConfig::vit_base_patch32();
        // SAFETY: file is a valid safetensors downloaded from hf-hub, not modified during
        // VarBuilder lifetime
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[files.weights], DType::F32, device)? };
        let model = ClipModel::new(vb, &config)?;
        let space = EmbeddingSpace::new("candle-clip", repo_id, config.text_config.projection_dim);

        tracing::info!(space = %space, "CLIP embedder loaded");
        Ok(Self {
            inner: Arc::new(Inner {
                model,
                tokenizer,
                device: device.clone(),
                image_size: config.image_size,
            }),
            space,
        })
    }
}

impl Inner {
    fn text_features(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| LlmError::Inference(format!("tokenizer encode failed: {e}")))?;
        let ids = encoding.get_ids();
        if ids.is_empty() {
            return Err(EmbedError::EmptyInput);
        }

        let run = || -> Result<Vec<f32>, candle_core::Error> {
            let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
            let features = self.model.get_text_features(&input_ids)?;
            clip::div_l2_norm(&features)?.squeeze(0)?.to_vec1::<f32>()
        };
        run().map_err(|e| EmbedError::Backend(LlmError::Candle(e)))
    }

    fn image_features(&self, bytes: &[u8]) -> Result<Vec<f32>, EmbedError> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| EmbedError::InvalidImage(e.to_string()))?;
        #[allow(clippy::cast_possible_truncation)]
        let side = self.image_size as u32;
        let rgb = decoded
            .resize_to_fill(side, side, FilterType::Triangle)
            .to_rgb8()
            .into_raw();

        let run = || -> Result<Vec<f32>, candle_core::Error> {
            // HWC u8 -> CHW f32 scaled to [-1, 1]
            let pixels = Tensor::from_vec(rgb, (self.image_size, self.image_size, 3), &self.device)?
                .permute((2, 0, 1))?
                .to_dtype(DType::F32)?
                .affine(2.0 / 255.0, -1.0)?
                .unsqueeze(0)?;
            let features = self.model.get_image_features(&pixels)?;
            clip::div_l2_norm(&features)?.squeeze(0)?.to_vec1::<f32>()
        };
        run().map_err(|e| EmbedError::Backend(LlmError::Candle(e)))
    }
}

impl Embedder for ClipEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Embedding, EmbedError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        let inner = Arc::clone(&self.inner);
        let owned = text.to_owned();
        let vector = run_blocking(move || Ok(inner.text_features(&owned)))
            .await
            .map_err(EmbedError::Backend)??;
        Embedding::normalized(vector)
    }

    async fn embed_image(&self, bytes: &[u8]) -> Result<Embedding, EmbedError> {
        if bytes.is_empty() {
            return Err(EmbedError::InvalidImage("empty image payload".into()));
        }
        let inner = Arc::clone(&self.inner);
        let owned = bytes.to_vec();
        let vector = run_blocking(move || Ok(inner.image_features(&owned)))
            .await
            .map_err(EmbedError::Backend)??;
        Embedding::normalized(vector)
    }

    fn space(&self) -> &EmbeddingSpace {
        &self.space
    }

    fn supports_images(&self) -> bool {
        true
    }
}
