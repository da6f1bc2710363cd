use std::path::PathBuf;

use crate::error::LlmError;

pub(super) struct ModelFiles {
    pub config: Option<PathBuf>,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

/// Download (or reuse from the local cache) the files needed to run `repo_id`.
///
/// `revision` pins a branch or PR ref when the default branch lacks safetensors weights.
pub(super) fn fetch(
    repo_id: &str,
    revision: Option<&str>,
    with_config: bool,
) -> Result<ModelFiles, LlmError> {
    let api = hf_hub::api::sync::Api::new().map_err(|e| {
        LlmError::ModelLoad(format!("failed to create HuggingFace API client: {e}"))
    })?;
    let repo = match revision {
        Some(rev) => api.repo(hf_hub::Repo::with_revision(
            repo_id.to_owned(),
            hf_hub::RepoType::Model,
            rev.to_owned(),
        )),
        None => api.model(repo_id.to_owned()),
    };

    let get = |name: &str| {
        repo.get(name).map_err(|e| {
            LlmError::ModelLoad(format!("failed to download {name} from {repo_id}: {e}"))
        })
    };

    let config = if with_config {
        Some(get("config.json")?)
    } else {
        None
    };
    Ok(ModelFiles {
        config,
        tokenizer: get("tokenizer.json")?,
        weights: get("model.safetensors")?,
    })
}

pub(super) fn load_tokenizer(
    path: &std::path::Path,
    max_tokens: usize,
) -> Result<tokenizers::Tokenizer, LlmError> {
    let mut tokenizer = tokenizers::Tokenizer::from_file(path)
        .map_err(|e| LlmError::ModelLoad(format!("failed to load tokenizer: {e}")))?;
    tokenizer
        .with_truncation(Some(tokenizers::TruncationParams {
            max_length: max_tokens,
            ..Default::default()
        }))
        .map_err(|e| LlmError::ModelLoad(format!("invalid truncation settings: {e}")))?;
    Ok(tokenizer)
}
