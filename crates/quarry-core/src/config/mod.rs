mod env;
mod types;


pub use types::*;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use quarry_index::RetrievalSettings;
use quarry_ingest::ExtractOptions;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.llm.base_url.trim().is_empty() {
            bail!("llm.base_url must not be empty");
        }
        if self.llm.max_tokens == 0 {
            bail!("llm.max_tokens must be greater than 0");
        }
        if self.llm.chat_timeout_secs == 0 || self.llm.rag_timeout_secs == 0 {
            bail!("llm timeouts must be greater than 0");
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be greater than 0");
        }
        self.chunking
            .general
            .validate()
            .context("invalid chunking.general")?;
        self.chunking
            .pdf
            .validate()
            .context("invalid chunking.pdf")?;
        if self.server.max_body_size == 0 {
            bail!("server.max_body_size must be greater than 0");
        }
        Ok(())
    }

    #[must_use]
    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            root: self.knowledge_base.path.clone(),
            recursive: self.knowledge_base.recursive,
            general: self.chunking.general,
            pdf: self.chunking.pdf,
            extract: ExtractOptions {
                max_file_size: self.knowledge_base.max_file_size,
                skip_header: self.knowledge_base.skip_header,
                extract_images: false,
            },
        }
    }

    #[must_use]
    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.chat_timeout_secs)
    }

    #[must_use]
    pub fn rag_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.rag_timeout_secs)
    }
}
