use super::{Config, EmbeddingBackend};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_knowledge();
        self.apply_env_overrides_server();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("QUARRY_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("QUARRY_LLM_API_KEY") {
            self.llm.api_key = v;
        }
        if let Ok(v) = std::env::var("QUARRY_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("QUARRY_LLM_MAX_TOKENS")
            && let Ok(n) = v.parse::<u32>()
        {
            self.llm.max_tokens = n;
        }
        if let Ok(v) = std::env::var("QUARRY_LLM_CHAT_TIMEOUT_SECS")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.llm.chat_timeout_secs = secs;
        }
        if let Ok(v) = std::env::var("QUARRY_LLM_RAG_TIMEOUT_SECS")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.llm.rag_timeout_secs = secs;
        }
        if let Ok(v) = std::env::var("QUARRY_EMBEDDING_BACKEND") {
            if let Ok(backend) =
                serde_json::from_value::<EmbeddingBackend>(serde_json::Value::String(v.clone()))
            {
                self.embedding.backend = backend;
            } else {
                tracing::warn!("ignoring invalid QUARRY_EMBEDDING_BACKEND value: {v}");
            }
        }
        if let Ok(v) = std::env::var("QUARRY_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
    }

    fn apply_env_overrides_knowledge(&mut self) {
        if let Ok(v) = std::env::var("QUARRY_KNOWLEDGE_BASE_PATH") {
            self.knowledge_base.path = v.into();
        }
        if let Ok(v) = std::env::var("QUARRY_KNOWLEDGE_BASE_RECURSIVE")
            && let Ok(recursive) = v.parse::<bool>()
        {
            self.knowledge_base.recursive = recursive;
        }
        if let Ok(v) = std::env::var("QUARRY_RETRIEVAL_TOP_K")
            && let Ok(k) = v.parse::<usize>()
        {
            self.retrieval.top_k = k;
        }
        if let Ok(v) = std::env::var("QUARRY_CHUNK_SIZE")
            && let Ok(size) = v.parse::<usize>()
        {
            self.chunking.general.chunk_size = size;
        }
        if let Ok(v) = std::env::var("QUARRY_CHUNK_OVERLAP")
            && let Ok(overlap) = v.parse::<usize>()
        {
            self.chunking.general.chunk_overlap = overlap;
        }
    }

    fn apply_env_overrides_server(&mut self) {
        if let Ok(v) = std::env::var("QUARRY_SERVER_BIND") {
            self.server.bind = v;
        }
        if let Ok(v) = std::env::var("QUARRY_SERVER_PORT")
            && let Ok(port) = v.parse::<u16>()
        {
            self.server.port = port;
        }
    }
}
