//! Process configuration, read once from the environment at startup
//! (with `.env` support via dotenvy in `main`).

use std::env;
use std::sync::Arc;

use credence_common::{CredenceError, Result};
use credence_llm::{EvidenceSearchClient, LlmBackend, OllamaBackend, OpenAiBackend, VerificationAgent};

const DEFAULT_LLM_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_VERIFICATION_MODEL: &str = "gpt-4o";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackendKind {
    OpenAi,
    Ollama,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_kind: LlmBackendKind,
    pub openai_api_key: Option<String>,
    pub exa_api_key: Option<String>,
    pub llm_model: String,
    pub verification_model: String,
    pub embedding_model: String,
    pub ollama_base_url: String,
    pub kalshi_base_url: Option<String>,
    pub bind_addr: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let backend_kind = match env_or("LLM_BACKEND", "openai").to_lowercase().as_str() {
            "openai" => LlmBackendKind::OpenAi,
            "ollama" => LlmBackendKind::Ollama,
            other => {
                return Err(CredenceError::Validation(format!(
                    "LLM_BACKEND must be 'openai' or 'ollama', got {other:?}"
                )))
            }
        };
        let openai_api_key = env::var("OPENAI_API_KEY").ok();
        if backend_kind == LlmBackendKind::OpenAi && openai_api_key.is_none() {
            return Err(CredenceError::Validation(
                "OPENAI_API_KEY is required".to_string(),
            ));
        }
        Ok(Self {
            backend_kind,
            openai_api_key,
            exa_api_key: env::var("EXA_API_KEY").ok(),
            llm_model: env_or("LLM_MODEL", DEFAULT_LLM_MODEL),
            verification_model: env_or("VERIFICATION_MODEL", DEFAULT_VERIFICATION_MODEL),
            embedding_model: env_or("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            ollama_base_url: env_or("OLLAMA_BASE_URL", DEFAULT_OLLAMA_BASE_URL),
            kalshi_base_url: env::var("KALSHI_BASE_URL").ok(),
            bind_addr: env_or("BIND_ADDR", DEFAULT_BIND_ADDR),
        })
    }

    /// The chat/embedding backend shared by all LLM clients in a request.
    pub fn llm_backend(&self) -> Result<Arc<dyn LlmBackend>> {
        match self.backend_kind {
            LlmBackendKind::OpenAi => {
                let key = self.openai_api_key.as_deref().ok_or_else(|| {
                    CredenceError::Validation("OPENAI_API_KEY is required".to_string())
                })?;
                Ok(Arc::new(
                    OpenAiBackend::new(key, &self.llm_model)
                        .with_embedding_model(&self.embedding_model),
                ))
            }
            LlmBackendKind::Ollama => Ok(Arc::new(OllamaBackend::new(
                &self.ollama_base_url,
                &self.llm_model,
            ))),
        }
    }

    /// The verification agent always runs on OpenAI with web evidence.
    pub fn verification_agent(&self) -> Result<VerificationAgent> {
        let openai_key = self.openai_api_key.as_deref().ok_or_else(|| {
            CredenceError::Validation("OPENAI_API_KEY is required for verification".to_string())
        })?;
        let exa_key = self.exa_api_key.as_deref().ok_or_else(|| {
            CredenceError::Validation("EXA_API_KEY is required for verification".to_string())
        })?;
        Ok(VerificationAgent::new(
            openai_key,
            &self.verification_model,
            EvidenceSearchClient::new(exa_key),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            backend_kind: LlmBackendKind::OpenAi,
            openai_api_key: Some("sk-test".to_string()),
            exa_api_key: Some("exa-test".to_string()),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            verification_model: DEFAULT_VERIFICATION_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            kalshi_base_url: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }

    #[test]
    fn test_openai_backend_requires_key() {
        let mut cfg = base_config();
        cfg.openai_api_key = None;
        assert!(cfg.llm_backend().is_err());
    }

    #[test]
    fn test_ollama_backend_needs_no_key() {
        let mut cfg = base_config();
        cfg.backend_kind = LlmBackendKind::Ollama;
        cfg.openai_api_key = None;
        assert!(cfg.llm_backend().is_ok());
    }

    #[test]
    fn test_verification_agent_requires_both_keys() {
        let mut cfg = base_config();
        assert!(cfg.verification_agent().is_ok());
        cfg.exa_api_key = None;
        assert!(cfg.verification_agent().is_err());
    }
}
