//! credence-llm — LLM-backed collaborators: chat/embedding backends, the
//! memoized embedding client, derivative-claim generation, claim
//! verification with web evidence, and market-alignment suggestions.

pub mod backend;
pub mod derivatives;
pub mod embedding;
pub mod evidence;
pub mod suggest;
pub mod verification;

pub use backend::{ChatRequest, ChatResponse, LlmBackend, Message, OllamaBackend, OpenAiBackend};
pub use derivatives::DerivativesClient;
pub use embedding::EmbeddingClient;
pub use evidence::EvidenceSearchClient;
pub use suggest::{RawSuggestion, SuggestItem, SuggestionAction, SuggestionClient};
pub use verification::VerificationAgent;
