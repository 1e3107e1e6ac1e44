pub mod openai;
pub mod provider;
pub mod service;
pub mod types;

pub use provider::{LlmError, LlmProvider, StructuredGenerator, TextEmbedder};
pub use service::LlmService;
pub use types::{ChatMessage, ChatRequest, ResponseSchema};
