use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Failed to initialize course catalog: {0}")]
    Catalog(#[source] anyhow::Error),

    #[error("Failed to initialize chunk store: {0}")]
    ChunkStore(#[source] anyhow::Error),

    #[error("Failed to initialize LLM service: {0}")]
    Llm(#[source] anyhow::Error),

    #[error("Failed to build recommendation pipeline: {0}")]
    Pipeline(#[source] anyhow::Error),
}
