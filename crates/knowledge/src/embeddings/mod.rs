//! Embedding providers.
//!
//! The sync engine only decides *what* gets embedded; providers decide *how*.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
pub use providers::hashing::HashingProvider;
pub use providers::ollama::OllamaProvider;
