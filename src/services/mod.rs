pub mod diff;
pub mod exporter;
pub mod history_store;
pub mod llm_service;
pub mod provider;

pub use diff::{diff_chars, render_inline, DiffKind, DiffSegment};
pub use exporter::Exporter;
pub use history_store::{FileStore, HistoryStore, KeyValueStore, MemoryStore};
pub use llm_service::{LlmService, RewriteOutput, RewriteRequest};
pub use provider::{Capability, ProviderRegistry, ProviderSpec, ResolvedProvider};
