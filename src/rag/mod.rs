//! Knowledge base: chunking, embeddings and the Qdrant-backed store.

pub mod chunker;
pub mod embeddings;
pub mod knowledge_store;

pub use chunker::{Chunk, Chunker};
pub use embeddings::EmbeddingService;
pub use knowledge_store::QdrantKnowledgeStore;
