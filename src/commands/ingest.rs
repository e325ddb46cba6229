//! Load documents into the knowledge base.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::rag::{Chunk, Chunker, EmbeddingService, QdrantKnowledgeStore};

/// Chunks embedded per request.
const EMBED_BATCH: usize = 64;

pub struct IngestArgs {
    pub files: Vec<PathBuf>,
    /// Overrides the configured collection
    pub collection: Option<String>,
}

#[derive(Debug, Default)]
pub struct IngestResult {
    pub files: usize,
    pub chunks: usize,
    /// Point ids of stored passages, in ingestion order
    pub ids: Vec<String>,
}

pub async fn run(config: &Config, args: IngestArgs) -> Result<IngestResult> {
    config.require_openai()?;

    let chunker = Chunker::new(config.retrieval.chunk_chars);
    let chunks = collect_chunks(&args.files, &chunker).await?;
    let mut result = IngestResult {
        files: args.files.len(),
        chunks: chunks.len(),
        ids: Vec::with_capacity(chunks.len()),
    };

    if chunks.is_empty() {
        warn!("Nothing to ingest");
        return Ok(result);
    }

    let mut qdrant = config.qdrant.clone();
    if let Some(collection) = args.collection {
        qdrant.collection = collection;
    }
    let store = QdrantKnowledgeStore::new(&qdrant)?;
    let embedder = EmbeddingService::new(&config.openai)?;
    store.ensure_collection(embedder.dimension()).await?;

    for batch in chunks.chunks(EMBED_BATCH) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed_batch(&texts)
            .await
            .with_context(|| partial_ingest_hint(&result.ids))?;
        let ids = store
            .upsert_chunks(batch, vectors)
            .await
            .with_context(|| partial_ingest_hint(&result.ids))?;
        info!(
            stored = result.ids.len() + ids.len(),
            total = result.chunks,
            ids = ?ids,
            "Ingestion progress"
        );
        result.ids.extend(ids);
    }

    info!(
        files = result.files,
        chunks = result.chunks,
        collection = store.collection(),
        "Ingestion finished"
    );
    Ok(result)
}

/// Read and chunk every file. Empty files are skipped with a warning.
pub async fn collect_chunks(files: &[PathBuf], chunker: &Chunker) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for path in files {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        let file_chunks = chunker.chunk(&text, &source_label(path));
        if file_chunks.is_empty() {
            warn!(path = %path.display(), "File has no text, skipping");
            continue;
        }
        info!(path = %path.display(), chunks = file_chunks.len(), "Chunked file");
        chunks.extend(file_chunks);
    }
    Ok(chunks)
}

/// Error context naming what an aborted run already stored.
fn partial_ingest_hint(stored: &[String]) -> String {
    if stored.is_empty() {
        return "ingestion aborted, nothing stored".to_string();
    }
    format!(
        "ingestion aborted after storing {} passages; remove them with `forget --ids {}` \
         or `forget --source <file>`",
        stored.len(),
        stored.join(" ")
    )
}

fn source_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn collect_chunks_labels_by_file_name() {
        let dir = TempDir::new().unwrap();
        let soil = dir.path().join("soil.md");
        let pests = dir.path().join("pests.txt");
        fs::write(&soil, "Maize grows best in pH 5.5-7.0.\n\nLime raises pH.").unwrap();
        fs::write(&pests, "Fall armyworm attacks maize leaves.").unwrap();

        let chunker = Chunker::new(40);
        let chunks = collect_chunks(&[soil, pests], &chunker).await.unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].source, "soil.md");
        assert_eq!(chunks[1].source, "soil.md");
        assert_eq!(chunks[2].source, "pests.txt");
        assert_eq!(chunks[2].index, 0);
    }

    #[test]
    fn partial_ingest_hint_lists_stored_ids() {
        assert_eq!(partial_ingest_hint(&[]), "ingestion aborted, nothing stored");

        let hint = partial_ingest_hint(&["a1".to_string(), "b2".to_string()]);
        assert!(hint.contains("after storing 2 passages"));
        assert!(hint.contains("forget --ids a1 b2"));
    }

    #[tokio::test]
    async fn collect_chunks_skips_empty_files() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("empty.md");
        fs::write(&empty, "  \n").unwrap();

        let chunks = collect_chunks(&[empty], &Chunker::new(100)).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn collect_chunks_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.md");

        let err = collect_chunks(&[missing], &Chunker::new(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing.md"));
    }

    #[test]
    fn source_label_uses_file_name() {
        assert_eq!(source_label(Path::new("/data/docs/irrigation.md")), "irrigation.md");
    }
}
