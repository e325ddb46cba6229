//! Knowledge store backed by Qdrant

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, r#match::MatchValue, value::Kind, CreateCollectionBuilder,
    DeletePointsBuilder, Distance, FieldCondition, Filter, Match, PointId, PointStruct,
    PointsIdsList, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info};

use super::chunker::Chunk;
use crate::config::QdrantSettings;
use crate::pipeline::stages::KnowledgeStore;
use crate::pipeline::types::{rank_passages, QueryVector, RetrievedPassage};
use crate::{Error, Result};

const TEXT_KEY: &str = "text";
const SOURCE_KEY: &str = "source";

/// Passages stored in one Qdrant collection.
pub struct QdrantKnowledgeStore {
    client: Qdrant,
    collection: String,
}

impl QdrantKnowledgeStore {
    /// Build a client; no network I/O happens until the first call.
    pub fn new(settings: &QdrantSettings) -> Result<Self> {
        let client = Qdrant::from_url(&settings.url)
            .api_key(settings.api_key.clone())
            .build()
            .map_err(|e| Error::ConfigError(format!("Qdrant client error: {}", e)))?;

        Ok(Self {
            client,
            collection: settings.collection.clone(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection with cosine distance if it does not exist.
    pub async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(storage_error)?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if exists {
            debug!(collection = %self.collection, "Collection already exists");
            return Ok(());
        }

        info!(collection = %self.collection, dimension, "Creating collection");
        self.client
            .create_collection(
                CreateCollectionBuilder::new(self.collection.as_str())
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await
            .map_err(storage_error)?;

        Ok(())
    }

    /// Store chunks with their embeddings. Returns the point ids.
    pub async fn upsert_chunks(
        &self,
        chunks: &[Chunk],
        vectors: Vec<Vec<f32>>,
    ) -> Result<Vec<String>> {
        if chunks.len() != vectors.len() {
            return Err(Error::StorageError(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = chunks.iter().map(|c| c.id.to_string()).collect();
        let points: Vec<PointStruct> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                PointStruct::new(chunk.id.to_string(), vector, chunk_payload(chunk))
            })
            .collect();

        debug!(count = points.len(), collection = %self.collection, "Upserting points");
        self.client
            .upsert_points(UpsertPointsBuilder::new(self.collection.as_str(), points).wait(true))
            .await
            .map_err(storage_error)?;

        info!(count = ids.len(), collection = %self.collection, "Stored passages");
        Ok(ids)
    }

    /// Drop the whole collection.
    pub async fn delete_collection(&self) -> Result<()> {
        self.client
            .delete_collection(self.collection.as_str())
            .await
            .map_err(storage_error)?;
        info!(collection = %self.collection, "Deleted collection");
        Ok(())
    }

    /// Remove individual passages by point id.
    pub async fn delete_ids(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<PointId> = ids.iter().map(|id| PointId::from(id.clone())).collect();
        let count = ids.len();
        self.client
            .delete_points(
                DeletePointsBuilder::new(self.collection.as_str())
                    .points(PointsIdsList { ids })
                    .wait(true),
            )
            .await
            .map_err(storage_error)?;
        info!(count, collection = %self.collection, "Deleted passages");
        Ok(())
    }

    /// Remove every passage ingested from `source` (the file name used at
    /// ingestion).
    pub async fn delete_source(&self, source: &str) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(self.collection.as_str())
                    .points(source_filter(source))
                    .wait(true),
            )
            .await
            .map_err(storage_error)?;
        info!(source, collection = %self.collection, "Deleted passages of source");
        Ok(())
    }
}

fn source_filter(source: &str) -> Filter {
    Filter::must([FieldCondition {
        key: SOURCE_KEY.to_string(),
        r#match: Some(Match {
            match_value: Some(MatchValue::Keyword(source.to_string())),
        }),
        ..Default::default()
    }
    .into()])
}

#[async_trait]
impl KnowledgeStore for QdrantKnowledgeStore {
    async fn search(&self, query: &QueryVector, k: usize) -> Result<Vec<RetrievedPassage>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(
                    self.collection.as_str(),
                    query.as_slice().to_vec(),
                    k as u64,
                )
                .with_payload(true),
            )
            .await
            .map_err(|e| Error::RetrievalError(e.to_string()))?;

        let passages = response
            .result
            .into_iter()
            .filter_map(|point| passage_from_payload(point.id, &point.payload, point.score))
            .collect();

        Ok(rank_passages(passages, k))
    }
}

fn storage_error(err: qdrant_client::QdrantError) -> Error {
    Error::StorageError(err.to_string())
}

fn chunk_payload(chunk: &Chunk) -> HashMap<String, QdrantValue> {
    let mut payload: HashMap<String, QdrantValue> = HashMap::new();
    payload.insert(TEXT_KEY.into(), chunk.text.clone().into());
    payload.insert(SOURCE_KEY.into(), chunk.source.clone().into());
    payload.insert("chunk_index".into(), (chunk.index as i64).into());
    payload
}

/// Points without a text payload are skipped. The source label falls back to
/// the point id.
fn passage_from_payload(
    id: Option<PointId>,
    payload: &HashMap<String, QdrantValue>,
    score: f32,
) -> Option<RetrievedPassage> {
    let text = payload.get(TEXT_KEY).and_then(string_value)?;
    let source = payload
        .get(SOURCE_KEY)
        .and_then(string_value)
        .or_else(|| id.and_then(point_id_string))
        .unwrap_or_default();

    Some(RetrievedPassage::new(text, score, source))
}

fn string_value(value: &QdrantValue) -> Option<String> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn point_id_string(id: PointId) -> Option<String> {
    match id.point_id_options? {
        PointIdOptions::Uuid(uuid) => Some(uuid),
        PointIdOptions::Num(num) => Some(num.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(pairs: &[(&str, &str)]) -> HashMap<String, QdrantValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), QdrantValue::from(v.to_string())))
            .collect()
    }

    #[test]
    fn passage_reads_text_and_source() {
        let p = payload(&[("text", "Maize grows best in pH 5.5-7.0"), ("source", "soil.md")]);
        let passage = passage_from_payload(None, &p, 0.87).unwrap();

        assert_eq!(passage.text, "Maize grows best in pH 5.5-7.0");
        assert_eq!(passage.source_id, "soil.md");
        assert_eq!(passage.similarity_score, 0.87);
    }

    #[test]
    fn passage_without_text_is_skipped() {
        let p = payload(&[("source", "soil.md")]);
        assert!(passage_from_payload(None, &p, 0.5).is_none());
    }

    #[test]
    fn passage_source_falls_back_to_point_id() {
        let p = payload(&[("text", "Irrigate at dawn")]);
        let id = PointId::from("2f1c6d0e-5e0b-4a57-9d7c-0c7f4a3b9e11".to_string());
        let passage = passage_from_payload(Some(id), &p, 0.4).unwrap();
        assert_eq!(passage.source_id, "2f1c6d0e-5e0b-4a57-9d7c-0c7f4a3b9e11");

        let passage = passage_from_payload(Some(PointId::from(42u64)), &p, 0.4).unwrap();
        assert_eq!(passage.source_id, "42");
    }

    #[test]
    fn non_string_text_is_ignored() {
        let mut p = HashMap::new();
        p.insert("text".to_string(), QdrantValue::from(7i64));
        assert!(passage_from_payload(None, &p, 0.1).is_none());
    }

    #[test]
    fn chunk_payload_contains_text_source_and_index() {
        let chunk = Chunk::new("Rotate legumes with cereals", "rotation.md", 3);
        let p = chunk_payload(&chunk);

        assert_eq!(string_value(&p["text"]).as_deref(), Some("Rotate legumes with cereals"));
        assert_eq!(string_value(&p["source"]).as_deref(), Some("rotation.md"));
        assert!(matches!(p["chunk_index"].kind, Some(Kind::IntegerValue(3))));
    }

    #[test]
    fn source_filter_matches_source_keyword() {
        use qdrant_client::qdrant::condition::ConditionOneOf;

        let filter = source_filter("soil.md");
        assert_eq!(filter.must.len(), 1);
        match &filter.must[0].condition_one_of {
            Some(ConditionOneOf::Field(field)) => {
                assert_eq!(field.key, "source");
                let value = field.r#match.as_ref().and_then(|m| m.match_value.clone());
                assert_eq!(value, Some(MatchValue::Keyword("soil.md".to_string())));
            }
            other => panic!("unexpected condition: {other:?}"),
        }
    }

    #[tokio::test]
    async fn upsert_rejects_mismatched_lengths() {
        let store = QdrantKnowledgeStore::new(&QdrantSettings {
            url: "http://127.0.0.1:6334".to_string(),
            api_key: None,
            collection: "test".to_string(),
        })
        .unwrap();

        let chunk = Chunk::new("a", "src", 0);
        let err = store.upsert_chunks(&[chunk], Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::StorageError(_)));
    }
}
