//! Remove passages from the knowledge base.

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::rag::QdrantKnowledgeStore;

pub struct ForgetArgs {
    /// Point ids to delete
    pub ids: Vec<String>,
    /// Source file names whose passages are deleted
    pub sources: Vec<String>,
    pub collection: Option<String>,
}

impl ForgetArgs {
    /// Neither ids nor sources given: the whole collection goes.
    pub fn drops_collection(&self) -> bool {
        self.ids.is_empty() && self.sources.is_empty()
    }
}

pub async fn run(config: &Config, args: ForgetArgs) -> Result<()> {
    let mut settings = config.qdrant.clone();
    if let Some(collection) = args.collection.clone() {
        settings.collection = collection;
    }
    let store = QdrantKnowledgeStore::new(&settings)?;

    if args.drops_collection() {
        info!(collection = store.collection(), "Dropping collection");
        store.delete_collection().await?;
        return Ok(());
    }

    store.delete_ids(&args.ids).await?;
    for source in &args.sources {
        store.delete_source(source).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(ids: &[&str], sources: &[&str]) -> ForgetArgs {
        ForgetArgs {
            ids: ids.iter().map(|s| s.to_string()).collect(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            collection: None,
        }
    }

    #[test]
    fn collection_is_dropped_only_without_ids_or_sources() {
        assert!(args(&[], &[]).drops_collection());
        assert!(!args(&["2f1c6d0e-5e0b-4a57-9d7c-0c7f4a3b9e11"], &[]).drops_collection());
        assert!(!args(&[], &["soil.md"]).drops_collection());
    }
}
