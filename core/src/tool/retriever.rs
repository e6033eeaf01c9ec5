//! Retriever interface (spec §4.4, C5). Implementations live outside the
//! core (knowledge-base ingestion and vector search are out of scope, spec
//! §1); the registry only needs this trait to wrap retrieval as a synthetic
//! tool.

use async_trait::async_trait;
use serde::Serialize;

use crate::tool::ToolError;

#[derive(Clone, Debug, Serialize)]
pub struct RetrievedPassage {
    pub passage: String,
    pub source: String,
    pub score: f32,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(
        &self,
        corpus_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>, ToolError>;
}

/// The synthetic tool name the registry derives for a configured corpus
/// (spec §4.4 "a synthetic tool whose name is derived from the corpus id").
pub fn synthetic_tool_name(corpus_id: &str) -> String {
    format!("retrieve_{corpus_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_tool_name_is_namespaced_by_corpus() {
        assert_eq!(synthetic_tool_name("docs"), "retrieve_docs");
    }
}
