//! semantic_search：查询文本 → 嵌入 → 向量检索，返回 `{"results", "count"}`

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::llm::EmbeddingProvider;
use crate::storage::VectorSearch;
use crate::tools::schema::args_schema;
use crate::tools::{Tool, SEMANTIC_SEARCH};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SemanticSearchArgs {
    /// One of institutions, positions, experiences, skills, users, documents
    pub table: String,
    /// Text to search for
    pub query: String,
}

pub struct SemanticSearchTool {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorSearch>,
    limit: usize,
    threshold: f32,
}

impl SemanticSearchTool {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorSearch>,
        limit: usize,
        threshold: f32,
    ) -> Self {
        Self {
            embedder,
            index,
            limit,
            threshold,
        }
    }
}

#[async_trait]
impl Tool for SemanticSearchTool {
    fn name(&self) -> &str {
        SEMANTIC_SEARCH
    }

    fn description(&self) -> &str {
        "Search for semantically similar records using vector embeddings. Use when the user uses \
         abbreviations, synonyms, or concepts that may have different wording in the database."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<SemanticSearchArgs>()
    }

    fn usage(&self) -> String {
        r#"Action: semantic_search(table="institutions", query="MSU")"#.to_string()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: SemanticSearchArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {e}"))?;
        let vector = self
            .embedder
            .embed(&args.query)
            .await
            .ok_or_else(|| "Failed to generate query embedding".to_string())?;
        let rows = self
            .index
            .search(&args.table, &vector, self.limit, self.threshold)
            .await
            .map_err(|e| e.to_string())?;
        tracing::debug!(table = %args.table, hits = rows.len(), "semantic search");
        Ok(serde_json::json!({ "results": rows, "count": rows.len() }).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::HashingEmbedder;
    use crate::storage::{Row, StorageError};
    use serde_json::json;

    struct OneHit;

    #[async_trait]
    impl VectorSearch for OneHit {
        async fn search(
            &self,
            table: &str,
            _query: &[f32],
            _limit: usize,
            _threshold: f32,
        ) -> Result<Vec<Row>, StorageError> {
            if table != "institutions" {
                return Err(StorageError::UnsupportedTable(table.to_string()));
            }
            let row = json!({"name": "Michigan State University", "similarity": 0.92});
            Ok(vec![row.as_object().cloned().unwrap_or_default()])
        }
    }

    fn tool() -> SemanticSearchTool {
        SemanticSearchTool::new(Arc::new(HashingEmbedder::default()), Arc::new(OneHit), 5, 0.3)
    }

    #[tokio::test]
    async fn test_results_and_count() {
        let out = tool()
            .execute(json!({"table": "institutions", "query": "MSU"}))
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["count"], 1);
        assert_eq!(v["results"][0]["name"], "Michigan State University");
    }

    #[tokio::test]
    async fn test_empty_query_fails_embedding() {
        let err = tool()
            .execute(json!({"table": "institutions", "query": "  "}))
            .await
            .unwrap_err();
        assert!(err.contains("embedding"));
    }

    #[tokio::test]
    async fn test_bad_table_is_error() {
        let err = tool()
            .execute(json!({"table": "llm_roles", "query": "x"}))
            .await
            .unwrap_err();
        assert!(err.contains("does not support semantic search"));
    }
}
