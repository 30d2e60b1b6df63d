//! sql_query：执行字面 SQL，返回 `{"results", "count"}`
//!
//! 不做 SQL 校验或沙箱，调用方被视为可信。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::storage::StructuredQuery;
use crate::tools::schema::args_schema;
use crate::tools::{Tool, SQL_QUERY};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SqlQueryArgs {
    /// A valid SQLite statement
    pub sql: String,
}

pub struct SqlQueryTool {
    db: Arc<dyn StructuredQuery>,
}

impl SqlQueryTool {
    pub fn new(db: Arc<dyn StructuredQuery>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for SqlQueryTool {
    fn name(&self) -> &str {
        SQL_QUERY
    }

    fn description(&self) -> &str {
        "Execute a SQL query on the database. Use for exact lookups when you know specific values."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<SqlQueryArgs>()
    }

    fn usage(&self) -> String {
        "Action: sql_query\nAction Input: SELECT name, level FROM skills".to_string()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: SqlQueryArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {e}"))?;
        let rows = self
            .db
            .execute(&args.sql, &[])
            .await
            .map_err(|e| e.to_string())?;
        Ok(serde_json::json!({ "results": rows, "count": rows.len() }).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_select_count() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store
            .execute("INSERT INTO skills (name) VALUES ('Rust'), ('SQL')", &[])
            .await
            .unwrap();
        let out = SqlQueryTool::new(store)
            .execute(json!({"sql": "SELECT name FROM skills ORDER BY name"}))
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["count"], 2);
        assert_eq!(v["results"][0]["name"], "Rust");
    }

    #[tokio::test]
    async fn test_sql_error_is_err() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let err = SqlQueryTool::new(store)
            .execute(json!({"sql": "SELEC nonsense"}))
            .await
            .unwrap_err();
        assert!(err.contains("syntax error"));
    }
}
