//! 存储层：核心消费的存储接口与 SQLite 实现
//!
//! - StructuredQuery：执行字面 SQL，读语句返回行
//! - VectorSearch：按相似度检索，`similarity >= threshold`
//! - DocumentSink：网页分块入库
//! - RoleSource：加载启用的角色模板
//! - CommandSink：执行白名单写命令
//!
//! 每条语句独立提交；跨语句操作不保证原子性。

pub mod benchmark;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::llm::RoleTemplate;
use crate::plan::WriteCommand;

pub use schema::{SCHEMA_DESCRIPTION, VECTOR_TABLES};
pub use sqlite::SqliteStore;

/// 一行结果：列名 → JSON 值
pub type Row = serde_json::Map<String, Value>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("table '{0}' does not support semantic search")]
    UnsupportedTable(String),

    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// 一个待入库的网页分块
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub url: String,
    pub title: String,
    pub chunk_text: String,
    pub chunk_index: usize,
    pub embedding: Option<Vec<f32>>,
}

/// 写命令的执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    pub affected: usize,
    pub last_insert_id: Option<i64>,
}

#[async_trait]
pub trait StructuredQuery: Send + Sync {
    /// 执行字面 SQL；读语句返回行，写语句返回空 Vec
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StorageError>;
}

#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// 返回按相似度降序、`similarity >= threshold` 的行（每行含 `similarity` 字段）
    async fn search(
        &self,
        table: &str,
        query: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<Row>, StorageError>;
}

#[async_trait]
pub trait DocumentSink: Send + Sync {
    async fn insert_document_chunk(&self, chunk: &DocumentChunk) -> Result<i64, StorageError>;
}

#[async_trait]
pub trait RoleSource: Send + Sync {
    async fn load_roles(&self) -> Result<Vec<RoleTemplate>, StorageError>;
}

#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn apply(&self, command: &WriteCommand) -> Result<CommandOutcome, StorageError>;
}
