//! SQLite 存储实现
//!
//! 使用 `rusqlite` 持久化简历数据；向量以 JSON 文本存于 `embedding` 列，
//! 余弦相似度在 Rust 侧计算。连接由 tokio Mutex 串行化，每条语句自动提交。

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::llm::{cosine_similarity, EmbeddingProvider, RoleTemplate};
use crate::plan::{ExperienceRef, WriteCommand};
use crate::storage::schema::{embedding_source, DDL, KNOWN_TABLES, VECTOR_TABLES};
use crate::storage::{
    CommandOutcome, CommandSink, DocumentChunk, DocumentSink, RoleSource, Row, StorageError,
    StructuredQuery, VectorSearch,
};

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// 打开（或创建）数据库文件并初始化表结构
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(DDL)?;
        info!("SqliteStore opened at {:?}", path.as_ref());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 内存数据库（测试用）
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 插入一行；列名须为合法标识符，数组/对象值以 JSON 文本保存
    pub async fn insert_row(&self, table: &str, row: &Row) -> Result<i64, StorageError> {
        if !KNOWN_TABLES.contains(&table) {
            return Err(StorageError::InvalidIdentifier(table.to_string()));
        }
        if let Some(bad) = row.keys().find(|k| !IDENT_RE.is_match(k)) {
            return Err(StorageError::InvalidIdentifier(bad.clone()));
        }
        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        let values: Vec<SqlValue> = row.values().map(to_sql_value).collect();

        let conn = self.conn.lock().await;
        conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(conn.last_insert_rowid())
    }

    /// 为缺少向量的行补算嵌入；返回成功写入的行数
    pub async fn backfill_embeddings(
        &self,
        table: &str,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<usize, StorageError> {
        let (id_col, text_cols) = embedding_source(table)
            .ok_or_else(|| StorageError::UnsupportedTable(table.to_string()))?;

        let pending: Vec<(i64, String)> = {
            let conn = self.conn.lock().await;
            let sql = format!(
                "SELECT {id_col}, {} FROM {table} WHERE embedding IS NULL",
                text_cols.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let id: i64 = row.get(0)?;
                let mut parts = Vec::new();
                for i in 1..=text_cols.len() {
                    if let Some(text) = value_ref_to_text(row.get_ref(i)?) {
                        parts.push(text);
                    }
                }
                out.push((id, parts.join(" ")));
            }
            out
        };

        let mut updated = 0;
        for (id, text) in pending {
            let Some(vector) = embedder.embed(&text).await else {
                warn!(table, id, "embedding unavailable, row left unindexed");
                continue;
            };
            let json = serde_json::to_string(&vector)?;
            let conn = self.conn.lock().await;
            conn.execute(
                &format!("UPDATE {table} SET embedding = ?1 WHERE {id_col} = ?2"),
                params![json, id],
            )?;
            updated += 1;
        }
        debug!(table, updated, "backfill complete");
        Ok(updated)
    }

    /// 对所有可检索表补算嵌入
    pub async fn backfill_all(&self, embedder: &dyn EmbeddingProvider) -> Result<usize, StorageError> {
        let mut total = 0;
        for table in VECTOR_TABLES {
            total += self.backfill_embeddings(table, embedder).await?;
        }
        Ok(total)
    }

    async fn resolve_experience(&self, r: &ExperienceRef) -> Result<i64, StorageError> {
        let order = match r {
            ExperienceRef::Id(id) => return Ok(*id),
            ExperienceRef::First => "ASC",
            ExperienceRef::Latest => "DESC",
        };
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT experience_id FROM experiences ORDER BY start_date {order}, experience_id {order} LIMIT 1"
        );
        match conn.query_row(&sql, [], |row| row.get::<_, i64>(0)) {
            Ok(id) => Ok(id),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(StorageError::NotFound("no experiences exist".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let conn = self.conn.lock().await;
        f(&conn)
    }
}

#[async_trait]
impl StructuredQuery for SqliteStore {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StorageError> {
        let values: Vec<SqlValue> = params.iter().map(to_sql_value).collect();
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(sql)?;

        if stmt.column_count() == 0 {
            stmt.execute(params_from_iter(values.iter()))?;
            return Ok(Vec::new());
        }

        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(values.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = Row::new();
            for (i, name) in names.iter().enumerate() {
                map.insert(name.clone(), value_ref_to_json(row.get_ref(i)?));
            }
            out.push(map);
        }
        Ok(out)
    }
}

#[async_trait]
impl VectorSearch for SqliteStore {
    async fn search(
        &self,
        table: &str,
        query: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<Row>, StorageError> {
        if !VECTOR_TABLES.contains(&table) {
            return Err(StorageError::UnsupportedTable(table.to_string()));
        }
        let rows = self
            .execute(&format!("SELECT * FROM {table} WHERE embedding IS NOT NULL"), &[])
            .await?;

        let mut scored: Vec<(f32, Row)> = rows
            .into_iter()
            .filter_map(|mut row| {
                let raw = row.remove("embedding")?;
                let vector: Vec<f32> = match raw.as_str().map(serde_json::from_str) {
                    Some(Ok(v)) => v,
                    _ => {
                        warn!(table, "skipping row with malformed embedding");
                        return None;
                    }
                };
                let sim = cosine_similarity(query, &vector);
                (sim >= threshold).then_some((sim, row))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(sim, mut row)| {
                row.insert("similarity".to_string(), Value::from(sim as f64));
                row
            })
            .collect())
    }
}

#[async_trait]
impl DocumentSink for SqliteStore {
    async fn insert_document_chunk(&self, chunk: &DocumentChunk) -> Result<i64, StorageError> {
        let embedding = chunk
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO documents (url, title, chunk_text, chunk_index, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                chunk.url,
                chunk.title,
                chunk.chunk_text,
                chunk.chunk_index as i64,
                embedding,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

#[async_trait]
impl RoleSource for SqliteStore {
    async fn load_roles(&self) -> Result<Vec<RoleTemplate>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT role_name, domain, specific_instructions, background_context, few_shot_examples
                 FROM llm_roles WHERE is_active = 1 ORDER BY role_id",
            )?;
            let roles = stmt
                .query_map([], |row| {
                    Ok(RoleTemplate {
                        name: row.get(0)?,
                        domain: row.get(1)?,
                        instructions: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        background_context: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        few_shot_examples: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(roles)
        })
        .await
    }
}

#[async_trait]
impl CommandSink for SqliteStore {
    async fn apply(&self, command: &WriteCommand) -> Result<CommandOutcome, StorageError> {
        // 解析 first/latest 与随后的写入是两条独立语句
        let experience_id = match command {
            WriteCommand::InsertSkill { experience, .. } => {
                Some(self.resolve_experience(experience).await?)
            }
            _ => None,
        };

        let conn = self.conn.lock().await;
        let affected = match command {
            WriteCommand::InsertSkill {
                name,
                skill_type,
                level,
                ..
            } => conn.execute(
                "INSERT INTO skills (experience_id, name, type, level) VALUES (?1, ?2, ?3, ?4)",
                params![experience_id, name, skill_type, level],
            )?,
            WriteCommand::InsertInstitution {
                name,
                inst_type,
                city,
                state,
            } => conn.execute(
                "INSERT INTO institutions (name, type, city, state) VALUES (?1, ?2, ?3, ?4)",
                params![name, inst_type, city, state],
            )?,
            WriteCommand::InsertExperience {
                position_id,
                name,
                description,
                start_date,
                end_date,
            } => conn.execute(
                "INSERT INTO experiences (position_id, name, description, start_date, end_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![position_id, name, description, start_date, end_date],
            )?,
            WriteCommand::UpdateSkillLevel { skill_id, level } => conn.execute(
                "UPDATE skills SET level = ?1, embedding = NULL WHERE skill_id = ?2",
                params![level, skill_id],
            )?,
            WriteCommand::DeleteSkill { skill_id } => {
                conn.execute("DELETE FROM skills WHERE skill_id = ?1", params![skill_id])?
            }
        };

        let last_insert_id = command.is_insert().then(|| conn.last_insert_rowid());
        info!(command = command.name(), affected, "write command applied");
        Ok(CommandOutcome {
            affected,
            last_insert_id,
        })
    }
}

fn to_sql_value(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn value_ref_to_json(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

fn value_ref_to_text(v: ValueRef<'_>) -> Option<String> {
    match v {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::HashingEmbedder;
    use serde_json::json;

    fn row(v: Value) -> Row {
        v.as_object().unwrap().clone()
    }

    async fn seeded() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store
            .insert_row("institutions", &row(json!({"name": "Michigan State University", "type": "University"})))
            .await
            .unwrap();
        store
            .insert_row("positions", &row(json!({"inst_id": 1, "title": "Research Assistant"})))
            .await
            .unwrap();
        store
            .insert_row(
                "experiences",
                &row(json!({"position_id": 1, "name": "NLP Lab", "start_date": "2021-01-01"})),
            )
            .await
            .unwrap();
        store
            .insert_row(
                "experiences",
                &row(json!({"position_id": 1, "name": "Vision Lab", "start_date": "2023-06-01"})),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_execute_read_and_write() {
        let store = seeded().await;
        let rows = store
            .execute("SELECT name FROM institutions WHERE inst_id = ?1", &[json!(1)])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Michigan State University");

        let none = store
            .execute("UPDATE institutions SET city = 'East Lansing'", &[])
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_execute_bad_sql_is_error() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.execute("SELECT * FROM nope", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_vector_search_threshold_and_order() {
        let store = seeded().await;
        let embedder = HashingEmbedder::default();
        let n = store.backfill_embeddings("experiences", &embedder).await.unwrap();
        assert_eq!(n, 2);

        let q = embedder.embed_text("NLP Lab").unwrap();
        let rows = store.search("experiences", &q, 5, 0.8).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "NLP Lab");
        assert!(rows[0]["similarity"].as_f64().unwrap() >= 0.8);
        assert!(!rows[0].contains_key("embedding"));
    }

    #[tokio::test]
    async fn test_vector_search_rejects_unknown_table() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store.search("llm_roles", &[1.0], 5, 0.0).await.unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedTable(_)));
    }

    #[tokio::test]
    async fn test_insert_row_rejects_bad_identifier() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store
            .insert_row("skills", &row(json!({"name; DROP TABLE skills": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidIdentifier(_)));
    }

    #[tokio::test]
    async fn test_apply_insert_skill_first_and_latest() {
        let store = seeded().await;
        store
            .apply(&WriteCommand::InsertSkill {
                experience: ExperienceRef::First,
                name: "Python".into(),
                skill_type: Some("Technical".into()),
                level: None,
            })
            .await
            .unwrap();
        store
            .apply(&WriteCommand::InsertSkill {
                experience: ExperienceRef::Latest,
                name: "PyTorch".into(),
                skill_type: None,
                level: None,
            })
            .await
            .unwrap();
        let rows = store
            .execute("SELECT experience_id, name FROM skills ORDER BY skill_id", &[])
            .await
            .unwrap();
        assert_eq!(rows[0]["experience_id"], 1);
        assert_eq!(rows[1]["experience_id"], 2);
    }

    #[tokio::test]
    async fn test_apply_first_without_experiences_is_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store
            .apply(&WriteCommand::InsertSkill {
                experience: ExperienceRef::First,
                name: "Go".into(),
                skill_type: None,
                level: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_load_roles_only_active() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .insert_row("llm_roles", &row(json!({"role_name": "Content Expert", "domain": "pages"})))
            .await
            .unwrap();
        store
            .insert_row(
                "llm_roles",
                &row(json!({"role_name": "Old", "domain": "x", "is_active": 0})),
            )
            .await
            .unwrap();
        let roles = store.load_roles().await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name, "Content Expert");
        assert_eq!(roles[0].instructions, "");
    }

    #[tokio::test]
    async fn test_document_chunk_without_embedding_is_stored() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .insert_document_chunk(&DocumentChunk {
                url: "https://example.com".into(),
                title: "Example".into(),
                chunk_text: "hello world".into(),
                chunk_index: 0,
                embedding: None,
            })
            .await
            .unwrap();
        let rows = store
            .execute("SELECT embedding FROM documents", &[])
            .await
            .unwrap();
        assert_eq!(rows[0]["embedding"], Value::Null);
    }
}
