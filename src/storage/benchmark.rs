//! 基准测试表的读写：用例只读加载，结果追加写入

use rusqlite::params;

use crate::benchmark::{BenchmarkMetrics, BenchmarkResult, BenchmarkTestCase, StoredResult};
use crate::core::PageContext;
use crate::storage::{SqliteStore, StorageError};

impl SqliteStore {
    /// 加载测试用例；category 为 None 时加载全部类别
    pub async fn load_test_cases(
        &self,
        category: Option<&str>,
        active_only: bool,
    ) -> Result<Vec<BenchmarkTestCase>, StorageError> {
        self.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT test_id, input_message, page_context, expected_output, comparison_type, category, is_active
                 FROM benchmark_test_cases WHERE 1=1",
            );
            if active_only {
                sql.push_str(" AND is_active = 1");
            }
            if category.is_some() {
                sql.push_str(" AND category = ?1");
            }
            sql.push_str(" ORDER BY test_id");

            let mut stmt = conn.prepare(&sql)?;
            let cases = match category {
                Some(c) => stmt.query_map(params![c], row_to_case)?.collect::<Result<Vec<_>, _>>()?,
                None => stmt.query_map([], row_to_case)?.collect::<Result<Vec<_>, _>>()?,
            };
            Ok(cases)
        })
        .await
    }

    pub async fn insert_test_case(&self, case: &BenchmarkTestCase) -> Result<i64, StorageError> {
        let page_context = case
            .page_context
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO benchmark_test_cases
                 (input_message, page_context, expected_output, comparison_type, category, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    case.input_message,
                    page_context,
                    case.expected_output,
                    case.comparison_type,
                    case.category,
                    case.is_active,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// 追加一条结果记录
    pub async fn store_result(&self, result: &BenchmarkResult) -> Result<i64, StorageError> {
        let metadata = serde_json::to_string(&result.metadata)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO benchmark_results
                 (test_id, agent_response, expected_response, passed, execution_time_ms,
                  error_message, metadata, execution_timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    result.test_id,
                    result.actual_response,
                    result.expected,
                    result.passed,
                    result.execution_time_ms as i64,
                    result.error,
                    metadata,
                    chrono::Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// 最近 `limit` 条结果，按执行时间倒序
    pub async fn recent_results(&self, limit: usize) -> Result<Vec<StoredResult>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT br.result_id, br.test_id, btc.category, br.execution_timestamp,
                        br.passed, br.execution_time_ms, br.error_message
                 FROM benchmark_results br
                 JOIN benchmark_test_cases btc ON br.test_id = btc.test_id
                 ORDER BY br.execution_timestamp DESC, br.result_id DESC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    let ms: i64 = row.get(5)?;
                    Ok(StoredResult {
                        result_id: row.get(0)?,
                        test_id: row.get(1)?,
                        category: row.get(2)?,
                        execution_timestamp: row.get(3)?,
                        passed: row.get(4)?,
                        execution_time_ms: ms.max(0) as u64,
                        error: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// 基于最近 `limit` 条已落库结果的汇总指标；category 按用例类别过滤
    pub async fn benchmark_summary(
        &self,
        category: Option<&str>,
        limit: usize,
    ) -> Result<BenchmarkMetrics, StorageError> {
        let results = self
            .with_conn(|conn| {
                let mut sql = String::from(
                    "SELECT br.test_id, btc.category, br.agent_response, br.expected_response,
                            br.passed, br.execution_time_ms, br.error_message
                     FROM benchmark_results br
                     JOIN benchmark_test_cases btc ON br.test_id = btc.test_id",
                );
                if category.is_some() {
                    sql.push_str(" WHERE btc.category = ?2");
                }
                sql.push_str(" ORDER BY br.execution_timestamp DESC, br.result_id DESC LIMIT ?1");

                let mut stmt = conn.prepare(&sql)?;
                let results = match category {
                    Some(c) => stmt
                        .query_map(params![limit as i64, c], row_to_result)?
                        .collect::<Result<Vec<_>, _>>()?,
                    None => stmt
                        .query_map(params![limit as i64], row_to_result)?
                        .collect::<Result<Vec<_>, _>>()?,
                };
                Ok(results)
            })
            .await?;
        Ok(BenchmarkMetrics::from_results(&results))
    }
}

fn row_to_result(row: &rusqlite::Row<'_>) -> rusqlite::Result<BenchmarkResult> {
    let category: String = row.get(1)?;
    let ms: i64 = row.get(5)?;
    Ok(BenchmarkResult {
        test_id: row.get(0)?,
        actual_response: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        expected: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        passed: row.get(4)?,
        execution_time_ms: ms.max(0) as u64,
        error: row.get(6)?,
        metadata: serde_json::json!({ "category": category }),
    })
}

fn row_to_case(row: &rusqlite::Row<'_>) -> rusqlite::Result<BenchmarkTestCase> {
    let page_context: Option<String> = row.get(2)?;
    Ok(BenchmarkTestCase {
        test_id: row.get(0)?,
        input_message: row.get(1)?,
        page_context: page_context.and_then(|s| serde_json::from_str::<PageContext>(&s).ok()),
        expected_output: row.get(3)?,
        comparison_type: row.get(4)?,
        category: row.get(5)?,
        is_active: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StructuredQuery;

    fn case(msg: &str, category: &str, active: bool) -> BenchmarkTestCase {
        BenchmarkTestCase {
            test_id: 0,
            input_message: msg.into(),
            page_context: None,
            expected_output: "x".into(),
            comparison_type: "contains_text".into(),
            category: category.into(),
            is_active: active,
        }
    }

    #[tokio::test]
    async fn test_load_filters_category_and_active() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_test_case(&case("a", "skills", true)).await.unwrap();
        store.insert_test_case(&case("b", "skills", false)).await.unwrap();
        store.insert_test_case(&case("c", "education", true)).await.unwrap();

        assert_eq!(store.load_test_cases(None, true).await.unwrap().len(), 2);
        assert_eq!(store.load_test_cases(None, false).await.unwrap().len(), 3);
        let skills = store.load_test_cases(Some("skills"), true).await.unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].input_message, "a");
    }

    #[tokio::test]
    async fn test_page_context_round_trips() {
        let store = SqliteStore::in_memory().unwrap();
        let mut c = case("what is here", "content", true);
        c.page_context = Some(PageContext {
            title: "Resume".into(),
            url: "/resume".into(),
            content: "Education: MSU".into(),
        });
        store.insert_test_case(&c).await.unwrap();
        let loaded = store.load_test_cases(None, true).await.unwrap();
        assert_eq!(loaded[0].page_context.as_ref().unwrap().title, "Resume");
    }

    #[tokio::test]
    async fn test_store_result() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.insert_test_case(&case("a", "skills", true)).await.unwrap();
        store
            .store_result(&BenchmarkResult {
                test_id: id,
                actual_response: "resp".into(),
                expected: "x".into(),
                passed: false,
                execution_time_ms: 12,
                error: Some("Expected text not found in response".into()),
                metadata: serde_json::json!({"category": "skills"}),
            })
            .await
            .unwrap();
        let rows = store
            .execute("SELECT passed, execution_time_ms FROM benchmark_results", &[])
            .await
            .unwrap();
        assert_eq!(rows[0]["passed"], 0);
        assert_eq!(rows[0]["execution_time_ms"], 12);
    }

    fn outcome(test_id: i64, passed: bool, ms: u64) -> BenchmarkResult {
        BenchmarkResult {
            test_id,
            actual_response: "resp".into(),
            expected: "x".into(),
            passed,
            execution_time_ms: ms,
            error: (!passed).then(|| "Expected text not found in response".to_string()),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_summary_and_recent_results() {
        let store = SqliteStore::in_memory().unwrap();
        let skills = store.insert_test_case(&case("a", "skills", true)).await.unwrap();
        let education = store.insert_test_case(&case("b", "education", true)).await.unwrap();
        store.store_result(&outcome(skills, true, 10)).await.unwrap();
        store.store_result(&outcome(skills, false, 20)).await.unwrap();
        store.store_result(&outcome(education, true, 30)).await.unwrap();

        let all = store.benchmark_summary(None, 100).await.unwrap();
        assert_eq!(all.total_tests, 3);
        assert_eq!(all.passed_tests, 2);
        assert_eq!(all.failed_tests, 1);
        assert_eq!(all.success_rate, 66.67);
        assert_eq!(all.avg_execution_time_ms, 20.0);
        assert_eq!(all.by_category["skills"].total, 2);
        assert_eq!(all.by_category["education"].success_rate, 100.0);

        let only_skills = store.benchmark_summary(Some("skills"), 100).await.unwrap();
        assert_eq!(only_skills.total_tests, 2);
        assert_eq!(only_skills.success_rate, 50.0);
        assert!(!only_skills.by_category.contains_key("education"));

        let recent = store.recent_results(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].category, "education");
        assert_eq!(recent[1].error.as_deref(), Some("Expected text not found in response"));
        assert!(recent[0].result_id > recent[1].result_id);
    }

    #[tokio::test]
    async fn test_summary_without_results_is_zeroed() {
        let store = SqliteStore::in_memory().unwrap();
        let m = store.benchmark_summary(Some("skills"), 100).await.unwrap();
        assert_eq!(m, BenchmarkMetrics::default());
        assert!(store.recent_results(20).await.unwrap().is_empty());
    }
}
