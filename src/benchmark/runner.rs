//! 基准套件执行
//!
//! 每条用例以全新状态（无历史、无挂起确认）经 `ChatService::handle_request` 执行，
//! 计时、比对后追加写入结果表；单条结果写入失败只记日志，不中断套件。

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::core::{AgentError, ChatService};
use crate::storage::SqliteStore;

use super::evaluator::evaluate;
use super::metrics::BenchmarkMetrics;
use super::types::{BenchmarkResult, BenchmarkTestCase, StoredResult};

/// 汇总统计回看的最近结果条数
pub const SUMMARY_WINDOW: usize = 100;

/// 一次套件执行的报告
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub category: Option<String>,
    pub results: Vec<BenchmarkResult>,
    pub metrics: BenchmarkMetrics,
}

pub struct BenchmarkRunner {
    service: ChatService,
    store: Arc<SqliteStore>,
}

impl BenchmarkRunner {
    pub fn new(service: ChatService) -> Self {
        let store = service.components().store.clone();
        Self { service, store }
    }

    /// 执行某类别（None 为全部）的启用用例
    pub async fn run_suite(&self, category: Option<&str>) -> Result<SuiteReport, AgentError> {
        let cases = self.store.load_test_cases(category, true).await?;
        tracing::info!(count = cases.len(), category = ?category, "benchmark suite started");

        let mut results = Vec::with_capacity(cases.len());
        for case in &cases {
            let result = self.run_case(case).await;
            if let Err(e) = self.store.store_result(&result).await {
                tracing::warn!(test_id = case.test_id, error = %e, "failed to store benchmark result");
            }
            results.push(result);
        }

        let metrics = BenchmarkMetrics::from_results(&results);
        tracing::info!(
            total = metrics.total_tests,
            passed = metrics.passed_tests,
            success_rate = metrics.success_rate,
            "benchmark suite finished"
        );
        Ok(SuiteReport {
            category: category.map(str::to_string),
            results,
            metrics,
        })
    }

    /// 历史汇总：最近 [`SUMMARY_WINDOW`] 条已落库结果
    pub async fn summary(&self, category: Option<&str>) -> Result<BenchmarkMetrics, AgentError> {
        Ok(self.store.benchmark_summary(category, SUMMARY_WINDOW).await?)
    }

    pub async fn recent_results(&self, limit: usize) -> Result<Vec<StoredResult>, AgentError> {
        Ok(self.store.recent_results(limit).await?)
    }

    /// 执行单条用例，不写入存储
    pub async fn run_case(&self, case: &BenchmarkTestCase) -> BenchmarkResult {
        let start = Instant::now();
        let response = self
            .service
            .handle_request(&case.input_message, case.page_context.as_ref(), &[])
            .await;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        let eval = evaluate(&response.response, &case.expected_output, &case.comparison_type);
        tracing::info!(
            test_id = case.test_id,
            passed = eval.passed,
            duration_ms = execution_time_ms,
            "benchmark case finished"
        );

        BenchmarkResult {
            test_id: case.test_id,
            actual_response: response.response,
            expected: case.expected_output.clone(),
            passed: eval.passed,
            execution_time_ms,
            error: eval.error,
            metadata: serde_json::json!({
                "category": case.category,
                "comparison_type": case.comparison_type,
                "iterations": response.iterations,
            }),
        }
    }
}
