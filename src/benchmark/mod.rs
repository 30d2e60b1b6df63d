//! 基准评测：用例加载、逐条执行、结果比对与汇总指标
//!
//! 用例只读，结果追加写入 `benchmark_results`，以 test_id 关联。

pub mod evaluator;
pub mod metrics;
pub mod runner;
pub mod types;

pub use evaluator::{evaluate, Evaluation};
pub use metrics::{BenchmarkMetrics, CategoryMetrics};
pub use runner::{BenchmarkRunner, SuiteReport, SUMMARY_WINDOW};
pub use types::{BenchmarkResult, BenchmarkTestCase, ComparisonType, StoredResult};
