//! 汇总指标

use std::collections::BTreeMap;

use serde::Serialize;

use super::types::BenchmarkResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryMetrics {
    pub total: usize,
    pub passed: usize,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BenchmarkMetrics {
    pub total_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    /// 百分比，保留两位小数
    pub success_rate: f64,
    pub avg_execution_time_ms: f64,
    pub by_category: BTreeMap<String, CategoryMetrics>,
}

impl BenchmarkMetrics {
    pub fn from_results(results: &[BenchmarkResult]) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        let total_ms: u64 = results.iter().map(|r| r.execution_time_ms).sum();

        let mut by_category: BTreeMap<String, CategoryMetrics> = BTreeMap::new();
        for r in results {
            let entry = by_category.entry(r.category().to_string()).or_default();
            entry.total += 1;
            if r.passed {
                entry.passed += 1;
            }
        }
        for m in by_category.values_mut() {
            m.success_rate = percent(m.passed, m.total);
        }

        Self {
            total_tests: total,
            passed_tests: passed,
            failed_tests: total - passed,
            success_rate: percent(passed, total),
            avg_execution_time_ms: if total == 0 {
                0.0
            } else {
                round2(total_ms as f64 / total as f64)
            },
            by_category,
        }
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(part as f64 * 100.0 / total as f64)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
