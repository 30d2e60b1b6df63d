//! 基准用例与结果

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::PageContext;

/// 一条测试用例（来自 benchmark_test_cases）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkTestCase {
    pub test_id: i64,
    pub input_message: String,
    pub page_context: Option<PageContext>,
    pub expected_output: String,
    /// 比对方式，见 [`ComparisonType`]；保留原始字符串以便报告未知类型
    pub comparison_type: String,
    pub category: String,
    pub is_active: bool,
}

/// 一条执行结果（写入 benchmark_results）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub test_id: i64,
    pub actual_response: String,
    pub expected: String,
    pub passed: bool,
    pub execution_time_ms: u64,
    pub error: Option<String>,
    pub metadata: serde_json::Value,
}

impl BenchmarkResult {
    /// metadata 中记录的类别
    pub fn category(&self) -> &str {
        self.metadata
            .get("category")
            .and_then(|v| v.as_str())
            .unwrap_or("uncategorized")
    }
}

/// 已落库的结果摘要，附带用例类别与执行时间戳
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredResult {
    pub result_id: i64,
    pub test_id: i64,
    pub category: String,
    pub execution_timestamp: String,
    pub passed: bool,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonType {
    /// 不区分大小写的子串包含
    ContainsText,
    /// 去首尾空白、不区分大小写的完全相等
    ExactMatch,
    /// 回复中出现任一 SQL 关键字
    SqlResult,
}

impl ComparisonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonType::ContainsText => "contains_text",
            ComparisonType::ExactMatch => "exact_match",
            ComparisonType::SqlResult => "sql_result",
        }
    }
}

impl fmt::Display for ComparisonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparisonType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "contains_text" => Ok(ComparisonType::ContainsText),
            "exact_match" => Ok(ComparisonType::ExactMatch),
            "sql_result" => Ok(ComparisonType::SqlResult),
            other => Err(format!("Unknown comparison type: {other}")),
        }
    }
}
