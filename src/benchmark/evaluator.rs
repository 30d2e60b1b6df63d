//! 回复比对

use super::types::ComparisonType;

const SQL_KEYWORDS: &[&str] = &["SELECT", "FROM", "WHERE", "INSERT", "UPDATE", "DELETE"];

/// 比对结论：是否通过 + 失败原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub passed: bool,
    pub error: Option<String>,
}

impl Evaluation {
    fn check(passed: bool, error: impl FnOnce() -> String) -> Self {
        Self {
            passed,
            error: (!passed).then(error),
        }
    }
}

/// 按比对方式判断 actual 是否满足 expected；未知比对方式直接判失败
pub fn evaluate(actual: &str, expected: &str, comparison_type: &str) -> Evaluation {
    let kind = match comparison_type.parse::<ComparisonType>() {
        Ok(k) => k,
        Err(msg) => {
            return Evaluation {
                passed: false,
                error: Some(msg),
            }
        }
    };

    match kind {
        ComparisonType::ContainsText => Evaluation::check(
            actual.to_lowercase().contains(&expected.to_lowercase()),
            || format!("Expected text '{expected}' not found in response"),
        ),
        ComparisonType::ExactMatch => Evaluation::check(
            actual.trim().to_lowercase() == expected.trim().to_lowercase(),
            || "Response does not match expected output exactly".to_string(),
        ),
        ComparisonType::SqlResult => {
            let upper = actual.to_uppercase();
            Evaluation::check(SQL_KEYWORDS.iter().any(|k| upper.contains(k)), || {
                "Response does not contain valid SQL query".to_string()
            })
        }
    }
}
