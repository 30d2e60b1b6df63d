//! 专家调用执行
//!
//! 每个专家调用按角色模板调用一次 LLM，然后按角色类别处理输出：
//! - Database Read Expert：提取一条只读 SQL（SELECT / WITH）执行，返回记录数摘要
//! - Database Write Expert：解析白名单写命令并执行
//! - 其他角色：输出即结果（Content Expert 请求前附加页面上下文）
//!
//! 单个调用失败只记为失败结果，不会中断后续调用。

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;

use crate::core::PageContext;
use crate::llm::{complete_with_role, LlmClient, RoleKind, RoleSet};
use crate::plan::{ExpertCall, WriteCommand};
use crate::storage::{CommandSink, StructuredQuery};

/// 摘要中展示的最大行数
const SUMMARY_ROWS: usize = 5;

static SQL_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```(?:sql)?\s*(.*?)```").unwrap());
static READ_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:SELECT\b|WITH\s+(?:RECURSIVE\s+)?\w+\s*(?:\([^)]*\))?\s+AS\b)").unwrap()
});
static STRING_LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:[^']|'')*'").unwrap());
static WRITE_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(INSERT|UPDATE|DELETE|DROP|ALTER|CREATE|REPLACE|ATTACH|DETACH|PRAGMA|VACUUM)\b")
        .unwrap()
});

/// 单个专家调用的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpertResult {
    pub role: String,
    pub message: String,
    pub response: String,
    pub success: bool,
}

impl ExpertResult {
    fn ok(call: &ExpertCall, response: impl Into<String>) -> Self {
        Self {
            role: call.role.clone(),
            message: call.message.clone(),
            response: response.into(),
            success: true,
        }
    }

    fn failed(call: &ExpertCall, response: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::ok(call, response)
        }
    }
}

pub struct ExpertRunner {
    llm: Arc<dyn LlmClient>,
    query: Arc<dyn StructuredQuery>,
    commands: Arc<dyn CommandSink>,
}

impl ExpertRunner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        query: Arc<dyn StructuredQuery>,
        commands: Arc<dyn CommandSink>,
    ) -> Self {
        Self {
            llm,
            query,
            commands,
        }
    }

    pub async fn run(
        &self,
        roles: &RoleSet,
        call: &ExpertCall,
        page: Option<&PageContext>,
    ) -> ExpertResult {
        let template = roles.resolve(&call.role);
        let kind = template.kind();
        let request = match (kind, page) {
            (RoleKind::Content, Some(page)) => with_page_context(page, &call.message),
            _ => call.message.clone(),
        };

        let output = match complete_with_role(self.llm.as_ref(), &request, Some(&template)).await
        {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(role = %call.role, error = %e, "expert call failed");
                return ExpertResult::failed(call, format!("Error: {e}"));
            }
        };

        match kind {
            RoleKind::DatabaseRead => self.run_read(call, &output).await,
            RoleKind::DatabaseWrite => self.run_write(call, &output).await,
            _ => ExpertResult::ok(call, output.trim()),
        }
    }

    async fn run_read(&self, call: &ExpertCall, output: &str) -> ExpertResult {
        let Some(sql) = extract_read_only_sql(output) else {
            return ExpertResult::failed(
                call,
                "Error: no read-only SQL statement (SELECT or WITH) found in expert output",
            );
        };
        tracing::debug!(%sql, "database read expert query");
        match self.query.execute(&sql, &[]).await {
            Ok(rows) => {
                let mut summary = format!(
                    "Query executed successfully. Results: {} records found.",
                    rows.len()
                );
                for row in rows.iter().take(SUMMARY_ROWS) {
                    summary.push('\n');
                    summary.push_str(&serde_json::Value::Object(row.clone()).to_string());
                }
                ExpertResult::ok(call, summary)
            }
            Err(e) => ExpertResult::failed(call, format!("Error executing query: {e}")),
        }
    }

    async fn run_write(&self, call: &ExpertCall, output: &str) -> ExpertResult {
        let command = match WriteCommand::parse(output) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "rejected write expert output");
                return ExpertResult::failed(call, format!("Error: {e}"));
            }
        };
        match self.commands.apply(&command).await {
            Ok(outcome) => {
                let mut msg = format!(
                    "Command {} executed successfully: {} row(s) affected.",
                    command.name(),
                    outcome.affected
                );
                if let Some(id) = outcome.last_insert_id {
                    msg.push_str(&format!(" New id: {id}."));
                }
                ExpertResult::ok(call, msg)
            }
            Err(e) => ExpertResult::failed(call, format!("Error executing {}: {e}", command.name())),
        }
    }
}

/// Content Expert 的请求前缀
pub fn with_page_context(page: &PageContext, message: &str) -> String {
    format!(
        "Current page title: {}\nCurrent page URL: {}\nCurrent page content:\n{}\n\nUser request: {}",
        page.title, page.url, page.content, message
    )
}

/// 从专家输出中提取一条只读 SQL；含写关键字（字符串字面量之外）即拒绝
pub fn extract_read_only_sql(output: &str) -> Option<String> {
    let source = SQL_FENCE_RE
        .captures(output)
        .and_then(|c| c.get(1))
        .map_or(output, |m| m.as_str());
    let start = READ_START_RE.find(source)?.start();
    // 语句止于分号或空行
    let statement = source[start..]
        .split(';')
        .next()
        .and_then(|s| s.split("\n\n").next())
        .unwrap_or_default()
        .trim();
    if statement.is_empty() {
        return None;
    }
    let without_literals = STRING_LITERAL_RE.replace_all(statement, "''");
    if WRITE_KEYWORD_RE.is_match(&without_literals) {
        return None;
    }
    Some(statement.to_string())
}
