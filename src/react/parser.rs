//! 动作解析：把模型的自由文本解析为单个工具动作或最终答案
//!
//! 1. `Final Answer:`（大小写不敏感）优先于任何 `Action:` 行
//! 2. `Action: <name>`，name 必须是已知工具
//! 3. 参数载荷依次尝试：`Action Input:` 行 → `name[...]` → `name(...)` → `Parameters: {...}`
//! 4. 各工具再做字段级解析；解析不出时返回 ParseFailure（携带纠正性 Observation），不做默认值替换

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::AgentError;
use crate::tools::{CRAWL_WEB, KNOWN_TOOLS, SEMANTIC_SEARCH, SQL_QUERY};

pub const NO_ACTION_OBSERVATION: &str = "No valid action found. Please specify an Action.";

static FINAL_ANSWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)final\s+answer\s*:").unwrap());
static ACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bAction\s*:\s*([A-Za-z_]+)").unwrap());
static ACTION_INPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\bAction\s+Input\s*:\s*(.+?)(?:\n\s*Thought\s*:|\n\s*Action\s*:|\z)").unwrap()
});
static PARAMETERS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bParameters\s*:\s*\{").unwrap());
static TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)['"]?\btable['"]?\s*[:=]\s*['"]?([A-Za-z_]\w*)"#).unwrap()
});
static QUERY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)['"]?\bquery['"]?\s*[:=]\s*(?:"([^"]*)"|'([^']*)'|([^\)\]\}\n]+))"#).unwrap()
});
/// 未加引号的 query 值止于下一个 `, key=` / `, key:`
static NEXT_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#",\s*['"]?[A-Za-z_]\w*['"]?\s*[:=]"#).unwrap());
static SQL_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)^['"]?sql['"]?\s*[:=]\s*"#).unwrap());
static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```(?:sql)?\s*(.*?)\s*```").unwrap());
static URL_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)['"]?\burl['"]?\s*[:=]\s*['"]?([^'"\s,\)\]\}]+)"#).unwrap()
});
static BARE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s'"\)\]\}>]+"#).unwrap());

/// 模型输出解析出的动作
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SemanticSearch { table: String, query: String },
    StructuredQuery { query: String },
    CrawlWeb { url: String },
    FinalAnswer { text: String },
}

impl Action {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::FinalAnswer { .. })
    }

    /// 工具名与 JSON 参数；最终答案返回 None
    pub fn tool_call(&self) -> Option<(&'static str, Value)> {
        match self {
            Self::SemanticSearch { table, query } => {
                Some((SEMANTIC_SEARCH, json!({ "table": table, "query": query })))
            }
            Self::StructuredQuery { query } => Some((SQL_QUERY, json!({ "sql": query }))),
            Self::CrawlWeb { url } => Some((CRAWL_WEB, json!({ "url": url }))),
            Self::FinalAnswer { .. } => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SemanticSearch { table, query } => {
                write!(f, "semantic_search(table={table:?}, query={query:?})")
            }
            Self::StructuredQuery { query } => write!(f, "sql_query({query:?})"),
            Self::CrawlWeb { url } => write!(f, "crawl_web(url={url:?})"),
            Self::FinalAnswer { text } => write!(f, "final_answer({text:?})"),
        }
    }
}

/// 解析失败：reason 用于日志，observation 回灌给模型
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason}")]
pub struct ParseFailure {
    pub reason: String,
    pub observation: String,
}

impl ParseFailure {
    fn new(reason: impl Into<String>, observation: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            observation: observation.into(),
        }
    }

    fn unknown_tool(name: &str) -> Self {
        Self::new(
            format!("unknown action '{name}'"),
            format!(
                "Error: Unknown action '{name}'. Available: {}",
                KNOWN_TOOLS.join(", ")
            ),
        )
    }
}

impl From<ParseFailure> for AgentError {
    fn from(p: ParseFailure) -> Self {
        AgentError::ParseFailure {
            reason: p.reason,
            observation: p.observation,
        }
    }
}

/// 解析模型输出
pub fn parse_action(output: &str) -> Result<Action, ParseFailure> {
    if let Some(m) = FINAL_ANSWER_RE.find(output) {
        let text = output[m.end()..].trim();
        if text.is_empty() {
            return Err(ParseFailure::new(
                "empty final answer",
                "Error: Your Final Answer was empty. Write the answer after 'Final Answer:'.",
            ));
        }
        return Ok(Action::FinalAnswer {
            text: text.to_string(),
        });
    }

    let Some(caps) = ACTION_RE.captures(output) else {
        return Err(ParseFailure::new("no action marker", NO_ACTION_OBSERVATION));
    };
    let name = caps[1].to_lowercase();
    let name_end = caps.get(1).map(|m| m.end()).unwrap_or(0);
    let payload = extract_payload(output, name_end).unwrap_or_default();

    match name.as_str() {
        SEMANTIC_SEARCH => parse_semantic_search(&payload, output),
        SQL_QUERY => parse_sql(&payload),
        CRAWL_WEB => parse_crawl(&payload),
        other => Err(ParseFailure::unknown_tool(other)),
    }
}

/// 依次尝试四种载荷格式
fn extract_payload(output: &str, name_end: usize) -> Option<String> {
    if let Some(c) = ACTION_INPUT_RE.captures(output) {
        let input = c[1].trim();
        if !input.is_empty() {
            return Some(input.to_string());
        }
    }

    let after_name = &output[name_end..];
    let offset = after_name.len() - after_name.trim_start().len();
    let open_idx = name_end + offset;
    for open in ['[', '('] {
        if output[open_idx..].starts_with(open) {
            if let Some(inner) = extract_balanced(output, open_idx) {
                return Some(inner.trim().to_string());
            }
        }
    }

    let m = PARAMETERS_RE.find(output)?;
    extract_balanced(output, m.end() - 1).map(|s| s.trim().to_string())
}

/// 从 `open_idx` 处的开括号取出匹配括号之间的内容；引号内的括号不计数。
/// 引号不配对时退回忽略引号再扫一次。
pub(crate) fn extract_balanced(text: &str, open_idx: usize) -> Option<&str> {
    scan_balanced(text, open_idx, true).or_else(|| scan_balanced(text, open_idx, false))
}

fn scan_balanced(text: &str, open_idx: usize, honor_quotes: bool) -> Option<&str> {
    let open = text[open_idx..].chars().next()?;
    let close = match open {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        _ => return None,
    };
    let start = open_idx + open.len_utf8();
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' if honor_quotes => quote = Some(c),
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_semantic_search(payload: &str, full: &str) -> Result<Action, ParseFailure> {
    let table = find_table(payload).or_else(|| find_table(full));
    let query = find_query(payload).or_else(|| find_query(full));
    match (table, query) {
        (Some(table), Some(query)) => Ok(Action::SemanticSearch { table, query }),
        (table, query) => {
            let missing = match (table, query) {
                (None, None) => "table and query",
                (None, _) => "table",
                _ => "query",
            };
            Err(ParseFailure::new(
                format!("semantic_search missing {missing}"),
                format!(
                    "Error: Could not parse the {missing} for semantic_search. \
                     Use: Action: semantic_search(table=\"skills\", query=\"machine learning\")"
                ),
            ))
        }
    }
}

fn find_table(text: &str) -> Option<String> {
    TABLE_RE
        .captures(text)
        .map(|c| c[1].to_lowercase())
}

fn find_query(text: &str) -> Option<String> {
    let caps = QUERY_RE.captures(text)?;
    let value = match (caps.get(1).or_else(|| caps.get(2)), caps.get(3)) {
        (Some(quoted), _) => quoted.as_str(),
        (None, Some(bare)) => {
            let bare = bare.as_str();
            NEXT_KEY_RE.find(bare).map_or(bare, |m| &bare[..m.start()])
        }
        (None, None) => return None,
    };
    let value = strip_quotes(value);
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_sql(payload: &str) -> Result<Action, ParseFailure> {
    let mut sql = payload.trim().to_string();
    if let Some(c) = FENCE_RE.captures(&sql) {
        sql = c[1].to_string();
    }
    if sql.starts_with('{') {
        if let Ok(v) = serde_json::from_str::<Value>(&sql) {
            if let Some(s) = v.get("sql").or_else(|| v.get("query")).and_then(Value::as_str) {
                sql = s.to_string();
            }
        }
    }
    let sql = strip_quotes(&sql);
    let sql = SQL_PREFIX_RE.replace(sql, "");
    let sql = strip_quotes(&sql).trim();

    if sql.is_empty() {
        return Err(ParseFailure::new(
            "sql_query missing SQL",
            "Error: No SQL provided for sql_query action.",
        ));
    }
    Ok(Action::StructuredQuery {
        query: sql.to_string(),
    })
}

/// 去掉一层首尾成对的引号；内部的字符串字面量保持不变
fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return s[1..s.len() - 1].trim();
        }
    }
    s
}

fn parse_crawl(payload: &str) -> Result<Action, ParseFailure> {
    let url = URL_FIELD_RE
        .captures(payload)
        .map(|c| c[1].to_string())
        .or_else(|| BARE_URL_RE.find(payload).map(|m| m.as_str().to_string()));
    match url {
        Some(url) => Ok(Action::CrawlWeb { url }),
        None => Err(ParseFailure::new(
            "crawl_web missing url",
            "Error: No URL provided for crawl_web action.",
        )),
    }
}
