//! 编排器输出解析：提取 `handle_ai_chat_request(role=..., message=...)` 调用序列
//!
//! 模型输出常混用单双引号，不能可靠地整体解析，所以先按固定调用签名逐个匹配；
//! 一个也没匹配到时，再尝试把输出中的列表字面量当 JSON 解析。

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::react::parser::extract_balanced;

static CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"handle_ai_chat_request\s*\(").unwrap());
static ROLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)\brole\s*=\s*(?:"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)')"#).unwrap()
});
static MESSAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)\bmessage\s*=\s*(?:"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)')"#).unwrap()
});
static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)'"#).unwrap());

/// 一次专家调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpertCall {
    pub role: String,
    pub message: String,
}

/// 解析编排器输出；空结果表示格式无效
pub fn parse_plan(output: &str) -> Vec<ExpertCall> {
    let calls = parse_call_signatures(output);
    if !calls.is_empty() {
        return calls;
    }
    parse_literal_list(output)
}

fn parse_call_signatures(output: &str) -> Vec<ExpertCall> {
    let mut calls = Vec::new();
    for m in CALL_RE.find_iter(output) {
        let Some(args) = extract_balanced(output, m.end() - 1) else {
            continue;
        };
        let role = capture_quoted(&ROLE_RE, args);
        let message = capture_quoted(&MESSAGE_RE, args);
        let call = match (role, message) {
            (Some(role), Some(message)) => Some((role, message)),
            _ => positional_pair(args),
        };
        if let Some((role, message)) = call {
            if !role.trim().is_empty() {
                calls.push(ExpertCall {
                    role: role.trim().to_string(),
                    message: message.trim().to_string(),
                });
            }
        }
    }
    calls
}

fn capture_quoted(re: &Regex, text: &str) -> Option<String> {
    let caps = re.captures(text)?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| unescape(m.as_str()))
}

/// `handle_ai_chat_request("Role", "message")`
fn positional_pair(args: &str) -> Option<(String, String)> {
    let mut quoted = QUOTED_RE.captures_iter(args).filter_map(|c| {
        c.get(1).or_else(|| c.get(2)).map(|m| unescape(m.as_str()))
    });
    Some((quoted.next()?, quoted.next()?))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// 列表字面量：`[{"role": .., "message": ..}, ..]` 或 `[["role", "message"], ..]`
fn parse_literal_list(output: &str) -> Vec<ExpertCall> {
    let Some(open) = output.find('[') else {
        return Vec::new();
    };
    let Some(inner) = extract_balanced(output, open) else {
        return Vec::new();
    };
    let literal = format!("[{inner}]");
    let parsed = serde_json::from_str::<Value>(&literal)
        .or_else(|_| serde_json::from_str::<Value>(&literal.replace('\'', "\"")));
    let Ok(Value::Array(items)) = parsed else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let (role, message) = match item {
                Value::Object(map) => (
                    map.get("role")?.as_str()?,
                    map.get("message")?.as_str()?,
                ),
                Value::Array(pair) if pair.len() == 2 => (pair[0].as_str()?, pair[1].as_str()?),
                _ => return None,
            };
            Some(ExpertCall {
                role: role.trim().to_string(),
                message: message.trim().to_string(),
            })
        })
        .collect()
}
