//! 工具参数 JSON Schema（schemars 自动生成）
//!
//! 参数结构体的文档注释即字段说明；describe_parameters 把 schema 压缩成一行写入 prompt。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 生成参数结构体的 JSON Schema
pub fn args_schema<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null)
}

/// 把 schema 压缩为 `name (type: description), ...`；非必填字段标注 optional
pub fn describe_parameters(schema: &Value) -> String {
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return "none".to_string();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let parts: Vec<String> = props
        .iter()
        .map(|(name, prop)| {
            let ty = prop.get("type").and_then(Value::as_str).unwrap_or("any");
            let ty = if required.contains(&name.as_str()) {
                ty.to_string()
            } else {
                format!("optional {ty}")
            };
            match prop.get("description").and_then(Value::as_str) {
                Some(desc) => format!("{name} ({ty}: {desc})"),
                None => format!("{name} ({ty})"),
            }
        })
        .collect();
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct Demo {
        /// Table name
        table: String,
        /// Text to search for
        query: String,
    }

    #[test]
    fn test_describe_parameters() {
        let s = describe_parameters(&args_schema::<Demo>());
        assert_eq!(
            s,
            "query (string: Text to search for), table (string: Table name)"
        );
    }

    #[test]
    fn test_describe_empty() {
        assert_eq!(describe_parameters(&serde_json::json!({})), "none");
    }
}
