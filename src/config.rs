//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `RESUME__*` 覆盖（双下划线表示嵌套，如 `RESUME__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::risk::{DEFAULT_AFFIRMATIVE, DEFAULT_NEGATIVE, DEFAULT_RISK_KEYWORDS};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub database: DatabaseSection,
    pub react: ReactSection,
    pub tools: ToolsSection,
    pub risk: RiskSection,
}

/// 编排模式：逐步 ReAct 或一次性计划再执行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationMode {
    #[default]
    React,
    PlanExecute,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub mode: OrchestrationMode,
    /// 对话历史保留的交换数（一问一答为 1）
    pub max_history_turns: usize,
    pub session_dir: PathBuf,
    /// 可选：覆盖内置角色模板的 TOML 文件
    pub roles_path: Option<PathBuf>,
    /// 广播房间名
    pub room: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "resume-agent".to_string(),
            mode: OrchestrationMode::React,
            max_history_turns: 1,
            session_dir: PathBuf::from("sessions"),
            roles_path: None,
            room: "main".to_string(),
        }
    }
}

/// [llm] 段：后端选择、采样参数与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：groq / openai / mock
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            model: None,
            base_url: None,
            temperature: 0.7,
            max_tokens: 4000,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [embedding] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    /// openai / hashing
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// hashing 嵌入的维度
    pub dimensions: usize,
    /// 限流时最多重试次数
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-ada-002".to_string(),
            base_url: None,
            dimensions: 256,
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

/// [database] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("resume.db"),
        }
    }
}

/// [react] 段：循环上限、检索参数、答案校验规则
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReactSection {
    pub max_iterations: usize,
    pub similarity_threshold: f32,
    pub result_limit: usize,
    /// 成功答案后附加已执行操作列表
    pub append_trace: bool,
    pub require_tool_before_answer: bool,
    /// 视为模板占位符的正则
    pub placeholder_patterns: Vec<String>,
}

impl Default for ReactSection {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            similarity_threshold: 0.3,
            result_limit: 5,
            append_trace: true,
            require_tool_before_answer: true,
            placeholder_patterns: crate::react::critic::DEFAULT_PLACEHOLDER_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub crawl: CrawlSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            crawl: CrawlSection::default(),
        }
    }
}

/// [tools.crawl] 段：抓取超时、分块大小、可选 LLM 清洗
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlSection {
    pub timeout_secs: u64,
    pub chunk_words: usize,
    pub clean_with_llm: bool,
    pub max_clean_chars: usize,
    pub max_body_chars: usize,
}

impl Default for CrawlSection {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            chunk_words: 800,
            clean_with_llm: false,
            max_clean_chars: 3000,
            max_body_chars: 500_000,
        }
    }
}

/// [risk] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskSection {
    pub keywords: Vec<String>,
    pub affirmative: Vec<String>,
    pub negative: Vec<String>,
}

impl Default for RiskSection {
    fn default() -> Self {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        Self {
            keywords: owned(DEFAULT_RISK_KEYWORDS),
            affirmative: owned(DEFAULT_AFFIRMATIVE),
            negative: owned(DEFAULT_NEGATIVE),
        }
    }
}

/// 从 config 目录加载配置，环境变量 RESUME__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 RESUME__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("RESUME")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.mode, OrchestrationMode::React);
        assert_eq!(cfg.app.max_history_turns, 1);
        assert_eq!(cfg.react.max_iterations, 10);
        assert_eq!(cfg.embedding.max_retries, 3);
        assert_eq!(cfg.tools.crawl.chunk_words, 800);
        assert!(cfg.risk.keywords.contains(&"truncate".to_string()));
        assert!(!cfg.react.placeholder_patterns.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_field_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [app]
            mode = "plan_execute"

            [react]
            max_iterations = 4
            "#,
        )
        .unwrap();
        assert_eq!(cfg.app.mode, OrchestrationMode::PlanExecute);
        assert_eq!(cfg.app.room, "main");
        assert_eq!(cfg.react.max_iterations, 4);
        assert_eq!(cfg.react.result_limit, 5);
        assert_eq!(cfg.llm.timeouts.request, 60);
    }
}
