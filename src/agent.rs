//! Agent 组件装配
//!
//! 从 AppConfig 构建 LLM、嵌入、SQLite、工具、Planner / Critic / Recovery、计划执行器与风险闸门；
//! 组件可被多个会话共享（每次请求自带 transcript，不共享可变状态）。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::a2a::A2aTracker;
use crate::broadcast::Broadcaster;
use crate::config::AppConfig;
use crate::core::risk::RiskGate;
use crate::core::{AgentError, RecoveryEngine};
use crate::crawler::WebCrawler;
use crate::llm::{
    create_embedder_from_config, create_groq_client, EmbeddingProvider, LlmClient,
    MockLlmClient, OpenAiClient, RoleRegistry, RoleSet, SamplingOptions,
};
use crate::plan::{ExpertRunner, PlanExecutor};
use crate::react::{AnswerCritic, Planner};
use crate::storage::SqliteStore;
use crate::tools::{
    CrawlWebTool, SemanticSearchTool, SqlQueryTool, ToolExecutor, ToolRegistry,
};

/// 预构建的 Agent 组件
pub struct AgentComponents {
    pub config: AppConfig,
    pub llm: Arc<dyn LlmClient>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<SqliteStore>,
    pub planner: Planner,
    pub executor: ToolExecutor,
    pub critic: AnswerCritic,
    pub recovery: RecoveryEngine,
    pub plan_executor: PlanExecutor,
    pub roles: Arc<RoleRegistry>,
    pub risk: RiskGate,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub a2a: Arc<A2aTracker>,
}

/// 根据配置与环境变量选择 LLM 后端（Groq / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let options = SamplingOptions {
        temperature: cfg.llm.temperature,
        max_tokens: cfg.llm.max_tokens,
        request_timeout: Duration::from_secs(cfg.llm.timeouts.request),
    };
    let env_key = |name: &str| std::env::var(name).ok().filter(|k| !k.is_empty());

    match cfg.llm.provider.to_lowercase().as_str() {
        "groq" if env_key("GROQ_API_KEY").is_some() => {
            let client = create_groq_client(cfg.llm.model.as_deref()).with_options(options);
            tracing::info!(model = client.model(), "using Groq LLM");
            Arc::new(client)
        }
        "openai" if env_key("OPENAI_API_KEY").is_some() => {
            let model = cfg.llm.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
            tracing::info!(%model, "using OpenAI-compatible LLM");
            Arc::new(
                OpenAiClient::new(
                    cfg.llm.base_url.as_deref(),
                    &model,
                    env_key("OPENAI_API_KEY").as_deref(),
                )
                .with_options(options),
            )
        }
        "mock" => Arc::new(MockLlmClient::default()),
        other => {
            tracing::warn!(provider = other, "no API key for provider, using mock LLM");
            Arc::new(MockLlmClient::default())
        }
    }
}

/// 内置角色，叠加可选的 roles_path 覆盖文件
pub fn load_roles(roles_path: Option<&Path>) -> Result<RoleSet, AgentError> {
    let builtin = RoleSet::builtin().map_err(|e| AgentError::Config(e.to_string()))?;
    match roles_path {
        Some(path) => {
            let overrides =
                RoleSet::from_file(path).map_err(|e| AgentError::Config(e.to_string()))?;
            Ok(builtin.layered(overrides.iter().cloned()))
        }
        None => Ok(builtin),
    }
}

/// 从配置创建组件：打开 SQLite 文件并按配置选择 LLM 与嵌入
pub fn create_agent_components(
    cfg: AppConfig,
    broadcaster: Arc<dyn Broadcaster>,
) -> Result<AgentComponents, AgentError> {
    let store = Arc::new(SqliteStore::open(&cfg.database.path)?);
    let llm = create_llm_from_config(&cfg);
    let embedder = create_embedder_from_config(&cfg.embedding);
    build_components(cfg, llm, embedder, store, broadcaster)
}

/// 用给定的 LLM / 嵌入 / 存储装配组件（测试与基准程序直接调用）
pub fn build_components(
    cfg: AppConfig,
    llm: Arc<dyn LlmClient>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<SqliteStore>,
    broadcaster: Arc<dyn Broadcaster>,
) -> Result<AgentComponents, AgentError> {
    let mut crawler = WebCrawler::new(embedder.clone(), store.clone(), cfg.tools.crawl.clone());
    if cfg.tools.crawl.clean_with_llm {
        crawler = crawler.with_cleaner(llm.clone());
    }

    let mut tools = ToolRegistry::new();
    tools.register(SemanticSearchTool::new(
        embedder.clone(),
        store.clone(),
        cfg.react.result_limit,
        cfg.react.similarity_threshold,
    ));
    tools.register(SqlQueryTool::new(store.clone()));
    let a2a = Arc::new(A2aTracker::default());
    tools.register(CrawlWebTool::new(Arc::new(crawler), a2a.clone()));
    let executor = ToolExecutor::new(tools, cfg.tools.tool_timeout_secs);

    let critic = AnswerCritic::new(
        cfg.react.placeholder_patterns.as_slice(),
        cfg.react.require_tool_before_answer,
    )
    .map_err(|e| AgentError::Config(format!("invalid placeholder pattern: {e}")))?;

    let roles = Arc::new(RoleRegistry::new(load_roles(cfg.app.roles_path.as_deref())?));
    let runner = ExpertRunner::new(llm.clone(), store.clone(), store.clone());
    let plan_executor = PlanExecutor::new(llm.clone(), runner, roles.clone())
        .with_role_source(store.clone())
        .with_broadcaster(broadcaster.clone(), cfg.app.room.clone());

    let risk = RiskGate::new(
        cfg.risk.keywords.clone(),
        cfg.risk.affirmative.clone(),
        cfg.risk.negative.clone(),
    );

    Ok(AgentComponents {
        planner: Planner::new(llm.clone(), executor.catalogue()),
        executor,
        critic,
        recovery: RecoveryEngine::new(),
        plan_executor,
        roles,
        risk,
        broadcaster,
        a2a,
        llm,
        embedder,
        store,
        config: cfg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::NoopBroadcaster;
    use crate::llm::HashingEmbedder;

    #[test]
    fn test_build_components_registers_three_tools() {
        let c = build_components(
            AppConfig::default(),
            Arc::new(MockLlmClient::default()),
            Arc::new(HashingEmbedder::default()),
            Arc::new(SqliteStore::in_memory().unwrap()),
            Arc::new(NoopBroadcaster),
        )
        .unwrap();
        assert_eq!(c.executor.tool_names(), vec!["crawl_web", "semantic_search", "sql_query"]);
        assert!(c.roles.snapshot().get("Orchestrator").is_some());
    }

    #[test]
    fn test_invalid_placeholder_pattern_is_config_error() {
        let mut cfg = AppConfig::default();
        cfg.react.placeholder_patterns = vec!["(".to_string()];
        let err = build_components(
            cfg,
            Arc::new(MockLlmClient::default()),
            Arc::new(HashingEmbedder::default()),
            Arc::new(SqliteStore::in_memory().unwrap()),
            Arc::new(NoopBroadcaster),
        )
        .err()
        .unwrap();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_roles_file_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roles.toml");
        std::fs::write(
            &path,
            "[[roles]]\nname = \"Content Expert\"\ndomain = \"portfolio pages\"\n",
        )
        .unwrap();
        let set = load_roles(Some(&path)).unwrap();
        assert_eq!(set.resolve("Content Expert").domain, "portfolio pages");
        assert!(set.get("Database Read Expert").is_some());
    }

    #[test]
    fn test_mock_provider() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        let llm = create_llm_from_config(&cfg);
        assert_eq!(llm.token_usage(), (0, 0, 0));
    }
}
