//! Resume Agent - 简历问答智能体
//!
//! 模块划分：
//! - **a2a**: 智能体间请求/响应消息追踪
//! - **agent**: 组件装配（LLM、嵌入、SQLite、工具、Planner / Critic、计划执行器）
//! - **benchmark**: 基准用例执行、回复比对与汇总指标
//! - **broadcast**: 最终回复的房间广播
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、风险闸门、请求入口 ChatService
//! - **crawler**: 网页抓取、清洗、分块与入库
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Groq / Mock）、嵌入、角色模板
//! - **memory**: 对话历史、会话状态与持久化
//! - **plan**: 计划执行模式（Orchestrator + 专家调用）
//! - **react**: 动作解析、Planner、Critic、ReAct 主循环
//! - **storage**: 存储接口与 SQLite 实现
//! - **tools**: semantic_search / sql_query / crawl_web 与执行器

pub mod a2a;
pub mod agent;
pub mod benchmark;
pub mod broadcast;
pub mod config;
pub mod core;
pub mod crawler;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod plan;
pub mod react;
pub mod storage;
pub mod tools;

pub use agent::{create_agent_components, AgentComponents};
pub use crate::core::{ChatResponse, ChatService, PageContext};
