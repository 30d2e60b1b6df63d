//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 RetryWithPrompt（作为纠正性 Observation 回灌循环）或 Abort。

use thiserror::Error;

use crate::llm::LlmError;
use crate::storage::StorageError;

/// 编排过程中可能出现的错误（模型、解析、工具、存储、计划格式等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型提供方错误（限流、鉴权、超时）：对当前请求是终止性的
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// 模型输出无法解析为动作或最终答案；携带纠正性 Observation
    #[error("Parse failure: {reason}")]
    ParseFailure { reason: String, observation: String },

    /// 最终答案被校验拒绝（未使用工具、含模板占位符等）
    #[error("Answer rejected: {0}")]
    AnswerRejected(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// 计划执行模式下编排器输出无法解析为任何专家调用
    #[error("Invalid orchestrator plan: {0}")]
    InvalidPlan(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Cancelled")]
    Cancelled,
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 将提示作为 Observation 注入下一轮，让模型修正（消耗一次迭代）
    RetryWithPrompt(String),
    /// 终止当前请求
    Abort,
}
