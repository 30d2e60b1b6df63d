//! ReAct 过程事件：供 CLI / 日志展示思考、工具调用、观察与校验结果

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 当前第几轮
    StepUpdate { step: usize, max_steps: usize },
    /// 正在调用 LLM
    Thinking,
    /// 模型输出预览
    ThinkingContent { text: String },
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览）
    Observation {
        tool: String,
        preview: String,
        success: bool,
    },
    /// 模型输出无法解析
    ParseFailure { reason: String },
    /// 最终答案被 Critic 拒绝
    AnswerRejected { correction: String },
    /// 错误恢复动作（RetryWithPrompt / Abort）
    Recovery { action: String, detail: String },
    FinalAnswer { text: String },
    /// 达到最大轮数
    Exhausted { iterations: usize },
    /// Token 使用增量
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
    },
    Error { text: String },
}
