//! 推理记录：一次请求内的 (模型输出, 动作, 观察) 序列
//!
//! 每个请求新建，不跨请求保存；渲染为文本后拼进下一轮 prompt。

use crate::react::Action;

/// 单步记录
#[derive(Debug, Clone)]
pub struct TranscriptStep {
    pub model_output: String,
    /// 解析失败时为 None
    pub action: Option<Action>,
    pub observation: String,
    pub tool_succeeded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ReasoningTranscript {
    steps: Vec<TranscriptStep>,
}

impl ReasoningTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: TranscriptStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[TranscriptStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 是否至少有一次工具调用成功
    pub fn has_tool_success(&self) -> bool {
        self.steps.iter().any(|s| s.tool_succeeded)
    }

    /// 按顺序渲染为 prompt 片段
    pub fn to_prompt_section(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            out.push_str(step.model_output.trim());
            out.push_str("\nObservation: ");
            out.push_str(step.observation.trim());
            out.push_str("\n\n");
        }
        out
    }

    /// 成功执行过的工具调用清单，附加在最终回复之后
    pub fn operations_summary(&self) -> String {
        self.steps
            .iter()
            .filter(|s| s.tool_succeeded)
            .filter_map(|s| s.action.as_ref())
            .enumerate()
            .map(|(i, a)| format!("{}. {}", i + 1, a))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
