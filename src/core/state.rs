//! 状态定义：ReAct 循环阶段
//!
//! Reasoning（初始）→ { ActionPending → Observing → Reasoning } → Answered | Exhausted | Failed

use serde::Serialize;

/// ReAct 循环所处阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    /// 正在构建 prompt 并等待模型输出
    Reasoning,
    /// 已解析出工具动作，尚未执行
    ActionPending,
    /// 工具已返回，Observation 写入 transcript
    Observing,
    /// 最终答案通过校验（成功终态）
    Answered,
    /// 达到最大迭代次数仍未得到答案（失败终态）
    Exhausted,
    /// 模型提供方错误（失败终态）
    Failed,
}

impl LoopPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Answered | Self::Exhausted | Self::Failed)
    }

    /// 状态机允许的迁移
    pub fn can_transition_to(self, next: LoopPhase) -> bool {
        use LoopPhase::*;
        match (self, next) {
            (Reasoning, ActionPending | Reasoning | Answered | Exhausted | Failed) => true,
            (ActionPending, Observing) => true,
            (Observing, Reasoning | Exhausted) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(LoopPhase::Answered.is_terminal());
        assert!(LoopPhase::Exhausted.is_terminal());
        assert!(LoopPhase::Failed.is_terminal());
        assert!(!LoopPhase::Reasoning.is_terminal());
        assert!(!LoopPhase::Observing.is_terminal());
    }

    #[test]
    fn test_transitions() {
        assert!(LoopPhase::Reasoning.can_transition_to(LoopPhase::ActionPending));
        assert!(LoopPhase::ActionPending.can_transition_to(LoopPhase::Observing));
        assert!(LoopPhase::Observing.can_transition_to(LoopPhase::Reasoning));
        assert!(!LoopPhase::Answered.can_transition_to(LoopPhase::Reasoning));
        assert!(!LoopPhase::ActionPending.can_transition_to(LoopPhase::Answered));
    }
}
