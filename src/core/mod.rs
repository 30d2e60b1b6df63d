//! 核心层：错误与恢复、循环状态、风险闸门、请求入口（ChatService）

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod risk;
pub mod state;

pub use error::{AgentError, RecoveryAction};
pub use orchestrator::{ChatResponse, ChatService, PageContext};
pub use recovery::RecoveryEngine;
pub use risk::{ConfirmationReply, RiskAssessment, RiskGate, RiskLevel};
pub use state::LoopPhase;
