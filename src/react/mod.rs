//! 推理层：动作解析、推理记录、答案校验、Planner、ReAct 主循环

pub mod critic;
pub mod events;
pub mod loop_;
pub mod parser;
pub mod planner;
pub mod transcript;

pub use critic::{AnswerCritic, CriticResult, DEFAULT_PLACEHOLDER_PATTERNS};
pub use events::ReactEvent;
pub use loop_::{react_loop, ReactOutcome, ReactSession};
pub use parser::{parse_action, Action, ParseFailure};
pub use planner::{build_react_prompt, Planner};
pub use transcript::{ReasoningTranscript, TranscriptStep};
