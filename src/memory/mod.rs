//! 记忆层：对话历史（短期）、会话状态、会话持久化

pub mod conversation;
pub mod persistence;
pub mod session;

pub use conversation::{ConversationMemory, Message, Role};
pub use persistence::SessionPersistence;
pub use session::{PendingAction, SessionState};
