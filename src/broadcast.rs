//! 广播：把最终回复推送给同一房间的订阅者
//!
//! 发送是即发即忘的，失败只记日志，不影响编排结果。

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BroadcastError {
    #[error("no subscribers in room '{0}'")]
    NoSubscribers(String),
}

/// 一条广播消息
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastMessage {
    pub text: String,
    pub role: String,
    pub room: String,
    pub timestamp: DateTime<Utc>,
}

pub trait Broadcaster: Send + Sync {
    fn emit(&self, text: &str, role: &str, room: &str) -> Result<(), BroadcastError>;
}

/// 不做任何事
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn emit(&self, _text: &str, _role: &str, _room: &str) -> Result<(), BroadcastError> {
        Ok(())
    }
}

/// 基于 tokio broadcast 通道的进程内广播
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<BroadcastMessage>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.tx.subscribe()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn emit(&self, text: &str, role: &str, room: &str) -> Result<(), BroadcastError> {
        let msg = BroadcastMessage {
            text: text.to_string(),
            role: role.to_string(),
            room: room.to_string(),
            timestamp: Utc::now(),
        };
        self.tx
            .send(msg)
            .map(|_| ())
            .map_err(|_| BroadcastError::NoSubscribers(room.to_string()))
    }
}
