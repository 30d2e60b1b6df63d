//! 会话持久化
//!
//! 每个会话一个 JSON 文件（`<dir>/<session_id>.json`），用于跨进程恢复对话与挂起确认。

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::memory::SessionState;

#[derive(Debug, Clone)]
pub struct SessionPersistence {
    dir: PathBuf,
}

impl SessionPersistence {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        let safe: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    /// 加载会话；文件不存在时返回 None
    pub fn load(&self, id: &str) -> anyhow::Result<Option<SessionState>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("read session {}", path.display()))?;
        let state = serde_json::from_str(&data)
            .with_context(|| format!("parse session {}", path.display()))?;
        Ok(Some(state))
    }

    /// 写入会话；目录不存在时自动创建
    pub fn save(&self, state: &SessionState) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create session dir {}", self.dir.display()))?;
        let path = self.path_for(&state.id);
        std::fs::write(&path, serde_json::to_string_pretty(state)?)
            .with_context(|| format!("write session {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PendingAction;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionPersistence::new(dir.path().join("sessions"));

        let mut state = SessionState::new(1).with_id("abc");
        state.history.push_exchange("hi", "hello");
        state.pending = Some(PendingAction::new("delete my skills"));
        store.save(&state).unwrap();

        let loaded = store.load("abc").unwrap().unwrap();
        assert_eq!(loaded.history.messages(), state.history.messages());
        assert_eq!(loaded.pending.unwrap().message, "delete my skills");
    }

    #[test]
    fn test_missing_session_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionPersistence::new(dir.path());
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn test_id_is_sanitised() {
        let store = SessionPersistence::new("/tmp/x");
        assert_eq!(store.path_for("../etc"), PathBuf::from("/tmp/x/___etc.json"));
    }
}
