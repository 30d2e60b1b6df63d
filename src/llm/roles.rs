//! 角色模板与角色注册表
//!
//! RoleTemplate 在加载时校验必填字段；未知角色使用显式 fallback 模板。
//! RoleRegistry 以 `RwLock<Arc<RoleSet>>` 保存快照：读者拿到的是完整的一份角色集，
//! 刷新时整体替换，并发请求不会看到半更新状态。

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{RoleSource, StorageError};

const BUILTIN_ROLES: &str = include_str!("../../config/roles.toml");

#[derive(Error, Debug)]
pub enum RoleError {
    #[error("invalid role file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read role file: {0}")]
    Io(#[from] std::io::Error),

    #[error("role '{role}' is missing required field '{field}'")]
    MissingField { role: String, field: &'static str },
}

/// 角色模板：role 名、领域、说明、背景、少样本示例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleTemplate {
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub background_context: String,
    #[serde(default)]
    pub few_shot_examples: String,
}

impl RoleTemplate {
    pub fn validate(&self) -> Result<(), RoleError> {
        if self.name.trim().is_empty() {
            return Err(RoleError::MissingField {
                role: self.name.clone(),
                field: "name",
            });
        }
        if self.domain.trim().is_empty() {
            return Err(RoleError::MissingField {
                role: self.name.clone(),
                field: "domain",
            });
        }
        Ok(())
    }

    /// 未知角色的兜底模板
    pub fn fallback(name: &str) -> Self {
        Self {
            name: name.to_string(),
            domain: "general assistance".to_string(),
            instructions: "Answer the request directly and concisely.".to_string(),
            background_context: String::new(),
            few_shot_examples: String::new(),
        }
    }

    /// 渲染完整 prompt；空段落省略
    pub fn render(&self, request: &str) -> String {
        let mut parts = vec![format!(
            "You are a {} with expertise in {}.",
            self.name, self.domain
        )];
        for (title, body) in [
            ("Instructions", &self.instructions),
            ("Context", &self.background_context),
            ("Examples", &self.few_shot_examples),
        ] {
            let body = body.trim();
            if !body.is_empty() {
                parts.push(format!("\n{title}:\n{body}"));
            }
        }
        parts.push(format!("\nRequest:\n{request}"));
        parts.join("\n")
    }

    pub fn kind(&self) -> RoleKind {
        RoleKind::from_name(&self.name)
    }
}

/// 角色在计划执行模式中的行为分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    DatabaseRead,
    DatabaseWrite,
    Content,
    Orchestrator,
    Other,
}

impl RoleKind {
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("database") && lower.contains("write") {
            Self::DatabaseWrite
        } else if lower.contains("database") {
            Self::DatabaseRead
        } else if lower.contains("content") {
            Self::Content
        } else if lower.contains("orchestrator") {
            Self::Orchestrator
        } else {
            Self::Other
        }
    }
}

#[derive(Deserialize)]
struct RoleFile {
    #[serde(default)]
    roles: Vec<RoleTemplate>,
}

/// 一份不可变的角色集合（按名称索引）
#[derive(Debug, Clone, Default)]
pub struct RoleSet {
    roles: HashMap<String, RoleTemplate>,
}

impl RoleSet {
    /// 随二进制内置的角色
    pub fn builtin() -> Result<Self, RoleError> {
        Self::from_toml_str(BUILTIN_ROLES)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, RoleError> {
        let file: RoleFile = toml::from_str(s)?;
        let mut set = Self::default();
        for role in file.roles {
            role.validate()?;
            set.roles.insert(role.name.clone(), role);
        }
        Ok(set)
    }

    pub fn from_file(path: &Path) -> Result<Self, RoleError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// 用 overrides 覆盖同名角色，返回新集合
    pub fn layered(&self, overrides: impl IntoIterator<Item = RoleTemplate>) -> Self {
        let mut roles = self.roles.clone();
        for role in overrides {
            roles.insert(role.name.clone(), role);
        }
        Self { roles }
    }

    pub fn get(&self, name: &str) -> Option<&RoleTemplate> {
        self.roles.get(name)
    }

    /// 查找角色；未知时返回 fallback
    pub fn resolve(&self, name: &str) -> RoleTemplate {
        self.get(name)
            .cloned()
            .unwrap_or_else(|| RoleTemplate::fallback(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleTemplate> {
        self.roles.values()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.roles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// 角色注册表：单写多读，快照语义
#[derive(Debug)]
pub struct RoleRegistry {
    base: Arc<RoleSet>,
    current: RwLock<Arc<RoleSet>>,
}

impl RoleRegistry {
    pub fn new(base: RoleSet) -> Self {
        let base = Arc::new(base);
        Self {
            current: RwLock::new(base.clone()),
            base,
        }
    }

    /// 当前角色集快照；调用方在一次请求内持有它
    pub fn snapshot(&self) -> Arc<RoleSet> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, set: RoleSet) {
        let set = Arc::new(set);
        match self.current.write() {
            Ok(mut guard) => *guard = set,
            Err(poisoned) => *poisoned.into_inner() = set,
        }
    }

    /// 从存储加载启用的角色，叠加到内置角色之上后整体替换；返回叠加的角色数
    pub async fn refresh_from(&self, source: &dyn RoleSource) -> Result<usize, StorageError> {
        let loaded = source.load_roles().await?;
        let valid: Vec<RoleTemplate> = loaded
            .into_iter()
            .filter(|r| match r.validate() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping invalid stored role");
                    false
                }
            })
            .collect();
        let count = valid.len();
        self.replace(self.base.layered(valid));
        tracing::debug!(count, "role registry refreshed");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[test]
    fn test_builtin_roles_load() {
        let set = RoleSet::builtin().unwrap();
        for name in [
            "Database Read Expert",
            "Database Write Expert",
            "Content Expert",
            "Orchestrator",
        ] {
            assert!(set.get(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn test_render_sections() {
        let role = RoleTemplate {
            name: "Content Expert".into(),
            domain: "page analysis".into(),
            instructions: "Be brief.".into(),
            background_context: String::new(),
            few_shot_examples: String::new(),
        };
        let out = role.render("What is on this page?");
        assert!(out.starts_with("You are a Content Expert with expertise in page analysis."));
        assert!(out.contains("\nInstructions:\nBe brief."));
        assert!(!out.contains("Context:"));
        assert!(!out.contains("Examples:"));
        assert!(out.ends_with("Request:\nWhat is on this page?"));
    }

    #[test]
    fn test_unknown_role_falls_back() {
        let set = RoleSet::builtin().unwrap();
        let role = set.resolve("Travel Agent");
        assert_eq!(role.name, "Travel Agent");
        assert_eq!(role.domain, "general assistance");
    }

    #[test]
    fn test_validation_rejects_missing_domain() {
        let err = RoleSet::from_toml_str("[[roles]]\nname = \"X\"\ndomain = \" \"\n").unwrap_err();
        assert!(matches!(err, RoleError::MissingField { field: "domain", .. }));
    }

    #[test]
    fn test_role_kind() {
        assert_eq!(RoleKind::from_name("Database Read Expert"), RoleKind::DatabaseRead);
        assert_eq!(RoleKind::from_name("Database Write Expert"), RoleKind::DatabaseWrite);
        assert_eq!(RoleKind::from_name("Content Expert"), RoleKind::Content);
        assert_eq!(RoleKind::from_name("Orchestrator AI"), RoleKind::Orchestrator);
        assert_eq!(RoleKind::from_name("Poet"), RoleKind::Other);
    }

    struct StoredRoles(Vec<RoleTemplate>);

    #[async_trait]
    impl RoleSource for StoredRoles {
        async fn load_roles(&self) -> Result<Vec<RoleTemplate>, StorageError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_refresh_layers_over_builtin_and_keeps_old_snapshot() {
        let registry = RoleRegistry::new(RoleSet::builtin().unwrap());
        let before = registry.snapshot();

        let mut custom = RoleTemplate::fallback("Content Expert");
        custom.domain = "résumé pages".into();
        let invalid = RoleTemplate {
            domain: String::new(),
            ..RoleTemplate::fallback("Broken")
        };
        let n = registry
            .refresh_from(&StoredRoles(vec![custom, invalid]))
            .await
            .unwrap();
        assert_eq!(n, 1);

        let after = registry.snapshot();
        assert_eq!(after.resolve("Content Expert").domain, "résumé pages");
        assert!(after.get("Orchestrator").is_some());
        assert!(after.get("Broken").is_none());
        assert_ne!(before.resolve("Content Expert").domain, "résumé pages");
    }
}
