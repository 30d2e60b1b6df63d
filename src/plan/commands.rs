//! 白名单写命令
//!
//! Database Write Expert 只能输出以下命令之一，参数可按位置或 `key=value` 给出：
//!
//! ```text
//! insertSkill(experience_id, name, type, level)
//! insertInstitution(name, type, city, state)
//! insertExperience(position_id, name, description, start_date, end_date)
//! updateSkillLevel(skill_id, level)
//! deleteSkill(skill_id)
//! ```
//!
//! experience_id 可以是数字或 `first` / `latest`。其他任何文本都被拒绝，不会被当作代码或 SQL 执行。

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::react::parser::extract_balanced;

static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(insertSkill|insertInstitution|insertExperience|updateSkillLevel|deleteSkill)\s*\(",
    )
    .unwrap()
});
static KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^([A-Za-z_]\w*)\s*[=:]\s*(.*)$"#).unwrap());

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("no allow-listed command found (allowed: insertSkill, insertInstitution, insertExperience, updateSkillLevel, deleteSkill)")]
    NotAllowed,

    #[error("{0}: unbalanced parentheses")]
    Unbalanced(&'static str),

    #[error("{command}: missing argument '{arg}'")]
    MissingArgument {
        command: &'static str,
        arg: &'static str,
    },

    #[error("{command}: unknown argument '{arg}'")]
    UnknownArgument { command: &'static str, arg: String },

    #[error("{0}: too many arguments")]
    TooManyArguments(&'static str),

    #[error("{command}: invalid value '{value}' for '{arg}'")]
    InvalidArgument {
        command: &'static str,
        arg: &'static str,
        value: String,
    },
}

/// 经历引用：具体 id，或按开始日期取第一条 / 最近一条
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperienceRef {
    Id(i64),
    First,
    Latest,
}

/// 允许执行的写命令
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCommand {
    InsertSkill {
        experience: ExperienceRef,
        name: String,
        skill_type: Option<String>,
        level: Option<String>,
    },
    InsertInstitution {
        name: String,
        inst_type: Option<String>,
        city: Option<String>,
        state: Option<String>,
    },
    InsertExperience {
        position_id: i64,
        name: String,
        description: Option<String>,
        start_date: Option<String>,
        end_date: Option<String>,
    },
    UpdateSkillLevel {
        skill_id: i64,
        level: String,
    },
    DeleteSkill {
        skill_id: i64,
    },
}

/// 命令名与其参数槽位（每个槽位可有别名）
struct Signature {
    name: &'static str,
    slots: &'static [&'static [&'static str]],
}

const INSERT_SKILL: Signature = Signature {
    name: "insertSkill",
    slots: &[
        &["experience_id", "experience", "experienceid"],
        &["name", "skill", "skill_name"],
        &["type", "skill_type"],
        &["level", "skill_level"],
    ],
};
const INSERT_INSTITUTION: Signature = Signature {
    name: "insertInstitution",
    slots: &[&["name"], &["type", "inst_type"], &["city"], &["state"]],
};
const INSERT_EXPERIENCE: Signature = Signature {
    name: "insertExperience",
    slots: &[
        &["position_id", "position", "positionid"],
        &["name"],
        &["description"],
        &["start_date", "start"],
        &["end_date", "end"],
    ],
};
const UPDATE_SKILL_LEVEL: Signature = Signature {
    name: "updateSkillLevel",
    slots: &[&["skill_id", "skill", "skillid"], &["level"]],
};
const DELETE_SKILL: Signature = Signature {
    name: "deleteSkill",
    slots: &[&["skill_id", "skill", "skillid"]],
};

impl WriteCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InsertSkill { .. } => INSERT_SKILL.name,
            Self::InsertInstitution { .. } => INSERT_INSTITUTION.name,
            Self::InsertExperience { .. } => INSERT_EXPERIENCE.name,
            Self::UpdateSkillLevel { .. } => UPDATE_SKILL_LEVEL.name,
            Self::DeleteSkill { .. } => DELETE_SKILL.name,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(
            self,
            Self::InsertSkill { .. } | Self::InsertInstitution { .. } | Self::InsertExperience { .. }
        )
    }

    /// 从专家输出中提取第一条白名单命令
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let caps = COMMAND_RE.captures(text).ok_or(CommandError::NotAllowed)?;
        let sig = match caps[1].to_lowercase().as_str() {
            "insertskill" => &INSERT_SKILL,
            "insertinstitution" => &INSERT_INSTITUTION,
            "insertexperience" => &INSERT_EXPERIENCE,
            "updateskilllevel" => &UPDATE_SKILL_LEVEL,
            _ => &DELETE_SKILL,
        };
        let open = caps.get(0).map(|m| m.end() - 1).unwrap_or(0);
        let inner = extract_balanced(text, open).ok_or(CommandError::Unbalanced(sig.name))?;
        let mut args = bind_args(sig, inner)?;

        let cmd = match sig.name {
            "insertSkill" => Self::InsertSkill {
                experience: parse_experience(sig, required(sig, &mut args, 0)?)?,
                name: required(sig, &mut args, 1)?,
                skill_type: args[2].take(),
                level: args[3].take(),
            },
            "insertInstitution" => Self::InsertInstitution {
                name: required(sig, &mut args, 0)?,
                inst_type: args[1].take(),
                city: args[2].take(),
                state: args[3].take(),
            },
            "insertExperience" => Self::InsertExperience {
                position_id: parse_id(sig, 0, required(sig, &mut args, 0)?)?,
                name: required(sig, &mut args, 1)?,
                description: args[2].take(),
                start_date: args[3].take(),
                end_date: args[4].take(),
            },
            "updateSkillLevel" => Self::UpdateSkillLevel {
                skill_id: parse_id(sig, 0, required(sig, &mut args, 0)?)?,
                level: required(sig, &mut args, 1)?,
            },
            _ => Self::DeleteSkill {
                skill_id: parse_id(sig, 0, required(sig, &mut args, 0)?)?,
            },
        };
        Ok(cmd)
    }
}

/// 把参数表绑定到槽位；位置参数按顺序填充，关键字参数按名称（含别名）填充
fn bind_args(sig: &Signature, inner: &str) -> Result<Vec<Option<String>>, CommandError> {
    let mut slots: Vec<Option<String>> = vec![None; sig.slots.len()];
    let mut next_positional = 0;

    for raw in split_args(inner) {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (index, value) = match keyword(raw) {
            Some((key, value)) => {
                let key = key.to_lowercase();
                let index = sig
                    .slots
                    .iter()
                    .position(|aliases| aliases.contains(&key.as_str()))
                    .ok_or_else(|| CommandError::UnknownArgument {
                        command: sig.name,
                        arg: key.clone(),
                    })?;
                (index, value)
            }
            None => {
                while next_positional < slots.len() && slots[next_positional].is_some() {
                    next_positional += 1;
                }
                if next_positional >= slots.len() {
                    return Err(CommandError::TooManyArguments(sig.name));
                }
                next_positional += 1;
                (next_positional - 1, raw)
            }
        };
        slots[index] = literal(value);
    }
    Ok(slots)
}

/// `key=value`；引号开头的参数一律视为位置参数
fn keyword(raw: &str) -> Option<(&str, &str)> {
    if raw.starts_with('"') || raw.starts_with('\'') {
        return None;
    }
    let caps = KEY_RE.captures(raw)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

/// 按顶层逗号切分，忽略引号内的逗号
fn split_args(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                ',' => {
                    parts.push(&s[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    parts.push(&s[start..]);
    parts
}

/// 去引号并处理转义；`None` / `null` / 空串视为缺省
fn literal(value: &str) -> Option<String> {
    let v = value.trim();
    let unquoted = match v.chars().next() {
        Some(q @ ('"' | '\'')) if v.len() >= 2 && v.ends_with(q) => {
            let body = &v[1..v.len() - 1];
            let mut out = String::with_capacity(body.len());
            let mut chars = body.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else {
                    out.push(c);
                }
            }
            return (!out.trim().is_empty()).then_some(out);
        }
        _ => v,
    };
    match unquoted.to_lowercase().as_str() {
        "" | "none" | "null" => None,
        _ => Some(unquoted.to_string()),
    }
}

fn required(
    sig: &Signature,
    args: &mut [Option<String>],
    index: usize,
) -> Result<String, CommandError> {
    args[index].take().ok_or(CommandError::MissingArgument {
        command: sig.name,
        arg: sig.slots[index][0],
    })
}

fn parse_id(sig: &Signature, index: usize, value: String) -> Result<i64, CommandError> {
    value.trim().parse().map_err(|_| CommandError::InvalidArgument {
        command: sig.name,
        arg: sig.slots[index][0],
        value,
    })
}

fn parse_experience(sig: &Signature, value: String) -> Result<ExperienceRef, CommandError> {
    match value.trim().to_lowercase().as_str() {
        "first" | "earliest" => Ok(ExperienceRef::First),
        "latest" | "last" | "most_recent" => Ok(ExperienceRef::Latest),
        _ => parse_id(sig, 0, value).map(ExperienceRef::Id),
    }
}
