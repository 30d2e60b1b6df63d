//! 简历数据库结构（SQLite）
//!
//! 向量列以 JSON 文本保存，相似度在 Rust 侧计算。

/// 支持语义检索的表
pub const VECTOR_TABLES: &[&str] = &[
    "institutions",
    "positions",
    "experiences",
    "skills",
    "users",
    "documents",
];

/// 所有可写入的表
pub const KNOWN_TABLES: &[&str] = &[
    "institutions",
    "positions",
    "experiences",
    "skills",
    "users",
    "documents",
    "llm_roles",
    "benchmark_test_cases",
    "benchmark_results",
];

pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS institutions (
    inst_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    type        TEXT,
    department  TEXT,
    address     TEXT,
    city        TEXT,
    state       TEXT,
    zip         TEXT,
    embedding   TEXT
);
CREATE TABLE IF NOT EXISTS positions (
    position_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    inst_id          INTEGER REFERENCES institutions(inst_id),
    title            TEXT NOT NULL,
    responsibilities TEXT,
    start_date       TEXT,
    end_date         TEXT,
    embedding        TEXT
);
CREATE TABLE IF NOT EXISTS experiences (
    experience_id INTEGER PRIMARY KEY AUTOINCREMENT,
    position_id   INTEGER REFERENCES positions(position_id),
    name          TEXT NOT NULL,
    description   TEXT,
    start_date    TEXT,
    end_date      TEXT,
    hyperlink     TEXT,
    embedding     TEXT
);
CREATE TABLE IF NOT EXISTS skills (
    skill_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    experience_id INTEGER REFERENCES experiences(experience_id),
    name          TEXT NOT NULL,
    type          TEXT,
    level         TEXT,
    embedding     TEXT
);
CREATE TABLE IF NOT EXISTS users (
    user_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    email     TEXT NOT NULL UNIQUE,
    role      TEXT NOT NULL DEFAULT 'guest',
    embedding TEXT
);
CREATE TABLE IF NOT EXISTS documents (
    document_id INTEGER PRIMARY KEY AUTOINCREMENT,
    url         TEXT NOT NULL,
    title       TEXT,
    chunk_text  TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    embedding   TEXT,
    created_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS llm_roles (
    role_id               INTEGER PRIMARY KEY AUTOINCREMENT,
    role_name             TEXT NOT NULL,
    domain                TEXT NOT NULL,
    specific_instructions TEXT,
    background_context    TEXT,
    few_shot_examples     TEXT,
    is_active             INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS benchmark_test_cases (
    test_id         INTEGER PRIMARY KEY AUTOINCREMENT,
    input_message   TEXT NOT NULL,
    page_context    TEXT,
    expected_output TEXT NOT NULL,
    comparison_type TEXT NOT NULL DEFAULT 'contains_text',
    category        TEXT NOT NULL DEFAULT 'general',
    is_active       INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS benchmark_results (
    result_id           INTEGER PRIMARY KEY AUTOINCREMENT,
    test_id             INTEGER NOT NULL REFERENCES benchmark_test_cases(test_id),
    agent_response      TEXT,
    expected_response   TEXT,
    passed              INTEGER NOT NULL,
    execution_time_ms   INTEGER NOT NULL,
    error_message       TEXT,
    metadata            TEXT,
    execution_timestamp TEXT NOT NULL
);
"#;

/// 嵌入时拼接的文本列与主键列
pub fn embedding_source(table: &str) -> Option<(&'static str, &'static [&'static str])> {
    match table {
        "institutions" => Some(("inst_id", &["name", "type", "department", "city", "state"])),
        "positions" => Some(("position_id", &["title", "responsibilities"])),
        "experiences" => Some(("experience_id", &["name", "description"])),
        "skills" => Some(("skill_id", &["name", "type", "level"])),
        "users" => Some(("user_id", &["email", "role"])),
        "documents" => Some(("document_id", &["title", "chunk_text"])),
        _ => None,
    }
}

/// 写入 prompt 的表结构说明
pub const SCHEMA_DESCRIPTION: &str = "\
- institutions(inst_id, name, type, department, address, city, state, zip)
- positions(position_id, inst_id, title, responsibilities, start_date, end_date)
- experiences(experience_id, position_id, name, description, start_date, end_date, hyperlink)
- skills(skill_id, experience_id, name, type, level)
- users(user_id, email, role)
- documents(document_id, url, title, chunk_text, chunk_index, created_at)
Relationships: positions.inst_id -> institutions, experiences.position_id -> positions, \
skills.experience_id -> experiences, documents.url matches experiences.hyperlink.";
