//! 工具层：注册表、执行器与三个检索/抓取工具

pub mod crawl_web;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod semantic_search;
pub mod sql_query;

pub use crawl_web::{CrawlWebArgs, CrawlWebTool};
pub use executor::{Observation, ToolExecutor};
pub use registry::{Tool, ToolRegistry, ToolSpec};
pub use schema::{args_schema, describe_parameters};
pub use semantic_search::{SemanticSearchArgs, SemanticSearchTool};
pub use sql_query::{SqlQueryArgs, SqlQueryTool};

pub const SEMANTIC_SEARCH: &str = "semantic_search";
pub const SQL_QUERY: &str = "sql_query";
pub const CRAWL_WEB: &str = "crawl_web";

/// 模型可以选择的全部工具名
pub const KNOWN_TOOLS: &[&str] = &[SEMANTIC_SEARCH, SQL_QUERY, CRAWL_WEB];
