//! crawl_web：委托 WebCrawler 抓取并入库，成功时汇总标题与分块数
//!
//! 每次调用都作为 orchestrator → web_crawler_agent 的一对 A2A 请求/响应记录在追踪器中。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::a2a::{A2aTracker, ORCHESTRATOR, WEB_CRAWLER_AGENT};
use crate::crawler::WebCrawler;
use crate::tools::schema::args_schema;
use crate::tools::{Tool, CRAWL_WEB};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CrawlWebArgs {
    /// The http(s) URL to crawl
    pub url: String,
}

pub struct CrawlWebTool {
    crawler: Arc<WebCrawler>,
    a2a: Arc<A2aTracker>,
}

impl CrawlWebTool {
    pub fn new(crawler: Arc<WebCrawler>, a2a: Arc<A2aTracker>) -> Self {
        Self { crawler, a2a }
    }
}

#[async_trait]
impl Tool for CrawlWebTool {
    fn name(&self) -> &str {
        CRAWL_WEB
    }

    fn description(&self) -> &str {
        "Crawl a URL to extract detailed information from web pages and store it in the documents \
         table. Use when the user asks about project details or content behind URLs in the experiences table."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<CrawlWebArgs>()
    }

    fn usage(&self) -> String {
        r#"Action: crawl_web(url="https://example.com/project")"#.to_string()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: CrawlWebArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {e}"))?;
        let request = self.a2a.send_request(
            ORCHESTRATOR,
            WEB_CRAWLER_AGENT,
            "crawl_url",
            serde_json::json!({ "url": args.url }),
        );
        let result = self.crawler.crawl(&args.url).await;
        self.a2a.send_response(
            &request.message_id,
            WEB_CRAWLER_AGENT,
            ORCHESTRATOR,
            serde_json::to_value(&result).unwrap_or(Value::Null),
            (!result.is_success()).then(|| result.error.as_deref().unwrap_or("unknown error")),
        );
        if result.is_success() {
            Ok(format!(
                "Web crawl completed: {} - {} chunks created",
                result.title, result.chunks_created
            ))
        } else {
            Err(format!(
                "Web crawl failed: {}",
                result.error.unwrap_or_else(|| "unknown error".to_string())
            ))
        }
    }
}
