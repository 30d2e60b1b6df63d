//! 网页抓取：fetch → 去除样板 → HTML 转文本 → 可选 LLM 清洗 → 分块 → 嵌入 → 入库
//!
//! 仅允许 http/https；请求带超时与 User-Agent。嵌入失败的分块仍以 NULL 向量入库。
//! 所有失败都体现在 CrawlResult.status/error 中，crawl 本身不返回 Err。

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use html2text::from_read;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::CrawlSection;
use crate::llm::{EmbeddingProvider, LlmClient};
use crate::memory::Message;
use crate::storage::{DocumentChunk, DocumentSink};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; resume-agent/0.1; +https://github.com)";

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").unwrap());

/// 非正文元素：整段移除
static BOILERPLATE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ["script", "style", "nav", "footer", "header", "aside", "noscript"]
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).unwrap())
        .collect()
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    Success,
    Error,
}

/// 一次抓取的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub title: String,
    pub chunks_created: usize,
    pub status: CrawlStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CrawlResult {
    fn failed(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            title: String::new(),
            chunks_created: 0,
            status: CrawlStatus::Error,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CrawlStatus::Success
    }
}

pub struct WebCrawler {
    client: Client,
    embedder: Arc<dyn EmbeddingProvider>,
    sink: Arc<dyn DocumentSink>,
    cleaner: Option<Arc<dyn LlmClient>>,
    options: CrawlSection,
}

impl WebCrawler {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        sink: Arc<dyn DocumentSink>,
        options: CrawlSection,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            embedder,
            sink,
            cleaner: None,
            options,
        }
    }

    /// 启用 LLM 清洗（仅清洗前 max_clean_chars 个字符）
    pub fn with_cleaner(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.cleaner = Some(llm);
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub async fn crawl(&self, url: &str) -> CrawlResult {
        let url = url.trim();
        match reqwest::Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            Ok(u) => return CrawlResult::failed(url, format!("Unsupported URL scheme: {}", u.scheme())),
            Err(e) => return CrawlResult::failed(url, format!("Invalid URL: {e}")),
        }

        tracing::info!(url = %url, "crawling");
        let html = match self.fetch(url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "crawl fetch failed");
                return CrawlResult::failed(url, e);
            }
        };

        let title = extract_title(&html).unwrap_or_else(|| "No title".to_string());
        let text = html_to_text(&strip_boilerplate(&html));
        let text = self.clean_text(text).await;
        let chunks = segment_words(&text, self.options.chunk_words);

        for (i, chunk) in chunks.iter().enumerate() {
            let embedding = self.embedder.embed(chunk).await;
            if embedding.is_none() {
                tracing::debug!(url = %url, chunk = i, "storing chunk without embedding");
            }
            let doc = DocumentChunk {
                url: url.to_string(),
                title: title.clone(),
                chunk_text: chunk.clone(),
                chunk_index: i,
                embedding,
            };
            if let Err(e) = self.sink.insert_document_chunk(&doc).await {
                return CrawlResult {
                    title,
                    ..CrawlResult::failed(url, e.to_string())
                };
            }
        }

        tracing::info!(url = %url, chunks = chunks.len(), "crawl complete");
        CrawlResult {
            url: url.to_string(),
            title,
            chunks_created: chunks.len(),
            status: CrawlStatus::Success,
            error: None,
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, String> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                "Request timeout".to_string()
            } else {
                format!("Request failed: {e}")
            }
        })?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body = resp.text().await.map_err(|e| format!("Read body: {e}"))?;
        let body = body.trim_start_matches('\u{FEFF}');
        Ok(truncate_chars(body, self.options.max_body_chars).to_string())
    }

    /// LLM 清洗失败或返回空时沿用原文；清洗只覆盖前 max_clean_chars 字符，其余原样拼接
    async fn clean_text(&self, text: String) -> String {
        let Some(llm) = &self.cleaner else {
            return text;
        };
        let sample = truncate_chars(&text, self.options.max_clean_chars);
        let rest = &text[sample.len()..];
        let prompt = format!(
            "Clean this web content, removing navigation, ads, and irrelevant text. \
             Return only the main content.\n\n{sample}"
        );
        match llm.complete(&[Message::user(prompt)]).await {
            Ok(cleaned) if !cleaned.trim().is_empty() => format!("{} {}", cleaned.trim(), rest),
            Ok(_) => text,
            Err(e) => {
                tracing::warn!(error = %e, "LLM cleaning failed, using original text");
                text
            }
        }
    }
}

/// 提取 <title>；缺失或为空时返回 None
pub fn extract_title(html: &str) -> Option<String> {
    let raw = TITLE_RE.captures(html)?.get(1)?.as_str();
    let title = collapse_whitespace(&decode_entities(raw));
    (!title.is_empty()).then_some(title)
}

/// 移除 script/style/nav/footer/header/aside/noscript 整段
pub fn strip_boilerplate(html: &str) -> String {
    BOILERPLATE_RES
        .iter()
        .fold(html.to_string(), |acc, re| re.replace_all(&acc, " ").into_owned())
}

/// HTML → 单行可读文本；html2text 失败时退回去标签
pub fn html_to_text(html: &str) -> String {
    let text = match from_read(html.as_bytes(), 10_000) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => decode_entities(&TAG_RE.replace_all(html, " ")),
    };
    collapse_whitespace(&text)
}

/// 页面内容清洗：供 Content Expert 使用的页面上下文
pub fn clean_page_content(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    html_to_text(&strip_boilerplate(html))
}

/// 按词数切分；空块丢弃
pub fn segment_words(text: &str, chunk_words: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(chunk_words.max(1))
        .map(|c| c.join(" "))
        .filter(|c| !c.trim().is_empty())
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
