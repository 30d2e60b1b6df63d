//! 嵌入提供方：文本 → 定长向量，用于索引与查询
//!
//! - OpenAiEmbedder：调用 OpenAI 兼容 /embeddings；仅在限流类错误上指数退避重试
//! - HashingEmbedder：确定性特征哈希，离线运行与测试使用
//!
//! 空输入或重试耗尽时返回 None，不返回错误。

use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

use crate::config::EmbeddingSection;
use crate::llm::openai::single_attempt;
use crate::llm::traits::is_rate_limit_message;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 将文本编码为向量；空输入或失败时返回 None
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    max_retries: u32,
    base_delay: Duration,
}

impl OpenAiEmbedder {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        Self {
            client: Client::with_config(config).with_backoff(single_attempt()),
            model: model.to_string(),
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }

    pub fn with_backoff(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, String> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| e.to_string())?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;
        response
            .data
            .first()
            .map(|e| e.embedding.clone())
            .ok_or_else(|| "empty embedding response".to_string())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let mut attempt = 0u32;
        loop {
            match self.request(text).await {
                Ok(v) => return Some(v),
                Err(e) => {
                    let retryable = is_rate_limit_message(&e.to_lowercase());
                    if retryable && attempt < self.max_retries {
                        let delay = self.base_delay * 2u32.pow(attempt);
                        tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "embedding rate limited, backing off");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    tracing::warn!(error = %e, "embedding failed");
                    return None;
                }
            }
        }
    }
}

/// 确定性特征哈希嵌入：词与字符三元组散列到固定维度后 L2 归一化
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }

    pub fn embed_text(&self, text: &str) -> Option<Vec<f32>> {
        let lower = text.trim().to_lowercase();
        if lower.is_empty() {
            return None;
        }
        let mut v = vec![0f32; self.dimensions];
        for word in lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            v[self.bucket(word)] += 1.0;
            let chars: Vec<char> = format!(" {word} ").chars().collect();
            for tri in chars.windows(3) {
                let gram: String = tri.iter().collect();
                v[self.bucket(&gram)] += 0.5;
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return None;
        }
        v.iter_mut().for_each(|x| *x /= norm);
        Some(v)
    }

    fn bucket(&self, token: &str) -> usize {
        // FNV-1a
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for b in token.bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x0100_0000_01b3);
        }
        (h % self.dimensions as u64) as usize
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        self.embed_text(text)
    }
}

/// 余弦相似度；维度不一致或零向量时返回 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// 从配置创建嵌入提供方；openai 且有 OPENAI_API_KEY 时用 API，否则退回 hashing
pub fn create_embedder_from_config(cfg: &EmbeddingSection) -> Arc<dyn EmbeddingProvider> {
    let key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
    match (cfg.provider.as_str(), key) {
        ("openai", Some(key)) => Arc::new(
            OpenAiEmbedder::new(cfg.base_url.as_deref(), &cfg.model, &key)
                .with_backoff(cfg.max_retries, Duration::from_millis(cfg.base_delay_ms)),
        ),
        (provider, _) => {
            if provider == "openai" {
                tracing::info!("OPENAI_API_KEY not set, using hashing embedder");
            }
            Arc::new(HashingEmbedder::new(cfg.dimensions))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::llm::testing::serve_responses;

    const RATE_LIMITED: &str = r#"{"error":{"message":"Rate limit reached for requests","type":"requests","param":null,"code":"rate_limit_exceeded"}}"#;
    const BAD_REQUEST: &str = r#"{"error":{"message":"Invalid input","type":"invalid_request_error","param":null,"code":null}}"#;
    const EMBEDDING: &str = r#"{"object":"list","model":"test-embed","data":[{"object":"embedding","index":0,"embedding":[0.25,0.5]}],"usage":{"prompt_tokens":1,"total_tokens":1}}"#;

    fn embedder(base: &str, max_retries: u32) -> OpenAiEmbedder {
        OpenAiEmbedder::new(Some(base), "test-embed", "sk-test")
            .with_backoff(max_retries, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_rate_limit_then_success_retries() {
        let (base, hits) = serve_responses(vec![(429, RATE_LIMITED), (200, EMBEDDING)]).await;
        let v = embedder(&base, 3).embed("MSU").await;
        assert_eq!(v, Some(vec![0.25, 0.5]));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_error_is_not_retried() {
        let (base, hits) = serve_responses(vec![(400, BAD_REQUEST), (200, EMBEDDING)]).await;
        assert_eq!(embedder(&base, 3).embed("MSU").await, None);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_none() {
        let (base, hits) = serve_responses(vec![
            (429, RATE_LIMITED),
            (429, RATE_LIMITED),
            (429, RATE_LIMITED),
            (200, EMBEDDING),
        ])
        .await;
        assert_eq!(embedder(&base, 2).embed("MSU").await, None);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_hashing_deterministic_and_normalised() {
        let e = HashingEmbedder::new(64);
        let a = e.embed("Michigan State University").await.unwrap();
        let b = e.embed("michigan state university").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hashing_empty_is_none() {
        assert!(HashingEmbedder::default().embed("   ").await.is_none());
    }

    #[tokio::test]
    async fn test_hashing_similar_text_scores_higher() {
        let e = HashingEmbedder::default();
        let q = e.embed("machine learning").await.unwrap();
        let near = e.embed("machine learning engineer").await.unwrap();
        let far = e.embed("pottery glazing").await.unwrap();
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[test]
    fn test_factory_hashing() {
        let cfg = EmbeddingSection {
            provider: "hashing".into(),
            ..EmbeddingSection::default()
        };
        let _ = create_embedder_from_config(&cfg);
    }
}
