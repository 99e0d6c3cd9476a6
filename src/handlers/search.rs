//! Search handler：抓取步骤指向的网页来源
//!
//! SearchProvider 是外部检索能力的接缝；默认实现 WebFetchSearcher 直接抓取步骤文本
//! 中出现的 URL：域名白名单、超时、User-Agent、HTML 转可读文本、结果截断。

use std::collections::HashSet;

use async_trait::async_trait;
use html2text::from_read;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::SearchSection;
use crate::handlers::{extract_urls, SharedContext, StepHandler};
use crate::sandbox::truncate_output;
use crate::task::ExecutionStep;

/// 检索能力接缝
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// query 为步骤描述；urls 为步骤文本中显式给出的来源
    async fn search(&self, query: &str, urls: &[String]) -> Result<Value, String>;
}

/// 从 URL 中提取 host（小写，不含端口与路径）
fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let host = url.split('/').next()?;
    let host = host.split(':').next()?;
    Some(host.to_lowercase())
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.starts_with("<html")
        || s.starts_with("<HTML")
        || (s.len() > 20 && s.contains('<') && (s.contains("</") || s.contains("<head") || s.contains("<title")))
}

/// 默认实现：白名单域名抓取
pub struct WebFetchSearcher {
    client: Client,
    allowed_domains: HashSet<String>,
    max_result_chars: usize,
}

impl WebFetchSearcher {
    pub fn new(config: &SearchSection) -> Self {
        const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            allowed_domains: config
                .allowed_domains
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            max_result_chars: config.max_result_chars,
        }
    }

    fn is_allowed(&self, url: &str) -> Result<(), String> {
        let domain = extract_domain(url).ok_or_else(|| "Invalid or missing URL".to_string())?;
        if self.allowed_domains.contains(&domain) {
            return Ok(());
        }
        Err(format!("Domain not in allowlist: {}", domain))
    }

    async fn fetch(&self, url: &str) -> Result<String, String> {
        self.is_allowed(url)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body = resp.text().await.map_err(|e| format!("Read body: {}", e))?;
        let body = if looks_like_html(&body) {
            from_read(body.as_bytes(), 120).unwrap_or(body)
        } else {
            body
        };
        Ok(truncate_output(&body, self.max_result_chars))
    }
}

#[async_trait]
impl SearchProvider for WebFetchSearcher {
    async fn search(&self, query: &str, urls: &[String]) -> Result<Value, String> {
        if urls.is_empty() {
            return Err("No source URLs in search step".to_string());
        }
        let mut sources = Vec::new();
        let mut last_error = String::new();
        for url in urls {
            match self.fetch(url).await {
                Ok(content) => {
                    tracing::info!(url = %url, "search fetched source");
                    sources.push(json!({"url": url, "content": content}));
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "search fetch failed");
                    last_error = e;
                }
            }
        }
        if sources.is_empty() {
            return Err(format!("All sources failed, last error: {}", last_error));
        }
        Ok(json!({"query": query, "sources": sources}))
    }
}

/// Search 步骤 handler：汇总步骤文本中的 URL 并交给 provider
pub struct SearchHandler {
    provider: std::sync::Arc<dyn SearchProvider>,
}

impl SearchHandler {
    pub fn new(provider: std::sync::Arc<dyn SearchProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl StepHandler for SearchHandler {
    async fn execute(&self, step: &ExecutionStep, ctx: &SharedContext) -> Result<Value, String> {
        let mut urls = extract_urls(&step.description);
        urls.extend(extract_urls(&ctx.request));
        if let Some(Value::Array(list)) = step.context.get("urls") {
            urls.extend(list.iter().filter_map(|v| v.as_str().map(String::from)));
        }
        // 保序去重：同一 URL 可能在步骤描述与请求文本中相隔出现
        let mut seen = HashSet::new();
        urls.retain(|u| seen.insert(u.clone()));
        self.provider.search(&step.description, &urls).await
    }
}
