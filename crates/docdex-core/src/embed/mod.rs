//! Embedding and query-expansion backends
//!
//! The search engine only sees these traits; the shipped backend
//! talks to an OpenAI-compatible HTTP endpoint. When no model is
//! configured the engine runs text-only and vector search reports
//! not ready.

use crate::error::{DocdexError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

/// Prefix applied to queries before embedding, matching the format
/// documents were embedded with
pub const QUERY_TASK_PREFIX: &str = "search_query: ";

/// Embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimensions, once known
    fn dimensions(&self) -> Option<usize>;

    fn model_name(&self) -> &str;
}

/// Query expansion into alternative phrasings
#[async_trait]
pub trait QueryExpander: Send + Sync {
    /// Up to `limit` alternative queries
    async fn expand(&self, query: &str, limit: usize) -> Result<Vec<String>>;

    fn model_name(&self) -> &str;
}

/// Embedder backed by an OpenAI-compatible `/v1/embeddings` endpoint
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: OnceLock<usize>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(model: &str) -> Result<Self> {
        let endpoint = std::env::var("DOCDEX_EMBED_URL")
            .unwrap_or_else(|_| "http://localhost:8080/v1/embeddings".to_string());
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()?,
            endpoint,
            model: model.to_string(),
            dimensions: OnceLock::new(),
        })
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "model": self.model,
                "input": inputs,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DocdexError::Embedding(format!(
                "embedding endpoint returned {}",
                response.status()
            )));
        }

        let parsed: EmbeddingsResponse = response.json().await?;
        if parsed.data.len() != inputs.len() {
            return Err(DocdexError::Embedding(format!(
                "asked for {} embeddings, got {}",
                inputs.len(),
                parsed.data.len()
            )));
        }
        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        if let Some(first) = vectors.first() {
            let _ = self.dimensions.set(first.len());
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| DocdexError::Embedding("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions.get().copied()
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Expander backed by an OpenAI-compatible completions endpoint
pub struct HttpQueryExpander {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

impl HttpQueryExpander {
    pub fn new(model: &str) -> Result<Self> {
        let endpoint = std::env::var("DOCDEX_QUERY_URL")
            .unwrap_or_else(|_| "http://localhost:8080/v1/completions".to_string());
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            endpoint,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl QueryExpander for HttpQueryExpander {
    async fn expand(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let prompt = format!(
            "Rewrite this documentation search query {} different ways, one per line, no numbering:\n{}\n",
            limit, query
        );
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "model": self.model,
                "prompt": prompt,
                "max_tokens": 96,
                "temperature": 0.4,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DocdexError::Embedding(format!(
                "expansion endpoint returned {}",
                response.status()
            )));
        }

        let parsed: CompletionResponse = response.json().await?;
        let text = parsed
            .choices
            .first()
            .map(|c| c.text.clone())
            .unwrap_or_default();
        Ok(parse_alternatives(&text, query, limit))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Clean completion lines into usable alternative queries
pub fn parse_alternatives(text: &str, original: &str, limit: usize) -> Vec<String> {
    let original_lower = original.to_lowercase();
    text.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '-')
                .trim()
                .trim_matches('"')
                .to_string()
        })
        .filter(|line| !line.is_empty() && line.to_lowercase() != original_lower)
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_alternatives() {
        let text = "1. hono routing basics\n2. \"define routes in hono\"\n\nhow to route\n";
        let alts = parse_alternatives(text, "hono routing", 2);
        assert_eq!(
            alts,
            vec![
                "hono routing basics".to_string(),
                "define routes in hono".to_string()
            ]
        );
    }

    #[test]
    fn test_parse_alternatives_drops_echo() {
        let alts = parse_alternatives("hono routing\nother idea", "hono routing", 2);
        assert_eq!(alts, vec!["other idea".to_string()]);
    }

    #[test]
    fn test_embedder_dimensions_start_unknown() {
        let embedder = HttpEmbedder::new("test-model").unwrap();
        assert!(embedder.dimensions().is_none());
        assert_eq!(embedder.model_name(), "test-model");
    }
}
