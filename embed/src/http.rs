use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::EmbedConfig;
use crate::embed::Embedder;
use crate::error::EmbedError;

/// Hosted embedding providers speaking the OpenAI embeddings protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// api.openai.com, or any compatible endpoint via `base_url`.
    OpenAI,
    /// Aliyun DashScope compatible mode.
    DashScope,
}

impl Provider {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "openai" => Some(Provider::OpenAI),
            "dashscope" => Some(Provider::DashScope),
            _ => None,
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAI => "text-embedding-3-small",
            Provider::DashScope => "text-embedding-v4",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::DashScope => "https://dashscope.aliyuncs.com/compatible-mode/v1",
        }
    }

    fn default_dim(self) -> usize {
        match self {
            Provider::OpenAI => 1536,
            Provider::DashScope => 1024,
        }
    }

    fn max_batch(self) -> usize {
        match self {
            Provider::OpenAI => 2048,
            Provider::DashScope => 10,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    dimensions: usize,
    encoding_format: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f64>,
}

/// HttpEmbedder calls an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    client: Client,
    api_key: String,
    model: String,
    dim: usize,
    base_url: String,
    max_batch: usize,
}

impl HttpEmbedder {
    pub fn new(provider: Provider, api_key: &str) -> Self {
        Self::with_config(provider, api_key, EmbedConfig::default())
    }

    pub fn with_config(provider: Provider, api_key: &str, cfg: EmbedConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: if cfg.model.is_empty() {
                provider.default_model().to_string()
            } else {
                cfg.model
            },
            dim: if cfg.dimension == 0 {
                provider.default_dim()
            } else {
                cfg.dimension
            },
            base_url: if cfg.base_url.is_empty() {
                provider.default_base_url().to_string()
            } else {
                cfg.base_url.trim_end_matches('/').to_string()
            },
            max_batch: if cfg.max_batch == 0 {
                provider.max_batch()
            } else {
                cfg.max_batch
            },
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn call_api(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dim,
            encoding_format: "float",
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| EmbedError::Decode(e.to_string()))?;
        collect_by_index(data, texts.len(), self.dim)
    }
}

/// Order response items by their `index` field; providers may reorder.
fn collect_by_index(
    data: EmbeddingResponse,
    batch_size: usize,
    dim: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let mut vecs: Vec<Option<Vec<f32>>> = vec![None; batch_size];
    for item in data.data {
        if item.index >= batch_size {
            return Err(EmbedError::UnexpectedIndex {
                index: item.index,
                batch_size,
            });
        }
        if item.embedding.len() != dim {
            return Err(EmbedError::DimensionMismatch {
                got: item.embedding.len(),
                want: dim,
            });
        }
        vecs[item.index] = Some(item.embedding.iter().map(|&v| v as f32).collect());
    }

    vecs.into_iter()
        .enumerate()
        .map(|(i, v)| v.ok_or(EmbedError::MissingIndex(i)))
        .collect()
}

#[async_trait::async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() || texts.iter().any(|t| t.is_empty()) {
            return Err(EmbedError::EmptyInput);
        }

        let mut result = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.max_batch) {
            result.extend(self.call_api(chunk).await?);
        }
        Ok(result)
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> EmbeddingResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults_per_provider() {
        let e = HttpEmbedder::new(Provider::DashScope, "k");
        assert_eq!(e.model(), "text-embedding-v4");
        assert_eq!(e.dimension(), 1024);

        let e = HttpEmbedder::with_config(
            Provider::OpenAI,
            "k",
            EmbedConfig::default()
                .with_model("bge-m3")
                .with_dimension(8)
                .with_base_url("http://localhost:8080/v1/"),
        );
        assert_eq!(e.model(), "bge-m3");
        assert_eq!(e.dimension(), 8);
        assert_eq!(e.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_provider_names() {
        assert_eq!(Provider::from_name("openai"), Some(Provider::OpenAI));
        assert_eq!(Provider::from_name("cohere"), None);
    }

    #[test]
    fn test_collect_reorders() {
        let data = response(
            r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#,
        );
        let vecs = collect_by_index(data, 2, 2).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_collect_errors() {
        let data = response(r#"{"data":[{"index":0,"embedding":[1.0,0.0]}]}"#);
        assert!(matches!(
            collect_by_index(data, 2, 2),
            Err(EmbedError::MissingIndex(1))
        ));

        let data = response(r#"{"data":[{"index":3,"embedding":[1.0,0.0]}]}"#);
        assert!(matches!(
            collect_by_index(data, 2, 2),
            Err(EmbedError::UnexpectedIndex { index: 3, .. })
        ));

        let data = response(r#"{"data":[{"index":0,"embedding":[1.0]}]}"#);
        assert!(matches!(
            collect_by_index(data, 1, 2),
            Err(EmbedError::DimensionMismatch { got: 1, want: 2 })
        ));
    }
}
