//! Gemini 임베딩 프로바이더
//!
//! 문서는 `RETRIEVAL_DOCUMENT`, 검색 쿼리는 `RETRIEVAL_QUERY` 태스크로 임베딩합니다.
//! source: https://ai.google.dev/gemini-api/docs/embeddings

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{get_api_key, EmbeddingProvider};

/// Gemini 임베딩 API 엔드포인트 (gemini-embedding-001 - MRL 지원)
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";

const MODEL_NAME: &str = "models/gemini-embedding-001";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// 지원 차원 (MRL)
const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// 호출 제한 (무료 티어 60 RPM, 호출 간격 1초)
const REQUESTS_PER_WINDOW: usize = 60;
const THROTTLE_WINDOW: Duration = Duration::from_secs(60);
const MIN_INTERVAL: Duration = Duration::from_secs(1);
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);

/// 임베딩 태스크 종류
#[derive(Debug, Clone, Copy)]
enum TaskType {
    Document,
    Query,
}

impl TaskType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "RETRIEVAL_DOCUMENT",
            Self::Query => "RETRIEVAL_QUERY",
        }
    }
}

// ============================================================================
// Throttle
// ============================================================================

/// 슬라이딩 윈도우 호출 제한
#[derive(Debug)]
struct Throttle {
    sent: VecDeque<Instant>,
    limit: usize,
    window: Duration,
    interval: Duration,
}

impl Throttle {
    fn new(limit: usize, window: Duration, interval: Duration) -> Self {
        Self {
            sent: VecDeque::with_capacity(limit),
            limit,
            window,
            interval,
        }
    }

    /// `now` 시점에 다음 호출까지 기다려야 하는 시간
    fn delay_at(&mut self, now: Instant) -> Duration {
        while let Some(&first) = self.sent.front() {
            if now.duration_since(first) < self.window {
                break;
            }
            self.sent.pop_front();
        }

        let spacing = self
            .sent
            .back()
            .map(|&last| self.interval.saturating_sub(now.duration_since(last)))
            .unwrap_or_default();
        let window = match self.sent.front() {
            Some(&first) if self.sent.len() >= self.limit => {
                self.window.saturating_sub(now.duration_since(first))
            }
            _ => Duration::ZERO,
        };
        spacing.max(window)
    }

    async fn wait(&mut self) {
        let delay = self.delay_at(Instant::now());
        if !delay.is_zero() {
            tracing::debug!("Throttling Gemini request for {:?}", delay);
            tokio::time::sleep(delay).await;
        }
        self.sent.push_back(Instant::now());
    }
}

/// 한 번의 호출 결과
enum Attempt {
    Done(Vec<f32>),
    Retry(anyhow::Error),
    Fatal(anyhow::Error),
}

// ============================================================================
// GeminiEmbedding
// ============================================================================

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    throttle: Arc<Mutex<Throttle>>,
}

impl GeminiEmbedding {
    /// 차원을 지정하여 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `dimension` - 임베딩 차원 (768, 1536, 3072 중 선택)
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        if !SUPPORTED_DIMENSIONS.contains(&dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            dimension,
            throttle: Arc::new(Mutex::new(Throttle::new(
                REQUESTS_PER_WINDOW,
                THROTTLE_WINDOW,
                MIN_INTERVAL,
            ))),
        })
    }

    /// 환경변수에서 API 키를 읽어 차원 지정하여 생성
    pub fn from_env_with_dimension(dimension: usize) -> Result<Self> {
        let api_key = get_api_key()?;
        Self::with_dimension(api_key, dimension)
    }

    /// API 호출 (429/전송 실패 시 지수 백오프 재시도)
    async fn request(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            anyhow::bail!("Cannot embed empty text");
        }

        let request = EmbedRequest {
            model: MODEL_NAME.to_string(),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: task.as_str().to_string(),
            output_dimensionality: Some(self.dimension),
        };

        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0;
        loop {
            self.throttle.lock().await.wait().await;

            match self.send(&request).await {
                Attempt::Done(values) => return Ok(values),
                Attempt::Fatal(e) => return Err(e),
                Attempt::Retry(e) if attempt >= MAX_RETRIES => {
                    return Err(e.context(format!("gave up after {} retries", MAX_RETRIES)));
                }
                Attempt::Retry(e) => {
                    attempt += 1;
                    tracing::warn!("{}; retry {}/{} in {:?}", e, attempt, MAX_RETRIES, backoff);
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    async fn send(&self, request: &EmbedRequest) -> Attempt {
        // API 키는 URL이 아닌 헤더로 전송
        let response = match self
            .client
            .post(GEMINI_EMBED_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(anyhow::anyhow!("Embedding request failed: {}", e)),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Attempt::Retry(anyhow::anyhow!("Failed to read response body: {}", e)),
        };

        if status.as_u16() == 429 {
            return Attempt::Retry(anyhow::anyhow!("Gemini rate limit exceeded (429)"));
        }
        if !status.is_success() {
            return Attempt::Fatal(match serde_json::from_str::<GeminiError>(&body) {
                Ok(error) => anyhow::anyhow!(
                    "Gemini API error ({}): {}",
                    error.error.status,
                    error.error.message
                ),
                Err(_) => anyhow::anyhow!("Gemini API error ({}): {}", status, body),
            });
        }

        match serde_json::from_str::<EmbedResponse>(&body) {
            Ok(parsed) => Attempt::Done(parsed.embedding.values),
            Err(e) => Attempt::Fatal(anyhow::anyhow!("Malformed embedding response: {}", e)),
        }
    }
}

/// Gemini API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(text, TaskType::Document).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.request(text, TaskType::Query).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// Tests
// ============================================================================
