//! 로컬 임베딩 프로바이더
//!
//! - `HashingEmbedding`: 토큰 해싱 기반 결정적 임베딩 (오프라인, API 키 불필요)
//! - `UnavailableEmbedding`: 항상 실패하는 프로바이더 (폴백 검색 경로용)
//!
//! ref: https://en.wikipedia.org/wiki/Feature_hashing

use std::sync::OnceLock;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;

fn token_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").ok()).as_ref()
}

/// 소문자 토큰 추출 (문자/숫자 연속 구간)
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    match token_regex() {
        Some(re) => re
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect(),
        None => text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect(),
    }
}

// ============================================================================
// HashingEmbedding
// ============================================================================

/// Feature hashing 임베딩
///
/// 각 토큰을 SHA-256으로 해싱해 버킷과 부호를 정하고, 결과를 L2 정규화합니다.
/// 같은 텍스트는 항상 같은 벡터가 되고, 토큰을 공유하는 텍스트끼리 유사도가 높아집니다.
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn vectorize(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            anyhow::bail!("Cannot embed text without tokens");
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in &tokens {
            let digest = Sha256::digest(token.as_bytes());

            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };

            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            // 부호가 상쇄된 경우
            anyhow::bail!("Embedding collapsed to a zero vector");
        }
        for v in vector.iter_mut() {
            *v /= norm;
        }

        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.vectorize(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

// ============================================================================
// UnavailableEmbedding
// ============================================================================

/// 임베딩을 생성할 수 없는 프로바이더
///
/// 문서는 `failed` 상태로 저장되고 검색은 부분 문자열 폴백으로 동작합니다.
#[derive(Debug, Clone)]
pub struct UnavailableEmbedding {
    dimension: usize,
}

impl UnavailableEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for UnavailableEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("No embedding provider configured")
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

// ============================================================================
// Tests
// ============================================================================
