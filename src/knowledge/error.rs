//! 에러 타입 - 문서 저장소 에러 분류
//!
//! 저장소 레벨 에러는 타입을 유지한 채 경계(CLI/HTTP)까지 전달됩니다.
//! 임베딩 실패(`EmbeddingUnavailable`)만 내부에서 흡수되어
//! `pending`/`failed` 상태 또는 폴백 검색으로 변환됩니다.

use thiserror::Error;

/// 문서 저장소 에러
#[derive(Debug, Error)]
pub enum WikiError {
    /// 스키마 프로비저닝 실패 (시작 시 치명적)
    #[error("schema error: {0}")]
    Schema(String),

    /// 쿼리 텍스트를 만들 수 없음 (필드 누락, 인코딩 불가 값)
    #[error("query build error: {0}")]
    QueryBuild(String),

    /// 문서/관계 없음
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// 잘못된 입력 (관계 엔드포인트 누락 등)
    #[error("validation error: {0}")]
    Validation(String),

    /// 중복 관계
    #[error("conflict: {0}")]
    Conflict(String),

    /// 임베딩 프로바이더 사용 불가 (요청 실패로 노출되지 않음)
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// 설정 값 오류
    #[error("config error: {key}: {message}")]
    Config { key: String, message: String },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Lance(#[from] lancedb::Error),

    #[error(transparent)]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 저장소 Result 별칭
pub type WikiResult<T> = std::result::Result<T, WikiError>;

impl WikiError {
    pub fn document_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "document",
            id: id.into(),
        }
    }

    /// 라우팅 레이어용 HTTP 상태 코드
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Conflict(_) => 409,
            Self::Validation(_) => 422,
            Self::QueryBuild(_) => 400,
            _ => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(WikiError::document_not_found("x").status_code(), 404);
        assert_eq!(WikiError::Conflict("dup".into()).status_code(), 409);
        assert_eq!(WikiError::Validation("missing".into()).status_code(), 422);
        assert_eq!(WikiError::QueryBuild("nul".into()).status_code(), 400);
        assert_eq!(WikiError::Schema("dim".into()).status_code(), 500);
    }

    #[test]
    fn test_not_found_message() {
        let err = WikiError::document_not_found("abc");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "document not found: abc");
    }
}
