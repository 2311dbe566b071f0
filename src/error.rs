use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;
use thiserror::Error;

/// Errors surfaced to callers of the extraction pipeline and bookmark store.
///
/// Messages are user facing and written in Korean.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("유효한 YouTube 링크가 아닙니다: {0}")]
    InvalidUrl(String),

    #[error("영상이 너무 깁니다 ({duration}초). {max}초 이하의 쇼츠만 분석할 수 있습니다.")]
    TooLong { duration: u64, max: u64 },

    #[error("분석할 수 있는 자막이나 설명이 충분하지 않습니다.")]
    InsufficientContent,

    #[error("이 영상에는 사용할 수 있는 자막이 없습니다.")]
    NoCaptions,

    #[error("영상 정보를 가져오지 못했습니다: {0}")]
    Metadata(String),

    #[error("자막을 가져오지 못했습니다: {0}")]
    Captions(String),

    #[error("레시피 분석에 실패했습니다: {0}")]
    Synthesis(String),

    #[error("AI 서비스가 설정되지 않았습니다 (API 키 없음).")]
    NotConfigured,

    #[error("이미 저장된 레시피입니다.")]
    Duplicate,

    #[error("북마크를 찾을 수 없습니다.")]
    BookmarkNotFound,

    #[error("레시피에 video_id가 없습니다.")]
    MissingVideoId,

    #[error(transparent)]
    Internal(#[from] eyre::Report),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Shown to clients in place of unexpected failures
pub const INTERNAL_MESSAGE: &str = "서버 내부 오류가 발생했습니다.";

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidUrl(_)
            | AppError::TooLong { .. }
            | AppError::InsufficientContent
            | AppError::NoCaptions
            | AppError::Duplicate
            | AppError::MissingVideoId => StatusCode::BAD_REQUEST,
            AppError::BookmarkNotFound => StatusCode::NOT_FOUND,
            AppError::Metadata(_)
            | AppError::Captions(_)
            | AppError::Synthesis(_)
            | AppError::NotConfigured
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to a client. Internal errors stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(e) => {
                error!("Internal error: {e:#}");
                INTERNAL_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }

    /// Render as `{key: message}` with the mapped status code
    pub fn into_response_with_key(self, key: &str) -> Response {
        let status = self.status();
        let body = serde_json::json!({ key: self.public_message() });
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_response_with_key("error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_400() {
        assert_eq!(AppError::InvalidUrl("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::TooLong { duration: 200, max: 120 }.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InsufficientContent.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Duplicate.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_upstream_errors_are_500() {
        assert_eq!(AppError::Captions("boom".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AppError::NotConfigured.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AppError::Synthesis("bad".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_missing_bookmark_is_404() {
        assert_eq!(AppError::BookmarkNotFound.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_too_long_message_carries_duration() {
        let msg = AppError::TooLong { duration: 200, max: 120 }.to_string();
        assert!(msg.contains("200"));
        assert!(msg.contains("120"));
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = AppError::Internal(eyre::eyre!("secret path /etc/passwd"));
        assert!(!err.public_message().contains("passwd"));
    }

    #[test]
    fn test_not_configured_is_distinct() {
        assert_ne!(
            AppError::NotConfigured.to_string(),
            AppError::Synthesis("quota".into()).to_string()
        );
    }
}
