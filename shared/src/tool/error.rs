//! 공통 에러 관리 시스템
//!
//! 게임 세션 백엔드의 모든 에러를 체계적으로 관리합니다.
//! 비즈니스 로직 에러를 프로토콜 에러 코드로 변환하고, 로깅을 지원합니다.

use thiserror::Error;
use tracing::{error, info, warn};

/// 공통 애플리케이션 에러 정의
///
/// 모든 비즈니스 로직에서 발생할 수 있는 에러를 정의합니다.
/// 각 에러는 적절한 프로토콜 에러 코드로 변환됩니다.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    // 로비 관련 에러
    #[error("로비를 찾을 수 없습니다: {0}")]
    LobbyNotFound(String),

    #[error("로비가 가득 찼습니다: {0}")]
    LobbyFull(String),

    #[error("로비 코드 중복: {0}")]
    LobbyCodeExists(String),

    // 플레이어 관련 에러
    #[error("플레이어를 찾을 수 없습니다: {0}")]
    PlayerNotFound(String),

    #[error("권한 없음: {0}")]
    NotAuthority(String),

    // 입력값 검증 에러
    #[error("입력값 오류: {0}")]
    InvalidInput(String),

    #[error("최대 플레이어 수가 잘못되었습니다: {0}")]
    InvalidMaxPlayers(String),

    #[error("이름이 너무 깁니다: {0}")]
    NameTooLong(String),

    // 시스템 에러
    #[error("내부 서버 에러: {0}")]
    InternalError(String),

    #[error("네트워크 에러: {0}")]
    NetworkError(String),
}

impl AppError {
    /// 에러의 심각도를 반환합니다.
    ///
    /// # Returns
    /// * `ErrorSeverity` - 에러의 심각도 레벨
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // Critical: 시스템 장애
            AppError::InternalError(_) | AppError::NetworkError(_) => ErrorSeverity::Critical,

            // High: 권한 위반
            AppError::NotAuthority(_) => ErrorSeverity::High,

            // Medium: 사용자 입력 오류
            AppError::InvalidInput(_)
            | AppError::InvalidMaxPlayers(_)
            | AppError::NameTooLong(_) => ErrorSeverity::Medium,

            // Low: 일반적인 조회 실패 / 정원 초과
            AppError::LobbyNotFound(_)
            | AppError::LobbyFull(_)
            | AppError::LobbyCodeExists(_)
            | AppError::PlayerNotFound(_) => ErrorSeverity::Low,
        }
    }

    /// 에러를 로깅합니다.
    ///
    /// 심각도에 따라 적절한 로깅 레벨을 사용합니다.
    pub fn log(&self, context: &str) {
        let severity = self.severity();
        let error_msg = self.to_string();

        match severity {
            ErrorSeverity::Critical => {
                error!("[CRITICAL] {} - {}", context, error_msg);
            }
            ErrorSeverity::High => {
                warn!("[HIGH] {} - {}", context, error_msg);
            }
            ErrorSeverity::Medium => {
                warn!("[MEDIUM] {} - {}", context, error_msg);
            }
            ErrorSeverity::Low => {
                info!("[LOW] {} - {}", context, error_msg);
            }
        }
    }

    /// 에러를 프로토콜 에러 코드로 변환합니다.
    ///
    /// HTTP 상태 코드와 유사한 체계를 사용합니다.
    ///
    /// # Returns
    /// * `u16` - 프로토콜 에러 코드
    pub fn wire_code(&self) -> u16 {
        match self {
            AppError::LobbyNotFound(_) | AppError::PlayerNotFound(_) => 404,
            AppError::LobbyCodeExists(_) | AppError::LobbyFull(_) => 409,
            AppError::NotAuthority(_) => 403,
            AppError::InvalidInput(_)
            | AppError::InvalidMaxPlayers(_)
            | AppError::NameTooLong(_) => 400,
            AppError::InternalError(_) | AppError::NetworkError(_) => 500,
        }
    }
}

/// 에러 심각도 레벨
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorSeverity {
    Critical, // 시스템 장애
    High,     // 권한 위반
    Medium,   // 사용자 입력 오류
    Low,      // 일반적인 경고
}

/// 에러 처리 헬퍼 함수들
pub mod helpers {
    use super::*;

    /// 문자열 검증 헬퍼 함수
    ///
    /// # Arguments
    /// * `value` - 검증할 문자열
    /// * `field_name` - 필드 이름
    /// * `max_length` - 최대 길이
    ///
    /// # Returns
    /// * `Result<String, AppError>` - 검증 결과
    pub fn validate_string(
        value: String,
        field_name: &str,
        max_length: usize,
    ) -> Result<String, AppError> {
        if value.trim().is_empty() {
            return Err(AppError::InvalidInput(format!("{field_name} is empty")));
        }

        if value.len() > max_length {
            return Err(AppError::NameTooLong(format!(
                "{field_name} too long (max: {max_length})"
            )));
        }

        Ok(value)
    }

    /// 숫자 범위 검증 헬퍼 함수
    ///
    /// # Arguments
    /// * `value` - 검증할 숫자
    /// * `field_name` - 필드 이름
    /// * `min` - 최소값
    /// * `max` - 최대값
    ///
    /// # Returns
    /// * `Result<u32, AppError>` - 검증 결과
    pub fn validate_range(
        value: u32,
        field_name: &str,
        min: u32,
        max: u32,
    ) -> Result<u32, AppError> {
        if value < min || value > max {
            return Err(AppError::InvalidMaxPlayers(format!(
                "{field_name} out of range ({min}-{max})"
            )));
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_code_mapping() {
        assert_eq!(AppError::LobbyNotFound("ABC123".into()).wire_code(), 404);
        assert_eq!(AppError::LobbyFull("ABC123".into()).wire_code(), 409);
        assert_eq!(AppError::LobbyCodeExists("ABC123".into()).wire_code(), 409);
        assert_eq!(AppError::NotAuthority("player 2".into()).wire_code(), 403);
        assert_eq!(AppError::InvalidInput("name".into()).wire_code(), 400);
        assert_eq!(AppError::InternalError("boom".into()).wire_code(), 500);
    }

    #[test]
    fn test_severity_classification() {
        assert_eq!(
            AppError::InternalError("boom".into()).severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            AppError::NotAuthority("player 2".into()).severity(),
            ErrorSeverity::High
        );
        assert_eq!(
            AppError::LobbyFull("ABC123".into()).severity(),
            ErrorSeverity::Low
        );
    }

    #[test]
    fn test_validate_string() {
        let ok = helpers::validate_string("Alice".to_string(), "display_name", 24);
        assert!(ok.is_ok());

        let empty = helpers::validate_string("   ".to_string(), "display_name", 24);
        assert!(empty.is_err());

        let long = helpers::validate_string("a".repeat(40), "display_name", 24);
        assert!(matches!(long, Err(AppError::NameTooLong(_))));
    }

    #[test]
    fn test_validate_range() {
        assert!(helpers::validate_range(4, "max_players", 2, 16).is_ok());
        assert!(helpers::validate_range(1, "max_players", 2, 16).is_err());
        assert!(helpers::validate_range(64, "max_players", 2, 16).is_err());
    }
}
