//! 게임 서버 공통 라이브러리
//!
//! 로비 서버와 릴레이 서버가 공유하는 도메인 모델, 에러 타입,
//! 유틸리티를 제공합니다.

pub mod model;
pub mod tool;

pub use model::lobby_model::{Lobby, LobbyState, LobbySummary, Player, PlayerId, Position, RosterEntry};
pub use tool::error::{AppError, ErrorSeverity};
