//! 게임 서버 공통 타입 정의

use std::sync::Arc;
use tokio::sync::RwLock;

pub use shared::model::lobby_model::{Lobby, PlayerId, Position};

/// 로비 코드 타입 (6자리 영숫자)
pub type LobbyCode = String;

/// 레지스트리가 배포하는 로비 핸들
///
/// 로비 내부 상태는 항상 이 락을 통해서만 접근합니다.
pub type SharedLobby = Arc<RwLock<Lobby>>;
