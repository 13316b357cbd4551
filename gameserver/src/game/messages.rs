//! 릴레이 UDP 메시지 정의
//!
//! 릴레이 서버를 오가는 모든 데이터그램은 `"type"` 필드로 구분되는
//! JSON 객체 하나입니다. 예시:
//!
//! ```json
//! {"type":"position_update","player_id":2,"position":{"x":1.0,"y":0.0,"z":3.5},"rotation":{"x":0.0,"y":90.0,"z":0.0}}
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};

use shared::model::lobby_model::{PlayerId, Position, RosterEntry};

/// 릴레이 메시지
///
/// 인바운드(클라이언트 → 서버)와 아웃바운드(서버 → 클라이언트) 태그를
/// 하나의 열거형으로 정의합니다. 서버는 아웃바운드 전용 태그가 인바운드로
/// 들어오면 폐기합니다.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    // ── 인바운드 태그 ──────────────────────────────────────
    /// 릴레이 접속 (입장 승인 후 첫 데이터그램, 엔드포인트 바인딩)
    Connect {
        lobby_code: String,
        player_id: PlayerId,
    },

    /// 위치 갱신 (같은 로비의 다른 플레이어 전원에게 재전송)
    ///
    /// `seq`가 있으면 단조 증가 가드가 적용됩니다.
    /// 마지막으로 관측된 값 이하의 `seq`는 지연 도착으로 간주하고 폐기합니다.
    PositionUpdate {
        player_id: PlayerId,
        position: Position,
        rotation: Position,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u32>,
    },

    /// 호스트 시뮬레이션 오브젝트 위치 (내용 검증 없이 그대로 중계)
    ServerDummyUpdate { x: f32, y: f32, z: f32 },

    /// 피해 보고 (중계하지 않고 권한 검증 경로로 전달)
    ///
    /// `player_id`는 보고자(호스트여야 함), `attacker_id`는 실제 가해자입니다.
    /// 호스트가 시뮬레이션을 소유하므로 둘이 다를 수 있습니다.
    Damage {
        player_id: PlayerId,
        attacker_id: PlayerId,
        victim_id: PlayerId,
        amount: u32,
    },

    /// 생존 신호 (비활성 타임아웃 갱신)
    Keepalive { player_id: PlayerId },

    /// 자발적 퇴장
    Leave { player_id: PlayerId },

    /// 체력 스냅샷 요청 (응답은 발신자에게만 유니캐스트)
    RequestState { player_id: PlayerId },

    // ── 아웃바운드 태그 ────────────────────────────────────
    /// 접속 확인 (connect 응답)
    Welcome {
        player_id: PlayerId,
        lobby_code: String,
    },

    /// 현재 로스터 (connect 직후 본인 제외 목록)
    PlayerList { players: Vec<RosterEntry> },

    /// 신규 참가자 알림 (기존 참가자들에게)
    PlayerJoined { player: RosterEntry },

    /// 퇴장 알림
    PlayerLeft { player_id: PlayerId },

    /// 서버 공인 체력 상태
    HealthSync {
        player_id: PlayerId,
        current_health: u32,
        max_health: u32,
    },

    /// 사망 알림 (체력 0 도달 시 정확히 1회)
    PlayerKilled {
        victim_id: PlayerId,
        attacker_name: String,
    },

    /// 리스폰 알림
    PlayerRespawned { player_id: PlayerId },

    /// 에러 알림
    Error { message: String },
}

impl RelayMessage {
    /// 메시지를 JSON 데이터그램으로 직렬화합니다.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// JSON 데이터그램을 메시지로 역직렬화합니다.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}
