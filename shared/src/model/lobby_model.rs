//! 로비 도메인 모델
//!
//! 세션(로비)과 참가자(플레이어)의 상태를 정의합니다.
//! 로비는 레지스트리가 단독으로 소유하며, 다른 컴포넌트는 조회 키만 보관합니다.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use crate::tool::error::AppError;

/// 플레이어 ID 타입
pub type PlayerId = u32;

/// 3차원 위치/회전 벡터
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// 기본 스폰 위치
    pub fn spawn() -> Self {
        Self::new(0.0, 1.0, 0.0)
    }
}

/// 로비 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyState {
    /// 입장 가능
    Open,
    /// 정원 도달
    Full,
    /// 제거 확정 (레지스트리에서 삭제 직전)
    Closed,
}

/// 로비 내 플레이어 정보
#[derive(Debug, Clone)]
pub struct Player {
    /// 플레이어 ID
    pub id: PlayerId,
    /// 플레이어 이름
    pub name: String,
    /// 현재 위치
    pub position: Position,
    /// 현재 회전
    pub rotation: Position,
    /// 마지막으로 관측된 위치 시퀀스 번호
    pub last_seq: Option<u32>,
    /// 현재 체력
    pub health: u32,
    /// 최대 체력
    pub max_health: u32,
    /// 마지막 활동 시간 (keepalive / 위치 갱신)
    pub last_update: Instant,
    /// 사망 상태
    pub is_dead: bool,
    /// 리스폰 예정 시각
    pub respawn_at: Option<Instant>,
}

impl Player {
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            position: Position::spawn(),
            rotation: Position::default(),
            last_seq: None,
            health: 100,
            max_health: 100,
            last_update: Instant::now(),
            is_dead: false,
            respawn_at: None,
        }
    }

    /// 생존 여부
    pub fn is_alive(&self) -> bool {
        !self.is_dead && self.health > 0
    }
}

/// 로비 목록 조회용 요약 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbySummary {
    pub code: String,
    pub player_count: usize,
    pub max_players: u32,
    pub scene: String,
}

/// 로스터 스냅샷 항목 (입장 응답 및 player_list 브로드캐스트용)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: PlayerId,
    pub name: String,
    pub position: Position,
    pub rotation: Position,
}

/// 로비 (세션)
///
/// 레지스트리 뒤의 `Arc<RwLock<Lobby>>`로만 접근합니다.
/// 정원 검사와 삽입은 쓰기 락 아래에서 한 단계로 수행됩니다.
#[derive(Debug)]
pub struct Lobby {
    /// 6자리 영숫자 로비 코드
    pub code: String,
    /// 씬/맵 태그
    pub scene: String,
    /// 최대 플레이어 수
    pub max_players: u32,
    /// 로비 상태
    pub state: LobbyState,
    /// 호스트 플레이어 ID (세션 권한자)
    pub host_id: PlayerId,
    /// 플레이어 목록 (로비가 단독 소유)
    pub players: HashMap<PlayerId, Player>,
    /// 플레이어별 바인딩된 UDP 주소 (최초 유효 데이터그램에서 1회 설정)
    pub client_addresses: HashMap<PlayerId, SocketAddr>,
    /// 생성 시각 (Unix ms)
    pub created_at: u64,
    /// 마지막 활동 시각 (입장/퇴장/바인딩)
    pub last_activity: Instant,
}

impl Lobby {
    /// 새 로비를 생성하고 호스트를 첫 참가자로 등록합니다.
    pub fn new(code: String, max_players: u32, scene: String, host: Player) -> Self {
        let host_id = host.id;
        let mut players = HashMap::new();
        players.insert(host_id, host);

        Self {
            code,
            scene,
            max_players,
            state: LobbyState::Open,
            host_id,
            players,
            client_addresses: HashMap::new(),
            created_at: crate::tool::current_time::current_timestamp_ms(),
            last_activity: Instant::now(),
        }
    }

    /// 현재 플레이어 수
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// 정원 도달 여부
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players as usize
    }

    /// 플레이어를 로비에 추가합니다.
    ///
    /// 정원 검사와 삽입이 하나의 단계입니다. 호출자는 쓰기 락을 보유해야 하며,
    /// 정원을 넘기는 전이는 커밋되지 않습니다.
    ///
    /// # Errors
    /// * `LobbyFull` - 정원 초과
    /// * `InvalidInput` - 동일 ID가 이미 존재
    pub fn add_player(&mut self, player: Player) -> Result<(), AppError> {
        if self.is_full() {
            return Err(AppError::LobbyFull(self.code.clone()));
        }

        if self.players.contains_key(&player.id) {
            return Err(AppError::InvalidInput(format!(
                "player {} already in lobby {}",
                player.id, self.code
            )));
        }

        self.players.insert(player.id, player);
        if self.is_full() {
            self.state = LobbyState::Full;
        }
        self.last_activity = Instant::now();
        Ok(())
    }

    /// 플레이어를 로비에서 제거합니다.
    pub fn remove_player(&mut self, player_id: PlayerId) -> Option<Player> {
        let removed = self.players.remove(&player_id);
        self.client_addresses.remove(&player_id);
        if removed.is_some() {
            if self.state == LobbyState::Full {
                self.state = LobbyState::Open;
            }
            self.last_activity = Instant::now();
        }
        removed
    }

    /// 플레이어의 UDP 주소를 바인딩합니다.
    ///
    /// 바인딩은 참가자당 최대 1회이며, 이미 바인딩된 주소는 변경되지 않습니다.
    ///
    /// # Returns
    /// * `Ok(true)` - 새로 바인딩됨
    /// * `Ok(false)` - 기존 바인딩 유지
    pub fn bind_address(&mut self, player_id: PlayerId, addr: SocketAddr) -> Result<bool, AppError> {
        if !self.players.contains_key(&player_id) {
            return Err(AppError::PlayerNotFound(player_id.to_string()));
        }

        if self.client_addresses.contains_key(&player_id) {
            return Ok(false);
        }

        self.client_addresses.insert(player_id, addr);
        self.last_activity = Instant::now();
        Ok(true)
    }

    /// 바인딩된 플레이어 수
    pub fn bound_count(&self) -> usize {
        self.client_addresses.len()
    }

    /// 브로드캐스트 대상 주소 목록 (제외 플레이어 지정 가능)
    pub fn broadcast_targets(&self, exclude: Option<PlayerId>) -> Vec<SocketAddr> {
        self.client_addresses
            .iter()
            .filter(|(id, _)| exclude != Some(**id))
            .map(|(_, addr)| *addr)
            .collect()
    }

    /// 로비 요약 정보
    pub fn summary(&self) -> LobbySummary {
        LobbySummary {
            code: self.code.clone(),
            player_count: self.players.len(),
            max_players: self.max_players,
            scene: self.scene.clone(),
        }
    }

    /// 로스터 스냅샷 (제외 플레이어 지정 가능)
    pub fn roster(&self, exclude: Option<PlayerId>) -> Vec<RosterEntry> {
        self.players
            .values()
            .filter(|p| exclude != Some(p.id))
            .map(|p| RosterEntry {
                id: p.id,
                name: p.name.clone(),
                position: p.position,
                rotation: p.rotation,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lobby_with_capacity(max_players: u32) -> Lobby {
        Lobby::new(
            "ABC123".to_string(),
            max_players,
            "test_world".to_string(),
            Player::new(1, "Host".to_string()),
        )
    }

    #[test]
    fn test_host_is_first_participant() {
        let lobby = lobby_with_capacity(4);
        assert_eq!(lobby.host_id, 1);
        assert_eq!(lobby.player_count(), 1);
        assert_eq!(lobby.state, LobbyState::Open);
    }

    #[test]
    fn test_add_player_respects_capacity() {
        let mut lobby = lobby_with_capacity(2);
        lobby.add_player(Player::new(2, "Bob".to_string())).unwrap();
        assert_eq!(lobby.state, LobbyState::Full);

        let result = lobby.add_player(Player::new(3, "Carl".to_string()));
        assert!(matches!(result, Err(AppError::LobbyFull(_))));
        assert_eq!(lobby.player_count(), 2);
    }

    #[test]
    fn test_remove_player_reopens_lobby() {
        let mut lobby = lobby_with_capacity(2);
        lobby.add_player(Player::new(2, "Bob".to_string())).unwrap();
        assert_eq!(lobby.state, LobbyState::Full);

        lobby.remove_player(2);
        assert_eq!(lobby.state, LobbyState::Open);
        assert_eq!(lobby.player_count(), 1);
    }

    #[test]
    fn test_bind_address_is_set_once() {
        let mut lobby = lobby_with_capacity(4);
        let first: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let second: SocketAddr = "127.0.0.1:9002".parse().unwrap();

        assert!(lobby.bind_address(1, first).unwrap());
        assert!(!lobby.bind_address(1, second).unwrap());
        assert_eq!(lobby.client_addresses.get(&1), Some(&first));

        let unknown = lobby.bind_address(42, first);
        assert!(matches!(unknown, Err(AppError::PlayerNotFound(_))));
    }

    #[test]
    fn test_broadcast_targets_excludes_sender() {
        let mut lobby = lobby_with_capacity(4);
        lobby.add_player(Player::new(2, "Bob".to_string())).unwrap();
        lobby.bind_address(1, "127.0.0.1:9001".parse().unwrap()).unwrap();
        lobby.bind_address(2, "127.0.0.1:9002".parse().unwrap()).unwrap();

        let targets = lobby.broadcast_targets(Some(1));
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0], "127.0.0.1:9002".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_roster_snapshot() {
        let mut lobby = lobby_with_capacity(4);
        lobby.add_player(Player::new(2, "Bob".to_string())).unwrap();

        let roster = lobby.roster(Some(2));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].name, "Host");
    }
}
