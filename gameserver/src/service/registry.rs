//! 세션 레지스트리
//!
//! 코드로 식별되는 모든 로비의 단일 소유자입니다.
//! 전역 락 없이 로비 간 독립적인 동시 접근을 허용하고,
//! 로비 내부 상태 변경은 로비별 쓰기 락으로 직렬화합니다.

use dashmap::DashMap;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use shared::model::lobby_model::{Lobby, LobbyState, LobbySummary, Player, RosterEntry};
use shared::tool::error::{helpers, AppError};

use crate::types::{LobbyCode, PlayerId, SharedLobby};

/// 로비 코드 문자 집합 (대문자 영숫자)
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// 생성되는 로비 코드 길이
const CODE_LENGTH: usize = 6;
/// 코드 생성 충돌 시 최대 재시도 횟수
const CODE_GENERATION_ATTEMPTS: usize = 32;

/// 입장 승인 결과
///
/// 로비 서버가 성공 응답을 구성하는 데 필요한 스냅샷입니다.
#[derive(Debug, Clone)]
pub struct AdmissionTicket {
    pub code: LobbyCode,
    pub player_id: PlayerId,
    pub player_count: u32,
    pub max_players: u32,
    pub scene: String,
    /// 본인을 제외한 현재 로스터
    pub roster: Vec<RosterEntry>,
}

/// 플레이어 제거 결과
#[derive(Debug)]
pub struct RemovedPlayer {
    pub code: LobbyCode,
    /// 퇴장 알림을 보낼 남은 참가자들의 바인딩된 주소
    pub peer_targets: Vec<SocketAddr>,
    /// 이 제거로 로비 자체가 비어서 함께 제거되었는지 여부
    pub lobby_removed: bool,
}

/// 세션 레지스트리
///
/// * `lobbies` - 코드 → 로비 핸들 (샤드 단위 락, 전역 병목 없음)
/// * `player_index` - 플레이어 → 소속 로비 코드 (데이터그램 라우팅용)
/// * `endpoint_index` - 바인딩된 UDP 주소 → 플레이어 (역방향 발신자 식별용)
pub struct LobbyRegistry {
    lobbies: DashMap<LobbyCode, SharedLobby>,
    player_index: DashMap<PlayerId, LobbyCode>,
    endpoint_index: DashMap<SocketAddr, PlayerId>,
    next_player_id: AtomicU32,
}

impl LobbyRegistry {
    pub fn new() -> Self {
        Self {
            lobbies: DashMap::new(),
            player_index: DashMap::new(),
            endpoint_index: DashMap::new(),
            next_player_id: AtomicU32::new(1),
        }
    }

    /// 프로세스 전역에서 유일한 플레이어 ID를 발급합니다.
    fn allocate_player_id(&self) -> PlayerId {
        self.next_player_id.fetch_add(1, Ordering::Relaxed)
    }

    /// 새 로비를 생성하고 생성자를 첫 참가자(호스트)로 등록합니다.
    ///
    /// 코드 검사와 삽입은 `DashMap` entry API로 원자적으로 수행되어,
    /// 같은 코드를 노리는 동시 생성 중 정확히 하나만 성공합니다.
    ///
    /// # Arguments
    ///
    /// * `code` - 희망 코드. `None`이면 충돌하지 않는 코드를 생성합니다.
    /// * `player_name` - 생성자 이름
    /// * `max_players` - 로비 정원
    /// * `scene` - 씬/맵 태그
    ///
    /// # Errors
    ///
    /// * `LobbyCodeExists` - 명시한 코드가 이미 사용 중
    /// * `InvalidInput` - 코드 형식 오류
    /// * `InternalError` - 코드 생성 재시도 소진
    pub fn create(
        &self,
        code: Option<String>,
        player_name: &str,
        max_players: u32,
        scene: String,
    ) -> Result<AdmissionTicket, AppError> {
        let player_id = self.allocate_player_id();
        let host = Player::new(player_id, player_name.to_string());

        let code = match code {
            Some(requested) => {
                let requested = normalize_code(requested)?;
                self.insert_lobby(requested.clone(), max_players, scene.clone(), host)?;
                requested
            }
            None => self.insert_with_generated_code(max_players, scene.clone(), host)?,
        };

        self.player_index.insert(player_id, code.clone());

        info!(
            lobby_code = %code,
            host_id = %player_id,
            max_players = max_players,
            "로비 생성"
        );

        Ok(AdmissionTicket {
            code,
            player_id,
            player_count: 1,
            max_players,
            scene,
            roster: Vec::new(),
        })
    }

    /// 명시된 코드로 로비를 삽입합니다.
    fn insert_lobby(
        &self,
        code: LobbyCode,
        max_players: u32,
        scene: String,
        host: Player,
    ) -> Result<(), AppError> {
        match self.lobbies.entry(code.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(AppError::LobbyCodeExists(code)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let lobby = Lobby::new(code, max_players, scene, host);
                slot.insert(Arc::new(RwLock::new(lobby)));
                Ok(())
            }
        }
    }

    /// 충돌하지 않는 코드를 생성해 로비를 삽입합니다.
    fn insert_with_generated_code(
        &self,
        max_players: u32,
        scene: String,
        host: Player,
    ) -> Result<LobbyCode, AppError> {
        for _ in 0..CODE_GENERATION_ATTEMPTS {
            let candidate = generate_code();
            match self.insert_lobby(candidate.clone(), max_players, scene.clone(), host.clone()) {
                Ok(()) => return Ok(candidate),
                Err(AppError::LobbyCodeExists(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(AppError::InternalError(
            "lobby code space exhausted".to_string(),
        ))
    }

    /// 기존 로비에 입장합니다.
    ///
    /// 정원 검사와 참가자 등록은 로비 쓰기 락 아래에서 한 단계로 수행되어,
    /// 마지막 한 자리를 두고 경쟁하는 입장 중 정확히 하나만 성공합니다.
    /// 락 획득 후 `Closed` 상태가 관측되면 제거와의 경합이므로
    /// `LobbyNotFound`로 보고합니다.
    ///
    /// # Errors
    ///
    /// * `LobbyNotFound` - 코드가 없거나 제거가 확정된 로비
    /// * `LobbyFull` - 정원 초과
    pub async fn join(&self, code: &str, player_name: &str) -> Result<AdmissionTicket, AppError> {
        let handle = self
            .lookup(code)
            .ok_or_else(|| AppError::LobbyNotFound(code.to_string()))?;

        let player_id = self.allocate_player_id();

        let ticket = {
            let mut lobby = handle.write().await;

            if lobby.state == LobbyState::Closed {
                return Err(AppError::LobbyNotFound(code.to_string()));
            }

            lobby.add_player(Player::new(player_id, player_name.to_string()))?;

            AdmissionTicket {
                code: lobby.code.clone(),
                player_id,
                player_count: lobby.player_count() as u32,
                max_players: lobby.max_players,
                scene: lobby.scene.clone(),
                roster: lobby.roster(Some(player_id)),
            }
        };

        self.player_index.insert(player_id, ticket.code.clone());

        info!(
            lobby_code = %ticket.code,
            player_id = %player_id,
            player_count = ticket.player_count,
            "로비 입장"
        );

        Ok(ticket)
    }

    /// 공개 로비 목록을 반환합니다. 부수효과가 없습니다.
    pub async fn list(&self) -> Vec<LobbySummary> {
        // 샤드 가드를 await 너머로 끌고 가지 않도록 핸들만 먼저 수집합니다
        let handles: Vec<SharedLobby> =
            self.lobbies.iter().map(|entry| entry.value().clone()).collect();

        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            let lobby = handle.read().await;
            if lobby.state != LobbyState::Closed {
                summaries.push(lobby.summary());
            }
        }

        summaries
    }

    /// 코드로 로비 핸들을 조회합니다.
    pub fn lookup(&self, code: &str) -> Option<SharedLobby> {
        self.lobbies.get(code).map(|entry| entry.value().clone())
    }

    /// 플레이어가 속한 로비를 조회합니다.
    pub fn lobby_of_player(&self, player_id: PlayerId) -> Option<(LobbyCode, SharedLobby)> {
        let code = self.player_index.get(&player_id)?.value().clone();
        let handle = self.lookup(&code)?;
        Some((code, handle))
    }

    /// 바인딩된 UDP 주소로 플레이어를 식별합니다.
    pub fn player_by_endpoint(&self, addr: &SocketAddr) -> Option<PlayerId> {
        self.endpoint_index.get(addr).map(|entry| *entry.value())
    }

    /// 엔드포인트 역방향 색인을 등록합니다.
    ///
    /// 로비 쪽 바인딩(`Lobby::bind_address`)이 성공한 뒤에만 호출됩니다.
    pub fn register_endpoint(&self, addr: SocketAddr, player_id: PlayerId) {
        self.endpoint_index.insert(addr, player_id);
    }

    /// 플레이어를 로비와 색인에서 제거합니다.
    ///
    /// 제거 후 로비가 비면 로비도 함께 제거합니다 (Closed 표시 후 삭제).
    pub async fn remove_player(&self, player_id: PlayerId) -> Option<RemovedPlayer> {
        let (code, handle) = self.lobby_of_player(player_id)?;

        let (removed_addr, peer_targets, lobby_removed) = {
            let mut lobby = handle.write().await;

            let removed_addr = lobby.client_addresses.get(&player_id).copied();
            lobby.remove_player(player_id)?;

            let lobby_removed = lobby.players.is_empty();
            if lobby_removed {
                lobby.state = LobbyState::Closed;
            }

            (removed_addr, lobby.broadcast_targets(None), lobby_removed)
        };

        self.player_index.remove(&player_id);
        if let Some(addr) = removed_addr {
            self.endpoint_index.remove(&addr);
        }

        if lobby_removed {
            self.lobbies.remove(&code);
            info!(lobby_code = %code, "빈 로비 제거");
        }

        debug!(player_id = %player_id, lobby_code = %code, "플레이어 제거");

        Some(RemovedPlayer {
            code,
            peer_targets,
            lobby_removed,
        })
    }

    /// 로비를 제거합니다.
    ///
    /// 쓰기 락 아래에서 `Closed`를 먼저 표시한 뒤 맵에서 삭제하므로,
    /// 경합하는 입장은 살아있는 로비를 보거나 `LobbyNotFound`를 받습니다.
    /// 이미 제거된 코드에 대해서는 no-op입니다.
    pub async fn remove(&self, code: &str) -> bool {
        let Some(handle) = self.lookup(code) else {
            return false;
        };

        let (player_ids, addresses) = {
            let mut lobby = handle.write().await;

            if lobby.state == LobbyState::Closed {
                return false;
            }
            lobby.state = LobbyState::Closed;

            (
                lobby.players.keys().copied().collect::<Vec<_>>(),
                lobby.client_addresses.values().copied().collect::<Vec<_>>(),
            )
        };

        self.lobbies.remove(code);
        for player_id in player_ids {
            self.player_index.remove(&player_id);
        }
        for addr in addresses {
            self.endpoint_index.remove(&addr);
        }

        info!(lobby_code = %code, "로비 제거");
        true
    }

    /// 현재 로비 수
    pub fn lobby_count(&self) -> usize {
        self.lobbies.len()
    }

    /// 현재 등록된 플레이어 수
    pub fn player_count(&self) -> usize {
        self.player_index.len()
    }

    /// 모든 로비 핸들 스냅샷 (만료 스윕용)
    pub fn snapshot(&self) -> Vec<(LobbyCode, SharedLobby)> {
        self.lobbies
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl Default for LobbyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 명시된 로비 코드를 정규화하고 검증합니다.
fn normalize_code(code: String) -> Result<LobbyCode, AppError> {
    let code = helpers::validate_string(code, "lobby_code", 12)?.to_uppercase();

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::InvalidInput(format!(
            "lobby code must be alphanumeric: {code}"
        )));
    }

    Ok(code)
}

/// 대문자 영숫자 6자리 로비 코드를 생성합니다.
fn generate_code() -> LobbyCode {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..CODE_CHARSET.len());
            CODE_CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_generated_codes_are_unique() {
        let registry = LobbyRegistry::new();
        let mut codes = HashSet::new();

        for i in 0..100 {
            let ticket = registry
                .create(None, &format!("Host{i}"), 4, "test_world".to_string())
                .unwrap();
            assert_eq!(ticket.code.len(), CODE_LENGTH);
            assert!(ticket.code.chars().all(|c| c.is_ascii_alphanumeric()));
            assert!(codes.insert(ticket.code), "중복 코드 발급");
        }

        assert_eq!(registry.lobby_count(), 100);
    }

    #[tokio::test]
    async fn test_explicit_code_collision_rejected() {
        let registry = LobbyRegistry::new();
        registry
            .create(Some("ABC123".to_string()), "Alice", 4, "test_world".to_string())
            .unwrap();

        let duplicate = registry.create(
            Some("abc123".to_string()),
            "Bob",
            4,
            "test_world".to_string(),
        );
        assert!(matches!(duplicate, Err(AppError::LobbyCodeExists(_))));
    }

    #[tokio::test]
    async fn test_join_unknown_code() {
        let registry = LobbyRegistry::new();
        let err = tokio_test::assert_err!(registry.join("ZZZZZZ", "Bob").await);
        assert!(matches!(err, AppError::LobbyNotFound(_)));
    }

    #[tokio::test]
    async fn test_racing_joins_admit_exactly_one() {
        let registry = Arc::new(LobbyRegistry::new());
        // 정원 2: 호스트가 한 자리를 차지하므로 남은 자리는 하나
        let ticket = registry
            .create(None, "Host", 2, "test_world".to_string())
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            let code = ticket.code.clone();
            handles.push(tokio::spawn(async move {
                registry.join(&code, &format!("Racer{i}")).await
            }));
        }

        let mut successes = 0;
        let mut full_rejections = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AppError::LobbyFull(_)) => full_rejections += 1,
                Err(e) => panic!("예상하지 못한 에러: {e}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(full_rejections, 7);

        let lobby = registry.lookup(&ticket.code).unwrap();
        assert_eq!(lobby.read().await.player_count(), 2);
    }

    #[tokio::test]
    async fn test_join_after_remove_reports_not_found() {
        let registry = LobbyRegistry::new();
        let ticket = registry
            .create(None, "Host", 4, "test_world".to_string())
            .unwrap();

        // 제거 이후 살아있는 핸들을 통해서도 입장이 불가능해야 합니다
        let handle = registry.lookup(&ticket.code).unwrap();
        assert!(registry.remove(&ticket.code).await);

        assert_eq!(handle.read().await.state, LobbyState::Closed);
        let result = registry.join(&ticket.code, "Late").await;
        assert!(matches!(result, Err(AppError::LobbyNotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = LobbyRegistry::new();
        let ticket = registry
            .create(None, "Host", 4, "test_world".to_string())
            .unwrap();

        assert!(registry.remove(&ticket.code).await);
        assert!(!registry.remove(&ticket.code).await);
        assert!(!registry.remove("ZZZZZZ").await);
        assert_eq!(registry.player_count(), 0);
    }

    #[tokio::test]
    async fn test_last_player_removal_removes_lobby() {
        let registry = LobbyRegistry::new();
        let ticket = registry
            .create(None, "Host", 4, "test_world".to_string())
            .unwrap();
        let joined = registry.join(&ticket.code, "Bob").await.unwrap();

        let first = registry.remove_player(joined.player_id).await.unwrap();
        assert!(!first.lobby_removed);

        let second = registry.remove_player(ticket.player_id).await.unwrap();
        assert!(second.lobby_removed);
        assert_eq!(registry.lobby_count(), 0);
        assert!(registry.lobby_of_player(ticket.player_id).is_none());
    }

    #[tokio::test]
    async fn test_roster_excludes_joining_player() {
        let registry = LobbyRegistry::new();
        let ticket = registry
            .create(None, "Host", 4, "test_world".to_string())
            .unwrap();

        let joined = tokio_test::assert_ok!(registry.join(&ticket.code, "Bob").await);
        assert_eq!(joined.roster.len(), 1);
        assert_eq!(joined.roster[0].name, "Host");
        assert_eq!(joined.player_count, 2);
    }
}
