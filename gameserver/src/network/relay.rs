//! 릴레이 서버 (UDP 디스패치 루프)
//!
//! 단일 소켓에서 데이터그램을 수신해 로비 단위로 라우팅합니다.
//! 이동 계열 메시지는 내용 검증 없이 같은 로비의 다른 참가자에게 그대로
//! 중계하고, 피해 보고만 권한 검증 경로를 거칩니다.
//!
//! 잘못된 데이터그램(깨진 JSON, 알 수 없는 태그, 미승인 발신자)은
//! 로그만 남기고 폐기하며, 디스패치 루프는 어떤 경우에도 종료되지 않습니다.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use shared::model::lobby_model::{Lobby, LobbyState, RosterEntry};
use shared::tool::error::AppError;

use crate::config::GameServerConfig;
use crate::game::combat;
use crate::game::messages::RelayMessage;
use crate::service::registry::LobbyRegistry;
use crate::types::{PlayerId, Position, SharedLobby};

/// 릴레이 서버
pub struct RelayServer {
    socket: Arc<UdpSocket>,
    registry: Arc<LobbyRegistry>,
    config: Arc<GameServerConfig>,
}

impl RelayServer {
    pub fn new(
        socket: Arc<UdpSocket>,
        registry: Arc<LobbyRegistry>,
        config: Arc<GameServerConfig>,
    ) -> Self {
        Self {
            socket,
            registry,
            config,
        }
    }

    /// 디스패치 루프 실행
    ///
    /// 데이터그램 단위 에러는 로그 후 다음 수신으로 넘어갑니다.
    pub async fn run(&self) -> Result<()> {
        info!("✅ 릴레이 서버 대기 중: {}", self.socket.local_addr()?);

        let mut buffer = vec![0u8; self.config.network.max_packet_size];

        loop {
            let (len, addr) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "데이터그램 수신 실패");
                    continue;
                }
            };

            if let Err(e) = self.handle_datagram(&buffer[..len], addr).await {
                e.log("relay");
            }
        }
    }

    /// 데이터그램 하나를 처리합니다.
    ///
    /// # Errors
    ///
    /// 모든 에러는 해당 데이터그램의 폐기를 의미할 뿐, 서버 상태를
    /// 바꾸지 않고 루프를 멈추지도 않습니다.
    pub async fn handle_datagram(&self, data: &[u8], addr: SocketAddr) -> Result<(), AppError> {
        let message = RelayMessage::decode(data).map_err(|e| {
            AppError::InvalidInput(format!("malformed datagram from {addr}: {e}"))
        })?;

        match message {
            RelayMessage::Connect {
                lobby_code,
                player_id,
            } => self.handle_connect(lobby_code, player_id, addr).await,
            RelayMessage::PositionUpdate {
                player_id,
                position,
                rotation,
                seq,
            } => {
                self.handle_position_update(player_id, position, rotation, seq, addr)
                    .await
            }
            RelayMessage::ServerDummyUpdate { x, y, z } => {
                self.handle_dummy_update(x, y, z, addr).await
            }
            RelayMessage::Damage {
                player_id,
                attacker_id,
                victim_id,
                amount,
            } => {
                self.handle_damage(player_id, attacker_id, victim_id, amount, addr)
                    .await
            }
            RelayMessage::Keepalive { player_id } => self.handle_keepalive(player_id, addr).await,
            RelayMessage::Leave { player_id } => self.handle_leave(player_id, addr).await,
            RelayMessage::RequestState { player_id } => {
                self.handle_request_state(player_id, addr).await
            }
            // 아웃바운드 전용 태그가 인바운드로 들어온 경우
            other => Err(AppError::InvalidInput(format!(
                "unexpected inbound tag from {addr}: {other:?}"
            ))),
        }
    }

    /// 발신자를 검증합니다.
    ///
    /// 플레이어 P를 자칭하는 데이터그램은 P가 입장 승인된 상태에서
    /// * P가 아직 바인딩되지 않았으면 발신 주소로 바인딩하고,
    /// * 이미 바인딩되었으면 발신 주소가 일치해야 합니다.
    ///
    /// # Errors
    ///
    /// * `NotAuthority` - 바인딩된 주소와 다른 곳에서 온 데이터그램 (스푸핑)
    fn verify_sender(
        &self,
        lobby: &mut Lobby,
        player_id: PlayerId,
        addr: SocketAddr,
    ) -> Result<(), AppError> {
        match lobby.client_addresses.get(&player_id) {
            Some(bound) if *bound == addr => Ok(()),
            Some(bound) => Err(AppError::NotAuthority(format!(
                "datagram for player {player_id} from {addr}, bound to {bound}"
            ))),
            None => {
                lobby.bind_address(player_id, addr)?;
                self.registry.register_endpoint(addr, player_id);
                debug!(player_id = %player_id, addr = %addr, "엔드포인트 바인딩");
                Ok(())
            }
        }
    }

    /// 릴레이 접속 처리
    ///
    /// 엔드포인트를 바인딩하고 `welcome`과 현재 로스터를 돌려준 뒤,
    /// 기존 참가자들에게 `player_joined`를 알립니다.
    async fn handle_connect(
        &self,
        lobby_code: String,
        player_id: PlayerId,
        addr: SocketAddr,
    ) -> Result<(), AppError> {
        let handle = self
            .registry
            .lookup(&lobby_code)
            .ok_or_else(|| AppError::LobbyNotFound(lobby_code.clone()))?;

        let (roster, entry, peer_targets) = {
            let mut lobby = handle.write().await;

            if lobby.state == LobbyState::Closed {
                return Err(AppError::LobbyNotFound(lobby_code.clone()));
            }

            self.verify_sender(&mut lobby, player_id, addr)?;

            let player = lobby
                .players
                .get_mut(&player_id)
                .ok_or_else(|| AppError::PlayerNotFound(player_id.to_string()))?;
            player.last_update = Instant::now();

            let entry = RosterEntry {
                id: player.id,
                name: player.name.clone(),
                position: player.position,
                rotation: player.rotation,
            };

            (
                lobby.roster(Some(player_id)),
                entry,
                lobby.broadcast_targets(Some(player_id)),
            )
        };

        info!(player_id = %player_id, lobby_code = %lobby_code, "릴레이 접속");

        self.unicast(
            addr,
            &RelayMessage::Welcome {
                player_id,
                lobby_code,
            },
        )
        .await;
        self.unicast(addr, &RelayMessage::PlayerList { players: roster })
            .await;
        self.broadcast(&peer_targets, &RelayMessage::PlayerJoined { player: entry })
            .await;

        Ok(())
    }

    /// 위치 갱신 처리 (블라인드 릴레이)
    ///
    /// 서버는 위치의 타당성을 검사하지 않고 상태에 덮어쓴 뒤
    /// 같은 로비의 다른 참가자 전원에게 그대로 재전송합니다.
    async fn handle_position_update(
        &self,
        player_id: PlayerId,
        position: Position,
        rotation: Position,
        seq: Option<u32>,
        addr: SocketAddr,
    ) -> Result<(), AppError> {
        let (_, handle) = self
            .registry
            .lobby_of_player(player_id)
            .ok_or_else(|| AppError::PlayerNotFound(player_id.to_string()))?;

        let peer_targets = {
            let mut lobby = handle.write().await;
            self.verify_sender(&mut lobby, player_id, addr)?;

            let player = lobby
                .players
                .get_mut(&player_id)
                .ok_or_else(|| AppError::PlayerNotFound(player_id.to_string()))?;

            // 단조 증가 시퀀스 가드: 늦게 도착한 과거 갱신은 폐기합니다.
            // seq가 없는 데이터그램은 마지막 도착이 이기는 규칙을 따릅니다.
            if let Some(seq) = seq {
                if player.last_seq.is_some_and(|last| seq <= last) {
                    debug!(player_id = %player_id, seq = seq, "지연 도착 위치 폐기");
                    return Ok(());
                }
                player.last_seq = Some(seq);
            }

            player.position = position;
            player.rotation = rotation;
            player.last_update = Instant::now();

            lobby.broadcast_targets(Some(player_id))
        };

        self.broadcast(
            &peer_targets,
            &RelayMessage::PositionUpdate {
                player_id,
                position,
                rotation,
                seq,
            },
        )
        .await;

        Ok(())
    }

    /// 호스트 시뮬레이션 오브젝트 위치 중계
    ///
    /// 이 태그는 플레이어 ID를 싣지 않으므로 발신자를 바인딩된
    /// 엔드포인트의 역방향 색인으로 식별합니다.
    async fn handle_dummy_update(
        &self,
        x: f32,
        y: f32,
        z: f32,
        addr: SocketAddr,
    ) -> Result<(), AppError> {
        let sender_id = self
            .registry
            .player_by_endpoint(&addr)
            .ok_or_else(|| AppError::NotAuthority(format!("unbound endpoint {addr}")))?;

        let (_, handle) = self
            .registry
            .lobby_of_player(sender_id)
            .ok_or_else(|| AppError::PlayerNotFound(sender_id.to_string()))?;

        let peer_targets = {
            let mut lobby = handle.write().await;
            if let Some(player) = lobby.players.get_mut(&sender_id) {
                player.last_update = Instant::now();
            }
            lobby.broadcast_targets(Some(sender_id))
        };

        self.broadcast(&peer_targets, &RelayMessage::ServerDummyUpdate { x, y, z })
            .await;

        Ok(())
    }

    /// 피해 보고 처리 (중계가 아닌 권한 검증 경로)
    ///
    /// 호스트의 보고만 반영됩니다. 판정 결과는 서버 공인 `health_sync`로
    /// 로비 전체에 브로드캐스트되고, 사망 시 `player_killed`가 정확히
    /// 한 번 나가며 유예 시간 후 리스폰이 예약됩니다.
    async fn handle_damage(
        &self,
        requester_id: PlayerId,
        attacker_id: PlayerId,
        victim_id: PlayerId,
        amount: u32,
        addr: SocketAddr,
    ) -> Result<(), AppError> {
        let (_, handle) = self
            .registry
            .lobby_of_player(requester_id)
            .ok_or_else(|| AppError::PlayerNotFound(requester_id.to_string()))?;

        let grace = Duration::from_millis(self.config.timing.respawn_grace_ms);

        let (outcome, all_targets) = {
            let mut lobby = handle.write().await;
            self.verify_sender(&mut lobby, requester_id, addr)?;

            if let Some(requester) = lobby.players.get_mut(&requester_id) {
                requester.last_update = Instant::now();
            }

            let outcome = combat::apply_damage(
                &mut lobby,
                requester_id,
                attacker_id,
                victim_id,
                amount,
                grace,
            )?;
            (outcome, lobby.broadcast_targets(None))
        };

        self.broadcast(
            &all_targets,
            &RelayMessage::HealthSync {
                player_id: outcome.victim_id,
                current_health: outcome.current_health,
                max_health: outcome.max_health,
            },
        )
        .await;

        if let Some(death) = outcome.death {
            self.broadcast(
                &all_targets,
                &RelayMessage::PlayerKilled {
                    victim_id: death.victim_id,
                    attacker_name: death.attacker_name,
                },
            )
            .await;

            self.schedule_respawn(handle, victim_id, grace);
        }

        Ok(())
    }

    /// 유예 시간 후 리스폰을 수행하는 지연 태스크를 예약합니다.
    ///
    /// 유예 중 플레이어가 퇴장했거나 로비가 제거되었으면 조용히 끝납니다.
    fn schedule_respawn(&self, handle: SharedLobby, victim_id: PlayerId, grace: Duration) {
        let socket = self.socket.clone();

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;

            let (outcome, all_targets) = {
                let mut lobby = handle.write().await;
                if lobby.state == LobbyState::Closed {
                    return;
                }

                match combat::respawn(&mut lobby, victim_id) {
                    Some(outcome) => (outcome, lobby.broadcast_targets(None)),
                    None => return,
                }
            };

            for message in [
                RelayMessage::PlayerRespawned {
                    player_id: outcome.player_id,
                },
                RelayMessage::HealthSync {
                    player_id: outcome.player_id,
                    current_health: outcome.current_health,
                    max_health: outcome.max_health,
                },
            ] {
                if let Ok(bytes) = message.encode() {
                    for target in &all_targets {
                        if let Err(e) = socket.send_to(&bytes, target).await {
                            debug!(target = %target, error = %e, "리스폰 알림 전송 실패");
                        }
                    }
                }
            }
        });
    }

    /// 생존 신호 처리
    async fn handle_keepalive(&self, player_id: PlayerId, addr: SocketAddr) -> Result<(), AppError> {
        let (_, handle) = self
            .registry
            .lobby_of_player(player_id)
            .ok_or_else(|| AppError::PlayerNotFound(player_id.to_string()))?;

        let mut lobby = handle.write().await;
        self.verify_sender(&mut lobby, player_id, addr)?;

        if let Some(player) = lobby.players.get_mut(&player_id) {
            player.last_update = Instant::now();
        }

        Ok(())
    }

    /// 자발적 퇴장 처리
    async fn handle_leave(&self, player_id: PlayerId, addr: SocketAddr) -> Result<(), AppError> {
        {
            let (_, handle) = self
                .registry
                .lobby_of_player(player_id)
                .ok_or_else(|| AppError::PlayerNotFound(player_id.to_string()))?;

            let mut lobby = handle.write().await;
            self.verify_sender(&mut lobby, player_id, addr)?;
        }

        if let Some(removed) = self.registry.remove_player(player_id).await {
            info!(player_id = %player_id, lobby_code = %removed.code, "자발적 퇴장");
            self.broadcast(&removed.peer_targets, &RelayMessage::PlayerLeft { player_id })
                .await;
        }

        Ok(())
    }

    /// 체력 스냅샷 요청 처리 (발신자에게만 유니캐스트)
    async fn handle_request_state(
        &self,
        player_id: PlayerId,
        addr: SocketAddr,
    ) -> Result<(), AppError> {
        let (_, handle) = self
            .registry
            .lobby_of_player(player_id)
            .ok_or_else(|| AppError::PlayerNotFound(player_id.to_string()))?;

        let snapshots = {
            let mut lobby = handle.write().await;
            self.verify_sender(&mut lobby, player_id, addr)?;

            lobby
                .players
                .values()
                .map(|p| (p.id, p.health, p.max_health))
                .collect::<Vec<_>>()
        };

        for (id, current_health, max_health) in snapshots {
            self.unicast(
                addr,
                &RelayMessage::HealthSync {
                    player_id: id,
                    current_health,
                    max_health,
                },
            )
            .await;
        }

        Ok(())
    }

    /// 단일 대상 전송 (전송 실패는 무시)
    async fn unicast(&self, target: SocketAddr, message: &RelayMessage) {
        self.broadcast(std::slice::from_ref(&target), message).await;
    }

    /// 다중 대상 전송
    ///
    /// fire-and-forget: 개별 전송 실패는 debug 로그만 남깁니다.
    async fn broadcast(&self, targets: &[SocketAddr], message: &RelayMessage) {
        let bytes = match message.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "아웃바운드 메시지 직렬화 실패");
                return;
            }
        };

        for target in targets {
            if let Err(e) = self.socket.send_to(&bytes, target).await {
                debug!(target = %target, error = %e, "데이터그램 전송 실패");
            }
        }
    }
}
