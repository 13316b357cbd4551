//! 만료 스위퍼
//!
//! 주기적으로 전체 로비를 돌며
//! * 생존 신호가 끊긴 플레이어를 강제 퇴장시키고,
//! * 바인딩된 참가자 없이 방치된 로비를 제거합니다.
//!
//! 스윕 경로의 제거는 자발적 퇴장과 동일한 레지스트리 경로로 수렴하므로,
//! 빈 로비 제거 규칙은 어느 쪽에서 출발해도 같습니다.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::config::GameServerConfig;
use crate::game::messages::RelayMessage;
use crate::service::registry::LobbyRegistry;
use crate::types::{LobbyCode, PlayerId};

/// 한 번의 스윕 결과
#[derive(Debug, Default, PartialEq)]
pub struct SweepReport {
    /// 비활성으로 강제 퇴장된 플레이어 수
    pub players_disconnected: usize,
    /// 제거된 로비 수
    pub lobbies_removed: usize,
}

/// 스위퍼 실행 (주기 루프)
pub async fn run(
    registry: Arc<LobbyRegistry>,
    socket: Arc<UdpSocket>,
    config: Arc<GameServerConfig>,
) -> Result<()> {
    let player_timeout = Duration::from_secs(config.timing.player_timeout_secs);
    let lobby_expiry = Duration::from_secs(config.timing.lobby_expiry_secs);
    let mut ticker =
        tokio::time::interval(Duration::from_secs(config.timing.sweep_interval_secs));

    info!(
        player_timeout_secs = config.timing.player_timeout_secs,
        lobby_expiry_secs = config.timing.lobby_expiry_secs,
        "✅ 만료 스위퍼 시작"
    );

    loop {
        ticker.tick().await;

        let report = sweep(&registry, &socket, player_timeout, lobby_expiry).await;
        if report != SweepReport::default() {
            info!(
                disconnected = report.players_disconnected,
                lobbies_removed = report.lobbies_removed,
                "스윕 완료"
            );
        }
    }
}

/// 전체 로비를 한 번 스윕합니다.
pub async fn sweep(
    registry: &LobbyRegistry,
    socket: &UdpSocket,
    player_timeout: Duration,
    lobby_expiry: Duration,
) -> SweepReport {
    let mut report = SweepReport::default();

    let mut timed_out_players: Vec<PlayerId> = Vec::new();
    let mut expired_lobbies: Vec<LobbyCode> = Vec::new();

    for (code, handle) in registry.snapshot() {
        let lobby = handle.read().await;

        for player in lobby.players.values() {
            if player.last_update.elapsed() > player_timeout {
                timed_out_players.push(player.id);
            }
        }

        // 아무도 릴레이에 바인딩하지 않은 채 방치된 로비
        if lobby.bound_count() == 0 && lobby.last_activity.elapsed() > lobby_expiry {
            expired_lobbies.push(code);
        }
    }

    for player_id in timed_out_players {
        if let Some(removed) = registry.remove_player(player_id).await {
            warn!(
                player_id = %player_id,
                lobby_code = %removed.code,
                "비활성 플레이어 강제 퇴장"
            );

            notify_player_left(socket, &removed.peer_targets, player_id).await;

            report.players_disconnected += 1;
            if removed.lobby_removed {
                report.lobbies_removed += 1;
            }
        }
    }

    for code in expired_lobbies {
        // 플레이어 퇴장으로 이미 제거되었을 수 있습니다 (no-op)
        if registry.remove(&code).await {
            report.lobbies_removed += 1;
        }
    }

    report
}

/// 남은 참가자들에게 퇴장 알림을 보냅니다.
async fn notify_player_left(socket: &UdpSocket, targets: &[std::net::SocketAddr], player_id: PlayerId) {
    let message = RelayMessage::PlayerLeft { player_id };
    let bytes = match message.encode() {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "퇴장 알림 직렬화 실패");
            return;
        }
    };

    for target in targets {
        if let Err(e) = socket.send_to(&bytes, target).await {
            debug!(target = %target, error = %e, "퇴장 알림 전송 실패");
        }
    }
}
