//! 게임 세션 백엔드 진입점
//!
//! 로비 서버(TCP), 릴레이 서버(UDP), 만료 스위퍼를 한 프로세스에서
//! 실행합니다. Ctrl+C 수신 시 정상 종료합니다.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gameserver::config::GameServerConfig;
use gameserver::handler::lobby_handler;
use gameserver::network::relay::RelayServer;
use gameserver::service::registry::LobbyRegistry;
use gameserver::service::sweeper;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(GameServerConfig::from_env().context("설정 로드 실패")?);

    info!(
        "🚀 게임 세션 백엔드 시작 ({})",
        shared::tool::current_time::current_time_string()
    );
    info!(
        "   로비(TCP): {} / 릴레이(UDP): {}",
        config.lobby_addr(),
        config.relay_addr()
    );

    let lobby_listener = TcpListener::bind(config.lobby_addr())
        .await
        .with_context(|| format!("로비 포트 바인딩 실패: {}", config.lobby_addr()))?;

    let relay_socket = Arc::new(
        UdpSocket::bind(config.relay_addr())
            .await
            .with_context(|| format!("릴레이 포트 바인딩 실패: {}", config.relay_addr()))?,
    );

    let registry = Arc::new(LobbyRegistry::new());

    // 로비 서버 (TCP 요청/응답)
    {
        let registry = registry.clone();
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = lobby_handler::run(lobby_listener, registry, config).await {
                error!(error = %e, "로비 서버 종료");
            }
        });
    }

    // 릴레이 서버 (UDP 디스패치 루프)
    {
        let relay = RelayServer::new(relay_socket.clone(), registry.clone(), config.clone());
        tokio::spawn(async move {
            if let Err(e) = relay.run().await {
                error!(error = %e, "릴레이 서버 종료");
            }
        });
    }

    // 만료 스위퍼
    {
        let registry = registry.clone();
        let socket = relay_socket.clone();
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = sweeper::run(registry, socket, config).await {
                error!(error = %e, "만료 스위퍼 종료");
            }
        });
    }

    info!("✅ 모든 서버 기동 완료");

    tokio::signal::ctrl_c().await.context("시그널 대기 실패")?;
    info!(
        lobby_count = registry.lobby_count(),
        player_count = registry.player_count(),
        "종료 시그널 수신, 서버를 종료합니다"
    );

    Ok(())
}
