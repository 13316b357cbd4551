//! 로비 서버 (TCP 요청/응답)
//!
//! 연결당 태스크 하나로 로비 생성/입장/목록 요청을 처리합니다.
//! 한 연결에서 여러 요청을 순차 처리할 수 있으며, EOF에서 종료합니다.

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use shared::tool::error::{helpers, AppError};

use crate::config::GameServerConfig;
use crate::protocol::{LobbyRequest, LobbyResponse};
use crate::service::registry::{AdmissionTicket, LobbyRegistry};

/// 기본 씬 태그
const DEFAULT_SCENE: &str = "main";
/// 로비 정원 최소값
const MIN_LOBBY_CAPACITY: u32 = 2;

/// 로비 서버 실행 (accept 루프)
///
/// 연결마다 태스크를 생성하고, 연결 단위 실패는 로그로만 남깁니다.
pub async fn run(
    listener: TcpListener,
    registry: Arc<LobbyRegistry>,
    config: Arc<GameServerConfig>,
) -> Result<()> {
    info!("✅ 로비 서버 대기 중: {}", listener.local_addr()?);

    loop {
        let (stream, addr) = listener.accept().await?;
        debug!(client = %addr, "로비 연결 수락");

        let registry = registry.clone();
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, registry, config).await {
                debug!(client = %addr, error = %e, "로비 연결 종료");
            }
        });
    }
}

/// 단일 클라이언트 연결 처리
async fn handle_connection(
    stream: TcpStream,
    registry: Arc<LobbyRegistry>,
    config: Arc<GameServerConfig>,
) -> Result<()> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);

    loop {
        // EOF 또는 프레임 오류는 연결 종료로 처리합니다
        let request = match LobbyRequest::read_from_stream(&mut reader).await {
            Ok(request) => request,
            Err(_) => return Ok(()),
        };

        let response = process_request(request, &registry, &config).await;
        response.write_to_stream(&mut writer).await?;
    }
}

/// 요청 하나를 처리해 응답을 만듭니다.
///
/// 비즈니스 에러는 와이어 코드가 붙은 에러 응답으로 변환되고,
/// 내부 에러는 상세를 숨긴 채 500으로 보고됩니다.
pub async fn process_request(
    request: LobbyRequest,
    registry: &LobbyRegistry,
    config: &GameServerConfig,
) -> LobbyResponse {
    let result = match request {
        LobbyRequest::CreateLobby {
            code,
            player_name,
            max_players,
            scene,
        } => handle_create(code, player_name, max_players, scene, registry, config),
        LobbyRequest::JoinLobby { code, player_name } => {
            handle_join(code, player_name, registry, config).await
        }
        LobbyRequest::ListLobbies => {
            let lobbies = registry.list().await;
            debug!(count = lobbies.len(), "로비 목록 조회");
            return LobbyResponse::LobbyList { lobbies };
        }
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            e.log("lobby_handler");
            error_response(e)
        }
    }
}

/// 로비 생성 처리
fn handle_create(
    code: Option<String>,
    player_name: String,
    max_players: Option<u32>,
    scene: Option<String>,
    registry: &LobbyRegistry,
    config: &GameServerConfig,
) -> Result<LobbyResponse, AppError> {
    let player_name =
        helpers::validate_string(player_name, "player_name", config.session.max_name_length)?;

    let max_players = helpers::validate_range(
        max_players.unwrap_or(config.session.default_max_players),
        "max_players",
        MIN_LOBBY_CAPACITY,
        config.session.max_lobby_capacity,
    )?;

    let scene = scene
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SCENE.to_string());

    let ticket = registry.create(code, &player_name, max_players, scene)?;

    Ok(LobbyResponse::LobbyCreated {
        code: ticket.code,
        player_id: ticket.player_id,
        max_players: ticket.max_players,
        scene: ticket.scene,
        relay_host: config.network.advertised_host.clone(),
        relay_port: config.network.relay_port,
    })
}

/// 로비 입장 처리
async fn handle_join(
    code: String,
    player_name: String,
    registry: &LobbyRegistry,
    config: &GameServerConfig,
) -> Result<LobbyResponse, AppError> {
    let player_name =
        helpers::validate_string(player_name, "player_name", config.session.max_name_length)?;

    let ticket = registry.join(&code, &player_name).await?;

    Ok(joined_response(ticket, config))
}

fn joined_response(ticket: AdmissionTicket, config: &GameServerConfig) -> LobbyResponse {
    LobbyResponse::LobbyJoined {
        code: ticket.code,
        player_id: ticket.player_id,
        player_count: ticket.player_count,
        max_players: ticket.max_players,
        scene: ticket.scene,
        roster: ticket.roster,
        relay_host: config.network.advertised_host.clone(),
        relay_port: config.network.relay_port,
    }
}

/// 비즈니스 에러를 와이어 에러 응답으로 변환합니다.
fn error_response(error: AppError) -> LobbyResponse {
    let code = error.wire_code();

    // 내부 에러의 상세는 클라이언트에게 노출하지 않습니다
    let message = if code == 500 {
        warn!(error = %error, "내부 에러를 클라이언트에 숨김");
        "internal server error".to_string()
    } else {
        error.to_string()
    };

    LobbyResponse::Error { code, message }
}
