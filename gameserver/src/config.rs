//! 게임 서버 설정 관리
//!
//! 환경변수를 통한 설정 로드 및 관리
//! - 네트워크 설정 (로비 TCP 포트, 릴레이 UDP 포트)
//! - 세션 설정 (로비 정원, 이름 길이 제한)
//! - 타이밍 설정 (비활성 타임아웃, 만료 스윕, 리스폰 유예)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// 게임 서버 메인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameServerConfig {
    /// 네트워크 설정
    pub network: NetworkConfig,
    /// 세션 설정
    pub session: SessionConfig,
    /// 타이밍 설정
    pub timing: TimingConfig,
}

/// 네트워크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// 서버 바인딩 주소
    pub host: String,
    /// 로비 서버 포트 (TCP)
    pub lobby_port: u16,
    /// 릴레이 서버 포트 (UDP)
    pub relay_port: u16,
    /// 클라이언트에게 안내하는 릴레이 접속 호스트
    pub advertised_host: String,
    /// 최대 패킷 크기 (바이트)
    pub max_packet_size: usize,
}

/// 세션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 기본 로비 정원
    pub default_max_players: u32,
    /// 로비 정원 상한
    pub max_lobby_capacity: u32,
    /// 플레이어 이름 최대 길이
    pub max_name_length: usize,
}

/// 타이밍 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// 플레이어 비활성 타임아웃 (초)
    pub player_timeout_secs: u64,
    /// 빈 로비 만료 시간 (초)
    pub lobby_expiry_secs: u64,
    /// 만료 스윕 간격 (초)
    pub sweep_interval_secs: u64,
    /// 리스폰 유예 시간 (밀리초)
    pub respawn_grace_ms: u64,
}

impl GameServerConfig {
    /// 환경변수로부터 설정 로드
    pub fn from_env() -> Result<Self> {
        let config = Self {
            network: NetworkConfig::from_env()?,
            session: SessionConfig::from_env()?,
            timing: TimingConfig::from_env()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// 설정 유효성 검사
    pub fn validate(&self) -> Result<()> {
        if self.network.lobby_port != 0 && self.network.lobby_port == self.network.relay_port {
            return Err(anyhow::anyhow!(
                "Lobby port and relay port must differ: {}",
                self.network.lobby_port
            ));
        }

        if self.network.max_packet_size > 65507 {
            // UDP 최대 크기
            return Err(anyhow::anyhow!(
                "Max packet size too large: {} (max: 65507)",
                self.network.max_packet_size
            ));
        }

        if self.session.default_max_players < 2 {
            return Err(anyhow::anyhow!(
                "Default lobby capacity must be >= 2, got {}",
                self.session.default_max_players
            ));
        }

        if self.session.default_max_players > self.session.max_lobby_capacity {
            return Err(anyhow::anyhow!(
                "Default lobby capacity {} exceeds maximum {}",
                self.session.default_max_players,
                self.session.max_lobby_capacity
            ));
        }

        if self.timing.sweep_interval_secs == 0 {
            return Err(anyhow::anyhow!("Sweep interval must be > 0"));
        }

        Ok(())
    }

    /// 개발 환경용 기본 설정
    pub fn development() -> Self {
        Self {
            network: NetworkConfig::development(),
            session: SessionConfig::development(),
            timing: TimingConfig::development(),
        }
    }

    /// 로비 서버 바인딩 주소
    pub fn lobby_addr(&self) -> String {
        format!("{}:{}", self.network.host, self.network.lobby_port)
    }

    /// 릴레이 서버 바인딩 주소
    pub fn relay_addr(&self) -> String {
        format!("{}:{}", self.network.host, self.network.relay_port)
    }
}

impl NetworkConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            lobby_port: env::var("LOBBY_PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid LOBBY_PORT: {}", e))?,
            relay_port: env::var("RELAY_PORT")
                .unwrap_or_else(|_| "5001".to_string())
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid RELAY_PORT: {}", e))?,
            advertised_host: env::var("ADVERTISED_HOST")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),
            max_packet_size: env::var("MAX_PACKET_SIZE")
                .unwrap_or_else(|_| "2048".to_string())
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid MAX_PACKET_SIZE: {}", e))?,
        })
    }

    pub fn development() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            lobby_port: 5000,
            relay_port: 5001,
            advertised_host: "127.0.0.1".to_string(),
            max_packet_size: 2048,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            default_max_players: env::var("DEFAULT_MAX_PLAYERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid DEFAULT_MAX_PLAYERS: {}", e))?,
            max_lobby_capacity: env::var("MAX_LOBBY_CAPACITY")
                .unwrap_or_else(|_| "16".to_string())
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid MAX_LOBBY_CAPACITY: {}", e))?,
            max_name_length: env::var("MAX_NAME_LENGTH")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid MAX_NAME_LENGTH: {}", e))?,
        })
    }

    pub fn development() -> Self {
        Self {
            default_max_players: 4,
            max_lobby_capacity: 16,
            max_name_length: 24,
        }
    }
}

impl TimingConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            player_timeout_secs: env::var("PLAYER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid PLAYER_TIMEOUT_SECS: {}", e))?,
            lobby_expiry_secs: env::var("LOBBY_EXPIRY_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid LOBBY_EXPIRY_SECS: {}", e))?,
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid SWEEP_INTERVAL_SECS: {}", e))?,
            respawn_grace_ms: env::var("RESPAWN_GRACE_MS")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid RESPAWN_GRACE_MS: {}", e))?,
        })
    }

    pub fn development() -> Self {
        Self {
            player_timeout_secs: 30,
            lobby_expiry_secs: 60,
            sweep_interval_secs: 5,
            respawn_grace_ms: 3000,
        }
    }
}
