//! 게임 세션 백엔드
//!
//! 코드로 식별되는 로비를 TCP 요청/응답으로 개설·입장시키고,
//! 게임 중 트래픽은 UDP 릴레이로 같은 로비의 참가자들에게 중계합니다.
//! 피해 판정만 호스트 권한 검증을 거치며, 백그라운드 스위퍼가
//! 비활성 플레이어와 방치된 로비를 정리합니다.

pub mod config;
pub mod game;
pub mod handler;
pub mod network;
pub mod protocol;
pub mod service;
pub mod types;

pub use config::GameServerConfig;
pub use network::relay::RelayServer;
pub use service::registry::LobbyRegistry;
