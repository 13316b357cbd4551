//! 로비 TCP 프로토콜 정의
//!
//! 클라이언트와 로비 서버 간 요청/응답 메시지 프로토콜을 정의합니다.
//!
//! # 프로토콜 구조
//!
//! ```text
//! [4바이트 길이 헤더 (big-endian)][JSON 메시지 데이터]
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use shared::model::lobby_model::{LobbySummary, RosterEntry};

/// 허용하는 최대 메시지 크기 (바이트)
///
/// 잘못된 길이 헤더가 버퍼 할당을 폭주시키지 않도록 제한합니다.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// 로비 요청 메시지 (클라이언트 → 서버)
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum LobbyRequest {
    /// 로비 생성 요청
    ///
    /// # 필드
    ///
    /// * `code` - 희망 로비 코드 (None이면 서버가 생성)
    /// * `player_name` - 생성자 이름 (첫 참가자이자 호스트가 됨)
    /// * `max_players` - 로비 정원 (None이면 서버 기본값)
    /// * `scene` - 씬/맵 태그 (None이면 서버 기본값)
    CreateLobby {
        code: Option<String>,
        player_name: String,
        max_players: Option<u32>,
        scene: Option<String>,
    },

    /// 로비 입장 요청
    JoinLobby { code: String, player_name: String },

    /// 공개 로비 목록 조회 (부수효과 없음)
    ListLobbies,
}

/// 로비 응답 메시지 (서버 → 클라이언트)
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum LobbyResponse {
    /// 로비 생성 성공
    ///
    /// 생성자는 이미 첫 참가자로 등록된 상태이며,
    /// 릴레이 접속 지점(UDP host:port)을 함께 안내합니다.
    LobbyCreated {
        code: String,
        player_id: u32,
        max_players: u32,
        scene: String,
        relay_host: String,
        relay_port: u16,
    },

    /// 로비 입장 성공
    ///
    /// 현재 로스터 스냅샷을 포함합니다 (본인 제외).
    LobbyJoined {
        code: String,
        player_id: u32,
        player_count: u32,
        max_players: u32,
        scene: String,
        roster: Vec<RosterEntry>,
        relay_host: String,
        relay_port: u16,
    },

    /// 로비 목록
    LobbyList { lobbies: Vec<LobbySummary> },

    /// 에러 응답
    ///
    /// # 필드
    ///
    /// * `code` - 에러 코드 (404: 없음, 409: 정원/중복, 400: 입력 오류, 500: 내부)
    /// * `message` - 사람이 읽을 수 있는 에러 사유
    Error { code: u16, message: String },
}

impl LobbyRequest {
    /// 요청을 길이 헤더 포함 바이너리로 직렬화합니다.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_frame(self)
    }

    /// 바이너리에서 요청으로 역직렬화합니다.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        decode_frame(data)
    }

    /// TCP 스트림에서 요청 하나를 읽습니다.
    ///
    /// # Errors
    ///
    /// * 스트림 종료(EOF) 또는 읽기 실패 시
    /// * 길이 헤더가 `MAX_MESSAGE_SIZE`를 초과할 때
    /// * JSON 역직렬화 실패 시
    pub async fn read_from_stream(stream: &mut BufReader<OwnedReadHalf>) -> Result<Self> {
        read_frame(stream).await
    }
}

impl LobbyResponse {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_frame(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        decode_frame(data)
    }

    pub async fn read_from_stream(stream: &mut BufReader<OwnedReadHalf>) -> Result<Self> {
        read_frame(stream).await
    }

    /// TCP 스트림에 응답을 씁니다.
    pub async fn write_to_stream(&self, stream: &mut BufWriter<OwnedWriteHalf>) -> Result<()> {
        let data = self.to_bytes()?;
        stream.write_all(&data).await?;
        stream.flush().await?;
        Ok(())
    }
}

/// [4바이트 길이][JSON] 프레임으로 직렬화합니다.
fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_string(message)?;
    let data = json.as_bytes();
    let length = data.len() as u32;

    let mut result = Vec::with_capacity(4 + data.len());
    result.extend_from_slice(&length.to_be_bytes());
    result.extend_from_slice(data);

    Ok(result)
}

/// [4바이트 길이][JSON] 프레임에서 역직렬화합니다.
fn decode_frame<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T> {
    if data.len() < 4 {
        return Err(anyhow!("메시지가 너무 짧습니다"));
    }

    let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;

    if length > MAX_MESSAGE_SIZE {
        return Err(anyhow!("메시지 길이 초과: {}바이트", length));
    }

    if data.len() < 4 + length {
        return Err(anyhow!("메시지 길이가 맞지 않습니다"));
    }

    let json_str = std::str::from_utf8(&data[4..4 + length])?;
    let message: T = serde_json::from_str(json_str)?;

    Ok(message)
}

async fn read_frame<T: for<'de> Deserialize<'de>>(
    stream: &mut BufReader<OwnedReadHalf>,
) -> Result<T> {
    // 길이 헤더 읽기 (4바이트)
    let mut length_bytes = [0u8; 4];
    stream.read_exact(&mut length_bytes).await?;
    let length = u32::from_be_bytes(length_bytes) as usize;

    if length > MAX_MESSAGE_SIZE {
        return Err(anyhow!("메시지 길이 초과: {}바이트", length));
    }

    // 메시지 데이터 읽기
    let mut buffer = vec![0u8; length];
    stream.read_exact(&mut buffer).await?;

    let json_str = std::str::from_utf8(&buffer)?;
    let message: T = serde_json::from_str(json_str)?;

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let request = LobbyRequest::CreateLobby {
            code: None,
            player_name: "Alice".to_string(),
            max_players: Some(4),
            scene: Some("warehouse".to_string()),
        };

        let bytes = request.to_bytes().unwrap();
        let decoded = LobbyRequest::from_bytes(&bytes).unwrap();

        match decoded {
            LobbyRequest::CreateLobby {
                player_name,
                max_players,
                ..
            } => {
                assert_eq!(player_name, "Alice");
                assert_eq!(max_players, Some(4));
            }
            _ => panic!("메시지 타입이 맞지 않습니다"),
        }
    }

    #[test]
    fn test_error_response_roundtrip() {
        let response = LobbyResponse::Error {
            code: 404,
            message: "lobby not found".to_string(),
        };

        let bytes = response.to_bytes().unwrap();
        let decoded = LobbyResponse::from_bytes(&bytes).unwrap();

        match decoded {
            LobbyResponse::Error { code, message } => {
                assert_eq!(code, 404);
                assert_eq!(message, "lobby not found");
            }
            _ => panic!("메시지 타입이 맞지 않습니다"),
        }
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let request = LobbyRequest::ListLobbies;
        let bytes = request.to_bytes().unwrap();

        assert!(LobbyRequest::from_bytes(&bytes[..2]).is_err());
        assert!(LobbyRequest::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_oversized_length_header_rejected() {
        let mut bytes = vec![0xFF, 0xFF, 0xFF, 0xFF];
        bytes.extend_from_slice(b"{}");
        assert!(LobbyRequest::from_bytes(&bytes).is_err());
    }
}
