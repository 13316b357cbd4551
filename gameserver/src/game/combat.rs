//! 전투 권한 검증 및 체력 판정
//!
//! 피해 보고는 중계되지 않습니다. 호스트(세션 권한자)가 보고한 피해만
//! 서버 상태에 반영되고, 그 결과만 브로드캐스트됩니다.
//! 호출자는 해당 로비의 쓰기 락을 보유해야 합니다.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use shared::model::lobby_model::{Lobby, PlayerId, Position};
use shared::tool::error::AppError;

/// 한 번의 피해 보고로 허용되는 피해량 범위
const DAMAGE_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

/// 피해 판정 결과
#[derive(Debug, Clone, PartialEq)]
pub struct DamageOutcome {
    /// 피해자 ID
    pub victim_id: PlayerId,
    /// 판정 후 체력
    pub current_health: u32,
    /// 최대 체력
    pub max_health: u32,
    /// 이번 판정으로 발생한 사망 이벤트 (0 도달 첫 전이에만 Some)
    pub death: Option<DeathEvent>,
}

/// 사망 이벤트
///
/// 체력이 0에 도달하는 첫 전이에서 정확히 한 번 발생합니다.
#[derive(Debug, Clone, PartialEq)]
pub struct DeathEvent {
    pub victim_id: PlayerId,
    pub attacker_name: String,
}

/// 리스폰 결과
#[derive(Debug, Clone, PartialEq)]
pub struct RespawnOutcome {
    pub player_id: PlayerId,
    pub current_health: u32,
    pub max_health: u32,
}

/// 피해 보고를 검증하고 반영합니다.
///
/// 보고자와 가해자는 별개입니다: 권한 검사는 보고자(호스트)에게,
/// 사망 이벤트의 가해자 이름은 `attacker_id`에서 가져옵니다.
///
/// # Arguments
///
/// * `lobby` - 쓰기 락이 잡힌 로비
/// * `requester_id` - 데이터그램 발신자 (호스트여야 함)
/// * `attacker_id` - 실제 가해자 (이미 퇴장했을 수 있음)
/// * `victim_id` - 피해자
/// * `amount` - 피해량
/// * `respawn_grace` - 사망 시 리스폰 유예 시간
///
/// # Errors
///
/// * `NotAuthority` - 발신자가 호스트가 아님 (상태 변경 없음)
/// * `InvalidInput` - 피해량이 허용 범위를 벗어남
/// * `PlayerNotFound` - 피해자가 로비에 없음
pub fn apply_damage(
    lobby: &mut Lobby,
    requester_id: PlayerId,
    attacker_id: PlayerId,
    victim_id: PlayerId,
    amount: u32,
    respawn_grace: Duration,
) -> Result<DamageOutcome, AppError> {
    if requester_id != lobby.host_id {
        return Err(AppError::NotAuthority(format!(
            "player {} is not the host of lobby {}",
            requester_id, lobby.code
        )));
    }

    if !DAMAGE_RANGE.contains(&amount) {
        return Err(AppError::InvalidInput(format!(
            "damage amount {} out of range",
            amount
        )));
    }

    // 가해자가 이미 끊겼으면 이름은 "unknown"으로 남깁니다
    let attacker_name = lobby
        .players
        .get(&attacker_id)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let victim = lobby
        .players
        .get_mut(&victim_id)
        .ok_or_else(|| AppError::PlayerNotFound(victim_id.to_string()))?;

    // 0에서 멈추며 언더플로는 발생하지 않습니다
    victim.health = victim.health.saturating_sub(amount);

    debug!(
        victim_id = %victim_id,
        amount = amount,
        health = victim.health,
        "피해 반영"
    );

    // 사망 이벤트는 0 도달 첫 전이에만 발생합니다.
    // 이미 사망한 플레이어에 대한 추가 피해는 이벤트를 다시 만들지 않습니다.
    let death = if victim.health == 0 && !victim.is_dead {
        victim.is_dead = true;
        victim.respawn_at = Some(Instant::now() + respawn_grace);

        info!(
            victim_id = %victim_id,
            attacker = %attacker_name,
            lobby_code = %lobby.code,
            "플레이어 사망"
        );

        Some(DeathEvent {
            victim_id,
            attacker_name,
        })
    } else {
        None
    };

    let victim = &lobby.players[&victim_id];
    Ok(DamageOutcome {
        victim_id,
        current_health: victim.health,
        max_health: victim.max_health,
        death,
    })
}

/// 사망한 플레이어를 리스폰시킵니다.
///
/// 체력을 최대치로 되돌리고 사망 상태를 해제하며 스폰 위치로 이동합니다.
/// 플레이어가 이미 퇴장했거나 사망 상태가 아니면 `None`을 반환합니다.
pub fn respawn(lobby: &mut Lobby, player_id: PlayerId) -> Option<RespawnOutcome> {
    let player = lobby.players.get_mut(&player_id)?;

    if !player.is_dead {
        return None;
    }

    player.health = player.max_health;
    player.is_dead = false;
    player.respawn_at = None;
    player.position = Position::spawn();

    info!(player_id = %player_id, lobby_code = %lobby.code, "플레이어 리스폰");

    Some(RespawnOutcome {
        player_id,
        current_health: player.health,
        max_health: player.max_health,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::model::lobby_model::Player;

    const GRACE: Duration = Duration::from_millis(100);

    fn lobby_with_two_players() -> Lobby {
        let mut lobby = Lobby::new(
            "ABC123".to_string(),
            4,
            "test_world".to_string(),
            Player::new(1, "Alice".to_string()),
        );
        lobby.add_player(Player::new(2, "Bob".to_string())).unwrap();
        lobby
    }

    #[test]
    fn test_non_host_damage_rejected_without_state_change() {
        let mut lobby = lobby_with_two_players();

        let result = apply_damage(&mut lobby, 2, 2, 1, 50, GRACE);
        assert!(matches!(result, Err(AppError::NotAuthority(_))));
        assert_eq!(lobby.players[&1].health, 100);
    }

    #[test]
    fn test_damage_amount_validated() {
        let mut lobby = lobby_with_two_players();

        assert!(matches!(
            apply_damage(&mut lobby, 1, 1, 2, 0, GRACE),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            apply_damage(&mut lobby, 1, 1, 2, 500, GRACE),
            Err(AppError::InvalidInput(_))
        ));
        assert_eq!(lobby.players[&2].health, 100);
    }

    #[test]
    fn test_damage_sequence_with_single_death_event() {
        let mut lobby = lobby_with_two_players();

        let first = apply_damage(&mut lobby, 1, 1, 2, 30, GRACE).unwrap();
        assert_eq!(first.current_health, 70);
        assert!(first.death.is_none());

        let second = apply_damage(&mut lobby, 1, 1, 2, 30, GRACE).unwrap();
        assert_eq!(second.current_health, 40);
        assert!(second.death.is_none());

        let third = apply_damage(&mut lobby, 1, 1, 2, 50, GRACE).unwrap();
        assert_eq!(third.current_health, 0);
        let death = third.death.expect("death event expected");
        assert_eq!(death.victim_id, 2);
        assert_eq!(death.attacker_name, "Alice");
    }

    #[test]
    fn test_post_death_damage_clamps_without_second_event() {
        let mut lobby = lobby_with_two_players();

        apply_damage(&mut lobby, 1, 1, 2, 100, GRACE).unwrap();

        let again = apply_damage(&mut lobby, 1, 1, 2, 80, GRACE).unwrap();
        assert_eq!(again.current_health, 0);
        assert!(again.death.is_none());
    }

    #[test]
    fn test_respawn_restores_full_health_and_spawn_position() {
        let mut lobby = lobby_with_two_players();
        apply_damage(&mut lobby, 1, 1, 2, 100, GRACE).unwrap();

        let outcome = respawn(&mut lobby, 2).expect("respawn expected");
        assert_eq!(outcome.current_health, 100);

        let player = &lobby.players[&2];
        assert!(!player.is_dead);
        assert_eq!(player.position, Position::spawn());
        assert!(player.respawn_at.is_none());
    }

    #[test]
    fn test_respawn_of_living_player_is_noop() {
        let mut lobby = lobby_with_two_players();
        assert!(respawn(&mut lobby, 2).is_none());
        assert!(respawn(&mut lobby, 99).is_none());
    }

    #[test]
    fn test_death_event_names_attacker_not_reporter() {
        let mut lobby = lobby_with_two_players();
        lobby
            .add_player(Player::new(3, "Carl".to_string()))
            .unwrap();

        // 호스트 Alice(1)가 Bob(2)의 처치를 보고합니다
        let outcome = apply_damage(&mut lobby, 1, 2, 3, 100, GRACE).unwrap();
        let death = outcome.death.expect("death event expected");
        assert_eq!(death.victim_id, 3);
        assert_eq!(death.attacker_name, "Bob");
    }

    #[test]
    fn test_departed_attacker_reported_as_unknown() {
        let mut lobby = lobby_with_two_players();
        lobby
            .add_player(Player::new(3, "Carl".to_string()))
            .unwrap();
        lobby.remove_player(3);

        let outcome = apply_damage(&mut lobby, 1, 3, 2, 100, GRACE).unwrap();
        let death = outcome.death.expect("death event expected");
        assert_eq!(death.attacker_name, "unknown");
    }

    #[test]
    fn test_damage_on_unknown_victim() {
        let mut lobby = lobby_with_two_players();
        let result = apply_damage(&mut lobby, 1, 1, 42, 30, GRACE);
        assert!(matches!(result, Err(AppError::PlayerNotFound(_))));
    }
}
