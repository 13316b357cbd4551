use chrono::{DateTime, Local, Utc};

/// 현재 시각(밀리초 단위 Unix 타임스탬프)을 반환합니다.
pub fn current_timestamp_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// 로그용 현재 시각 문자열 (`YYYY-MM-DD HH:MM:SS`)
pub fn current_time_string() -> String {
    let now: DateTime<Local> = Local::now();
    now.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_is_monotonic_enough() {
        let a = current_timestamp_ms();
        let b = current_timestamp_ms();
        assert!(b >= a);
    }
}
