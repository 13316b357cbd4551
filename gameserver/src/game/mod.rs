//! 게임 로직 모듈

pub mod combat;
pub mod messages;
