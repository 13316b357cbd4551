//! 서비스 모듈

pub mod registry;
pub mod sweeper;
