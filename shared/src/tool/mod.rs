//! 공통 유틸리티 모듈

pub mod current_time;
pub mod error;
