//! 네트워크 모듈

pub mod relay;
