//! Adapters for the outside world: SMTP delivery and recipient storage

pub mod email;
pub mod storage;
