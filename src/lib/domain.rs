//! Domain logic: recipients and broadcasts

pub mod broadcast;
pub mod recipients;
