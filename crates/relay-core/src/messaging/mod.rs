//! Outbound messaging abstractions (Telegram today).

pub mod delivery;
pub mod port;
pub mod throttled;
pub mod types;

#[cfg(test)]
pub(crate) mod recording;
