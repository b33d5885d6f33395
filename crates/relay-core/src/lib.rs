//! Core domain + application logic for the Telegram LLM relay.
//!
//! This crate is intentionally framework-agnostic. Telegram and OpenRouter live
//! behind ports (traits) implemented in adapter crates.

pub mod chat;
pub mod chunking;
pub mod config;
pub mod domain;
pub mod errors;
pub mod expenses;
pub mod formatting;
pub mod llm;
pub mod logging;
pub mod messaging;
pub mod pricing;
pub mod reconcile;
pub mod storage;

pub use errors::{Error, Result};
