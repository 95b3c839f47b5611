//! Core library components.
//!
//! This module contains the key management, secret storage, encryption and
//! audit logic. Nothing here prints or prompts; the CLI layer owns all I/O
//! with the user.

pub mod audit;
pub mod cipher;
pub mod config;
pub mod constants;
pub mod engine;
pub mod fsutil;
pub mod keys;
pub mod layout;
pub mod lock;
pub mod types;
pub mod vault;
