//! Subswitch - Subscription-driven proxy switcher
//!
//! Keeps a local proxy engine pointed at a working upstream server taken
//! from an SSR/SS subscription.
//!
//! ## Features
//!
//! - SSR and Shadowsocks (SIP002 and legacy) link parsing
//! - Priority-aware random selection with a time-limited blacklist
//! - Engine activation through config file, process restart and control API
//! - Periodic health monitoring with automatic failover
//! - Status and re-trigger HTTP endpoints

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod proxy;
pub mod services;
pub mod subscription;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{Result, SubswitchError};
