//! Server selection, failover and health monitoring
//!
//! This module provides:
//! - Time-limited blacklist of failed servers
//! - Endpoint and tunnel connectivity probes
//! - Priority-aware random selection
//! - The single-flight selection-and-failover controller
//! - Periodic health monitoring of the active server

pub mod blacklist;
pub mod controller;
pub mod health;
pub mod probe;
pub mod selection;

pub use blacklist::BlacklistStore;
pub use controller::{Controller, ControllerPolicy, CycleOutcome, HealthOutcome, Trigger};
pub use health::{HealthMonitor, HealthMonitorConfig, HealthMonitorHandle};
pub use probe::{ConnectivityProber, Prober};
