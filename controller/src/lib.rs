//! Field network controller library
//!
//! Switch drivers, per-device health monitoring, agent provisioning over SSH
//! and remote station stop ingestion.

pub mod app;
pub mod devices;
pub mod drivers;
pub mod errors;
pub mod filesys;
pub mod health;
pub mod logs;
pub mod models;
pub mod probe;
pub mod provision;
pub mod scanner;
pub mod server;
pub mod stations;
pub mod storage;
pub mod utils;
pub mod workers;
