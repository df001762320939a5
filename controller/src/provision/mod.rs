//! Agent provisioning over SSH

pub mod job;
pub mod netcfg;
pub mod orchestrator;
pub mod remote;
pub mod request;
pub mod script;
pub mod ssh;
