//! Domain models shared across the controller

pub mod device;
pub mod station;
