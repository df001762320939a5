//! Alliance station identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::FleetError;

/// One of the six driver stations, three per alliance color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StationId {
    R1,
    R2,
    R3,
    B1,
    B2,
    B3,
}

impl StationId {
    /// All stations in display order.
    pub const ALL: [StationId; 6] = [
        StationId::R1,
        StationId::R2,
        StationId::R3,
        StationId::B1,
        StationId::B2,
        StationId::B3,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StationId::R1 => "R1",
            StationId::R2 => "R2",
            StationId::R3 => "R3",
            StationId::B1 => "B1",
            StationId::B2 => "B2",
            StationId::B3 => "B3",
        }
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StationId {
    type Err = FleetError;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        StationId::ALL
            .into_iter()
            .find(|station| station.as_str() == normalized)
            .ok_or_else(|| FleetError::Validation(format!("Invalid station ID '{}'.", normalized)))
    }
}
