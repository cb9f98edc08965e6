use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::time::current_time_millis;

/// Network-wide logical clock value. Strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PulseNumber(pub u32);

impl PulseNumber {
    pub const FIRST: PulseNumber = PulseNumber(65_537);

    pub fn advance(self, delta: u32) -> Self {
        Self(self.0.saturating_add(delta))
    }
}

impl fmt::Display for PulseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One tick of the pulse source. Each tick starts exactly one consensus round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pulse {
    pub number: PulseNumber,
    pub prev_number: PulseNumber,
    /// Milliseconds since the UNIX epoch at emission.
    pub timestamp: u64,
}

impl Pulse {
    pub fn first() -> Self {
        Self {
            number: PulseNumber::FIRST,
            prev_number: PulseNumber::default(),
            timestamp: current_time_millis(),
        }
    }

    pub fn next(&self, delta: u32) -> Self {
        Self {
            number: self.number.advance(delta),
            prev_number: self.number,
            timestamp: current_time_millis(),
        }
    }
}
