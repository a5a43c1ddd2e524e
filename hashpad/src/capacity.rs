use serde::Serialize;

/// Reference ceiling for a shareable link.
pub const MAX_CHANNEL_LENGTH: usize = 2048;

/// One extra character for the `#` delimiter in front of the fragment.
const DELIMITER_LENGTH: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacitySnapshot {
    pub used_fraction: f64,
    pub over_limit: bool,
}

impl CapacitySnapshot {
    pub fn empty() -> Self {
        Self {
            used_fraction: 0.0,
            over_limit: false,
        }
    }

    /// Rounded percentage for display; can exceed 100.
    pub fn percent_used(&self) -> u32 {
        (self.used_fraction * 100.0).round() as u32
    }

    pub fn readout(&self) -> CapacityReadout {
        CapacityReadout {
            percent_used: self.percent_used(),
            over_limit: self.over_limit,
        }
    }
}

impl Default for CapacitySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityReadout {
    pub percent_used: u32,
    pub over_limit: bool,
}

/// Classifies an encoded channel value against `max_length`. Does not block anything itself.
pub fn assess(channel_value: &str, max_length: usize) -> CapacitySnapshot {
    let used = channel_value.len() + DELIMITER_LENGTH;
    CapacitySnapshot {
        used_fraction: used as f64 / max_length as f64,
        over_limit: used > max_length,
    }
}
