//! Energy classification from duration and loudness.
//!
//! The classifier is a pure, total function: every `(duration_ms,
//! loudness_db)` pair maps to exactly one [`EnergyClass`], and equal
//! inputs always produce the same label.

use std::fmt;

/// Duration threshold separating short from long material (one minute).
const DURATION_THRESHOLD_MS: u64 = 60_000;

/// Loudness threshold in dBFS separating loud from quiet material.
const LOUDNESS_THRESHOLD_DB: f64 = -20.0;

/// Closed label set for audio energy classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnergyClass {
    /// Short and loud: duration < 60s and loudness > -20 dBFS.
    HighEnergy,
    /// Long and quiet: duration >= 60s and loudness <= -20 dBFS.
    LowEnergy,
    /// Everything else.
    MediumEnergy,
}

impl EnergyClass {
    /// Returns the label as stored in the record table.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighEnergy => "High Energy",
            Self::LowEnergy => "Low Energy",
            Self::MediumEnergy => "Medium Energy",
        }
    }

    /// Parses a stored label back into an [`EnergyClass`].
    ///
    /// Returns `None` for labels outside the closed set.
    #[must_use]
    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value {
            "High Energy" => Some(Self::HighEnergy),
            "Low Energy" => Some(Self::LowEnergy),
            "Medium Energy" => Some(Self::MediumEnergy),
            _ => None,
        }
    }
}

impl fmt::Display for EnergyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies audio by duration and loudness.
///
/// Decision table, evaluated in order:
///
/// | duration_ms | loudness_db | label        |
/// |-------------|-------------|--------------|
/// | < 60000     | > -20       | HighEnergy   |
/// | >= 60000    | <= -20      | LowEnergy    |
/// | otherwise   | otherwise   | MediumEnergy |
///
/// A loudness of negative infinity (silent artifact) falls into the
/// `<= -20` branch; NaN loudness fails both comparisons and lands in
/// `MediumEnergy`.
#[must_use]
pub fn classify(duration_ms: u64, loudness_db: f64) -> EnergyClass {
    if duration_ms < DURATION_THRESHOLD_MS && loudness_db > LOUDNESS_THRESHOLD_DB {
        EnergyClass::HighEnergy
    } else if duration_ms >= DURATION_THRESHOLD_MS && loudness_db <= LOUDNESS_THRESHOLD_DB {
        EnergyClass::LowEnergy
    } else {
        EnergyClass::MediumEnergy
    }
}
