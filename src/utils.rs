//! Utility functions for the bs440-rust-ble crate.

/// Pounds per kilogram.
const POUNDS_PER_KILOGRAM: f64 = 2.204_622_621_8;

/// Mass unit for presenting weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MassUnit {
    /// Kilograms, the unit the scale reports in.
    #[default]
    Kilograms,
    /// Pounds.
    Pounds,
}

impl MassUnit {
    /// Suggested display unit for a unit system.
    ///
    /// US customary installations get pounds, everyone else kilograms.
    pub fn suggested(us_customary: bool) -> Self {
        if us_customary {
            Self::Pounds
        } else {
            Self::Kilograms
        }
    }

    /// Unit symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Kilograms => "kg",
            Self::Pounds => "lb",
        }
    }

    /// Convert a weight in kilograms into this unit.
    pub fn convert_kilograms(&self, kilograms: f64) -> f64 {
        match self {
            Self::Kilograms => kilograms,
            Self::Pounds => kilograms_to_pounds(kilograms),
        }
    }
}

/// Convert kilograms to pounds.
///
/// # Example
///
/// ```
/// use bs440_rust_ble::kilograms_to_pounds;
///
/// let pounds = kilograms_to_pounds(100.0);
/// assert!((pounds - 220.462).abs() < 0.001);
/// ```
#[inline]
pub fn kilograms_to_pounds(kilograms: f64) -> f64 {
    kilograms * POUNDS_PER_KILOGRAM
}

/// Convert pounds to kilograms.
///
/// # Example
///
/// ```
/// use bs440_rust_ble::pounds_to_kilograms;
///
/// let kilograms = pounds_to_kilograms(220.462_262_18);
/// assert!((kilograms - 100.0).abs() < 0.001);
/// ```
#[inline]
pub fn pounds_to_kilograms(pounds: f64) -> f64 {
    pounds / POUNDS_PER_KILOGRAM
}
