use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Job completion, as a whole percentage between 0 and 100 inclusive.
///
/// On the wire this is a JSON number. Fractional values are accepted and
/// rounded to the nearest whole percent; anything outside `0..=100` (or not
/// finite) is rejected when deserializing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "u8")]
pub struct Percent(u8);

impl Percent {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(100);

    /// Validating constructor.
    pub fn new(value: u8) -> Option<Self> {
        (value <= 100).then_some(Self(value))
    }

    /// Clamping constructor, for values that come from somewhere other than
    /// the wire (and therefore should never be rejected).
    pub fn saturating(value: u8) -> Self {
        Self(value.min(100))
    }

    /// Lenient counterpart of `TryFrom<f64>`: rounds, then clamps into
    /// `0..=100`. Not-a-number becomes zero.
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        // Clamped; the cast cannot truncate.
        Self(value.round().clamp(0.0, 100.0) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}
// Plain `ErrorKind` (rather than `Exn`) so serde can report it directly.
impl TryFrom<f64> for Percent {
    type Error = ErrorKind;
    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(ErrorKind::PercentOutOfRange(value));
        }
        // Range checked above; the cast cannot truncate.
        Ok(Self(value.round() as u8))
    }
}
impl From<Percent> for u8 {
    fn from(value: Percent) -> Self {
        value.0
    }
}
impl Display for Percent {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}%", self.0)
    }
}
