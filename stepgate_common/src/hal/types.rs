//! Values exchanged with servo drivers.

/// Position on the driver interface, always within `[0.0, 1.0]`.
///
/// 0.0 is one end stop of the physical travel, 1.0 the other.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct NormalizedPosition(f64);

impl NormalizedPosition {
    /// Lower end stop.
    pub const MIN: Self = Self(0.0);
    /// Upper end stop.
    pub const MAX: Self = Self(1.0);

    /// Accept `value` only if it is finite and within `[0.0, 1.0]`.
    pub fn new(value: f64) -> Option<Self> {
        (0.0..=1.0).contains(&value).then_some(Self(value))
    }

    /// Clamp `value` into `[0.0, 1.0]`. NaN maps to 0.0.
    pub fn saturating(value: f64) -> Self {
        if value.is_nan() {
            return Self::MIN;
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// Raw value.
    #[inline]
    pub const fn value(self) -> f64 {
        self.0
    }
}
