/// Virtual time for the routing simulation.
///
/// Represents a simulated timestamp with no dependency on `std::time`.
/// Time advances only when the scheduler processes events, never from
/// wall-clock observation. Latencies and processing delays are real
/// numbers, so the clock is an `f64` with a total order.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A point in simulated time.
///
/// Always finite. Ordering uses `f64::total_cmp`, which makes the type
/// usable as a heap key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VirtualTime(f64);

impl VirtualTime {
    /// The zero-point of simulation time.
    pub const ZERO: VirtualTime = VirtualTime(0.0);

    /// Create a new `VirtualTime` from a raw value.
    ///
    /// # Panics
    /// Panics if `t` is NaN or infinite.
    #[inline]
    pub fn new(t: f64) -> Self {
        assert!(t.is_finite(), "virtual time must be finite, got {}", t);
        VirtualTime(t)
    }

    /// Return the raw value.
    #[inline]
    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// Compute the time that is `delay` units after `self`.
    /// Returns `None` for a negative or non-finite delay.
    #[inline]
    pub fn plus(self, delay: f64) -> Option<VirtualTime> {
        if !(delay >= 0.0) {
            return None;
        }
        let t = self.0 + delay;
        t.is_finite().then_some(VirtualTime(t))
    }

    /// Returns `true` if `self` is strictly before `other`.
    #[inline]
    pub fn is_before(self, other: VirtualTime) -> bool {
        self < other
    }

    /// Elapsed time since `earlier`. Returns `None` if `earlier` is after `self`.
    #[inline]
    pub fn duration_since(self, earlier: VirtualTime) -> Option<f64> {
        (earlier <= self).then(|| self.0 - earlier.0)
    }

    /// The later of two instants.
    #[inline]
    pub fn max(self, other: VirtualTime) -> VirtualTime {
        if other > self {
            other
        } else {
            self
        }
    }
}

impl PartialEq for VirtualTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VirtualTime {}

impl Default for VirtualTime {
    fn default() -> Self {
        VirtualTime::ZERO
    }
}

impl PartialOrd for VirtualTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VirtualTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T={:.3}", self.0)
    }
}
