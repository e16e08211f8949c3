//! Device time-specs
//!
//! A time-spec is whole seconds plus a fractional part kept in `[0, 1)`.
//! Splitting the two keeps sub-sample precision at large absolute times
//! (a GPS-disciplined device clock is around 1.7e9 seconds).

use std::cmp::Ordering;
use std::ops::{Add, AddAssign};
use std::time::Duration;

/// Device time: whole seconds plus fraction in `[0, 1)`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "RawTimestamp")
)]
pub struct Timestamp {
    secs: i64,
    frac: f64,
}

/// Wire form of [`Timestamp`]; deserialized values pass through
/// [`Timestamp::new`] so the fraction is renormalized
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
#[serde(default)]
struct RawTimestamp {
    secs: i64,
    frac: f64,
}

#[cfg(feature = "serde")]
impl Default for RawTimestamp {
    fn default() -> Self {
        Self { secs: 0, frac: 0.0 }
    }
}

#[cfg(feature = "serde")]
impl From<RawTimestamp> for Timestamp {
    fn from(raw: RawTimestamp) -> Self {
        Timestamp::new(raw.secs, raw.frac)
    }
}

impl Timestamp {
    /// Zero time
    pub const ZERO: Timestamp = Timestamp { secs: 0, frac: 0.0 };

    /// Create a time-spec, carrying any fractional overflow into seconds
    pub fn new(secs: i64, frac: f64) -> Self {
        let mut t = Self { secs, frac };
        t.normalize();
        t
    }

    /// Create from total seconds
    pub fn from_secs_f64(total: f64) -> Self {
        Self::new(0, total)
    }

    /// Whole seconds
    pub fn secs(&self) -> i64 {
        self.secs
    }

    /// Fractional seconds in `[0, 1)`
    pub fn frac(&self) -> f64 {
        self.frac
    }

    /// Total seconds (loses precision at large times)
    pub fn as_secs_f64(&self) -> f64 {
        self.secs as f64 + self.frac
    }

    /// Add seconds, renormalizing the fraction
    pub fn add_secs(&mut self, delta: f64) {
        self.frac += delta;
        self.normalize();
    }

    /// Time-spec `samples` samples later at `rate` samples per second
    pub fn after_samples(&self, samples: usize, rate: f64) -> Self {
        *self + samples as f64 / rate
    }

    fn normalize(&mut self) {
        if !self.frac.is_finite() {
            self.frac = 0.0;
            return;
        }
        let whole = self.frac.floor();
        self.secs += whole as i64;
        self.frac -= whole;
        // floor() of a tiny negative value leaves frac == 1.0 after subtraction
        if self.frac >= 1.0 {
            self.secs += 1;
            self.frac -= 1.0;
        }
    }
}

impl Add<f64> for Timestamp {
    type Output = Timestamp;

    fn add(mut self, rhs: f64) -> Timestamp {
        self.add_secs(rhs);
        self
    }
}

impl AddAssign<f64> for Timestamp {
    fn add_assign(&mut self, rhs: f64) {
        self.add_secs(rhs);
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp::new(
            self.secs + rhs.as_secs() as i64,
            self.frac + f64::from(rhs.subsec_nanos()) * 1e-9,
        )
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.secs.cmp(&other.secs) {
            Ordering::Equal => self.frac.partial_cmp(&other.frac),
            ord => Some(ord),
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{:.9}s", self.secs, self.frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_normalizes_overflow() {
        let t = Timestamp::new(1, 2.5);
        assert_eq!(t.secs(), 3);
        assert!((t.frac() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_new_normalizes_negative_fraction() {
        let t = Timestamp::new(5, -0.25);
        assert_eq!(t.secs(), 4);
        assert!((t.frac() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_add_carries() {
        let mut t = Timestamp::new(0, 0.9);
        t += 0.2;
        assert_eq!(t.secs(), 1);
        assert!((t.frac() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_add_duration() {
        let t = Timestamp::new(2, 0.75) + Duration::from_millis(500);
        assert_eq!(t.secs(), 3);
        assert!((t.frac() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_after_samples() {
        // 1920 samples at 1.92 MHz is exactly 1 ms
        let t = Timestamp::new(7, 0.0).after_samples(1920, 1.92e6);
        assert_eq!(t.secs(), 7);
        assert!((t.frac() - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_ordering() {
        assert!(Timestamp::new(1, 0.9) < Timestamp::new(2, 0.0));
        assert!(Timestamp::new(2, 0.1) > Timestamp::new(2, 0.0));
    }

    #[test]
    fn test_non_finite_fraction_is_dropped() {
        let t = Timestamp::new(4, f64::NAN);
        assert_eq!(t, Timestamp::new(4, 0.0));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_normalizes_fraction() {
        let t: Timestamp = serde_json::from_str(r#"{"secs":1,"frac":2.5}"#).unwrap();
        assert_eq!(t.secs(), 3);
        assert!((t.frac() - 0.5).abs() < 1e-12);

        let t: Timestamp = serde_json::from_str(r#"{"frac":-0.25}"#).unwrap();
        assert_eq!(t.secs(), -1);
        assert!((t.frac() - 0.75).abs() < 1e-12);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialized_form_reads_back() {
        let t = Timestamp::new(1_700_000_000, 0.125);
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#"{"secs":1700000000,"frac":0.125}"#);
        assert_eq!(serde_json::from_str::<Timestamp>(&json).unwrap(), t);
    }

    proptest! {
        #[test]
        fn fraction_stays_in_unit_interval(secs in -1_000i64..1_000, frac in -50.0f64..50.0) {
            let t = Timestamp::new(secs, frac);
            prop_assert!(t.frac() >= 0.0 && t.frac() < 1.0);
        }

        #[test]
        fn addition_preserves_total(secs in 0i64..100_000, frac in 0.0f64..1.0, delta in 0.0f64..10.0) {
            let before = Timestamp::new(secs, frac);
            let after = before + delta;
            prop_assert!(after.frac() >= 0.0 && after.frac() < 1.0);
            let diff = (after.secs() - before.secs()) as f64 + (after.frac() - before.frac());
            prop_assert!((diff - delta).abs() < 1e-9);
        }
    }
}
