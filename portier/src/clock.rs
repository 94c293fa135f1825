//! Wall-clock time as seen by claim validation
//!
//! Expiry checks read the current time through the [`Clock`] trait so that
//! tests can pin "now" to an exact second instead of racing the system clock.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::SystemTime,
};

use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};

/// Seconds elapsed since 1970-01-01T00:00:00Z
///
/// This is the representation used by the `exp` and `iat` claims.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct UnixTime(pub u64);

impl UnixTime {
    /// The time `secs` seconds after this one, saturating at the maximum
    #[must_use]
    pub const fn plus(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// The time `secs` seconds before this one, saturating at the epoch
    #[must_use]
    pub const fn minus(self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs))
    }
}

impl From<SystemTime> for UnixTime {
    #[inline]
    fn from(t: SystemTime) -> Self {
        // A clock behind the epoch reads as the end of time, so every
        // expiry check fails closed
        let secs = t
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(u64::MAX, |d| d.as_secs());

        Self(secs)
    }
}

impl Serialize for UnixTime {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UnixTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NumericDateVisitor)
    }
}

struct NumericDateVisitor;

impl<'de> Visitor<'de> for NumericDateVisitor {
    type Value = UnixTime;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative NumericDate")
    }

    fn visit_u64<E: de::Error>(self, secs: u64) -> Result<UnixTime, E> {
        Ok(UnixTime(secs))
    }

    fn visit_i64<E: de::Error>(self, secs: i64) -> Result<UnixTime, E> {
        u64::try_from(secs)
            .map(UnixTime)
            .map_err(|_| E::custom("NumericDate out of range"))
    }

    // Some issuers emit NumericDate values with a fractional part
    fn visit_f64<E: de::Error>(self, secs: f64) -> Result<UnixTime, E> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(E::custom("NumericDate out of range"));
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(UnixTime(secs.trunc() as u64))
    }
}

/// A source of the current time
pub trait Clock {
    /// The current time according to this clock
    fn now(&self) -> UnixTime;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now(&self) -> UnixTime {
        C::now(self)
    }
}

impl<C: Clock + ?Sized> Clock for &'_ C {
    #[inline]
    fn now(&self) -> UnixTime {
        C::now(self)
    }
}

/// The system clock as provided by `std::time::SystemTime`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct System;

impl Clock for System {
    #[inline]
    fn now(&self) -> UnixTime {
        UnixTime::from(SystemTime::now())
    }
}

/// A manually driven clock for tests
///
/// Clones share the same underlying time, so a verifier holding one clone
/// observes adjustments made through another.
#[derive(Clone, Debug, Default)]
pub struct TestClock(Arc<AtomicU64>);

impl TestClock {
    /// Creates a clock stopped at `time`
    #[must_use]
    pub fn new(time: UnixTime) -> Self {
        Self(Arc::new(AtomicU64::new(time.0)))
    }

    /// Moves the clock to `time`
    pub fn set(&self, time: UnixTime) {
        self.0.store(time.0, Ordering::SeqCst);
    }

    /// Moves the clock forward by `secs` seconds
    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    #[inline]
    fn now(&self) -> UnixTime {
        UnixTime(self.0.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    #[test]
    fn test_clock_clones_share_time() {
        let clock = TestClock::new(UnixTime(1_000));
        let observer = clock.clone();

        clock.advance(5);

        assert_eq!(observer.now(), UnixTime(1_005));
    }

    #[test]
    fn numeric_date_accepts_fractional_seconds() -> Result<()> {
        let t: UnixTime = serde_json::from_str("1700000000.75")?;
        assert_eq!(t, UnixTime(1_700_000_000));
        Ok(())
    }

    #[test]
    fn numeric_date_keeps_large_integers_exact() -> Result<()> {
        let t: UnixTime = serde_json::from_str("9007199254740993")?;
        assert_eq!(t, UnixTime(9_007_199_254_740_993));
        Ok(())
    }

    #[test]
    fn numeric_date_rejects_negative_values() {
        assert!(serde_json::from_str::<UnixTime>("-1.5").is_err());
        assert!(serde_json::from_str::<UnixTime>("-1").is_err());
    }
}
