//! The session clock. Every rating is stamped with the time elapsed since
//! the clock was last started, and [Timestamp] renders that offset the way
//! it is written into the session log: `HH:MM:SS.ss`.

use std::{
    fmt::{self, Display},
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

/// A session-relative time source. Shared between the controller, which
/// starts it, and the polling thread, which reads it.
pub trait SessionClock: Send + Sync {
    /// Record the session origin. Calling it again restarts the clock.
    fn start(&self);

    /// Time since the origin. Never decreases between calls within one
    /// session, and is zero before the first `start()`.
    fn elapsed(&self) -> Duration;
}

/// The real clock, backed by [Instant].
#[derive(Debug, Default)]
pub struct MonotonicClock {
    origin: Mutex<Option<Instant>>,
}

impl MonotonicClock {
    /// A clock that has not been started yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionClock for MonotonicClock {
    fn start(&self) {
        *self.origin.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    fn elapsed(&self) -> Duration {
        self.origin
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|origin| origin.elapsed())
            .unwrap_or(Duration::ZERO)
    }
}

/// A clock that only moves when told to. Handy for simulations and for
/// driving the controller deterministically.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    /// A clock sitting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump to `offset`. Offsets earlier than the current reading are
    /// ignored so the clock stays monotonic.
    pub fn set(&self, offset: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = (*now).max(offset);
    }

    /// Move the clock forward by `step`.
    pub fn advance(&self, step: Duration) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) += step;
    }
}

impl SessionClock for ManualClock {
    fn start(&self) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = Duration::ZERO;
    }

    fn elapsed(&self) -> Duration {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An offset from the session origin, printed as `HH:MM:SS.ss`. Fractions
/// below a hundredth of a second are truncated, and the hour field grows
/// past two digits rather than wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(Duration);

impl Timestamp {
    /// Wrap an offset.
    pub fn new(offset: Duration) -> Self {
        Self(offset)
    }

    /// Build from the printed fields, the inverse of [Display]. `None` if
    /// minutes or seconds reach 60, centiseconds reach 100, or the total
    /// does not fit.
    pub fn from_parts(hours: u64, minutes: u64, seconds: u64, centis: u64) -> Option<Self> {
        if minutes >= 60 || seconds >= 60 || centis >= 100 {
            return None;
        }
        let whole = hours
            .checked_mul(3600)?
            .checked_add(minutes * 60 + seconds)?;
        Some(Self(Duration::new(whole, centis as u32 * 10_000_000)))
    }

    /// The raw offset.
    pub fn offset(&self) -> Duration {
        self.0
    }

    /// The offset in whole hundredths of a second.
    pub fn centiseconds(&self) -> u128 {
        self.0.as_millis() / 10
    }
}

impl From<Duration> for Timestamp {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let centis = self.centiseconds();
        let (whole, frac) = (centis / 100, centis % 100);
        write!(
            f,
            "{:02}:{:02}:{:02}.{:02}",
            whole / 3600,
            (whole / 60) % 60,
            whole % 60,
            frac
        )
    }
}
