//! A pretend rating slider, for trying the tool out without hardware.
//!
//! The slider does a random walk over an integer range and reports its
//! position once per interval, just like the real device prints one line
//! per reading. Open it with the port identifier [DUMMY_PORT].

use crate::error::ConnectionError;
use crate::rating_source::{PortOpener, RatingSource};

use log::info;
use rand::prelude::*;
use std::ops::RangeInclusive;
use std::thread;
use std::time::{Duration, Instant};

/// Port identifier that selects the [DummyRatingSource].
pub const DUMMY_PORT: &str = "dummy";

/// Simulated rating device.
pub struct DummyRatingSource {
    range: RangeInclusive<i32>,
    interval: Duration,
    position: i32,
    next_emit: Instant,
    open: bool,
}

impl DummyRatingSource {
    /// Start configuring a dummy source.
    pub fn builder() -> DummyRatingSourceBuilder {
        DummyRatingSourceBuilder::default()
    }

    fn step(&mut self) -> i32 {
        let mut rng = thread_rng();
        let next = self.position.saturating_add(rng.gen_range(-1..=1));
        self.position = next.clamp(*self.range.start(), *self.range.end());
        self.position
    }
}

impl RatingSource for DummyRatingSource {
    fn identifier(&self) -> &str {
        DUMMY_PORT
    }

    fn read_line_or_timeout(&mut self, timeout: Duration) -> Option<String> {
        if !self.open {
            return None;
        }

        let now = Instant::now();
        let wait = self.next_emit.saturating_duration_since(now);
        if wait > timeout {
            thread::sleep(timeout);
            return None;
        }

        thread::sleep(wait);
        self.next_emit = Instant::now() + self.interval;
        Some(self.step().to_string())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            info!("{} : closed.", DUMMY_PORT);
        }
    }
}

/// Builder for [DummyRatingSource].
#[derive(Debug, Clone)]
pub struct DummyRatingSourceBuilder {
    range: RangeInclusive<i32>,
    interval: Duration,
}

impl Default for DummyRatingSourceBuilder {
    fn default() -> Self {
        Self {
            range: 0..=10,
            interval: Duration::from_millis(250),
        }
    }
}

impl DummyRatingSourceBuilder {
    /// Values the slider can report.
    pub fn range(self, range: RangeInclusive<i32>) -> Self {
        Self { range, ..self }
    }

    /// How often the slider reports.
    pub fn interval(self, interval: Duration) -> Self {
        Self { interval, ..self }
    }

    /// Build the source, starting in the middle of its range. A reversed
    /// range is taken end first.
    pub fn build(self) -> DummyRatingSource {
        let (a, b) = self.range.into_inner();
        let (lo, hi) = (a.min(b), a.max(b));
        let middle = ((lo as i64 + hi as i64) / 2) as i32;
        DummyRatingSource {
            range: lo..=hi,
            interval: self.interval,
            position: middle,
            next_emit: Instant::now(),
            open: true,
        }
    }
}

/// Routes [DUMMY_PORT] to a fresh [DummyRatingSource] and everything else
/// to `inner`.
pub struct WithDummy<O: PortOpener> {
    inner: O,
    dummy: DummyRatingSourceBuilder,
}

impl<O: PortOpener> WithDummy<O> {
    /// Wrap `inner`, building dummies from `dummy`.
    pub fn new(inner: O, dummy: DummyRatingSourceBuilder) -> Self {
        Self { inner, dummy }
    }
}

impl<O: PortOpener> PortOpener for WithDummy<O> {
    fn open(&self, identifier: &str) -> Result<Box<dyn RatingSource>, ConnectionError> {
        if identifier == DUMMY_PORT {
            info!("{} : opened simulated slider.", DUMMY_PORT);
            Ok(Box::new(self.dummy.clone().build()))
        } else {
            self.inner.open(identifier)
        }
    }
}
