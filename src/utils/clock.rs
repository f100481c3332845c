// ABOUTME: Time source abstraction used for every expiry and issued-at decision
// ABOUTME: SystemClock for production, MockClock for deterministic tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Current time provider
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;

    /// Current instant as Unix seconds
    fn unix_now(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock
#[derive(Debug)]
pub struct MockClock {
    now: Mutex<DateTime<Utc>>,
}

impl MockClock {
    /// Clock frozen at `now`
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.lock();
        *now += by;
    }

    /// Jump to an absolute instant
    pub fn set(&self, to: DateTime<Utc>) {
        *self.lock() = to;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        // A poisoned clock still holds a valid instant
        self.now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_advances() {
        let start = Utc::now();
        let clock = MockClock::new(start);
        clock.advance(Duration::seconds(601));
        assert_eq!(clock.now(), start + Duration::seconds(601));
        assert_eq!(clock.unix_now(), (start + Duration::seconds(601)).timestamp());
    }
}
