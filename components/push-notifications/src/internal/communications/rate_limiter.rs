/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{debug, info, warn};
use crate::internal::storage::Storage;

/// The window a limiter is currently counting in, stored as `"<start>:<count>"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Window {
    pub start: u64,
    pub count: u16,
}

impl Window {
    fn parse(s: &str) -> Option<Self> {
        let (start, count) = s.split_once(':')?;
        Some(Self {
            start: start.parse().ok()?,
            count: count.parse().ok()?,
        })
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.count)
    }
}

/// Lets an operation through at most `max_calls` times per window. The window lives in the
/// meta table, so the limit holds across sessions.
pub struct PersistedRateLimiter {
    key: String,
    window_secs: u64,
    max_calls: u16,
}

impl PersistedRateLimiter {
    pub fn new(op_name: &str, window_secs: u64, max_calls: u16) -> Self {
        Self {
            key: format!("ratelimit_{op_name}"),
            window_secs,
            max_calls,
        }
    }

    /// Count a call and say whether it may go ahead.
    pub fn check<S: Storage>(&self, store: &S) -> bool {
        self.check_at(store, now_secs())
    }

    pub(crate) fn check_at<S: Storage>(&self, store: &S, now: u64) -> bool {
        let mut window = self.load(store);
        // A start in the future (the clock went back) keeps the window until it's reached.
        if now.saturating_sub(window.start) >= self.window_secs {
            debug!("{}: new window at {}", self.key, now);
            window = Window {
                start: now,
                count: 0,
            };
        }
        window.count = window.count.saturating_add(1);
        self.save(store, window);

        let allowed = window.count <= self.max_calls;
        if !allowed {
            info!(
                "{}: {} calls since {}, only {} allowed",
                self.key, window.count, window.start, self.max_calls
            );
        }
        allowed
    }

    /// Forget the current window, so the next call goes ahead.
    pub fn reset<S: Storage>(&self, store: &S) {
        if let Err(e) = store.delete_meta(&self.key) {
            warn!("Could not reset {}: {}", self.key, e);
        }
    }

    // Missing or unreadable windows count as empty.
    pub(crate) fn load<S: Storage>(&self, store: &S) -> Window {
        store
            .get_meta(&self.key)
            .ok()
            .flatten()
            .and_then(|s| Window::parse(&s))
            .unwrap_or_default()
    }

    pub(crate) fn save<S: Storage>(&self, store: &S, window: Window) {
        if let Err(e) = store.set_meta(&self.key, &window.to_string()) {
            warn!("Could not persist {}: {}", self.key, e);
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Result;
    use crate::internal::storage::Store;

    const WINDOW: u64 = 24 * 3600;
    const NOW: u64 = 1_700_000_000;

    #[test]
    fn test_window_stored_as_text() -> Result<()> {
        let limiter = PersistedRateLimiter::new("op1", WINDOW, 1);
        let store = Store::open_in_memory()?;
        limiter.save(
            &store,
            Window {
                start: 123,
                count: 321,
            },
        );
        assert_eq!(store.get_meta("ratelimit_op1")?.as_deref(), Some("123:321"));
        assert_eq!(
            limiter.load(&store),
            Window {
                start: 123,
                count: 321
            }
        );
        Ok(())
    }

    #[test]
    fn test_once_per_window() -> Result<()> {
        let limiter = PersistedRateLimiter::new("reconcile", WINDOW, 1);
        let store = Store::open_in_memory()?;
        assert!(limiter.check_at(&store, NOW));
        assert!(!limiter.check_at(&store, NOW + 60));
        assert!(!limiter.check_at(&store, NOW + WINDOW - 1));
        assert!(limiter.check_at(&store, NOW + WINDOW));
        assert_eq!(
            limiter.load(&store),
            Window {
                start: NOW + WINDOW,
                count: 1
            }
        );
        Ok(())
    }

    #[test]
    fn test_several_calls_per_window() -> Result<()> {
        let limiter = PersistedRateLimiter::new("op1", WINDOW, 3);
        let store = Store::open_in_memory()?;
        for i in 0..3 {
            assert!(limiter.check_at(&store, NOW + i));
        }
        assert!(!limiter.check_at(&store, NOW + 3));
        Ok(())
    }

    #[test]
    fn test_reset() -> Result<()> {
        let limiter = PersistedRateLimiter::new("reconcile", WINDOW, 1);
        let store = Store::open_in_memory()?;
        assert!(limiter.check_at(&store, NOW));
        assert!(!limiter.check_at(&store, NOW + 1));
        limiter.reset(&store);
        assert_eq!(store.get_meta("ratelimit_reconcile")?, None);
        assert!(limiter.check_at(&store, NOW + 2));
        Ok(())
    }

    #[test]
    fn test_garbage_window() -> Result<()> {
        let limiter = PersistedRateLimiter::new("op1", WINDOW, 5);
        let store = Store::open_in_memory()?;
        for garbage in ["lots", "-1:2", "12:", "1:99999"] {
            store.set_meta("ratelimit_op1", garbage)?;
            assert!(limiter.check(&store));
            assert_eq!(limiter.load(&store).count, 1);
        }
        Ok(())
    }

    #[test]
    fn test_clock_going_backwards() -> Result<()> {
        let limiter = PersistedRateLimiter::new("op1", WINDOW, 1);
        let store = Store::open_in_memory()?;
        limiter.save(
            &store,
            Window {
                start: NOW,
                count: 1,
            },
        );
        assert!(!limiter.check_at(&store, NOW - 10));
        Ok(())
    }
}
