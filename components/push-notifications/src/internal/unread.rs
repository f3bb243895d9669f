/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Keeps the unread badge count fresh by polling the backend on a fixed interval. Independent
//! of push: a client without a subscription still gets a count.

use std::time::{Duration, Instant};

use crate::error::{trace, warn, Result};

pub struct UnreadCountPoller {
    interval: Duration,
    last_poll: Option<Instant>,
    last_count: Option<u64>,
}

impl UnreadCountPoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_poll: None,
            last_count: None,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.last_poll
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval)
    }

    /// The last count we got, if any poll succeeded.
    pub fn last_count(&self) -> Option<u64> {
        self.last_count
    }

    /// Poll if the interval has elapsed. Returns the fresh count, or `None` when not due.
    ///
    /// A failed poll still waits out the interval before the next attempt, and keeps the last
    /// good count.
    pub fn poll_if_due(
        &mut self,
        now: Instant,
        fetch: impl FnOnce() -> Result<u64>,
    ) -> Result<Option<u64>> {
        if !self.is_due(now) {
            return Ok(None);
        }
        self.last_poll = Some(now);
        match fetch() {
            Ok(count) => {
                trace!("unread count: {}", count);
                self.last_count = Some(count);
                Ok(Some(count))
            }
            Err(e) => {
                warn!("Polling the unread count failed: {}", e);
                Err(e)
            }
        }
    }
}
