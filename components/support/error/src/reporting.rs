/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Error reporting and breadcrumbs.
//!
//! Reported errors are emitted as `log` records on the `error-reporter::error` target, together
//! with the most recent breadcrumbs. Embedders route that target to whatever crash/telemetry
//! pipeline they have; without one it is just an error log line.

use parking_lot::Mutex;

pub const ERROR_TARGET: &str = "error-reporter::error";
pub const BREADCRUMB_TARGET: &str = "error-reporter::breadcrumb";

static RECENT_BREADCRUMBS: Mutex<BreadcrumbRingBuffer> = Mutex::new(BreadcrumbRingBuffer::new());

/// Report an error with the given grouping class.
pub fn report_error_to_app(report_class: String, message: String) {
    let breadcrumbs = RECENT_BREADCRUMBS.lock().get_breadcrumbs().join("\n");
    log::error!(
        target: ERROR_TARGET,
        "[{}] {} (breadcrumbs: {})",
        report_class,
        message,
        breadcrumbs
    );
}

/// Record a breadcrumb; called by the `breadcrumb!` macro.
pub fn report_breadcrumb(message: String, module: &str, line: u32) {
    log::info!(target: BREADCRUMB_TARGET, "{} ({}:{})", message, module, line);
    RECENT_BREADCRUMBS.lock().push(message);
}

/// Leave a breadcrumb that will be attached to the next reported error.
#[macro_export]
macro_rules! breadcrumb {
    ($($arg:tt)*) => {
        $crate::report_breadcrumb(format!($($arg)*), module_path!(), line!())
    };
}

/// Most recent breadcrumbs, oldest first.
pub fn recent_breadcrumbs() -> Vec<String> {
    RECENT_BREADCRUMBS.lock().get_breadcrumbs()
}

struct BreadcrumbRingBuffer {
    breadcrumbs: Vec<String>,
    pos: usize,
}

impl BreadcrumbRingBuffer {
    const MAX_ITEMS: usize = 20;
    const MAX_LEN: usize = 100;

    const fn new() -> Self {
        Self {
            breadcrumbs: Vec::new(),
            pos: 0,
        }
    }

    fn push(&mut self, breadcrumb: String) {
        let breadcrumb = truncate(breadcrumb, Self::MAX_LEN);
        if self.breadcrumbs.len() < Self::MAX_ITEMS {
            self.breadcrumbs.push(breadcrumb);
        } else {
            self.breadcrumbs[self.pos] = breadcrumb;
            self.pos = (self.pos + 1) % Self::MAX_ITEMS;
        }
    }

    fn get_breadcrumbs(&self) -> Vec<String> {
        let (newest, oldest) = self.breadcrumbs.split_at(self.pos);
        oldest.iter().chain(newest).cloned().collect()
    }
}

fn truncate(s: String, max_len: usize) -> String {
    if s.len() <= max_len {
        return s;
    }
    let split_point = (0..=max_len)
        .rev()
        .find(|i| s.is_char_boundary(*i))
        .unwrap_or(0);
    s[..split_point].to_string()
}
