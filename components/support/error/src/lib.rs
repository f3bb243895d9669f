/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

#![warn(rust_2018_idioms)]

//! Shared error plumbing for the workspace components.
//!
//! Components define an internal error enum and a public one, implement [`GetErrorHandling`]
//! on the internal enum, and annotate their public functions with [`handle_error`].

// Lets `#[handle_error]` be used in this crate's own tests.
extern crate self as error_support;

mod handling;
mod redact;
mod reporting;

pub use error_support_macros::handle_error;
pub use handling::{convert_log_report_error, ErrorHandling, ErrorReporting, GetErrorHandling};
pub use redact::{redact_key, redact_url};
pub use reporting::{
    recent_breadcrumbs, report_breadcrumb, report_error_to_app, BREADCRUMB_TARGET, ERROR_TARGET,
};

// Components log through us so they don't each need a `log` dependency.
pub use log::{debug, error, info, trace, warn};

/// Initialize logging for tests. `RUST_LOG` configures it; repeated calls are fine.
///
/// Only built with the `testing` feature, which crates enable from their dev-dependencies.
#[cfg(any(test, feature = "testing"))]
pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
