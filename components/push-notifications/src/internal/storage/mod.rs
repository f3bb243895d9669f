/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Handles client-side storage
//!
//! Mainly exposes a trait, [`Storage`] and a concrete type that implements the trait, [`Store`]
//!
//! Everything we keep is a small string value under a well known key:
//! - The user's last explicit choice in the permission dialog, and whether they asked not to be
//!   prompted again. Both are advisory; the platform stays the authority on permission and
//!   subscription state.
//! - An endpoint the backend still has to forget, when telling it failed during unsubscribe.
//! - Rate limiter counters.

mod db;
mod schema;

pub use self::db::{PrefsDb as Store, Storage};
