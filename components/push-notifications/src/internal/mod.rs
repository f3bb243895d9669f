/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

pub mod communications;
pub mod config;
pub mod handlers;
pub mod key_codec;
pub mod permission;
pub mod platform;
pub mod session;
pub mod storage;
pub mod subscription;
pub mod unread;
pub mod worker;

pub use config::NotificationConfig;
pub use session::Session;
