/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

#![allow(unknown_lints)]
#![warn(rust_2018_idioms)]
//! # Push Notifications Component
//!
//! This component delivers Team Monitoring notifications (leave approvals, reminders and the
//! like) through the [Push API](https://developer.mozilla.org/en-US/docs/Web/API/Push_API), even
//! while the app isn't open.
//!
//! ## Background Concepts
//!
//! ### Two halves
//!
//! The foreground half runs with the app. It registers a *background worker*, asks the user for
//! notification permission, and creates a push subscription keyed to the backend's VAPID public
//! key. The subscription (an endpoint URL and two client keys) is then uploaded to the backend,
//! which uses it to send pushes.
//!
//! The background half runs in the worker. It receives the pushes, shows them as notifications,
//! and handles clicks on them by focusing an app window or opening a new one.
//!
//! ### Platform bindings
//!
//! Nothing here talks to the browser or the OS directly. The embedder implements the traits in
//! [`WorkerContainer`], [`PushService`], [`PermissionPlatform`] and [`WorkerGlobalScope`], and
//! hands them in.
//!
//! ## API
//!
//! ### Foreground
//!
//! Calls are handled by the [`NotificationService`]:
//!
//! ```ignore
//! let service = NotificationService::new(config, bindings)?;
//! if service.should_show_dialog() && service.open_dialog() {
//!     // render service.dialog_view(), then on "Enable":
//!     service.enable_notifications();
//! }
//! ```
//!
//! [`NotificationService::reconcile`] should be called now and then (at startup is fine); it's
//! rate limited and brings the backend in line with the platform's subscription.
//!
//! ### Background
//!
//! The worker creates one [`WorkerRuntime`], seeded with the lifecycle state the platform
//! reports, and hands it every event:
//!
//! ```ignore
//! let runtime = WorkerRuntime::new(config, scope, WorkerState::Activated);
//! let event = ExtendableEvent::new();
//! runtime.dispatch(WorkerEvent::Push { data }, &event)?;
//! // the platform keeps the worker alive until event.is_settled()
//! ```

// All implementation detail lives in the `internal` module
mod internal;
use std::time::Instant;

use parking_lot::Mutex;
mod error;

use error_support::handle_error;
use internal::communications::ConnectHttp;
use internal::storage::Store;

pub use error::{debug, ApiResult, Error, NotificationApiError};
pub use internal::config::{NotificationConfig, Protocol};
pub use internal::handlers::{
    ClickOutcome, ExtendableEvent, KeepAlive, NotificationPayload, WorkerEvent, WorkerRuntime,
    SYNC_NOTIFICATIONS_TAG,
};
pub use internal::key_codec::{
    decode_key, encode_key, validate_vapid_key, KeyFormatError, VAPID_KEY_LENGTH,
};
pub use internal::permission::{DialogAction, DialogView, PermissionFlowState};
pub use internal::platform::{
    ClientQuery, NotificationAction, NotificationOptions, PermissionPlatform, PermissionState,
    PlatformError, PlatformSubscription, PushService, RegistrationHandle, ShownNotification,
    SubscribeOptions, WindowClient, WorkerContainer, WorkerGlobalScope,
};
pub use internal::session::PlatformBindings;
pub use internal::subscription::{SubscriptionRecord, VapidKeyMaterial};
pub use internal::unread::UnreadCountPoller;
pub use internal::worker::WorkerState;

/// The foreground entry point: worker registration, the permission dialog and the push
/// subscription.
pub struct NotificationService {
    // We serialize all access on a mutex; the platform calls behind it block anyway.
    internal: Mutex<internal::Session<ConnectHttp, Store>>,
}

impl NotificationService {
    /// Creates a new [`NotificationService`] and works out the permission flow's starting point.
    ///
    /// A platform without push support isn't an error here: the service comes up with the flow
    /// unprompted and every subscribe attempt reports the platform as unsupported.
    ///
    /// # Errors
    /// Returns an error when the preferences database at `database_path` can't be opened.
    #[handle_error(Error)]
    pub fn new(config: NotificationConfig, bindings: PlatformBindings) -> ApiResult<Self> {
        debug!(
            "NotificationService server_host: {}, http_protocol: {}",
            config.server_host, config.http_protocol
        );
        let mut session = internal::Session::new(config, bindings)?;
        session.initialize()?;
        Ok(Self {
            internal: Mutex::new(session),
        })
    }

    /// Register the background worker, or return the existing registration.
    ///
    /// # Errors
    ///   - The platform has no background worker support
    ///   - The worker script couldn't be registered or never activated
    #[handle_error(Error)]
    pub fn register_worker(&self) -> ApiResult<RegistrationHandle> {
        self.internal.lock().register_worker()
    }

    /// Whether the platform holds a push subscription for our worker. Never asks the backend.
    pub fn is_subscribed(&self) -> bool {
        self.internal.lock().is_subscribed()
    }

    pub fn permission_state(&self) -> PermissionState {
        self.internal.lock().permission_state()
    }

    /// The backend's VAPID public key, fetched once and then cached.
    ///
    /// # Errors
    ///   - The backend couldn't be reached
    ///   - The key isn't valid base64url or isn't a P-256 public key
    #[handle_error(Error)]
    pub fn fetch_vapid_key(&self) -> ApiResult<VapidKeyMaterial> {
        self.internal.lock().fetch_vapid_key()
    }

    /// Subscribe and upload the subscription, without the dialog. The permission must already
    /// be granted.
    #[handle_error(Error)]
    pub fn subscribe(&self) -> ApiResult<SubscriptionRecord> {
        self.internal.lock().subscribe()
    }

    /// Unsubscribe on the backend, then on the platform.
    ///
    /// # Returns
    /// `false` when there was no subscription to remove.
    #[handle_error(Error)]
    pub fn unsubscribe(&self) -> ApiResult<bool> {
        self.internal.lock().unsubscribe()
    }

    /// Retry a pending backend cleanup and re-upload the current subscription.
    ///
    /// # Returns
    /// `false` when the sweep was skipped because one ran recently.
    #[handle_error(Error)]
    pub fn reconcile(&self) -> ApiResult<bool> {
        self.internal.lock().reconcile()
    }

    /// Ask the backend to push a test notification to this user.
    #[handle_error(Error)]
    pub fn send_test_notification(&self) -> ApiResult<()> {
        self.internal.lock().send_test_notification()
    }

    /// Fetch the unread count if the poll interval has elapsed.
    ///
    /// # Returns
    /// `None` when it's too early to poll again; see [`NotificationService::last_unread_count`].
    #[handle_error(Error)]
    pub fn poll_unread_count(&self) -> ApiResult<Option<u64>> {
        self.internal.lock().poll_unread_count(Instant::now())
    }

    pub fn last_unread_count(&self) -> Option<u64> {
        self.internal.lock().last_unread_count()
    }

    pub fn should_show_dialog(&self) -> bool {
        self.internal.lock().should_show_dialog()
    }

    /// Returns whether the dialog should actually open.
    pub fn open_dialog(&self) -> bool {
        self.internal.lock().open_dialog()
    }

    pub fn set_dont_show_again(&self, checked: bool) {
        self.internal.lock().set_dont_show_again(checked)
    }

    /// Run the enable flow. Failures don't come back as errors, they land in
    /// [`DialogView::error`].
    pub fn enable_notifications(&self) -> PermissionFlowState {
        self.internal.lock().enable_notifications()
    }

    pub fn disable_notifications(&self) -> PermissionFlowState {
        self.internal.lock().disable_notifications()
    }

    /// Close the dialog, remembering "don't show again" if it was checked.
    #[handle_error(Error)]
    pub fn close_dialog(&self, dont_show_again: bool) -> ApiResult<()> {
        self.internal.lock().close_dialog(dont_show_again)
    }

    pub fn dialog_view(&self) -> DialogView {
        self.internal.lock().dialog_view()
    }

    pub fn permission_flow_state(&self) -> PermissionFlowState {
        self.internal.lock().flow_state()
    }
}
