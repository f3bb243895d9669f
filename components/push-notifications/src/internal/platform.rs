/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The platform seam.
//!
//! Everything this crate needs from the browser or the OS goes through the traits in this
//! module. An embedder implements them, usually by forwarding to the platform's own
//! service-worker, push and notification APIs. Calls are blocking; an implementation that wraps
//! an async platform API is expected to block until the platform promise settles.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::WorkerState;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    /// The capability doesn't exist on this platform.
    #[error("Not supported: {0}")]
    Unsupported(String),

    /// The platform refused the request (e.g. the user blocked it).
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Platform call failed: {0}")]
    Failed(String),
}

/// The notification permission as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    #[default]
    Default,
    Granted,
    Denied,
}

impl Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PermissionState::Default => "default",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        })
    }
}

impl FromStr for PermissionState {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "default" | "prompt" => PermissionState::Default,
            "granted" => PermissionState::Granted,
            "denied" => PermissionState::Denied,
            other => {
                return Err(PlatformError::Failed(format!(
                    "Unknown permission state {other}"
                )))
            }
        })
    }
}

/// A registered background worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationHandle {
    pub scope: String,
    pub script_url: String,
    pub state: WorkerState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Every push must result in a visible notification. Always `true` here.
    pub user_visible_only: bool,
    /// The decoded VAPID public key.
    pub application_server_key: Vec<u8>,
}

/// The platform's subscription object, with its keys as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSubscription {
    pub endpoint: String,
    pub p256dh: Vec<u8>,
    pub auth: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

impl NotificationAction {
    pub fn new(action: &str, title: &str) -> Self {
        Self {
            action: action.to_string(),
            title: title.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: Option<String>,
    /// Milliseconds since the epoch.
    pub timestamp: Option<u64>,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
}

/// A notification that was shown by the worker, handed back on click and close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShownNotification {
    pub title: String,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
    pub id: String,
    pub url: String,
    pub focused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientQuery {
    pub include_uncontrolled: bool,
}

/// The foreground side of background worker registration.
#[cfg_attr(test, mockall::automock)]
pub trait WorkerContainer: Send + Sync {
    /// Whether the platform has both a worker container and a push manager.
    fn is_supported(&self) -> bool;

    fn get_registration(&self, scope: &str) -> Result<Option<RegistrationHandle>, PlatformError>;

    fn register(&self, script_url: &str, scope: &str)
        -> Result<RegistrationHandle, PlatformError>;

    /// Blocks until the registration for `scope` has an activated worker.
    fn ready(&self, scope: &str) -> Result<RegistrationHandle, PlatformError>;
}

/// The platform push manager of a registration.
#[cfg_attr(test, mockall::automock)]
pub trait PushService: Send + Sync {
    fn subscribe(
        &self,
        registration: &RegistrationHandle,
        options: &SubscribeOptions,
    ) -> Result<PlatformSubscription, PlatformError>;

    fn get_subscription(
        &self,
        registration: &RegistrationHandle,
    ) -> Result<Option<PlatformSubscription>, PlatformError>;

    fn unsubscribe(&self, registration: &RegistrationHandle) -> Result<bool, PlatformError>;

    /// Sent to the backend along with the subscription.
    fn user_agent(&self) -> String;
}

#[cfg_attr(test, mockall::automock)]
pub trait PermissionPlatform: Send + Sync {
    fn permission(&self) -> PermissionState;

    /// Shows the platform prompt. Only ever called while the permission is `Default`.
    fn request_permission(&self) -> Result<PermissionState, PlatformError>;
}

/// What the background worker can do to the world outside it.
#[cfg_attr(test, mockall::automock)]
pub trait WorkerGlobalScope: Send + Sync {
    fn skip_waiting(&self) -> Result<(), PlatformError>;

    fn claim_clients(&self) -> Result<(), PlatformError>;

    fn show_notification(
        &self,
        title: &str,
        options: &NotificationOptions,
    ) -> Result<(), PlatformError>;

    fn close_notification(&self, notification: &ShownNotification);

    fn match_all_clients(&self, query: ClientQuery) -> Result<Vec<WindowClient>, PlatformError>;

    fn focus_client(&self, client_id: &str) -> Result<(), PlatformError>;

    fn open_window(&self, url: &str) -> Result<(), PlatformError>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_permission_state_strings() {
        for state in [
            PermissionState::Default,
            PermissionState::Granted,
            PermissionState::Denied,
        ] {
            assert_eq!(state.to_string().parse::<PermissionState>().unwrap(), state);
        }
        assert_eq!(
            "prompt".parse::<PermissionState>().unwrap(),
            PermissionState::Default
        );
        assert!("maybe".parse::<PermissionState>().is_err());
    }
}
