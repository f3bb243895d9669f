/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Error handling for the component.
//!
//! [`Error`] is what the Rust code uses internally. The public API converts it to
//! [`NotificationApiError`], which only keeps the distinctions a consumer can act on. The
//! conversion also decides what gets logged and what gets reported.

use error_support::{ErrorHandling, GetErrorHandling};

use crate::internal::key_codec::KeyFormatError;
use crate::internal::platform::PlatformError;

pub use error_support::{debug, error, info, trace, warn};

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub type ApiResult<T, E = NotificationApiError> = std::result::Result<T, E>;

/// Errors returned by the public API.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NotificationApiError {
    /// No background worker or push capability. Notifications stay disabled for the session.
    #[error("Notifications are unavailable: {reason}")]
    UnsupportedPlatform { reason: String },

    /// The backend handed out a VAPID key we can't use.
    #[error("Invalid server key: {reason}")]
    KeyFormat { reason: String },

    /// The VAPID key couldn't be fetched. Retrying is up to the user.
    #[error("Could not fetch the server key: {reason}")]
    KeyFetch { reason: String },

    /// The platform refused to create a push subscription.
    #[error("Subscription failed: {reason}")]
    Subscription { reason: String },

    /// A push body that couldn't be parsed. Only ever handled inside the worker.
    #[error("Malformed push payload: {reason}")]
    PayloadParse { reason: String },

    /// Transient backend failure.
    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Unexpected error: {reason}")]
    Other { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatformError(String),

    #[error(transparent)]
    KeyFormatError(#[from] KeyFormatError),

    #[error("Key fetch error: {0}")]
    KeyFetchError(String),

    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    #[error("Payload parse error: {0}")]
    PayloadParseError(String),

    #[error("Worker is {from:?}, can't move to {to:?}")]
    InvalidWorkerTransition {
        from: crate::WorkerState,
        to: crate::WorkerState,
    },

    #[error("Platform error: {0}")]
    PlatformError(#[from] PlatformError),

    /// A Client communication error
    #[error("Communication Error: {0:?}")]
    CommunicationError(String),

    /// An error returned from the backend
    #[error("Communication Server Error: {0:?}")]
    CommunicationServerError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Storage Error: {0:?}")]
    StorageError(String),

    #[error("Error executing SQL: {0}")]
    StorageSqlError(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("URL parse error: {0:?}")]
    UrlParseError(#[from] url::ParseError),

    #[error("General Error: {0:?}")]
    GeneralError(String),
}

impl GetErrorHandling for Error {
    type ExternalError = NotificationApiError;

    fn get_error_handling(&self) -> ErrorHandling<Self::ExternalError> {
        match self {
            Self::UnsupportedPlatformError(reason) => {
                ErrorHandling::convert(NotificationApiError::UnsupportedPlatform {
                    reason: reason.clone(),
                })
                .log_info()
            }
            Self::KeyFormatError(e) => ErrorHandling::convert(NotificationApiError::KeyFormat {
                reason: e.to_string(),
            })
            .report_error("push-notifications-key-format"),
            Self::KeyFetchError(reason) => {
                ErrorHandling::convert(NotificationApiError::KeyFetch {
                    reason: reason.clone(),
                })
                .log_warning()
            }
            Self::SubscriptionError(reason) => {
                ErrorHandling::convert(NotificationApiError::Subscription {
                    reason: reason.clone(),
                })
                .log_warning()
            }
            Self::PayloadParseError(reason) => {
                ErrorHandling::convert(NotificationApiError::PayloadParse {
                    reason: reason.clone(),
                })
                .log_info()
            }
            Self::HttpError(_) | Self::CommunicationError(_) | Self::CommunicationServerError(_) => {
                ErrorHandling::convert(NotificationApiError::Network {
                    reason: self.to_string(),
                })
                .log_warning()
            }
            Self::StorageError(_) | Self::StorageSqlError(_) => {
                ErrorHandling::convert(NotificationApiError::Other {
                    reason: self.to_string(),
                })
                .report_error("push-notifications-storage")
            }
            _ => ErrorHandling::convert(NotificationApiError::Other {
                reason: self.to_string(),
            })
            .report_error("push-notifications-unexpected"),
        }
    }
}
