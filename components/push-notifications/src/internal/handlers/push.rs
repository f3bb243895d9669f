/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Turns a push message into a visible notification.
//!
//! Every push must end in a notification, so a body we can't make sense of still renders a
//! generic one.

use serde::Deserialize;

use crate::error::{debug, error, info, Error, Result};
use crate::internal::config::{NotificationConfig, DEFAULT_BODY, DEFAULT_TAG, DEFAULT_TITLE};
use crate::internal::handlers::ExtendableEvent;
use crate::internal::platform::{NotificationAction, NotificationOptions, WorkerGlobalScope};

/// The JSON object the backend pushes. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NotificationPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub tag: Option<String>,
    /// Milliseconds since the epoch
    pub timestamp: Option<f64>,
}

impl NotificationPayload {
    pub fn parse(data: Option<&[u8]>) -> Result<Self> {
        let data = data.ok_or_else(|| Error::PayloadParseError("no data".to_string()))?;
        let value: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| Error::PayloadParseError(e.to_string()))?;
        // A JSON array would otherwise fill the fields in order.
        if !value.is_object() {
            return Err(Error::PayloadParseError(format!(
                "expected an object, got {}",
                value
            )));
        }
        serde_json::from_value(value).map_err(|e| Error::PayloadParseError(e.to_string()))
    }

    /// Fill in the defaults.
    pub fn into_notification(
        self,
        config: &NotificationConfig,
        received_at_ms: u64,
    ) -> (String, NotificationOptions) {
        let timestamp = self
            .timestamp
            .filter(|t| t.is_finite() && *t >= 0.0)
            .map(|t| t as u64)
            .unwrap_or(received_at_ms);
        (
            self.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            NotificationOptions {
                body: self.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
                icon: self.icon.unwrap_or_else(|| config.default_icon.clone()),
                badge: self.badge.unwrap_or_else(|| config.default_badge.clone()),
                tag: Some(self.tag.unwrap_or_else(|| DEFAULT_TAG.to_string())),
                timestamp: Some(timestamp),
                require_interaction: false,
                actions: vec![
                    NotificationAction::new("open", "Open"),
                    NotificationAction::new("close", "Close"),
                ],
            },
        )
    }
}

/// What gets shown when the payload is unusable.
pub fn fallback_notification(config: &NotificationConfig) -> (String, NotificationOptions) {
    (
        DEFAULT_TITLE.to_string(),
        NotificationOptions {
            body: DEFAULT_BODY.to_string(),
            icon: config.default_icon.clone(),
            badge: config.default_badge.clone(),
            tag: None,
            timestamp: None,
            require_interaction: false,
            actions: Vec::new(),
        },
    )
}

/// Render a notification for a push, inside the event's keep-alive. Never fails: parse and
/// render errors are logged.
pub fn handle_push(
    config: &NotificationConfig,
    scope: &dyn WorkerGlobalScope,
    event: &ExtendableEvent,
    data: Option<&[u8]>,
    received_at_ms: u64,
) {
    let (title, options) = match NotificationPayload::parse(data) {
        Ok(payload) => {
            debug!("Push received: {:?}", payload);
            payload.into_notification(config, received_at_ms)
        }
        Err(e) => {
            info!("Showing the fallback notification: {}", e);
            fallback_notification(config)
        }
    };
    if let Err(e) = event.wait_until(|| Ok(scope.show_notification(&title, &options)?)) {
        error!("Could not show the notification: {}", e);
    }
}
