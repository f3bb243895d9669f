/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::error::{debug, info, warn, Result};
use crate::internal::config::NotificationConfig;
use crate::internal::handlers::ExtendableEvent;
use crate::internal::platform::{ClientQuery, ShownNotification, WindowClient, WorkerGlobalScope};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// An existing app window was focused.
    Focused(String),
    Opened,
    Failed,
}

fn is_app_window(config: &NotificationConfig, client: &WindowClient) -> bool {
    client.url == config.app_root
        || config
            .app_origins
            .iter()
            .any(|origin| client.url.contains(origin.as_str()))
}

/// Close the notification, then bring the app forward: focus a window that's already open, or
/// open one at the app root. Every action, "close" included, does the same.
pub fn handle_click(
    config: &NotificationConfig,
    scope: &dyn WorkerGlobalScope,
    event: &ExtendableEvent,
    notification: &ShownNotification,
    action: Option<&str>,
) -> ClickOutcome {
    debug!("Notification clicked: {:?} ({:?})", notification, action);
    scope.close_notification(notification);
    let res = event.wait_until(|| -> Result<ClickOutcome> {
        let clients = scope.match_all_clients(ClientQuery {
            include_uncontrolled: true,
        })?;
        match clients.iter().find(|c| is_app_window(config, c)) {
            Some(client) => {
                scope.focus_client(&client.id)?;
                Ok(ClickOutcome::Focused(client.id.clone()))
            }
            None => {
                scope.open_window(&config.app_root)?;
                Ok(ClickOutcome::Opened)
            }
        }
    });
    res.unwrap_or_else(|e| {
        warn!("Could not bring the app forward: {}", e);
        ClickOutcome::Failed
    })
}

/// Dismissed without a click. Nothing to do beyond noting it.
pub fn handle_close(notification: &ShownNotification) {
    info!("Notification closed: {:?}", notification.tag);
}
