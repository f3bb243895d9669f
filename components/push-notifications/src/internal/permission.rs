/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The user-facing side of notifications: when to ask, what to ask, and what the user said.
//!
//! Once the platform reports the permission as denied we never prompt again; the only thing
//! left to do is point the user at their settings. The "don't show again" choice is separate
//! and only hides our own dialog.

use std::sync::Arc;

use crate::error::{info, warn, Error, Result};
use crate::internal::communications::Connection;
use crate::internal::platform::{PermissionPlatform, PermissionState};
use crate::internal::storage::Storage;
use crate::internal::subscription::SubscriptionManager;
use crate::internal::worker::{WorkerController, UNSUPPORTED_MESSAGE};

pub const DENIED_MESSAGE: &str =
    "You have denied notification permissions. Please enable them in your browser settings.";
const ENABLE_TITLE: &str = "Enable Notifications";
const ENABLED_TITLE: &str = "Notifications Enabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionFlowState {
    Unprompted,
    Prompting,
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogAction {
    Enable,
    Disable,
    /// Permission is denied; all we can do is explain how to undo that.
    OpenSettings,
}

/// What the permission dialog should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogView {
    pub title: String,
    pub error: Option<String>,
    pub loading: bool,
    /// Only offered while not subscribed.
    pub show_dont_show_again: bool,
    pub dont_show_again: bool,
    pub primary_action: DialogAction,
}

pub struct PermissionCoordinator {
    permission: Arc<dyn PermissionPlatform>,
    state: PermissionFlowState,
    subscribed: bool,
    suppressed: bool,
    dont_show_again: bool,
    loading: bool,
    error: Option<String>,
}

impl PermissionCoordinator {
    pub fn new(permission: Arc<dyn PermissionPlatform>) -> Self {
        Self {
            permission,
            state: PermissionFlowState::Unprompted,
            subscribed: false,
            suppressed: false,
            dont_show_again: false,
            loading: false,
            error: None,
        }
    }

    pub fn state(&self) -> PermissionFlowState {
        self.state
    }

    /// Work out where we stand from the stored preferences and the platform.
    pub fn initialize<S: Storage>(
        &mut self,
        prefs: &S,
        platform_permission: PermissionState,
        subscribed: bool,
    ) -> Result<()> {
        self.suppressed = prefs.get_prompt_shown()?;
        self.subscribed = subscribed;
        self.error = None;
        self.loading = false;
        self.state = match platform_permission {
            PermissionState::Denied => PermissionFlowState::Denied,
            PermissionState::Granted if subscribed => PermissionFlowState::Granted,
            _ => PermissionFlowState::Unprompted,
        };
        info!(
            "Permission flow starts {:?} (platform {}, subscribed {})",
            self.state, platform_permission, subscribed
        );
        Ok(())
    }

    pub fn should_show_dialog(&self) -> bool {
        self.state == PermissionFlowState::Unprompted && !self.suppressed
    }

    /// Returns whether the dialog should actually open.
    pub fn open_dialog(&mut self) -> bool {
        if !self.should_show_dialog() {
            return false;
        }
        error_support::breadcrumb!("permission: open dialog");
        self.state = PermissionFlowState::Prompting;
        true
    }

    pub fn set_dont_show_again(&mut self, checked: bool) {
        self.dont_show_again = checked;
    }

    /// Register the worker, get permission, fetch the key and subscribe, in that order.
    ///
    /// Failures end up in the dialog's error text. A step that already succeeded isn't undone,
    /// so a registered worker stays registered.
    pub fn enable<Co: Connection, S: Storage>(
        &mut self,
        worker: &mut WorkerController,
        subscriptions: &mut SubscriptionManager<Co, S>,
    ) -> PermissionFlowState {
        match self.state {
            PermissionFlowState::Granted => return self.state,
            PermissionFlowState::Denied => {
                self.error = Some(DENIED_MESSAGE.to_string());
                return self.state;
            }
            PermissionFlowState::Unprompted | PermissionFlowState::Prompting => (),
        }
        error_support::breadcrumb!("permission: enable");
        self.loading = true;
        self.error = None;
        let result = self.try_enable(worker, subscriptions);
        self.loading = false;
        match result {
            Ok(state) => self.state = state,
            Err(e) => {
                warn!("Enabling notifications failed: {}", e);
                self.error = Some(match e {
                    Error::UnsupportedPlatformError(_) => UNSUPPORTED_MESSAGE.to_string(),
                    other => other.to_string(),
                });
            }
        }
        self.state
    }

    fn try_enable<Co: Connection, S: Storage>(
        &mut self,
        worker: &mut WorkerController,
        subscriptions: &mut SubscriptionManager<Co, S>,
    ) -> Result<PermissionFlowState> {
        let registration = worker.register()?;

        let mut permission = self.permission.permission();
        // Never prompt again once denied.
        if permission == PermissionState::Default {
            permission = self.permission.request_permission()?;
        }
        match permission {
            PermissionState::Denied => {
                self.error = Some(DENIED_MESSAGE.to_string());
                persist_choice(subscriptions.store(), false);
                return Ok(PermissionFlowState::Denied);
            }
            // The prompt was dismissed without an answer.
            PermissionState::Default => return Ok(self.state),
            PermissionState::Granted => (),
        }

        let key = subscriptions.fetch_vapid_key()?;
        subscriptions.subscribe(&registration, &key)?;
        self.subscribed = true;
        persist_choice(subscriptions.store(), true);
        Ok(PermissionFlowState::Granted)
    }

    /// Unsubscribe. On failure the error is shown and nothing changes.
    pub fn disable<Co: Connection, S: Storage>(
        &mut self,
        worker: &mut WorkerController,
        subscriptions: &mut SubscriptionManager<Co, S>,
    ) -> PermissionFlowState {
        error_support::breadcrumb!("permission: disable");
        self.loading = true;
        self.error = None;
        let result = worker
            .register()
            .and_then(|registration| subscriptions.unsubscribe(&registration));
        self.loading = false;
        match result {
            Ok(_) => {
                self.subscribed = false;
                persist_choice(subscriptions.store(), false);
                if self.state != PermissionFlowState::Denied {
                    self.state = PermissionFlowState::Unprompted;
                }
            }
            Err(e) => {
                warn!("Disabling notifications failed: {}", e);
                self.error = Some(e.to_string());
            }
        }
        self.state
    }

    pub fn close_dialog<S: Storage>(&mut self, prefs: &S, dont_show_again: bool) -> Result<()> {
        self.dont_show_again = dont_show_again;
        if dont_show_again {
            prefs.set_prompt_shown()?;
            self.suppressed = true;
        }
        if self.state == PermissionFlowState::Prompting {
            self.state = PermissionFlowState::Unprompted;
        }
        self.error = None;
        Ok(())
    }

    pub fn view(&self) -> DialogView {
        DialogView {
            title: if self.subscribed {
                ENABLED_TITLE
            } else {
                ENABLE_TITLE
            }
            .to_string(),
            error: self.error.clone(),
            loading: self.loading,
            show_dont_show_again: !self.subscribed,
            dont_show_again: self.dont_show_again,
            primary_action: if self.state == PermissionFlowState::Denied {
                DialogAction::OpenSettings
            } else if self.subscribed {
                DialogAction::Disable
            } else {
                DialogAction::Enable
            },
        }
    }
}

// The stored choice is advisory, so failing to write it doesn't fail the flow.
fn persist_choice<S: Storage>(prefs: &S, enabled: bool) {
    if let Err(e) = prefs.set_notifications_enabled(enabled) {
        warn!("Could not store the notification preference: {}", e);
    }
}
