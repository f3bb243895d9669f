/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The background worker's event handling.
//!
//! [`WorkerRuntime`] receives every event the platform delivers to the worker and routes it to
//! a handler. Handlers keep no state between events: everything they need comes from the
//! configuration, the [`WorkerGlobalScope`] and the event itself, so any number of them can run
//! at once.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{debug, info, Result};
use crate::internal::config::NotificationConfig;
use crate::internal::platform::{ShownNotification, WorkerGlobalScope};
use crate::internal::worker::{WorkerLifecycle, WorkerState};

pub mod interaction;
pub mod push;

pub use interaction::ClickOutcome;
pub use push::NotificationPayload;

pub const SYNC_NOTIFICATIONS_TAG: &str = "sync-notifications";

#[derive(Default)]
struct Extensions {
    pending: AtomicUsize,
    total: AtomicUsize,
}

/// An event the platform will keep the worker alive for, as long as some work is pending.
///
/// Clones share the same counters.
#[derive(Clone, Default)]
pub struct ExtendableEvent {
    extensions: Arc<Extensions>,
}

/// Keeps an [`ExtendableEvent`] pending until dropped.
pub struct KeepAlive {
    extensions: Arc<Extensions>,
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.extensions.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ExtendableEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keep_alive(&self) -> KeepAlive {
        self.extensions.pending.fetch_add(1, Ordering::SeqCst);
        self.extensions.total.fetch_add(1, Ordering::SeqCst);
        KeepAlive {
            extensions: self.extensions.clone(),
        }
    }

    /// Run `f` with the event kept alive, settling when `f` returns either way.
    pub fn wait_until<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _keep_alive = self.keep_alive();
        f()
    }

    pub fn pending(&self) -> usize {
        self.extensions.pending.load(Ordering::SeqCst)
    }

    /// How many times the event was extended.
    pub fn extension_count(&self) -> usize {
        self.extensions.total.load(Ordering::SeqCst)
    }

    pub fn is_settled(&self) -> bool {
        self.pending() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Install,
    Activate,
    /// A newer worker took over.
    Replaced,
    Push {
        data: Option<Vec<u8>>,
    },
    NotificationClick {
        notification: ShownNotification,
        action: Option<String>,
    },
    NotificationClose {
        notification: ShownNotification,
    },
    Sync {
        tag: String,
    },
    Message {
        data: String,
    },
}

pub struct WorkerRuntime {
    config: NotificationConfig,
    scope: Arc<dyn WorkerGlobalScope>,
    lifecycle: WorkerLifecycle,
}

impl WorkerRuntime {
    /// `initial` is the state the platform reports for this worker. A script evaluated for the
    /// first time is [`WorkerState::Installing`]; one the platform restarted to deliver an event
    /// is usually [`WorkerState::Activated`] already and won't see install or activate again.
    pub fn new(
        config: NotificationConfig,
        scope: Arc<dyn WorkerGlobalScope>,
        initial: WorkerState,
    ) -> Self {
        debug!("Worker runtime starting as {:?}", initial);
        Self {
            config,
            scope,
            lifecycle: WorkerLifecycle::starting_at(initial),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    /// Handle one event. Returns whether it was handled; push and notification events are
    /// dropped until the worker is activated.
    pub fn dispatch(&self, event: WorkerEvent, extendable: &ExtendableEvent) -> Result<bool> {
        let scope = self.scope.as_ref();
        match event {
            WorkerEvent::Install => {
                info!("Worker installing");
                self.lifecycle.install(scope, extendable)?;
            }
            WorkerEvent::Activate => {
                info!("Worker activating");
                self.lifecycle.activate(scope, extendable)?;
            }
            WorkerEvent::Replaced => self.lifecycle.replace()?,
            WorkerEvent::Push { .. }
            | WorkerEvent::NotificationClick { .. }
            | WorkerEvent::NotificationClose { .. }
                if !self.lifecycle.is_activated() =>
            {
                info!(
                    "Dropping {:?}, the worker is {:?}",
                    event,
                    self.lifecycle.state()
                );
                return Ok(false);
            }
            WorkerEvent::Push { data } => {
                push::handle_push(&self.config, scope, extendable, data.as_deref(), now_ms());
            }
            WorkerEvent::NotificationClick {
                notification,
                action,
            } => {
                interaction::handle_click(
                    &self.config,
                    scope,
                    extendable,
                    &notification,
                    action.as_deref(),
                );
            }
            WorkerEvent::NotificationClose { notification } => {
                interaction::handle_close(&notification)
            }
            WorkerEvent::Sync { tag } => {
                if tag != SYNC_NOTIFICATIONS_TAG {
                    debug!("Ignoring sync for {}", tag);
                    return Ok(false);
                }
                // Nothing is queued while offline yet, so there's nothing to replay.
                extendable.wait_until(|| {
                    info!("Background sync: {}", tag);
                    Ok(())
                })?;
            }
            WorkerEvent::Message { data } => info!("Message from a client: {}", data),
        }
        Ok(true)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
