/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The background worker, seen from both sides.
//!
//! [`WorkerController`] is the foreground half: it registers the worker script and hands out the
//! activated registration. [`WorkerLifecycle`] is the background half: it walks the worker
//! through install and activate, and is what the [`WorkerRuntime`](crate::WorkerRuntime) checks
//! before dispatching push and notification events.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{debug, error, info, warn, Error, Result};
use crate::internal::config::NotificationConfig;
use crate::internal::handlers::ExtendableEvent;
use crate::internal::platform::{RegistrationHandle, WorkerContainer, WorkerGlobalScope};

pub(crate) const UNSUPPORTED_MESSAGE: &str = "Browser does not support push notifications";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Installing,
    Installed,
    Activating,
    Activated,
    /// Replaced by a newer worker, or failed to install.
    Redundant,
}

impl WorkerState {
    fn can_move_to(self, to: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, to),
            (Installing, Installed) | (Installed, Activating) | (Activating, Activated)
        ) || (to == Redundant && self != Redundant)
    }
}

pub struct WorkerController {
    container: Arc<dyn WorkerContainer>,
    script_url: String,
    scope: String,
    registration: Option<RegistrationHandle>,
}

impl WorkerController {
    pub fn new(config: &NotificationConfig, container: Arc<dyn WorkerContainer>) -> Self {
        Self {
            container,
            script_url: config.worker_script.clone(),
            scope: config.worker_scope.clone(),
            registration: None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.container.is_supported()
    }

    /// The activated registration from an earlier [`Self::register`] in this session.
    pub fn registration(&self) -> Option<&RegistrationHandle> {
        self.registration.as_ref()
    }

    /// Registers the worker script, or reuses the existing registration for our scope, and
    /// waits for it to be activated.
    ///
    /// Calling this again once a registration is activated returns the cached handle without
    /// talking to the platform.
    pub fn register(&mut self) -> Result<RegistrationHandle> {
        if let Some(handle) = &self.registration {
            if handle.state == WorkerState::Activated {
                return Ok(handle.clone());
            }
        }
        if !self.container.is_supported() {
            return Err(Error::UnsupportedPlatformError(
                UNSUPPORTED_MESSAGE.to_string(),
            ));
        }
        let existing = match self.container.get_registration(&self.scope) {
            Ok(existing) => existing,
            Err(e) => {
                warn!("Could not look up the existing registration: {e}");
                None
            }
        };
        match existing {
            Some(existing) => debug!("Reusing worker registration for scope {}", existing.scope),
            None => {
                self.container
                    .register(&self.script_url, &self.scope)
                    .map_err(|e| {
                        Error::UnsupportedPlatformError(format!(
                            "Could not register {}: {e}",
                            self.script_url
                        ))
                    })?;
                info!("Registered worker {}", self.script_url);
            }
        }
        let handle = self.container.ready(&self.scope).map_err(|e| {
            Error::UnsupportedPlatformError(format!(
                "Worker for {} never became ready: {e}",
                self.scope
            ))
        })?;
        if handle.state != WorkerState::Activated {
            return Err(Error::UnsupportedPlatformError(format!(
                "Worker for {} never activated ({:?})",
                handle.scope, handle.state
            )));
        }
        self.registration = Some(handle.clone());
        Ok(handle)
    }
}

/// Worker-side lifecycle state. A freshly evaluated script starts in
/// [`WorkerState::Installing`]; a script the platform restarts starts wherever the platform says
/// it is.
pub struct WorkerLifecycle {
    state: Mutex<WorkerState>,
}

impl Default for WorkerLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerLifecycle {
    pub fn new() -> Self {
        Self::starting_at(WorkerState::Installing)
    }

    pub fn starting_at(state: WorkerState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    pub fn is_activated(&self) -> bool {
        self.state() == WorkerState::Activated
    }

    pub fn transition(&self, to: WorkerState) -> Result<()> {
        let mut state = self.state.lock();
        if !state.can_move_to(to) {
            return Err(Error::InvalidWorkerTransition { from: *state, to });
        }
        debug!("Worker {:?} -> {:?}", *state, to);
        *state = to;
        Ok(())
    }

    /// Install: take over from any waiting worker straight away.
    pub fn install(&self, scope: &dyn WorkerGlobalScope, event: &ExtendableEvent) -> Result<()> {
        let res = event.wait_until(|| Ok(scope.skip_waiting()?));
        match res {
            Ok(()) => self.transition(WorkerState::Installed),
            Err(e) => {
                error!("Install failed: {e}");
                self.transition(WorkerState::Redundant)?;
                Err(e)
            }
        }
    }

    /// Activate: claim every open client. A failed claim leaves the worker active; it just won't
    /// control pages that were opened before it.
    pub fn activate(&self, scope: &dyn WorkerGlobalScope, event: &ExtendableEvent) -> Result<()> {
        self.transition(WorkerState::Activating)?;
        if let Err(e) = event.wait_until(|| Ok(scope.claim_clients()?)) {
            warn!("Could not claim clients: {e}");
        }
        self.transition(WorkerState::Activated)
    }

    /// A newer worker took over.
    pub fn replace(&self) -> Result<()> {
        self.transition(WorkerState::Redundant)
    }
}
