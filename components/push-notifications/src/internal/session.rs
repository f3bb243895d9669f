/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! One foreground session: a worker controller, a subscription manager, the permission flow and
//! the unread poller, built once and handed out by reference.

use std::sync::Arc;
use std::time::Instant;

use crate::error::{debug, info, warn, Result};
use crate::internal::communications::Connection;
use crate::internal::config::NotificationConfig;
use crate::internal::permission::{DialogView, PermissionCoordinator, PermissionFlowState};
use crate::internal::platform::{
    PermissionPlatform, PermissionState, PushService, RegistrationHandle, WorkerContainer,
};
use crate::internal::storage::Storage;
use crate::internal::subscription::{SubscriptionManager, SubscriptionRecord, VapidKeyMaterial};
use crate::internal::unread::UnreadCountPoller;
use crate::internal::worker::WorkerController;

/// The embedder's implementations of the platform traits.
#[derive(Clone)]
pub struct PlatformBindings {
    pub worker_container: Arc<dyn WorkerContainer>,
    pub push_service: Arc<dyn PushService>,
    pub permission: Arc<dyn PermissionPlatform>,
}

pub struct Session<Co, S> {
    worker: WorkerController,
    subscriptions: SubscriptionManager<Co, S>,
    permission_platform: Arc<dyn PermissionPlatform>,
    coordinator: PermissionCoordinator,
    unread: UnreadCountPoller,
}

impl<Co: Connection, S: Storage> Session<Co, S> {
    pub fn new(config: NotificationConfig, platform: PlatformBindings) -> Result<Self> {
        Ok(Self {
            worker: WorkerController::new(&config, platform.worker_container),
            subscriptions: SubscriptionManager::new(&config, platform.push_service)?,
            coordinator: PermissionCoordinator::new(platform.permission.clone()),
            permission_platform: platform.permission,
            unread: UnreadCountPoller::new(config.unread_poll_interval),
        })
    }

    /// Pick up where a previous session left off. Without platform support this leaves the
    /// permission flow unprompted and not subscribed.
    pub fn initialize(&mut self) -> Result<()> {
        let permission = self.permission_platform.permission();
        let registration = if self.worker.is_supported() {
            match self.worker.register() {
                Ok(registration) => Some(registration),
                Err(e) => {
                    warn!("No worker registration this session: {}", e);
                    None
                }
            }
        } else {
            info!("Push notifications are not supported here");
            None
        };
        let subscribed = self.subscriptions.is_subscribed(registration.as_ref());
        self.coordinator
            .initialize(self.subscriptions.store(), permission, subscribed)
    }

    pub fn register_worker(&mut self) -> Result<RegistrationHandle> {
        self.worker.register()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscriptions.is_subscribed(self.worker.registration())
    }

    pub fn permission_state(&self) -> PermissionState {
        self.permission_platform.permission()
    }

    pub fn fetch_vapid_key(&mut self) -> Result<VapidKeyMaterial> {
        self.subscriptions.fetch_vapid_key()
    }

    /// Register, fetch the key and subscribe, without going through the dialog. The permission
    /// must already be granted; this never prompts.
    pub fn subscribe(&mut self) -> Result<SubscriptionRecord> {
        let registration = self.worker.register()?;
        let key = self.subscriptions.fetch_vapid_key()?;
        self.subscriptions.subscribe(&registration, &key)
    }

    pub fn unsubscribe(&mut self) -> Result<bool> {
        let registration = self.worker.register()?;
        self.subscriptions.unsubscribe(&registration)
    }

    pub fn reconcile(&mut self) -> Result<bool> {
        let registration = self.worker.registration().cloned();
        self.subscriptions.reconcile(registration.as_ref())
    }

    pub fn send_test_notification(&self) -> Result<()> {
        self.subscriptions.send_test_notification()
    }

    pub fn poll_unread_count(&mut self, now: Instant) -> Result<Option<u64>> {
        let subscriptions = &self.subscriptions;
        self.unread
            .poll_if_due(now, || subscriptions.unread_count())
    }

    pub fn last_unread_count(&self) -> Option<u64> {
        self.unread.last_count()
    }

    pub fn should_show_dialog(&self) -> bool {
        self.coordinator.should_show_dialog()
    }

    pub fn open_dialog(&mut self) -> bool {
        self.coordinator.open_dialog()
    }

    pub fn set_dont_show_again(&mut self, checked: bool) {
        self.coordinator.set_dont_show_again(checked)
    }

    pub fn enable_notifications(&mut self) -> PermissionFlowState {
        let state = self
            .coordinator
            .enable(&mut self.worker, &mut self.subscriptions);
        debug!("enable -> {:?}", state);
        state
    }

    pub fn disable_notifications(&mut self) -> PermissionFlowState {
        let state = self
            .coordinator
            .disable(&mut self.worker, &mut self.subscriptions);
        debug!("disable -> {:?}", state);
        state
    }

    pub fn close_dialog(&mut self, dont_show_again: bool) -> Result<()> {
        self.coordinator
            .close_dialog(self.subscriptions.store(), dont_show_again)
    }

    pub fn dialog_view(&self) -> DialogView {
        self.coordinator.view()
    }

    pub fn flow_state(&self) -> PermissionFlowState {
        self.coordinator.state()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;
    use crate::internal::communications::MockConnection;
    use crate::internal::key_codec::test::TEST_VAPID_KEY;
    use crate::internal::platform::{MockPermissionPlatform, MockPushService, MockWorkerContainer};
    use crate::internal::storage::Store;
    use crate::internal::subscription::test::{
        fake_push_service, get_lock, platform_subscription, registration,
    };
    use std::time::Duration;

    fn container(supported: bool) -> MockWorkerContainer {
        let mut container = MockWorkerContainer::new();
        container.expect_is_supported().returning(move || supported);
        container
            .expect_get_registration()
            .returning(|_| Ok(Some(registration())));
        container.expect_ready().returning(|_| Ok(registration()));
        container
    }

    fn permission(state: PermissionState) -> MockPermissionPlatform {
        let mut permission = MockPermissionPlatform::new();
        permission.expect_permission().returning(move || state);
        permission.expect_request_permission().never();
        permission
    }

    fn session(
        supported: bool,
        push: MockPushService,
        state: PermissionState,
    ) -> Result<Session<MockConnection, Store>> {
        let ctx = MockConnection::connect_context();
        ctx.expect().returning(|_| Default::default());
        Session::new(
            Default::default(),
            PlatformBindings {
                worker_container: Arc::new(container(supported)),
                push_service: Arc::new(push),
                permission: Arc::new(permission(state)),
            },
        )
    }

    #[test]
    fn test_initialize_subscribed() -> Result<()> {
        let _m = get_lock();
        let mut push = MockPushService::new();
        push.expect_get_subscription()
            .returning(|_| Ok(Some(platform_subscription())));
        let mut session = session(true, push, PermissionState::Granted)?;
        session.initialize()?;
        assert!(session.is_subscribed());
        assert_eq!(session.flow_state(), PermissionFlowState::Granted);
        assert!(!session.should_show_dialog());
        assert_eq!(session.dialog_view().title, "Notifications Enabled");
        Ok(())
    }

    #[test]
    fn test_initialize_unsupported() -> Result<()> {
        let _m = get_lock();
        let mut session = session(false, MockPushService::new(), PermissionState::Default)?;
        session.initialize()?;
        assert!(!session.is_subscribed());
        assert!(session.should_show_dialog());
        assert!(matches!(
            session.subscribe(),
            Err(Error::UnsupportedPlatformError(_))
        ));
        Ok(())
    }

    #[test]
    fn test_subscribe_and_unsubscribe() -> Result<()> {
        let _m = get_lock();
        let mut session = session(true, fake_push_service(), PermissionState::Granted)?;
        let connection = session.subscriptions.connection_mut();
        connection
            .expect_fetch_vapid_key()
            .times(1)
            .returning(|| Ok(TEST_VAPID_KEY.to_string()));
        connection
            .expect_upload_subscription()
            .times(2)
            .returning(|_| Ok(()));
        connection
            .expect_delete_subscription()
            .times(1)
            .returning(|_| Ok(()));
        session.initialize()?;
        assert!(!session.is_subscribed());
        let record = session.subscribe()?;
        assert_eq!(record.endpoint, platform_subscription().endpoint);
        assert!(session.is_subscribed());
        // the key is only fetched once
        session.subscribe()?;
        assert!(session.unsubscribe()?);
        assert!(!session.unsubscribe()?);
        Ok(())
    }

    #[test]
    fn test_reconcile_without_registration() -> Result<()> {
        let _m = get_lock();
        let mut session = session(false, MockPushService::new(), PermissionState::Default)?;
        session
            .subscriptions
            .store()
            .add_pending_unsubscribe("https://push.example.com/old")?;
        session
            .subscriptions
            .connection_mut()
            .expect_delete_subscription()
            .times(1)
            .returning(|_| Ok(()));
        assert!(session.reconcile()?);
        assert!(!session.reconcile()?);
        Ok(())
    }

    #[test]
    fn test_poll_unread_count() -> Result<()> {
        let _m = get_lock();
        let mut session = session(false, MockPushService::new(), PermissionState::Default)?;
        session
            .subscriptions
            .connection_mut()
            .expect_unread_count()
            .times(2)
            .returning(|| Ok(4));
        let start = Instant::now();
        assert_eq!(session.poll_unread_count(start)?, Some(4));
        assert_eq!(session.poll_unread_count(start + Duration::from_secs(1))?, None);
        assert_eq!(
            session.poll_unread_count(start + Duration::from_secs(10))?,
            Some(4)
        );
        assert_eq!(session.last_unread_count(), Some(4));
        Ok(())
    }

    #[test]
    fn test_dialog_flow() -> Result<()> {
        let _m = get_lock();
        let mut push = MockPushService::new();
        push.expect_get_subscription().returning(|_| Ok(None));
        let mut session = session(true, push, PermissionState::Default)?;
        session.initialize()?;
        assert!(session.should_show_dialog());
        assert!(session.open_dialog());
        session.close_dialog(true)?;
        assert!(!session.should_show_dialog());
        assert!(session.subscriptions.store().get_prompt_shown()?);
        Ok(())
    }
}
