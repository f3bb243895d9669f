/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Handles this client's push subscription
//!
//! Exposes a struct [`SubscriptionManager`] that keeps the platform push subscription and the
//! backend's copy of it in step.
//!
//! The platform is the only authority on whether we're subscribed: nothing here caches the
//! platform's subscription object, every question is asked again. The [`SubscriptionManager`]
//! allows users to:
//! - Fetch the backend's VAPID key (once per session)
//! - Subscribe and upload the subscription to the backend
//! - Unsubscribe, telling the backend first
//! - Routinely reconcile the backend with the platform, retrying a failed backend cleanup

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{debug, info, warn, Error, Result};
use crate::internal::communications::{Connection, PersistedRateLimiter};
use crate::internal::config::NotificationConfig;
use crate::internal::key_codec;
use crate::internal::platform::{
    PlatformSubscription, PushService, RegistrationHandle, SubscribeOptions,
};
use crate::internal::storage::Storage;

const RECONCILE_RATE_LIMITER_MAX_CALLS: u16 = 1;

/// What the backend stores for a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub endpoint: String,
    /// Standard base64 of the client's P-256 public key
    pub p256dh: String,
    /// Standard base64 of the auth secret
    pub auth: String,
    pub user_agent: String,
}

impl SubscriptionRecord {
    pub fn new(subscription: &PlatformSubscription, user_agent: String) -> Self {
        Self {
            endpoint: subscription.endpoint.clone(),
            p256dh: key_codec::encode_key(&subscription.p256dh),
            auth: key_codec::encode_key(&subscription.auth),
            user_agent,
        }
    }
}

/// The backend's VAPID public key, both as handed out and decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VapidKeyMaterial {
    pub public_key: String,
    pub key_bytes: Vec<u8>,
}

pub struct SubscriptionManager<Co, S> {
    connection: Co,
    store: S,
    push: Arc<dyn PushService>,
    vapid_key: Option<VapidKeyMaterial>,
    reconcile_rate_limiter: PersistedRateLimiter,
}

impl<Co: Connection, S: Storage> SubscriptionManager<Co, S> {
    pub fn new(config: &NotificationConfig, push: Arc<dyn PushService>) -> Result<Self> {
        let store = S::open(&config.database_path)?;
        Ok(Self {
            connection: Co::connect(config.clone()),
            store,
            push,
            vapid_key: None,
            reconcile_rate_limiter: PersistedRateLimiter::new(
                "reconcile",
                config.reconcile_interval_secs,
                RECONCILE_RATE_LIMITER_MAX_CALLS,
            ),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn connection_mut(&mut self) -> &mut Co {
        &mut self.connection
    }

    /// The backend's VAPID key. Only the first successful call in a session talks to the
    /// backend.
    pub fn fetch_vapid_key(&mut self) -> Result<VapidKeyMaterial> {
        if let Some(key) = &self.vapid_key {
            return Ok(key.clone());
        }
        let public_key = self
            .connection
            .fetch_vapid_key()
            .map_err(|e| Error::KeyFetchError(e.to_string()))?;
        let key_bytes = key_codec::decode_key(&public_key)?;
        key_codec::validate_vapid_key(&key_bytes)?;
        debug!(
            "Got VAPID key {}",
            error_support::redact_key(&public_key)
        );
        let key = VapidKeyMaterial {
            public_key,
            key_bytes,
        };
        self.vapid_key = Some(key.clone());
        Ok(key)
    }

    /// Subscribe with the platform and upload the result to the backend.
    ///
    /// When already subscribed, the platform hands back the existing subscription and it is
    /// uploaded again. If the upload fails the platform subscription is left in place; the next
    /// [`Self::reconcile`] uploads it.
    pub fn subscribe(
        &mut self,
        registration: &RegistrationHandle,
        key: &VapidKeyMaterial,
    ) -> Result<SubscriptionRecord> {
        let options = SubscribeOptions {
            user_visible_only: true,
            application_server_key: key.key_bytes.clone(),
        };
        let subscription = self
            .push
            .subscribe(registration, &options)
            .map_err(|e| Error::SubscriptionError(e.to_string()))?;
        let record = SubscriptionRecord::new(&subscription, self.push.user_agent());
        self.connection.upload_subscription(&record)?;
        // Subscribing again can hand back an endpoint we failed to delete earlier. The backend
        // has it again now, so it must not be deleted later.
        self.store.remove_pending_unsubscribe(&record.endpoint)?;
        info!(
            "Subscribed {}",
            error_support::redact_url(&record.endpoint)
        );
        Ok(record)
    }

    /// Unsubscribe, returning whether there was a subscription to remove.
    ///
    /// The backend is told before the platform subscription goes away, since the endpoint is
    /// what identifies the record. A backend failure doesn't stop the platform unsubscribe; the
    /// endpoint is kept for [`Self::reconcile`] to retry.
    pub fn unsubscribe(&mut self, registration: &RegistrationHandle) -> Result<bool> {
        let Some(subscription) = self.push.get_subscription(registration)? else {
            debug!("unsubscribe: not subscribed");
            return Ok(false);
        };
        match self.connection.delete_subscription(&subscription.endpoint) {
            Ok(()) => {
                self.store.remove_pending_unsubscribe(&subscription.endpoint)?;
            }
            Err(e) => {
                warn!("Backend didn't drop the subscription, will retry later: {}", e);
                if let Err(e) = self.store.add_pending_unsubscribe(&subscription.endpoint) {
                    warn!("Could not remember the endpoint for cleanup: {}", e);
                }
            }
        }
        Ok(self.push.unsubscribe(registration)?)
    }

    /// Asks the platform. Never asks the backend.
    pub fn is_subscribed(&self, registration: Option<&RegistrationHandle>) -> bool {
        let Some(registration) = registration else {
            return false;
        };
        match self.push.get_subscription(registration) {
            Ok(subscription) => subscription.is_some(),
            Err(e) => {
                warn!("Could not query the push subscription: {}", e);
                false
            }
        }
    }

    /// Bring the backend in line with the platform, at most once per configured interval.
    ///
    /// Every pending cleanup is retried; the ones that fail again stay pending. If the current
    /// subscription can't be uploaded the rate limit is lifted, so the next call tries again.
    ///
    /// Returns `false` when the sweep was skipped by the rate limiter.
    pub fn reconcile(&mut self, registration: Option<&RegistrationHandle>) -> Result<bool> {
        if !self.reconcile_rate_limiter.check(&self.store) {
            return Ok(false);
        }
        for endpoint in self.store.get_pending_unsubscribes()? {
            match self.connection.delete_subscription(&endpoint) {
                Ok(()) => {
                    info!(
                        "Backend dropped {} on retry",
                        error_support::redact_url(&endpoint)
                    );
                    self.store.remove_pending_unsubscribe(&endpoint)?;
                }
                Err(e) => warn!(
                    "Retrying the backend cleanup of {} failed: {}",
                    error_support::redact_url(&endpoint),
                    e
                ),
            }
        }
        if let Some(registration) = registration {
            if let Some(subscription) = self.push.get_subscription(registration)? {
                let record = SubscriptionRecord::new(&subscription, self.push.user_agent());
                if let Err(e) = self.connection.upload_subscription(&record) {
                    self.reconcile_rate_limiter.reset(&self.store);
                    return Err(e);
                }
            }
        }
        Ok(true)
    }

    /// Ask the backend for a test push. Development aid.
    pub fn send_test_notification(&self) -> Result<()> {
        self.connection.send_test_notification()
    }

    pub fn unread_count(&self) -> Result<u64> {
        self.connection.unread_count()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use mockall::predicate::{always, eq};
    use parking_lot::{Mutex, MutexGuard};

    use super::*;
    use crate::internal::communications::MockConnection;
    use crate::internal::key_codec::test::TEST_VAPID_KEY;
    use crate::internal::platform::{MockPushService, PlatformError};
    use crate::internal::storage::Store;
    use crate::WorkerState;

    static MTX: Mutex<()> = parking_lot::const_mutex(());

    // we need to run our tests in sequence. The tests mock static
    // methods. Mocked static methods are global are susceptible to data races
    // see: https://docs.rs/mockall/latest/mockall/#static-methods
    pub(crate) fn get_lock() -> MutexGuard<'static, ()> {
        MTX.lock()
    }

    pub(crate) const TEST_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send/deadbeef";
    pub(crate) const TEST_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) Test/1.0";

    pub(crate) fn registration() -> RegistrationHandle {
        RegistrationHandle {
            scope: "/".to_string(),
            script_url: "/sw.js".to_string(),
            state: WorkerState::Activated,
        }
    }

    pub(crate) fn platform_subscription() -> PlatformSubscription {
        PlatformSubscription {
            endpoint: TEST_ENDPOINT.to_string(),
            p256dh: vec![4, 1, 2],
            auth: vec![0xff, 0xfe],
        }
    }

    /// A push service that remembers whether it's subscribed.
    pub(crate) fn fake_push_service() -> MockPushService {
        let state: Arc<Mutex<Option<PlatformSubscription>>> = Arc::new(Mutex::new(None));
        let mut push = MockPushService::new();
        let s = state.clone();
        push.expect_subscribe().returning(move |_, options| {
            assert!(options.user_visible_only);
            let mut state = s.lock();
            Ok(state.get_or_insert_with(platform_subscription).clone())
        });
        let s = state.clone();
        push.expect_get_subscription()
            .returning(move |_| Ok(s.lock().clone()));
        let s = state;
        push.expect_unsubscribe()
            .returning(move |_| Ok(s.lock().take().is_some()));
        push.expect_user_agent()
            .returning(|| TEST_USER_AGENT.to_string());
        push
    }

    pub(crate) fn get_test_manager(
        push: MockPushService,
    ) -> Result<SubscriptionManager<MockConnection, Store>> {
        let ctx = MockConnection::connect_context();
        ctx.expect().returning(|_| Default::default());
        SubscriptionManager::new(&Default::default(), Arc::new(push))
    }

    fn vapid_key() -> VapidKeyMaterial {
        VapidKeyMaterial {
            public_key: TEST_VAPID_KEY.to_string(),
            key_bytes: key_codec::decode_key(TEST_VAPID_KEY).unwrap(),
        }
    }

    #[test]
    fn test_fetch_vapid_key_is_cached() -> Result<()> {
        let _m = get_lock();
        let mut sm = get_test_manager(fake_push_service())?;
        sm.connection
            .expect_fetch_vapid_key()
            .times(1)
            .returning(|| Ok(TEST_VAPID_KEY.to_string()));
        let key = sm.fetch_vapid_key()?;
        assert_eq!(key.key_bytes.len(), key_codec::VAPID_KEY_LENGTH);
        assert_eq!(sm.fetch_vapid_key()?, key);
        Ok(())
    }

    #[test]
    fn test_fetch_vapid_key_errors() -> Result<()> {
        let _m = get_lock();
        let mut sm = get_test_manager(fake_push_service())?;
        sm.connection
            .expect_fetch_vapid_key()
            .times(1)
            .returning(|| Err(Error::CommunicationServerError("down".to_string())));
        assert!(matches!(sm.fetch_vapid_key(), Err(Error::KeyFetchError(_))));
        sm.connection.checkpoint();

        // a failure isn't cached, and a bad key is a key format error
        sm.connection
            .expect_fetch_vapid_key()
            .times(1)
            .returning(|| Ok("AQID".to_string()));
        assert!(matches!(
            sm.fetch_vapid_key(),
            Err(Error::KeyFormatError(key_codec::KeyFormatError::WrongLength(3)))
        ));
        Ok(())
    }

    #[test]
    fn test_subscribe() -> Result<()> {
        let _m = get_lock();
        let mut sm = get_test_manager(fake_push_service())?;
        let expected = SubscriptionRecord {
            endpoint: TEST_ENDPOINT.to_string(),
            p256dh: "BAEC".to_string(),
            auth: "//4=".to_string(),
            user_agent: TEST_USER_AGENT.to_string(),
        };
        sm.connection
            .expect_upload_subscription()
            .with(eq(expected.clone()))
            .times(2)
            .returning(|_| Ok(()));

        let reg = registration();
        assert!(!sm.is_subscribed(Some(&reg)));
        let record = sm.subscribe(&reg, &vapid_key())?;
        assert_eq!(record, expected);
        assert!(sm.is_subscribed(Some(&reg)));
        // already subscribed: same channel, uploaded again
        assert_eq!(sm.subscribe(&reg, &vapid_key())?, expected);
        assert!(!sm.is_subscribed(None));
        Ok(())
    }

    #[test]
    fn test_subscribe_rejected() -> Result<()> {
        let _m = get_lock();
        let mut push = MockPushService::new();
        push.expect_subscribe()
            .returning(|_, _| Err(PlatformError::Rejected("permission denied".to_string())));
        let mut sm = get_test_manager(push)?;
        sm.connection.expect_upload_subscription().never();
        assert!(matches!(
            sm.subscribe(&registration(), &vapid_key()),
            Err(Error::SubscriptionError(_))
        ));
        Ok(())
    }

    #[test]
    fn test_upload_failure_keeps_platform_subscription() -> Result<()> {
        let _m = get_lock();
        let mut sm = get_test_manager(fake_push_service())?;
        sm.connection
            .expect_upload_subscription()
            .returning(|_| Err(Error::CommunicationError("400".to_string())));
        let reg = registration();
        assert!(matches!(
            sm.subscribe(&reg, &vapid_key()),
            Err(Error::CommunicationError(_))
        ));
        assert!(sm.is_subscribed(Some(&reg)));
        Ok(())
    }

    #[test]
    fn test_unsubscribe_without_subscription() -> Result<()> {
        let _m = get_lock();
        let mut sm = get_test_manager(fake_push_service())?;
        sm.connection.expect_delete_subscription().never();
        assert!(!sm.unsubscribe(&registration())?);
        Ok(())
    }

    #[test]
    fn test_unsubscribe() -> Result<()> {
        let _m = get_lock();
        let mut sm = get_test_manager(fake_push_service())?;
        sm.connection
            .expect_upload_subscription()
            .returning(|_| Ok(()));
        sm.connection
            .expect_delete_subscription()
            .with(eq(TEST_ENDPOINT))
            .times(1)
            .returning(|_| Ok(()));
        let reg = registration();
        sm.subscribe(&reg, &vapid_key())?;
        assert!(sm.unsubscribe(&reg)?);
        assert!(!sm.is_subscribed(Some(&reg)));
        // It's already gone, so return false, without a second backend call.
        assert!(!sm.unsubscribe(&reg)?);
        assert!(sm.store().get_pending_unsubscribes()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_unsubscribe_backend_failure() -> Result<()> {
        let _m = get_lock();
        let mut sm = get_test_manager(fake_push_service())?;
        sm.connection
            .expect_upload_subscription()
            .returning(|_| Ok(()));
        sm.connection
            .expect_delete_subscription()
            .with(always())
            .times(1)
            .returning(|_| Err(Error::CommunicationServerError("503".to_string())));
        let reg = registration();
        sm.subscribe(&reg, &vapid_key())?;
        // the platform unsubscribe still happens
        assert!(sm.unsubscribe(&reg)?);
        assert!(!sm.is_subscribed(Some(&reg)));
        assert_eq!(
            sm.store().get_pending_unsubscribes()?,
            vec![TEST_ENDPOINT.to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_resubscribe_clears_pending_cleanup() -> Result<()> {
        let _m = get_lock();
        let mut sm = get_test_manager(fake_push_service())?;
        sm.connection
            .expect_upload_subscription()
            .returning(|_| Ok(()));
        sm.store().add_pending_unsubscribe(TEST_ENDPOINT)?;
        sm.store().add_pending_unsubscribe("https://push.example.com/old")?;
        sm.subscribe(&registration(), &vapid_key())?;
        // only the endpoint we got back is taken off the list
        assert_eq!(
            sm.store().get_pending_unsubscribes()?,
            vec!["https://push.example.com/old".to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_is_subscribed_platform_error() -> Result<()> {
        let _m = get_lock();
        let mut push = MockPushService::new();
        push.expect_get_subscription()
            .returning(|_| Err(PlatformError::Failed("no push manager".to_string())));
        let sm = get_test_manager(push)?;
        assert!(!sm.is_subscribed(Some(&registration())));
        Ok(())
    }

    #[test]
    fn test_reconcile() -> Result<()> {
        let _m = get_lock();
        let mut sm = get_test_manager(fake_push_service())?;
        let reg = registration();
        sm.connection
            .expect_upload_subscription()
            .times(2)
            .returning(|_| Ok(()));
        sm.subscribe(&reg, &vapid_key())?;
        sm.store().add_pending_unsubscribe("https://push.example.com/old")?;
        sm.connection
            .expect_delete_subscription()
            .with(eq("https://push.example.com/old"))
            .times(1)
            .returning(|_| Ok(()));

        assert!(sm.reconcile(Some(&reg))?);
        assert!(sm.store().get_pending_unsubscribes()?.is_empty());
        // rate limited, nothing else goes to the backend
        assert!(!sm.reconcile(Some(&reg))?);
        Ok(())
    }

    #[test]
    fn test_reconcile_keeps_failed_cleanup() -> Result<()> {
        let _m = get_lock();
        let mut sm = get_test_manager(fake_push_service())?;
        sm.store().add_pending_unsubscribe("https://push.example.com/old")?;
        sm.connection
            .expect_delete_subscription()
            .times(1)
            .returning(|_| Err(Error::CommunicationError("timeout".to_string())));
        sm.connection.expect_upload_subscription().never();
        // not subscribed, so nothing to upload
        assert!(sm.reconcile(Some(&registration()))?);
        assert_eq!(
            sm.store().get_pending_unsubscribes()?,
            vec!["https://push.example.com/old".to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_failed_cleanups_are_all_retried() -> Result<()> {
        let _m = get_lock();
        const ONE: &str = "https://push.example.com/one";
        const TWO: &str = "https://push.example.com/two";
        // subscribed to ONE, then after unsubscribing, to TWO
        let queue = Arc::new(Mutex::new(vec![TWO, ONE]));
        let mut push = MockPushService::new();
        let q = queue.clone();
        push.expect_get_subscription().returning(move |_| {
            Ok(q.lock().last().map(|endpoint| PlatformSubscription {
                endpoint: endpoint.to_string(),
                ..platform_subscription()
            }))
        });
        let q = queue;
        push.expect_unsubscribe()
            .returning(move |_| Ok(q.lock().pop().is_some()));
        let mut sm = get_test_manager(push)?;
        let reg = registration();

        sm.connection
            .expect_delete_subscription()
            .times(2)
            .returning(|_| Err(Error::CommunicationServerError("503".to_string())));
        assert!(sm.unsubscribe(&reg)?);
        assert!(sm.unsubscribe(&reg)?);
        assert!(!sm.unsubscribe(&reg)?);
        // the second failure doesn't replace the first
        assert_eq!(
            sm.store().get_pending_unsubscribes()?,
            vec![ONE.to_string(), TWO.to_string()]
        );
        sm.connection.checkpoint();

        sm.connection
            .expect_delete_subscription()
            .with(eq(ONE))
            .times(1)
            .returning(|_| Ok(()));
        sm.connection
            .expect_delete_subscription()
            .with(eq(TWO))
            .times(1)
            .returning(|_| Err(Error::CommunicationError("timeout".to_string())));
        sm.connection.expect_upload_subscription().never();
        assert!(sm.reconcile(Some(&reg))?);
        assert_eq!(
            sm.store().get_pending_unsubscribes()?,
            vec![TWO.to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_reconcile_upload_failure_lifts_rate_limit() -> Result<()> {
        let _m = get_lock();
        let mut sm = get_test_manager(fake_push_service())?;
        let reg = registration();
        sm.connection
            .expect_upload_subscription()
            .times(1)
            .returning(|_| Ok(()));
        sm.subscribe(&reg, &vapid_key())?;
        sm.connection.checkpoint();

        sm.connection
            .expect_upload_subscription()
            .times(1)
            .returning(|_| Err(Error::CommunicationServerError("502".to_string())));
        assert!(matches!(
            sm.reconcile(Some(&reg)),
            Err(Error::CommunicationServerError(_))
        ));
        sm.connection.checkpoint();

        // the failed sweep doesn't count against the window
        sm.connection
            .expect_upload_subscription()
            .times(1)
            .returning(|_| Ok(()));
        assert!(sm.reconcile(Some(&reg))?);
        assert!(!sm.reconcile(Some(&reg))?);
        Ok(())
    }
}
