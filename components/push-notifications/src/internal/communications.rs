/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Server Communications.
//!
//! Handles the REST calls to the Team Monitoring backend: it hands out the VAPID public key,
//! keeps a record of each client's push subscription, and reports the unread count.

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use url::Url;

use crate::error::{
    self, debug, info, warn,
    Error::{CommunicationError, CommunicationServerError},
};
use crate::internal::config::NotificationConfig;
use crate::internal::subscription::SubscriptionRecord;

mod rate_limiter;
pub use rate_limiter::PersistedRateLimiter;

const VAPID_KEY_PATH: &str = "/notifications/vapid-key/";
const SUBSCRIBE_PATH: &str = "/notifications/subscribe/";
const UNSUBSCRIBE_PATH: &str = "/notifications/unsubscribe/";
const UNREAD_COUNT_PATH: &str = "/notifications/unread-count/";
const TEST_NOTIFICATION_PATH: &str = "/notifications/test/";

#[derive(Deserialize, Debug)]
struct VapidKeyResponse {
    vapid_public_key: String,
}

#[derive(Deserialize, Debug)]
struct UnreadCountResponse {
    unread_count: u64,
}

/// A link to the REST backend
#[cfg_attr(test, mockall::automock)]
pub trait Connection: Sized {
    /// Create a new instance of a [`Connection`]
    fn connect(config: NotificationConfig) -> Self;

    /// Get the backend's VAPID public key, as base64url text.
    fn fetch_vapid_key(&self) -> error::Result<String>;

    /// Store (or refresh) this client's subscription on the backend.
    fn upload_subscription(&self, record: &SubscriptionRecord) -> error::Result<()>;

    /// Ask the backend to forget the subscription with this endpoint.
    fn delete_subscription(&self, endpoint: &str) -> error::Result<()>;

    fn unread_count(&self) -> error::Result<u64>;

    /// Ask the backend to push a test notification to this user.
    fn send_test_notification(&self) -> error::Result<()>;
}

/// Connect to the backend via its HTTP interface
pub struct ConnectHttp {
    config: NotificationConfig,
    client: Client,
}

impl ConnectHttp {
    fn url(&self, path: &str) -> error::Result<Url> {
        Ok(Url::parse(&self.config.api_url(path))?)
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn check_response_error(&self, response: Response) -> error::Result<Response> {
        // The backend reports failures as `{"detail": ...}` or `{"error": ...}`.
        #[derive(Deserialize)]
        struct ResponseError {
            detail: Option<String>,
            error: Option<String>,
        }
        let status = response.status();
        if !status.is_client_error() && !status.is_server_error() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        let message = serde_json::from_str::<ResponseError>(&body)
            .ok()
            .and_then(|e| e.detail.or(e.error))
            .unwrap_or_else(|| status.to_string());
        if status.is_server_error() {
            return Err(CommunicationServerError(format!(
                "General Server Error: {}",
                message
            )));
        }
        Err(CommunicationError(format!(
            "Unhandled client error {}: {}",
            status.as_u16(),
            message
        )))
    }
}

impl Connection for ConnectHttp {
    fn connect(config: NotificationConfig) -> ConnectHttp {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Could not configure the HTTP client, using defaults: {}", e);
                Client::new()
            });
        ConnectHttp { config, client }
    }

    fn fetch_vapid_key(&self) -> error::Result<String> {
        let url = self.url(VAPID_KEY_PATH)?;
        let response = self.with_auth(self.client.get(url.clone())).send()?;
        debug!("vapid key via {}: {}", url, response.status());
        let response = self.check_response_error(response)?;
        let payload: VapidKeyResponse = response.json()?;
        Ok(payload.vapid_public_key)
    }

    fn upload_subscription(&self, record: &SubscriptionRecord) -> error::Result<()> {
        let url = self.url(SUBSCRIBE_PATH)?;
        let response = self
            .with_auth(self.client.post(url.clone()))
            .json(record)
            .send()?;
        info!(
            "uploaded subscription for {} via {}: {}",
            error_support::redact_url(&record.endpoint),
            url,
            response.status()
        );
        self.check_response_error(response)?;
        Ok(())
    }

    fn delete_subscription(&self, endpoint: &str) -> error::Result<()> {
        let url = self.url(UNSUBSCRIBE_PATH)?;
        let response = self
            .with_auth(self.client.post(url.clone()))
            .json(&serde_json::json!({ "endpoint": endpoint }))
            .send()?;
        info!(
            "deleted subscription for {} via {}: {}",
            error_support::redact_url(endpoint),
            url,
            response.status()
        );
        self.check_response_error(response)?;
        Ok(())
    }

    fn unread_count(&self) -> error::Result<u64> {
        let url = self.url(UNREAD_COUNT_PATH)?;
        let response = self.with_auth(self.client.get(url)).send()?;
        let response = self.check_response_error(response)?;
        let payload: UnreadCountResponse = response.json()?;
        Ok(payload.unread_count)
    }

    fn send_test_notification(&self) -> error::Result<()> {
        let url = self.url(TEST_NOTIFICATION_PATH)?;
        let response = self.with_auth(self.client.post(url.clone())).send()?;
        info!("requested a test notification via {}: {}", url, response.status());
        self.check_response_error(response)?;
        Ok(())
    }
}
