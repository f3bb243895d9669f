/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Provides configuration for the [NotificationService](`crate::NotificationService`)
//! and the background [WorkerRuntime](`crate::WorkerRuntime`).

use std::{fmt::Display, str::FromStr, time::Duration};

use crate::error::Error;

pub const DEFAULT_TITLE: &str = "Team Monitoring";
pub const DEFAULT_BODY: &str = "You have a new notification";
pub const DEFAULT_TAG: &str = "default";

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    /// host name:port of the REST backend
    pub server_host: String,

    /// http protocol of the REST backend
    pub http_protocol: Protocol,

    /// Path prefix of the REST API, e.g. "/api"
    pub api_prefix: String,

    /// Token sent as `Authorization: Bearer ...`, if the session has one
    pub auth_token: Option<String>,

    /// HTTP timeout for backend calls
    pub request_timeout: Duration,

    /// URL of the background worker script
    pub worker_script: String,

    /// Scope the background worker controls
    pub worker_scope: String,

    /// Where a click opens a new window when no app window is found
    pub app_root: String,

    /// Substrings identifying an application window (matched against the window URL)
    pub app_origins: Vec<String>,

    pub default_icon: String,

    pub default_badge: String,

    /// OS Path to the preferences database
    pub database_path: String,

    /// How often the unread count is polled
    pub unread_poll_interval: Duration,

    /// Minimum seconds between two reconciliation sweeps
    pub reconcile_interval_secs: u64,
}

impl NotificationConfig {
    pub fn new(server_host: impl Into<String>, database_path: impl Into<String>) -> Self {
        Self {
            server_host: server_host.into(),
            http_protocol: Protocol::Https,
            api_prefix: String::from("/api"),
            auth_token: None,
            request_timeout: Duration::from_secs(10),
            worker_script: String::from("/sw.js"),
            worker_scope: String::from("/"),
            app_root: String::from("/"),
            app_origins: vec![String::from("localhost"), String::from("team-monitoring")],
            default_icon: String::from("/icon.png"),
            default_badge: String::from("/badge.png"),
            database_path: database_path.into(),
            unread_poll_interval: Duration::from_secs(10),
            reconcile_interval_secs: 24 * 60 * 60,
        }
    }

    pub(crate) fn api_url(&self, path: &str) -> String {
        format!(
            "{}://{}{}{}",
            self.http_protocol,
            self.server_host,
            self.api_prefix.trim_end_matches('/'),
            path
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Protocol {
    #[default]
    Https,
    Http,
}

impl Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Protocol::Http => "http",
                Protocol::Https => "https",
            }
        )
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "http" => Protocol::Http,
            "https" => Protocol::Https,
            _ => return Err(Error::GeneralError("Invalid protocol".to_string())),
        })
    }
}

#[cfg(test)]
// To avoid a future footgun, the default implementation is only for tests
impl Default for NotificationConfig {
    fn default() -> NotificationConfig {
        NotificationConfig::new("team-monitoring.example.com", "")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_api_url() {
        let mut config = NotificationConfig {
            http_protocol: Protocol::Http,
            server_host: "localhost:8000".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.api_url("/notifications/vapid-key/"),
            "http://localhost:8000/api/notifications/vapid-key/"
        );
        config.api_prefix = "/".to_string();
        assert_eq!(
            config.api_url("/notifications/test/"),
            "http://localhost:8000/notifications/test/"
        );
    }

    #[test]
    fn test_protocol_from_str() {
        assert_eq!("http".parse::<Protocol>().unwrap(), Protocol::Http);
        assert_eq!("https".parse::<Protocol>().unwrap(), Protocol::Https);
        assert!("gopher".parse::<Protocol>().is_err());
    }
}
