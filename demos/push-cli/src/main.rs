/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::sync::Arc;

use clap::{Parser, Subcommand};

use push_notifications::{
    decode_key, encode_key, ClientQuery, ExtendableEvent, NotificationConfig, NotificationOptions,
    NotificationService, PermissionPlatform, PermissionState, PlatformBindings, PlatformError,
    PlatformSubscription, Protocol, PushService, RegistrationHandle, ShownNotification,
    SubscribeOptions, WindowClient, WorkerContainer, WorkerEvent, WorkerGlobalScope,
    WorkerRuntime, WorkerState,
};

#[derive(Debug, Parser)]
#[command(name = "push-cli", about = "Talk to the Team Monitoring notification backend", long_about = None)]
struct Cli {
    /// host[:port] of the backend
    #[arg(long, default_value = "localhost:8000")]
    server: String,

    /// Use plain http
    #[arg(long, action)]
    insecure: bool,

    /// Bearer token for the backend
    #[arg(long)]
    token: Option<String>,

    /// Where to keep the preferences database
    #[arg(long, default_value = "push-cli.db")]
    database: String,

    #[arg(short, long, action)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch and validate the backend's VAPID public key
    VapidKey,
    /// Ask the backend to push a test notification
    TestNotification,
    /// Show the unread notification count
    UnreadCount,
    /// Decode a base64url key and print its bytes
    DecodeKey { key: String },
    /// Encode hex bytes as standard base64, the way subscription keys are uploaded
    EncodeKey { hex: String },
    /// Run a push payload through the worker and print the notification it shows
    SimulatePush {
        /// JSON payload; empty means a push without data
        payload: Option<String>,
        /// Click the notification afterwards, with this action ("open" or "close")
        #[arg(long)]
        click: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let mut config = NotificationConfig::new(cli.server.clone(), cli.database.clone());
    config.auth_token = cli.token.clone();
    if cli.insecure {
        config.http_protocol = Protocol::Http;
    }

    match cli.command {
        Commands::VapidKey => {
            let key = service(config)?.fetch_vapid_key()?;
            println!("{} ({} bytes)", key.public_key, key.key_bytes.len());
        }
        Commands::TestNotification => {
            service(config)?.send_test_notification()?;
            println!("Requested a test notification");
        }
        Commands::UnreadCount => match service(config)?.poll_unread_count()? {
            Some(count) => println!("{} unread", count),
            None => println!("Polled too recently"),
        },
        Commands::DecodeKey { key } => {
            let bytes = decode_key(&key)?;
            println!("{} bytes: {:02x?}", bytes.len(), bytes);
        }
        Commands::EncodeKey { hex: digits } => {
            println!("{}", encode_key(&hex::decode(digits.trim())?))
        }
        Commands::SimulatePush { payload, click } => simulate_push(config, payload, click)?,
    }
    Ok(())
}

fn init_logging(cli: &Cli) {
    let log_filter = if cli.verbose {
        "push_notifications=trace"
    } else {
        "push_notifications=info"
    };
    env_logger::init_from_env(env_logger::Env::default().filter_or("RUST_LOG", log_filter));
}

fn service(config: NotificationConfig) -> anyhow::Result<NotificationService> {
    let headless = Arc::new(Headless);
    Ok(NotificationService::new(
        config,
        PlatformBindings {
            worker_container: headless.clone(),
            push_service: headless.clone(),
            permission: headless,
        },
    )?)
}

fn simulate_push(
    config: NotificationConfig,
    payload: Option<String>,
    click: Option<String>,
) -> anyhow::Result<()> {
    // Pushes are only ever delivered to an activated worker.
    let runtime = WorkerRuntime::new(config, Arc::new(ConsoleScope), WorkerState::Activated);
    let event = ExtendableEvent::new();
    runtime.dispatch(
        WorkerEvent::Push {
            data: payload.map(String::into_bytes),
        },
        &event,
    )?;
    log::debug!("push extended {} time(s)", event.extension_count());
    if let Some(action) = click {
        let notification = ShownNotification {
            title: String::from("(clicked)"),
            tag: None,
        };
        runtime.dispatch(
            WorkerEvent::NotificationClick {
                notification,
                action: Some(action),
            },
            &ExtendableEvent::new(),
        )?;
    }
    Ok(())
}

/// A platform with no worker and no push; only the backend calls work.
struct Headless;

fn unsupported() -> PlatformError {
    PlatformError::Unsupported(String::from("no push service in a terminal"))
}

impl WorkerContainer for Headless {
    fn is_supported(&self) -> bool {
        false
    }

    fn get_registration(&self, _scope: &str) -> Result<Option<RegistrationHandle>, PlatformError> {
        Ok(None)
    }

    fn register(&self, _script_url: &str, _scope: &str) -> Result<RegistrationHandle, PlatformError> {
        Err(unsupported())
    }

    fn ready(&self, _scope: &str) -> Result<RegistrationHandle, PlatformError> {
        Err(unsupported())
    }
}

impl PushService for Headless {
    fn subscribe(
        &self,
        _registration: &RegistrationHandle,
        _options: &SubscribeOptions,
    ) -> Result<PlatformSubscription, PlatformError> {
        Err(unsupported())
    }

    fn get_subscription(
        &self,
        _registration: &RegistrationHandle,
    ) -> Result<Option<PlatformSubscription>, PlatformError> {
        Ok(None)
    }

    fn unsubscribe(&self, _registration: &RegistrationHandle) -> Result<bool, PlatformError> {
        Ok(false)
    }

    fn user_agent(&self) -> String {
        format!("push-cli/{}", env!("CARGO_PKG_VERSION"))
    }
}

impl PermissionPlatform for Headless {
    fn permission(&self) -> PermissionState {
        PermissionState::Default
    }

    fn request_permission(&self) -> Result<PermissionState, PlatformError> {
        Ok(PermissionState::Default)
    }
}

/// Prints what a worker would show.
struct ConsoleScope;

impl WorkerGlobalScope for ConsoleScope {
    fn skip_waiting(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    fn claim_clients(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    fn show_notification(
        &self,
        title: &str,
        options: &NotificationOptions,
    ) -> Result<(), PlatformError> {
        println!("[{}] {}", title, options.body);
        println!("{:#?}", options);
        Ok(())
    }

    fn close_notification(&self, notification: &ShownNotification) {
        println!("closed {:?}", notification.title);
    }

    fn match_all_clients(&self, _query: ClientQuery) -> Result<Vec<WindowClient>, PlatformError> {
        Ok(Vec::new())
    }

    fn focus_client(&self, client_id: &str) -> Result<(), PlatformError> {
        println!("focus {}", client_id);
        Ok(())
    }

    fn open_window(&self, url: &str) -> Result<(), PlatformError> {
        println!("open {}", url);
        Ok(())
    }
}
