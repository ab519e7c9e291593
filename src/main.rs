//! Classline CLI - notification sync client.
//!
//! Binary entry point. See the `classline_sync` library for the core
//! functionality; this file is command plumbing around it.

use anyhow::Result;
use clap::{Parser, Subcommand};
use classline_sync::push::{Permission, PushPlatform, PushRegistrar};
use classline_sync::server::types::DeviceTokenPayload;
use classline_sync::{
    ApiClient, ChannelEvent, Config, Credentials, NotificationStore, RealtimeManager, Resource,
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Push platform adapter for the CLI: the token is supplied on the
/// command line and permission is implied by invoking the command.
struct ProvidedToken {
    token: String,
}

impl PushPlatform for ProvidedToken {
    fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn device_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

// CLI
#[derive(Parser)]
#[command(name = "classline")]
#[command(version)]
#[command(about = "Notification sync client for the Classline backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the auth token in the OS keyring
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Clear the stored auth token and unregister this device's push token
    Logout {
        /// Also wipe the push token and device id from the keyring
        #[arg(long)]
        purge: bool,
    },
    /// Show auth, push-token and realtime status
    Status,
    /// Notification operations
    #[command(subcommand)]
    Notifications(NotificationCommands),
    /// Device push-token operations
    #[command(subcommand)]
    Push(PushCommands),
    /// Stream realtime notification events to the terminal
    Watch {
        /// Only seed the view with unread notifications
        #[arg(long)]
        unread: bool,
    },
}

#[derive(Subcommand)]
enum NotificationCommands {
    /// List notifications
    List {
        /// Only unread ones
        #[arg(long)]
        unread: bool,
    },
    /// Mark one notification read
    Read { id: i64 },
    /// Mark every notification read
    ReadAll,
    /// Delete one notification
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum PushCommands {
    /// Register a device push token with the backend
    Register {
        /// Token issued by the platform push service
        #[arg(long)]
        token: String,
    },
    /// Replace the cached token after the platform rotated it
    Refresh {
        #[arg(long)]
        token: String,
    },
    /// Remove this device's push token locally and on the backend
    Unregister,
}

/// Build an API client from config, requiring a stored token.
fn authed_client(config: &Config) -> Result<ApiClient> {
    if !config.has_token() {
        anyhow::bail!("Not logged in. Run `classline login` first.");
    }
    Ok(ApiClient::new(
        config.server_url.clone(),
        config.auth_token().to_string(),
    )?)
}

async fn run_login(email: &str, password: &str) -> Result<()> {
    let mut config = Config::load()?;
    let api = ApiClient::new(config.server_url.clone(), String::new())?;

    let response = api.login(email, password).await?;
    config.save_token(&response.token)?;
    config.role = Some(response.role);
    config.save()?;

    // A push token cached before login is upserted now
    let mut creds = Credentials::load()?;
    if creds.push_pending {
        let api = authed_client(&config)?;
        let synced = PushRegistrar::new(&mut creds).flush_pending(&api).await?;
        creds.save()?;
        if synced {
            println!("Pending push token registered.");
        }
    }

    println!("Logged in as {} ({}).", email, response.role);
    println!("Landing view: {}", response.role.landing_view());
    Ok(())
}

async fn run_logout(purge: bool) -> Result<()> {
    let mut config = Config::load()?;

    if config.has_token() {
        let mut creds = Credentials::load()?;
        if creds.push_token().is_some() {
            let api = authed_client(&config)?;
            PushRegistrar::new(&mut creds).remove_token(&api).await?;
            creds.save()?;
        }
    }

    config.clear_token()?;
    config.role = None;
    config.save()?;

    if purge {
        Credentials::delete()?;
        println!("Logged out; credentials wiped.");
    } else {
        println!("Logged out.");
    }
    Ok(())
}

async fn run_status() -> Result<()> {
    let config = Config::load()?;
    let creds = Credentials::load()?;

    println!("Server:     {}", config.server_url);
    println!(
        "Auth:       {}",
        if config.has_token() {
            "logged in"
        } else {
            "logged out"
        }
    );
    if let Some(role) = config.role {
        println!("Role:       {}", role);
    }
    match creds.push_token() {
        Some(_) if creds.push_pending => println!("Push token: cached, upsert pending"),
        Some(_) => println!("Push token: registered"),
        None => println!("Push token: none"),
    }
    Ok(())
}

fn print_notifications(store: &NotificationStore) {
    for n in store.records() {
        let marker = if n.read { " " } else { "*" };
        println!(
            "{} [{}] {}  {}",
            marker,
            n.id,
            n.created_at.format("%Y-%m-%d %H:%M"),
            n.message
        );
    }
    println!("{} notifications, {} unread", store.len(), store.unread());
}

async fn run_list(unread: bool) -> Result<()> {
    let config = Config::load()?;
    let api = authed_client(&config)?;

    let mut view = Resource::Loading;
    view.resolve(api.fetch_notifications(unread, config.fetch_limit).await);

    match &view {
        Resource::Ready(list) => {
            let mut store = NotificationStore::new();
            let token = store.begin_fetch();
            store.apply_fetch(token, list.notifications.clone());
            print_notifications(&store);
            Ok(())
        }
        Resource::Failed(msg) => anyhow::bail!("Fetch failed: {msg}"),
        _ => anyhow::bail!("Fetch did not complete"),
    }
}

async fn run_push(command: PushCommands) -> Result<()> {
    let config = Config::load()?;
    let mut creds = Credentials::load()?;
    let api = if config.has_token() {
        Some(authed_client(&config)?)
    } else {
        None
    };

    {
        let mut registrar = PushRegistrar::new(&mut creds);
        match command {
            PushCommands::Register { token } => {
                let platform = ProvidedToken { token };
                let outcome = registrar.initialize(&platform, api.as_ref()).await?;
                println!("Push registration: {:?}", outcome);
            }
            PushCommands::Refresh { token } => {
                let outcome = registrar.on_token_refresh(token, api.as_ref()).await?;
                println!("Push token refresh: {:?}", outcome);
            }
            PushCommands::Unregister => {
                match api.as_ref() {
                    Some(api) => registrar.remove_token(api).await?,
                    None => anyhow::bail!("Not logged in. Run `classline login` first."),
                }
                println!("Push token removed.");
            }
        }
    }

    creds.save()?;
    Ok(())
}

async fn run_watch(unread: bool) -> Result<()> {
    let config = Config::load()?;
    let api = authed_client(&config)?;

    let store = Arc::new(Mutex::new(NotificationStore::new()));

    // Seed the store over HTTP before streaming
    {
        let mut store = store.lock().await;
        let token = store.begin_fetch();
        let list = api.fetch_notifications(unread, config.fetch_limit).await?;
        store.apply_fetch(token, list.notifications);
        print_notifications(&store);
    }

    let manager = RealtimeManager::new(config.server_url.clone());
    let Some(mut events) = manager.connect(config.auth_token().to_string()).await? else {
        anyhow::bail!("Realtime channel already connected");
    };

    println!("Watching for notifications (Ctrl-C to stop)...");

    let consumer_store = Arc::clone(&store);
    let consumer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let mut store = consumer_store.lock().await;
            match event {
                ChannelEvent::NewNotification(n) => {
                    println!("* [{}] {}", n.id, n.message);
                    store.apply_incoming(n);
                    println!("  ({} unread)", store.unread());
                }
                ChannelEvent::NotificationMarkedRead { id } => {
                    // Ack only; the originating request already applied it
                    log::debug!("Server acked read for {}", id);
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    manager.disconnect().await;
    consumer.abort();
    println!("Stopped.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Login { email, password } => run_login(&email, &password).await?,
        Commands::Logout { purge } => run_logout(purge).await?,
        Commands::Status => run_status().await?,
        Commands::Notifications(command) => match command {
            NotificationCommands::List { unread } => run_list(unread).await?,
            NotificationCommands::Read { id } => {
                let config = Config::load()?;
                authed_client(&config)?.mark_read(id).await?;
                println!("Marked {} read.", id);
            }
            NotificationCommands::ReadAll => {
                let config = Config::load()?;
                authed_client(&config)?.mark_all_read().await?;
                println!("Marked all read.");
            }
            NotificationCommands::Delete { id } => {
                let config = Config::load()?;
                authed_client(&config)?.delete_notification(id).await?;
                println!("Deleted {}.", id);
            }
        },
        Commands::Push(command) => run_push(command).await?,
        Commands::Watch { unread } => run_watch(unread).await?,
    }

    Ok(())
}
