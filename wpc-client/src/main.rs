//! wpc - command-line front end for a remote media player
//!
//! Runs one query or command per invocation and prints the result as
//! pretty JSON. `watch` streams push notifications until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wpc_client::{Client, HttpTransport, PollOptions};
use wpc_common::{
    ClientConfig, Domains, NewPlaylist, NotificationFilter, PlaybackState, PlaylistRange,
    PlaylistRef, QuerySpec,
};

const DEFAULT_LOG_FILTER: &str = "wpc=info,wpc_client=info,wpc_common=info";
const VERBOSE_LOG_FILTER: &str = "wpc=debug,wpc_client=debug,wpc_common=debug";

/// Command-line arguments for wpc
#[derive(Parser, Debug)]
#[command(name = "wpc")]
#[command(about = "Query, control and watch a remote media player")]
#[command(version)]
struct Args {
    /// Configuration file (overrides WPC_CONFIG and the platform default)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the remote player API
    #[arg(short, long, global = true)]
    base_url: Option<String>,

    /// Log client internals at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the player state
    State {
        /// Track column selectors, e.g. %title%
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,
    },
    /// Print all playlists
    Playlists,
    /// Print the items of one playlist
    Items {
        plref: PlaylistRef,
        /// Half-open window start:end (whole playlist if omitted)
        #[arg(long)]
        range: Option<PlaylistRange>,
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,
    },
    /// Run a composite query given as JSON, e.g. '{"player":true,"playlists":true}'
    Query { spec: String },
    /// Play an item, or resume the current one when no target is given
    Play {
        #[arg(requires = "index")]
        plref: Option<PlaylistRef>,
        index: Option<u32>,
    },
    Pause,
    Stop,
    Next,
    Previous,
    /// Create a playlist
    AddPlaylist {
        #[arg(long)]
        title: Option<String>,
        /// Position among existing playlists
        #[arg(long)]
        index: Option<u32>,
    },
    /// Append paths or URLs to a playlist
    AddItems {
        plref: PlaylistRef,
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Stream notifications until interrupted
    Watch {
        /// Watch updates (with payload) instead of plain events
        #[arg(long)]
        updates: bool,
        #[arg(long)]
        player: bool,
        #[arg(long)]
        playlists: bool,
        #[arg(long)]
        playlist_items: bool,
    },
    /// Wait until the player reports a playback state
    WaitState {
        state: PlaybackState,
        /// Give up after this many milliseconds (configured default if omitted)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let default_filter = if args.verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config =
        ClientConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
        config.validate().context("Invalid --base-url")?;
    }
    debug!("Using player API at {}", config.base_url);

    let transport = HttpTransport::from_config(&config).context("Failed to build HTTP client")?;
    let client = Client::new(Arc::new(transport), config);

    match args.command {
        Cmd::State { columns } => print_json(&client.get_player_state(columns).await?)?,
        Cmd::Playlists => print_json(&client.get_playlists().await?)?,
        Cmd::Items {
            plref,
            range,
            columns,
        } => {
            let items = match range {
                Some(range) => client.get_playlist_items_in(plref, Some(range), columns).await?,
                None => client.get_playlist_items(plref, columns).await?,
            };
            print_json(&items)?;
        }
        Cmd::Query { spec } => {
            let spec: QuerySpec =
                serde_json::from_str(&spec).context("Query spec is not valid JSON")?;
            print_json(&client.query(&spec).await?)?;
        }
        Cmd::Play { plref, index } => match (plref, index) {
            (Some(plref), Some(index)) => client.play(plref, index).await?,
            _ => client.play_current().await?,
        },
        Cmd::Pause => client.pause().await?,
        Cmd::Stop => client.stop().await?,
        Cmd::Next => client.next().await?,
        Cmd::Previous => client.previous().await?,
        Cmd::AddPlaylist { title, index } => {
            client.add_playlist(NewPlaylist { title, index }).await?
        }
        Cmd::AddItems { plref, items } => client.add_playlist_items(plref, items).await?,
        Cmd::Watch {
            updates,
            player,
            playlists,
            playlist_items,
        } => {
            let mut domains = Domains {
                player,
                playlists,
                playlist_items,
            };
            if domains.is_empty() {
                domains = Domains::ALL;
            }
            let filter = if updates {
                NotificationFilter::updates(domains)
            } else {
                NotificationFilter::events(domains)
            };
            watch(&client, filter).await?;
        }
        Cmd::WaitState { state, timeout_ms } => {
            let mut options = PollOptions::default();
            if let Some(ms) = timeout_ms {
                options = options.timeout(Duration::from_millis(ms));
            }
            let reached = client
                .wait_for_state_with(move |s| s.playback_state() == Some(state), options)
                .await
                .with_context(|| format!("Player did not reach '{}'", state))?;
            print_json(&reached)?;
        }
    }

    Ok(())
}

async fn watch(client: &Client, filter: NotificationFilter) -> Result<()> {
    client.open_channel()?;
    let mut notifications = client.watch(filter);
    client
        .multiplexer()
        .wait_live()
        .await
        .context("Failed to open push channel")?;
    info!("Watching {}", filter);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            received = notifications.recv() => match received {
                Some(notification) => print_json(&notification)?,
                None => {
                    info!("Push channel closed");
                    return Err(client.multiplexer().closed_reason())
                        .context("Push channel ended");
                }
            },
            _ = &mut shutdown => {
                client.close_channel();
                return Ok(());
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", json);
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            debug!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                debug!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
