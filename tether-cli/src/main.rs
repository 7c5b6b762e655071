use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tether_client::transfer::{DirectorySink, TransferUpdate};
use tether_client::{ContextEvent, EngineConfig, SessionContext, Subscription};
use tether_core::{ChannelLabel, IceServerConfig, SessionCode, TransferStatus};
use tether_server::{RendezvousConfig, RendezvousService};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Host or join a two-party screen sharing session")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the rendezvous service.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,

        /// STUN url handed to participants; repeatable.
        #[arg(long = "stun")]
        stun: Vec<String>,
    },
    /// Create a session and print its code.
    Host {
        #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
        server: String,

        /// File to send as soon as the guest is connected.
        #[arg(long)]
        send: Option<PathBuf>,
    },
    /// Join a session by code.
    Join {
        code: Option<String>,

        #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
        server: String,

        #[arg(long, default_value = "./downloads")]
        downloads: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Serve { bind, stun } => serve(bind, stun).await,
        Commands::Host { server, send } => host(server, send).await,
        Commands::Join {
            code,
            server,
            downloads,
        } => join(code, server, downloads).await,
    }
}

async fn serve(bind: SocketAddr, stun: Vec<String>) -> Result<()> {
    let mut config = RendezvousConfig {
        bind,
        ..RendezvousConfig::default()
    };
    if !stun.is_empty() {
        config.ice_servers = vec![IceServerConfig {
            urls: stun,
            username: None,
            credential: None,
        }];
    }

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    println!("{}", "🚀 Rendezvous is up".green().bold());
    println!("   🔌 ws://{}/ws", config.bind);

    tether_server::serve(listener, RendezvousService::new(config.ice_servers), async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

fn banner(code: &SessionCode) {
    println!();
    println!("{}", "   Session code   ".on_blue().white().bold());
    println!("   {}", code.to_string().yellow().bold());
    println!();
}

/// Resolves once the named channel is open.
fn channel_ready(context: &SessionContext, wanted: ChannelLabel) -> (Arc<Notify>, Subscription) {
    let ready = Arc::new(Notify::new());
    let notify = ready.clone();
    let sub = context.subscribe(move |event| {
        if let ContextEvent::ChannelOpened(label) = event {
            if *label == wanted {
                notify.notify_one();
            }
        }
        if let ContextEvent::ConnectionFailed = event {
            println!("{}", "❌ Connection to the peer failed".red());
        }
    });
    (ready, sub)
}

/// Resolves once the session is no longer active.
fn session_over(context: &SessionContext) -> (Arc<Notify>, Subscription) {
    let over = Arc::new(Notify::new());
    let notify = over.clone();
    let sub = context.session().subscribe(move |change| {
        if change.previous.is_active && !change.next.is_active {
            notify.notify_one();
        }
    });
    (over, sub)
}

async fn host(server: String, send: Option<PathBuf>) -> Result<()> {
    let context = SessionContext::builder(EngineConfig {
        signaling_url: server,
        ..EngineConfig::default()
    })
    .build();

    let (ready, _ready_sub) = channel_ready(&context, ChannelLabel::FileTransfer);
    let (over, _over_sub) = session_over(&context);

    let code = context
        .create_session()
        .await
        .context("Failed to create session")?;
    banner(&code);
    println!("{}", "⏳ Waiting for a guest... (Ctrl-C to stop)".cyan());

    let mut pending = send;
    loop {
        tokio::select! {
            _ = ready.notified(), if pending.is_some() => {
                if let Some(path) = pending.take() {
                    println!("{} {}", "📦 Sending".cyan(), path.display());
                    match context.transfers().send_file(&path).await {
                        Ok(record) if record.status == TransferStatus::Completed => {
                            println!("{}", "✨ File delivered".green().bold());
                        }
                        Ok(record) => println!(
                            "{} {:?} {}",
                            "⚠️  Transfer ended:".yellow(),
                            record.status,
                            record.error.unwrap_or_default()
                        ),
                        Err(e) => println!("{} {}", "❌ Could not send:".red(), e),
                    }
                }
            }
            _ = over.notified() => {
                println!("{}", "👋 Session ended".yellow());
                break;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    context.shutdown().await;
    info!("Host stopped");
    Ok(())
}

async fn join(code: Option<String>, server: String, downloads: PathBuf) -> Result<()> {
    let code = match code {
        Some(code) => code,
        None => dialoguer::Input::<String>::new()
            .with_prompt("Session code")
            .validate_with(|input: &String| {
                SessionCode::parse(input)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            })
            .interact_text()
            .context("Failed to read the session code")?,
    };

    let context = SessionContext::builder(EngineConfig {
        signaling_url: server,
        ..EngineConfig::default()
    })
    .file_sink(Arc::new(DirectorySink::new(downloads.clone())))
    .build();

    let (over, _over_sub) = session_over(&context);
    let _transfers = context.transfers().subscribe(|update| {
        if let TransferUpdate::Changed(record) = update {
            match record.status {
                TransferStatus::Completed => {
                    println!("{} {}", "✨ Received".green().bold(), record.name)
                }
                TransferStatus::Failed => println!(
                    "{} {} {}",
                    "❌ Failed to receive".red(),
                    record.name,
                    record.error.as_deref().unwrap_or_default()
                ),
                _ => {}
            }
        }
    });

    let session_id = context
        .join_session(&code)
        .await
        .context("Failed to join session")?;
    banner(&session_id);
    println!(
        "{} {}",
        "📂 Files are saved to".cyan(),
        downloads.display()
    );

    tokio::select! {
        _ = over.notified() => println!("{}", "👋 The host ended the session".yellow()),
        _ = tokio::signal::ctrl_c() => {}
    }

    context.shutdown().await;
    info!("Guest stopped");
    Ok(())
}
