//! webpush-relay CLI.
//!
//! Thin entry point over the `webpush_relay` library: serve invocations over
//! HTTP, run one invocation from the command line, or mint VAPID keys.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use webpush_relay::notifications::payload::{DEFAULT_ICON, DEFAULT_URL};
use webpush_relay::{
    server, Config, InvocationRequest, Invoker, NotificationPayload, SystemCrypto, VapidKeys,
};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "webpush-relay")]
#[command(version)]
#[command(about = "Encrypted Web Push delivery with VAPID and subscription pruning")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept invocations over HTTP
    Serve {
        /// Listen address (overrides BIND_ADDR)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Send one notification and print the outcome
    Send {
        /// Recipient user id, or "all"
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        #[arg(long, default_value = DEFAULT_ICON)]
        icon: String,
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
    /// Print a fresh VAPID keypair as environment assignments
    GenerateKeys,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = Config::from_env();
            if let Some(addr) = bind {
                config.bind_addr = addr;
            }
            if !config.has_vapid_keys() {
                log::warn!("[WebPush] VAPID keys not configured; invocations will fail with 500");
            }
            let addr = config.bind_addr;
            let invoker = Invoker::from_config(config, Arc::new(SystemCrypto))
                .context("Failed to set up subscription store")?;
            server::start_server(Arc::new(invoker), addr).await?;
        }
        Commands::Send {
            user_id,
            title,
            body,
            icon,
            url,
        } => {
            let invoker = Invoker::from_config(Config::from_env(), Arc::new(SystemCrypto))
                .context("Failed to set up subscription store")?;
            let payload = NotificationPayload {
                title,
                body,
                icon,
                url,
            };
            let report = invoker
                .invoke(InvocationRequest::new(user_id, payload))
                .await?;

            for outcome in &report.outcomes {
                let detail = match (&outcome.http_status, &outcome.error) {
                    (_, Some(err)) => err.to_string(),
                    (Some(status), None) => format!("HTTP {status}"),
                    (None, None) => String::new(),
                };
                println!("{}\t{:?}\t{}", outcome.subscription_id, outcome.status, detail);
            }
            println!("sent {}/{}", report.sent, report.total);
        }
        Commands::GenerateKeys => {
            let keys = VapidKeys::generate().context("Failed to generate VAPID keys")?;
            println!("VAPID_PUBLIC_KEY={}", keys.public_key_base64url());
            println!("VAPID_PRIVATE_KEY={}", keys.private_key_base64url());
        }
    }

    Ok(())
}
