//! Locksmith server daemon and companion client CLI.
//!
//! `locksmith` (or `locksmith serve`) runs the lock server, configured
//! entirely through environment variables; `locksmith session` starts an
//! interactive client against a running server.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use locksmith_core::client::{Client, ClientTlsOptions};
use locksmith_core::{Config, Locksmith};

#[derive(Parser)]
#[command(
    name = "locksmith",
    about = "Named, mutually-exclusive advisory locks over TCP",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the lock server (the default when no command is given)
    Serve,
    /// Interactive client session against a running server
    Session {
        /// Server host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Server port
        #[arg(long, default_value_t = 9000)]
        port: u16,

        /// CA bundle (PEM) used to verify the server; enables TLS
        #[arg(long)]
        ca_cert: Option<String>,

        /// Name to verify on the server certificate (defaults to the host)
        #[arg(long)]
        domain: Option<String>,

        /// Client certificate (PEM) for mTLS servers
        #[arg(long, requires = "key")]
        cert: Option<String>,

        /// Client private key (PEM) for mTLS servers
        #[arg(long, requires = "cert")]
        key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await,
        Commands::Session { host, port, ca_cert, domain, cert, key } => {
            session(host, port, ca_cert, domain, cert, key).await
        }
    }
}

async fn serve() -> Result<()> {
    let config = Config::from_env()?;
    locksmith_core::logging::init(&config.logging);

    log::info!("starting locksmith {}", env!("CARGO_PKG_VERSION"));
    log::info!(
        "queue mode {:?}, {} shard(s) with capacity {}",
        config.queue.mode,
        config.queue.concurrency,
        config.queue.capacity
    );

    let server = Locksmith::bind(config).await?;
    tokio::select! {
        result = server.run() => result,
        signal = shutdown_signal() => {
            log::info!("captured stop signal {}, stopping locksmith", signal);
            Ok(())
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "interrupt"
}

async fn session(
    host: String,
    port: u16,
    ca_cert: Option<String>,
    domain: Option<String>,
    cert: Option<String>,
    key: Option<String>,
) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let (mut client, mut acquired) = match ca_cert {
        Some(ca_cert_path) => {
            let options = ClientTlsOptions {
                domain: domain.unwrap_or_else(|| host.clone()),
                ca_cert_path,
                cert_path: cert,
                key_path: key,
            };
            Client::connect_tls(&host, port, &options).await?
        }
        None => Client::connect(&host, port).await?,
    };

    tokio::spawn(async move {
        while let Some(tag) = acquired.recv().await {
            println!("acquired: {}", tag);
        }
        println!("server closed the connection");
    });

    println!("session started, the following commands are supported:");
    println!();
    println!("  acquire <tag>");
    println!("  release <tag>");
    println!("  quit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("acquire"), Some(tag)) => client.acquire(tag).await?,
            (Some("release"), Some(tag)) => client.release(tag).await?,
            (Some("quit"), _) | (Some("exit"), _) => break,
            (None, _) => {}
            _ => println!("unrecognized command: {}", line),
        }
    }

    Ok(())
}
