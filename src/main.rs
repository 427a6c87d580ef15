//! mlock CLI - runs the lock server and talks to running ones.
//!
//! See the `mlock` library for the server and client implementations.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use mlock::constants::{API_VERSION, DEFAULT_PORT, READ_BUFFER_SIZE};
use mlock::framing::{encode_frame, FrameDecoder};
use mlock::protocol::generate_id;
use mlock::{ClientOptions, LockClient, LockServer, ServerConfig};

const DEFAULT_URI: &str = "mlock://localhost:12340";

#[derive(Parser)]
#[command(name = "mlock")]
#[command(version)]
#[command(about = "Distributed lock coordinator")]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the lock server
    Serve {
        /// JSON config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (default 12340)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print a running server's status as JSON
    Status {
        /// Server URI
        #[arg(long, default_value = DEFAULT_URI)]
        uri: String,
    },
    /// Interactive console: type raw commands, see raw replies
    Console {
        /// Server host
        #[arg(long, default_value = "localhost")]
        host: String,
        /// Server port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Identity to connect as (random if omitted)
        #[arg(long)]
        socket_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    match cli.command {
        Commands::Serve { config, host, port } => {
            let mut config = ServerConfig::load(config.as_deref())?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            run_server(config).await
        }
        Commands::Status { uri } => print_status(&uri).await,
        Commands::Console { host, port, socket_id } => {
            run_console(&host, port, socket_id.unwrap_or_else(generate_id)).await
        }
    }
}

async fn run_server(config: ServerConfig) -> Result<()> {
    let server = LockServer::start(config).await?;
    log::info!("mlock v{} ready on {}", env!("CARGO_PKG_VERSION"), server.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    server.shutdown().await;
    Ok(())
}

async fn print_status(uri: &str) -> Result<()> {
    let client = LockClient::new(ClientOptions::from_uri(uri))?;
    let status = client
        .status()
        .await
        .with_context(|| format!("Failed to query {uri}"))?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Raw line console. Sends the handshake, then forwards each stdin line as
/// one frame and prints every frame the server sends.
async fn run_console(host: &str, port: u16, socket_id: String) -> Result<()> {
    let stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("Failed to connect to {host}:{port}"))?;
    let (mut reader, mut writer) = stream.into_split();

    let hello = format!("connect {socket_id} {API_VERSION}");
    println!("> {hello}");
    writer.write_all(&encode_frame(hello.as_bytes())).await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                writer.write_all(&encode_frame(line.as_bytes())).await?;
            }
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    println!("(connection closed)");
                    break;
                }
                for payload in decoder.feed(&buf[..n])? {
                    println!("< {}", String::from_utf8_lossy(&payload));
                }
            }
        }
    }

    Ok(())
}
