//! AppendFS Server Binary
//!
//! Starts the TCP server over a data directory.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use appendfs::network::Server;
use appendfs::{Config, Engine};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

/// AppendFS Server
#[derive(Parser, Debug)]
#[command(name = "appendfs-server")]
#[command(about = "Transactional append-write file server")]
#[command(version)]
struct Args {
    /// The IPv4 address of the server
    #[arg(long = "server_ipv4_addr", value_name = "IPV4_ADDRESS")]
    server_ipv4_addr: String,

    /// The port number the server is to listen on
    #[arg(long = "server_port", value_name = "NUMBER")]
    server_port: u16,

    /// The path to the directory where the server is to write files
    #[arg(long = "server_directory", value_name = "DIRECTORY_PATH")]
    server_directory: PathBuf,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,appendfs=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let addr: Ipv4Addr = match args.server_ipv4_addr.parse() {
        Ok(addr) => addr,
        Err(_) => {
            tracing::error!(
                "invalid IPv4 address \"{}\": expected a four octet address in the form \"AAA.BBB.CCC.DDD\"",
                args.server_ipv4_addr
            );
            std::process::exit(1);
        }
    };

    if args.server_port == 0 {
        tracing::error!("invalid port number 0: expected a port in the range 1..65535");
        std::process::exit(1);
    }

    if !args.server_directory.is_dir() {
        tracing::error!(
            "server directory \"{}\" does not exist",
            args.server_directory.display()
        );
        std::process::exit(1);
    }

    tracing::info!("AppendFS Server v{}", appendfs::VERSION);
    tracing::info!("Data directory: {}", args.server_directory.display());

    let config = Config::builder()
        .directory(args.server_directory)
        .listen_addr(format!("{}:{}", addr, args.server_port))
        .build();

    // Open the engine; recovery runs before the listener starts
    let engine = match Engine::open(&config) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("engine initialized");

    let mut server = Server::new(config, engine);
    if let Err(e) = server.run() {
        tracing::error!("server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("server stopped");
}
