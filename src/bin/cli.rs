//! AppendFS CLI Client
//!
//! Command-line test client: one request per invocation over a single TCP
//! stream, sequential write-then-read.

use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

use appendfs::protocol::{
    Command, ErrorCode, ResponseKind, SeqNum, TxnId, WireFormat, DEFAULT_TXN_ID,
    INITIAL_SEQ_NUM,
};
use clap::{Parser, Subcommand};

/// AppendFS CLI
#[derive(Parser, Debug)]
#[command(name = "appendfs-cli")]
#[command(about = "CLI test client for the AppendFS file server")]
#[command(version)]
struct Args {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7090")]
    server: String,

    /// Connection timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open a transaction against a target filename
    NewTxn {
        /// The target filename
        file: String,
    },

    /// Send one write fragment
    Write {
        /// The transaction id
        txn: TxnId,

        /// The fragment's sequence number (≥ 1)
        seq: SeqNum,

        /// The fragment data
        data: String,
    },

    /// Commit a transaction
    Commit {
        /// The transaction id
        txn: TxnId,

        /// The largest sequence number sent
        seq: SeqNum,
    },

    /// Abort a transaction
    Abort {
        /// The transaction id
        txn: TxnId,
    },

    /// Read the full contents of a named file
    Read {
        /// The filename to read
        file: String,
    },
}

fn main() {
    let args = Args::parse();

    let (command, txn_id, seq_num, payload) = match &args.command {
        Commands::NewTxn { file } => (
            Command::NewTxn,
            DEFAULT_TXN_ID,
            INITIAL_SEQ_NUM,
            file.as_bytes().to_vec(),
        ),
        Commands::Write { txn, seq, data } => {
            (Command::Write, *txn, *seq, data.as_bytes().to_vec())
        }
        Commands::Commit { txn, seq } => (Command::Commit, *txn, *seq, Vec::new()),
        Commands::Abort { txn } => (Command::Abort, *txn, INITIAL_SEQ_NUM, Vec::new()),
        Commands::Read { file } => (
            Command::Read,
            DEFAULT_TXN_ID,
            INITIAL_SEQ_NUM,
            file.as_bytes().to_vec(),
        ),
    };

    let mut stream = match TcpStream::connect_timeout(
        &args.server.parse().expect("invalid server address"),
        Duration::from_millis(args.timeout),
    ) {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("failed to connect to {}: {}", args.server, e);
            std::process::exit(1);
        }
    };

    let _ = stream.set_read_timeout(Some(Duration::from_millis(args.timeout)));
    let _ = stream.set_write_timeout(Some(Duration::from_millis(args.timeout)));
    let _ = stream.set_nodelay(true);

    let wire = WireFormat::default();

    let message = match wire.encode_request(command.as_str(), txn_id, seq_num, &payload) {
        Ok(message) => message,
        Err(e) => {
            eprintln!("failed to encode request: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = stream.write_all(&message).and_then(|_| stream.flush()) {
        eprintln!("failed to send request: {}", e);
        std::process::exit(1);
    }

    let response = match wire.read_response(&mut stream) {
        Ok(response) => response,
        Err(e) => {
            eprintln!("failed to read response: {}", e);
            std::process::exit(1);
        }
    };

    match response.kind {
        ResponseKind::Ack => match &args.command {
            Commands::NewTxn { .. } => println!("ACK txn_id={}", response.txn_id),
            Commands::Read { .. } => match String::from_utf8(response.data) {
                Ok(contents) => println!("{}", contents),
                Err(e) => println!("{:?}", e.into_bytes()),
            },
            _ => println!("ACK"),
        },
        ResponseKind::AskResend => {
            println!("ASK_RESEND missing_seq={}", response.seq_num);
        }
        ResponseKind::Error => {
            let message = String::from_utf8_lossy(&response.data).into_owned();
            match ErrorCode::from_code(response.error_code) {
                Some(_) => eprintln!("ERROR {}: {}", response.error_code, message),
                None => eprintln!("ERROR (unknown code {}): {}", response.error_code, message),
            }
            std::process::exit(1);
        }
    }
}
