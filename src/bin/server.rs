use clap::{ArgAction, Parser};
use std::fmt;
use std::sync::Arc;
use tactix::lobby::Lobby;
use tactix::logger::Logger;
use tokio::net::TcpListener;
use tokio::sync::watch;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name    = "server",
    version,
    about   = "tactix — networked tic-tac-toe, dedicated server",
    long_about = "Pairs TCP clients first-come-first-served and referees\n\
                  rule-enforced tic-tac-toe games to completion.\n\
                  Protocol is length-prefixed pipe-delimited text; see\n\
                  src/frame.rs for the full grammar."
)]
struct Args {
    /// Port to listen on (all interfaces)
    port: u16,

    /// Increase output verbosity (-v verbose, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Maximum number of concurrent client connections
    #[arg(short = 's', long, default_value_t = 64)]
    max_sessions: usize,
}

// ── DISPLAY EVENTS ────────────────────────────────────────────────────────────

enum Event {
    Listening { port: u16 },
    Interrupted,
    Stopped,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Listening { port } =>
                write!(f, "Server listening on port {port}"),
            Event::Interrupted =>
                write!(f, "Interrupt received — shutting down"),
            Event::Stopped =>
                write!(f, "Server stopped"),
        }
    }
}

// ── ENTRY POINT ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let log  = Arc::new(Logger::new(args.verbose));

    let listener = TcpListener::bind(("0.0.0.0", args.port))
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to bind port {}: {e}", args.port);
            std::process::exit(1);
        });

    log.info(Event::Listening { port: args.port });

    let (stop_tx, stop_rx) = watch::channel(false);
    let log_signal = Arc::clone(&log);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log_signal.info(Event::Interrupted);
        }
        let _ = stop_tx.send(true);
    });

    let lobby = Arc::new(Lobby::new(Arc::clone(&log)));
    tactix::serve(listener, lobby, stop_rx, Arc::clone(&log), args.max_sessions).await;

    log.info(Event::Stopped);
}
