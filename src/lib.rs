//! Networked two-player tic-tac-toe.
//!
//! The server speaks a length-prefixed, pipe-delimited text protocol
//! (`CMD|N|fields…|`), pairs clients first-come-first-served, and referees
//! each game to its end: win, board full, accepted draw, resignation, or a
//! peer giving up the connection.  See `src/frame.rs` for the wire grammar
//! and `src/lobby.rs` for the pairing and teardown rules.

pub mod frame;
pub mod game;
pub mod lobby;
pub mod logger;
pub mod session;

use std::fmt;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{Semaphore, watch};

use crate::lobby::Lobby;
use crate::logger::Logger;

enum AcceptEvent {
    SlotsFull,
    AcceptError { reason: String },
    Draining,
}

impl fmt::Display for AcceptEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceptEvent::SlotsFull =>
                write!(f, "Max concurrent sessions reached — new connections will queue"),
            AcceptEvent::AcceptError { reason } =>
                write!(f, "Accept error: {reason}"),
            AcceptEvent::Draining =>
                write!(f, "Shutdown requested — no longer accepting connections"),
        }
    }
}

/// Accept connections until the shutdown flag flips, spawning one session
/// task per connection.  Transient accept failures are logged and skipped.
/// On shutdown the listener is dropped and every remaining game is torn
/// down; in-flight session tasks notice the flag between reads and exit on
/// their own.
pub async fn serve(
    listener: TcpListener,
    lobby: Arc<Lobby>,
    shutdown: watch::Receiver<bool>,
    log: Arc<Logger>,
    max_sessions: usize,
) {
    let slots = Arc::new(Semaphore::new(max_sessions.max(1)));
    let mut next_id: u64 = 0;
    let mut accept_shutdown = shutdown.clone();

    loop {
        // Take a session slot before accepting; when all are occupied the
        // loop parks here and lets TCP backlog the newcomers.
        let permit = tokio::select! {
            _ = accept_shutdown.changed() => break,
            permit = Arc::clone(&slots).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        let (stream, addr) = tokio::select! {
            _ = accept_shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    log.warn(AcceptEvent::AcceptError { reason: e.to_string() });
                    drop(permit);
                    continue;
                }
            },
        };

        if slots.available_permits() == 0 {
            log.verbose(AcceptEvent::SlotsFull);
        }

        next_id += 1;
        let id = next_id;
        let lobby = Arc::clone(&lobby);
        let log = Arc::clone(&log);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            // Permit is held for the lifetime of the session task.
            let _permit = permit;
            session::run(stream, addr, id, lobby, shutdown, log).await;
        });
    }

    log.info(AcceptEvent::Draining);
    drop(listener);
    lobby.shutdown_all().await;
}
