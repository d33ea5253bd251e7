use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, Notify, watch};

use crate::frame::{FrameError, FrameReader, Incoming, Message};
use crate::lobby::{Exit, GameCmdResult, JoinOutcome, Lobby};
use crate::logger::Logger;

// ── SHARED HANDLE ─────────────────────────────────────────────────────────────

/// The face a session shows the rest of the process: its write half, and the
/// switch the lobby throws when the session is FINISHED.  The read half stays
/// private to the session's own task; nobody interrupts its reads, the task
/// notices `ended` between them.
pub struct SessionHandle {
    pub id: u64,
    pub addr: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    ended: Notify,
    finished: AtomicBool,
}

impl SessionHandle {
    fn new(id: u64, addr: SocketAddr, writer: OwnedWriteHalf) -> Arc<Self> {
        Arc::new(Self {
            id,
            addr,
            writer: Mutex::new(writer),
            ended: Notify::new(),
            finished: AtomicBool::new(false),
        })
    }

    /// Best-effort frame write; false means the peer is effectively gone.
    pub async fn send(&self, msg: &Message) -> bool {
        let mut writer = self.writer.lock().await;
        writer.write_all(msg.to_wire().as_bytes()).await.is_ok()
    }

    /// Mark FINISHED and wake the owning task if it is blocked reading.
    /// Called by the lobby with its lock held; idempotent.
    pub(crate) fn finish(&self) {
        self.finished.store(true, Ordering::Release);
        self.ended.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

// ── DISPLAY EVENTS ────────────────────────────────────────────────────────────

enum SessionEvent<'a> {
    Opened     { id: u64, addr: SocketAddr },
    FrameIn    { id: u64, msg: &'a Message },
    BadFrame   { id: u64, err: FrameError },
    Eof        { id: u64 },
    Closed     { id: u64 },
}

impl fmt::Display for SessionEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Opened { id, addr } =>
                write!(f, "[session {id}] connected from {addr}"),
            SessionEvent::FrameIn { id, msg } =>
                write!(f, "[session {id}] → {}", msg.to_wire().trim_end()),
            SessionEvent::BadFrame { id, err } =>
                write!(f, "[session {id}] rejected frame: {err}"),
            SessionEvent::Eof { id } =>
                write!(f, "[session {id}] got EOF"),
            SessionEvent::Closed { id } =>
                write!(f, "[session {id}] closed"),
        }
    }
}

// ── SESSION LOOP ──────────────────────────────────────────────────────────────

fn is_client_command(msg: &Message) -> bool {
    matches!(
        msg,
        Message::Play { .. } | Message::Move { .. } | Message::Resign | Message::Draw(_)
    )
}

/// Drive one connection from accept to close: read a frame, validate it
/// against the session's lifecycle state, execute it, repeat.  Between reads
/// the loop observes both the process shutdown flag and the lobby's
/// FINISHED signal for this session.
///
/// The connection closes exactly once, when this task returns and drops the
/// last references to both halves.
pub async fn run(
    stream: TcpStream,
    addr: SocketAddr,
    id: u64,
    lobby: Arc<Lobby>,
    mut shutdown: watch::Receiver<bool>,
    log: Arc<Logger>,
) {
    let (read_half, write_half) = stream.into_split();
    let handle = SessionHandle::new(id, addr, write_half);
    let mut frames = FrameReader::new(read_half);
    // False until a PLAY is accepted; whether that means WAITING or PLAYING
    // afterwards is the lobby's call, made under its lock per frame.
    let mut joined = false;

    log.verbose(SessionEvent::Opened { id, addr });

    loop {
        if handle.is_finished() {
            break;
        }

        let incoming = tokio::select! {
            _ = shutdown.changed() => break,
            _ = handle.ended.notified() => break,
            incoming = frames.next() => incoming,
        };

        match incoming {
            Incoming::Closed => {
                log.verbose(SessionEvent::Eof { id });
                lobby.depart(&handle, Exit::Disconnect).await;
                break;
            }

            Incoming::Malformed(err) => {
                log.verbose(SessionEvent::BadFrame { id, err });
                let _ = handle.send(&Message::invalid(err.reason())).await;
                lobby.depart(&handle, Exit::Fatal).await;
                break;
            }

            Incoming::Frame(msg) => {
                log.trace(SessionEvent::FrameIn { id, msg: &msg });

                // A client speaking the server's half of the protocol is as
                // fatal as an unknown command.
                if !is_client_command(&msg) {
                    let _ = handle.send(&Message::invalid("Invalid command")).await;
                    lobby.depart(&handle, Exit::Fatal).await;
                    break;
                }

                if !joined {
                    match msg {
                        Message::Play { name } => match lobby.join(&handle, name).await {
                            JoinOutcome::Rejected(reason) => {
                                let _ = handle.send(&Message::invalid(reason)).await;
                            }
                            JoinOutcome::Queued | JoinOutcome::Paired => joined = true,
                        },
                        // MOVE / RSGN / DRAW before any game exists.
                        _ => {
                            let _ = handle.send(&Message::invalid("Game hasn't started")).await;
                        }
                    }
                } else {
                    match lobby.game_command(&handle, &msg).await {
                        GameCmdResult::Reply(reply) => {
                            let _ = handle.send(&reply).await;
                        }
                        GameCmdResult::Done => {}
                        GameCmdResult::WhileWaiting => {
                            let _ = handle.send(&Message::invalid("Invalid command")).await;
                            lobby.depart(&handle, Exit::Fatal).await;
                            break;
                        }
                        GameCmdResult::Fatal | GameCmdResult::Gone => break,
                    }
                }
            }
        }
    }

    log.verbose(SessionEvent::Closed { id });
}
