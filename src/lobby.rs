use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::frame::{DrawAction, Message, Verdict};
use crate::game::{Game, MoveOutcome, Role, Seat, Terminal};
use crate::logger::Logger;
use crate::session::SessionHandle;

/// The longest display name a PLAY may register, in bytes.
pub const MAX_NAME_LEN: usize = 50;

// ── DISPLAY EVENTS ────────────────────────────────────────────────────────────

enum LobbyEvent<'a> {
    Queued   { session: u64, name: &'a str },
    Paired   { game_id: u64, x: &'a str, o: &'a str },
    Rejected { session: u64, name: &'a str, reason: &'static str },
    GameOver { game_id: u64 },
    Left     { session: u64 },
}

impl fmt::Display for LobbyEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LobbyEvent::Queued { session, name } =>
                write!(f, "[session {session}] {name:?} waiting for an opponent"),
            LobbyEvent::Paired { game_id, x, o } =>
                write!(f, "[game {game_id}] {x:?} (X) vs {o:?} (O)"),
            LobbyEvent::Rejected { session, name, reason } =>
                write!(f, "[session {session}] PLAY {name:?} rejected: {reason}"),
            LobbyEvent::GameOver { game_id } =>
                write!(f, "[game {game_id}] torn down"),
            LobbyEvent::Left { session } =>
                write!(f, "[session {session}] left the lobby"),
        }
    }
}

// ── RESULTS HANDED BACK TO THE SESSION LOOP ───────────────────────────────────

/// What a PLAY did.
pub enum JoinOutcome {
    /// No opponent yet; `WAIT|0|` went out already.
    Queued,
    /// Matched with a waiter; BEGN went out to both sides already.
    Paired,
    /// Recoverable rejection; the caller sends INVL and stays FRESH.
    Rejected(&'static str),
}

/// What an in-game command did.
pub enum GameCmdResult {
    /// Recoverable rejection; the caller sends this to its own peer after
    /// the lobby lock is released.
    Reply(Message),
    /// Handled; any broadcasts were written inside the critical section.
    Done,
    /// The sender is still queued — traffic while WAITING is fatal.
    WhileWaiting,
    /// The sender's frame was fatal; its game is gone and the caller must
    /// stop reading.
    Fatal,
    /// The session is already FINISHED; the caller just stops.
    Gone,
}

/// How a session leaves the process early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Fatal protocol error: the peer is told the offender resigned.
    Fatal,
    /// EOF or connection error.
    Disconnect,
}

impl Exit {
    fn peer_notice(&self) -> &'static str {
        match self {
            Exit::Fatal      => "Opponent has resigned",
            Exit::Disconnect => "Opponent disconnected",
        }
    }
}

// ── STATE ─────────────────────────────────────────────────────────────────────

struct ActiveGame {
    game: Game,
    /// Write handles indexed like the seats: X first, O second.
    handles: [Arc<SessionHandle>; 2],
}

impl ActiveGame {
    fn handle(&self, role: Role) -> &Arc<SessionHandle> {
        match role {
            Role::X => &self.handles[0],
            Role::O => &self.handles[1],
        }
    }
}

#[derive(Default)]
struct LobbyState {
    waiting: VecDeque<Arc<SessionHandle>>,
    names: HashSet<String>,
    session_names: HashMap<u64, String>,
    games: HashMap<u64, ActiveGame>,
    game_of: HashMap<u64, u64>,
    next_game: u64,
}

/// Process-wide coordinator: the queue of unpaired sessions, the table of
/// active games, and the set of registered display names, all behind one
/// lock.  Game state only ever changes under this lock, and broadcasts that
/// must stay ordered per peer (BEGN, MOVD, forwarded DRAW, OVER) are written
/// inside the critical section.  Single-recipient INVL replies are returned
/// to the session loop and written after the lock is dropped.
///
/// Lock order is lobby → writer, never the reverse.
pub struct Lobby {
    state: Mutex<LobbyState>,
    log: Arc<Logger>,
}

impl Lobby {
    pub fn new(log: Arc<Logger>) -> Self {
        Self { state: Mutex::new(LobbyState::default()), log }
    }

    // ── PLAY ──────────────────────────────────────────────────────────────────

    /// Register `name` and either queue the session or pair it with the
    /// session at the head of the queue.  Pairing allocates the game, flips
    /// both sessions to PLAYING, and emits BEGN to both inside the critical
    /// section; the waiter becomes X.
    pub async fn join(&self, handle: &Arc<SessionHandle>, name: String) -> JoinOutcome {
        if name.len() > MAX_NAME_LEN {
            self.log.verbose(LobbyEvent::Rejected {
                session: handle.id,
                name: &name,
                reason: "too long",
            });
            return JoinOutcome::Rejected("Name's too long");
        }

        let mut state = self.state.lock().await;
        if state.names.contains(&name) {
            self.log.verbose(LobbyEvent::Rejected {
                session: handle.id,
                name: &name,
                reason: "occupied",
            });
            return JoinOutcome::Rejected("Name is occupied");
        }
        state.names.insert(name.clone());
        state.session_names.insert(handle.id, name.clone());

        let Some(waiter) = state.waiting.pop_front() else {
            state.waiting.push_back(handle.clone());
            self.log.info(LobbyEvent::Queued { session: handle.id, name: &name });
            // WAIT goes out before the lock drops, so a prompt second player's
            // BEGN cannot overtake it.
            let _ = handle.send(&Message::Wait).await;
            return JoinOutcome::Queued;
        };

        let game_id = state.next_game;
        state.next_game += 1;
        let x_name = state.session_names[&waiter.id].clone();

        self.log.info(LobbyEvent::Paired { game_id, x: &x_name, o: &name });

        let game = Game::new(
            game_id,
            Seat { session: waiter.id, name: x_name.clone() },
            Seat { session: handle.id, name: name.clone() },
        );
        state.game_of.insert(waiter.id, game_id);
        state.game_of.insert(handle.id, game_id);
        state.games.insert(game_id, ActiveGame {
            game,
            handles: [waiter.clone(), handle.clone()],
        });

        let x_ok = waiter
            .send(&Message::Begin { role: Role::X, opponent: name })
            .await;
        let o_ok = handle
            .send(&Message::Begin { role: Role::O, opponent: x_name })
            .await;

        // A failed BEGN means that side is already gone.
        if !x_ok || !o_ok {
            let lost = if x_ok { Role::O } else { Role::X };
            self.peer_vanished(&mut state, game_id, lost).await;
        }
        JoinOutcome::Paired
    }

    // ── MOVE / RSGN / DRAW ────────────────────────────────────────────────────

    /// Run one in-game command from `handle` under the lobby lock.
    pub async fn game_command(&self, handle: &Arc<SessionHandle>, msg: &Message) -> GameCmdResult {
        let mut state = self.state.lock().await;

        let Some(&game_id) = state.game_of.get(&handle.id) else {
            return if state.waiting.iter().any(|w| w.id == handle.id) {
                GameCmdResult::WhileWaiting
            } else {
                GameCmdResult::Gone
            };
        };
        let entry = state.games.get_mut(&game_id).expect("game_of points at a live game");
        let sender = entry.game.role_of(handle.id).expect("session is seated in its game");

        match msg {
            Message::Play { .. } => GameCmdResult::Reply(Message::invalid("Already in game")),

            Message::Move { role, cell } => {
                match entry.game.apply_move(sender, role, cell) {
                    MoveOutcome::Rejected(reason) => GameCmdResult::Reply(Message::invalid(reason)),
                    MoveOutcome::Malformed => {
                        let _ = handle.send(&Message::invalid("Invalid command")).await;
                        self.destroy(
                            &mut state,
                            game_id,
                            &[(!sender, Message::over(Verdict::Win, Exit::Fatal.peer_notice()))],
                        )
                        .await;
                        GameCmdResult::Fatal
                    }
                    MoveOutcome::Placed { cell, board, terminal } => {
                        let movd = Message::Moved {
                            role: sender,
                            cell: cell.to_string(),
                            board,
                        };
                        let x_ok = entry.handle(Role::X).send(&movd).await;
                        let o_ok = entry.handle(Role::O).send(&movd).await;

                        match terminal {
                            Some(Terminal::Won(winner)) => {
                                let text = format!("{} has won.", entry.game.seat(winner).name);
                                let notices = [
                                    (winner, Message::over(Verdict::Win, text.clone())),
                                    (!winner, Message::over(Verdict::Loss, text.clone())),
                                ];
                                self.destroy(&mut state, game_id, &notices).await;
                            }
                            Some(Terminal::Filled) => {
                                let over = Message::over(Verdict::Draw, "No moves left.");
                                let notices = [(Role::X, over.clone()), (Role::O, over)];
                                self.destroy(&mut state, game_id, &notices).await;
                            }
                            None => {
                                if !x_ok {
                                    self.peer_vanished(&mut state, game_id, Role::X).await;
                                } else if !o_ok {
                                    self.peer_vanished(&mut state, game_id, Role::O).await;
                                }
                            }
                        }
                        GameCmdResult::Done
                    }
                }
            }

            Message::Resign => match entry.game.resign(sender) {
                Err(reason) => GameCmdResult::Reply(Message::invalid(reason)),
                Ok(()) => {
                    let text = format!("{} resigned.", entry.game.seat(sender).name);
                    let notices = [
                        (sender, Message::over(Verdict::Loss, text.clone())),
                        (!sender, Message::over(Verdict::Win, text.clone())),
                    ];
                    self.destroy(&mut state, game_id, &notices).await;
                    GameCmdResult::Done
                }
            },

            Message::Draw(DrawAction::Suggest) => {
                match entry.game.offer_draw(sender) {
                    Err(reason) => GameCmdResult::Reply(Message::invalid(reason)),
                    Ok(()) => {
                        let forwarded = entry
                            .handle(!sender)
                            .send(&Message::Draw(DrawAction::Suggest))
                            .await;
                        if !forwarded {
                            self.peer_vanished(&mut state, game_id, !sender).await;
                        }
                        GameCmdResult::Done
                    }
                }
            }

            Message::Draw(DrawAction::Accept) => {
                match entry.game.answer_draw(sender, true) {
                    Err(reason) => GameCmdResult::Reply(Message::invalid(reason)),
                    Ok(_proposer) => {
                        let over = Message::over(Verdict::Draw, "A draw has been reached.");
                        let notices = [(Role::X, over.clone()), (Role::O, over)];
                        self.destroy(&mut state, game_id, &notices).await;
                        GameCmdResult::Done
                    }
                }
            }

            Message::Draw(DrawAction::Reject) => {
                match entry.game.answer_draw(sender, false) {
                    Err(reason) => GameCmdResult::Reply(Message::invalid(reason)),
                    Ok(proposer) => {
                        let forwarded = entry
                            .handle(proposer)
                            .send(&Message::Draw(DrawAction::Reject))
                            .await;
                        if !forwarded {
                            self.peer_vanished(&mut state, game_id, proposer).await;
                        }
                        GameCmdResult::Done
                    }
                }
            }

            // Server-to-client commands from a client are screened out by the
            // session loop before it gets here.
            _ => GameCmdResult::Reply(Message::invalid("Invalid command")),
        }
    }

    // ── DEPARTURES ────────────────────────────────────────────────────────────

    /// A session is going away: fatal frame, EOF, or write failure.  If it
    /// was PLAYING the peer gets the OVER notice for `exit` and the game is
    /// torn down; if it was WAITING it leaves the queue; its name is freed.
    pub async fn depart(&self, handle: &Arc<SessionHandle>, exit: Exit) {
        let mut state = self.state.lock().await;
        if let Some(&game_id) = state.game_of.get(&handle.id) {
            let survivor = state.games[&game_id]
                .game
                .role_of(handle.id)
                .map(|role| !role)
                .expect("session is seated in its game");
            let notices = [(survivor, Message::over(Verdict::Win, exit.peer_notice()))];
            self.destroy(&mut state, game_id, &notices).await;
            return;
        }

        state.waiting.retain(|w| w.id != handle.id);
        if let Some(name) = state.session_names.remove(&handle.id) {
            state.names.remove(&name);
        }
        handle.finish();
        self.log.verbose(LobbyEvent::Left { session: handle.id });
    }

    /// Tear down every remaining game; used when the acceptor stops.
    pub async fn shutdown_all(&self) {
        let mut state = self.state.lock().await;
        let ids: Vec<u64> = state.games.keys().copied().collect();
        for game_id in ids {
            self.destroy(&mut state, game_id, &[]).await;
        }
        for waiter in std::mem::take(&mut state.waiting) {
            waiter.finish();
        }
        state.names.clear();
        state.session_names.clear();
    }

    /// A write to one side failed mid-game: treat that side as disconnected.
    async fn peer_vanished(&self, state: &mut LobbyState, game_id: u64, lost: Role) {
        let notices = [(!lost, Message::over(Verdict::Win, Exit::Disconnect.peer_notice()))];
        self.destroy(state, game_id, &notices).await;
    }

    /// Remove the game, deliver the OVER notices, release both names, mark
    /// both sessions FINISHED, and wake their loops.  Idempotent: a second
    /// call finds no game and does nothing.
    async fn destroy(&self, state: &mut LobbyState, game_id: u64, notices: &[(Role, Message)]) {
        let Some(entry) = state.games.remove(&game_id) else {
            return;
        };
        for (role, notice) in notices {
            let _ = entry.handle(*role).send(notice).await;
        }
        for handle in &entry.handles {
            state.game_of.remove(&handle.id);
            if let Some(name) = state.session_names.remove(&handle.id) {
                state.names.remove(&name);
            }
            handle.finish();
        }
        self.log.info(LobbyEvent::GameOver { game_id });
    }
}
