use clap::{ArgAction, Parser};
use std::fmt;
use std::io::{self, Write as _};
use tactix::frame::{DrawAction, FrameReader, Incoming, Message, Verdict};
use tactix::game::Role;
use tactix::logger::Logger;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name    = "client",
    version,
    about   = "tactix — terminal client",
    long_about = "Connects to a tactix server, joins the pairing queue under\n\
                  your display name, and plays interactively.\n\
                  Commands (type during a game):\n  \
                    move <row>,<col>   rows and columns are 1–3\n  \
                    draw               offer a draw\n  \
                    accept | reject    answer an offered draw\n  \
                    resign             concede the game"
)]
struct Args {
    /// Display name to play under (at most 50 bytes, must be unused)
    name: String,

    /// Server address to connect to
    #[arg(default_value = "127.0.0.1:7878")]
    addr: String,

    /// Increase output verbosity (-v verbose, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

// ── CLIENT EVENTS (operational logging to stderr) ─────────────────────────────

enum ClientEvent<'a> {
    Connecting { addr: &'a str },
    Connected  { addr: &'a str },
    Sending    { frame: &'a str },
    Received   { frame: &'a str },
    Disconnected,
}

impl fmt::Display for ClientEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientEvent::Connecting { addr } => write!(f, "Connecting to {addr}…"),
            ClientEvent::Connected  { addr } => write!(f, "Connected to {addr}"),
            ClientEvent::Sending    { frame } => write!(f, "→ {frame}"),
            ClientEvent::Received   { frame } => write!(f, "← {frame}"),
            ClientEvent::Disconnected        => write!(f, "Connection closed by server"),
        }
    }
}

// ── BOARD RENDERING ───────────────────────────────────────────────────────────

/// The nine-character board as sent in MOVD, rendered as a grid.
struct BoardView<'a>(&'a str);

impl fmt::Display for BoardView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = |i: usize| {
            let c = self.0.as_bytes().get(i).copied().unwrap_or(b'.') as char;
            if c == '.' { ' ' } else { c }
        };
        for row in 0..3 {
            write!(f, "  {} | {} | {}", mark(row * 3), mark(row * 3 + 1), mark(row * 3 + 2))?;
            if row < 2 {
                writeln!(f)?;
                writeln!(f, " ---+---+---")?;
            }
        }
        Ok(())
    }
}

// ── USER INPUT ────────────────────────────────────────────────────────────────

/// A validated command ready to become a wire frame.
enum Cmd {
    Move { cell: String },
    Resign,
    Draw,
    Accept,
    Reject,
}

impl Cmd {
    /// Parse a line typed by the player (case-insensitive keyword;
    /// `move 1,3` and `move 1 3` are both accepted).
    fn parse(raw: &str) -> Result<Self, String> {
        let mut t = raw.split_whitespace();
        match t.next().unwrap_or("").to_ascii_lowercase().as_str() {
            "move" => {
                let rest: Vec<&str> = t.collect();
                let cell = match rest.as_slice() {
                    [pair] => pair.to_string(),
                    [row, col] => format!("{row},{col}"),
                    _ => return Err("usage: move <row>,<col>".into()),
                };
                Ok(Self::Move { cell })
            }
            "resign" => Ok(Self::Resign),
            "draw"   => Ok(Self::Draw),
            "accept" => Ok(Self::Accept),
            "reject" => Ok(Self::Reject),
            ""       => Err("empty input".into()),
            kw       => Err(format!("unknown command '{kw}'")),
        }
    }

    fn to_message(&self, role: Role) -> Message {
        match self {
            Self::Move { cell } => Message::Move {
                role: role.field().to_string(),
                cell: cell.clone(),
            },
            Self::Resign => Message::Resign,
            Self::Draw   => Message::Draw(DrawAction::Suggest),
            Self::Accept => Message::Draw(DrawAction::Accept),
            Self::Reject => Message::Draw(DrawAction::Reject),
        }
    }
}

// ── PROMPT ────────────────────────────────────────────────────────────────────

fn print_prompt(role: Role) {
    print!("\n{role}> ");
    io::stdout().flush().ok();
}

fn print_help() {
    println!("  Commands:");
    println!("    move <row>,<col>  — place your mark (rows and columns 1–3)");
    println!("    draw              — offer a draw");
    println!("    accept | reject   — answer an offered draw");
    println!("    resign            — concede the game");
}

// ── MAIN ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let log  = Logger::new(args.verbose);

    log.info(ClientEvent::Connecting { addr: &args.addr });

    let stream = match TcpStream::connect(&args.addr).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to connect to {}: {e}", args.addr);
            std::process::exit(1);
        }
    };

    log.info(ClientEvent::Connected { addr: &args.addr });

    let (read_half, mut writer) = stream.into_split();
    let mut frames = FrameReader::new(read_half);
    let mut stdin  = BufReader::new(tokio::io::stdin()).lines();

    // Joining is implicit: the display name travels in the first frame.
    let play = Message::Play { name: args.name.clone() };
    log.verbose(ClientEvent::Sending { frame: play.to_wire().trim_end() });
    if writer.write_all(play.to_wire().as_bytes()).await.is_err() {
        eprintln!("Failed to send PLAY.");
        std::process::exit(1);
    }

    // Assigned by BEGN once an opponent shows up.
    let mut role: Option<Role> = None;

    loop {
        tokio::select! {
            // ── Server → Client ───────────────────────────────────────────────
            incoming = frames.next() => match incoming {
                Incoming::Closed => {
                    log.info(ClientEvent::Disconnected);
                    println!("\nDisconnected from server.");
                    break;
                }
                Incoming::Malformed(err) => {
                    eprintln!("Server sent an unreadable frame ({err}); giving up.");
                    break;
                }
                Incoming::Frame(msg) => {
                    log.trace(ClientEvent::Received { frame: msg.to_wire().trim_end() });
                    match msg {
                        Message::Wait => {
                            println!("Waiting for an opponent…");
                        }
                        Message::Begin { role: mine, opponent } => {
                            role = Some(mine);
                            println!("\nGame on!  You are {mine}; your opponent is {opponent}.");
                            print_help();
                            if mine == Role::X {
                                println!("\nYou move first.");
                                print_prompt(mine);
                            } else {
                                println!("\n{opponent} moves first — waiting…");
                            }
                        }
                        Message::Moved { role: mover, cell, board } => {
                            println!("\n{mover} played {cell}:");
                            println!("{}", BoardView(&board));
                            if role.is_some() && role != Some(mover) {
                                print_prompt(role.unwrap());
                            }
                        }
                        Message::Draw(DrawAction::Suggest) => {
                            println!("\nOpponent offers a draw — type 'accept' or 'reject'.");
                            if let Some(mine) = role {
                                print_prompt(mine);
                            }
                        }
                        Message::Draw(_) => {
                            println!("\nOpponent rejected the draw — still your move.");
                            if let Some(mine) = role {
                                print_prompt(mine);
                            }
                        }
                        Message::Over { verdict, message } => {
                            let headline = match verdict {
                                Verdict::Win  => "You win.",
                                Verdict::Loss => "You lose.",
                                Verdict::Draw => "Draw.",
                            };
                            println!("\nGame over: {headline}  ({message})");
                            break;
                        }
                        Message::Invalid { reason } => {
                            println!("\nRejected: {reason}");
                            if let Some(mine) = role {
                                print_prompt(mine);
                            }
                        }
                        other => {
                            log.debug(format!("unexpected frame: {:?}", other.to_wire().trim_end()));
                        }
                    }
                }
            },

            // ── Stdin → Server ────────────────────────────────────────────────
            result = stdin.next_line() => {
                let raw = match result {
                    Ok(Some(l)) => l,
                    _ => {
                        println!("\nInput closed.");
                        break;
                    }
                };

                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if matches!(trimmed.to_ascii_lowercase().as_str(), "help" | "?") {
                    print_help();
                    if let Some(mine) = role {
                        print_prompt(mine);
                    }
                    continue;
                }

                let Some(mine) = role else {
                    println!("  ? the game hasn't started yet");
                    continue;
                };

                match Cmd::parse(trimmed) {
                    Ok(cmd) => {
                        let msg = cmd.to_message(mine);
                        log.verbose(ClientEvent::Sending { frame: msg.to_wire().trim_end() });
                        if writer.write_all(msg.to_wire().as_bytes()).await.is_err() {
                            eprintln!("Failed to send command.");
                            break;
                        }
                    }
                    Err(reason) => {
                        println!("  ? {reason}");
                        print_prompt(mine);
                    }
                }
            }
        }
    }
}
