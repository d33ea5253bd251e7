use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::game::Role;

// ── WIRE FORMAT ───────────────────────────────────────────────────────────────
//
// One frame per message, terminated by '\n':
//
//   CMD|N|F1|F2|…|Fk|
//
// CMD is a four-letter command.  N is the decimal byte count of the payload
// region — everything after the second '|' up to and including the final '|'.
// A frame with no fields is `CMD|0|`.  The payload may contain raw newline
// bytes; N is what decides where the frame ends, not the first '\n' alone.
//
// Client → Server:  PLAY MOVE RSGN DRAW
// Server → Client:  WAIT BEGN MOVD OVER INVL DRAW

// ── MESSAGES ──────────────────────────────────────────────────────────────────

/// A draw negotiation step: suggest, accept, or reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawAction {
    Suggest,
    Accept,
    Reject,
}

impl DrawAction {
    fn from_field(field: &str) -> Option<Self> {
        match field {
            "S" => Some(Self::Suggest),
            "A" => Some(Self::Accept),
            "R" => Some(Self::Reject),
            _   => None,
        }
    }

    fn field(&self) -> &'static str {
        match self {
            Self::Suggest => "S",
            Self::Accept  => "A",
            Self::Reject  => "R",
        }
    }
}

/// Outcome letter carried by OVER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Win,
    Loss,
    Draw,
}

impl Verdict {
    fn from_field(field: &str) -> Option<Self> {
        match field {
            "W" => Some(Self::Win),
            "L" => Some(Self::Loss),
            "D" => Some(Self::Draw),
            _   => None,
        }
    }

    fn field(&self) -> &'static str {
        match self {
            Self::Win  => "W",
            Self::Loss => "L",
            Self::Draw => "D",
        }
    }
}

/// A fully validated protocol message, either direction.
///
/// `Move` keeps its role and cell as raw strings: whether the role matches
/// the sender's seat and whether the cell names a real square are game
/// rules, judged in order by [`crate::game::Game`], not framing concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Play { name: String },
    Wait,
    Begin { role: Role, opponent: String },
    Move { role: String, cell: String },
    Moved { role: Role, cell: String, board: String },
    Resign,
    Draw(DrawAction),
    Over { verdict: Verdict, message: String },
    Invalid { reason: String },
}

impl Message {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid { reason: reason.into() }
    }

    pub fn over(verdict: Verdict, message: impl Into<String>) -> Self {
        Self::Over { verdict, message: message.into() }
    }

    /// Serialise to the wire format, computing the payload length.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Play { name }              => encode("PLAY", &[name.as_str()]),
            Self::Wait                       => encode("WAIT", &[]),
            Self::Begin { role, opponent }   => encode("BEGN", &[role.field(), opponent.as_str()]),
            Self::Move { role, cell }        => encode("MOVE", &[role.as_str(), cell.as_str()]),
            Self::Moved { role, cell, board } =>
                encode("MOVD", &[role.field(), cell.as_str(), board.as_str()]),
            Self::Resign                     => encode("RSGN", &[]),
            Self::Draw(action)               => encode("DRAW", &[action.field()]),
            Self::Over { verdict, message }  => encode("OVER", &[verdict.field(), message.as_str()]),
            Self::Invalid { reason }         => encode("INVL", &[reason.as_str()]),
        }
    }

    /// Assemble a message from a split frame, enforcing per-command arity.
    fn from_parts(cmd: &str, fields: Vec<String>) -> Result<Self, FrameError> {
        let arity = fields.len();
        let mut fields = fields.into_iter();
        let mut next = || fields.next().expect("arity checked");

        match cmd {
            "PLAY" if arity == 1 => Ok(Self::Play { name: next() }),
            "WAIT" if arity == 0 => Ok(Self::Wait),
            "BEGN" if arity == 2 => {
                let role = Role::from_field(&next()).ok_or(FrameError::WrongArity)?;
                Ok(Self::Begin { role, opponent: next() })
            }
            "MOVE" if arity == 2 => Ok(Self::Move { role: next(), cell: next() }),
            "MOVD" if arity == 3 => {
                let role = Role::from_field(&next()).ok_or(FrameError::WrongArity)?;
                Ok(Self::Moved { role, cell: next(), board: next() })
            }
            "RSGN" if arity == 0 => Ok(Self::Resign),
            "DRAW" if arity == 1 => DrawAction::from_field(&next())
                .map(Self::Draw)
                .ok_or(FrameError::WrongArity),
            "OVER" if arity == 2 => {
                let verdict = Verdict::from_field(&next()).ok_or(FrameError::WrongArity)?;
                Ok(Self::Over { verdict, message: next() })
            }
            "INVL" if arity == 1 => Ok(Self::Invalid { reason: next() }),
            "PLAY" | "WAIT" | "BEGN" | "MOVE" | "MOVD" | "RSGN" | "DRAW" | "OVER"
            | "INVL" => Err(FrameError::WrongArity),
            _ => Err(FrameError::UnknownCommand),
        }
    }
}

fn encode(cmd: &str, fields: &[&str]) -> String {
    let payload_len: usize = fields.iter().map(|f| f.len() + 1).sum();
    let mut out = String::with_capacity(cmd.len() + payload_len + 8);
    out.push_str(cmd);
    out.push('|');
    out.push_str(&payload_len.to_string());
    out.push('|');
    for field in fields {
        out.push_str(field);
        out.push('|');
    }
    out.push('\n');
    out
}

// ── FAILURE TAXONOMY ──────────────────────────────────────────────────────────

/// Ways an incoming frame can be rejected.  Every variant is fatal for the
/// session that sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The line is empty, or starts with '\n'.
    EmptyLine,
    /// '|' is the first character of the frame.
    LeadingPipe,
    /// The payload region does not end with '|'.
    MissingTrailingPipe,
    /// Command and length are mandatory; fewer than two '|' seen.
    FewerThanTwoFields,
    /// Field two is empty or contains a non-digit.
    NonNumericLength,
    /// The declared length does not equal the payload byte count.
    LengthMismatch,
    /// The command is not one of the nine known four-letter commands.
    UnknownCommand,
    /// Known command, wrong number (or shape) of fields.
    WrongArity,
}

impl FrameError {
    /// The reason text carried by the INVL sent back to the offender.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::FewerThanTwoFields => "Cannot measure size accurately",
            Self::NonNumericLength   => "Field two not a number",
            Self::LengthMismatch     => "Incorrect bytes",
            Self::EmptyLine
            | Self::LeadingPipe
            | Self::MissingTrailingPipe
            | Self::UnknownCommand
            | Self::WrongArity       => "Invalid command",
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self {
            Self::EmptyLine           => "empty line",
            Self::LeadingPipe         => "frame starts with '|'",
            Self::MissingTrailingPipe => "payload does not end with '|'",
            Self::FewerThanTwoFields  => "fewer than two fields",
            Self::NonNumericLength    => "length field is not a number",
            Self::LengthMismatch      => "declared length does not match payload",
            Self::UnknownCommand      => "unknown command",
            Self::WrongArity          => "wrong field count for command",
        };
        write!(f, "{what}")
    }
}

impl std::error::Error for FrameError {}

// ── INCREMENTAL PARSER ────────────────────────────────────────────────────────

/// What a scan of the accumulated bytes produced.
enum Scan {
    /// No newline buffered yet.
    Incomplete,
    /// The declared length runs past the first newline; the whole frame is
    /// `total` bytes and not all of them are buffered.
    NeedMore { total: usize },
    /// One frame settled, well-formed or not; `consumed` bytes are done with.
    Done {
        result: Result<Message, FrameError>,
        consumed: usize,
    },
}

fn scan(buf: &[u8]) -> Scan {
    let Some(newline) = buf.iter().position(|&b| b == b'\n') else {
        return Scan::Incomplete;
    };
    let reject = |err| Scan::Done { result: Err(err), consumed: newline + 1 };

    if newline == 0 {
        return reject(FrameError::EmptyLine);
    }
    if buf[0] == b'|' {
        return reject(FrameError::LeadingPipe);
    }

    let line = &buf[..newline];
    let mut pipes = line.iter().enumerate().filter(|&(_, &b)| b == b'|');
    let (Some((first, _)), Some((second, _))) = (pipes.next(), pipes.next()) else {
        return reject(FrameError::FewerThanTwoFields);
    };

    let length_field = &line[first + 1..second];
    if length_field.is_empty() || !length_field.iter().all(u8::is_ascii_digit) {
        return reject(FrameError::NonNumericLength);
    }
    let Ok(declared) = std::str::from_utf8(length_field)
        .expect("digits are UTF-8")
        .parse::<usize>()
    else {
        return reject(FrameError::LengthMismatch);
    };

    let payload_start = second + 1;
    let payload_end = payload_start + declared;
    let consumed = payload_end + 1; // payload plus the terminating '\n'

    if payload_end > newline {
        // The payload claims bytes beyond the first newline, i.e. it contains
        // raw '\n'.  The frame is only judged once `consumed` bytes arrive.
        if buf.len() < consumed {
            return Scan::NeedMore { total: consumed };
        }
        if buf[payload_end] != b'\n' {
            return Scan::Done { result: Err(FrameError::LengthMismatch), consumed };
        }
    } else if payload_end < newline {
        return reject(FrameError::LengthMismatch);
    }

    if declared > 0 && buf[payload_end - 1] != b'|' {
        return Scan::Done { result: Err(FrameError::MissingTrailingPipe), consumed };
    }

    let cmd = String::from_utf8_lossy(&buf[..first]).into_owned();
    let fields: Vec<String> = if declared == 0 {
        Vec::new()
    } else {
        buf[payload_start..payload_end - 1]
            .split(|&b| b == b'|')
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect()
    };

    Scan::Done { result: Message::from_parts(&cmd, fields), consumed }
}

// ── FRAME READER ──────────────────────────────────────────────────────────────

/// What [`FrameReader::next`] hands to the dispatch loop.
pub enum Incoming {
    /// A well-formed frame.
    Frame(Message),
    /// A frame was rejected; fatal for the session.
    Malformed(FrameError),
    /// EOF or read error.
    Closed,
}

/// Accumulates bytes from a connection and yields one validated frame at a
/// time.  When a frame declares more payload than is buffered at its first
/// newline, exactly one further read is allowed to satisfy it; a frame still
/// short after that is malformed.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, buf: Vec::with_capacity(256) }
    }

    pub async fn next(&mut self) -> Incoming {
        let mut grace_read_spent = false;
        loop {
            match scan(&self.buf) {
                Scan::Done { result, consumed } => {
                    self.buf.drain(..consumed.min(self.buf.len()));
                    return match result {
                        Ok(msg) => Incoming::Frame(msg),
                        Err(err) => Incoming::Malformed(err),
                    };
                }
                Scan::Incomplete => {
                    if !self.fill().await {
                        // A trailing partial line at EOF is discarded, like
                        // the connection it arrived on.
                        return Incoming::Closed;
                    }
                }
                Scan::NeedMore { total } => {
                    self.buf.reserve(total.saturating_sub(self.buf.len()));
                    if grace_read_spent || !self.fill().await {
                        self.buf.clear();
                        return Incoming::Malformed(FrameError::LengthMismatch);
                    }
                    grace_read_spent = true;
                }
            }
        }
    }

    /// One read from the connection; false on EOF or error.
    async fn fill(&mut self) -> bool {
        let mut chunk = [0u8; 1024];
        match self.inner.read(&mut chunk).await {
            Ok(0) | Err(_) => false,
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                true
            }
        }
    }
}

// ── TESTS ─────────────────────────────────────────────────────────────────────
