use std::fmt;

/// Log verbosity level, least to most detailed.
///
/// Warn and Info always print; Verbose, Debug, and Trace unlock with each
/// added `-v` on the command line.  Trace is where raw protocol frames go,
/// so `-vvv` against a live server is a full wire capture on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Warn,
    Info,
    Verbose,
    Debug,
    Trace,
}

impl Level {
    /// How many `-v` flags it takes before this level prints.
    fn threshold(self) -> u8 {
        match self {
            Level::Warn | Level::Info => 0,
            Level::Verbose            => 1,
            Level::Debug              => 2,
            Level::Trace              => 3,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Level::Warn    => "WARN",
            Level::Info    => "INFO",
            Level::Verbose => "VERB",
            Level::Debug   => "DEBG",
            Level::Trace   => "TRCE",
        };
        write!(f, "{tag}")
    }
}

/// Lightweight, verbosity-gated logger writing to stderr.
///
/// Every log method accepts any [`fmt::Display`] value, so call sites pass
/// plain strings, `format!(…)` output, or the event enums each module
/// defines for its own happenings.  Nothing is formatted unless the level
/// is actually enabled.
///
/// ```text
/// log.info(LobbyEvent::Paired { game_id: 1, x: "Alice", o: "Bob" });
/// log.trace(SessionEvent::FrameIn { id: 7, msg: &msg });
/// ```
pub struct Logger {
    verbosity: u8,
}

impl Logger {
    pub fn new(verbosity: u8) -> Self {
        Self { verbosity }
    }

    fn emit(&self, level: Level, msg: &dyn fmt::Display) {
        if self.verbosity >= level.threshold() {
            eprintln!("[{level}] {msg}");
        }
    }

    pub fn warn   (&self, msg: impl fmt::Display) { self.emit(Level::Warn,    &msg); }
    pub fn info   (&self, msg: impl fmt::Display) { self.emit(Level::Info,    &msg); }
    pub fn verbose(&self, msg: impl fmt::Display) { self.emit(Level::Verbose, &msg); }
    pub fn debug  (&self, msg: impl fmt::Display) { self.emit(Level::Debug,   &msg); }
    pub fn trace  (&self, msg: impl fmt::Display) { self.emit(Level::Trace,   &msg); }
}
