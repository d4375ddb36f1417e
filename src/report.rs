//! Console diagnostics.
//!
//! Every message is prefixed by a colored level tag and the source line it
//! refers to. Text wrapped in `===` is printed bold; newlines indent the
//! continuation under the message column. Error-level messages are counted
//! so callers can keep going (the parser resynchronises after errors) and
//! fail the run once the current phase finishes.

use std::cell::Cell;
use std::io::Write;

/// Severity of a diagnostic message. The reporter suppresses everything
/// below its configured verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageLevel {
    /// Internal tracing, hidden by default.
    Debug,
    /// Progress notes.
    Note,
    /// Suspicious but recoverable conditions.
    Warning,
    /// Compilation-failing conditions.
    Error,
}

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

impl MessageLevel {
    fn tag(self) -> &'static str {
        match self {
            MessageLevel::Debug => "[DEBUG]",
            MessageLevel::Note => "[NOTE ]",
            MessageLevel::Warning => "[WARN ]",
            MessageLevel::Error => "[ERROR]",
        }
    }

    fn colour(self) -> &'static str {
        match self {
            MessageLevel::Debug => "\x1b[34m",
            MessageLevel::Note => "\x1b[32m",
            MessageLevel::Warning => "\x1b[33m",
            MessageLevel::Error => "\x1b[31m",
        }
    }
}

/// Sink for compiler diagnostics.
#[derive(Debug)]
pub struct Reporter {
    verbosity: Cell<MessageLevel>,
    error_count: Cell<usize>,
    colour: bool,
}

impl Reporter {
    /// Creates a reporter that prints messages at `verbosity` and above.
    pub fn new(verbosity: MessageLevel) -> Self {
        Reporter {
            verbosity: Cell::new(verbosity),
            error_count: Cell::new(0),
            colour: true,
        }
    }

    /// Creates a reporter that never uses ANSI escapes, for captured output.
    pub fn plain(verbosity: MessageLevel) -> Self {
        Reporter {
            verbosity: Cell::new(verbosity),
            error_count: Cell::new(0),
            colour: false,
        }
    }

    /// Current verbosity threshold.
    pub fn verbosity(&self) -> MessageLevel {
        self.verbosity.get()
    }

    /// Changes the verbosity threshold, returning the previous one. Used to
    /// quieten nested include parses.
    pub fn set_verbosity(&self, verbosity: MessageLevel) -> MessageLevel {
        self.verbosity.replace(verbosity)
    }

    /// Number of error-level messages reported so far.
    pub fn error_count(&self) -> usize {
        self.error_count.get()
    }

    /// Reports a message with no line information.
    pub fn report(&self, level: MessageLevel, message: &str) {
        self.report_at(level, None, message);
    }

    /// Reports a message attributed to a source line.
    pub fn report_at(&self, level: MessageLevel, line: Option<usize>, message: &str) {
        if level == MessageLevel::Error {
            self.error_count.set(self.error_count.get() + 1);
        }
        if level < self.verbosity.get() {
            return;
        }
        let mut out = std::io::stderr().lock();
        let _ = self.write_message(&mut out, level, line, message);
    }

    fn write_message(
        &self,
        out: &mut impl Write,
        level: MessageLevel,
        line: Option<usize>,
        message: &str,
    ) -> std::io::Result<()> {
        let colour = if self.colour { level.colour() } else { "" };
        let reset = if self.colour { RESET } else { "" };
        write!(out, "{}{}{} ", colour, level.tag(), reset)?;
        match line {
            Some(n) => write!(out, "[{:4}] ", n)?,
            None => write!(out, "       ")?,
        }
        let mut bold = false;
        let mut rest = message;
        while !rest.is_empty() {
            if let Some(stripped) = rest.strip_prefix("===") {
                bold = !bold;
                if self.colour {
                    write!(out, "{}", if bold { BOLD } else { RESET })?;
                }
                rest = stripped;
            } else if let Some(stripped) = rest.strip_prefix('\n') {
                write!(out, "\n               ")?;
                rest = stripped;
            } else {
                let next = rest
                    .char_indices()
                    .find(|&(i, c)| i > 0 && (c == '\n' || rest[i..].starts_with("===")))
                    .map(|(i, _)| i)
                    .unwrap_or(rest.len());
                write!(out, "{}", &rest[..next])?;
                rest = &rest[next..];
            }
        }
        if self.colour {
            write!(out, "{}", RESET)?;
        }
        writeln!(out)
    }

    /// Shorthand for a debug-level message.
    pub fn debug(&self, message: &str) {
        self.report(MessageLevel::Debug, message);
    }

    /// Shorthand for a note-level message.
    pub fn note(&self, message: &str) {
        self.report(MessageLevel::Note, message);
    }

    /// Shorthand for a warning-level message.
    pub fn warning(&self, message: &str) {
        self.report(MessageLevel::Warning, message);
    }

    /// Shorthand for an error-level message.
    pub fn error(&self, message: &str) {
        self.report(MessageLevel::Error, message);
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Reporter::new(MessageLevel::Note)
    }
}
