use engine_exec::{EmbeddedMessage, LogLevel};
use log::Level;
use tokio::sync::mpsc::Sender;

/// Forwards this process's log records to a parent over the embedded
/// protocol instead of (or in addition to) stderr — used by an Elevated
/// or Embedded child, whose own log output would otherwise be invisible
/// to whatever is driving it.
pub struct LogRedirect {
    tx: Sender<EmbeddedMessage>,
}

impl LogRedirect {
    pub fn new(tx: Sender<EmbeddedMessage>) -> Self {
        LogRedirect { tx }
    }

    /// Non-blocking: a full channel (parent too slow to drain) drops the
    /// record rather than stalling whatever called into `log`.
    pub fn forward(&self, level: Level, message: String) {
        let embedded = EmbeddedMessage::Log { level: to_embedded_level(level), message };
        let _ = self.tx.try_send(embedded);
    }
}

fn to_embedded_level(level: Level) -> LogLevel {
    match level {
        Level::Error => LogLevel::Error,
        Level::Warn | Level::Info => LogLevel::Standard,
        Level::Debug => LogLevel::Debug,
        Level::Trace => LogLevel::Verbose,
    }
}
