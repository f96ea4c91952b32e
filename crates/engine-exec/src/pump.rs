use crate::message::{EmbeddedMessage, LogLevel};
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};

/// Drains embedded-protocol messages from a child (Elevated or Embedded)
/// process until it sends `Terminate` or the channel closes. Logging
/// messages are forwarded to this process's own logger; `Progress` and
/// `Error` are left for the caller to act on via the returned summary.
pub struct PumpSummary {
    pub last_progress: Option<(u32, u32)>,
    pub errors: Vec<(String, i32, String)>,
}

pub async fn pump(mut rx: mpsc::Receiver<EmbeddedMessage>) -> PumpSummary {
    let mut summary = PumpSummary { last_progress: None, errors: Vec::new() };

    while let Some(message) = rx.recv().await {
        match message {
            EmbeddedMessage::Log { level, message } => log_at(level, &message),
            EmbeddedMessage::Error { package_id, code, message } => {
                warn!("'{}' reported error {}: {}", package_id, code, message);
                summary.errors.push((package_id, code, message));
            }
            EmbeddedMessage::Progress { progress_percentage, overall_percentage } => {
                debug!("progress {}% (overall {}%)", progress_percentage, overall_percentage);
                summary.last_progress = Some((progress_percentage, overall_percentage));
            }
            EmbeddedMessage::DialogResult { result } => {
                debug!("dialog answered with result {}", result);
            }
            EmbeddedMessage::Terminate => break,
        }
    }

    summary
}

fn log_at(level: LogLevel, message: &str) {
    match level {
        LogLevel::Error => error!("{}", message),
        LogLevel::Standard => info!("{}", message),
        LogLevel::Verbose | LogLevel::Debug => debug!("{}", message),
    }
}

/// The two-phase elevated-companion shutdown: rather than terminating the
/// companion the instant the chain finishes, the parent tells it the
/// chain is done and waits for an acknowledgement (so any messages still
/// in flight are not dropped) before sending the actual `Terminate`.
pub async fn shutdown_elevated_companion(
    tx: &mpsc::Sender<EmbeddedMessage>,
    ack_rx: oneshot::Receiver<()>,
) -> Result<()> {
    tx.send(EmbeddedMessage::Log {
        level: LogLevel::Standard,
        message: "chain complete, requesting elevated companion shutdown".to_string(),
    })
    .await
    .context("notifying elevated companion of completion")?;

    ack_rx.await.context("waiting for elevated companion acknowledgement")?;

    tx.send(EmbeddedMessage::Terminate)
        .await
        .context("sending terminate to elevated companion")?;
    Ok(())
}
