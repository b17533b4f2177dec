//! Line-based command console
//!
//! Protocol (one command per line, case-insensitive verbs):
//! - `start <walk_id>` / `ack` / `next` / `end`
//! - `filter [search][|category]` - e.g. `filter worm`, `filter |ghost`
//! - `nearby` / `open <story_id>` / `status`
//! - `quit` - request shutdown

use crate::domain::types::{TargetId, WalkId};
use crate::infra::metrics::Metrics;
use crate::services::guide::Command;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Command(Command),
    Quit,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("{0} requires an argument")]
    MissingArgument(&'static str),
}

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleInput>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "start" => {
            if rest.is_empty() {
                return Err(ParseError::MissingArgument("start"));
            }
            Command::StartWalk(WalkId::new(rest))
        }
        "ack" | "acknowledge" | "begin" => Command::Acknowledge,
        "next" | "advance" | "continue" => Command::Advance,
        "end" | "stop" => Command::EndWalk,
        "filter" | "search" => {
            let (search, category) = rest.split_once('|').unwrap_or((rest, ""));
            Command::Filter { search: search.trim().to_string(), category: category.trim().to_string() }
        }
        "nearby" | "list" => Command::Nearby,
        "open" => {
            if rest.is_empty() {
                return Err(ParseError::MissingArgument("open"));
            }
            Command::OpenStory(TargetId::new(rest))
        }
        "status" => Command::Status,
        "quit" | "exit" => return Ok(Some(ConsoleInput::Quit)),
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(Some(ConsoleInput::Command(command)))
}

/// Read commands from `reader` until EOF, `quit` or shutdown.
///
/// Commands are forwarded with try_send; a full channel drops the command.
/// `quit` sets the shutdown flag.
pub async fn run_console<R>(
    reader: R,
    command_tx: mpsc::Sender<Command>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    metrics: Arc<Metrics>,
) where
    R: AsyncBufRead + Unpin,
{
    let mut shutdown = shutdown_tx.subscribe();
    let mut lines = reader.lines();
    info!("console_started");

    loop {
        let line = tokio::select! {
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("console_input_closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "console_read_failed");
                break;
            }
        };

        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(ConsoleInput::Quit)) => {
                info!("console_quit_requested");
                let _ = shutdown_tx.send(true);
                break;
            }
            Ok(Some(ConsoleInput::Command(command))) => match command_tx.try_send(command) {
                Ok(()) => {}
                Err(TrySendError::Full(command)) => {
                    metrics.record_command(true);
                    warn!(command = %command.as_str(), "console_command_dropped: channel full");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("console_command_channel_closed");
                    break;
                }
            },
            Err(e) => {
                metrics.record_command(true);
                warn!(line = %line.trim(), error = %e, "console_parse_failed");
            }
        }
    }

    info!("console_stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(line: &str) -> Command {
        match parse_line(line) {
            Ok(Some(ConsoleInput::Command(c))) => c,
            other => panic!("expected command for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_walk_commands() {
        assert_eq!(command("start durham"), Command::StartWalk(WalkId::new("durham")));
        assert_eq!(command("START  river loop "), Command::StartWalk(WalkId::new("river loop")));
        assert_eq!(command("ack"), Command::Acknowledge);
        assert_eq!(command("next"), Command::Advance);
        assert_eq!(command("end"), Command::EndWalk);
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(
            command("filter worm"),
            Command::Filter { search: "worm".to_string(), category: String::new() }
        );
        assert_eq!(
            command("filter |ghost"),
            Command::Filter { search: String::new(), category: "ghost".to_string() }
        );
        assert_eq!(
            command("filter grey lady | ghost"),
            Command::Filter { search: "grey lady".to_string(), category: "ghost".to_string() }
        );
        assert_eq!(command("filter"), Command::Filter { search: String::new(), category: String::new() });
    }

    #[test]
    fn test_parse_story_commands() {
        assert_eq!(command("open 3"), Command::OpenStory(TargetId::new("3")));
        assert_eq!(command("nearby"), Command::Nearby);
        assert_eq!(command("status"), Command::Status);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_line("   "), Ok(None));
        assert_eq!(parse_line("quit"), Ok(Some(ConsoleInput::Quit)));
        assert_eq!(parse_line("open"), Err(ParseError::MissingArgument("open")));
        assert_eq!(parse_line("start"), Err(ParseError::MissingArgument("start")));
        assert_eq!(parse_line("dance"), Err(ParseError::UnknownCommand("dance".to_string())));
    }

    #[tokio::test]
    async fn test_console_forwards_and_quits() {
        let input: &[u8] = b"start w1\nbogus\nack\nquit\nstatus\n";
        let (command_tx, mut command_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = Arc::new(Metrics::new());

        run_console(input, command_tx, Arc::new(shutdown_tx), metrics).await;

        assert_eq!(command_rx.recv().await, Some(Command::StartWalk(WalkId::new("w1"))));
        assert_eq!(command_rx.recv().await, Some(Command::Acknowledge));
        // Nothing after quit; sender dropped
        assert_eq!(command_rx.recv().await, None);
        assert!(*shutdown_rx.borrow());
    }

    #[tokio::test]
    async fn test_console_stops_at_eof() {
        let input: &[u8] = b"nearby\n";
        let (command_tx, mut command_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        run_console(input, command_tx, Arc::new(shutdown_tx), Arc::new(Metrics::new())).await;

        assert_eq!(command_rx.recv().await, Some(Command::Nearby));
        assert!(!*shutdown_rx.borrow());
    }
}
