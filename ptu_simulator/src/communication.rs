use anyhow::{Context as _, Result, anyhow};
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::commands::parse_command;
use crate::models::{CommandEnvelope, CommandError, CommandResponse, CommandResult, PtuState};

fn handle_get_state(envelope: CommandEnvelope, state_rx: &watch::Receiver<Option<PtuState>>) {
    let response = match state_rx.borrow().clone() {
        Some(state) => Ok(CommandResponse::State(state)),
        None => Err(CommandError::new(503, "No state published yet")),
    };

    if envelope.response.send(response).is_err() {
        debug!("Failed to send state response");
    }
}

pub fn format_response(result: CommandResult) -> String {
    match result {
        Ok(CommandResponse::Success) => "OK\n".to_string(),
        Ok(CommandResponse::Limits(limits)) => format!(
            "Limits: pan [{}, {}] tilt [{}, {}]\n",
            limits.pan_min, limits.pan_max, limits.tilt_min, limits.tilt_max
        ),
        Ok(CommandResponse::State(state)) => format!(
            "State: pan {} tilt {} pan_speed {} tilt_speed {} pan_moving {} tilt_moving {} at {}\n",
            state.pan,
            state.tilt,
            state.pan_speed,
            state.tilt_speed,
            state.pan_moving,
            state.tilt_moving,
            state.timestamp.to_rfc3339()
        ),
        Ok(CommandResponse::GoalAccepted(id)) => format!("Goal: {}\n", id),
        Ok(CommandResponse::GoalStatus {
            id,
            status,
            feedback,
        }) => match feedback {
            Some(feedback) => format!("Goal {}: {} {}\n", id, status, feedback),
            None => format!("Goal {}: {}\n", id, status),
        },
        Err(err) => format!("{}\n", err),
    }
}

/// Longest request line accepted, newline excluded.
pub const MAX_LINE_LEN: usize = 1024;

enum Request {
    Line(String),
    TooLong,
    Closed,
}

/// Reads one newline-terminated request without buffering more than
/// `MAX_LINE_LEN + 1` bytes. An overlong line is consumed up to its newline.
async fn read_request<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Request>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = MAX_LINE_LEN as u64 + 1;
    if (&mut *reader).take(limit).read_until(b'\n', buf).await? == 0 {
        return Ok(Request::Closed);
    }

    if buf.len() > MAX_LINE_LEN && buf.last() != Some(&b'\n') {
        loop {
            buf.clear();
            let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
            if n == 0 || buf.last() == Some(&b'\n') {
                return Ok(Request::TooLong);
            }
        }
    }

    Ok(Request::Line(String::from_utf8_lossy(buf).into_owned()))
}

async fn serve_client(
    socket: UnixStream,
    command_tx: mpsc::Sender<CommandEnvelope>,
    state_rx: watch::Receiver<Option<PtuState>>,
) {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        let line = match read_request(&mut reader, &mut buf).await {
            Ok(Request::Line(line)) => line,
            Ok(Request::TooLong) => {
                let reply = format!("{}\n", CommandError::new(400, "Line too long"));
                if writer.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
                continue;
            }
            Ok(Request::Closed) => break,
            Err(e) => {
                error!("Error reading from socket: {}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let reply = match parse_command(&line) {
            Some((envelope, receiver)) => {
                if envelope.command.is_get_state() {
                    handle_get_state(envelope, &state_rx);
                } else if command_tx.send(envelope).await.is_err() {
                    let _ = writer
                        .write_all(b"Error: Failed to process command\n")
                        .await;
                    continue;
                }

                match receiver.await {
                    Ok(result) => format_response(result),
                    Err(_) => "Error: Failed to receive response\n".to_string(),
                }
            }
            None => format!("{}\n", CommandError::new(400, "Invalid command format")),
        };

        if writer.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
    }
}

pub async fn run_communication_layer(
    socket_path: impl AsRef<Path>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    state_rx: watch::Receiver<Option<PtuState>>,
) -> Result<()> {
    let socket_path = socket_path.as_ref();

    // Remove existing socket file if it exists to prevent "Address already in use" error
    if socket_path.exists() {
        std::fs::remove_file(socket_path)
            .map_err(|e| anyhow!("Failed to remove existing socket file: {}", e))?;
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind to socket {}", socket_path.display()))?;
    info!("Listening on {}", socket_path.display());

    loop {
        let (socket, _) = listener
            .accept()
            .await
            .map_err(|e| anyhow!("Failed to accept connection: {}", e))?;

        tokio::spawn(serve_client(socket, command_tx.clone(), state_rx.clone()));
    }
}
