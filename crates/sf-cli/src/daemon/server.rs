//! Per-connection JSON-lines protocol.
//!
//! Each line from the client is one [`Request`]; each reply is one line. After
//! a `subscribe` request the connection also receives every notification as
//! its own line, interleaved with replies. A line longer than
//! [`MAX_REQUEST_BYTES`] gets a protocol error and the connection is closed.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use sf_core::{ErrorKind, Notification, Request, Response};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::broadcast;

use super::DaemonState;

/// Longest request line accepted.
const MAX_REQUEST_BYTES: usize = 64 * 1024;

pub async fn handle_client(state: Arc<DaemonState>, stream: UnixStream) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    // Survives a notification winning the select below mid-line.
    let mut line = Vec::new();
    let mut updates: Option<broadcast::Receiver<Notification>> = None;

    loop {
        tokio::select! {
            read = read_request_line(&mut reader, &mut line) => match read.context("failed to read request")? {
                LineRead::Line => {
                    let response = respond(&state, &line, &mut updates).await;
                    line.clear();
                    write_line(&mut writer, &response).await?;
                }
                LineRead::TooLong => {
                    tracing::debug!(max = MAX_REQUEST_BYTES, "oversized request, closing connection");
                    let response = Response::error(
                        ErrorKind::Protocol,
                        format!("request too large (max {MAX_REQUEST_BYTES} bytes)"),
                    );
                    write_line(&mut writer, &response).await?;
                    break;
                }
                LineRead::Eof => break,
            },
            received = next_update(&mut updates) => match received {
                Ok(notification) => write_line(&mut writer, &notification).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "subscriber lagging, notifications skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

async fn respond(
    state: &DaemonState,
    line: &[u8],
    updates: &mut Option<broadcast::Receiver<Notification>>,
) -> Response {
    match serde_json::from_slice::<Request>(line.trim_ascii()) {
        Ok(Request::Subscribe) => {
            updates.get_or_insert_with(|| state.subscribe());
            Response::Ack
        }
        Ok(request) => state.handle_request(request).await,
        Err(err) => {
            tracing::debug!(%err, "unparseable request");
            Response::error(ErrorKind::Protocol, format!("invalid request: {err}"))
        }
    }
}

enum LineRead {
    /// `buf` holds a full line, newline included.
    Line,
    TooLong,
    Eof,
}

/// Reads up to the next newline into `buf`.
///
/// Cancel safe: bytes read before the future is dropped stay in `buf`, and
/// the next call continues the same line. Never buffers more than one byte
/// past [`MAX_REQUEST_BYTES`].
async fn read_request_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let limit = (MAX_REQUEST_BYTES + 1).saturating_sub(buf.len()) as u64;
    (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if buf.last() == Some(&b'\n') {
        Ok(LineRead::Line)
    } else if buf.len() > MAX_REQUEST_BYTES {
        Ok(LineRead::TooLong)
    } else {
        // A trailing line without a newline is dropped.
        Ok(LineRead::Eof)
    }
}

/// Waits for the next notification, or forever when not subscribed.
async fn next_update(
    updates: &mut Option<broadcast::Receiver<Notification>>,
) -> Result<Notification, broadcast::error::RecvError> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn write_line<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut bytes = serde_json::to_vec(message).context("failed to serialize message")?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
