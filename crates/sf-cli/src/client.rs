//! Blocking client for the daemon socket.

use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use sf_core::{Notification, Request, Response};

/// One line received from the daemon.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Notification(Notification),
    Response(Response),
}

/// What a read produced.
#[derive(Debug)]
pub enum Incoming {
    Message(ServerMessage),
    /// The read timeout elapsed first.
    Idle,
    Closed,
}

/// A connection to the running daemon.
#[derive(Debug)]
pub struct DaemonClient {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
    /// Bytes of a line cut short by a read timeout.
    partial: String,
}

impl DaemonClient {
    /// Connects to the daemon. Fails if no daemon is listening.
    pub fn connect(socket_path: &Path) -> io::Result<Self> {
        let stream = UnixStream::connect(socket_path)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            partial: String::new(),
        })
    }

    pub fn send(&mut self, request: &Request) -> Result<()> {
        let mut bytes = serde_json::to_vec(request).context("failed to serialize request")?;
        bytes.push(b'\n');
        self.writer
            .write_all(&bytes)
            .context("failed to send request to daemon")?;
        Ok(())
    }

    /// Sends a request and waits for its reply, skipping notifications that
    /// arrive first.
    pub fn request(&mut self, request: &Request) -> Result<Response> {
        self.send(request)?;
        loop {
            match self.read_message()? {
                Incoming::Message(ServerMessage::Response(response)) => return Ok(response),
                Incoming::Message(ServerMessage::Notification(notification)) => {
                    tracing::trace!(kind = notification.kind(), "skipping notification while awaiting reply");
                }
                Incoming::Idle => {}
                Incoming::Closed => bail!("daemon closed the connection"),
            }
        }
    }

    /// Like [`DaemonClient::request`], but turns error replies into errors.
    pub fn call(&mut self, request: &Request) -> Result<Response> {
        match self.request(request)? {
            Response::Error { kind, message } => bail!("{message} ({kind})"),
            response => Ok(response),
        }
    }

    /// Sets how long [`DaemonClient::read_message`] waits before returning `Idle`.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.reader
            .get_ref()
            .set_read_timeout(timeout)
            .context("failed to set read timeout")
    }

    /// Reads the next line from the daemon.
    pub fn read_message(&mut self) -> Result<Incoming> {
        match self.reader.read_line(&mut self.partial) {
            Ok(0) => Ok(Incoming::Closed),
            Ok(_) => {
                let line = std::mem::take(&mut self.partial);
                let message = serde_json::from_str(line.trim())
                    .with_context(|| format!("unexpected message from daemon: {}", line.trim()))?;
                Ok(Incoming::Message(message))
            }
            Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(Incoming::Idle)
            }
            Err(err) => Err(err).context("failed to read from daemon"),
        }
    }
}

/// Connects to the daemon or explains how to start it.
pub fn connect(socket_path: &Path) -> Result<DaemonClient> {
    DaemonClient::connect(socket_path).with_context(|| {
        format!(
            "daemon is not running on {} (start it with `sf daemon`)",
            socket_path.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixListener;
    use std::thread;

    use super::*;

    #[test]
    fn request_skips_notifications_before_reply() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("daemon.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut line = String::new();
            BufReader::new(stream.try_clone().unwrap())
                .read_line(&mut line)
                .unwrap();
            assert!(line.contains("\"action\":\"stop\""));
            stream
                .write_all(b"{\"event\":\"dismiss-prompt\",\"tab_id\":null}\n{\"type\":\"ack\"}\n")
                .unwrap();
        });

        let mut client = DaemonClient::connect(&path).unwrap();
        let response = client.request(&Request::Stop).unwrap();
        assert_eq!(response, Response::Ack);
        server.join().unwrap();
    }

    #[test]
    fn call_turns_error_reply_into_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("daemon.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut line = String::new();
            BufReader::new(stream.try_clone().unwrap())
                .read_line(&mut line)
                .unwrap();
            stream
                .write_all(
                    b"{\"type\":\"error\",\"kind\":\"invalid_transition\",\"message\":\"cannot pause while idle\"}\n",
                )
                .unwrap();
        });

        let mut client = DaemonClient::connect(&path).unwrap();
        let err = client.call(&Request::Pause).unwrap_err();
        assert_eq!(err.to_string(), "cannot pause while idle (invalid_transition)");
        server.join().unwrap();
    }

    #[test]
    fn connect_without_daemon_explains_how_to_start() {
        let temp = tempfile::tempdir().unwrap();
        let err = connect(&temp.path().join("missing.sock")).unwrap_err();
        assert!(err.to_string().contains("sf daemon"));
    }
}
