//! Study chat: sends one question to the daemon's tutor session.

use std::io::Write;

use anyhow::{Result, bail};
use sf_core::{Request, Response};

use crate::Config;
use crate::client;

pub fn run<W: Write>(writer: &mut W, config: &Config, question: &str) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        bail!("question cannot be empty");
    }
    let mut daemon = client::connect(&config.socket_path)?;
    let request = Request::AskStudyQuestion {
        question: question.to_string(),
    };
    match daemon.call(&request)? {
        Response::Answer { text } => writeln!(writer, "{}", text.trim_end())?,
        other => bail!("unexpected reply from daemon: {other:?}"),
    }
    Ok(())
}
