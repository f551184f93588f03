//! Session lifecycle commands: start, pause, resume, toggle, stop.

use std::io::Write;

use anyhow::Result;
use sf_core::{Phase, Request, SessionState, StateSnapshot};

use super::util::{expect_state, render_snapshot};
use crate::client;
use crate::{Config, StartArgs};

pub fn start<W: Write>(writer: &mut W, config: &Config, args: &StartArgs) -> Result<()> {
    let phase = if args.rest { Phase::Rest } else { Phase::Work };
    let request = Request::StartSession {
        phase: Some(phase),
        duration_seconds: args.duration_seconds(),
    };
    send(writer, config, &request)
}

pub fn pause<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    send(writer, config, &Request::Pause)
}

pub fn resume<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    send(writer, config, &Request::Resume)
}

pub fn stop<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    send(writer, config, &Request::Stop)
}

/// Pauses a running phase, resumes a paused one, or starts work when idle.
pub fn toggle<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let mut daemon = client::connect(&config.socket_path)?;
    let current = expect_state(daemon.call(&Request::GetState)?)?;
    let request = toggle_request(current.state);
    tracing::debug!(state = %current.state, request = request.name(), "toggling");
    let snapshot = expect_state(daemon.call(&request)?)?;
    print(writer, &snapshot)
}

fn toggle_request(state: SessionState) -> Request {
    match state {
        SessionState::Running(_) => Request::Pause,
        SessionState::Paused(_) => Request::Resume,
        SessionState::Idle => Request::StartSession {
            phase: Some(Phase::Work),
            duration_seconds: None,
        },
    }
}

fn send<W: Write>(writer: &mut W, config: &Config, request: &Request) -> Result<()> {
    let mut daemon = client::connect(&config.socket_path)?;
    let snapshot = expect_state(daemon.call(request)?)?;
    print(writer, &snapshot)
}

fn print<W: Write>(writer: &mut W, snapshot: &StateSnapshot) -> Result<()> {
    render_snapshot(writer, snapshot, snapshot.observed_at)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{TestDaemon, test_config};

    fn output_of(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut output = Vec::new();
        f(&mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn toggle_request_follows_state() {
        assert_eq!(toggle_request(SessionState::Running(Phase::Rest)), Request::Pause);
        assert_eq!(toggle_request(SessionState::Paused(Phase::Work)), Request::Resume);
        assert!(matches!(
            toggle_request(SessionState::Idle),
            Request::StartSession {
                phase: Some(Phase::Work),
                ..
            }
        ));
    }

    #[test]
    fn start_pause_resume_stop_through_daemon() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(temp.path());
        let _daemon = TestDaemon::spawn(&config);

        let args = StartArgs {
            rest: false,
            minutes: Some(2),
            seconds: None,
        };
        let started = output_of(|w| start(w, &config, &args));
        assert!(started.starts_with("State: running (work)\n"), "{started}");
        assert!(started.contains("Remaining: 2:00"), "{started}");

        let paused = output_of(|w| pause(w, &config));
        assert!(paused.starts_with("State: paused (work)\n"), "{paused}");

        let resumed = output_of(|w| toggle(w, &config));
        assert!(resumed.starts_with("State: running (work)\n"), "{resumed}");

        let stopped = output_of(|w| stop(w, &config));
        assert!(stopped.starts_with("State: idle\n"), "{stopped}");
    }

    #[test]
    fn pause_when_idle_reports_invalid_transition() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(temp.path());
        let _daemon = TestDaemon::spawn(&config);

        let err = pause(&mut Vec::new(), &config).unwrap_err();
        assert_eq!(err.to_string(), "cannot pause while idle (invalid_transition)");
    }

    #[test]
    fn commands_fail_without_daemon() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(temp.path());
        let err = stop(&mut Vec::new(), &config).unwrap_err();
        assert!(err.to_string().contains("daemon is not running"));
    }
}
