//! End-to-end tests that drive the `sf` binary and a real daemon process.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{TimeDelta, Utc};
use sf_core::{Phase, SessionRecord};
use sf_db::Database;
use tempfile::TempDir;

fn sf_binary() -> String {
    env!("CARGO_BIN_EXE_sf").to_string()
}

struct Paths {
    database: PathBuf,
    socket: PathBuf,
    outbox: PathBuf,
}

impl Paths {
    fn new(temp: &Path) -> Self {
        Self {
            database: temp.join("data/studyfocus.db"),
            socket: temp.join("state/daemon.sock"),
            outbox: temp.join("state/outbox.jsonl"),
        }
    }
}

fn sf_command(temp: &Path) -> Command {
    let paths = Paths::new(temp);
    let mut command = Command::new(sf_binary());
    command
        .env("HOME", temp)
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("XDG_DATA_HOME")
        .env_remove("XDG_STATE_HOME")
        .env_remove("RUST_LOG")
        .env("SF_DATABASE_PATH", &paths.database)
        .env("SF_SOCKET_PATH", &paths.socket)
        .env("SF_OUTBOX_PATH", &paths.outbox)
        .env("SF_POLL_INTERVAL_SECS", "1");
    command
}

fn sf(temp: &Path, args: &[&str]) -> Output {
    sf_command(temp).args(args).output().expect("failed to run sf")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "sf should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A daemon process killed on drop.
struct Daemon(Child);

impl Daemon {
    fn spawn(temp: &Path) -> Self {
        let child = sf_command(temp)
            .arg("daemon")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to spawn daemon");
        let socket = Paths::new(temp).socket;
        let deadline = Instant::now() + Duration::from_secs(10);
        while std::os::unix::net::UnixStream::connect(&socket).is_err() {
            assert!(Instant::now() < deadline, "daemon did not start");
            thread::sleep(Duration::from_millis(20));
        }
        Self(child)
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

#[test]
fn test_no_subcommand_prints_help() {
    let temp = TempDir::new().unwrap();
    let output = stdout(&sf(temp.path(), &[]));
    assert!(output.contains("Usage: sf"));
}

#[test]
fn test_status_without_daemon() {
    let temp = TempDir::new().unwrap();
    let output = stdout(&sf(temp.path(), &["status"]));
    assert!(output.starts_with("State: idle\n"), "{output}");
    assert!(output.contains("Daemon: not running"), "{output}");
}

#[test]
fn test_mutations_fail_without_daemon() {
    let temp = TempDir::new().unwrap();
    let output = sf(temp.path(), &["start"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("daemon is not running"), "{stderr}");
}

#[test]
fn test_api_key_is_stored() {
    let temp = TempDir::new().unwrap();
    let output = stdout(&sf(temp.path(), &["api-key", "secret-key"]));
    assert_eq!(output, "Gemini API key saved\n");

    let db = Database::open(&Paths::new(temp.path()).database).unwrap();
    assert_eq!(db.gemini_api_key().unwrap().as_deref(), Some("secret-key"));
}

#[test]
fn test_session_and_gate_through_daemon() {
    let temp = TempDir::new().unwrap();
    let _daemon = Daemon::spawn(temp.path());

    let output = stdout(&sf(temp.path(), &["domains", "add", "https://docs.rs/tokio"]));
    assert_eq!(output, "- docs.rs\n");

    // Idle: the gate stays out of the way.
    let output = stdout(&sf(temp.path(), &["tab", "https://reddit.com"]));
    assert_eq!(output, "ignored: no work phase running\n");

    let output = stdout(&sf(temp.path(), &["start", "--minutes", "25"]));
    assert!(output.starts_with("State: running (work)\n"), "{output}");

    let output = stdout(&sf(temp.path(), &["tab", "https://docs.rs/serde", "--tab-id", "3"]));
    assert_eq!(output, "docs.rs is a work domain\n");
    let output = stdout(&sf(temp.path(), &["tab", "https://reddit.com", "--tab-id", "4"]));
    assert_eq!(output, "reddit.com is not on the work list; prompting\n");

    // Nobody was watching, so the prompt waits in the outbox.
    let outbox = std::fs::read_to_string(Paths::new(temp.path()).outbox).unwrap();
    assert!(outbox.contains("show-distraction-prompt"), "{outbox}");

    let output = stdout(&sf(temp.path(), &["pause"]));
    assert!(output.starts_with("State: paused (work)\n"), "{output}");
    let output = stdout(&sf(temp.path(), &["status", "--json"]));
    let snapshot: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(snapshot["state"]["status"], "paused");
    let remaining = snapshot["countdown"]["time_remaining_seconds"].as_u64().unwrap();
    assert!((1400..=1500).contains(&remaining), "{remaining}");

    let output = stdout(&sf(temp.path(), &["stop"]));
    assert!(output.starts_with("State: idle\n"), "{output}");
}

#[test]
fn test_overdue_session_completes_on_daemon_start() {
    let temp = TempDir::new().unwrap();
    let paths = Paths::new(temp.path());
    std::fs::create_dir_all(paths.database.parent().unwrap()).unwrap();
    {
        let mut db = Database::open(&paths.database).unwrap();
        let started = Utc::now() - TimeDelta::minutes(30);
        let record = SessionRecord::begin(Phase::Work, 25 * 60, started);
        db.set_current_session(Some(&record)).unwrap();
    }

    let _daemon = Daemon::spawn(temp.path());

    let output = stdout(&sf(temp.path(), &["status"]));
    assert!(output.starts_with("State: running (rest)\n"), "{output}");
    let outbox = std::fs::read_to_string(&paths.outbox).unwrap();
    assert_eq!(
        outbox.matches("open-completion-view").count(),
        1,
        "one completion per expired phase: {outbox}"
    );
}

#[test]
fn test_second_daemon_refuses_to_start() {
    let temp = TempDir::new().unwrap();
    let _daemon = Daemon::spawn(temp.path());

    let output = sf(temp.path(), &["daemon"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("daemon already running"), "{stderr}");
}
