//! The background authority process.
//!
//! One daemon owns the session. It reconciles the stored session at startup,
//! then serves JSON-lines requests on a Unix socket and fires wakes. On an
//! interval it catches wakes that never arrived and announces store writes
//! made by other processes.

mod notifier;
mod scheduler;
mod server;

use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sf_core::{
    Authority, BootReport, ErrorKind, Notification, Request, Response, SystemClock,
};
use sf_db::{Database, keys};
use sf_llm::{LlmError, StudySession};
use tokio::net::UnixListener;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::time::MissedTickBehavior;

pub use notifier::BroadcastNotifier;
pub use scheduler::{WakeHandle, WakeTimer, wake_channel};

use crate::Config;
use crate::outbox::Outbox;

/// Capacity of the notification channel per subscriber.
const UPDATES_CAPACITY: usize = 64;

pub type DaemonAuthority = Authority<Database, WakeHandle, BroadcastNotifier, SystemClock>;

/// Shared daemon state.
pub struct DaemonState {
    authority: Mutex<DaemonAuthority>,
    updates_tx: broadcast::Sender<Notification>,
    chat: Mutex<StudySession>,
    config: Config,
    /// Store revision the change feed has reached. Only touched while the
    /// authority lock is held.
    feed_cursor: AtomicI64,
}

impl DaemonState {
    /// Builds the state around an open database. The returned timer must be
    /// run for wakes to fire.
    pub fn new(config: Config, db: Database) -> (Arc<Self>, WakeTimer) {
        let (updates_tx, _) = broadcast::channel(UPDATES_CAPACITY);
        let (wake, timer) = wake_channel();
        let feed_cursor = db.current_revision().unwrap_or_else(|err| {
            tracing::warn!(%err, "store revision unavailable, change feed starts from the beginning");
            0
        });
        let notifier = BroadcastNotifier::new(updates_tx.clone(), Outbox::new(&config.outbox_path));
        let authority = Authority::new(db, wake, notifier, SystemClock, config.gate_scope);
        let state = Arc::new(Self {
            authority: Mutex::new(authority),
            updates_tx,
            chat: Mutex::new(StudySession::new()),
            config,
            feed_cursor: AtomicI64::new(feed_cursor),
        });
        (state, timer)
    }

    /// Reconciles the stored session. Must run before serving requests.
    pub async fn boot(&self) {
        match self.authority.lock().await.boot() {
            Ok(BootReport::Expired(outcome)) => {
                tracing::info!(?outcome, "overdue session expired at startup");
            }
            Ok(report) => tracing::info!(?report, "session reconciled"),
            // Session operations retry reconciliation before they run.
            Err(err) => tracing::error!(%err, "startup reconciliation failed"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.updates_tx.subscribe()
    }

    pub async fn on_wake(&self, at: DateTime<Utc>) {
        if let Err(err) = self.authority.lock().await.on_wake() {
            tracing::error!(%at, %err, "wake handling failed");
        }
    }

    pub async fn poll(&self) {
        self.sync_store_changes().await;
        match self.authority.lock().await.poll() {
            Ok(Some(outcome)) => tracing::info!(?outcome, "poll expired an overdue session"),
            Ok(None) => {}
            Err(err) => tracing::error!(%err, "poll failed"),
        }
    }

    /// Announces keys other processes wrote since the last call. The
    /// daemon's own writes were announced when they were made.
    pub async fn sync_store_changes(&self) {
        let mut authority = self.authority.lock().await;
        let since = self.feed_cursor.load(Ordering::Relaxed);
        let (cursor, changes) = match authority.store_mut().foreign_changes_since(since) {
            Ok(feed) => feed,
            Err(err) => {
                tracing::warn!(%err, "change feed unavailable");
                return;
            }
        };
        self.feed_cursor.store(cursor, Ordering::Relaxed);

        let mut session_changed = false;
        let mut domains_changed = false;
        for change in &changes {
            tracing::debug!(key = %change.key, revision = change.revision, "store written by another process");
            match change.key.as_str() {
                keys::WORK_DOMAINS => domains_changed = true,
                keys::CURRENT_SESSION | keys::SESSION_SETTINGS | keys::EXTENSION_ENABLED | keys::MODE => {
                    session_changed = true;
                }
                _ => {}
            }
        }
        if session_changed {
            if let Err(err) = authority.reload_session() {
                tracing::error!(%err, "failed to reload session written by another process");
            }
        }
        if domains_changed {
            if let Err(err) = authority.reload_domains() {
                tracing::error!(%err, "failed to reload work domains");
            }
        }
    }

    /// Answers one request.
    pub async fn handle_request(&self, request: Request) -> Response {
        tracing::debug!(request = request.name(), "handling request");
        match request {
            Request::AskStudyQuestion { question } => self.ask(&question).await,
            Request::Subscribe => Response::Ack,
            request => self.authority.lock().await.handle(&request),
        }
    }

    async fn ask(&self, question: &str) -> Response {
        if question.trim().is_empty() {
            return Response::error(ErrorKind::Validation, LlmError::EmptyQuestion.to_string());
        }
        let stored_key = match self.config.gemini_api_key.clone() {
            Some(key) => Some(key),
            None => match self.authority.lock().await.store().gemini_api_key() {
                Ok(key) => key,
                Err(err) => return Response::error(ErrorKind::Storage, err.to_string()),
            },
        };
        let Some(api_key) = stored_key else {
            return Response::error(
                ErrorKind::Chat,
                "Gemini API key not configured; set it with `sf api-key <key>`",
            );
        };
        let client = match sf_llm::Client::new(api_key) {
            Ok(client) => client,
            Err(err) => return Response::error(ErrorKind::Chat, err.to_string()),
        };
        let mut session = self.chat.lock().await;
        match client.ask(&self.config.gemini_model, &mut session, question).await {
            Ok(text) => Response::Answer { text },
            Err(err @ LlmError::EmptyQuestion) => {
                Response::error(ErrorKind::Validation, err.to_string())
            }
            Err(err) => {
                tracing::warn!(%err, "study question failed");
                Response::error(ErrorKind::Chat, err.to_string())
            }
        }
    }
}

/// Runs the daemon until interrupted.
pub fn run(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(serve(config, shutdown_signal()))
}

async fn shutdown_signal() {
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(%err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        () = terminate => {}
    }
}

/// Opens the store, reconciles, and serves until `shutdown` completes.
pub async fn serve(config: Config, shutdown: impl Future<Output = ()>) -> Result<()> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    let db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let listener = bind_socket(&config)?;
    let poll_interval = config.poll_interval();
    let socket_path = config.socket_path.clone();

    let (state, timer) = DaemonState::new(config, db);
    let (fired_tx, mut fired_rx) = mpsc::channel(8);
    tokio::spawn(timer.run(fired_tx));
    state.boot().await;

    let ticker_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                fired = fired_rx.recv() => match fired {
                    Some(at) => ticker_state.on_wake(at).await,
                    None => break,
                },
                _ = interval.tick() => ticker_state.poll().await,
            }
        }
    });

    tracing::info!(socket = %socket_path.display(), "daemon listening");
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        if let Err(err) = server::handle_client(state, stream).await {
                            tracing::debug!(err = format!("{err:#}"), "client connection closed with error");
                        }
                    });
                }
                Err(err) => tracing::warn!(%err, "accept failed"),
            },
            () = &mut shutdown => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    if let Err(err) = std::fs::remove_file(&socket_path) {
        tracing::debug!(%err, "socket already removed");
    }
    Ok(())
}

/// Binds the socket, clearing a stale one left by a crashed daemon.
fn bind_socket(config: &Config) -> Result<UnixListener> {
    let path = &config.socket_path;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("failed to create socket directory")?;
    }
    if path.exists() {
        if StdUnixStream::connect(path).is_ok() {
            anyhow::bail!("daemon already running on {}", path.display());
        }
        std::fs::remove_file(path)
            .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
    }
    let listener = UnixListener::bind(path)
        .with_context(|| format!("failed to bind {}", path.display()))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    Ok(listener)
}
