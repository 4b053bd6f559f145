//! Supervisor module - keeps a stream session alive
//!
//! The supervisor:
//! - Resolves the watched handles once, failing fast on any error
//! - Runs one stream session at a time
//! - Waits a fixed delay after every session end and starts a new one
//! - Resumes from the last seen sequence number when enabled
//! - Stops promptly when the shutdown signal flips, mid-session or mid-backoff

use std::sync::Arc;
use std::time::Duration;

use libpostwatch_atproto::{resolve_target_set, ResolveHandle};
use libpostwatch_core::{
    Config, EventFilter, Handle, TargetSet, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_RECONNECT_DELAY_SECS,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::DaemonError;
use crate::notifier::PostNotifier;
use crate::session::{stop_requested, CloseReason, SessionEnd, StreamSession};
use crate::transport::FrameTransport;

/// Reconnect policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Constant delay between sessions; it never grows
    pub reconnect_delay: Duration,
    /// Silence after which a connection is dropped
    pub idle_timeout: Duration,
    /// Pass the last seen sequence number as the cursor on reconnect
    pub resume_from_cursor: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            resume_from_cursor: true,
        }
    }
}

impl From<&Config> for SupervisorConfig {
    fn from(config: &Config) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay(),
            idle_timeout: config.idle_timeout(),
            resume_from_cursor: config.firehose.resume_from_cursor,
        }
    }
}

/// Supervisor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    Backoff,
    Stopped,
}

/// Counters reported when the supervisor stops
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SupervisorStats {
    pub sessions_started: u64,
    pub sessions_failed: u64,
    pub decode_failures: u64,
    pub posts_delivered: u64,
    pub delivery_failures: u64,
}

/// Owns the session lifecycle across reconnects
pub struct Supervisor {
    transport: Arc<dyn FrameTransport>,
    filter: EventFilter,
    notifier: Arc<dyn PostNotifier>,
    config: SupervisorConfig,
    state: SupervisorState,
    stats: SupervisorStats,
}

impl Supervisor {
    pub fn new(
        transport: Arc<dyn FrameTransport>,
        filter: EventFilter,
        notifier: Arc<dyn PostNotifier>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            transport,
            filter,
            notifier,
            config,
            state: SupervisorState::Idle,
            stats: SupervisorStats::default(),
        }
    }

    /// Resolve `handles`, then stream until stopped
    ///
    /// Only resolution errors are returned; nothing is streamed unless every
    /// handle resolves.
    pub async fn start(
        self,
        resolver: Arc<dyn ResolveHandle>,
        handles: Vec<Handle>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<SupervisorStats, DaemonError> {
        let targets = resolve_targets(resolver, handles).await?;
        Ok(self.run(Arc::new(targets), shutdown).await)
    }

    /// Stream against an already-resolved target set until stopped
    pub async fn run(
        mut self,
        targets: Arc<TargetSet>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SupervisorStats {
        let mut cursor = None;

        while !*shutdown.borrow() {
            self.transition(SupervisorState::Running);
            self.stats.sessions_started += 1;

            let session = StreamSession::new(&targets, &self.filter, self.notifier.as_ref())
                .with_idle_timeout(self.config.idle_timeout);
            let end = session
                .run(self.transport.as_ref(), cursor, &mut shutdown)
                .await;

            self.stats.posts_delivered += end.delivered;
            self.stats.delivery_failures += end.failed_deliveries;
            if self.config.resume_from_cursor {
                cursor = next_cursor(cursor, &end);
            }
            if end.reason.is_error() {
                self.stats.sessions_failed += 1;
            }

            match &end.reason {
                CloseReason::Stopped => break,
                CloseReason::Clean => {
                    info!(frames = end.frames, "Firehose closed the connection");
                }
                CloseReason::Transport(e) => {
                    warn!(error = %e, frames = end.frames, "Error in monitor: transport failure");
                }
                CloseReason::Decode {
                    error,
                    frame_index,
                    frame_len,
                    ..
                } => {
                    self.stats.decode_failures += 1;
                    error!(
                        error = %error,
                        remote = error.is_remote(),
                        frame_index,
                        frame_len,
                        last_seq = ?end.last_seq,
                        "Error in monitor: undecodable firehose frame"
                    );
                }
            }

            self.transition(SupervisorState::Backoff);
            info!(
                cursor = ?cursor,
                "Reconnecting in {} seconds...",
                self.config.reconnect_delay.as_secs()
            );
            tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }

        self.transition(SupervisorState::Stopped);
        info!(
            sessions = self.stats.sessions_started,
            failed = self.stats.sessions_failed,
            delivered = self.stats.posts_delivered,
            "Supervisor stopped"
        );
        self.stats
    }

    fn transition(&mut self, next: SupervisorState) {
        debug!(from = ?self.state, to = ?next, "Supervisor state change");
        self.state = next;
    }
}

/// Cursor for the next connection
///
/// A rejected frame would be replayed from the old cursor and fail again, so
/// resume just past it when its `seq` is known and from the live tail when it
/// is not. Relay error frames (`FutureCursor`, `ConsumerTooSlow`, ...) also
/// restart from the live tail.
fn next_cursor(previous: Option<i64>, end: &SessionEnd) -> Option<i64> {
    match &end.reason {
        CloseReason::Decode { error, .. } if error.is_remote() => {
            warn!(error = %error, "Relay rejected the subscription; resuming from the live tail");
            None
        }
        CloseReason::Decode {
            frame_seq: Some(seq),
            ..
        } => {
            warn!(seq, "Skipping undecodable frame");
            Some(*seq)
        }
        CloseReason::Decode { frame_seq: None, .. } => {
            warn!("Undecodable frame has no readable seq; resuming from the live tail");
            None
        }
        _ => end.last_seq.or(previous),
    }
}

/// Resolve every handle on a blocking thread
pub async fn resolve_targets(
    resolver: Arc<dyn ResolveHandle>,
    handles: Vec<Handle>,
) -> Result<TargetSet, DaemonError> {
    let targets =
        tokio::task::spawn_blocking(move || resolve_target_set(resolver.as_ref(), &handles))
            .await??;

    for did in targets.iter() {
        match targets.handle_for(did) {
            Some(handle) => info!(handle = %handle, did = %did, "Resolved handle"),
            None => info!(did = %did, "Watching DID"),
        }
    }
    Ok(targets)
}
