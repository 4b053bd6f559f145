//! Stream session - one live firehose connection
//!
//! A session:
//! - Connects to the firehose (optionally resuming from a cursor)
//! - Decodes each frame and filters commits against the target set
//! - Hands every matched post to the notifier, one at a time
//! - Ends on the first transport or decode error, a clean close, or a stop request
//!
//! Sessions never retry. Reconnecting is the supervisor's job.

use std::time::Duration;

use libpostwatch_core::{
    decode_frame, frame_seq, DecodeError, Decoded, EventFilter, MatchedPost, TargetSet,
    DEFAULT_IDLE_TIMEOUT_SECS,
};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::notifier::PostNotifier;
use crate::transport::{FrameTransport, TransportError};

/// Upper bound on waiting for a polite close handshake
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    Closed,
}

/// Why a session ended
#[derive(Debug)]
pub enum CloseReason {
    /// The relay ended the stream without an error
    Clean,
    /// A stop was requested
    Stopped,
    /// Connecting failed or the connection dropped
    Transport(TransportError),
    /// A frame could not be decoded
    Decode {
        error: DecodeError,
        /// 1-based position of the frame within the session
        frame_index: u64,
        frame_len: usize,
        /// Sequence number of the rejected frame, when its body was readable
        frame_seq: Option<i64>,
    },
}

impl CloseReason {
    pub fn is_error(&self) -> bool {
        matches!(self, CloseReason::Transport(_) | CloseReason::Decode { .. })
    }
}

/// Outcome of a finished session
#[derive(Debug)]
pub struct SessionEnd {
    pub reason: CloseReason,
    /// Sequence number of the last decoded commit
    pub last_seq: Option<i64>,
    pub frames: u64,
    pub delivered: u64,
    pub failed_deliveries: u64,
}

/// One connection's worth of streaming
pub struct StreamSession<'a> {
    targets: &'a TargetSet,
    filter: &'a EventFilter,
    notifier: &'a dyn PostNotifier,
    idle_timeout: Duration,
    state: SessionState,
    last_seq: Option<i64>,
    frames: u64,
    delivered: u64,
    failed_deliveries: u64,
}

impl<'a> StreamSession<'a> {
    pub fn new(targets: &'a TargetSet, filter: &'a EventFilter, notifier: &'a dyn PostNotifier) -> Self {
        Self {
            targets,
            filter,
            notifier,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            state: SessionState::Connecting,
            last_seq: None,
            frames: 0,
            delivered: 0,
            failed_deliveries: 0,
        }
    }

    /// End the session when no frame arrives for `idle_timeout`
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Stream until the connection ends, fails, or `shutdown` flips to true
    pub async fn run(
        mut self,
        transport: &dyn FrameTransport,
        cursor: Option<i64>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let reason = self.stream(transport, cursor, shutdown).await;
        self.transition(SessionState::Closed);
        debug!(
            frames = self.frames,
            delivered = self.delivered,
            last_seq = ?self.last_seq,
            "Session closed"
        );

        SessionEnd {
            reason,
            last_seq: self.last_seq,
            frames: self.frames,
            delivered: self.delivered,
            failed_deliveries: self.failed_deliveries,
        }
    }

    async fn stream(
        &mut self,
        transport: &dyn FrameTransport,
        cursor: Option<i64>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> CloseReason {
        info!(cursor = ?cursor, targets = self.targets.len(), "Connecting to firehose");

        let mut stream = tokio::select! {
            biased;
            _ = stop_requested(shutdown) => return CloseReason::Stopped,
            result = transport.connect(cursor) => match result {
                Ok(stream) => stream,
                Err(e) => return CloseReason::Transport(e),
            },
        };

        self.transition(SessionState::Streaming);
        info!(collection = %self.filter.collection(), "Monitoring firehose");

        let reason = loop {
            let next = tokio::select! {
                biased;
                _ = stop_requested(shutdown) => break CloseReason::Stopped,
                next = tokio::time::timeout(self.idle_timeout, stream.next_frame()) => next,
            };

            let frame = match next {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(e))) => break CloseReason::Transport(e),
                Ok(None) => break CloseReason::Clean,
                Err(_) => break CloseReason::Transport(TransportError::Idle(self.idle_timeout)),
            };
            self.frames += 1;

            if let Some(reason) = self.handle_frame(&frame, shutdown).await {
                break reason;
            }
        };

        if !matches!(reason, CloseReason::Transport(_)) {
            if tokio::time::timeout(CLOSE_TIMEOUT, stream.close()).await.is_err() {
                debug!(timeout = ?CLOSE_TIMEOUT, "close handshake timed out");
            }
        }
        reason
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }

    /// Process one frame; `Some` ends the session
    async fn handle_frame(
        &mut self,
        frame: &[u8],
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<CloseReason> {
        let event = match decode_frame(frame) {
            Ok(Decoded::Commit(event)) => event,
            Ok(Decoded::Skip(kind)) => {
                trace!(kind = %kind, "Skipping non-commit frame");
                return None;
            }
            Err(error) => {
                return Some(CloseReason::Decode {
                    error,
                    frame_index: self.frames,
                    frame_len: frame.len(),
                    frame_seq: frame_seq(frame),
                })
            }
        };
        self.last_seq = Some(event.seq);

        for op in self.filter.matching_ops(&event, self.targets) {
            let post = MatchedPost::new(&event, op);
            info!(
                repo = %post.repo,
                handle = self.targets.handle_for(&post.repo).map(|h| h.as_str()).unwrap_or("?"),
                path = %post.path,
                seq = post.seq,
                "Matched new post"
            );

            let result = tokio::select! {
                biased;
                _ = stop_requested(shutdown) => return Some(CloseReason::Stopped),
                result = self.notifier.notify(&post) => result,
            };
            match result {
                Ok(()) => self.delivered += 1,
                Err(e) => {
                    self.failed_deliveries += 1;
                    warn!(repo = %post.repo, path = %post.path, error = %e, "Notification failed");
                }
            }
        }
        None
    }
}

/// Resolves once a stop has been requested
///
/// If the sender is gone no stop can ever arrive, so this never resolves.
pub(crate) async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
