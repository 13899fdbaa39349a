//! Session state
//!
//! The facts needed to resume: last sequence number, session id and the URLs
//! to reconnect to. Owned by the connection loop; the heartbeat task only
//! reads the sequence through a [`SequenceHandle`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Sentinel stored while no dispatch has been seen
const NO_SEQUENCE: i64 = -1;

/// Read-only view of the sequence number shared with the heartbeat task
#[derive(Debug, Clone)]
pub struct SequenceHandle(Arc<AtomicI64>);

impl SequenceHandle {
    /// Last sequence seen, `None` before the first dispatch
    pub fn get(&self) -> Option<u64> {
        let value = self.0.load(Ordering::Acquire);
        u64::try_from(value).ok()
    }
}

/// Outcome of offering a dispatch sequence number to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceUpdate {
    /// The number was newer and is now stored
    Advanced { previous: Option<u64> },
    /// Duplicate or out-of-order; nothing changed
    Stale { current: u64 },
}

/// Resumability facts for one gateway session
#[derive(Debug)]
pub struct SessionState {
    sequence: Arc<AtomicI64>,
    session_id: Option<String>,
    resume_gateway_url: Option<String>,
    gateway_url: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            sequence: Arc::new(AtomicI64::new(NO_SEQUENCE)),
            session_id: None,
            resume_gateway_url: None,
            gateway_url: None,
        }
    }

    /// Last sequence seen
    pub fn sequence(&self) -> Option<u64> {
        u64::try_from(self.sequence.load(Ordering::Acquire)).ok()
    }

    pub fn sequence_handle(&self) -> SequenceHandle {
        SequenceHandle(Arc::clone(&self.sequence))
    }

    /// Store `seq` if it is newer than the current sequence
    ///
    /// The sequence never decreases while the session is live.
    pub fn advance(&self, seq: u64) -> SequenceUpdate {
        let incoming = i64::try_from(seq).unwrap_or(i64::MAX);
        let current = self.sequence.load(Ordering::Acquire);
        if incoming <= current {
            return SequenceUpdate::Stale {
                current: u64::try_from(current).unwrap_or_default(),
            };
        }
        self.sequence.store(incoming, Ordering::Release);
        SequenceUpdate::Advanced {
            previous: u64::try_from(current).ok(),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn resume_gateway_url(&self) -> Option<&str> {
        self.resume_gateway_url.as_deref()
    }

    /// URL returned by discovery, used for fresh connections
    pub fn gateway_url(&self) -> Option<&str> {
        self.gateway_url.as_deref()
    }

    pub fn set_gateway_url(&mut self, url: impl Into<String>) {
        self.gateway_url = Some(url.into());
    }

    /// Record the session announced by `READY`
    pub fn establish(&mut self, session_id: impl Into<String>, resume_gateway_url: Option<String>) {
        self.session_id = Some(session_id.into());
        self.resume_gateway_url = resume_gateway_url;
    }

    /// A resume needs both a session id and at least one sequence number
    pub fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.sequence().is_some()
    }

    /// Forget the session before a full re-identify
    ///
    /// The sequence resets too: a new session numbers its dispatches from 1.
    pub fn clear(&mut self) {
        self.session_id = None;
        self.resume_gateway_url = None;
        self.sequence.store(NO_SEQUENCE, Ordering::Release);
    }

    /// URL for the next connection attempt
    ///
    /// Resumes go to the session's resume URL when the server provided one.
    pub fn connect_url(&self) -> Option<&str> {
        if self.can_resume() {
            self.resume_gateway_url().or(self.gateway_url())
        } else {
            self.gateway_url()
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
