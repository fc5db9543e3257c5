//! Response lifecycle.
//!
//! Every [`IncomingResponse`](crate::net::IncomingResponse) walks a small state machine and
//! announces the interesting transitions on a broadcast channel.
//!
//! ```text
//! Unstarted → Active      metadata normalized (MetadataReady)
//! Active    → Ended       end sentinel pushed
//! Ended     → Closed      consumer drained the stream (End now, Close on a later turn)
//! Active|Ended → Destroyed consumer aborted
//! ```

use crate::errors::ResponseError;
use std::fmt::Display;
use uuid::Uuid;

/// Unique identifier of a response, used to correlate events and log lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResponseId(Uuid);

impl ResponseId {
    /// Create a new unique `ResponseId` using a random UUID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResponseId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ResponseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseState {
    /// Created, metadata not yet normalized
    #[default]
    Unstarted,
    /// Metadata available, bytes may still arrive
    Active,
    /// End sentinel pushed; buffered bytes may still be unread
    Ended,
    /// Consumer saw end-of-data and the close notification went out
    Closed,
    /// Consumer aborted
    Destroyed,
    /// Transport failed before end-of-data; the error is the last thing the consumer sees
    Failed,
}

impl ResponseState {
    /// Apply a transition. Returns the new state, or `None` when the transition is not allowed
    /// from the current state.
    pub fn transition(self, to: ResponseState) -> Option<ResponseState> {
        use ResponseState::*;

        match (self, to) {
            (Unstarted, Active) => Some(Active),
            (Active, Ended) => Some(Ended),
            (Ended, Closed) => Some(Closed),
            (Active, Destroyed) | (Ended, Destroyed) => Some(Destroyed),
            (Active, Failed) => Some(Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResponseState::Closed | ResponseState::Destroyed | ResponseState::Failed
        )
    }
}

/// Notifications emitted by a response
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    /// Status, url and headers are available
    MetadataReady { id: ResponseId },
    /// Consumer reached end-of-data
    End { id: ResponseId },
    /// Fired once, strictly after `End`, on a later turn
    Close { id: ResponseId },
    /// Transport failure
    Error { id: ResponseId, error: ResponseError },
}

impl ResponseEvent {
    pub fn id(&self) -> ResponseId {
        match self {
            ResponseEvent::MetadataReady { id }
            | ResponseEvent::End { id }
            | ResponseEvent::Close { id }
            | ResponseEvent::Error { id, .. } => *id,
        }
    }
}
