//! Boundary to the secure session layer (CASE session manager).
//!
//! The binding manager does not open sessions itself. It asks a [SessionProvider] and receives the
//! outcome later through a [SessionCallback]. The callback never calls back into the manager,
//! it posts a [SessionEvent] onto the manager's event channel. The event loop owning the manager drains it.

use tokio::sync::mpsc;

use crate::types::{FabricIndex, PeerId};

/// Outcome of one session request.
#[derive(Debug)]
pub enum SessionEvent<S> {
    Established {
        peer: PeerId,
        attempt: u64,
        session: S,
    },
    Failed {
        peer: PeerId,
        attempt: u64,
        error: anyhow::Error,
    },
}

impl<S> SessionEvent<S> {
    pub fn peer(&self) -> PeerId {
        match self {
            Self::Established { peer, .. } | Self::Failed { peer, .. } => *peer,
        }
    }
}

/// Completion handle handed to [SessionProvider::find_or_establish_session].
///
/// Exactly one outcome is reported per request: `connected` and `failed` consume the callback,
/// and dropping it without either reports a failure.
pub struct SessionCallback<S> {
    peer: PeerId,
    attempt: u64,
    events: Option<mpsc::UnboundedSender<SessionEvent<S>>>,
}

impl<S> SessionCallback<S> {
    pub(crate) fn new(peer: PeerId, attempt: u64, events: mpsc::UnboundedSender<SessionEvent<S>>) -> Self {
        Self {
            peer,
            attempt,
            events: Some(events),
        }
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn connected(mut self, session: S) {
        if let Some(tx) = self.events.take() {
            _ = tx.send(SessionEvent::Established {
                peer: self.peer,
                attempt: self.attempt,
                session,
            });
        }
    }

    pub fn failed(mut self, error: anyhow::Error) {
        self.report_failure(error);
    }

    fn report_failure(&mut self, error: anyhow::Error) {
        if let Some(tx) = self.events.take() {
            _ = tx.send(SessionEvent::Failed {
                peer: self.peer,
                attempt: self.attempt,
                error,
            });
        }
    }
}

impl<S> Drop for SessionCallback<S> {
    fn drop(&mut self) {
        if self.events.is_some() {
            log::debug!("session callback for {} dropped without result", self.peer);
            self.report_failure(anyhow::anyhow!("session request dropped without result"));
        }
    }
}

impl<S> std::fmt::Debug for SessionCallback<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCallback")
            .field("peer", &self.peer)
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// Secure session layer used by the binding manager.
pub trait SessionProvider {
    /// Handle of an open session passed to the bound device changed handler.
    type Session;

    /// Already open session to `peer`, if any.
    fn find_existing_session(&self, peer: PeerId) -> Option<Self::Session>;

    /// Reuse or establish a session to `peer`. Must eventually resolve `callback` (or drop it).
    fn find_or_establish_session(&mut self, peer: PeerId, callback: SessionCallback<Self::Session>);

    /// No binding references `peer` anymore.
    fn release_session(&mut self, peer: PeerId);

    fn release_sessions_for_fabric(&mut self, fabric_index: FabricIndex);
}
