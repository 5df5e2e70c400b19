use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::AppError;
use crate::models::allocation::UserId;
use crate::models::location::Location;
use crate::models::lot::LotId;
use crate::protocol::messages::{ParkingRequestMessage, WsMessage};

/// Connection-scoped state for one user.
#[derive(Debug, Clone)]
pub struct UserSession {
    /// Ties the session to the connection that opened it. A disconnect from
    /// a superseded connection must not tear down its replacement.
    pub conn_seq: u64,
    pub location: Option<Location>,
    /// Lots the user turned down; excluded from candidate selection until
    /// the session ends.
    pub rejections: HashSet<LotId>,
    /// Most recent parking request, replayed when the user rejects an offer.
    pub last_request: Option<ParkingRequestMessage>,
    pub outbound: mpsc::Sender<WsMessage>,
    pub connected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Live sessions keyed by user id. Created on connect, destroyed on
/// disconnect; the engine only reads them and pushes notifications.
pub struct SessionRegistry {
    sessions: DashMap<UserId, UserSession>,
    next_conn_seq: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_conn_seq: AtomicU64::new(1),
        }
    }

    /// Opens a session, replacing any previous connection for the same user.
    /// Returns the sequence number identifying this connection.
    pub fn connect(&self, user_id: UserId, outbound: mpsc::Sender<WsMessage>) -> u64 {
        let conn_seq = self.next_conn_seq.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        let session = UserSession {
            conn_seq,
            location: None,
            rejections: HashSet::new(),
            last_request: None,
            outbound,
            connected_at: now,
            updated_at: now,
        };
        if self.sessions.insert(user_id, session).is_some() {
            warn!(user_id, "replacing session for reconnecting user");
        }
        conn_seq
    }

    /// Closes the session if it still belongs to `conn_seq`, returning the
    /// removed session. `None` means `conn_seq` was superseded and the live
    /// session is untouched.
    pub fn disconnect(&self, user_id: UserId, conn_seq: u64) -> Option<UserSession> {
        self.sessions
            .remove_if(&user_id, |_, session| session.conn_seq == conn_seq)
            .map(|(_, session)| session)
    }

    pub fn get_user(&self, user_id: UserId) -> Option<UserSession> {
        self.sessions.get(&user_id).map(|entry| entry.value().clone())
    }

    pub fn update_location(&self, user_id: UserId, location: Location) -> Result<(), AppError> {
        let mut session = self.session_mut(user_id)?;
        session.location = Some(location);
        session.updated_at = Utc::now();
        Ok(())
    }

    pub fn add_rejection(&self, user_id: UserId, lot_id: LotId) -> Result<(), AppError> {
        let mut session = self.session_mut(user_id)?;
        session.rejections.insert(lot_id);
        session.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_last_request(
        &self,
        user_id: UserId,
        request: ParkingRequestMessage,
    ) -> Result<(), AppError> {
        let mut session = self.session_mut(user_id)?;
        session.last_request = Some(request);
        session.updated_at = Utc::now();
        Ok(())
    }

    /// Pushes a message onto the session's outbound channel without
    /// blocking. Returns false when the user has no session or the channel
    /// cannot take the message (connection slow or already closing).
    pub fn notify(&self, user_id: UserId, message: WsMessage) -> bool {
        let Some(session) = self.sessions.get(&user_id) else {
            return false;
        };
        match session.outbound.try_send(message) {
            Ok(()) => true,
            Err(err) => {
                warn!(user_id, error = %err, "dropping outbound message");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn session_mut(
        &self,
        user_id: UserId,
    ) -> Result<dashmap::mapref::one::RefMut<'_, UserId, UserSession>, AppError> {
        self.sessions
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("user {user_id} has no active session")))
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
