//! In-memory upload session store.
//!
//! Sessions have a hard lifetime measured from creation; use does not extend
//! them. Nothing is persisted, so a restart invalidates every token.

use super::clock::Clock;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Random bytes per session token (hex encoded on the wire).
const TOKEN_BYTES: usize = 32;

/// An upload session minted after one successful full verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// Opaque bearer token.
    pub token: String,
    /// Uploader wallet address, lowercase.
    pub uploader_address: String,
    /// Batch the session may spend from, exactly as the caller sent it.
    pub batch_id: String,
    /// Creation time; expiry is measured from here.
    pub created_at: DateTime<Utc>,
    /// Most recent admission under this session.
    pub last_used: DateTime<Utc>,
    /// Files admitted under this session, including the first.
    pub file_count: u64,
}

impl UploadSession {
    /// Returns true once more than `lifetime` has passed since creation.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, lifetime: Duration) -> bool {
        now.signed_duration_since(self.created_at)
            .to_std()
            .is_ok_and(|elapsed| elapsed > lifetime)
    }

    /// Returns true if this session was issued for `uploader` and `batch_id`.
    ///
    /// Address comparison ignores case; batch ids must match exactly.
    #[must_use]
    pub fn is_bound_to(&self, uploader: &str, batch_id: &str) -> bool {
        self.uploader_address.eq_ignore_ascii_case(uploader) && self.batch_id == batch_id
    }
}

/// Session statistics for monitoring.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Sessions minted.
    pub created: u64,
    /// Admissions on an existing session.
    pub reused: u64,
    /// Sessions dropped on lookup because they had expired.
    pub expired_on_lookup: u64,
    /// Sessions removed by sweeps.
    pub swept: u64,
}

/// Token -> session map shared by request handlers and the sweeper.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, UploadSession>>>,
    stats: Arc<Mutex<SessionStats>>,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(lifetime: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            stats: Arc::new(Mutex::new(SessionStats::default())),
            clock,
            lifetime,
        }
    }

    /// Absolute session lifetime.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Mint a session for `uploader` on `batch_id` with `file_count = 1`.
    pub fn create(&self, uploader: &str, batch_id: &str) -> UploadSession {
        let now = self.clock.now();
        let mut sessions = self.inner.lock();

        let mut token = generate_token();
        while sessions.contains_key(&token) {
            token = generate_token();
        }

        let session = UploadSession {
            token: token.clone(),
            uploader_address: uploader.to_ascii_lowercase(),
            batch_id: batch_id.to_string(),
            created_at: now,
            last_used: now,
            file_count: 1,
        };
        sessions.insert(token, session.clone());
        drop(sessions);

        self.stats.lock().created += 1;
        session
    }

    /// Look up a live session. An expired session is removed and reported absent.
    pub fn get(&self, token: &str) -> Option<UploadSession> {
        let now = self.clock.now();
        let mut sessions = self.inner.lock();

        let expired = sessions.get(token)?.is_expired(now, self.lifetime);
        if expired {
            sessions.remove(token);
            drop(sessions);
            self.stats.lock().expired_on_lookup += 1;
            debug!("Dropped expired session {}", crate::gateway::redact(token));
            return None;
        }

        sessions.get(token).cloned()
    }

    /// Admit one more file under `token` if the session is live and bound to
    /// `(uploader, batch_id)`.
    ///
    /// On success `last_used` is bumped and `file_count` incremented, and the
    /// updated session is returned. A mismatched binding leaves the session
    /// untouched.
    pub fn redeem(&self, token: &str, uploader: &str, batch_id: &str) -> Option<UploadSession> {
        let now = self.clock.now();
        let mut sessions = self.inner.lock();

        let session = sessions.get_mut(token)?;
        if session.is_expired(now, self.lifetime) {
            sessions.remove(token);
            drop(sessions);
            self.stats.lock().expired_on_lookup += 1;
            debug!("Dropped expired session {}", crate::gateway::redact(token));
            return None;
        }
        if !session.is_bound_to(uploader, batch_id) {
            return None;
        }

        session.last_used = now;
        session.file_count += 1;
        let updated = session.clone();
        drop(sessions);

        self.stats.lock().reused += 1;
        Some(updated)
    }

    /// Remove every expired session in a single pass. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.inner.lock();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now, self.lifetime));
        let removed = before - sessions.len();
        drop(sessions);

        self.stats.lock().swept += removed as u64;
        removed
    }

    /// Get current session statistics.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats.lock().clone()
    }

    /// Number of stored sessions, including any not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
