//! Per-session anti-forgery tokens.
//!
//! A token is issued the first time a session is seen and bound to that
//! session until it expires. It is only replaced on request (see
//! [`SessionStore::rotate`]); the intake pipeline never reads this store
//! directly but receives the expected token as an argument.
use log::{debug, warn};
use rand::RngCore;
use rand::rngs::OsRng;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 32 bytes from the OS generator, as 64 lowercase hex characters.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Compares two tokens in time independent of where they first differ.
pub fn tokens_match(expected: &str, given: &str) -> bool {
    let (a, b) = (expected.as_bytes(), given.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// What a request knows about its session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    pub id: String,
    pub csrf_token: String,
}

struct Entry {
    csrf_token: String,
    last_seen: Instant,
}

/// Sessions plus an index ordered by last use, oldest first.
#[derive(Default)]
struct Sessions {
    entries: HashMap<String, Entry>,
    by_age: BTreeSet<(Instant, String)>,
}

impl Sessions {
    fn touch(&mut self, id: &str, now: Instant) -> Option<&mut Entry> {
        let entry = self.entries.get_mut(id)?;
        self.by_age.remove(&(entry.last_seen, id.to_string()));
        entry.last_seen = now;
        self.by_age.insert((now, id.to_string()));
        Some(entry)
    }

    fn pop_oldest(&mut self) -> Option<(Instant, String)> {
        let (seen, id) = self.by_age.pop_first()?;
        self.entries.remove(&id);
        Some((seen, id))
    }

    /// Drops sessions idle for `ttl` or longer. Stops at the first live one.
    fn prune(&mut self, now: Instant, ttl: Duration) -> usize {
        let mut dropped = 0;
        while let Some((seen, _)) = self.by_age.first() {
            if now.duration_since(*seen) < ttl {
                break;
            }
            self.pop_oldest();
            dropped += 1;
        }
        dropped
    }
}

/// In-memory sessions with an idle timeout and a hard cap. At the cap the
/// least recently seen session makes room for the new one.
pub struct SessionStore {
    ttl: Duration,
    max_sessions: usize,
    sessions: Mutex<Sessions>,
}

impl SessionStore {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        SessionStore {
            ttl,
            max_sessions: max_sessions.max(1),
            sessions: Mutex::new(Sessions::default()),
        }
    }

    /// Resolves the session named by the cookie, or starts a new one when the
    /// cookie is absent, unknown or expired.
    pub fn get_or_create(&self, id: Option<&str>) -> SessionContext {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let expired = sessions.prune(now, self.ttl);
        if expired > 0 {
            debug!("Expired {} idle session(s)", expired);
        }

        if let Some(id) = id {
            if let Some(entry) = sessions.touch(id, now) {
                return SessionContext {
                    id: id.to_string(),
                    csrf_token: entry.csrf_token.clone(),
                };
            }
        }

        while sessions.entries.len() >= self.max_sessions {
            if sessions.pop_oldest().is_none() {
                break;
            }
            warn!(
                "Session limit of {} reached, evicted the least recently seen",
                self.max_sessions
            );
        }

        let ctx = SessionContext {
            id: generate_token(),
            csrf_token: generate_token(),
        };
        sessions.by_age.insert((now, ctx.id.clone()));
        sessions.entries.insert(
            ctx.id.clone(),
            Entry {
                csrf_token: ctx.csrf_token.clone(),
                last_seen: now,
            },
        );
        debug!("Started session ({} active)", sessions.entries.len());
        ctx
    }

    /// Issues a fresh token for an existing session. Returns `None` if the
    /// session is gone.
    pub fn rotate(&self, id: &str) -> Option<String> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let entry = sessions.touch(id, Instant::now())?;
        entry.csrf_token = generate_token();
        Some(entry.csrf_token.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
