//! Backend session state.
//!
//! Holds the session token and the subject record payload, decides token
//! validity from the JWT `exp` claim, and notifies listeners synchronously
//! on every change.

use crate::backend::{Session, SessionListener};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tether_codec::Payload;

#[derive(Default)]
struct Inner {
    token: Option<String>,
    subject: Option<Payload>,
}

/// Shared session state for one backend instance.
#[derive(Default)]
pub(crate) struct SessionState {
    inner: Mutex<Inner>,
    listeners: Mutex<Vec<SessionListener>>,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Current session snapshot.
    pub(crate) fn snapshot(&self) -> Session {
        let inner = lock(&self.inner);
        let valid = inner
            .token
            .as_deref()
            .map(token_is_valid)
            .unwrap_or(false);
        Session {
            token: inner.token.clone(),
            subject: inner.subject.clone(),
            valid,
        }
    }

    /// The raw token, if any.
    pub(crate) fn token(&self) -> Option<String> {
        lock(&self.inner).token.clone()
    }

    /// Replace the session and notify listeners.
    pub(crate) fn set(&self, token: Option<String>, subject: Option<Payload>) {
        {
            let mut inner = lock(&self.inner);
            inner.token = token;
            inner.subject = subject;
        }
        self.notify();
    }

    /// Drop the session and notify listeners.
    pub(crate) fn clear(&self) {
        self.set(None, None);
    }

    /// Register a change listener. Listeners live as long as the backend.
    pub(crate) fn listen(&self, listener: SessionListener) {
        lock(&self.listeners).push(listener);
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        let listeners: Vec<SessionListener> = lock(&self.listeners).clone();
        for listener in listeners {
            listener(&snapshot);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Whether a session token is currently usable.
///
/// A token is valid when its JWT `exp` claim lies in the future. Malformed
/// tokens count as expired.
pub(crate) fn token_is_valid(token: &str) -> bool {
    claim_exp(token)
        .map(|exp| exp > Utc::now().timestamp())
        .unwrap_or(false)
}

fn claim_exp(token: &str) -> Option<i64> {
    let mut parts = token.split('.');
    let _header = parts.next()?;
    let payload = parts.next()?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_i64()
}
