//! The realtime subscription channel.
//!
//! The backend delivers live record events over a server-sent-events stream.
//! One background task owns the stream: it performs the connect handshake
//! (the first event carries the client id), submits the current
//! subscription list, and dispatches every following event to the handler
//! registered for its topic key. The task reconnects with a capped backoff
//! while any subscription is registered and stops when the registry
//! empties.

use crate::backend::{EventHandler, RecordEvent};
use crate::error::{Error, Result};
use crate::http::session::SessionState;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Handshake event name; its data carries the client id.
const CONNECT_EVENT: &str = "PB_CONNECT";

struct ConnState {
    client_id: Option<String>,
    task: Option<JoinHandle<()>>,
}

pub(crate) struct Realtime {
    base_url: String,
    http: reqwest::Client,
    session: Arc<SessionState>,
    handlers: Mutex<HashMap<String, EventHandler>>,
    state: Mutex<ConnState>,
}

impl Realtime {
    pub(crate) fn new(
        base_url: String,
        http: reqwest::Client,
        session: Arc<SessionState>,
    ) -> Self {
        Self {
            base_url,
            http,
            session,
            handlers: Mutex::new(HashMap::new()),
            state: Mutex::new(ConnState {
                client_id: None,
                task: None,
            }),
        }
    }

    /// Register a handler for a topic key and ensure the stream is running.
    pub(crate) async fn subscribe(
        this: &Arc<Self>,
        key: String,
        handler: EventHandler,
    ) -> Result<()> {
        lock(&this.handlers).insert(key, handler);

        let client_id = {
            let mut state = lock(&this.state);
            if state.task.is_none() {
                let runner = Arc::clone(this);
                state.task = Some(tokio::spawn(async move { runner.run().await }));
            }
            state.client_id.clone()
        };

        // Already connected: resubmit the updated subscription list now.
        // Otherwise the reader task submits it after the handshake.
        if let Some(client_id) = client_id {
            this.submit_subscriptions(&client_id).await?;
        }
        Ok(())
    }

    /// Remove a topic key's handler; tear the stream down when none remain.
    pub(crate) async fn unsubscribe(this: &Arc<Self>, key: &str) -> Result<()> {
        let remaining = {
            let mut handlers = lock(&this.handlers);
            handlers.remove(key);
            handlers.len()
        };

        if remaining == 0 {
            this.shutdown();
            return Ok(());
        }

        let client_id = lock(&this.state).client_id.clone();
        if let Some(client_id) = client_id {
            this.submit_subscriptions(&client_id).await?;
        }
        Ok(())
    }

    /// Remove every handler and close the stream.
    pub(crate) fn unsubscribe_all(&self) {
        lock(&self.handlers).clear();
        self.shutdown();
    }

    pub(crate) fn subscription_count(&self) -> usize {
        lock(&self.handlers).len()
    }

    fn shutdown(&self) {
        let mut state = lock(&self.state);
        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.client_id = None;
    }

    async fn run(self: Arc<Self>) {
        let mut attempt: u32 = 0;
        loop {
            if self.subscription_count() == 0 {
                break;
            }
            match self.connect_once().await {
                Ok(()) => attempt = 0,
                Err(error) => {
                    tracing::warn!(%error, "realtime stream failed");
                }
            }
            if self.subscription_count() == 0 {
                break;
            }
            attempt = attempt.saturating_add(1);
            let backoff = Duration::from_secs(2u64.saturating_pow(attempt.min(5)).min(30));
            tracing::debug!(?backoff, "reconnecting realtime stream");
            tokio::time::sleep(backoff).await;
        }

        let mut state = lock(&self.state);
        state.task = None;
        state.client_id = None;
    }

    /// Open the stream once and pump events until it ends.
    async fn connect_once(&self) -> Result<()> {
        let mut request = self
            .http
            .get(format!("{}/api/realtime", self.base_url))
            .header("Accept", "text/event-stream");
        if let Some(token) = self.session.token() {
            request = request.header("Authorization", token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Realtime(format!(
                "stream request failed with status {status}"
            )));
        }

        let mut stream = response.bytes_stream();
        let mut parser = SseParser::default();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for event in parser.push(&chunk) {
                self.handle_event(event).await?;
            }
        }
        Err(Error::Realtime("stream closed by backend".to_string()))
    }

    async fn handle_event(&self, event: SseEvent) -> Result<()> {
        if event.name == CONNECT_EVENT {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct ConnectData {
                client_id: String,
            }
            let data: ConnectData = serde_json::from_str(&event.data)
                .map_err(|e| Error::Realtime(format!("bad connect event: {e}")))?;
            lock(&self.state).client_id = Some(data.client_id.clone());
            tracing::debug!(client_id = %data.client_id, "realtime stream connected");
            return self.submit_subscriptions(&data.client_id).await;
        }

        let handler = lock(&self.handlers).get(&event.name).cloned();
        match handler {
            Some(handler) => match serde_json::from_str::<RecordEvent>(&event.data) {
                Ok(record_event) => handler(record_event),
                Err(error) => {
                    tracing::error!(topic = %event.name, %error, "dropping undecodable realtime event");
                }
            },
            None => {
                tracing::debug!(topic = %event.name, "event for unsubscribed topic");
            }
        }
        Ok(())
    }

    /// Submit the current subscription list for this client id.
    async fn submit_subscriptions(&self, client_id: &str) -> Result<()> {
        let subscriptions: Vec<String> = lock(&self.handlers).keys().cloned().collect();

        let mut request = self
            .http
            .post(format!("{}/api/realtime", self.base_url))
            .json(&json!({
                "clientId": client_id,
                "subscriptions": subscriptions,
            }));
        if let Some(token) = self.session.token() {
            request = request.header("Authorization", token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Realtime(format!(
                "subscription submit failed with status {status}"
            )));
        }
        Ok(())
    }
}

impl Drop for Realtime {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.state).task.take() {
            task.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One parsed server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SseEvent {
    name: String,
    data: String,
}

/// Incremental server-sent-events parser.
///
/// Fed raw byte chunks; yields complete events at blank-line boundaries.
#[derive(Default)]
struct SseParser {
    buffer: Vec<u8>,
    name: String,
    data: String,
}

impl SseParser {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.name.is_empty() || !self.data.is_empty() {
                    events.push(SseEvent {
                        name: std::mem::take(&mut self.name),
                        data: std::mem::take(&mut self.data),
                    });
                }
            } else if let Some(rest) = line.strip_prefix("event:") {
                self.name = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("data:") {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
            }
            // Comments (`:`) and `id:` fields are ignored.
        }
        events
    }
}
