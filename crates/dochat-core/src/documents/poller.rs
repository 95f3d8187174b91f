//! Adaptive document status poller.
//!
//! Fetches the status list on a fixed interval and halts the timer once
//! every document has reached a terminal state. Manual refresh and resume
//! always re-arm polling. Every request carries a monotonically increasing
//! token, so a slow, older response can never overwrite fresher data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{DocumentRecord, DocumentsClient, all_terminal};

/// Reference polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10_000);

/// Updates published by the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerEvent {
    /// A fresh record list; replaces the previous one wholesale.
    Documents(Vec<DocumentRecord>),
    /// A status request failed; polling continues on the same interval.
    FetchFailed(String),
    /// Every document is terminal; the periodic timer stopped.
    Halted,
}

/// Monotonic request tokens for in-flight responses.
#[derive(Debug, Default)]
struct ResponseGate {
    issued: AtomicU64,
    applied: AtomicU64,
}

impl ResponseGate {
    fn issue(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Marks `token` applied unless a newer response already published.
    fn try_apply(&self, token: u64) -> bool {
        let mut applied = self.applied.load(Ordering::SeqCst);
        loop {
            if token <= applied {
                return false;
            }
            match self.applied.compare_exchange(
                applied,
                token,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(current) => applied = current,
            }
        }
    }
}

struct PollerInner {
    client: DocumentsClient,
    interval: Duration,
    events: mpsc::UnboundedSender<PollerEvent>,
    gate: ResponseGate,
    disposed: CancellationToken,
    run: Mutex<Option<CancellationToken>>,
}

impl PollerInner {
    /// Nothing holds the lock across a panic point, so a poisoned guard is
    /// still a consistent one.
    fn run_token(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the status list lifecycle; cloneable handle.
#[derive(Clone)]
pub struct StatusPoller {
    inner: Arc<PollerInner>,
}

impl StatusPoller {
    pub fn new(
        client: DocumentsClient,
        interval: Duration,
        events: mpsc::UnboundedSender<PollerEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                client,
                interval,
                events,
                gate: ResponseGate::default(),
                disposed: CancellationToken::new(),
                run: Mutex::new(None),
            }),
        }
    }

    /// Arms the periodic timer if it is not already running. The first
    /// fetch fires immediately.
    pub fn start(&self) {
        let mut run = self.inner.run_token();
        if let Some(token) = run.as_ref()
            && !token.is_cancelled()
        {
            return;
        }
        let token = self.inner.disposed.child_token();
        *run = Some(token.clone());
        let inner = Arc::clone(&self.inner);
        tokio::spawn(poll_loop(inner, token));
    }

    /// Cancels the periodic timer. A response already in flight may still
    /// resolve; it passes the staleness gate like any other.
    pub fn stop(&self) {
        if let Some(token) = self.inner.run_token().take() {
            token.cancel();
        }
    }

    /// Re-arms polling after an adaptive halt or a manual stop.
    pub fn resume(&self) {
        self.start();
    }

    /// One manual refresh, unaffected by the adaptive gate; always re-arms
    /// polling afterwards.
    pub async fn fetch_once(&self) {
        fetch_and_publish(&self.inner).await;
        self.start();
    }

    /// Disposes the poller; responses resolving afterwards are discarded.
    pub fn close(&self) {
        self.inner.disposed.cancel();
    }
}

async fn poll_loop(inner: Arc<PollerInner>, token: CancellationToken) {
    let mut ticker = tokio::time::interval(inner.interval);
    loop {
        tokio::select! {
            () = token.cancelled() => return,
            _ = ticker.tick() => {}
        }
        if fetch_and_publish(&inner).await {
            token.cancel();
            let _ = inner.events.send(PollerEvent::Halted);
            return;
        }
    }
}

/// Issues one guarded fetch and publishes the outcome. Returns true when
/// the periodic timer should halt (list non-empty, all terminal).
async fn fetch_and_publish(inner: &PollerInner) -> bool {
    let token = inner.gate.issue();
    let result = inner.client.fetch_status().await;
    if inner.disposed.is_cancelled() {
        return false;
    }
    match result {
        Ok(records) => {
            if !inner.gate.try_apply(token) {
                debug!(token, "discarding stale status response");
                return false;
            }
            let halt = all_terminal(&records);
            let _ = inner.events.send(PollerEvent::Documents(records));
            halt
        }
        Err(err) => {
            warn!(error = %err, "status fetch failed");
            let _ = inner.events.send(PollerEvent::FetchFailed(err.to_string()));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_applies_in_issue_order() {
        let gate = ResponseGate::default();
        let first = gate.issue();
        let second = gate.issue();
        assert!(gate.try_apply(first));
        assert!(gate.try_apply(second));
    }

    #[test]
    fn test_gate_discards_stale_response() {
        let gate = ResponseGate::default();
        let older = gate.issue();
        let newer = gate.issue();
        // The newer request resolved first.
        assert!(gate.try_apply(newer));
        assert!(!gate.try_apply(older));
    }

    #[test]
    fn test_gate_rejects_replay_of_applied_token() {
        let gate = ResponseGate::default();
        let token = gate.issue();
        assert!(gate.try_apply(token));
        assert!(!gate.try_apply(token));
    }
}
