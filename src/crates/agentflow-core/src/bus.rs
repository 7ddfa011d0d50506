//! The signal bus: pub/sub dispatch, scoped context propagation, bounded
//! history, channel/attachment lifecycle, and the session status state
//! machine (running/paused/aborted/...).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use agentflow_store::{CompiledPattern, Signal};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::context::{self, ScopedContext};
use crate::error::{CoreError, Result};

/// What the bus hands to each matching subscriber: the raw signal plus the
/// scoped context that was active at emit time.
#[derive(Debug, Clone)]
pub struct EnrichedSignal {
    pub signal: Signal,
    pub context: ScopedContext,
}

pub type Handler = Arc<dyn Fn(&EnrichedSignal) + Send + Sync>;
pub type Cleanup = Box<dyn FnOnce() + Send>;
/// An attachment observes (and may inject into) the bus for the run's
/// duration. Called once on `start()`; its returned cleanup runs on `stop()`.
pub type Attachment = Arc<dyn Fn(&Bus) -> Cleanup + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Running,
    Paused,
    Complete,
    Aborted,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct AbortOptions {
    pub resumable: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PausedSession {
    pub session_id: String,
    pub paused_at: chrono::DateTime<chrono::Utc>,
    pub pause_reason: Option<String>,
    pub current_node_index: usize,
    pub current_node_id: Option<String>,
    pub flow_name: Option<String>,
    pub outputs: serde_json::Value,
    pub pending_messages: Vec<serde_json::Value>,
}

enum Filter {
    Patterns(Vec<CompiledPattern>),
    Predicate(Arc<dyn Fn(&Signal) -> bool + Send + Sync>),
}

impl Filter {
    fn matches(&self, signal: &Signal) -> bool {
        match self {
            Filter::Patterns(patterns) => patterns.iter().any(|p| p.matches(&signal.name)),
            Filter::Predicate(f) => f(signal),
        }
    }
}

struct Subscription {
    id: u64,
    filter: Filter,
    handler: Handler,
}

struct Inner {
    session_id: String,
    max_history: usize,
    history: RwLock<VecDeque<Signal>>,
    subscribers: RwLock<Vec<Subscription>>,
    next_sub_id: AtomicU64,
    seq: AtomicU64,
    started: AtomicBool,
    attachments: RwLock<Vec<Attachment>>,
    cleanups: RwLock<Vec<Cleanup>>,
    status: RwLock<SessionStatus>,
    paused: RwLock<Option<PausedSession>>,
    cancellation: RwLock<CancellationToken>,
}

/// Cheaply cloneable handle to a signal bus; clones share all state.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<Inner>,
}

impl Bus {
    pub fn new(session_id: impl Into<String>, max_history: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                session_id: session_id.into(),
                max_history,
                history: RwLock::new(VecDeque::new()),
                subscribers: RwLock::new(Vec::new()),
                next_sub_id: AtomicU64::new(1),
                seq: AtomicU64::new(0),
                started: AtomicBool::new(false),
                attachments: RwLock::new(Vec::new()),
                cleanups: RwLock::new(Vec::new()),
                status: RwLock::new(SessionStatus::Idle),
                paused: RwLock::new(None),
                cancellation: RwLock::new(CancellationToken::new()),
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn status(&self) -> SessionStatus {
        *self.inner.status.read().unwrap()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancellation.read().unwrap().clone()
    }

    /// Stamps `id`/`timestamp` if unset, attaches the calling task's scoped
    /// context, records into bounded history, then dispatches to every
    /// matching subscriber in registration order. A subscriber panicking or
    /// returning is isolated from the rest — logged, not propagated.
    pub fn emit(&self, mut signal: Signal) {
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        signal.timestamp = seq;
        let ctx = context::current(&self.inner.session_id);

        {
            let mut history = self.inner.history.write().unwrap();
            history.push_back(signal.clone());
            while history.len() > self.inner.max_history {
                history.pop_front();
            }
        }

        let enriched = EnrichedSignal {
            signal,
            context: ctx,
        };

        let subscribers: Vec<Handler> = {
            let guard = self.inner.subscribers.read().unwrap();
            guard
                .iter()
                .filter(|s| s.filter.matches(&enriched.signal))
                .map(|s| s.handler.clone())
                .collect()
        };

        for handler in subscribers {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler(&enriched);
            }));
            if let Err(_panic) = result {
                tracing::error!(signal = %enriched.signal.name, "subscriber panicked, isolating");
            }
        }
    }

    pub fn emit_named(&self, name: impl Into<String>, payload: serde_json::Value) {
        self.emit(Signal::named(name, payload));
    }

    pub fn history(&self) -> Vec<Signal> {
        self.inner.history.read().unwrap().iter().cloned().collect()
    }

    /// Subscribe with one or more glob patterns. Returns an idempotent
    /// unsubscribe thunk that owns a handle to this bus, so it can be
    /// stored and called from anywhere without borrowing the bus.
    pub fn subscribe(&self, patterns: &[&str], handler: Handler) -> impl FnMut() {
        let compiled = patterns.iter().map(|p| CompiledPattern::compile(p)).collect();
        self.subscribe_filtered(Filter::Patterns(compiled), handler)
    }

    pub fn subscribe_where(
        &self,
        predicate: Arc<dyn Fn(&Signal) -> bool + Send + Sync>,
        handler: Handler,
    ) -> impl FnMut() {
        self.subscribe_filtered(Filter::Predicate(predicate), handler)
    }

    fn subscribe_filtered(&self, filter: Filter, handler: Handler) -> impl FnMut() {
        let id = self.inner.next_sub_id.fetch_add(1, Ordering::SeqCst);
        self.inner.subscribers.write().unwrap().push(Subscription { id, filter, handler });
        let bus = self.clone();
        let mut done = false;
        move || {
            if done {
                return;
            }
            done = true;
            bus.inner.subscribers.write().unwrap().retain(|s| s.id != id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().unwrap().len()
    }

    /// Merge `delta` into the current scope for the duration of `fut`.
    pub async fn scoped<F, Fut, T>(&self, delta: crate::context::ContextDelta, fut: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let base = context::current(&self.inner.session_id);
        context::scoped(&base, delta, fut).await
    }

    pub fn attach(&self, attachment: Attachment) {
        self.inner.attachments.write().unwrap().push(attachment.clone());
        if self.inner.started.load(Ordering::SeqCst) {
            let cleanup = attachment(self);
            self.inner.cleanups.write().unwrap().push(cleanup);
        }
    }

    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.inner.status.write().unwrap() = SessionStatus::Running;
        let attachments: Vec<Attachment> = self.inner.attachments.read().unwrap().clone();
        for attachment in attachments {
            let cleanup = attachment(self);
            self.inner.cleanups.write().unwrap().push(cleanup);
        }
    }

    pub fn stop(&self) {
        if !self.inner.started.swap(false, Ordering::SeqCst) {
            return;
        }
        let cleanups: Vec<Cleanup> = std::mem::take(&mut self.inner.cleanups.write().unwrap());
        for cleanup in cleanups {
            cleanup();
        }
    }

    pub fn paused_session(&self) -> Option<PausedSession> {
        self.inner.paused.read().unwrap().clone()
    }

    /// Record the executor's actual resume point. Must be called by the
    /// executor before it finishes yielding on a resumable abort.
    pub fn update_paused_state(
        &self,
        current_node_index: usize,
        current_node_id: Option<String>,
        flow_name: Option<String>,
        outputs: serde_json::Value,
    ) {
        if let Some(p) = self.inner.paused.write().unwrap().as_mut() {
            p.current_node_index = current_node_index;
            p.current_node_id = current_node_id;
            p.flow_name = flow_name;
            p.outputs = outputs;
        }
    }

    pub fn abort(&self, options: AbortOptions) -> Result<()> {
        let status = *self.inner.status.read().unwrap();
        if status != SessionStatus::Running && status != SessionStatus::Paused {
            return Ok(());
        }

        self.inner.cancellation.read().unwrap().cancel();

        if options.resumable {
            *self.inner.status.write().unwrap() = SessionStatus::Paused;
            *self.inner.paused.write().unwrap() = Some(PausedSession {
                session_id: self.inner.session_id.clone(),
                paused_at: chrono::Utc::now(),
                pause_reason: options.reason.clone(),
                current_node_index: 0,
                current_node_id: None,
                flow_name: None,
                outputs: json!({}),
                pending_messages: Vec::new(),
            });
            self.emit_named(
                "flow:paused",
                json!({ "sessionId": self.inner.session_id, "reason": options.reason }),
            );
        } else {
            *self.inner.status.write().unwrap() = SessionStatus::Aborted;
            *self.inner.paused.write().unwrap() = None;
            self.emit_named("session:abort", json!({ "reason": options.reason }));
        }
        Ok(())
    }

    pub fn resume(&self, session_id: &str, message: serde_json::Value) -> Result<()> {
        if session_id != self.inner.session_id {
            return Err(CoreError::SessionNotFound(session_id.to_string()));
        }
        let status = *self.inner.status.read().unwrap();
        if status != SessionStatus::Paused {
            return Err(CoreError::SessionAlreadyRunning(session_id.to_string()));
        }
        if message.is_null() {
            return Err(CoreError::validation("resume message must not be empty"));
        }

        *self.inner.cancellation.write().unwrap() = CancellationToken::new();

        if let Some(p) = self.inner.paused.write().unwrap().as_mut() {
            p.pending_messages.push(message.clone());
        }
        *self.inner.status.write().unwrap() = SessionStatus::Running;
        self.emit_named(
            "flow:resumed",
            json!({ "sessionId": session_id, "injectedMessages": 1 }),
        );
        self.emit_named("session:message", message);
        Ok(())
    }

    pub fn mark_complete(&self) {
        let status = *self.inner.status.read().unwrap();
        if status == SessionStatus::Aborted || status == SessionStatus::Failed {
            return;
        }
        *self.inner.status.write().unwrap() = SessionStatus::Complete;
        *self.inner.paused.write().unwrap() = None;
    }

    pub fn mark_failed(&self) {
        *self.inner.status.write().unwrap() = SessionStatus::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex;

    #[test]
    fn emit_assigns_monotonic_timestamps() {
        let bus = Bus::new("s1", 100);
        bus.emit(Signal::named("a", json!(null)));
        bus.emit(Signal::named("b", json!(null)));
        let hist = bus.history();
        assert!(hist[0].timestamp < hist[1].timestamp);
    }

    #[test]
    fn subscriber_receives_matching_signals_only() {
        let bus = Bus::new("s1", 100);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let _unsub = bus.subscribe(
            &["node:*"],
            Arc::new(move |_e| {
                c.fetch_add(1, AtomicOrdering::SeqCst);
            }),
        );
        bus.emit(Signal::named("node:start", json!(null)));
        bus.emit(Signal::named("agent:activated", json!(null)));
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = Bus::new("s1", 100);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut unsub = bus.subscribe(
            &["*"],
            Arc::new(move |_e| {
                c.fetch_add(1, AtomicOrdering::SeqCst);
            }),
        );
        bus.emit(Signal::named("x", json!(null)));
        unsub();
        bus.emit(Signal::named("y", json!(null)));
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn history_is_bounded() {
        let bus = Bus::new("s1", 3);
        for i in 0..10 {
            bus.emit(Signal::named(format!("s{i}"), json!(null)));
        }
        assert_eq!(bus.history().len(), 3);
    }

    #[test]
    fn one_subscriber_panicking_does_not_block_others() {
        let bus = Bus::new("s1", 10);
        let hit = Arc::new(Mutex::new(false));
        let h = hit.clone();
        let _a = bus.subscribe(&["*"], Arc::new(|_e| panic!("boom")));
        let _b = bus.subscribe(
            &["*"],
            Arc::new(move |_e| {
                *h.lock().unwrap() = true;
            }),
        );
        bus.emit(Signal::named("x", json!(null)));
        assert!(*hit.lock().unwrap());
    }

    #[test]
    fn abort_resumable_pauses_then_resume_reruns() {
        let bus = Bus::new("s1", 10);
        bus.start();
        bus.abort(AbortOptions {
            resumable: true,
            reason: Some("test".into()),
        })
        .unwrap();
        assert_eq!(bus.status(), SessionStatus::Paused);
        assert!(bus.paused_session().is_some());

        let err = bus.resume("unknown", json!("hi")).unwrap_err();
        assert!(matches!(err, CoreError::SessionNotFound(_)));

        bus.resume("s1", json!("continue")).unwrap();
        assert_eq!(bus.status(), SessionStatus::Running);

        let err = bus.resume("s1", json!("again")).unwrap_err();
        assert!(matches!(err, CoreError::SessionAlreadyRunning(_)));
    }

    #[test]
    fn terminal_abort_clears_paused_session() {
        let bus = Bus::new("s1", 10);
        bus.start();
        bus.abort(AbortOptions {
            resumable: true,
            reason: None,
        })
        .unwrap();
        bus.abort(AbortOptions::default()).unwrap();
        assert_eq!(bus.status(), SessionStatus::Aborted);
        assert!(bus.paused_session().is_none());
    }
}
