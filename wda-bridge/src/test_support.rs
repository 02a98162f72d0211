//! Stubs shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{FatalReason, TransportError};
use crate::escalation::{EscalationPolicy, SharedEscalation};
use crate::facts::{Destination, Fact};
use crate::gateway::{BackendRequest, BackendResponse, Gateway, Method, Transport};
use crate::ports::{FactSink, GroupInfo, GroupResolver, Lifecycle, Notifier};

type Scripted = Result<BackendResponse, TransportError>;

/// Transport answering from a per-route script.
///
/// Each route holds a queue; the last entry is sticky. Unscripted routes
/// answer `200 {"value":null}`.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
    requests: Mutex<Vec<BackendRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: Method, path: &str, body: &str) {
        self.push(method, path, Ok(BackendResponse::ok(body.as_bytes().to_vec())));
    }

    pub fn fail(&self, method: Method, path: &str, err: TransportError) {
        self.push(method, path, Err(err));
    }

    fn push(&self, method: Method, path: &str, outcome: Scripted) {
        self.routes
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(outcome);
    }

    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn last_body(&self, method: Method, path: &str) -> Option<serde_json::Value> {
        self.requests
            .lock()
            .iter()
            .rev()
            .find(|r| r.method == method && r.path == path)
            .and_then(|r| r.body.clone())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &BackendRequest) -> Result<BackendResponse, TransportError> {
        self.requests.lock().push(request.clone());
        let mut routes = self.routes.lock();
        match routes.get_mut(&(request.method, request.path.clone())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(default_answer),
            Some(queue) => queue.front().cloned().unwrap_or_else(default_answer),
            None => default_answer(),
        }
    }
}

fn default_answer() -> Scripted {
    Ok(BackendResponse::ok(br#"{"value":null}"#.to_vec()))
}

#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn set_device_temporary_unavailable(&self, reason: &str) {
        self.calls.lock().push(format!("unavailable: {reason}"));
    }

    fn set_device_absent(&self, reason: &str) {
        self.calls.lock().push(format!("absent: {reason}"));
    }
}

#[derive(Default)]
pub struct RecordingLifecycle {
    reasons: Mutex<Vec<FatalReason>>,
}

impl RecordingLifecycle {
    pub fn fatal_count(&self) -> usize {
        self.reasons.lock().len()
    }
}

impl Lifecycle for RecordingLifecycle {
    fn fatal(&self, reason: &FatalReason) {
        self.reasons.lock().push(reason.clone());
    }
}

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(Destination, Fact)>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<(Destination, Fact)> {
        self.sent.lock().clone()
    }

    pub fn facts(&self) -> Vec<Fact> {
        self.sent.lock().iter().map(|(_, f)| f.clone()).collect()
    }
}

impl FactSink for RecordingSink {
    fn send(&self, destination: Destination, fact: Fact) {
        self.sent.lock().push((destination, fact));
    }
}

/// Group resolver returning a fixed membership.
pub struct StaticGroup(pub Option<GroupInfo>);

#[async_trait]
impl GroupResolver for StaticGroup {
    async fn current(&self) -> Option<GroupInfo> {
        self.0.clone()
    }
}

/// Everything a component under test needs, wired to recording stubs.
pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub notifier: Arc<RecordingNotifier>,
    pub lifecycle: Arc<RecordingLifecycle>,
    pub sink: Arc<RecordingSink>,
    pub escalation: SharedEscalation,
    pub gateway: Gateway,
}

impl Harness {
    pub fn new(transport: ScriptedTransport) -> Self {
        let transport = Arc::new(transport);
        let notifier = Arc::new(RecordingNotifier::default());
        let lifecycle = Arc::new(RecordingLifecycle::default());
        let escalation = EscalationPolicy::new(notifier.clone(), lifecycle.clone()).shared();
        let gateway = Gateway::new(transport.clone(), escalation.clone());
        Self {
            transport,
            notifier,
            lifecycle,
            sink: Arc::new(RecordingSink::default()),
            escalation,
            gateway,
        }
    }
}
