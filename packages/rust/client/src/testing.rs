//! Scripted in-memory [`Transport`] for tests.
//!
//! Each route (full request path) has a queue of [`Step`]s. Steps are consumed
//! in order and the last one repeats forever, so `[Empty, Ready]` means "not
//! ready once, then ready from then on".

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pagechat_shared::{PageChatError, Result};
use serde_json::Value;
use tokio::time::Instant;

use crate::transport::{ApiRequest, Transport};

/// Full path of the index route with the default prefix.
pub const INDEX: &str = "/api/v1/index";
/// Full path of the analyze route with the default prefix.
pub const ANALYZE: &str = "/api/v1/analyze";
/// Full path of the query route with the default prefix.
pub const QUERY: &str = "/api/v1/query";
/// Path of the health route.
pub const HEALTH: &str = "/";

#[derive(Debug, Clone)]
enum Outcome {
    Reply(Value),
    Fail(PageChatError),
    Hang,
}

/// One scripted response.
#[derive(Debug, Clone)]
pub struct Step {
    outcome: Outcome,
    delay: Duration,
}

impl Step {
    pub fn reply(value: Value) -> Self {
        Self {
            outcome: Outcome::Reply(value),
            delay: Duration::ZERO,
        }
    }

    pub fn fail(error: PageChatError) -> Self {
        Self {
            outcome: Outcome::Fail(error),
            delay: Duration::ZERO,
        }
    }

    /// Never answers; only a timeout or cancellation ends the request.
    pub fn hang() -> Self {
        Self {
            outcome: Outcome::Hang,
            delay: Duration::ZERO,
        }
    }

    /// Answer only after `delay` has elapsed.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A request the transport has seen.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub path: String,
    pub body: Option<Value>,
    pub at: Instant,
}

/// In-memory transport driven by per-route scripts.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    abandoned: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the responses for `path`.
    pub fn route(self, path: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.set_route(path, steps);
        self
    }

    /// Replace the script for `path` on a shared transport.
    pub fn set_route(&self, path: &str, steps: impl IntoIterator<Item = Step>) {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        routes.insert(path.to_string(), steps.into_iter().collect());
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of calls received for `path`.
    pub fn calls_to(&self, path: &str) -> usize {
        self.calls().iter().filter(|c| c.path == path).count()
    }

    /// Highest number of requests that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Requests dropped before they produced an answer (timed out or cancelled).
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    fn next_step(&self, path: &str) -> Option<Step> {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        let queue = routes.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

struct InFlight<'a> {
    transport: &'a ScriptedTransport,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn enter(transport: &'a ScriptedTransport) -> Self {
        let now = transport.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        transport.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self {
            transport,
            finished: false,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.transport.in_flight.fetch_sub(1, Ordering::SeqCst);
        if !self.finished {
            self.transport.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<Value> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                path: request.path.clone(),
                body: request.body.clone(),
                at: Instant::now(),
            });

        let mut guard = InFlight::enter(self);
        let Some(step) = self.next_step(&request.path) else {
            guard.finished = true;
            return Err(PageChatError::Network(format!(
                "no scripted response for {}",
                request.path
            )));
        };

        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        let result = match step.outcome {
            Outcome::Reply(value) => Ok(value),
            Outcome::Fail(error) => Err(error),
            Outcome::Hang => std::future::pending().await,
        };
        guard.finished = true;
        result
    }
}
