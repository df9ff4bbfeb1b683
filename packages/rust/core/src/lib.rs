//! Workflow orchestration for PageChat.
//!
//! This crate ties the request client, readiness poller, session ledger and
//! incremental renderer together behind a single [`Controller`]. Surfaces
//! implement [`View`] to observe it.

pub mod busy;
pub mod controller;
pub mod ledger;
pub mod renderer;
pub mod view;

#[cfg(any(test, feature = "testing"))]
pub mod test_support;

pub use busy::{BusyFlag, BusyGuard};
pub use controller::{
    Controller, SCAN_SUGGESTIONS, ScanOutcome, SendOutcome, TargetChange, WorkflowState,
};
pub use ledger::{HISTORY_KEY, LAST_ACTIVITY_KEY, LEGACY_HISTORY_KEY, SessionLedger};
pub use renderer::{RenderOutcome, Renderer, Reply, tokenize};
pub use view::{
    AnalysisView, CURSOR, ConnectionPhase, EntryId, RenderEvent, ResponseMeta, SilentView, View,
};
