//! Task Delegate Abstraction
//!
//! Transports report task lifecycle events to a [`TaskDelegate`]. A delegate
//! declares up front which events it handles through
//! [`capabilities`](TaskDelegate::capabilities); events outside that set are
//! never routed to it, and whoever dispatches falls back to the next handler
//! or to the documented default of the event.

use bytes::Bytes;

use crate::error::BridgeError;
use crate::transport::{Request, Response, TaskMetrics, TransferProgress, TransportTask};

/// Events a delegate can opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DelegateEvent {
    /// Default: [`ResponseDisposition::Allow`]
    ReceiveResponse = 1 << 0,
    ReceiveData = 1 << 1,
    SendBodyData = 1 << 2,
    WriteData = 1 << 3,
    /// Default: follow the proposed request unchanged
    Redirection = 1 << 4,
    FinishCollectingMetrics = 1 << 5,
    Complete = 1 << 6,
    /// Session-level only
    BecomeInvalid = 1 << 7,
}

impl DelegateEvent {
    pub const ALL: [DelegateEvent; 8] = [
        DelegateEvent::ReceiveResponse,
        DelegateEvent::ReceiveData,
        DelegateEvent::SendBodyData,
        DelegateEvent::WriteData,
        DelegateEvent::Redirection,
        DelegateEvent::FinishCollectingMetrics,
        DelegateEvent::Complete,
        DelegateEvent::BecomeInvalid,
    ];
}

/// Set of [`DelegateEvent`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventSet(u16);

impl EventSet {
    pub const NONE: EventSet = EventSet(0);
    pub const ALL: EventSet = EventSet(0xff);

    pub const fn with(self, event: DelegateEvent) -> Self {
        EventSet(self.0 | event as u16)
    }

    pub const fn without(self, event: DelegateEvent) -> Self {
        EventSet(self.0 & !(event as u16))
    }

    pub const fn contains(self, event: DelegateEvent) -> bool {
        self.0 & event as u16 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<DelegateEvent> for EventSet {
    fn from_iter<I: IntoIterator<Item = DelegateEvent>>(iter: I) -> Self {
        iter.into_iter().fold(EventSet::NONE, EventSet::with)
    }
}

/// What to do with a response whose headers just arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseDisposition {
    #[default]
    Allow,
    /// Cancel the task; it completes with [`BridgeError::Cancelled`].
    Cancel,
}

/// Receiver of task lifecycle events.
///
/// Every method has a default implementation producing the event's default
/// outcome, so implementors only override what they list in
/// [`capabilities`](TaskDelegate::capabilities).
pub trait TaskDelegate: Send + Sync {
    /// Events this delegate handles. Read once, when the delegate is
    /// registered.
    fn capabilities(&self) -> EventSet;

    fn did_receive_response(
        &self,
        task: &dyn TransportTask,
        response: &Response,
    ) -> ResponseDisposition {
        let _ = (task, response);
        ResponseDisposition::Allow
    }

    fn did_receive_data(&self, task: &dyn TransportTask, data: &Bytes) {
        let _ = (task, data);
    }

    fn did_send_body_data(&self, task: &dyn TransportTask, progress: TransferProgress) {
        let _ = (task, progress);
    }

    fn did_write_data(&self, task: &dyn TransportTask, progress: TransferProgress) {
        let _ = (task, progress);
    }

    /// Return the request to follow, or `None` to stop and deliver the
    /// redirect response as the final one.
    fn will_perform_redirection(
        &self,
        task: &dyn TransportTask,
        response: &Response,
        new_request: Request,
    ) -> Option<Request> {
        let _ = (task, response);
        Some(new_request)
    }

    fn did_finish_collecting_metrics(&self, task: &dyn TransportTask, metrics: &TaskMetrics) {
        let _ = (task, metrics);
    }

    fn did_complete(&self, task: &dyn TransportTask, error: Option<&BridgeError>) {
        let _ = (task, error);
    }

    fn did_become_invalid(&self, error: Option<&BridgeError>) {
        let _ = error;
    }
}
