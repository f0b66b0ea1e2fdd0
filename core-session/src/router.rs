//! Delegate fan-out.
//!
//! The transport reports every task event to a single delegate. The router is
//! that delegate: it forwards each event to the task's per-call delegate when
//! one is registered and handles the event, otherwise to the session delegate
//! when it handles the event, otherwise it applies the event's default.
//!
//! Which events a delegate handles is read from
//! [`TaskDelegate::capabilities`] once, at registration.

use bridge_traits::{
    BridgeError, DelegateEvent, EventSet, Request, Response, ResponseDisposition, TaskDelegate,
    TaskId, TaskMetrics, TransferProgress, TransportTask,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Clone)]
struct Registered {
    delegate: Arc<dyn TaskDelegate>,
    events: EventSet,
}

impl Registered {
    fn new(delegate: Arc<dyn TaskDelegate>) -> Self {
        let events = delegate.capabilities();
        Self { delegate, events }
    }

    fn handling(&self, event: DelegateEvent) -> Option<Arc<dyn TaskDelegate>> {
        self.events
            .contains(event)
            .then(|| self.delegate.clone())
    }
}

pub struct DelegateRouter {
    session: Option<Registered>,
    per_task: Mutex<HashMap<TaskId, Registered>>,
}

impl DelegateRouter {
    pub fn new(session: Option<Arc<dyn TaskDelegate>>) -> Self {
        Self {
            session: session.map(Registered::new),
            per_task: Mutex::new(HashMap::new()),
        }
    }

    pub fn session_delegate(&self) -> Option<Arc<dyn TaskDelegate>> {
        self.session.as_ref().map(|registered| registered.delegate.clone())
    }

    /// Attach a per-call delegate to `task` until the task completes.
    pub fn register(&self, task: TaskId, delegate: Arc<dyn TaskDelegate>) {
        let registered = Registered::new(delegate);
        debug!(task_id = %task, events = ?registered.events, "Registered task delegate");
        self.per_task.lock().insert(task, registered);
    }

    pub fn unregister(&self, task: TaskId) {
        if self.per_task.lock().remove(&task).is_some() {
            trace!(task_id = %task, "Unregistered task delegate");
        }
    }

    pub fn registered_tasks(&self) -> usize {
        self.per_task.lock().len()
    }

    /// Delegate that receives `event` for `task`, if any.
    fn route(&self, task: TaskId, event: DelegateEvent) -> Option<Arc<dyn TaskDelegate>> {
        let per_call = self
            .per_task
            .lock()
            .get(&task)
            .and_then(|registered| registered.handling(event));

        per_call.or_else(|| {
            self.session
                .as_ref()
                .and_then(|registered| registered.handling(event))
        })
    }
}

impl fmt::Debug for DelegateRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateRouter")
            .field("session_events", &self.session.as_ref().map(|r| r.events))
            .field("registered_tasks", &self.registered_tasks())
            .finish()
    }
}

impl TaskDelegate for DelegateRouter {
    fn capabilities(&self) -> EventSet {
        EventSet::ALL
    }

    fn did_receive_response(
        &self,
        task: &dyn TransportTask,
        response: &Response,
    ) -> ResponseDisposition {
        match self.route(task.id(), DelegateEvent::ReceiveResponse) {
            Some(delegate) => delegate.did_receive_response(task, response),
            None => ResponseDisposition::Allow,
        }
    }

    fn did_receive_data(&self, task: &dyn TransportTask, data: &Bytes) {
        if let Some(delegate) = self.route(task.id(), DelegateEvent::ReceiveData) {
            delegate.did_receive_data(task, data);
        }
    }

    fn did_send_body_data(&self, task: &dyn TransportTask, progress: TransferProgress) {
        if let Some(delegate) = self.route(task.id(), DelegateEvent::SendBodyData) {
            delegate.did_send_body_data(task, progress);
        }
    }

    fn did_write_data(&self, task: &dyn TransportTask, progress: TransferProgress) {
        if let Some(delegate) = self.route(task.id(), DelegateEvent::WriteData) {
            delegate.did_write_data(task, progress);
        }
    }

    fn will_perform_redirection(
        &self,
        task: &dyn TransportTask,
        response: &Response,
        new_request: Request,
    ) -> Option<Request> {
        match self.route(task.id(), DelegateEvent::Redirection) {
            Some(delegate) => delegate.will_perform_redirection(task, response, new_request),
            None => Some(new_request),
        }
    }

    fn did_finish_collecting_metrics(&self, task: &dyn TransportTask, metrics: &TaskMetrics) {
        if let Some(delegate) = self.route(task.id(), DelegateEvent::FinishCollectingMetrics) {
            delegate.did_finish_collecting_metrics(task, metrics);
        }
    }

    fn did_complete(&self, task: &dyn TransportTask, error: Option<&BridgeError>) {
        if let Some(delegate) = self.route(task.id(), DelegateEvent::Complete) {
            delegate.did_complete(task, error);
        }
        self.unregister(task.id());
    }

    fn did_become_invalid(&self, error: Option<&BridgeError>) {
        if let Some(delegate) = self
            .session
            .as_ref()
            .and_then(|registered| registered.handling(DelegateEvent::BecomeInvalid))
        {
            delegate.did_become_invalid(error);
        }
        self.per_task.lock().clear();
    }
}
