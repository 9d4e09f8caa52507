use brainflow_events::{EventBus, WorkflowEvent};
use tracing::warn;

/// Fire-and-forget workflow notifications.
///
/// Publishing never fails the workflow: bus errors are logged and dropped.
pub trait WorkflowEventSink: Send + Sync {
    fn emit(&self, event: WorkflowEvent);
}

impl<B> WorkflowEventSink for B
where
    B: EventBus<WorkflowEvent>,
{
    fn emit(&self, event: WorkflowEvent) {
        let event_type = event.event_type();
        if let Err(err) = self.publish(event) {
            warn!(event_type, error = ?err, "failed to publish workflow event");
        }
    }
}
