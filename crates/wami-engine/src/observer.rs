use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use wami_contracts::events::{EventLog, SessionEvent};
use wami_contracts::flows::Flow;
use wami_contracts::WamiError;

use crate::provenance::{InputImage, WriteHandle};

/// What the UI shows for one output. `origin` is the first input's handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDisplay {
    pub name: String,
    pub size: usize,
    pub origin: WriteHandle,
}

/// UI-facing signals from the session. All methods default to no-ops.
pub trait SessionObserver: Send + Sync {
    fn running_changed(&self, _running: bool) {}
    fn flow_selected(&self, _flow: &Flow) {}
    fn inputs_published(&self, _inputs: &[InputImage]) {}
    fn outputs_published(&self, _outputs: &[OutputDisplay]) {}
    fn auto_run_scheduled(&self, _flow: &Flow, _delay: Duration) {}
    fn activation_scrubbed(&self, _query: &str) {}
    fn activation_failed(&self, _error: &WamiError) {}
}

pub struct NullObserver;

impl SessionObserver for NullObserver {}

/// Records session signals into the event log.
pub struct EventObserver {
    log: Arc<EventLog>,
}

impl EventObserver {
    pub fn new(log: Arc<EventLog>) -> Self {
        Self { log }
    }

    fn record(&self, event: SessionEvent) {
        if let Err(err) = self.log.record(event) {
            warn!(path = %self.log.path().display(), error = %err, "event record failed");
        }
    }
}

impl SessionObserver for EventObserver {
    fn running_changed(&self, running: bool) {
        self.record(SessionEvent::RunState { running });
    }

    fn flow_selected(&self, flow: &Flow) {
        self.record(SessionEvent::FlowSelected {
            flow_id: flow.id.clone(),
            name: flow.name.clone(),
            steps: flow.steps.len(),
        });
    }

    fn inputs_published(&self, inputs: &[InputImage]) {
        self.record(SessionEvent::InputsPublished {
            names: inputs.iter().map(|input| input.file.name.clone()).collect(),
        });
    }

    fn outputs_published(&self, outputs: &[OutputDisplay]) {
        self.record(SessionEvent::OutputsPublished {
            names: outputs.iter().map(|output| output.name.clone()).collect(),
            origin: outputs
                .first()
                .and_then(|output| output.origin.path())
                .map(|path| path.to_path_buf()),
        });
    }

    fn auto_run_scheduled(&self, flow: &Flow, delay: Duration) {
        self.record(SessionEvent::AutoRunScheduled {
            flow_id: flow.id.clone(),
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        });
    }

    fn activation_scrubbed(&self, query: &str) {
        self.record(SessionEvent::ActivationScrubbed {
            query: query.to_string(),
        });
    }

    fn activation_failed(&self, error: &WamiError) {
        self.record(SessionEvent::ActivationFailed {
            error: error.to_string(),
        });
    }
}
