//! Callbacks through which the pipeline reports costs and finished artifacts.

use super::{Workflow, WorkflowResult};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Narrow interface to the surrounding application.
pub trait ArtifactSink: Send + Sync {
    /// Called once validation has passed and before the first remote call.
    fn on_cost_incurred(&self, workflow: Workflow, amount: u32);

    fn on_cost_refunded(&self, workflow: Workflow, amount: u32);

    fn on_artifact_ready(&self, workflow: Workflow, artifact: &WorkflowResult);
}

/// Sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl ArtifactSink for LoggingSink {
    fn on_cost_incurred(&self, workflow: Workflow, amount: u32) {
        info!("[{}] Charged {} credits", workflow.name(), amount);
    }

    fn on_cost_refunded(&self, workflow: Workflow, amount: u32) {
        info!("[{}] Refunded {} credits", workflow.name(), amount);
    }

    fn on_artifact_ready(&self, workflow: Workflow, artifact: &WorkflowResult) {
        info!("[{}] Artifact ready: {}", workflow.name(), artifact.kind());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    CostIncurred(Workflow, u32),
    CostRefunded(Workflow, u32),
    ArtifactReady(Workflow),
}

/// Sink that records every callback, for tests and harnesses.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Credits charged minus credits refunded.
    pub fn net_cost(&self) -> i64 {
        self.events().iter().fold(0, |total, event| match event {
            SinkEvent::CostIncurred(_, amount) => total + i64::from(*amount),
            SinkEvent::CostRefunded(_, amount) => total - i64::from(*amount),
            SinkEvent::ArtifactReady(_) => total,
        })
    }

    fn record(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl ArtifactSink for RecordingSink {
    fn on_cost_incurred(&self, workflow: Workflow, amount: u32) {
        self.record(SinkEvent::CostIncurred(workflow, amount));
    }

    fn on_cost_refunded(&self, workflow: Workflow, amount: u32) {
        self.record(SinkEvent::CostRefunded(workflow, amount));
    }

    fn on_artifact_ready(&self, workflow: Workflow, _artifact: &WorkflowResult) {
        self.record(SinkEvent::ArtifactReady(workflow));
    }
}
