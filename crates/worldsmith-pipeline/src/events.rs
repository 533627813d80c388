//! Pipeline event system for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! callers (the CLI, a job wrapper) can follow a run without coupling to the
//! orchestrator internals.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use worldsmith_types::{StageName, VersionOrigin};

/// Events emitted during a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        run_id: Uuid,
        topic: String,
    },
    RunCompleted {
        run_id: Uuid,
        duration_ms: u64,
    },
    RunFailed {
        run_id: Uuid,
        error: String,
    },
    StageStarted {
        stage: StageName,
    },
    StageCompleted {
        stage: StageName,
        duration_ms: u64,
        attempts: u32,
    },
    StageRetrying {
        stage: StageName,
        attempt: u32,
        reason: String,
    },
    DocumentRevised {
        stage: StageName,
        version: u32,
        origin: VersionOrigin,
    },
    AssetResolved {
        asset_id: String,
    },
    AssetFailed {
        asset_id: String,
        critical: bool,
        error: String,
    },
    GateChecked {
        passed: bool,
        codes: Vec<String>,
    },
    AutoFixAttempted {
        attempt: u32,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
