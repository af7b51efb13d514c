//! Progress events emitted while a tenant is moved between buckets.
//!
//! Events are purely observational. A sink must never influence the outcome
//! of a migration, so `emit` cannot fail.

use serde::Serialize;

/// One step of a running migration.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "step", content = "arg", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// The target bucket is about to be created.
    Create,
    /// Total number of objects to move, emitted once before copying.
    Count(usize),
    /// The object count exceeds the configured cap; the run aborts next.
    MaxFilesReached,
    /// A copy unit started: 1 in serial mode, the wave size otherwise.
    Copy(usize),
    /// A tolerated per-object failure.
    Warn(String),
    /// Copy phase finished, the bucket assignment is about to be rewritten.
    Config,
    /// A delete batch of the given size is about to run.
    Delete(usize),
    /// The run finished successfully.
    Done,
}

impl ProgressEvent {
    /// Wire name of the step.
    pub fn step(&self) -> &'static str {
        match self {
            ProgressEvent::Create => "create",
            ProgressEvent::Count(_) => "count",
            ProgressEvent::MaxFilesReached => "max_files_reached",
            ProgressEvent::Copy(_) => "copy",
            ProgressEvent::Warn(_) => "warn",
            ProgressEvent::Config => "config",
            ProgressEvent::Delete(_) => "delete",
            ProgressEvent::Done => "done",
        }
    }
}

/// Receiver of progress events.
pub trait ProgressSink: Send {
    fn emit(&mut self, event: ProgressEvent);
}

/// Sink that keeps every event in order, used by the admin API to return the
/// full event log of a run.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<ProgressEvent>,
}

impl ProgressSink for RecordingSink {
    fn emit(&mut self, event: ProgressEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_as_step_and_argument() {
        let json = serde_json::to_value(ProgressEvent::Copy(3)).unwrap();
        assert_eq!(json, serde_json::json!({"step": "copy", "arg": 3}));

        let json = serde_json::to_value(ProgressEvent::Warn("gone".into())).unwrap();
        assert_eq!(json, serde_json::json!({"step": "warn", "arg": "gone"}));

        let json = serde_json::to_value(ProgressEvent::MaxFilesReached).unwrap();
        assert_eq!(json, serde_json::json!({"step": "max_files_reached"}));
    }

    #[test]
    fn step_names_match_serialized_tags() {
        let events = [
            ProgressEvent::Create,
            ProgressEvent::Count(1),
            ProgressEvent::MaxFilesReached,
            ProgressEvent::Copy(1),
            ProgressEvent::Warn(String::new()),
            ProgressEvent::Config,
            ProgressEvent::Delete(1),
            ProgressEvent::Done,
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["step"], event.step());
        }
    }
}
