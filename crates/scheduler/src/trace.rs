//! Trace of scheduling decisions and task lifecycle transitions.

use serde::{Deserialize, Serialize};

use crate::resource::ResourceId;
use crate::task::{JobId, TaskId};

/// One trace event.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TraceEvent {
    /// Task entered the runnable set.
    TaskSubmitted {
        /// Time of the event.
        time_us: u64,
        /// Owning job.
        job_id: JobId,
        /// Task id.
        task_id: TaskId,
    },
    /// Task was placed on a PU.
    TaskPlaced {
        /// Time of the event.
        time_us: u64,
        /// Owning job.
        job_id: JobId,
        /// Task id.
        task_id: TaskId,
        /// PU the task was placed on.
        resource: ResourceId,
    },
    /// Task finished.
    TaskCompleted {
        /// Time of the event.
        time_us: u64,
        /// Owning job.
        job_id: JobId,
        /// Task id.
        task_id: TaskId,
    },
    /// Task was evicted from its PU.
    TaskEvicted {
        /// Time of the event.
        time_us: u64,
        /// Owning job.
        job_id: JobId,
        /// Task id.
        task_id: TaskId,
    },
    /// Task failed on its PU.
    TaskFailed {
        /// Time of the event.
        time_us: u64,
        /// Owning job.
        job_id: JobId,
        /// Task id.
        task_id: TaskId,
    },
    /// Task moved between PUs.
    TaskMigrated {
        /// Time of the event.
        time_us: u64,
        /// Owning job.
        job_id: JobId,
        /// Task id.
        task_id: TaskId,
        /// Old PU.
        from: ResourceId,
        /// New PU.
        to: ResourceId,
    },
    /// All tasks of a job finished.
    JobCompleted {
        /// Time of the event.
        time_us: u64,
        /// Job id.
        job_id: JobId,
    },
}

impl TraceEvent {
    /// Time of an event.
    pub fn time_us(&self) -> u64 {
        match self {
            TraceEvent::TaskSubmitted { time_us, .. }
            | TraceEvent::TaskPlaced { time_us, .. }
            | TraceEvent::TaskCompleted { time_us, .. }
            | TraceEvent::TaskEvicted { time_us, .. }
            | TraceEvent::TaskFailed { time_us, .. }
            | TraceEvent::TaskMigrated { time_us, .. }
            | TraceEvent::JobCompleted { time_us, .. } => *time_us,
        }
    }
}

/// Trace of a simulation.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    /// Events in arrival order.
    pub events: Vec<TraceEvent>,
}

impl Trace {
    /// Creates an empty trace.
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Adds event to a trace.
    pub fn log(&mut self, event: TraceEvent) {
        self.events.push(event);
    }
}
