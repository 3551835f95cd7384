//! Job descriptors.

use serde::{Deserialize, Serialize};

pub use crate::task::{JobId, TaskId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Completed,
}

/// A bag of tasks. The job turns [Running](JobState::Running) as soon as any
/// of its tasks is placed and [Completed](JobState::Completed) when all of
/// them finished.
#[derive(Clone, Debug)]
pub struct JobDescriptor {
    pub id: JobId,
    pub name: String,
    pub state: JobState,
    pub tasks: Vec<TaskId>,
}

impl JobDescriptor {
    pub fn new(id: JobId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: JobState::Pending,
            tasks: Vec::new(),
        }
    }
}
