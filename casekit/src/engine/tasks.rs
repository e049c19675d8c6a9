//! Human task pairing.
//!
//! The engine does not own the task list. It tells a [`TaskList`] when an
//! active human task appears, is suspended or resumed, and when it closes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::ExecutionId;

/// Task record paired with an active human task execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanTask {
    pub execution: ExecutionId,
    pub activity_id: String,
    pub suspended: bool,
}

/// Collaborator receiving task pairing effects after a command commits.
pub trait TaskList {
    fn create(&mut self, task: HumanTask);

    fn remove(&mut self, execution: ExecutionId) -> Option<HumanTask>;

    fn set_suspended(&mut self, execution: ExecutionId, suspended: bool);
}

/// Task effect buffered during a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TaskEffect {
    Create(HumanTask),
    Remove(ExecutionId),
    Suspend(ExecutionId, bool),
}

impl TaskEffect {
    pub(crate) fn apply<T: TaskList + ?Sized>(self, tasks: &mut T) {
        match self {
            TaskEffect::Create(task) => tasks.create(task),
            TaskEffect::Remove(execution) => {
                tasks.remove(execution);
            }
            TaskEffect::Suspend(execution, suspended) => tasks.set_suspended(execution, suspended),
        }
    }
}

/// In-memory task list keyed by execution id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskList {
    tasks: BTreeMap<ExecutionId, HumanTask>,
}

impl InMemoryTaskList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, execution: ExecutionId) -> Option<&HumanTask> {
        self.tasks.get(&execution)
    }

    /// Tasks belonging to one case instance, ordered by execution id.
    pub fn for_case(&self, case: u64) -> Vec<&HumanTask> {
        self.tasks
            .values()
            .filter(|task| task.execution.case == case)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl TaskList for InMemoryTaskList {
    fn create(&mut self, task: HumanTask) {
        self.tasks.insert(task.execution, task);
    }

    fn remove(&mut self, execution: ExecutionId) -> Option<HumanTask> {
        self.tasks.remove(&execution)
    }

    fn set_suspended(&mut self, execution: ExecutionId, suspended: bool) {
        if let Some(task) = self.tasks.get_mut(&execution) {
            task.suspended = suspended;
        }
    }
}
