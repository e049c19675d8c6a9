//! Shared deterministic types for the case engine core.
//!
//! These types define stable contracts between core components and the
//! runtime. They carry no behaviour that depends on external state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one case execution.
///
/// `case` names the case instance; `node` is the slot of the execution inside
/// that instance's arena. The case plan (root) always sits in slot 0, so the
/// root's id doubles as the case instance id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionId {
    pub case: u64,
    pub node: u32,
}

impl ExecutionId {
    pub const ROOT_NODE: u32 = 0;

    pub fn root(case: u64) -> Self {
        Self {
            case,
            node: Self::ROOT_NODE,
        }
    }

    pub fn is_root(&self) -> bool {
        self.node == Self::ROOT_NODE
    }

    /// Id of the case instance this execution belongs to.
    pub fn case_instance(&self) -> Self {
        Self::root(self.case)
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.case, self.node)
    }
}

/// Lifecycle state of a case execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Available,
    Enabled,
    Active,
    Suspended,
    Completed,
    Terminated,
    Closed,
}

impl State {
    /// Completed, terminated and closed executions never transition again
    /// (except completed/terminated to closed).
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Completed | State::Terminated | State::Closed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Available => "available",
            State::Enabled => "enabled",
            State::Active => "active",
            State::Suspended => "suspended",
            State::Completed => "completed",
            State::Terminated => "terminated",
            State::Closed => "closed",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard lifecycle events emitted by transitions and referenced by on-parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StandardEvent {
    Enable,
    Start,
    ManualStart,
    Occur,
    Complete,
    Exit,
    Terminate,
    ParentTerminate,
    Suspend,
    ParentSuspend,
    Resume,
    ParentResume,
    Close,
}

impl StandardEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            StandardEvent::Enable => "enable",
            StandardEvent::Start => "start",
            StandardEvent::ManualStart => "manualStart",
            StandardEvent::Occur => "occur",
            StandardEvent::Complete => "complete",
            StandardEvent::Exit => "exit",
            StandardEvent::Terminate => "terminate",
            StandardEvent::ParentTerminate => "parentTerminate",
            StandardEvent::Suspend => "suspend",
            StandardEvent::ParentSuspend => "parentSuspend",
            StandardEvent::Resume => "resume",
            StandardEvent::ParentResume => "parentResume",
            StandardEvent::Close => "close",
        }
    }
}

impl fmt::Display for StandardEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of plan item an execution was instantiated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    CasePlan,
    Stage,
    HumanTask,
    Task,
    Milestone,
}

impl ActivityKind {
    /// Stages and the case plan own child executions.
    pub fn is_container(self) -> bool {
        matches!(self, ActivityKind::CasePlan | ActivityKind::Stage)
    }
}

/// Whether a sentry gates entry into or exit from its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriterionKind {
    Entry,
    Exit,
}

/// How on-parts combine into the sentry's join condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    And,
    Or,
}

/// Why an execution is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendOrigin {
    /// Suspended by a command addressed to the execution itself.
    Own,
    /// Suspended because an ancestor was suspended.
    Parent,
}

/// Bookkeeping kept while an execution is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspension {
    /// State to restore on resume.
    pub previous: State,
    pub origin: SuspendOrigin,
}
