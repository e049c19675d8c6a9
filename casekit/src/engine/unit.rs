//! One command and its cascade, executed as a single unit of work.
//!
//! A [`UnitOfWork`] owns a working copy of the case instance. Command entry
//! points apply the first transitions directly; everything they cause (event
//! routing, stage activation, entry evaluation, completion checks) is queued
//! on an explicit FIFO work-list and drained by [`UnitOfWork::run`] until a
//! fixed point is reached. The caller swaps the working copy in only when the
//! whole unit succeeds.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::core::lifecycle::{self, Transition};
use crate::core::types::{ActivityKind, ExecutionId, StandardEvent, State, SuspendOrigin, Suspension};
use crate::core::variables::Variables;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::guard::GuardEvaluator;
use crate::engine::instance::{CaseExecution, CaseInstance};
use crate::engine::listener::{LifecycleListener, ListenerEvent, apply_declared};
use crate::engine::tasks::{HumanTask, TaskEffect};
use crate::io::config::EngineConfig;
use crate::model::CompiledModel;

/// Pending step of a cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Work {
    /// Feed a lifecycle event to the event router.
    Route {
        source: ExecutionId,
        activity_id: String,
        event: StandardEvent,
    },
    /// Instantiate the plan items of a stage that became active.
    Activate(ExecutionId),
    /// Evaluate a freshly created execution's entry criteria.
    Enter(ExecutionId),
    /// Complete a container whose children are all gone.
    CheckCompletion(ExecutionId),
    /// Re-evaluate pending sentries after variables or suspension changed.
    Recheck,
}

pub(crate) struct UnitOfWork<'a> {
    pub(super) instance: CaseInstance,
    pub(super) model: Arc<CompiledModel>,
    pub(super) evaluator: &'a dyn GuardEvaluator,
    listeners: &'a [Box<dyn LifecycleListener>],
    config: &'a EngineConfig,
    queue: VecDeque<Work>,
    task_effects: Vec<TaskEffect>,
    steps: usize,
}

impl<'a> UnitOfWork<'a> {
    pub(crate) fn new(
        instance: CaseInstance,
        evaluator: &'a dyn GuardEvaluator,
        listeners: &'a [Box<dyn LifecycleListener>],
        config: &'a EngineConfig,
    ) -> Self {
        let model = instance.model_arc();
        Self {
            instance,
            model,
            evaluator,
            listeners,
            config,
            queue: VecDeque::new(),
            task_effects: Vec::new(),
            steps: 0,
        }
    }

    /// Hand back the working copy and the buffered task effects.
    pub(crate) fn finish(self) -> (CaseInstance, Vec<TaskEffect>) {
        (self.instance, self.task_effects)
    }

    /// Drain the work-list until no further work is pending.
    pub(crate) fn run(&mut self) -> EngineResult<()> {
        while let Some(work) = self.queue.pop_front() {
            self.steps += 1;
            if self.steps > self.config.max_cascade_steps {
                return Err(EngineError::CascadeLimit {
                    limit: self.config.max_cascade_steps,
                });
            }
            match work {
                Work::Route {
                    source,
                    activity_id,
                    event,
                } => self.route(source, &activity_id, event)?,
                Work::Activate(id) => self.activate(id),
                Work::Enter(id) => self.evaluate_entry(id)?,
                Work::CheckCompletion(id) => self.check_completion(id)?,
                Work::Recheck => self.recheck()?,
            }
        }
        debug!(steps = self.steps, "cascade reached fixed point");
        Ok(())
    }

    pub(super) fn push(&mut self, work: Work) {
        self.queue.push_back(work);
    }

    pub(super) fn execution(&self, id: ExecutionId) -> EngineResult<&CaseExecution> {
        self.instance.get(id).ok_or(EngineError::UnknownNode(id))
    }

    /// Apply one lifecycle transition, pair human tasks, run listeners and
    /// queue the emitted event for routing.
    pub(super) fn apply(&mut self, id: ExecutionId, transition: Transition) -> EngineResult<StandardEvent> {
        let execution = self.execution(id)?;
        let previous = execution.state;
        let kind = execution.kind;
        let activity_id = execution.activity_id.clone();
        let (next, event) = lifecycle::transition(previous, transition)
            .map_err(|err| EngineError::invalid_transition(id, &activity_id, err))?;

        if let Some(execution) = self.instance.get_mut(id) {
            execution.state = next;
            execution.suspension = match transition {
                Transition::Suspend => Some(Suspension {
                    previous,
                    origin: SuspendOrigin::Own,
                }),
                Transition::ParentSuspend => Some(Suspension {
                    previous,
                    origin: SuspendOrigin::Parent,
                }),
                _ => None,
            };
        }
        debug!(execution = %id, activity = %activity_id, from = %previous, to = %next, %event, "transition");

        if kind == ActivityKind::HumanTask && self.config.tasks.create_human_tasks {
            self.pair_task(id, &activity_id, previous, next);
        }
        self.notify(id, kind, &activity_id, event)?;
        self.push(Work::Route {
            source: id,
            activity_id,
            event,
        });
        Ok(event)
    }

    fn pair_task(&mut self, id: ExecutionId, activity_id: &str, previous: State, next: State) {
        let effect = match (previous, next) {
            (_, State::Suspended) => TaskEffect::Suspend(id, true),
            (_, next) if next.is_terminal() => TaskEffect::Remove(id),
            (State::Suspended, _) => TaskEffect::Suspend(id, false),
            (_, State::Active) => TaskEffect::Create(HumanTask {
                execution: id,
                activity_id: activity_id.to_string(),
                suspended: false,
            }),
            _ => return,
        };
        self.task_effects.push(effect);
    }

    /// Run declared and registered listeners against the case scope. A
    /// listener that changed a variable re-checks pending sentries.
    fn notify(
        &mut self,
        id: ExecutionId,
        kind: ActivityKind,
        activity_id: &str,
        event: StandardEvent,
    ) -> EngineResult<()> {
        let Some(case) = self.instance.case_scope_mut() else {
            return Ok(());
        };
        let mut changed = self
            .model
            .activity(activity_id)
            .is_some_and(|activity| apply_declared(&activity.listeners, event, case));
        if !self.listeners.is_empty() {
            let before = case.clone();
            let listener_event = ListenerEvent {
                execution: id,
                activity_id,
                kind,
                event,
            };
            for listener in self.listeners {
                listener
                    .notify(&listener_event, case)
                    .map_err(|err| EngineError::Listener {
                        activity_id: activity_id.to_string(),
                        event,
                        message: err.message,
                    })?;
            }
            changed |= *case != before;
        }
        if changed {
            debug!(activity = %activity_id, %event, "listener wrote case variables");
            self.push(Work::Recheck);
        }
        Ok(())
    }

    /// Start the case plan of a fresh instance.
    pub(crate) fn start_case(&mut self) -> EngineResult<()> {
        let root = self.instance.id();
        self.apply(root, Transition::Start)?;
        self.push(Work::Activate(root));
        Ok(())
    }

    pub(crate) fn complete(&mut self, id: ExecutionId) -> EngineResult<()> {
        let execution = self.execution(id)?;
        lifecycle::transition(execution.state, Transition::Complete)
            .map_err(|err| EngineError::invalid_transition(id, &execution.activity_id, err))?;

        if execution.kind.is_container() {
            let children = execution.children.clone();
            for child in &children {
                let child = self.execution(*child)?;
                if matches!(child.state, State::Active | State::Suspended) {
                    return Err(EngineError::invalid_state(
                        id,
                        &self.execution(id)?.activity_id,
                        State::Active,
                        format!("child {} is still {}", child.activity_id, child.state),
                    ));
                }
            }
            for child in children {
                self.terminate_subtree(child, Transition::ParentTerminate)?;
            }
        }

        self.apply(id, Transition::Complete)?;
        self.finish_execution(id);
        Ok(())
    }

    pub(crate) fn manual_start(&mut self, id: ExecutionId) -> EngineResult<()> {
        self.apply(id, Transition::ManualStart)?;
        if self.execution(id)?.kind.is_container() {
            self.push(Work::Activate(id));
        }
        Ok(())
    }

    /// Suspend `id` and every live descendant not already suspended.
    pub(crate) fn suspend(&mut self, id: ExecutionId) -> EngineResult<()> {
        self.apply(id, Transition::Suspend)?;
        for descendant in self.instance.descendants(id) {
            let state = self.execution(descendant)?.state;
            if !state.is_terminal() && state != State::Suspended {
                self.apply(descendant, Transition::ParentSuspend)?;
            }
        }
        Ok(())
    }

    /// Resume an execution suspended by its own command and restore the
    /// descendants its suspension cascaded to. Descendants suspended on their
    /// own stay suspended, together with their subtrees.
    pub(crate) fn resume(&mut self, id: ExecutionId) -> EngineResult<()> {
        let execution = self.execution(id)?;
        let suspension = match execution.suspension {
            Some(suspension) if suspension.origin == SuspendOrigin::Own => suspension,
            Some(_) => {
                return Err(EngineError::invalid_state(
                    id,
                    &execution.activity_id,
                    execution.state,
                    "suspended by its parent; resume the parent instead",
                ));
            }
            None => {
                return Err(EngineError::invalid_state(
                    id,
                    &execution.activity_id,
                    execution.state,
                    "not suspended",
                ));
            }
        };
        if let Some(parent) = execution.parent
            && self.execution(parent)?.state == State::Suspended
        {
            return Err(EngineError::invalid_state(
                id,
                &execution.activity_id,
                execution.state,
                "parent is still suspended",
            ));
        }

        self.apply(
            id,
            Transition::Resume {
                previous: suspension.previous,
            },
        )?;
        self.push(Work::CheckCompletion(id));

        let mut stack: Vec<ExecutionId> = self.execution(id)?.children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            let execution = self.execution(current)?;
            let children: Vec<ExecutionId> = execution.children.iter().rev().copied().collect();
            let suspension = execution.suspension;
            match suspension {
                Some(Suspension {
                    origin: SuspendOrigin::Own,
                    ..
                }) => continue,
                Some(Suspension { previous, .. }) => {
                    self.apply(current, Transition::ParentResume { previous })?;
                    self.push(Work::CheckCompletion(current));
                }
                None => {}
            }
            stack.extend(children);
        }

        self.push(Work::Recheck);
        Ok(())
    }

    pub(crate) fn terminate(&mut self, id: ExecutionId) -> EngineResult<()> {
        let execution = self.execution(id)?;
        lifecycle::transition(execution.state, Transition::Terminate)
            .map_err(|err| EngineError::invalid_transition(id, &execution.activity_id, err))?;
        self.terminate_subtree(id, Transition::Terminate)
    }

    /// Close a completed or terminated case instance.
    pub(crate) fn close(&mut self, id: ExecutionId) -> EngineResult<()> {
        if !id.is_root() {
            let activity_id = self.execution(id)?.activity_id.clone();
            let state = self.execution(id)?.state;
            return Err(EngineError::invalid_state(
                id,
                &activity_id,
                state,
                "only case instances can be closed",
            ));
        }
        self.apply(id, Transition::Close)?;
        Ok(())
    }

    /// Write a variable into its owning scope (or `scope` itself when `local`).
    pub(crate) fn set_variable(
        &mut self,
        scope: ExecutionId,
        name: &str,
        value: Value,
        local: bool,
    ) -> EngineResult<()> {
        self.execution(scope)?;
        let owner = if local {
            scope
        } else {
            self.instance.owning_scope(scope, name)
        };
        if let Some(execution) = self.instance.get_mut(owner) {
            debug!(scope = %owner, name, "set variable");
            execution.variables.set(name, value);
        }
        self.push(Work::Recheck);
        Ok(())
    }

    pub(crate) fn set_variables(&mut self, scope: ExecutionId, variables: Variables) -> EngineResult<()> {
        for (name, value) in variables {
            self.set_variable(scope, &name, value, false)?;
        }
        Ok(())
    }

    /// Create the children of an active container in declaration order.
    fn activate(&mut self, id: ExecutionId) {
        let Some(execution) = self.instance.get(id) else {
            return;
        };
        if execution.state != State::Active {
            debug!(execution = %id, state = %execution.state, "activation skipped");
            return;
        }
        let model = Arc::clone(&self.model);
        let Some(activity) = model.activity(&execution.activity_id) else {
            return;
        };
        if activity.children.is_empty() {
            self.push(Work::CheckCompletion(id));
            return;
        }
        for child_id in &activity.children {
            if let Some(child) = model.activity(child_id) {
                let child = self.instance.create_child(id, child);
                self.push(Work::Enter(child));
            }
        }
    }

    /// A new AVAILABLE execution: evaluate if-part-only sentries, then enter
    /// it right away unless entry criteria gate it.
    fn evaluate_entry(&mut self, id: ExecutionId) -> EngineResult<()> {
        let Some(execution) = self.instance.get(id) else {
            return Ok(());
        };
        if execution.state != State::Available {
            return Ok(());
        }
        let model = Arc::clone(&self.model);
        let activity_id = execution.activity_id.clone();
        for &index in model.sentries_gating(&activity_id) {
            if model.sentry(index).on_parts.is_empty() {
                self.try_fire(index, id)?;
            }
        }
        let still_available = self
            .instance
            .get(id)
            .is_some_and(|execution| execution.state == State::Available);
        if still_available && !model.has_entry_criteria(&activity_id) {
            self.enter(id)?;
        }
        Ok(())
    }

    /// Move an AVAILABLE execution past its entry: milestones occur, manually
    /// activated items become ENABLED, everything else starts.
    pub(super) fn enter(&mut self, id: ExecutionId) -> EngineResult<()> {
        let execution = self.execution(id)?;
        let kind = execution.kind;
        let manual = self
            .model
            .activity(&execution.activity_id)
            .is_some_and(|activity| activity.manual_activation);
        match kind {
            ActivityKind::Milestone => {
                self.apply(id, Transition::Occur)?;
                self.finish_execution(id);
            }
            _ if manual => {
                self.apply(id, Transition::Enable)?;
            }
            _ => {
                self.apply(id, Transition::Start)?;
                if kind.is_container() {
                    self.push(Work::Activate(id));
                }
            }
        }
        Ok(())
    }

    fn check_completion(&mut self, id: ExecutionId) -> EngineResult<()> {
        let Some(execution) = self.instance.get(id) else {
            return Ok(());
        };
        if execution.kind.is_container()
            && execution.state == State::Active
            && execution.children.is_empty()
        {
            debug!(execution = %id, activity = %execution.activity_id, "all children done, completing");
            self.apply(id, Transition::Complete)?;
            self.finish_execution(id);
        }
        Ok(())
    }

    /// Drop a completed or terminated execution from the tree and let its
    /// parent check for completion. The case plan stays queryable.
    pub(super) fn finish_execution(&mut self, id: ExecutionId) {
        let parent = self.instance.get(id).and_then(|execution| execution.parent);
        let removed = self.instance.remove_subtree(id);
        if !removed.is_empty() {
            debug!(execution = %id, removed = removed.len(), "closed subtree");
        }
        if let Some(parent) = parent {
            self.push(Work::CheckCompletion(parent));
        }
    }
}
