//! Event routing and sentry firing.
//!
//! Every emitted lifecycle event is matched against the sentry declarations
//! listening for `(source activity, event)`. Matching on-parts are recorded on
//! the sentry instance of the live target execution; once the join holds and
//! the if-part is satisfied the sentry fires exactly once.

use std::sync::Arc;

use tracing::debug;

use crate::core::types::{CriterionKind, ExecutionId, StandardEvent, State};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::unit::UnitOfWork;

impl UnitOfWork<'_> {
    pub(super) fn route(
        &mut self,
        source: ExecutionId,
        activity_id: &str,
        event: StandardEvent,
    ) -> EngineResult<()> {
        let model = Arc::clone(&self.model);
        for &index in model.sentries_listening(activity_id, event) {
            let declaration = model.sentry(index);
            let Some(target) = self
                .instance
                .find_by_activity(&declaration.target)
                .map(|execution| execution.id())
            else {
                debug!(sentry = %declaration.id, target = %declaration.target, %event, "no live target, event dropped");
                continue;
            };
            if !self
                .instance
                .sentry_instance_mut(index, target)
                .record(declaration, activity_id, event)
            {
                continue;
            }
            debug!(sentry = %declaration.id, %source, %event, "on-part satisfied");
            self.try_fire(index, target)?;
        }
        Ok(())
    }

    /// Fire sentry `index` for `target` if its join holds and its if-part is
    /// satisfied. Entry sentries of a target suspended before entry stay
    /// pending until it is resumed.
    pub(super) fn try_fire(&mut self, index: usize, target: ExecutionId) -> EngineResult<()> {
        let model = Arc::clone(&self.model);
        let declaration = model.sentry(index);
        let Some(execution) = self.instance.get(target) else {
            return Ok(());
        };
        let state = execution.state();
        let suspended_before_entry = execution
            .suspension()
            .is_some_and(|suspension| suspension.previous == State::Available);
        let scope = execution.parent().unwrap_or(target);

        if !self
            .instance
            .sentry_instance_mut(index, target)
            .is_pending(declaration)
        {
            return Ok(());
        }

        match declaration.kind {
            CriterionKind::Entry if state == State::Available => {}
            CriterionKind::Entry if state == State::Suspended && suspended_before_entry => {
                debug!(sentry = %declaration.id, %target, "entry deferred until resume");
                return Ok(());
            }
            CriterionKind::Entry => {
                // Already entered through another entry criterion.
                self.instance.sentry_instance_mut(index, target).fired = true;
                return Ok(());
            }
            CriterionKind::Exit if state.is_terminal() => {
                self.instance.sentry_instance_mut(index, target).fired = true;
                return Ok(());
            }
            CriterionKind::Exit => {}
        }

        if let Some(expression) = &declaration.if_part {
            let variables = self.instance.visible_variables(scope);
            let satisfied = self
                .evaluator
                .evaluate(expression, &variables)
                .map_err(|err| EngineError::GuardEvaluation {
                    sentry: declaration.id.clone(),
                    target,
                    message: err.message,
                })?;
            if !satisfied {
                debug!(sentry = %declaration.id, %target, "if-part not satisfied");
                return Ok(());
            }
        }

        self.instance.sentry_instance_mut(index, target).fired = true;
        debug!(sentry = %declaration.id, %target, kind = ?declaration.kind, "sentry fired");
        match declaration.kind {
            CriterionKind::Entry => self.enter(target),
            CriterionKind::Exit => self.exit(target),
        }
    }

    /// Re-evaluate every sentry whose join already holds but has not fired,
    /// plus if-part-only sentries that were never evaluated.
    pub(super) fn recheck(&mut self) -> EngineResult<()> {
        let model = Arc::clone(&self.model);
        let mut candidates = Vec::new();
        for execution in self.instance.executions() {
            for &index in model.sentries_gating(execution.activity_id()) {
                let declaration = model.sentry(index);
                let pending = match self.instance.sentry_instance(index, execution.id()) {
                    Some(sentry) => sentry.is_pending(declaration),
                    None => declaration.on_parts.is_empty(),
                };
                if pending {
                    candidates.push((index, execution.id()));
                }
            }
        }
        for (index, target) in candidates {
            self.try_fire(index, target)?;
        }
        Ok(())
    }
}
