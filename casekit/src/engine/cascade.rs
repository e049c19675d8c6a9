//! Termination cascade.
//!
//! Exiting or terminating an execution walks its subtree bottom-up: the
//! target takes the triggering transition, every live descendant takes
//! `parentTerminate`. Events are queued, not routed inline, so sentries only
//! observe the subtree after it has been removed as a whole.

use tracing::debug;

use crate::core::lifecycle::Transition;
use crate::core::types::ExecutionId;
use crate::engine::error::EngineResult;
use crate::engine::unit::UnitOfWork;

impl UnitOfWork<'_> {
    pub(super) fn exit(&mut self, target: ExecutionId) -> EngineResult<()> {
        self.terminate_subtree(target, Transition::Exit)
    }

    /// Terminate `target` with `transition` and its descendants with
    /// `parentTerminate`, then remove the subtree.
    pub(super) fn terminate_subtree(
        &mut self,
        target: ExecutionId,
        transition: Transition,
    ) -> EngineResult<()> {
        let subtree = self.instance.subtree_post_order(target);
        debug!(%target, size = subtree.len(), transition = transition.name(), "terminating subtree");
        for node in subtree {
            let Some(execution) = self.instance.get(node) else {
                continue;
            };
            if execution.state().is_terminal() {
                continue;
            }
            let transition = if node == target {
                transition
            } else {
                Transition::ParentTerminate
            };
            self.apply(node, transition)?;
        }
        self.finish_execution(target);
        Ok(())
    }
}
