//! Case instance arena.
//!
//! All executions of one case instance live in a single arena keyed by node
//! slot; parent/child links are ids, never references. Sentry instances are
//! keyed by `(declaration index, target slot)` and dropped together with
//! their target.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::sentry::SentryInstance;
use crate::core::types::{ActivityKind, ExecutionId, State, Suspension};
use crate::core::variables::{VariableScope, Variables};
use crate::model::{ActivityDef, CompiledModel};

/// One node of the case execution tree.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseExecution {
    pub(crate) id: ExecutionId,
    pub(crate) activity_id: String,
    pub(crate) kind: ActivityKind,
    pub(crate) state: State,
    pub(crate) parent: Option<ExecutionId>,
    pub(crate) children: Vec<ExecutionId>,
    pub(crate) variables: VariableScope,
    pub(crate) suspension: Option<Suspension>,
}

impl CaseExecution {
    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    pub fn kind(&self) -> ActivityKind {
        self.kind
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn parent(&self) -> Option<ExecutionId> {
        self.parent
    }

    pub fn children(&self) -> &[ExecutionId] {
        &self.children
    }

    pub fn variables(&self) -> &VariableScope {
        &self.variables
    }

    pub fn suspension(&self) -> Option<Suspension> {
        self.suspension
    }

    pub fn is_available(&self) -> bool {
        self.state == State::Available
    }

    pub fn is_enabled(&self) -> bool {
        self.state == State::Enabled
    }

    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    pub fn is_suspended(&self) -> bool {
        self.state == State::Suspended
    }

    pub fn is_completed(&self) -> bool {
        self.state == State::Completed
    }

    pub fn is_terminated(&self) -> bool {
        self.state == State::Terminated
    }
}

/// Serializable view of an execution subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub id: ExecutionId,
    pub activity_id: String,
    pub kind: ActivityKind,
    pub state: State,
    #[serde(default, skip_serializing_if = "VariableScope::is_empty")]
    pub variables: VariableScope,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ExecutionSnapshot>,
}

impl ExecutionSnapshot {
    /// First node in pre-order whose activity is `activity_id`.
    pub fn find(&self, activity_id: &str) -> Option<&ExecutionSnapshot> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.activity_id == activity_id {
                return Some(node);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }
}

/// Runtime state of one case instance.
#[derive(Debug, Clone)]
pub struct CaseInstance {
    case: u64,
    model: Arc<CompiledModel>,
    nodes: BTreeMap<u32, CaseExecution>,
    sentries: BTreeMap<(usize, u32), SentryInstance>,
    next_node: u32,
}

impl CaseInstance {
    /// Create an instance holding only the AVAILABLE case plan execution.
    pub(crate) fn new(case: u64, model: Arc<CompiledModel>) -> Self {
        let root = ExecutionId::root(case);
        let kind = model
            .activity(model.root())
            .map(|activity| activity.kind)
            .unwrap_or(ActivityKind::CasePlan);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            root.node,
            CaseExecution {
                id: root,
                activity_id: model.root().to_string(),
                kind,
                state: State::Available,
                parent: None,
                children: Vec::new(),
                variables: VariableScope::new(),
                suspension: None,
            },
        );
        Self {
            case,
            model,
            nodes,
            sentries: BTreeMap::new(),
            next_node: ExecutionId::ROOT_NODE + 1,
        }
    }

    /// Id of the case instance (the case plan execution).
    pub fn id(&self) -> ExecutionId {
        ExecutionId::root(self.case)
    }

    pub fn model(&self) -> &CompiledModel {
        &self.model
    }

    pub(crate) fn model_arc(&self) -> Arc<CompiledModel> {
        Arc::clone(&self.model)
    }

    pub fn root(&self) -> &CaseExecution {
        &self.nodes[&ExecutionId::ROOT_NODE]
    }

    pub fn get(&self, id: ExecutionId) -> Option<&CaseExecution> {
        if id.case != self.case {
            return None;
        }
        self.nodes.get(&id.node)
    }

    pub(crate) fn get_mut(&mut self, id: ExecutionId) -> Option<&mut CaseExecution> {
        if id.case != self.case {
            return None;
        }
        self.nodes.get_mut(&id.node)
    }

    pub fn contains(&self, id: ExecutionId) -> bool {
        self.get(id).is_some()
    }

    /// First live execution of `activity_id` in creation order.
    pub fn find_by_activity(&self, activity_id: &str) -> Option<&CaseExecution> {
        self.nodes
            .values()
            .find(|execution| execution.activity_id == activity_id)
    }

    pub fn executions(&self) -> impl Iterator<Item = &CaseExecution> {
        self.nodes.values()
    }

    /// Append an AVAILABLE child execution for `activity` under `parent`.
    pub(crate) fn create_child(&mut self, parent: ExecutionId, activity: &ActivityDef) -> ExecutionId {
        let id = ExecutionId {
            case: self.case,
            node: self.next_node,
        };
        self.next_node += 1;
        self.nodes.insert(
            id.node,
            CaseExecution {
                id,
                activity_id: activity.id.clone(),
                kind: activity.kind,
                state: State::Available,
                parent: Some(parent),
                children: Vec::new(),
                variables: VariableScope::new(),
                suspension: None,
            },
        );
        if let Some(parent) = self.get_mut(parent) {
            parent.children.push(id);
        }
        id
    }

    /// `id` and all of its descendants, every node after its descendants.
    pub(crate) fn subtree_post_order(&self, id: ExecutionId) -> Vec<ExecutionId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(execution) = self.get(current) else {
                continue;
            };
            order.push(current);
            stack.extend(execution.children.iter().copied());
        }
        order.reverse();
        order
    }

    /// Strict descendants of `id`, parents before children.
    pub(crate) fn descendants(&self, id: ExecutionId) -> Vec<ExecutionId> {
        let mut order = Vec::new();
        let mut stack: Vec<ExecutionId> = self
            .get(id)
            .map(|execution| execution.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(current) = stack.pop() {
            let Some(execution) = self.get(current) else {
                continue;
            };
            order.push(current);
            stack.extend(execution.children.iter().rev().copied());
        }
        order
    }

    /// Remove `id` and its subtree from the arena together with the sentry
    /// instances targeting them. The case plan itself is never removed; only
    /// its descendants are.
    ///
    /// Returns the removed executions.
    pub(crate) fn remove_subtree(&mut self, id: ExecutionId) -> Vec<CaseExecution> {
        let doomed: Vec<ExecutionId> = self
            .subtree_post_order(id)
            .into_iter()
            .filter(|node| !node.is_root())
            .collect();
        let slots: BTreeSet<u32> = doomed.iter().map(|node| node.node).collect();
        self.sentries.retain(|(_, target), _| !slots.contains(target));

        if let Some(parent) = self.get(id).and_then(|execution| execution.parent)
            && let Some(parent) = self.get_mut(parent)
        {
            parent.children.retain(|child| *child != id);
        }
        if id.is_root()
            && let Some(root) = self.get_mut(id)
        {
            root.children.clear();
        }

        doomed
            .into_iter()
            .filter_map(|node| self.nodes.remove(&node.node))
            .collect()
    }

    pub(crate) fn sentry_instance(&self, declaration: usize, target: ExecutionId) -> Option<&SentryInstance> {
        self.sentries.get(&(declaration, target.node))
    }

    /// Sentry instance for `(declaration, target)`, created on first use.
    pub(crate) fn sentry_instance_mut(&mut self, declaration: usize, target: ExecutionId) -> &mut SentryInstance {
        self.sentries
            .entry((declaration, target.node))
            .or_default()
    }

    pub fn sentry_count(&self) -> usize {
        self.sentries.len()
    }

    /// Variable lookup delegating from `from` to its ancestors.
    pub fn get_variable(&self, from: ExecutionId, name: &str) -> Option<&Value> {
        let mut cursor = self.get(from);
        while let Some(execution) = cursor {
            if let Some(value) = execution.variables.get(name) {
                return Some(value);
            }
            cursor = execution.parent.and_then(|parent| self.get(parent));
        }
        None
    }

    /// All variables visible from `from`; nearer scopes shadow outer ones.
    pub fn visible_variables(&self, from: ExecutionId) -> Variables {
        let mut variables = Variables::new();
        let mut cursor = self.get(from);
        while let Some(execution) = cursor {
            execution.variables.merge_missing_into(&mut variables);
            cursor = execution.parent.and_then(|parent| self.get(parent));
        }
        variables
    }

    /// Scope a write of `name` addressed to `from` lands in: the nearest
    /// execution that already holds the name or whose plan item declares it,
    /// otherwise the case plan.
    pub(crate) fn owning_scope(&self, from: ExecutionId, name: &str) -> ExecutionId {
        let mut cursor = self.get(from);
        while let Some(execution) = cursor {
            let declares = self
                .model
                .activity(&execution.activity_id)
                .is_some_and(|activity| activity.owns_variable(name));
            if declares || execution.variables.contains(name) {
                return execution.id;
            }
            cursor = execution.parent.and_then(|parent| self.get(parent));
        }
        self.id()
    }

    pub(crate) fn case_scope_mut(&mut self) -> Option<&mut VariableScope> {
        self.nodes
            .get_mut(&ExecutionId::ROOT_NODE)
            .map(|root| &mut root.variables)
    }

    /// Built bottom-up: every node takes its children's finished snapshots.
    pub fn snapshot(&self) -> ExecutionSnapshot {
        let mut built: BTreeMap<u32, ExecutionSnapshot> = BTreeMap::new();
        for id in self.subtree_post_order(self.id()) {
            if let Some(execution) = self.get(id) {
                let snapshot = self.snapshot_node(execution, &mut built);
                built.insert(id.node, snapshot);
            }
        }
        built
            .remove(&ExecutionId::ROOT_NODE)
            .unwrap_or_else(|| self.snapshot_node(self.root(), &mut built))
    }

    fn snapshot_node(
        &self,
        execution: &CaseExecution,
        built: &mut BTreeMap<u32, ExecutionSnapshot>,
    ) -> ExecutionSnapshot {
        ExecutionSnapshot {
            id: execution.id,
            activity_id: execution.activity_id.clone(),
            kind: execution.kind,
            state: execution.state,
            variables: execution.variables.clone(),
            children: execution
                .children
                .iter()
                .filter_map(|child| built.remove(&child.node))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{case_plan, human_task, model, stage};
    use serde_json::json;

    fn instance() -> CaseInstance {
        let mut plan = case_plan(vec![stage("S", vec![human_task("A")]), human_task("B")]);
        plan.children[0].local_variables.push("draft".to_string());
        let compiled = CompiledModel::compile(model("m", plan, Vec::new())).expect("compile");
        let mut instance = CaseInstance::new(1, Arc::new(compiled));
        let root = instance.id();
        let stage_def = instance.model().activity("S").cloned().expect("S");
        let a_def = instance.model().activity("A").cloned().expect("A");
        let b_def = instance.model().activity("B").cloned().expect("B");
        let s = instance.create_child(root, &stage_def);
        instance.create_child(s, &a_def);
        instance.create_child(root, &b_def);
        instance
    }

    fn id_of(instance: &CaseInstance, activity: &str) -> ExecutionId {
        instance.find_by_activity(activity).expect(activity).id()
    }

    #[test]
    fn post_order_visits_descendants_first() {
        let instance = instance();
        let order: Vec<String> = instance
            .subtree_post_order(instance.id())
            .into_iter()
            .map(|id| instance.get(id).expect("live").activity_id.clone())
            .collect();
        let position = |name: &str| order.iter().position(|item| item == name).expect(name);
        assert!(position("A") < position("S"));
        assert_eq!(order.last().map(String::as_str), Some("CasePlanModel"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn descendants_are_in_declaration_order() {
        let instance = instance();
        let names: Vec<&str> = instance
            .descendants(instance.id())
            .into_iter()
            .map(|id| instance.get(id).expect("live").activity_id())
            .collect();
        assert_eq!(names, vec!["S", "A", "B"]);
    }

    #[test]
    fn remove_subtree_detaches_and_drops_sentries() {
        let mut instance = instance();
        let s = id_of(&instance, "S");
        let a = id_of(&instance, "A");
        instance.sentry_instance_mut(0, a);
        instance.sentry_instance_mut(0, id_of(&instance, "B"));

        let removed = instance.remove_subtree(s);

        assert_eq!(removed.len(), 2);
        assert!(instance.get(a).is_none());
        assert!(instance.find_by_activity("S").is_none());
        assert_eq!(instance.root().children().len(), 1);
        assert_eq!(instance.sentry_count(), 1);
    }

    #[test]
    fn removing_the_root_keeps_the_case_plan() {
        let mut instance = instance();
        let removed = instance.remove_subtree(instance.id());
        assert_eq!(removed.len(), 3);
        assert!(instance.root().children().is_empty());
        assert!(instance.contains(instance.id()));
    }

    #[test]
    fn variable_reads_delegate_and_writes_resolve_owner() {
        let mut instance = instance();
        let s = id_of(&instance, "S");
        let a = id_of(&instance, "A");
        let b = id_of(&instance, "B");

        assert_eq!(instance.owning_scope(a, "value"), instance.id());
        assert_eq!(instance.owning_scope(a, "draft"), s);
        assert_eq!(instance.owning_scope(b, "draft"), instance.id());

        instance
            .case_scope_mut()
            .expect("case scope")
            .set("value", json!(1));
        instance.get_mut(s).expect("S").variables.set("value", json!(2));
        assert_eq!(instance.get_variable(a, "value"), Some(&json!(2)));
        assert_eq!(instance.get_variable(b, "value"), Some(&json!(1)));
        assert_eq!(instance.visible_variables(a).get("value"), Some(&json!(2)));
        assert_eq!(instance.owning_scope(a, "value"), s);
    }

    #[test]
    fn snapshot_mirrors_tree() {
        let instance = instance();
        let snapshot = instance.snapshot();
        assert_eq!(snapshot.children.len(), 2);
        assert_eq!(snapshot.find("A").map(|node| node.state), Some(State::Available));
        assert!(snapshot.find("missing").is_none());
    }
}
