//! Case execution engine.
//!
//! [`CaseEngine`] owns deployed case models and the live case instances
//! started from them. Every command runs as one atomic unit of work: the
//! command and the whole cascade it triggers either commit together or
//! leave the instance untouched.

mod cascade;
pub mod error;
pub mod guard;
pub mod instance;
pub mod listener;
mod router;
pub mod tasks;
mod unit;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument};

use crate::core::types::ExecutionId;
use crate::core::variables::Variables;
use crate::io::config::EngineConfig;
use crate::model::{CaseModel, CompiledModel};

pub use error::{EngineError, EngineResult};
pub use guard::{ExpressionEvaluator, GuardError, GuardEvaluator};
pub use instance::{CaseExecution, CaseInstance, ExecutionSnapshot};
pub use listener::{LifecycleListener, ListenerError, ListenerEvent};
pub use tasks::{HumanTask, InMemoryTaskList, TaskList};

use unit::UnitOfWork;

pub struct CaseEngine<G = ExpressionEvaluator, T = InMemoryTaskList> {
    config: EngineConfig,
    evaluator: G,
    tasks: T,
    listeners: Vec<Box<dyn LifecycleListener>>,
    definitions: BTreeMap<String, Arc<CompiledModel>>,
    instances: BTreeMap<u64, CaseInstance>,
    next_case: u64,
}

impl CaseEngine {
    /// Engine with the expression evaluator and in-memory task list.
    pub fn new(config: EngineConfig) -> Self {
        let evaluator = ExpressionEvaluator::new(config.guard.strict_undefined);
        Self::with_collaborators(config, evaluator, InMemoryTaskList::new())
    }
}

impl Default for CaseEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<G: GuardEvaluator, T: TaskList> CaseEngine<G, T> {
    pub fn with_collaborators(config: EngineConfig, evaluator: G, tasks: T) -> Self {
        Self {
            config,
            evaluator,
            tasks,
            listeners: Vec::new(),
            definitions: BTreeMap::new(),
            instances: BTreeMap::new(),
            next_case: 1,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tasks(&self) -> &T {
        &self.tasks
    }

    pub fn register_listener(&mut self, listener: impl LifecycleListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Compile and register a case model under its id.
    pub fn deploy(&mut self, model: CaseModel) -> EngineResult<()> {
        if self.definitions.contains_key(&model.id) {
            return Err(EngineError::DuplicateDefinition(model.id));
        }
        let compiled = CompiledModel::compile(model).map_err(EngineError::InvalidModel)?;
        info!(definition = compiled.id(), "deployed case model");
        self.definitions
            .insert(compiled.id().to_string(), Arc::new(compiled));
        Ok(())
    }

    pub fn is_deployed(&self, definition_id: &str) -> bool {
        self.definitions.contains_key(definition_id)
    }

    /// Create and start a case instance. Returns the case instance id, which
    /// is also the id of its case plan execution.
    #[instrument(skip(self))]
    pub fn start(&mut self, definition_id: &str) -> EngineResult<ExecutionId> {
        let model = self
            .definitions
            .get(definition_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownDefinition(definition_id.to_string()))?;
        let case = self.next_case;
        let instance = CaseInstance::new(case, model);
        let id = instance.id();

        let mut unit = UnitOfWork::new(instance, &self.evaluator, &self.listeners, &self.config);
        unit.start_case()?;
        unit.run()?;
        let (instance, effects) = unit.finish();

        self.next_case += 1;
        for effect in effects {
            effect.apply(&mut self.tasks);
        }
        self.instances.insert(case, instance);
        info!(case = %id, "started case instance");
        Ok(id)
    }

    pub fn complete(&mut self, id: ExecutionId) -> EngineResult<()> {
        self.execute(id, "complete", |unit| unit.complete(id))
    }

    /// Set `variables` through their owning scopes, then complete `id`.
    pub fn complete_with(&mut self, id: ExecutionId, variables: Variables) -> EngineResult<()> {
        self.execute(id, "complete", |unit| {
            unit.set_variables(id, variables)?;
            unit.complete(id)
        })
    }

    pub fn manual_start(&mut self, id: ExecutionId) -> EngineResult<()> {
        self.execute(id, "manualStart", |unit| unit.manual_start(id))
    }

    pub fn suspend(&mut self, id: ExecutionId) -> EngineResult<()> {
        self.execute(id, "suspend", |unit| unit.suspend(id))
    }

    pub fn resume(&mut self, id: ExecutionId) -> EngineResult<()> {
        self.execute(id, "resume", |unit| unit.resume(id))
    }

    pub fn terminate(&mut self, id: ExecutionId) -> EngineResult<()> {
        self.execute(id, "terminate", |unit| unit.terminate(id))
    }

    /// Write `name` into the scope that owns it, starting the lookup at
    /// `scope`, and re-check pending sentries.
    pub fn set_variable(&mut self, scope: ExecutionId, name: &str, value: Value) -> EngineResult<()> {
        self.execute(scope, "setVariable", |unit| {
            unit.set_variable(scope, name, value, false)
        })
    }

    /// Write `name` into `scope` itself.
    pub fn set_variable_local(
        &mut self,
        scope: ExecutionId,
        name: &str,
        value: Value,
    ) -> EngineResult<()> {
        self.execute(scope, "setVariableLocal", |unit| {
            unit.set_variable(scope, name, value, true)
        })
    }

    /// Close a completed or terminated case instance and drop it.
    pub fn close(&mut self, case: ExecutionId) -> EngineResult<()> {
        let case = case.case_instance();
        self.execute(case, "close", |unit| unit.close(case))?;
        self.instances.remove(&case.case);
        info!(%case, "closed case instance");
        Ok(())
    }

    pub fn find_by_id(&self, id: ExecutionId) -> Option<&CaseExecution> {
        self.instances.get(&id.case)?.get(id)
    }

    /// Live execution of `activity_id` in case instance `case`.
    pub fn find_by_activity_id(&self, case: ExecutionId, activity_id: &str) -> Option<&CaseExecution> {
        self.instances.get(&case.case)?.find_by_activity(activity_id)
    }

    pub fn get_variable(&self, scope: ExecutionId, name: &str) -> Option<&Value> {
        self.instances.get(&scope.case)?.get_variable(scope, name)
    }

    /// Variables visible from `scope`, nearer scopes shadowing outer ones.
    pub fn variables(&self, scope: ExecutionId) -> Option<Variables> {
        let instance = self.instances.get(&scope.case)?;
        instance.contains(scope).then(|| instance.visible_variables(scope))
    }

    pub fn instance(&self, case: ExecutionId) -> Option<&CaseInstance> {
        self.instances.get(&case.case)
    }

    pub fn instances(&self) -> impl Iterator<Item = &CaseInstance> {
        self.instances.values()
    }

    #[instrument(skip(self, command))]
    fn execute<F>(&mut self, target: ExecutionId, name: &str, command: F) -> EngineResult<()>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> EngineResult<()>,
    {
        let instance = self
            .instances
            .get(&target.case)
            .filter(|instance| instance.contains(target))
            .cloned()
            .ok_or(EngineError::UnknownNode(target))?;
        info!(command = name, "executing command");

        let mut unit = UnitOfWork::new(instance, &self.evaluator, &self.listeners, &self.config);
        command(&mut unit)?;
        unit.run()?;
        let (instance, effects) = unit.finish();

        for effect in effects {
            effect.apply(&mut self.tasks);
        }
        self.instances.insert(target.case, instance);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{CriterionKind, StandardEvent, State};
    use crate::test_support::{case_plan, human_task, milestone, model, on_part, sentry, stage};
    use serde_json::json;

    fn engine_with(definition: CaseModel) -> CaseEngine {
        let mut engine = CaseEngine::default();
        engine.deploy(definition).expect("deploy");
        engine
    }

    fn live(engine: &CaseEngine, case: ExecutionId, activity: &str) -> ExecutionId {
        engine
            .find_by_activity_id(case, activity)
            .unwrap_or_else(|| panic!("{activity} should be live"))
            .id()
    }

    #[test]
    fn start_activates_children_in_declaration_order() {
        let mut engine = engine_with(model(
            "order",
            case_plan(vec![human_task("A"), human_task("B")]),
            vec![],
        ));
        let case = engine.start("order").expect("start");

        let root = engine.find_by_id(case).expect("root");
        assert!(root.is_active());
        let children: Vec<&str> = root
            .children()
            .iter()
            .filter_map(|child| engine.find_by_id(*child))
            .map(|child| child.activity_id())
            .collect();
        assert_eq!(children, vec!["A", "B"]);
        assert_eq!(engine.tasks().len(), 2);
    }

    #[test]
    fn unknown_definition_is_rejected() {
        let mut engine = CaseEngine::default();
        assert!(matches!(
            engine.start("missing"),
            Err(EngineError::UnknownDefinition(id)) if id == "missing"
        ));
    }

    #[test]
    fn duplicate_deploy_is_rejected() {
        let definition = model("dup", case_plan(vec![human_task("A")]), vec![]);
        let mut engine = engine_with(definition.clone());
        assert!(matches!(
            engine.deploy(definition),
            Err(EngineError::DuplicateDefinition(_))
        ));
    }

    #[test]
    fn milestone_without_criteria_occurs_immediately() {
        let mut engine = engine_with(model(
            "milestone",
            case_plan(vec![human_task("A"), milestone("M")]),
            vec![],
        ));
        let case = engine.start("milestone").expect("start");
        assert!(engine.find_by_activity_id(case, "M").is_none());
        assert!(engine.find_by_activity_id(case, "A").is_some());
    }

    #[test]
    fn completing_last_child_completes_the_case() {
        let mut engine = engine_with(model("single", case_plan(vec![human_task("A")]), vec![]));
        let case = engine.start("single").expect("start");
        let a = live(&engine, case, "A");

        engine.complete(a).expect("complete");

        assert!(engine.find_by_id(a).is_none());
        assert!(engine.find_by_id(case).expect("root").is_completed());
        assert!(engine.tasks().is_empty());
    }

    #[test]
    fn entry_sentry_starts_target_after_on_part() {
        let mut engine = engine_with(model(
            "entry",
            case_plan(vec![human_task("A"), human_task("B")]),
            vec![sentry(
                "S1",
                CriterionKind::Entry,
                "B",
                vec![on_part("A", StandardEvent::Complete)],
            )],
        ));
        let case = engine.start("entry").expect("start");
        let b = live(&engine, case, "B");
        assert!(engine.find_by_id(b).expect("B").is_available());

        engine.complete(live(&engine, case, "A")).expect("complete A");

        assert!(engine.find_by_id(b).expect("B").is_active());
        assert!(engine.tasks().get(b).is_some());
    }

    #[test]
    fn failed_guard_rolls_back_the_command() {
        let mut guarded = sentry(
            "S1",
            CriterionKind::Exit,
            "B",
            vec![on_part("A", StandardEvent::Complete)],
        );
        guarded.if_part = Some("1 + 1".to_string());
        let mut engine = engine_with(model(
            "rollback",
            case_plan(vec![human_task("A"), human_task("B")]),
            vec![guarded],
        ));
        let case = engine.start("rollback").expect("start");
        let a = live(&engine, case, "A");

        let err = engine.complete(a).expect_err("guard error");
        assert!(matches!(err, EngineError::GuardEvaluation { ref sentry, .. } if sentry == "S1"));

        assert!(engine.find_by_id(a).expect("A").is_active());
        assert!(engine.tasks().get(a).is_some());
    }

    #[test]
    fn stage_with_active_child_cannot_be_completed() {
        let mut engine = engine_with(model(
            "stage",
            case_plan(vec![stage("S", vec![human_task("A")])]),
            vec![],
        ));
        let case = engine.start("stage").expect("start");
        let s = live(&engine, case, "S");

        let err = engine.complete(s).expect_err("active child");
        assert!(matches!(err, EngineError::InvalidState { .. }));
    }

    #[test]
    fn set_variable_writes_case_scope_by_default() {
        let mut engine = engine_with(model(
            "vars",
            case_plan(vec![stage("S", vec![human_task("A")])]),
            vec![],
        ));
        let case = engine.start("vars").expect("start");
        let a = live(&engine, case, "A");

        engine.set_variable(a, "value", json!(7)).expect("set");
        engine.set_variable_local(a, "note", json!("x")).expect("set local");

        assert_eq!(engine.find_by_id(case).expect("root").variables().get("value"), Some(&json!(7)));
        assert_eq!(engine.get_variable(a, "value"), Some(&json!(7)));
        assert_eq!(engine.get_variable(a, "note"), Some(&json!("x")));
        assert_eq!(engine.get_variable(case, "note"), None);
    }

    #[test]
    fn close_requires_terminal_case_and_drops_instance() {
        let mut engine = engine_with(model("close", case_plan(vec![human_task("A")]), vec![]));
        let case = engine.start("close").expect("start");
        assert!(matches!(
            engine.close(case),
            Err(EngineError::InvalidState { state: State::Active, .. })
        ));

        engine.terminate(case).expect("terminate");
        assert!(engine.find_by_id(case).expect("root").is_terminated());

        engine.close(case).expect("close");
        assert!(engine.find_by_id(case).is_none());
        assert!(engine.instance(case).is_none());
    }

    #[test]
    fn commands_on_unknown_nodes_fail() {
        let mut engine = engine_with(model("unknown", case_plan(vec![human_task("A")]), vec![]));
        let case = engine.start("unknown").expect("start");
        let ghost = ExecutionId { case: case.case, node: 99 };
        assert!(matches!(engine.complete(ghost), Err(EngineError::UnknownNode(id)) if id == ghost));
    }
}
