//! Static case model: the plan item tree and its sentry declarations.
//!
//! [`CaseModel`] is the serde form loaded from disk. [`CompiledModel`] is the
//! validated, indexed form shared by every instance of the definition.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::invariants::validate_model;
use crate::core::types::{ActivityKind, CriterionKind, JoinType, StandardEvent};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CaseModel {
    /// Case definition id used by `start`.
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// The case plan model (root plan item).
    pub plan: PlanItem,
    #[serde(default)]
    pub sentries: Vec<SentryDeclaration>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlanItem {
    pub id: String,
    pub kind: ActivityKind,
    /// Wait in ENABLED for a manual start instead of starting automatically.
    #[serde(default)]
    pub manual_activation: bool,
    /// Variable names owned by this item's scope.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_variables: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<ListenerDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PlanItem>,
}

/// Declarative side effect run when the item emits `event`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ListenerDecl {
    pub event: StandardEvent,
    pub set_variable: SetVariable,
}

/// Write `value` to `name` in the case instance scope.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SetVariable {
    pub name: String,
    pub value: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SentryDeclaration {
    pub id: String,
    pub kind: CriterionKind,
    /// Plan item whose entry or exit this sentry gates.
    pub target: String,
    #[serde(default)]
    pub join: JoinType,
    #[serde(default)]
    pub on_parts: Vec<OnPart>,
    /// Guard expression over the variables visible from the target's parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_part: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnPart {
    pub source: String,
    pub event: StandardEvent,
}

impl OnPart {
    pub fn matches(&self, source: &str, event: StandardEvent) -> bool {
        self.source == source && self.event == event
    }
}

/// Flattened view of one plan item.
#[derive(Clone, Debug)]
pub struct ActivityDef {
    pub id: String,
    pub kind: ActivityKind,
    pub manual_activation: bool,
    pub local_variables: Vec<String>,
    pub listeners: Vec<ListenerDecl>,
    pub parent: Option<String>,
    /// Child plan item ids in declaration order.
    pub children: Vec<String>,
}

impl ActivityDef {
    pub fn owns_variable(&self, name: &str) -> bool {
        self.local_variables.iter().any(|owned| owned == name)
    }
}

/// Validated case model with lookup indices.
#[derive(Clone, Debug)]
pub struct CompiledModel {
    definition: CaseModel,
    activities: HashMap<String, ActivityDef>,
    /// source activity -> event -> sentry indices listening for it.
    listening: HashMap<String, BTreeMap<StandardEvent, Vec<usize>>>,
    /// target activity -> sentry indices gating it.
    gating: HashMap<String, Vec<usize>>,
}

impl CompiledModel {
    /// Validate `definition` and build its indices.
    ///
    /// Returns the invariant violations if the model is not well formed.
    pub fn compile(definition: CaseModel) -> Result<Self, Vec<String>> {
        let errors = validate_model(&definition);
        if !errors.is_empty() {
            return Err(errors);
        }

        let mut activities = HashMap::new();
        let mut stack: Vec<(&PlanItem, Option<String>)> = vec![(&definition.plan, None)];
        while let Some((item, parent)) = stack.pop() {
            activities.insert(
                item.id.clone(),
                ActivityDef {
                    id: item.id.clone(),
                    kind: item.kind,
                    manual_activation: item.manual_activation,
                    local_variables: item.local_variables.clone(),
                    listeners: item.listeners.clone(),
                    parent,
                    children: item.children.iter().map(|child| child.id.clone()).collect(),
                },
            );
            for child in item.children.iter().rev() {
                stack.push((child, Some(item.id.clone())));
            }
        }

        let mut listening: HashMap<String, BTreeMap<StandardEvent, Vec<usize>>> = HashMap::new();
        let mut gating: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, sentry) in definition.sentries.iter().enumerate() {
            gating.entry(sentry.target.clone()).or_default().push(index);
            for part in &sentry.on_parts {
                let listeners = listening
                    .entry(part.source.clone())
                    .or_default()
                    .entry(part.event)
                    .or_default();
                if !listeners.contains(&index) {
                    listeners.push(index);
                }
            }
        }

        Ok(Self {
            definition,
            activities,
            listening,
            gating,
        })
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &CaseModel {
        &self.definition
    }

    pub fn root(&self) -> &str {
        &self.definition.plan.id
    }

    pub fn activity(&self, id: &str) -> Option<&ActivityDef> {
        self.activities.get(id)
    }

    pub fn sentry(&self, index: usize) -> &SentryDeclaration {
        &self.definition.sentries[index]
    }

    /// Sentries with an on-part referencing `(source, event)`.
    pub fn sentries_listening(&self, source: &str, event: StandardEvent) -> &[usize] {
        self.listening
            .get(source)
            .and_then(|events| events.get(&event))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Sentries gating entry into or exit from `target`.
    pub fn sentries_gating(&self, target: &str) -> &[usize] {
        self.gating.get(target).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_entry_criteria(&self, target: &str) -> bool {
        self.sentries_gating(target)
            .iter()
            .any(|index| self.sentry(*index).kind == CriterionKind::Entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        case_plan, human_task, milestone, model, on_part, sentry, stage,
    };

    fn sample() -> CaseModel {
        model(
            "sample",
            case_plan(vec![
                human_task("A"),
                stage("S", vec![human_task("B"), milestone("M")]),
            ]),
            vec![
                sentry(
                    "exitS",
                    CriterionKind::Exit,
                    "S",
                    vec![on_part("A", StandardEvent::Complete)],
                ),
                sentry(
                    "enterM",
                    CriterionKind::Entry,
                    "M",
                    vec![
                        on_part("A", StandardEvent::Complete),
                        on_part("B", StandardEvent::Complete),
                    ],
                ),
            ],
        )
    }

    #[test]
    fn compile_indexes_activities_in_declaration_order() {
        let compiled = CompiledModel::compile(sample()).expect("compile");
        let stage = compiled.activity("S").expect("stage");
        assert_eq!(stage.children, vec!["B".to_string(), "M".to_string()]);
        assert_eq!(stage.parent.as_deref(), Some("CasePlanModel"));
        assert_eq!(compiled.root(), "CasePlanModel");
    }

    #[test]
    fn compile_indexes_on_parts_and_targets() {
        let compiled = CompiledModel::compile(sample()).expect("compile");
        assert_eq!(compiled.sentries_listening("A", StandardEvent::Complete), &[0, 1]);
        assert_eq!(compiled.sentries_listening("B", StandardEvent::Complete), &[1]);
        assert!(compiled.sentries_listening("B", StandardEvent::Exit).is_empty());
        assert!(compiled.has_entry_criteria("M"));
        assert!(!compiled.has_entry_criteria("S"));
    }

    #[test]
    fn compile_rejects_invalid_model() {
        let mut invalid = sample();
        invalid.sentries[0].target = "missing".to_string();
        let errors = CompiledModel::compile(invalid).expect_err("invalid");
        assert!(errors.iter().any(|err| err.contains("missing")));
    }

    #[test]
    fn parses_json_model() {
        let raw = r#"{
            "id": "exitTask",
            "plan": {
                "id": "CasePlanModel_1",
                "kind": "case_plan",
                "children": [
                    { "id": "PI_HumanTask_1", "kind": "human_task" },
                    {
                        "id": "PI_HumanTask_2",
                        "kind": "human_task",
                        "listeners": [
                            { "event": "exit", "set_variable": { "name": "exit", "value": true } }
                        ]
                    }
                ]
            },
            "sentries": [
                {
                    "id": "Sentry_1",
                    "kind": "exit",
                    "target": "PI_HumanTask_2",
                    "on_parts": [ { "source": "PI_HumanTask_1", "event": "complete" } ]
                }
            ]
        }"#;
        let parsed: CaseModel = serde_json::from_str(raw).expect("parse");
        assert_eq!(parsed.sentries[0].join, JoinType::And);
        assert_eq!(parsed.plan.children[1].listeners[0].event, StandardEvent::Exit);
        CompiledModel::compile(parsed).expect("compile");
    }
}
