//! Test-only helpers for constructing case models.

use serde_json::json;

use crate::core::types::{ActivityKind, CriterionKind, JoinType, StandardEvent};
use crate::model::{CaseModel, ListenerDecl, OnPart, PlanItem, SentryDeclaration, SetVariable};

/// Root id used by [`case_plan`].
pub const CASE_PLAN_ID: &str = "CasePlanModel";

/// Create a plan item with default fields and no children.
pub fn plan_item(id: &str, kind: ActivityKind) -> PlanItem {
    PlanItem {
        id: id.to_string(),
        kind,
        manual_activation: false,
        local_variables: Vec::new(),
        listeners: Vec::new(),
        children: Vec::new(),
    }
}

/// Create the case plan root with `children`.
pub fn case_plan(children: Vec<PlanItem>) -> PlanItem {
    PlanItem {
        children,
        ..plan_item(CASE_PLAN_ID, ActivityKind::CasePlan)
    }
}

pub fn stage(id: &str, children: Vec<PlanItem>) -> PlanItem {
    PlanItem {
        children,
        ..plan_item(id, ActivityKind::Stage)
    }
}

pub fn human_task(id: &str) -> PlanItem {
    plan_item(id, ActivityKind::HumanTask)
}

pub fn task(id: &str) -> PlanItem {
    plan_item(id, ActivityKind::Task)
}

pub fn milestone(id: &str) -> PlanItem {
    plan_item(id, ActivityKind::Milestone)
}

/// Mark a plan item as waiting for a manual start.
pub fn manual(mut item: PlanItem) -> PlanItem {
    item.manual_activation = true;
    item
}

/// Attach declared listeners to a plan item.
pub fn with_listeners(mut item: PlanItem, listeners: Vec<ListenerDecl>) -> PlanItem {
    item.listeners.extend(listeners);
    item
}

pub fn on_part(source: &str, event: StandardEvent) -> OnPart {
    OnPart {
        source: source.to_string(),
        event,
    }
}

/// AND-joined sentry without an if-part.
pub fn sentry(
    id: &str,
    kind: CriterionKind,
    target: &str,
    on_parts: Vec<OnPart>,
) -> SentryDeclaration {
    SentryDeclaration {
        id: id.to_string(),
        kind,
        target: target.to_string(),
        join: JoinType::And,
        on_parts,
        if_part: None,
    }
}

/// Same as [`sentry`] with an if-part.
pub fn guarded_sentry(
    id: &str,
    kind: CriterionKind,
    target: &str,
    on_parts: Vec<OnPart>,
    if_part: &str,
) -> SentryDeclaration {
    SentryDeclaration {
        if_part: Some(if_part.to_string()),
        ..sentry(id, kind, target, on_parts)
    }
}

/// Listener setting case variable `name` to `true` on `event`.
pub fn set_variable_listener(event: StandardEvent, name: &str) -> ListenerDecl {
    ListenerDecl {
        event,
        set_variable: SetVariable {
            name: name.to_string(),
            value: json!(true),
        },
    }
}

pub fn model(id: &str, plan: PlanItem, sentries: Vec<SentryDeclaration>) -> CaseModel {
    CaseModel {
        id: id.to_string(),
        name: format!("{id} model"),
        plan,
        sentries,
    }
}
