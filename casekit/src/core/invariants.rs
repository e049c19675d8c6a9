//! Semantic invariants of a case model not expressible via JSON Schema.

use std::collections::HashSet;

use crate::core::types::{ActivityKind, CriterionKind};
use crate::model::{CaseModel, PlanItem};

/// Check semantic invariants of a case model:
/// - The root is the only `case_plan` item
/// - No duplicate plan item or sentry ids
/// - Only stages and the case plan have children
/// - Sentry targets and on-part sources reference existing plan items
/// - The case plan has no entry criteria
/// - Sentries without on-parts carry an if-part
pub fn validate_model(model: &CaseModel) -> Vec<String> {
    let mut errors = Vec::new();

    if model.id.trim().is_empty() {
        errors.push("case model id must be non-empty".to_string());
    }
    if model.plan.kind != ActivityKind::CasePlan {
        errors.push(format!(
            "{}: root plan item must be a case_plan",
            model.plan.id
        ));
    }

    let mut seen = HashSet::new();
    let mut stack: Vec<(&PlanItem, String)> = vec![(&model.plan, model.plan.id.clone())];
    while let Some((item, path)) = stack.pop() {
        validate_item(item, &path, &mut seen, &mut errors);
        if item.kind == ActivityKind::CasePlan && path != model.plan.id {
            errors.push(format!("{}: case_plan is only allowed at the root", path));
        }
        for child in item.children.iter().rev() {
            stack.push((child, format!("{}/{}", path, child.id)));
        }
    }

    let mut sentry_ids = HashSet::new();
    for sentry in &model.sentries {
        let label = format!("sentry '{}'", sentry.id);
        if !sentry_ids.insert(sentry.id.as_str()) {
            errors.push(format!("duplicate sentry id '{}'", sentry.id));
        }
        if !seen.contains(sentry.target.as_str()) {
            errors.push(format!(
                "{}: target '{}' is not a plan item",
                label, sentry.target
            ));
        }
        if sentry.kind == CriterionKind::Entry && sentry.target == model.plan.id {
            errors.push(format!(
                "{}: the case plan cannot have entry criteria",
                label
            ));
        }
        for part in &sentry.on_parts {
            if !seen.contains(part.source.as_str()) {
                errors.push(format!(
                    "{}: on-part source '{}' is not a plan item",
                    label, part.source
                ));
            }
        }
        let if_part_blank = sentry
            .if_part
            .as_deref()
            .is_none_or(|expr| expr.trim().is_empty());
        if sentry.on_parts.is_empty() && if_part_blank {
            errors.push(format!(
                "{}: needs at least one on-part or an if-part",
                label
            ));
        }
    }

    errors
}

fn validate_item<'a>(
    item: &'a PlanItem,
    path: &str,
    seen: &mut HashSet<&'a str>,
    errors: &mut Vec<String>,
) {
    if item.id.trim().is_empty() {
        errors.push(format!("{}: plan item id must be non-empty", path));
    }
    if !seen.insert(item.id.as_str()) {
        errors.push(format!("duplicate plan item id '{}' at {}", item.id, path));
    }
    if !item.kind.is_container() && !item.children.is_empty() {
        errors.push(format!("{}: only stages may have children", path));
    }
    if item.kind == ActivityKind::Milestone && item.manual_activation {
        errors.push(format!("{}: milestones cannot require manual activation", path));
    }
    for listener in &item.listeners {
        if listener.set_variable.name.trim().is_empty() {
            errors.push(format!(
                "{}: listener on '{}' must name a variable",
                path, listener.event
            ));
        }
    }
}
