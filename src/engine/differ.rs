//! Plan display

use colored::{ColoredString, Colorize};
use reconcile::{ChangeKind, FieldChange};
use std::collections::BTreeMap;

use super::planner::{Action, ExecutionPlan, Step};
use crate::resource::Kind;

/// Display a plan in a user-friendly format
pub fn display_plan(plan: &ExecutionPlan, replace: bool) {
    if !plan.has_changes() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    let mut by_kind: BTreeMap<Kind, Vec<&Step>> = BTreeMap::new();
    for step in plan.steps.iter().filter(|s| s.action.is_change()) {
        by_kind.entry(step.kind).or_default().push(step);
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Execution Plan".bold()
    );
    println!("│");

    for (kind, steps) in &by_kind {
        println!("│ {}", kind_title(*kind).bold());

        for step in steps {
            let id = step
                .remote_id
                .as_deref()
                .map(|id| format!("({id})"))
                .unwrap_or_default();
            println!(
                "│   {} {:<30} {} {}",
                symbol(&step.action),
                step.address,
                describe(&step.action, replace),
                id.dimmed()
            );

            if let Action::Update(drift) | Action::Replace(drift) = &step.action {
                for change in drift
                    .changes
                    .iter()
                    .filter(|c| c.kind != ChangeKind::RemoteComputed)
                {
                    println!("│       {}", format_change(change));
                }
            }
            if let Action::Invalid(error) = &step.action {
                println!("│       {}", error.red());
            }
        }
        println!("│");
    }

    let counts = plan.counts();
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Plan: {} to create, {} to update, {} to replace, {} to delete",
        counts.create.to_string().green(),
        counts.update.to_string().yellow(),
        counts.replace.to_string().red(),
        counts.delete.to_string().red()
    );
    if counts.invalid > 0 {
        println!(
            "│       {} invalid declarations",
            counts.invalid.to_string().red().bold()
        );
    }
    println!("└─────────────────────────────────────────────────────┘");
}

fn kind_title(kind: Kind) -> &'static str {
    match kind {
        Kind::Project => "Projects",
        Kind::Index => "Indexes",
        Kind::ApiKey => "API keys",
        Kind::Collection => "Collections",
    }
}

fn symbol(action: &Action) -> ColoredString {
    match action {
        Action::Create => "+".green(),
        Action::Update(_) => "~".yellow(),
        Action::Replace(_) => "±".red(),
        Action::Delete => "-".red(),
        Action::Invalid(_) => "!".red().bold(),
        Action::NoChange => "○".dimmed(),
    }
}

fn describe(action: &Action, replace: bool) -> ColoredString {
    match action {
        Action::Create => "(will create)".dimmed(),
        Action::Update(_) => "(update in place)".dimmed(),
        Action::Replace(_) if replace => "(will delete and recreate)".red(),
        Action::Replace(_) => "(requires replacement, pass --replace)".yellow(),
        Action::Delete => "(will delete)".dimmed(),
        Action::Invalid(_) => "(invalid)".red(),
        Action::NoChange => "".normal(),
    }
}

/// One drift line: `field: from → to`, flagged when it forces replacement
pub fn format_change(change: &FieldChange) -> String {
    let from = change.from.as_deref().unwrap_or("(unset)");
    let to = change.to.as_deref().unwrap_or("(unset)");
    let line = format!("{}: {} → {}", change.field, from, to);
    match change.kind {
        ChangeKind::ForcesReplace => format!("{} {}", line, "# forces replacement".red()),
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_change() {
        colored::control::set_override(false);

        let change = FieldChange {
            field: "dimension".to_string(),
            kind: ChangeKind::ForcesReplace,
            from: Some("8".to_string()),
            to: Some("16".to_string()),
        };
        assert_eq!(format_change(&change), "dimension: 8 → 16 # forces replacement");

        let change = FieldChange {
            field: "spec.pod.replicas".to_string(),
            kind: ChangeKind::MutableUpdate,
            from: None,
            to: Some("2".to_string()),
        };
        assert_eq!(format_change(&change), "spec.pod.replicas: (unset) → 2");
    }

    #[test]
    fn test_replace_description_depends_on_flag() {
        colored::control::set_override(false);
        let action = Action::Replace(reconcile::DriftPlan::new());
        assert!(describe(&action, false).to_string().contains("--replace"));
        assert!(describe(&action, true).to_string().contains("recreate"));
    }
}
