//! Execution planner - decides what each managed instance needs

use anyhow::{Result, bail};
use clap::ValueEnum;
use reconcile::DriftPlan;

use crate::resource::{Kind, Managed};

/// What a run will do to one instance
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Declared but not tracked
    Create,
    /// Tracked and declared, with mutable drift only
    Update(DriftPlan),
    /// Drift touches fields that cannot change in place
    Replace(DriftPlan),
    /// Tracked but no longer declared
    Delete,
    NoChange,
    /// The declaration does not translate into a request
    Invalid(String),
}

impl Action {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoChange)
    }

    /// Deletions run before everything else, dependents first
    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Delete)
    }
}

/// One planned action, with the instance it applies to
#[derive(Debug, Clone)]
pub struct Step {
    pub address: String,
    pub kind: Kind,
    pub remote_id: Option<String>,
    pub action: Action,
}

/// Counts of planned changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanCounts {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    pub invalid: usize,
}

impl PlanCounts {
    pub fn total(&self) -> usize {
        self.create + self.update + self.replace + self.delete + self.invalid
    }
}

/// Planned actions for a set of instances, in address order
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub steps: Vec<Step>,
}

impl ExecutionPlan {
    /// Plan reconciliation from the last observed state of every instance.
    ///
    /// No remote calls are made; refresh first for an up-to-date plan.
    pub fn reconcile(instances: &[Box<dyn Managed>]) -> Self {
        let steps = instances
            .iter()
            .filter_map(|instance| {
                let action = plan_instance(instance.as_ref())?;
                Some(step(instance.as_ref(), action))
            })
            .collect();
        Self { steps }
    }

    /// Plan deletion of every tracked instance
    pub fn destroy(instances: &[Box<dyn Managed>]) -> Self {
        let steps = instances
            .iter()
            .filter(|instance| instance.is_tracked())
            .map(|instance| step(instance.as_ref(), Action::Delete))
            .collect();
        Self { steps }
    }

    pub fn counts(&self) -> PlanCounts {
        let mut counts = PlanCounts::default();
        for step in &self.steps {
            match step.action {
                Action::Create => counts.create += 1,
                Action::Update(_) => counts.update += 1,
                Action::Replace(_) => counts.replace += 1,
                Action::Delete => counts.delete += 1,
                Action::Invalid(_) => counts.invalid += 1,
                Action::NoChange => {}
            }
        }
        counts
    }

    pub fn has_changes(&self) -> bool {
        self.steps.iter().any(|s| s.action.is_change())
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn step(instance: &dyn Managed, action: Action) -> Step {
    Step {
        address: instance.address().to_string(),
        kind: instance.kind(),
        remote_id: instance.remote_id(),
        action,
    }
}

fn plan_instance(instance: &dyn Managed) -> Option<Action> {
    match (instance.is_declared(), instance.is_tracked()) {
        (true, false) => Some(match instance.validate() {
            Ok(()) => Action::Create,
            Err(e) => Action::Invalid(e.to_string()),
        }),
        (true, true) => Some(match instance.drift() {
            Ok(Some(plan)) if plan.forces_replace() => Action::Replace(plan),
            Ok(Some(plan)) if !plan.is_empty() => Action::Update(plan),
            Ok(_) => Action::NoChange,
            Err(e) => Action::Invalid(e.to_string()),
        }),
        (false, true) => Some(Action::Delete),
        (false, false) => None,
    }
}

// ============================================================================
// Targets
// ============================================================================

/// A `--target` filter: a kind (`index`) or one address (`index.docs`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    kind: Kind,
    address: Option<String>,
}

impl Target {
    pub fn parse(target: &str) -> Result<Self> {
        let (kind, address) = match target.split_once('.') {
            Some((kind, address)) => (kind, Some(address)),
            None => (target, None),
        };
        let Ok(kind) = Kind::from_str(kind, true) else {
            let kinds: Vec<_> = Kind::value_variants().iter().map(Kind::as_str).collect();
            bail!(
                "Unknown resource kind '{kind}' in target '{target}' (expected one of: {})",
                kinds.join(", ")
            );
        };
        if address.is_some_and(str::is_empty) {
            bail!("Empty address in target '{target}'");
        }
        Ok(Self {
            kind,
            address: address.map(|a| format!("{}.{a}", kind.as_str())),
        })
    }

    pub fn matches(&self, kind: Kind, address: &str) -> bool {
        kind == self.kind && self.address.as_deref().is_none_or(|a| a == address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::Fixture;

    const MANIFEST: &str = r#"
[[project]]
address = "search"
name = "search"
max_pods = 5

[[index]]
address = "docs"
name = "docs"
dimension = 8
tags = { team = "search" }
spec.serverless = { cloud = "aws", region = "us-east-1" }

[[index]]
address = "broken"
name = "Not_Valid"
dimension = 8
spec.serverless = { cloud = "aws", region = "us-east-1" }
"#;

    fn seed_docs(fixture: &Fixture, tags: serde_json::Value, dimension: u32) {
        let session = fixture.session(MANIFEST);
        session
            .store
            .put(
                "index.docs",
                Kind::Index,
                None,
                serde_json::json!({
                    "id": "docs",
                    "name": "docs",
                    "host": "docs.svc.pinecone.io",
                    "status": {"ready": true, "state": "Ready"},
                    "dimension": dimension,
                    "metric": "cosine",
                    "deletion_protection": "disabled",
                    "vector_type": "dense",
                    "tags": tags,
                    "spec": {"serverless": {"cloud": "aws", "region": "us-east-1"}},
                }),
            )
            .unwrap();
    }

    fn action_for<'a>(plan: &'a ExecutionPlan, address: &str) -> &'a Action {
        &plan
            .steps
            .iter()
            .find(|s| s.address == address)
            .unwrap()
            .action
    }

    #[test]
    fn test_plan_fresh_manifest() {
        let fixture = Fixture::new();
        let session = fixture.session(MANIFEST);
        let plan = ExecutionPlan::reconcile(&session.instances(None).unwrap());

        assert_eq!(action_for(&plan, "project.search"), &Action::Create);
        assert_eq!(action_for(&plan, "index.docs"), &Action::Create);
        assert!(matches!(action_for(&plan, "index.broken"), Action::Invalid(msg) if msg.contains("name")));
        assert_eq!(
            plan.counts(),
            PlanCounts {
                create: 2,
                invalid: 1,
                ..Default::default()
            }
        );
        assert_eq!(fixture.backend.total_calls(), 0);
    }

    #[test]
    fn test_plan_tracked_instances() {
        let fixture = Fixture::new();
        seed_docs(&fixture, serde_json::json!({"team": "search"}), 8);
        let plan = ExecutionPlan::reconcile(&fixture.session(MANIFEST).instances(None).unwrap());
        assert_eq!(action_for(&plan, "index.docs"), &Action::NoChange);

        seed_docs(&fixture, serde_json::json!({"team": "ads"}), 8);
        let plan = ExecutionPlan::reconcile(&fixture.session(MANIFEST).instances(None).unwrap());
        let Action::Update(drift) = action_for(&plan, "index.docs") else {
            panic!("expected an update");
        };
        assert!(drift.changed("tags"));

        seed_docs(&fixture, serde_json::json!({"team": "search"}), 16);
        let plan = ExecutionPlan::reconcile(&fixture.session(MANIFEST).instances(None).unwrap());
        let Action::Replace(drift) = action_for(&plan, "index.docs") else {
            panic!("expected a replacement");
        };
        assert_eq!(drift.replace_fields(), vec!["dimension"]);
    }

    #[test]
    fn test_plan_orphan_and_destroy() {
        let fixture = Fixture::new();
        seed_docs(&fixture, serde_json::json!({}), 8);
        let session = fixture.session("");
        let instances = session.instances(None).unwrap();

        let plan = ExecutionPlan::reconcile(&instances);
        assert_eq!(action_for(&plan, "index.docs"), &Action::Delete);

        let plan = ExecutionPlan::destroy(&instances);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].remote_id.as_deref(), Some("docs"));
    }

    #[test]
    fn test_parse_target() {
        let kind = Target::parse("index").unwrap();
        assert!(kind.matches(Kind::Index, "index.docs"));
        assert!(!kind.matches(Kind::Project, "project.docs"));

        let one = Target::parse("index.docs").unwrap();
        assert!(one.matches(Kind::Index, "index.docs"));
        assert!(!one.matches(Kind::Index, "index.other"));

        let key = Target::parse("api_key.ci").unwrap();
        assert!(key.matches(Kind::ApiKey, "api_key.ci"));

        assert!(Target::parse("widget").is_err());
        assert!(Target::parse("index.").is_err());
    }
}
