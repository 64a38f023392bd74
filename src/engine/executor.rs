//! Execution engine - runs planned steps with parallelism and tier ordering

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use rayon::prelude::*;
use reconcile::{Operation, Outcome, ReconcileContext};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::progress::{self, StepProgress};
use crate::resource::Managed;

use super::differ::display_plan;
use super::planner::{Action, ExecutionPlan, Step};

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Number of instances reconciled at once
    pub jobs: usize,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Turn replacements into delete-then-create
    pub replace: bool,
    pub poll: reconcile::PollConfig,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            yes: false,
            replace: false,
            poll: reconcile::PollConfig::default(),
        }
    }
}

/// How one step ended
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Applied(Outcome),
    /// Deleted and created again
    Replaced,
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub address: String,
    pub result: StepResult,
}

/// Summary of execution results
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub replaced: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.replaced + self.removed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn add(&mut self, result: &StepResult) {
        match result {
            StepResult::Applied(Outcome::Created | Outcome::Imported) => self.created += 1,
            StepResult::Applied(Outcome::Updated) => self.modified += 1,
            StepResult::Applied(Outcome::Deleted | Outcome::Gone) => self.removed += 1,
            StepResult::Applied(Outcome::Unchanged | Outcome::Refreshed) => self.no_change += 1,
            StepResult::Replaced => self.replaced += 1,
            StepResult::Skipped { .. } => self.skipped += 1,
            StepResult::Failed { .. } => self.failed += 1,
        }
    }

    pub fn from_reports(reports: &[StepReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            summary.add(&report.result);
        }
        summary
    }
}

/// Show the plan, confirm, run it, and print the summary
pub fn execute(
    instances: &[Box<dyn Managed>],
    plan: &ExecutionPlan,
    opts: &ExecuteOptions,
) -> Result<ExecuteSummary> {
    display_plan(plan, opts.replace);

    if !plan.has_changes() {
        return Ok(ExecuteSummary::default());
    }

    if !opts.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(ExecuteSummary {
            skipped: plan.counts().total(),
            ..Default::default()
        });
    }

    let reports = run_plan(instances, plan, opts)?;
    let summary = ExecuteSummary::from_reports(&reports);
    print_summary(&summary);
    Ok(summary)
}

/// Run every changing step of the plan.
///
/// Deletions go first, dependents before what they depend on; then creates,
/// updates and replacements, projects and indexes before API keys and
/// collections. Steps within a tier run in parallel.
pub fn run_plan(
    instances: &[Box<dyn Managed>],
    plan: &ExecutionPlan,
    opts: &ExecuteOptions,
) -> Result<Vec<StepReport>> {
    let by_address: HashMap<&str, &dyn Managed> = instances
        .iter()
        .map(|instance| (instance.address(), instance.as_ref()))
        .collect();

    let mut reports = Vec::new();
    for (label, steps) in phases(plan) {
        log::debug!("{label}: {} steps", steps.len());
        let phase = run_parallel(&steps, opts.jobs, label, |step, progress| {
            let Some(instance) = by_address.get(step.address.as_str()) else {
                return StepResult::Skipped {
                    reason: "no longer part of this run".to_string(),
                };
            };
            run_step(*instance, step, opts, progress)
        })?;
        reports.extend(phase);
    }
    Ok(reports)
}

/// Read every tracked instance so plans start from the remote truth
pub fn refresh(instances: &[Box<dyn Managed>], opts: &ExecuteOptions) -> Result<Vec<StepReport>> {
    let tracked: Vec<&dyn Managed> = instances
        .iter()
        .filter(|instance| instance.is_tracked())
        .map(|instance| instance.as_ref())
        .collect();
    if tracked.is_empty() {
        return Ok(Vec::new());
    }

    let steps: Vec<Step> = tracked
        .iter()
        .map(|instance| Step {
            address: instance.address().to_string(),
            kind: instance.kind(),
            remote_id: instance.remote_id(),
            action: Action::NoChange,
        })
        .collect();
    let by_address: HashMap<&str, &dyn Managed> = tracked
        .iter()
        .map(|instance| (instance.address(), *instance))
        .collect();

    let steps: Vec<&Step> = steps.iter().collect();
    run_parallel(&steps, opts.jobs, "Refreshing", |step, progress| {
        let Some(instance) = by_address.get(step.address.as_str()) else {
            return StepResult::Skipped {
                reason: "not tracked".to_string(),
            };
        };
        let mut ctx = ReconcileContext::new(progress).with_poll(opts.poll.clone());
        match instance.run(Operation::Read, &mut ctx) {
            Ok(outcome) => StepResult::Applied(outcome),
            Err(e) => StepResult::Failed {
                error: e.to_string(),
            },
        }
    })
}

fn phases(plan: &ExecutionPlan) -> Vec<(&'static str, Vec<&Step>)> {
    let mut deletions: BTreeMap<u8, Vec<&Step>> = BTreeMap::new();
    let mut changes: BTreeMap<u8, Vec<&Step>> = BTreeMap::new();
    for step in plan.steps.iter().filter(|s| s.action.is_change()) {
        let tiers = if step.action.is_removal() {
            &mut deletions
        } else {
            &mut changes
        };
        tiers.entry(step.kind.tier()).or_default().push(step);
    }

    let mut phases = Vec::new();
    phases.extend(deletions.into_values().rev().map(|steps| ("Deleting", steps)));
    phases.extend(changes.into_values().map(|steps| ("Applying", steps)));
    phases
}

fn run_step(
    instance: &dyn Managed,
    step: &Step,
    opts: &ExecuteOptions,
    progress: &mut dyn reconcile::ProgressCallback,
) -> StepResult {
    let mut ctx = ReconcileContext::new(progress).with_poll(opts.poll.clone());

    let result = match &step.action {
        Action::Invalid(error) => {
            return StepResult::Failed {
                error: error.clone(),
            };
        }
        Action::NoChange => return StepResult::Applied(Outcome::Unchanged),
        Action::Replace(drift) if !opts.replace => {
            return StepResult::Skipped {
                reason: format!(
                    "replacement required for: {} (rerun with --replace)",
                    drift.replace_fields().join(", ")
                ),
            };
        }
        Action::Replace(_) => replace(instance, &mut ctx),
        Action::Create => instance.run(Operation::Create, &mut ctx).map(StepResult::Applied),
        Action::Delete => instance.run(Operation::Delete, &mut ctx).map(StepResult::Applied),
        Action::Update(_) => match instance.run(Operation::Update, &mut ctx) {
            // Remote drift since the plan was computed
            Err(e) if e.is_replace_required() && opts.replace => replace(instance, &mut ctx),
            other => other.map(StepResult::Applied),
        },
    };

    result.unwrap_or_else(|e| {
        let mut error = e.to_string();
        if let Some(id) = e.remote_id()
            && e.remote_changed()
        {
            error.push_str(&format!(" (remote {} {id} exists and is tracked)", e.kind()));
        }
        StepResult::Failed { error }
    })
}

fn replace(
    instance: &dyn Managed,
    ctx: &mut ReconcileContext<'_>,
) -> reconcile::Result<StepResult> {
    log::info!("Replacing {}", instance.address());
    instance.run(Operation::Delete, ctx)?;
    instance.run(Operation::Create, ctx)?;
    Ok(StepResult::Replaced)
}

/// Run steps on a rayon pool, or one by one with a spinner when `jobs` is 1
fn run_parallel<F>(steps: &[&Step], jobs: usize, label: &str, run: F) -> Result<Vec<StepReport>>
where
    F: Fn(&Step, &mut dyn reconcile::ProgressCallback) -> StepResult + Sync,
{
    if jobs <= 1 || steps.len() == 1 {
        let mut reports = Vec::with_capacity(steps.len());
        for step in steps {
            let pb = progress::spinner(&format!("{label} {}", step.address));
            let mut progress = StepProgress::owned(pb.clone(), &step.address);
            let result = run(step, &mut progress);
            pb.finish_and_clear();
            let report = StepReport {
                address: step.address.clone(),
                result,
            };
            print_report(&report);
            reports.push(report);
        }
        return Ok(reports);
    }

    let pb = progress::bar(steps.len() as u64, label);
    let results: Arc<Mutex<Vec<StepReport>>> = Arc::new(Mutex::new(Vec::new()));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .context("Failed to create apply thread pool")?;

    pool.install(|| {
        steps.par_iter().for_each(|step| {
            let mut progress = StepProgress::shared(pb.clone(), &step.address);
            let result = run(step, &mut progress);

            let symbol = symbol(&result);
            pb.set_message(format!("{} {}", symbol, step.address));
            pb.inc(1);

            push_report(
                &results,
                StepReport {
                    address: step.address.clone(),
                    result,
                },
            );
        });
    });

    pb.finish_and_clear();

    let mut reports = into_reports(results)?;
    reports.sort_by(|a, b| a.address.cmp(&b.address));
    for report in &reports {
        print_report(report);
    }
    Ok(reports)
}

fn push_report(results: &Arc<Mutex<Vec<StepReport>>>, report: StepReport) {
    match results.lock() {
        Ok(mut locked) => locked.push(report),
        Err(poisoned) => poisoned.into_inner().push(report),
    }
}

fn into_reports(results: Arc<Mutex<Vec<StepReport>>>) -> Result<Vec<StepReport>> {
    let mutex = Arc::try_unwrap(results)
        .map_err(|_| anyhow::anyhow!("Failed to collect step results: shared result state"))?;

    match mutex.into_inner() {
        Ok(collected) => Ok(collected),
        Err(poisoned) => Ok(poisoned.into_inner()),
    }
}

fn symbol(result: &StepResult) -> colored::ColoredString {
    match result {
        StepResult::Applied(outcome) if outcome.is_change() => "✓".green(),
        StepResult::Replaced => "✓".green(),
        StepResult::Applied(Outcome::Gone) => "-".red(),
        StepResult::Applied(_) => "○".dimmed(),
        StepResult::Skipped { .. } => "⊘".yellow(),
        StepResult::Failed { .. } => "✗".red(),
    }
}

fn print_report(report: &StepReport) {
    if report.result == StepResult::Applied(Outcome::Refreshed) {
        log::info!("Refreshed {}", report.address);
        return;
    }
    let detail = match &report.result {
        StepResult::Applied(outcome) => outcome.to_string().dimmed().to_string(),
        StepResult::Replaced => "replaced".dimmed().to_string(),
        StepResult::Skipped { reason } => format!("skipped: {reason}").yellow().to_string(),
        StepResult::Failed { error } => error.red().to_string(),
    };
    println!("    {} {:<30} {}", symbol(&report.result), report.address, detail);
}

/// Confirm with user
pub fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Resources reconciled successfully!", "✓".green().bold());
    } else {
        println!("  {} Reconciled with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources updated", summary.modified);
    }
    if summary.replaced > 0 {
        println!("    • {} resources replaced", summary.replaced);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
