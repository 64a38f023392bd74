use anyhow::{Result, bail};

use super::{options, refresh_before_plan, target};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::{ExecutionPlan, execute};
use crate::session::Session;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let session = Session::open(ctx, true)?;
    let target = target(args.target.as_deref())?;
    let instances = session.instances(target.as_ref())?;

    if instances.is_empty() {
        ui::info("Nothing declared or tracked");
        return Ok(());
    }

    let opts = options(&session, args.jobs, args.yes, args.replace);
    if !args.no_refresh {
        refresh_before_plan(ctx, &instances, &opts)?;
    }

    let plan = ExecutionPlan::reconcile(&instances);
    let summary = execute(&instances, &plan, &opts)?;

    if !summary.is_success() {
        bail!(
            "{} of {} resources failed; state is saved in {}",
            summary.failed,
            summary.failed + summary.total_changes() + summary.skipped,
            session.store.path().display()
        );
    }
    Ok(())
}
