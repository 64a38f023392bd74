use anyhow::Result;

use super::{options, refresh_before_plan, target};
use crate::Context;
use crate::cli::PlanArgs;
use crate::engine::ExecutionPlan;
use crate::engine::differ::display_plan;
use crate::session::Session;
use crate::ui;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let session = Session::open(ctx, true)?;
    let target = target(args.target.as_deref())?;
    let instances = session.instances(target.as_ref())?;

    if instances.is_empty() {
        ui::info("Nothing declared or tracked");
        return Ok(());
    }

    if !args.no_refresh {
        refresh_before_plan(ctx, &instances, &options(&session, None, true, false))?;
    }

    let plan = ExecutionPlan::reconcile(&instances);
    display_plan(&plan, false);

    if plan.counts().invalid > 0 {
        anyhow::bail!("The manifest has invalid declarations");
    }
    Ok(())
}
