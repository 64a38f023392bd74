use anyhow::{Result, bail};

use super::{options, target};
use crate::Context;
use crate::cli::DestroyArgs;
use crate::engine::{ExecutionPlan, execute};
use crate::session::Session;
use crate::ui;

pub fn run(ctx: &Context, args: DestroyArgs) -> Result<()> {
    let session = Session::open(ctx, false)?;
    let target = target(args.target.as_deref())?;
    let instances = session.instances(target.as_ref())?;

    let plan = ExecutionPlan::destroy(&instances);
    if plan.is_empty() {
        ui::info("Nothing tracked to destroy");
        return Ok(());
    }

    ui::warn(&format!(
        "This deletes {} remote resources tracked in {}",
        plan.steps.len(),
        session.store.path().display()
    ));

    let opts = options(&session, None, args.yes, false);
    let summary = execute(&instances, &plan, &opts)?;
    if !summary.is_success() {
        bail!("{} resources could not be destroyed", summary.failed);
    }
    Ok(())
}
