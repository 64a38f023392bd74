// Reconciliation
pub mod apply;
pub mod destroy;
pub mod plan;
pub mod refresh;

// State inspection and adoption
pub mod import;
pub mod list;
pub mod show;

use anyhow::Result;

use crate::Context;
use crate::engine::{ExecuteOptions, Target, refresh as refresh_all};
use crate::resource::Managed;
use crate::session::Session;
use crate::ui;

fn target(target: Option<&str>) -> Result<Option<Target>> {
    target.map(Target::parse).transpose()
}

/// Read tracked instances before planning
fn refresh_before_plan(
    ctx: &Context,
    instances: &[Box<dyn Managed>],
    opts: &ExecuteOptions,
) -> Result<()> {
    if !ctx.quiet {
        ui::dim("Refreshing tracked resources...");
    }
    refresh_all(instances, opts)?;
    Ok(())
}

fn options(session: &Session, jobs: Option<usize>, yes: bool, replace: bool) -> ExecuteOptions {
    ExecuteOptions {
        jobs: jobs.unwrap_or(session.config.jobs).max(1),
        yes,
        replace,
        poll: session.poll(),
    }
}
