use anyhow::Result;
use reconcile::Outcome;

use super::options;
use crate::Context;
use crate::engine::{StepResult, refresh};
use crate::session::Session;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx, false)?;
    let instances = session.instances(None)?;
    let reports = refresh(&instances, &options(&session, None, true, false))?;

    if reports.is_empty() {
        ui::info("Nothing tracked");
        return Ok(());
    }

    let refreshed = reports
        .iter()
        .filter(|r| r.result == StepResult::Applied(Outcome::Refreshed))
        .count();
    let gone = reports
        .iter()
        .filter(|r| r.result == StepResult::Applied(Outcome::Gone))
        .count();
    let failed = reports.len() - refreshed - gone;

    println!();
    ui::success(&format!("Refreshed {refreshed} resources"));
    if gone > 0 {
        ui::warn(&format!("{gone} no longer exist and were dropped from state"));
    }
    if failed > 0 {
        anyhow::bail!("{failed} resources could not be read");
    }
    Ok(())
}
