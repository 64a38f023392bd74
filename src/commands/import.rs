use anyhow::{Result, bail};
use reconcile::ReconcileContext;

use crate::Context;
use crate::cli::ImportArgs;
use crate::progress::{self, StepProgress};
use crate::session::Session;
use crate::ui;

pub fn run(ctx: &Context, args: ImportArgs) -> Result<()> {
    let session = Session::open(ctx, false)?;
    let instance = session.instance(args.kind, &args.address)?;

    if let Some(id) = instance.remote_id() {
        bail!(
            "{} is already tracked (remote id {id}); remove it from state first",
            instance.address()
        );
    }

    let pb = progress::spinner(&format!("Importing {} {}", args.kind, args.id));
    let mut progress = StepProgress::owned(pb.clone(), instance.address());
    let mut rctx = ReconcileContext::new(&mut progress).with_poll(session.poll());
    let result = instance.import(&args.id, &mut rctx);
    pb.finish_and_clear();
    result?;

    ui::success(&format!("Imported {} as {}", args.id, instance.address()));
    if !instance.is_declared() {
        ui::dim("Not declared in the manifest yet; apply would delete it");
    } else if let Some(drift) = instance.drift()?
        && !drift.is_empty()
    {
        ui::dim("Differs from its declaration; run plan to see the changes");
    }
    Ok(())
}
