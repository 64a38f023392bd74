use anyhow::{Result, bail};
use colored::Colorize;

use crate::Context;
use crate::state::{Record, StateStore};
use crate::ui;

pub fn run(ctx: &Context, address: Option<&str>) -> Result<()> {
    let store = StateStore::load(&ctx.state)?;
    let records: Vec<(String, Record)> = match address {
        Some(address) => match store.get(address) {
            Some(record) => vec![(address.to_string(), record)],
            None => bail!("{address} is not tracked in {}", store.path().display()),
        },
        None => store.records(),
    };

    if records.is_empty() {
        ui::info(&format!("Nothing tracked in {}", store.path().display()));
        return Ok(());
    }

    for (address, record) in records {
        let mut observed = record.observed;
        ui::mask_secrets(&mut observed);

        ui::header(&address);
        ui::kv("kind", record.kind.as_str());
        ui::kv("id", &record.id);
        ui::kv("updated", &record.updated_at.to_rfc3339());
        if record.desired.is_none() {
            ui::kv("declared", &"no".yellow().to_string());
        }
        println!();
        if ctx.verbose > 0 {
            println!("{}", serde_json::to_string_pretty(&observed)?);
        } else {
            ui::observed(&observed);
        }
    }
    Ok(())
}
