use anyhow::{Context as _, Result, bail};
use pinecone::ControlPlane;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::Context;
use crate::cli::ListArgs;
use crate::resource::Kind;
use crate::session::Session;
use crate::state::StateStore;
use crate::ui;

/// One remote object as listed
#[derive(Debug)]
pub struct Listed {
    pub name: String,
    pub id: String,
    pub observed: Value,
    /// Address it is tracked under, if any
    pub tracked: Option<String>,
}

pub fn run(ctx: &Context, args: ListArgs) -> Result<()> {
    let session = Session::open(ctx, false)?;
    let listed = list(
        &**session.client(),
        &session.store,
        args.kind,
        args.project.as_deref(),
        args.name.as_deref(),
    )?;

    if listed.is_empty() {
        ui::info(&format!("No {} found", args.kind));
        return Ok(());
    }

    for item in listed {
        let mut observed = item.observed;
        ui::mask_secrets(&mut observed);

        ui::header(&item.name);
        if item.id != item.name {
            ui::kv("id", &item.id);
        }
        ui::kv("tracked", item.tracked.as_deref().unwrap_or("no"));
        println!();
        if ctx.verbose > 0 {
            println!("{}", serde_json::to_string_pretty(&observed)?);
        } else {
            ui::observed(&observed);
        }
    }
    Ok(())
}

/// Read remote objects of one kind, optionally narrowed to one name or id.
///
/// API keys are listed per project, so `project` is required for them.
pub fn list(
    client: &dyn ControlPlane,
    store: &StateStore,
    kind: Kind,
    project: Option<&str>,
    name: Option<&str>,
) -> Result<Vec<Listed>> {
    let items = match kind {
        Kind::Index => entries(client.list_indexes(), |i| (i.name.clone(), i.name.clone()))?,
        Kind::Collection => {
            entries(client.list_collections(), |c| (c.name.clone(), c.name.clone()))?
        }
        Kind::Project => entries(client.list_projects(), |p| (p.name.clone(), p.id.clone()))?,
        Kind::ApiKey => {
            let Some(project) = project else {
                bail!("Listing API keys needs --project <id>");
            };
            entries(client.list_api_keys(project), |k| (k.name.clone(), k.id.clone()))?
        }
    };

    let tracked: HashMap<String, String> = store
        .records()
        .into_iter()
        .filter(|(_, record)| record.kind == kind)
        .map(|(address, record)| (record.id, address))
        .collect();

    let mut listed: Vec<Listed> = items
        .into_iter()
        .filter(|(n, id, _)| {
            name.is_none_or(|wanted| n.as_str() == wanted || id.as_str() == wanted)
        })
        .map(|(name, id, observed)| Listed {
            tracked: tracked.get(&id).cloned(),
            name,
            id,
            observed,
        })
        .collect();
    listed.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

    if let Some(wanted) = name
        && listed.is_empty()
    {
        bail!("No {kind} named '{wanted}'");
    }
    Ok(listed)
}

fn entries<T: Serialize>(
    items: pinecone::Result<Vec<T>>,
    key: impl Fn(&T) -> (String, String),
) -> Result<Vec<(String, String, Value)>> {
    items?
        .iter()
        .map(|item| {
            let (name, id) = key(item);
            let observed = serde_json::to_value(item)
                .with_context(|| format!("Failed to serialize '{name}'"))?;
            Ok((name, id, observed))
        })
        .collect()
}
