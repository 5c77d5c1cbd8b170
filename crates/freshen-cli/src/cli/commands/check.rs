//! `freshen check` – look for updates without downloading.

use anyhow::{Context, Result};
use freshen_core::loader::{CheckOutcome, ManifestSource};

use super::Env;

pub async fn run_check(env: &Env, filter: &[String]) -> Result<()> {
    for id in env.loader_ids(filter)? {
        let mut loader = env.open(&id).await?;
        let outcome = loader
            .check(ManifestSource::Configured)
            .await
            .with_context(|| format!("check `{id}` at {}", loader.manifest_url()))?;
        match outcome {
            CheckOutcome::NoUpdate => println!("{id}: no update"),
            CheckOutcome::UpdateAvailable => {
                let plan = loader.plan();
                println!(
                    "{id}: update available ({} to download, {} to copy, {} to remove)",
                    plan.to_download.len(),
                    plan.to_copy.len(),
                    plan.to_delete.len()
                );
            }
            CheckOutcome::Corrupt => {
                println!("{id}: earlier update never completed; run `freshen reset --loader {id}`")
            }
        }
    }
    Ok(())
}
