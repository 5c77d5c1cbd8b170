//! `freshen list` – local URLs of installed files, in load order.

use anyhow::Result;
use freshen_core::host;

use super::Env;

pub async fn run_list(env: &Env, id: &str) -> Result<()> {
    let loader = env.open(id).await?;
    let entries = host::load_entries(&loader)?;
    if entries.is_empty() {
        println!("{id}: nothing installed");
    }
    for e in entries {
        println!("{:<16} {:<32} {}", e.id, e.filename, e.url);
    }
    Ok(())
}
