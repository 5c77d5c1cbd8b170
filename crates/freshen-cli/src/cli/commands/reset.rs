//! `freshen reset` – erase installed state and cached files.

use anyhow::{Context, Result};

use super::Env;

pub async fn run_reset(env: &Env, filter: &[String]) -> Result<()> {
    for id in env.loader_ids(filter)? {
        let mut loader = env.open(&id).await?;
        loader
            .reset()
            .await
            .with_context(|| format!("reset `{id}`"))?;
        println!("{id}: reset");
    }
    Ok(())
}
