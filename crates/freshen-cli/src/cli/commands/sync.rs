//! `freshen sync` – run one update cycle per loader.

use anyhow::{Context, Result};
use freshen_core::host::{self, CycleReport};
use freshen_core::scheduler::{ProgressCallback, ProgressStats};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::Env;

const PROGRESS_INTERVAL_MS: u128 = 250;

pub async fn run_sync(env: &Env, filter: &[String], quiet: bool) -> Result<()> {
    match sync_all(env, filter, quiet).await {
        Ok(()) => Ok(()),
        Err(err) if !env.is_default_server() => {
            tracing::warn!(server = %env.server(), "sync failed, rolling back to default server: {:#}", err);
            eprintln!(
                "sync against {} failed: {:#}\nretrying with default server",
                env.server(),
                err
            );
            sync_all(&env.with_default_server(), filter, quiet).await
        }
        Err(err) => Err(err),
    }
}

async fn sync_all(env: &Env, filter: &[String], quiet: bool) -> Result<()> {
    for id in env.loader_ids(filter)? {
        let mut loader = env.open(&id).await?;
        let progress = (!quiet).then(|| progress_printer(&id));
        let report = host::run_cycle(&mut loader, progress)
            .await
            .with_context(|| format!("update `{id}` from {}", env.server()))?;
        match report {
            CycleReport::UpToDate => println!("{id}: up to date"),
            CycleReport::Updated { fetched, copied, deleted } => println!(
                "{id}: updated ({fetched} downloaded, {copied} copied, {deleted} removed)"
            ),
            CycleReport::Reset => println!("{id}: earlier update never completed; local state reset"),
        }
    }
    Ok(())
}

fn progress_printer(id: &str) -> ProgressCallback {
    let id = id.to_string();
    let last = Mutex::new(None::<Instant>);
    Arc::new(move |stats: &ProgressStats| {
        let done = stats.fraction() >= 1.0;
        {
            let mut last = last.lock().unwrap_or_else(|e| e.into_inner());
            let due = last.map_or(true, |t| t.elapsed().as_millis() >= PROGRESS_INTERVAL_MS);
            if !due && !done {
                return;
            }
            *last = Some(Instant::now());
        }
        let mut err = std::io::stderr().lock();
        let _ = write!(
            err,
            "\r{id}: {:5.1}% ({}/{} files, {:.1} KiB/s)",
            stats.percentage(),
            stats.files_done,
            stats.file_count,
            stats.bytes_per_sec() / 1024.0
        );
        if done {
            let _ = writeln!(err);
        }
        let _ = err.flush();
    })
}
