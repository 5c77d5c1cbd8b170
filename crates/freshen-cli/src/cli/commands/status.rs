//! `freshen status` – show installed manifests and loop-guard state.

use anyhow::Result;

use super::Env;

fn short(s: &str) -> &str {
    s.get(..12).unwrap_or(s)
}

pub async fn run_status(env: &Env) -> Result<()> {
    let ids = env.loader_ids(&[])?;
    if ids.is_empty() {
        println!("No loaders configured.");
        return Ok(());
    }
    println!("server: {}", env.server());
    println!("{:<10} {:<6} {:<13} {:<10} {}", "LOADER", "FILES", "INSTALLED", "GUARD", "MANIFEST");
    for id in ids {
        let loader = env.open(&id).await?;
        let installed = loader.manifest().fingerprint();
        let guard = match loader.last_attempted() {
            None => "-",
            Some(fp) if *fp == installed => "ok",
            Some(_) => "failed",
        };
        let installed = if loader.manifest().is_empty() {
            "-".to_string()
        } else {
            short(installed.as_str()).to_string()
        };
        println!(
            "{:<10} {:<6} {:<13} {:<10} {}",
            id,
            loader.manifest().files.len(),
            installed,
            guard,
            loader.manifest_url()
        );
    }
    Ok(())
}
