//! Integration test: a loader running against a local HTTP server through the
//! curl transport, with on-disk storage and an on-disk state db.

mod common;

use common::file_server::FileServer;
use freshen_core::config::LoaderConfig;
use freshen_core::error::{LoaderError, TransferError};
use freshen_core::host::{self, CycleReport};
use freshen_core::loader::{
    CheckOutcome, Collaborators, LoaderRegistry, LoaderState, ManifestSource, UpdateLoader,
};
use freshen_core::state_db::StateDb;
use freshen_core::storage::LocalStorage;
use freshen_core::transport::CurlTransport;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

async fn open_loader(
    server: &FileServer,
    cache_dir: &Path,
    db_path: &Path,
    registry: &LoaderRegistry,
    config: LoaderConfig,
) -> UpdateLoader {
    let collaborators = Collaborators {
        storage: Arc::new(LocalStorage::new(cache_dir)),
        transport: Arc::new(CurlTransport::default()),
        store: Arc::new(StateDb::open_at(db_path).await.unwrap()),
        reload: None,
    };
    let config = LoaderConfig {
        server_root: server.base().to_string(),
        ..config
    };
    UpdateLoader::open("source", config, registry, collaborators)
        .await
        .expect("open loader")
}

fn publish_v1(server: &FileServer) {
    server.put(
        "manifest.json",
        json!({
            "files": {
                "app": { "filename": "app.js", "version": 1 },
                "lib": { "filename": "lib/util.js", "version": 1 },
                "old": { "filename": "old.js", "version": 1 }
            },
            "load": ["lib", "app"]
        })
        .to_string(),
    );
    server.put("app.js", "app v1");
    server.put("lib/util.js", "util v1");
    server.put("old.js", "old v1");
}

#[tokio::test]
async fn update_cycle_downloads_replaces_and_deletes() {
    let server = FileServer::start();
    publish_v1(&server);
    let cache = tempdir().unwrap();
    let state = tempdir().unwrap();
    let db_path = state.path().join("state.db");
    let registry = LoaderRegistry::new();

    let mut loader = open_loader(&server, cache.path(), &db_path, &registry, LoaderConfig::default()).await;
    let report = host::run_cycle(&mut loader, None).await.unwrap();
    assert_eq!(report, CycleReport::Updated { fetched: 3, copied: 0, deleted: 0 });
    let root = cache.path().join("source");
    assert_eq!(std::fs::read_to_string(root.join("lib/util.js")).unwrap(), "util v1");

    // v2: app.js changes, old.js goes away.
    server.put(
        "manifest.json",
        json!({
            "files": {
                "app": { "filename": "app.js", "version": 2 },
                "lib": { "filename": "lib/util.js", "version": 1 }
            },
            "load": ["lib", "app"]
        })
        .to_string(),
    );
    server.put("app.js", "app v2");
    server.delete("old.js");

    let report = host::run_cycle(&mut loader, None).await.unwrap();
    assert_eq!(report, CycleReport::Updated { fetched: 1, copied: 0, deleted: 2 });
    assert_eq!(std::fs::read_to_string(root.join("app.js")).unwrap(), "app v2");
    assert!(!root.join("old.js").exists());
    assert_eq!(server.hits("lib/util.js"), 1);

    let entries = host::load_entries(&loader).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].filename, "lib/util.js");
    assert!(entries[0].url.starts_with("file://"));

    // Installed manifest survives a restart.
    drop(loader);
    let mut loader = open_loader(&server, cache.path(), &db_path, &registry, LoaderConfig::default()).await;
    assert_eq!(loader.manifest().files.len(), 2);
    assert_eq!(
        loader.check(ManifestSource::Configured).await.unwrap(),
        CheckOutcome::NoUpdate
    );
}

#[tokio::test]
async fn exhausted_retries_fail_download_then_guard_forces_reset() {
    let server = FileServer::start();
    publish_v1(&server);
    server.fail("old.js");
    let cache = tempdir().unwrap();
    let state = tempdir().unwrap();
    let db_path = state.path().join("state.db");
    let registry = LoaderRegistry::new();
    let config = LoaderConfig {
        retry: vec![0, 20],
        ..LoaderConfig::default()
    };

    let mut loader = open_loader(&server, cache.path(), &db_path, &registry, config.clone()).await;
    let err = host::run_cycle(&mut loader, None).await.unwrap_err();
    match err {
        LoaderError::Download(failed) => {
            assert_eq!(failed.files, vec!["old.js"]);
            assert!(matches!(failed.source, TransferError::Http(500)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(server.hits("old.js"), 3);
    assert!(loader.manifest().is_empty());
    assert!(!cache.path().join("source/old.js").exists());

    // After a restart the same manifest is refused, then reset clears the way.
    drop(loader);
    let mut loader = open_loader(&server, cache.path(), &db_path, &registry, config.clone()).await;
    assert_eq!(host::run_cycle(&mut loader, None).await.unwrap(), CycleReport::Reset);
    assert_eq!(loader.state(), LoaderState::Idle);

    server.heal("old.js");
    let report = host::run_cycle(&mut loader, None).await.unwrap();
    assert_eq!(report, CycleReport::Updated { fetched: 3, copied: 0, deleted: 0 });
    assert_eq!(
        std::fs::read_to_string(cache.path().join("source/old.js")).unwrap(),
        "old v1"
    );
}

#[tokio::test]
async fn manifest_requests_carry_cache_buster() {
    let server = FileServer::start();
    publish_v1(&server);
    let cache = tempdir().unwrap();
    let state = tempdir().unwrap();
    let registry = LoaderRegistry::new();
    let config = LoaderConfig {
        cache_buster: true,
        ..LoaderConfig::default()
    };

    let mut loader = open_loader(&server, cache.path(), &state.path().join("s.db"), &registry, config).await;
    loader.check(ManifestSource::Configured).await.unwrap();
    let first = server.requests().into_iter().next().unwrap();
    let (path, query) = first.split_once('?').expect("query present");
    assert_eq!(path, "/manifest.json");
    assert!(query.parse::<u128>().is_ok());

    let err = loader
        .check(ManifestSource::Url(server.url("missing.json")))
        .await
        .unwrap_err();
    assert!(matches!(err, LoaderError::Manifest(_)));
    assert_eq!(loader.state(), LoaderState::UpdateAvailable);
}
