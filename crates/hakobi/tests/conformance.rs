//! Runs the shared adapter suite against every bundled backend.
//!
//! Each run gets a fresh uuid root prefix, so suites sharing one adapter
//! never see each other's files. Set `RUST_LOG=hakobi=debug` for traces.

use std::sync::Arc;

use hakobi::backends::{LocalBackend, LocalConfig, MemoryBackend, ObjectStoreBackend};
use hakobi::{Adapter, Filesystem, FilesystemConfig, conformance};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Shared test setup
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A filesystem over `adapter`, namespaced under a random prefix.
fn namespaced(adapter: Arc<dyn Adapter>) -> Filesystem {
    let config = FilesystemConfig::default().with_root_prefix(uuid::Uuid::new_v4().to_string());
    Filesystem::from_arc(adapter, config).expect("default config is valid")
}

// ============================================================================
// Suites
// ============================================================================

#[tokio::test]
async fn memory_backend_conforms() {
    init_tracing();
    let fs = Filesystem::new(MemoryBackend::new());
    conformance::run(&fs).await.unwrap();
}

#[tokio::test]
async fn memory_backend_conforms_with_small_chunks() {
    init_tracing();
    let fs = namespaced(Arc::new(MemoryBackend::new().with_chunk_size(3)));
    conformance::run(&fs).await.unwrap();
}

#[tokio::test]
async fn local_backend_conforms() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let fs = Filesystem::new(LocalBackend::new(dir.path()));
    conformance::run(&fs).await.unwrap();
}

#[tokio::test]
async fn local_backend_conforms_under_prefix() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = LocalConfig {
        chunk_size: 1024,
        ..LocalConfig::default()
    };
    let fs = namespaced(Arc::new(LocalBackend::with_config(dir.path(), config)));
    conformance::run(&fs).await.unwrap();
}

#[tokio::test]
async fn object_store_conforms() {
    init_tracing();
    let fs = namespaced(Arc::new(ObjectStoreBackend::new()));
    conformance::run(&fs).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_suites_share_one_adapter() {
    init_tracing();
    let adapter: Arc<dyn Adapter> = Arc::new(ObjectStoreBackend::new());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let fs = namespaced(adapter.clone());
            tokio::spawn(async move { conformance::run(&fs).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
}
