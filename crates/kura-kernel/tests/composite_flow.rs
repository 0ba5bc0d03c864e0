//! Integration tests: router + backends + eviction + file tools together.
//!
//! The fixture mounts three substrates behind one composite backend:
//!
//! - `/` → ephemeral conversation state (default, with the update hook)
//! - `/memories/` → persistent in-memory store
//! - `/disk/` → sandboxed local directory

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use kura_kernel::{
    BackendSource, CallContext, CompositeBackend, EphemeralBackend, EphemeralState,
    EvictionInterceptor, FileOperationError, FileToolContext, InMemoryStore, LocalDiskBackend,
    PersistentBackend, StorageBackend, ToolOutcome, ToolRegistry, register_file_tools,
};

// ============================================================================
// Shared test setup
// ============================================================================

struct Fixture {
    router: Arc<CompositeBackend>,
    state: EphemeralState,
    memories: Arc<dyn StorageBackend>,
    dir: TempDir,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let state = EphemeralState::new();
    let memories: Arc<dyn StorageBackend> =
        Arc::new(PersistentBackend::new(Arc::new(InMemoryStore::new())));
    let disk: Arc<dyn StorageBackend> =
        Arc::new(LocalDiskBackend::sandboxed(dir.path()).with_ripgrep(false));

    let router = CompositeBackend::new(Arc::new(EphemeralBackend::new(state.clone())))
        .with_route("/memories/", memories.clone())
        .with_route("/disk/", disk)
        .with_update_hook(Arc::new(state.clone()));

    Fixture {
        router: Arc::new(router),
        state,
        memories,
        dir,
    }
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn write_read_edit_through_routes() {
    let fx = fixture();

    for path in ["/notes.md", "/memories/notes.md", "/disk/notes.md"] {
        let res = fx.router.write(path, "alpha\nbeta").await.unwrap();
        assert!(res.is_ok(), "{path}: {:?}", res.error);
        assert_eq!(res.path.as_deref(), Some(path));

        let again = fx.router.write(path, "clobbered").await.unwrap();
        assert!(again.error.is_some());

        let edited = fx.router.edit(path, "beta", "gamma", false).await.unwrap();
        assert_eq!(edited.occurrences, Some(1));

        let text = fx.router.read_all(path).await.unwrap();
        assert!(text.contains("alpha"), "{path}: {text}");
        assert!(text.contains("gamma"));
        assert!(!text.contains("clobbered"));
    }

    // Routed backends see stripped paths.
    let direct = fx.memories.read_all("/notes.md").await.unwrap();
    assert!(direct.contains("gamma"));
    assert!(fx.dir.path().join("notes.md").exists());
    // The default backend's writes land in the shared state via the hook.
    assert!(fx.state.contains("/notes.md"));
}

#[tokio::test]
async fn longest_prefix_wins() {
    let outer: Arc<dyn StorageBackend> =
        Arc::new(PersistentBackend::new(Arc::new(InMemoryStore::new())));
    let inner: Arc<dyn StorageBackend> =
        Arc::new(PersistentBackend::new(Arc::new(InMemoryStore::new())));
    let router = CompositeBackend::new(Arc::new(EphemeralBackend::new(EphemeralState::new())))
        .with_route("/a/", outer.clone())
        .with_route("/a/b/", inner.clone());

    let resolved = router.resolve("/a/b/file");
    assert!(Arc::ptr_eq(resolved.backend, &inner));
    assert_eq!(resolved.path, "/file");

    router.write("/a/b/file", "deep").await.unwrap();
    assert!(inner.read_all("/file").await.unwrap().contains("deep"));
    assert!(outer.read_all("/b/file").await.unwrap().starts_with("Error:"));
}

#[tokio::test]
async fn root_listing_aggregates_routes() {
    let fx = fixture();
    fx.router.write("/scratch.md", "x").await.unwrap();
    fx.router.write("/memories/m.md", "x").await.unwrap();

    let root = fx.router.list("/").await.unwrap();
    let paths: Vec<&str> = root.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["/disk/", "/memories/", "/scratch.md"]);
    assert!(root[0].is_dir && root[1].is_dir && !root[2].is_dir);

    let memories = fx.router.list("/memories/").await.unwrap();
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].path, "/memories/m.md");
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn search_fans_out_when_unscoped() {
    let fx = fixture();
    fx.router.write("/scratch.md", "a needle here").await.unwrap();
    fx.router.write("/memories/m.md", "needle").await.unwrap();
    fx.router.write("/disk/d.txt", "no\nneedle").await.unwrap();

    let all = fx.router.search_text("needle", None, None).await.unwrap().unwrap();
    let mut paths: Vec<(&str, usize)> = all.iter().map(|m| (m.path.as_str(), m.line)).collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![("/disk/d.txt", 2), ("/memories/m.md", 1), ("/scratch.md", 1)]
    );

    let scoped = fx
        .router
        .search_text("needle", Some("/memories/"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].path, "/memories/m.md");

    let md = fx.router.search_glob("**/*.md", "/").await.unwrap();
    let mut md_paths: Vec<&str> = md.iter().map(|e| e.path.as_str()).collect();
    md_paths.sort();
    assert_eq!(md_paths, vec!["/memories/m.md", "/scratch.md"]);

    let shallow = fx.router.search_glob("*.txt", "/disk/").await.unwrap();
    assert_eq!(shallow.len(), 1);
    assert_eq!(shallow[0].path, "/disk/d.txt");
}

// ============================================================================
// Batches
// ============================================================================

#[tokio::test]
async fn batch_preserves_order_and_isolates_failures() {
    let fx = fixture();
    let uploads = fx
        .router
        .upload_batch(vec![
            ("/disk/x.bin".to_string(), vec![1, 2, 3]),
            ("/memories/y.txt".to_string(), b"why".to_vec()),
        ])
        .await
        .unwrap();
    assert!(uploads.iter().all(|u| u.error.is_none()));
    assert_eq!(uploads[0].path, "/disk/x.bin");

    let downloads = fx
        .router
        .download_batch(vec![
            "/disk/x.bin".to_string(),
            "/memories/missing.txt".to_string(),
            "/memories/y.txt".to_string(),
        ])
        .await
        .unwrap();
    let paths: Vec<&str> = downloads.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["/disk/x.bin", "/memories/missing.txt", "/memories/y.txt"]
    );
    assert_eq!(downloads[0].content.as_deref(), Some(&[1u8, 2, 3][..]));
    assert_eq!(downloads[1].error, Some(FileOperationError::FileNotFound));
    assert_eq!(downloads[2].content.as_deref(), Some(&b"why"[..]));
}

// ============================================================================
// Eviction and tools
// ============================================================================

#[tokio::test]
async fn eviction_boundary_through_router() {
    let fx = fixture();
    let limit = 10;
    let ctx = CallContext::new(fx.state.clone());
    let backend: Arc<dyn StorageBackend> = fx.router.clone();
    let mut registry = ToolRegistry::new().with_eviction(
        EvictionInterceptor::new(BackendSource::Instance(backend)).with_token_limit(Some(limit)),
        ctx,
    );
    register_file_tools(
        &mut registry,
        Arc::new(FileToolContext::new(
            BackendSource::Instance(fx.router.clone()),
            CallContext::new(fx.state.clone()),
        )),
    );

    fx.router
        .write("/at_limit.txt", &"a".repeat(4 * limit))
        .await
        .unwrap();
    fx.router
        .write("/over_limit.txt", &"a".repeat(4 * limit + 1))
        .await
        .unwrap();

    // read_file is a file tool and is never evicted; a shell-like "cat"
    // over the same content is.
    let read = registry
        .call(
            "read_file",
            "call-read",
            &json!({"file_path": "/over_limit.txt"}).to_string(),
        )
        .await
        .unwrap();
    assert!(matches!(read, ToolOutcome::Message(_)));

    let interceptor = EvictionInterceptor::new(BackendSource::Instance(fx.router.clone()))
        .with_token_limit(Some(limit));
    let call_ctx = CallContext::new(fx.state.clone());
    for (id, len, evicted) in [("at", 4 * limit, false), ("over", 4 * limit + 1, true)] {
        let message = kura_kernel::ToolMessage::text(id, "a".repeat(len));
        let outcome = interceptor
            .wrap("cat", &call_ctx, move || async move { ToolOutcome::Message(message) })
            .await;
        let stored = fx
            .router
            .read_all(&format!("/large_tool_results/{id}"))
            .await
            .unwrap();
        assert_eq!(!stored.starts_with("Error:"), evicted, "{id}: {stored}");
        assert_eq!(matches!(outcome, ToolOutcome::Command(_)), evicted);
    }
}

#[tokio::test]
async fn file_tools_over_composite() {
    let fx = fixture();
    let mut registry = ToolRegistry::new();
    register_file_tools(
        &mut registry,
        Arc::new(FileToolContext::new(
            BackendSource::Instance(fx.router.clone()),
            CallContext::new(fx.state.clone()),
        )),
    );

    let written = registry
        .execute(
            "write_file",
            &json!({"file_path": "/memories/plan.md", "content": "step one\nstep two"}).to_string(),
        )
        .await
        .unwrap();
    assert_eq!(written.stdout, "Updated file /memories/plan.md");

    let grep = registry
        .execute(
            "grep",
            &json!({"pattern": "step", "output_mode": "count"}).to_string(),
        )
        .await
        .unwrap();
    assert_eq!(grep.stdout, "/memories/plan.md: 2");

    let ls = registry
        .execute("ls", &json!({"path": "/"}).to_string())
        .await
        .unwrap();
    assert_eq!(ls.stdout, "/disk/\n/memories/");

    let traversal = registry
        .execute("ls", &json!({"path": "/disk/../etc"}).to_string())
        .await
        .unwrap();
    assert!(!traversal.success);
}
