//! End-to-end behaviour of a store backed by a container on disk.

use std::collections::BTreeMap;
use std::sync::{Arc, Once};

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use keytree_common::Error;
use keytree_crypto::KdfParams;
use keytree_store::{
    ContainerCodec, Credentials, EntryInput, EntryOperations, Matcher, ReadPolicy,
    SealedJsonCodec, StoreConfig, StoreController, StoreState, Tree,
};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn config(dir: &TempDir) -> StoreConfig {
    StoreConfig::new(dir.path().join("store.kt"), "integration")
        .unwrap()
        .with_kdf(KdfParams {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        })
}

async fn empty_store(dir: &TempDir) -> Arc<StoreController> {
    init_tracing();
    StoreController::create(config(dir), Tree::new()).await.unwrap()
}

fn user(name: &str) -> EntryInput {
    EntryInput {
        username: Some(name.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn scenario_matchers_pick_between_same_titled_entries() {
    let dir = TempDir::new().unwrap();
    let controller = empty_store(&dir).await;
    let ops = EntryOperations::new(&controller);

    let foo = ops
        .create_at_path("Root/child1/child2/secret", &user("foo"))
        .await
        .unwrap();
    let lorem = ops
        .create_in_group(
            foo.group_id,
            &EntryInput {
                title: Some("secret".to_string()),
                ..user("lorem")
            },
        )
        .await
        .unwrap();

    let reopened = StoreController::open(config(&dir)).await.unwrap();
    let ops = EntryOperations::new(&reopened);

    let first = ops
        .read_by_path("Root/child1/child2/secret", &[])
        .await
        .unwrap();
    assert_eq!(first.username.as_deref(), Some("foo"));

    let matched = ops
        .read_by_path(
            "Root/child1/child2/secret",
            &[Matcher::new("UserName", "lorem")],
        )
        .await
        .unwrap();
    assert_eq!(matched.entry_id, lorem.entry_id);
}

#[tokio::test]
async fn create_then_resolve_without_reload() {
    let dir = TempDir::new().unwrap();
    let controller = empty_store(&dir).await;
    let ops = EntryOperations::new(&controller);

    let created = ops.create_at_path("/Root/a/b/title", &user("x")).await.unwrap();
    let found = controller
        .read_with(ReadPolicy::Cached, |tree| {
            let found = keytree_store::resolver::resolve(tree, "Root/a/b/title", &[])?;
            Ok((found.entry.id(), found.entry.title().to_string()))
        })
        .await
        .unwrap();

    assert_eq!(found, (created.entry_id, "title".to_string()));
}

#[tokio::test]
async fn short_paths_are_invalid() {
    let dir = TempDir::new().unwrap();
    let controller = empty_store(&dir).await;
    let ops = EntryOperations::new(&controller);

    for path in ["title", "/title"] {
        assert!(matches!(
            ops.create_at_path(path, &EntryInput::default()).await,
            Err(Error::InvalidPath { .. })
        ));
        assert!(matches!(
            ops.read_by_path(path, &[]).await,
            Err(Error::InvalidPath { .. })
        ));
    }
}

#[tokio::test]
async fn duplicate_create_leaves_one_entry() {
    let dir = TempDir::new().unwrap();
    let controller = empty_store(&dir).await;
    let ops = EntryOperations::new(&controller);

    ops.create_at_path("Root/dup", &user("first")).await.unwrap();
    let second = ops.create_at_path("Root/dup", &user("second")).await;
    assert!(matches!(second, Err(Error::DuplicateEntry { .. })));

    let reopened = StoreController::open(config(&dir)).await.unwrap();
    let count = reopened.read(|tree| Ok(tree.count_entries())).await.unwrap();
    assert_eq!(count, 1);
    let kept = EntryOperations::new(&reopened)
        .read_by_path("Root/dup", &[])
        .await
        .unwrap();
    assert_eq!(kept.username.as_deref(), Some("first"));
}

#[tokio::test]
async fn delete_on_missing_chain_succeeds() {
    let dir = TempDir::new().unwrap();
    let controller = empty_store(&dir).await;
    let ops = EntryOperations::new(&controller);

    assert!(!ops.delete_at_path("Nowhere/at/all").await.unwrap());
    assert!(matches!(
        ops.read_by_path("Nowhere/at/all", &[]).await,
        Err(Error::GroupNotFound { .. })
    ));
}

#[tokio::test]
async fn container_round_trip_keeps_everything() {
    let dir = TempDir::new().unwrap();
    let controller = empty_store(&dir).await;
    let ops = EntryOperations::new(&controller);

    let input = EntryInput {
        username: Some("alice".to_string()),
        password: Some("s3cret".to_string()),
        url: Some("https://example.org".to_string()),
        notes: Some("line one\nline two".to_string()),
        attributes: BTreeMap::from([
            ("otp".to_string(), "123456".to_string()),
            ("région".to_string(), "EU".to_string()),
        ]),
        ..Default::default()
    };
    let created = ops.create_at_path("Root/services/mail", &input).await.unwrap();
    drop(controller);

    let reopened = StoreController::open(config(&dir)).await.unwrap();
    let restored = EntryOperations::new(&reopened)
        .read(created.group_id, created.entry_id)
        .await
        .unwrap();

    assert_eq!(restored.title, "mail");
    assert_eq!(restored.username, input.username);
    assert_eq!(restored.password.as_ref().map(|p| p.expose()), Some("s3cret"));
    assert_eq!(restored.url, input.url);
    assert_eq!(restored.notes, input.notes);
    assert_eq!(restored.attributes, input.attributes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_on_disjoint_paths_all_persist() {
    let dir = TempDir::new().unwrap();
    let controller = empty_store(&dir).await;

    let own_groups = (0..8).map(|i| {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            EntryOperations::new(&controller)
                .create_at_path(&format!("Root/team{}/entry", i), &user("u"))
                .await
        })
    });
    let shared_group = (0..8).map(|i| {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            EntryOperations::new(&controller)
                .create_at_path(&format!("Root/shared/entry{}", i), &user("u"))
                .await
        })
    });

    for result in futures::future::join_all(own_groups.chain(shared_group)).await {
        result.unwrap().unwrap();
    }

    let reopened = StoreController::open(config(&dir)).await.unwrap();
    let (root_groups, shared) = reopened
        .read(|tree| {
            let root = tree
                .child("Root")
                .ok_or_else(|| Error::NotLoaded("no Root group".to_string()))?;
            Ok((
                root.groups().len(),
                root.child("shared").map(|g| g.entries().len()),
            ))
        })
        .await
        .unwrap();
    assert_eq!(root_groups, 9);
    assert_eq!(shared, Some(8));
    assert_eq!(
        reopened.read(|tree| Ok(tree.count_entries())).await.unwrap(),
        16
    );
}

#[tokio::test]
async fn reload_failure_keeps_serving_reads() {
    let dir = TempDir::new().unwrap();
    let controller = empty_store(&dir).await;
    EntryOperations::new(&controller)
        .create_at_path("Root/kept", &user("k"))
        .await
        .unwrap();

    std::fs::write(dir.path().join("store.kt"), b"{}").unwrap();

    assert!(controller.reload().await.is_err());
    assert_eq!(controller.state(), StoreState::Loaded);
    assert!(EntryOperations::new(&controller)
        .read_by_path("Root/kept", &[])
        .await
        .is_ok());

    // Mutations reload first and surface the corruption.
    assert!(matches!(
        EntryOperations::new(&controller)
            .create_at_path("Root/new", &user("n"))
            .await,
        Err(Error::Decode(_))
    ));
}

/// Decodes like the sealed codec but refuses to encode.
struct ReadOnlyCodec(SealedJsonCodec);

impl ContainerCodec for ReadOnlyCodec {
    fn decode(&self, bytes: &[u8], credentials: &Credentials) -> keytree_common::Result<Tree> {
        self.0.decode(bytes, credentials)
    }

    fn encode(&self, _tree: &Tree, _credentials: &Credentials) -> keytree_common::Result<Vec<u8>> {
        Err(Error::Encode("read-only".to_string()))
    }
}

#[tokio::test]
async fn failed_encode_leaves_container_intact() {
    let dir = TempDir::new().unwrap();
    let controller = empty_store(&dir).await;
    EntryOperations::new(&controller)
        .create_at_path("Root/kept", &user("k"))
        .await
        .unwrap();
    let before = std::fs::read(dir.path().join("store.kt")).unwrap();

    let read_only = StoreController::with_codec(
        config(&dir),
        Arc::new(ReadOnlyCodec(SealedJsonCodec::default())),
    );
    read_only.load().await.unwrap();

    let result = EntryOperations::new(&read_only)
        .create_at_path("Root/rejected", &user("r"))
        .await;
    assert!(matches!(result, Err(Error::Encode(_))));

    assert_eq!(std::fs::read(dir.path().join("store.kt")).unwrap(), before);
    let leftovers = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".keytree-"))
        .count();
    assert_eq!(leftovers, 0);

    let names = read_only
        .read(|tree| Ok(keytree_store::resolver::resolve(tree, "Root/rejected", &[]).is_ok()))
        .await
        .unwrap();
    assert!(!names);
}
