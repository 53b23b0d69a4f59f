//! Content cache contract over a real SQLite store and on-disk assets.

use std::sync::Arc;

use tempfile::TempDir;

use broll::cache::{AssetStore, ContentCache};
use broll::database::connect;
use broll::database::models::{MediaKind, NewMediaCacheEntry};
use broll::database::repositories::{MediaCacheRepository, SqlxMediaCacheRepository};

async fn open() -> (TempDir, Arc<SqlxMediaCacheRepository>, ContentCache) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("cache.db").display());
    let pool = connect(&url).await.unwrap();
    let repo = Arc::new(SqlxMediaCacheRepository::new(pool));
    let cache = ContentCache::new(repo.clone());
    (dir, repo, cache)
}

fn entry(query: &str, hash: &str, quality: i64) -> NewMediaCacheEntry {
    NewMediaCacheEntry {
        query: query.to_string(),
        source: "nasa".to_string(),
        source_url: format!("https://images.test/{hash}.jpg"),
        local_path: format!("/tmp/{hash}.jpg"),
        content_hash: hash.to_string(),
        kind: MediaKind::Image,
        resolution: None,
        file_size: 10,
        quality_score: Some(quality),
    }
}

#[tokio::test]
async fn test_equal_quality_prefers_more_used_entry() {
    let (_dir, _repo, cache) = open().await;

    let reused = cache.insert(entry("aurora", "first", 5)).await.unwrap();
    cache.lookup("aurora").await.unwrap();
    cache.lookup("aurora").await.unwrap();

    cache.insert(entry("Aurora", "second", 5)).await.unwrap();

    let hit = cache.lookup("aurora").await.unwrap().unwrap();
    assert_eq!(hit.id, reused.id);
    assert_eq!(hit.use_count, 3);
}

#[tokio::test]
async fn test_racing_inserts_converge_on_one_row() {
    let (_dir, repo, cache) = open().await;
    let cache = Arc::new(cache);

    let mut handles = Vec::new();
    for i in 0..8 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache
                .insert(entry(&format!("query {i}"), "shared", i))
                .await
                .unwrap()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().id);
    }
    ids.dedup();

    assert_eq!(ids.len(), 1);
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_identical_downloads_share_file_and_row() {
    let (dir, repo, cache) = open().await;
    let store = AssetStore::new(dir.path().join("media"));

    let a = store.write_bytes(b"the same pixels", "jpg").await.unwrap();
    let b = store.write_bytes(b"the same pixels", "jpg").await.unwrap();
    assert_eq!(a.path, b.path);
    assert_eq!(a.content_hash, broll::cache::content_hash(b"the same pixels"));

    for (query, asset) in [("red planet", &a), ("mars surface", &b)] {
        cache
            .insert(NewMediaCacheEntry {
                query: query.to_string(),
                source: "pixabay".to_string(),
                source_url: "https://pixabay.test/mars.jpg".to_string(),
                local_path: asset.path.display().to_string(),
                content_hash: asset.content_hash.clone(),
                kind: asset.kind,
                resolution: None,
                file_size: asset.size as i64,
                quality_score: None,
            })
            .await
            .unwrap();
    }

    assert_eq!(repo.count().await.unwrap(), 1);
    let stored = repo.find_by_hash(&a.content_hash).await.unwrap().unwrap();
    assert_eq!(stored.query, "red planet");
    assert!(cache.lookup("mars surface").await.unwrap().is_none());
}
