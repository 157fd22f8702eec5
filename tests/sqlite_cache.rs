use chrono::TimeDelta;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use plotline::{db, migrate, sqlite_cache::SqliteCache};
use plotline_core::cache::AnalysisCache;
use plotline_core::models::{AnalysisKind, AnalysisPayload};
use plotline_core::provider::DisabledGenerator;
use plotline_core::source::InMemorySource;
use plotline_core::testing::{chapters, character, snapshot, PROJECT};
use plotline_core::{analyzer, graph, Plotline, ServiceSettings};

const TTL: Duration = Duration::from_secs(3600);

async fn open(tmp: &TempDir) -> SqliteCache {
    let pool = db::open(&tmp.path().join("cache.sqlite")).await.unwrap();
    migrate::migrate(&pool).await.unwrap();
    SqliteCache::new(pool)
}

fn arc_payload() -> (AnalysisPayload, String) {
    let arc = analyzer::analyze(&chapters(&["Calm morning.", "The storm broke.", "Quiet again."])).unwrap();
    let hash = arc.content_hash.clone();
    (AnalysisPayload::StoryArc(arc), hash)
}

fn graph_payload() -> (AnalysisPayload, String) {
    let chs = chapters(&["Ana met Ben.", "Ana and Ben sailed."]);
    let cast = vec![character("ana", "Ana"), character("ben", "Ben")];
    let graph = graph::build(&chs, &cast).unwrap();
    let hash = graph.content_hash.clone();
    (AnalysisPayload::CharacterGraph(graph), hash)
}

#[tokio::test]
async fn test_put_then_get() {
    let tmp = TempDir::new().unwrap();
    let cache = open(&tmp).await;
    let (payload, hash) = arc_payload();

    let stored = cache.put(PROJECT, payload, &hash, TTL).await.unwrap();
    assert_eq!(stored.expires_at - stored.computed_at, TimeDelta::seconds(3600));

    let hit = cache.get(PROJECT, AnalysisKind::StoryArc, &hash).await.unwrap();
    assert!(matches!(hit, Some(AnalysisPayload::StoryArc(_))));
    assert!(cache
        .get(PROJECT, AnalysisKind::StoryArc, "other-hash")
        .await
        .unwrap()
        .is_none());
    assert!(cache
        .get(PROJECT, AnalysisKind::CharacterGraph, &hash)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_entries_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let (payload, hash) = arc_payload();
    {
        let cache = open(&tmp).await;
        cache.put(PROJECT, payload, &hash, TTL).await.unwrap();
        cache.pool().close().await;
    }
    let cache = open(&tmp).await;
    let entry = cache.peek(PROJECT, AnalysisKind::StoryArc).await.unwrap().unwrap();
    assert_eq!(entry.content_hash, hash);
}

#[tokio::test]
async fn test_expired_entry_is_a_miss() {
    let tmp = TempDir::new().unwrap();
    let cache = open(&tmp).await;
    let (payload, hash) = arc_payload();
    let stored = cache.put(PROJECT, payload, &hash, TTL).await.unwrap();

    let later = stored.expires_at + TimeDelta::seconds(1);
    assert!(cache
        .get_at(PROJECT, AnalysisKind::StoryArc, &hash, later)
        .await
        .unwrap()
        .is_none());
    // Still visible to peek until purged or replaced.
    assert!(cache.peek(PROJECT, AnalysisKind::StoryArc).await.unwrap().is_some());
}

#[tokio::test]
async fn test_purge_expired() {
    let tmp = TempDir::new().unwrap();
    let cache = open(&tmp).await;
    let (arc, arc_hash) = arc_payload();
    let (graph, graph_hash) = graph_payload();
    cache.put(PROJECT, arc, &arc_hash, Duration::from_millis(1)).await.unwrap();
    cache.put(PROJECT, graph, &graph_hash, TTL).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(cache.purge_expired().await.unwrap(), 1);
    let left = cache.entries(Some(PROJECT)).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].kind, AnalysisKind::CharacterGraph);
}

#[tokio::test]
async fn test_put_replaces_same_kind() {
    let tmp = TempDir::new().unwrap();
    let cache = open(&tmp).await;
    let (payload, hash) = arc_payload();
    cache.put(PROJECT, payload.clone(), "first", TTL).await.unwrap();
    cache.put(PROJECT, payload, &hash, TTL).await.unwrap();

    let entries = cache.entries(None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content_hash, hash);
}

#[tokio::test]
async fn test_invalidate_scopes() {
    let tmp = TempDir::new().unwrap();
    let cache = open(&tmp).await;
    let (arc, arc_hash) = arc_payload();
    let (graph, graph_hash) = graph_payload();
    cache.put(PROJECT, arc.clone(), &arc_hash, TTL).await.unwrap();
    cache.put(PROJECT, graph, &graph_hash, TTL).await.unwrap();
    cache.put("elsewhere", arc, &arc_hash, TTL).await.unwrap();

    assert_eq!(cache.invalidate(PROJECT, Some(AnalysisKind::StoryArc)).await.unwrap(), 1);
    assert_eq!(cache.invalidate(PROJECT, Some(AnalysisKind::StoryArc)).await.unwrap(), 0);
    assert_eq!(cache.invalidate(PROJECT, None).await.unwrap(), 1);
    assert_eq!(cache.entries(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_dismiss_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let cache = open(&tmp).await;
    assert!(cache.dismiss(PROJECT, "abc").await.unwrap());
    assert!(!cache.dismiss(PROJECT, "abc").await.unwrap());
    assert!(cache.dismiss(PROJECT, "def").await.unwrap());
    let dismissed = cache.dismissed(PROJECT).await.unwrap();
    assert_eq!(dismissed.into_iter().collect::<Vec<_>>(), vec!["abc", "def"]);
    assert!(cache.dismissed("elsewhere").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_export_import_between_databases() {
    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();
    let source = open(&src_dir).await;
    let target = open(&dst_dir).await;

    let (arc, arc_hash) = arc_payload();
    let (graph, graph_hash) = graph_payload();
    source.put(PROJECT, graph, &graph_hash, TTL).await.unwrap();
    source.put(PROJECT, arc, &arc_hash, TTL).await.unwrap();
    source.dismiss(PROJECT, "fp-1").await.unwrap();
    target.dismiss(PROJECT, "fp-2").await.unwrap();

    let bundle = source.export_all(PROJECT).await.unwrap();
    let kinds: Vec<AnalysisKind> = bundle.entries.iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec![AnalysisKind::StoryArc, AnalysisKind::CharacterGraph]);

    assert_eq!(target.import_all(PROJECT, bundle.clone()).await.unwrap(), 2);

    let copied = target.peek(PROJECT, AnalysisKind::StoryArc).await.unwrap().unwrap();
    assert_eq!(copied.content_hash, bundle.entries[0].content_hash);
    assert_eq!(copied.computed_at, bundle.entries[0].computed_at);
    assert_eq!(copied.expires_at, bundle.entries[0].expires_at);
    let dismissed = target.dismissed(PROJECT).await.unwrap();
    assert!(dismissed.contains("fp-1") && dismissed.contains("fp-2"));
}

#[tokio::test]
async fn test_foreign_bundle_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let cache = open(&tmp).await;
    let (arc, hash) = arc_payload();
    cache.put(PROJECT, arc, &hash, TTL).await.unwrap();
    cache.dismiss(PROJECT, "fp").await.unwrap();
    let bundle = cache.export_all(PROJECT).await.unwrap();

    let err = cache.import_all("elsewhere", bundle).await.unwrap_err();
    assert_eq!(err.code(), "invalid_input");
    assert!(cache.entries(Some("elsewhere")).await.unwrap().is_empty());
    assert!(cache.dismissed("elsewhere").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_service_serves_second_call_from_sqlite() {
    let tmp = TempDir::new().unwrap();
    let cache = Arc::new(open(&tmp).await);
    let source = InMemorySource::new().with_project(snapshot(
        chapters(&["Ana met Ben at dawn.", "Ana and Ben fought.", "Ana forgave Ben."]),
        vec![character("ana", "Ana"), character("ben", "Ben")],
    ));
    let service = Plotline::new(
        Arc::new(source),
        cache.clone(),
        Arc::new(DisabledGenerator),
        ServiceSettings::default(),
    );

    let first = service.get_character_graph(PROJECT).await.unwrap();
    let stored = cache.peek(PROJECT, AnalysisKind::CharacterGraph).await.unwrap().unwrap();
    let second = service.get_character_graph(PROJECT).await.unwrap();
    let again = cache.peek(PROJECT, AnalysisKind::CharacterGraph).await.unwrap().unwrap();

    assert_eq!(first.content_hash, second.content_hash);
    assert_eq!(stored.computed_at, again.computed_at);
}
