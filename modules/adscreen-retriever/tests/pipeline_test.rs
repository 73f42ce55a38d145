//! End-to-end pipeline runs against the in-memory mocks.

use std::collections::HashSet;

use bytes::Bytes;

use adscreen_archive::{fingerprint, image_path};
use adscreen_common::{ArchiveId, FetchStatus};
use adscreen_retriever::testing::{
    ids, test_png, MemoryDatastore, MemoryImageStore, MockImageHost, MockResolver,
};
use adscreen_retriever::traits::IdentifierSource;
use adscreen_retriever::{PipelineError, Retriever, RetrieverConfig, RunReport};

fn config(batch_size: usize, concurrency: usize) -> RetrieverConfig {
    RetrieverConfig {
        batch_size,
        concurrency,
        systemic_failure_threshold: 1.0,
    }
}

async fn run(
    resolver: &MockResolver,
    host: &MockImageHost,
    store: &MemoryImageStore,
    db: &MemoryDatastore,
    config: RetrieverConfig,
) -> RunReport {
    let pending = db.archive_ids_missing_image(None).await.unwrap();
    Retriever::new(resolver, host, store, db, config)
        .run(&pending)
        .await
}

#[tokio::test]
async fn whole_chunk_not_found_aborts_before_commit() {
    let all = ids(1..=20);
    let resolver = MockResolver::new();
    let host = MockImageHost::new();
    let store = MemoryImageStore::new();
    let db = MemoryDatastore::new(&all);

    let report = run(&resolver, &host, &store, &db, config(20, 4)).await;

    assert!(!report.completed());
    let abort = report.abort.as_ref().unwrap();
    assert_eq!(abort.chunk_index, 0);
    assert!(matches!(
        abort.error,
        PipelineError::SystemicFailure {
            not_found: 20,
            chunk_len: 20
        }
    ));
    assert!(abort.error.to_string().contains("Aborting!"));
    assert_eq!(db.commits(), 0);
    assert_eq!(report.stats.ids_processed, 20);
    assert_eq!(report.stats.image_urls_found, 0);
}

#[tokio::test]
async fn one_found_snapshot_keeps_chunk_alive() {
    let all = ids(1..=20);
    let resolver = MockResolver::new().on_image(7, "http://img.test/7.png");
    let host = MockImageHost::new().on_image("http://img.test/7.png", test_png(7));
    let store = MemoryImageStore::new();
    let db = MemoryDatastore::new(&all);

    let report = run(&resolver, &host, &store, &db, config(20, 4)).await;

    assert!(report.completed());
    assert_eq!(db.commits(), 1);
    assert_eq!(db.records().len(), 20);

    let missing: Vec<_> = db
        .records()
        .into_iter()
        .filter(|r| !r.image_url_found_in_snapshot())
        .collect();
    assert_eq!(missing.len(), 19);
    for r in &missing {
        assert_eq!(r.fetch_status(), None);
        assert_eq!(r.public_storage_url(), None);
        assert_eq!(r.fingerprint(), None);
    }
}

#[tokio::test]
async fn stats_count_success_and_failed_download() {
    let resolver = MockResolver::new()
        .on_image(1, "http://img.test/a.png")
        .on_image(2, "http://img.test/b.png");
    let host = MockImageHost::new()
        .on_image("http://img.test/a.png", test_png(1))
        .on_failure("http://img.test/b.png", FetchStatus::Timeout);
    let store = MemoryImageStore::new();
    let db = MemoryDatastore::new(&ids(1..=2));

    let stats = run(&resolver, &host, &store, &db, config(20, 2))
        .await
        .into_result()
        .unwrap();

    assert_eq!(stats.ids_processed, 2);
    assert_eq!(stats.image_urls_found, 2);
    assert_eq!(stats.downloads_succeeded, 1);
    assert_eq!(stats.downloads_failed, 1);
    assert_eq!(stats.failures_by_status, [0, 1, 0]);
    assert_eq!(stats.images_uploaded, 1);
    assert_eq!(stats.chunks_committed, 1);

    let stored = &db.records_for(1)[0];
    let fp = fingerprint(&test_png(1)).unwrap().to_hex();
    assert_eq!(stored.fetch_status(), Some(FetchStatus::Success));
    assert_eq!(stored.fingerprint(), Some(fp.as_str()));
    let path = image_path(&fp).unwrap();
    assert_eq!(stored.public_storage_url(), Some(format!("mem://{path}").as_str()));
    assert_eq!(store.get(&path), Some(test_png(1)));

    let failed = &db.records_for(2)[0];
    assert!(failed.image_url_found_in_snapshot());
    assert_eq!(failed.fetch_status(), Some(FetchStatus::Timeout));
    assert_eq!(failed.fingerprint(), None);
    assert_eq!(failed.public_storage_url(), None);
}

#[tokio::test]
async fn rerun_resumes_after_systemic_abort() {
    let all = ids(1..=45);
    let first_chunk = ids(1..=20);
    let last_chunk = ids(41..=45);
    let store = MemoryImageStore::new();
    let db = MemoryDatastore::new(&all);

    // Chunk 2 (IDs 21..=40) resolves to nothing, as with an expired token.
    let resolver = MockResolver::new()
        .images_for(&first_chunk)
        .images_for(&last_chunk);
    let host = MockImageHost::new().pngs_for(&all);
    let report = run(&resolver, &host, &store, &db, config(20, 4)).await;

    assert_eq!(report.chunks_total, 3);
    assert_eq!(report.abort.as_ref().map(|a| a.chunk_index), Some(1));
    assert_eq!(report.stats.chunks_committed, 1);
    assert_eq!(db.records().len(), 20);
    assert!(db.records_for(21).is_empty());
    assert!(db.records_for(41).is_empty());

    let pending = db.archive_ids_missing_image(None).await.unwrap();
    assert_eq!(pending, ids(21..=45));

    let resolver = MockResolver::new().images_for(&all);
    let report = run(&resolver, &host, &store, &db, config(20, 4)).await;

    assert!(report.completed());
    assert_eq!(report.chunks_total, 2);
    assert_eq!(resolver.calls(), 25);
    assert_eq!(db.records().len(), 45);
    for id in 1..=45 {
        assert_eq!(db.records_for(id).len(), 1, "archive ID {id}");
    }
    assert!(db.archive_ids_missing_image(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn identical_images_share_one_object() {
    let png = test_png(3);
    let resolver = MockResolver::new()
        .on_image(1, "http://img.test/one.png")
        .on_image(2, "http://cdn.test/two.png");
    let host = MockImageHost::new()
        .on_image("http://img.test/one.png", png.clone())
        .on_image("http://cdn.test/two.png", png);
    let store = MemoryImageStore::new();
    let db = MemoryDatastore::new(&ids(1..=2));

    let report = run(&resolver, &host, &store, &db, config(20, 2)).await;

    assert!(report.completed());
    assert_eq!(store.put_count(), 2);
    assert_eq!(store.object_count(), 1);
    let a = &db.records_for(1)[0];
    let b = &db.records_for(2)[0];
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.public_storage_url(), b.public_storage_url());
}

#[tokio::test]
async fn objects_match_distinct_fingerprints() {
    let all = ids(1..=12);
    let resolver = MockResolver::new().images_for(&all);
    let host = MockImageHost::new().pngs_for(&all);
    let store = MemoryImageStore::new();
    let db = MemoryDatastore::new(&all);

    let report = run(&resolver, &host, &store, &db, config(5, 3)).await;

    assert!(report.completed());
    assert_eq!(report.stats.chunks_committed, 3);
    let fps: HashSet<String> = db
        .records()
        .iter()
        .filter_map(|r| r.fingerprint().map(str::to_string))
        .collect();
    assert_eq!(fps.len(), store.object_count());
}

#[tokio::test]
async fn undecodable_image_is_recorded_without_object() {
    let resolver = MockResolver::new().on_image(9, "http://img.test/9.html");
    let host = MockImageHost::new().on_image(
        "http://img.test/9.html",
        Bytes::from_static(b"<html>not an image</html>"),
    );
    let store = MemoryImageStore::new();
    let db = MemoryDatastore::new(&[ArchiveId(9)]);

    let stats = run(&resolver, &host, &store, &db, config(20, 1))
        .await
        .into_result()
        .unwrap();

    assert_eq!(stats.downloads_succeeded, 1);
    assert_eq!(stats.images_undecodable, 1);
    assert_eq!(stats.images_uploaded, 0);
    assert_eq!(store.put_count(), 0);

    let record = &db.records_for(9)[0];
    assert!(record.image_url_found_in_snapshot());
    assert_eq!(record.fetch_status(), Some(FetchStatus::Success));
    assert_eq!(record.fingerprint(), None);
    assert_eq!(record.public_storage_url(), None);
}

#[tokio::test]
async fn storage_failure_aborts_without_commit() {
    let all = ids(1..=3);
    let resolver = MockResolver::new().images_for(&all);
    let host = MockImageHost::new().pngs_for(&all);
    let store = MemoryImageStore::new().failing();
    let db = MemoryDatastore::new(&all);

    let report = run(&resolver, &host, &store, &db, config(20, 2)).await;

    let abort = report.abort.as_ref().unwrap();
    assert!(matches!(abort.error, PipelineError::Storage { .. }));
    assert_eq!(db.commits(), 0);
    assert!(db.records().is_empty());
}

#[tokio::test]
async fn datastore_failure_stops_the_run() {
    let all = ids(1..=10);
    let resolver = MockResolver::new().images_for(&all);
    let host = MockImageHost::new().pngs_for(&all);
    let store = MemoryImageStore::new();
    let db = MemoryDatastore::new(&all).failing_from_commit(1);

    let report = run(&resolver, &host, &store, &db, config(5, 2)).await;

    let abort = report.abort.as_ref().unwrap();
    assert_eq!(abort.chunk_index, 1);
    assert!(matches!(abort.error, PipelineError::Datastore(_)));
    assert_eq!(report.stats.chunks_committed, 1);
    assert_eq!(db.records().len(), 5);
}

#[tokio::test]
async fn fractional_threshold_trips_earlier() {
    let all = ids(1..=10);
    // Half the chunk resolves.
    let resolver = MockResolver::new().images_for(&ids(1..=5));
    let host = MockImageHost::new().pngs_for(&all);

    let strict = RetrieverConfig {
        systemic_failure_threshold: 0.5,
        ..config(10, 4)
    };
    let store = MemoryImageStore::new();
    let db = MemoryDatastore::new(&all);
    let report = run(&resolver, &host, &store, &db, strict).await;
    assert!(matches!(
        report.abort.map(|a| a.error),
        Some(PipelineError::SystemicFailure { not_found: 5, .. })
    ));
    assert_eq!(db.commits(), 0);

    let store = MemoryImageStore::new();
    let db = MemoryDatastore::new(&all);
    let report = run(&resolver, &host, &store, &db, config(10, 4)).await;
    assert!(report.completed());
    assert_eq!(db.records().len(), 10);
}

#[tokio::test]
async fn short_trailing_chunk_never_trips_full_threshold() {
    let all = ids(1..=23);
    // The last three IDs have no image, which is every ID in the final chunk.
    let resolver = MockResolver::new().images_for(&ids(1..=20));
    let host = MockImageHost::new().pngs_for(&all);
    let store = MemoryImageStore::new();
    let db = MemoryDatastore::new(&all);

    let report = run(&resolver, &host, &store, &db, config(20, 4)).await;

    assert!(report.completed());
    assert_eq!(report.stats.chunks_committed, 2);
    assert_eq!(db.records().len(), 23);
    assert!(!db.records_for(23)[0].image_url_found_in_snapshot());
}

#[tokio::test]
async fn snapshot_errors_count_toward_systemic_check() {
    let all = ids(1..=4);
    let resolver = MockResolver::new()
        .on_error(1, "connection reset")
        .on_error(2, "HTTP 500")
        .on_not_found(3)
        .on_error(4, "HTTP 400");
    let host = MockImageHost::new();
    let store = MemoryImageStore::new();
    let db = MemoryDatastore::new(&all);

    let report = run(&resolver, &host, &store, &db, config(4, 2)).await;
    assert!(matches!(
        report.abort.map(|a| a.error),
        Some(PipelineError::SystemicFailure { not_found: 4, chunk_len: 4 })
    ));

    let resolver = MockResolver::new()
        .on_error(1, "connection reset")
        .on_image(2, "http://img.test/2.png");
    let host = MockImageHost::new().pngs_for(&all);
    let report = run(&resolver, &host, &store, &db, config(4, 2)).await;
    assert!(report.completed());
    assert_eq!(report.stats.snapshot_errors, 1);
    assert_eq!(report.stats.image_urls_found, 1);
    assert!(!db.records_for(3)[0].image_url_found_in_snapshot());
}

#[tokio::test]
async fn failed_snapshot_stays_pending_for_next_run() {
    let all = ids(1..=3);
    let resolver = MockResolver::new()
        .on_error(1, "HTTP 503")
        .images_for(&ids(2..=3));
    let host = MockImageHost::new().pngs_for(&all);
    let store = MemoryImageStore::new();
    let db = MemoryDatastore::new(&all);

    let report = run(&resolver, &host, &store, &db, config(20, 2)).await;

    assert!(report.completed());
    assert_eq!(report.stats.ids_processed, 3);
    assert_eq!(report.stats.snapshot_errors, 1);
    assert!(db.records_for(1).is_empty());
    assert_eq!(db.records().len(), 2);
    assert_eq!(
        db.archive_ids_missing_image(None).await.unwrap(),
        vec![ArchiveId(1)]
    );

    let resolver = MockResolver::new().images_for(&all);
    let report = run(&resolver, &host, &store, &db, config(20, 2)).await;

    assert!(report.completed());
    assert_eq!(resolver.calls(), 1);
    let rec = &db.records_for(1)[0];
    assert!(rec.image_url_found_in_snapshot());
    assert_eq!(rec.fetch_status(), Some(FetchStatus::Success));
    assert!(db.archive_ids_missing_image(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrency_does_not_change_records() {
    let all = ids(1..=30);
    let resolver = MockResolver::new()
        .images_for(&ids(1..=25))
        .on_not_found(26);
    let host = MockImageHost::new()
        .pngs_for(&ids(1..=20))
        .on_failure("http://img.test/21.png", FetchStatus::UnknownError)
        .on_image("http://img.test/22.png", Bytes::from_static(b"garbage"));

    let mut runs = Vec::new();
    for width in [1, 4] {
        let store = MemoryImageStore::new();
        let db = MemoryDatastore::new(&all);
        let stats = run(&resolver, &host, &store, &db, config(7, width))
            .await
            .into_result()
            .unwrap();
        let summary: Vec<_> = db
            .records()
            .iter()
            .map(|r| {
                (
                    r.archive_id(),
                    r.fetch_status(),
                    r.fingerprint().map(str::to_string),
                )
            })
            .collect();
        runs.push((stats, summary));
    }

    let (seq_stats, seq_records) = &runs[0];
    let (par_stats, par_records) = &runs[1];
    assert_eq!(seq_stats, par_stats);
    assert_eq!(seq_records, par_records);
    assert_eq!(
        seq_records.iter().map(|r| r.0).collect::<Vec<_>>(),
        all,
        "records keep input order"
    );
}
