use chrono::Utc;

use citation_badges::config::Config;
use citation_badges::model::{
    AuthorRecord, ReconciledSnapshot, ReviewCount, ReviewData, ReviewStatus, ScholarData,
    ScholarStatus, SourceStatus,
};
use citation_badges::report;
use citation_badges::store::{self, Store};

fn scholar_ok(citedby: u64) -> ScholarStatus {
    SourceStatus::Success {
        message: format!("{} citations across 0 publications", citedby),
        data: ScholarData {
            author: AuthorRecord {
                citedby,
                ..AuthorRecord::placeholder("abc")
            },
            publications: vec![],
        },
    }
}

fn wos_ok(n: u64) -> ReviewStatus {
    SourceStatus::Success {
        message: format!("{} verified peer reviews", n),
        data: ReviewData {
            review_count: ReviewCount::Count(n),
        },
    }
}

fn store_in(dir: &std::path::Path) -> Store {
    let mut cfg = Config::default();
    cfg.app.output_dir = dir.to_string_lossy().to_string();
    Store::from_config(&cfg)
}

async fn run_once(store: &Store, scholar: ScholarStatus, wos: ReviewStatus) -> ReconciledSnapshot {
    let previous = store.load_previous().await;
    let (snapshot, updated) = store::merge(previous.as_ref(), scholar, wos);
    store
        .persist(&snapshot, updated, previous.is_some())
        .await
        .unwrap();
    snapshot
}

fn flag(store: &Store) -> String {
    std::fs::read_to_string(store.flag_path()).unwrap()
}

#[tokio::test]
async fn failed_search_keeps_published_citations() {
    let td = tempfile::tempdir().unwrap();
    let store = store_in(td.path());

    run_once(&store, scholar_ok(40), wos_ok(3)).await;
    assert_eq!(flag(&store), "true");

    let merged = run_once(
        &store,
        SourceStatus::Failed {
            error: "No author found for 'Ada'".into(),
        },
        SourceStatus::Skipped {
            reason: "not provided".into(),
        },
    )
    .await;

    assert_eq!(flag(&store), "false");
    assert_eq!(merged.google_scholar, scholar_ok(40));
    assert_eq!(merged.web_of_science, wos_ok(3));
    let on_disk = store.load_previous().await.unwrap();
    assert_eq!(on_disk.google_scholar, scholar_ok(40));
}

#[tokio::test]
async fn review_timeout_keeps_previous_reviews_while_citations_update() {
    let td = tempfile::tempdir().unwrap();
    let store = store_in(td.path());

    run_once(&store, scholar_ok(40), wos_ok(3)).await;
    run_once(
        &store,
        scholar_ok(41),
        SourceStatus::Failed {
            error: "timed out waiting for 'Verified peer reviews' after 10 attempts".into(),
        },
    )
    .await;

    assert_eq!(flag(&store), "true");
    let on_disk = store.load_previous().await.unwrap();
    assert_eq!(on_disk.google_scholar, scholar_ok(41));
    assert_eq!(on_disk.web_of_science, wos_ok(3));
}

#[tokio::test]
async fn skipped_reviews_only_depend_on_scholar_for_flag() {
    let td = tempfile::tempdir().unwrap();
    let store = store_in(td.path());
    let skipped = || SourceStatus::Skipped {
        reason: "not provided".into(),
    };

    run_once(&store, scholar_ok(1), skipped()).await;
    assert_eq!(flag(&store), "true");
    let on_disk = store.load_previous().await.unwrap();
    assert_eq!(on_disk.web_of_science, skipped());

    run_once(&store, SourceStatus::Failed { error: "x".into() }, skipped()).await;
    assert_eq!(flag(&store), "false");
}

#[tokio::test]
async fn first_run_failure_is_still_recorded() {
    let td = tempfile::tempdir().unwrap();
    let store = store_in(td.path());

    run_once(
        &store,
        SourceStatus::Failed {
            error: "retry budget exceeded after 5 attempts: captcha challenge".into(),
        },
        SourceStatus::Skipped {
            reason: "not provided".into(),
        },
    )
    .await;

    assert_eq!(flag(&store), "false");
    let on_disk = store.load_previous().await.unwrap();
    assert_eq!(on_disk.google_scholar.as_str(), "failed");
    assert!(on_disk.google_scholar.detail().contains("captcha"));
}

#[tokio::test]
async fn identical_runs_leave_snapshot_unchanged_except_timestamp() {
    let td = tempfile::tempdir().unwrap();
    let store = store_in(td.path());

    let first = run_once(&store, scholar_ok(42), wos_ok(7)).await;
    let second = run_once(&store, scholar_ok(42), wos_ok(7)).await;

    assert_eq!(first.google_scholar, second.google_scholar);
    assert_eq!(first.web_of_science, second.web_of_science);
    let on_disk = store.load_previous().await.unwrap();
    assert_eq!(on_disk, second);
}

#[tokio::test]
async fn snapshot_with_unknown_and_missing_keys_is_readable() {
    let td = tempfile::tempdir().unwrap();
    let store = store_in(td.path());
    let legacy = serde_json::json!({
        "generated_at": Utc::now(),
        "google_scholar": serde_json::to_value(scholar_ok(9)).unwrap(),
        "extra": { "ignored": true }
    });
    std::fs::write(store.metadata_path(), legacy.to_string()).unwrap();

    let previous = store.load_previous().await.unwrap();
    assert_eq!(previous.google_scholar, scholar_ok(9));
    assert_eq!(previous.web_of_science, SourceStatus::NotAttempted);

    let merged = run_once(
        &store,
        SourceStatus::Failed { error: "x".into() },
        SourceStatus::Skipped {
            reason: "not provided".into(),
        },
    )
    .await;
    assert_eq!(merged.google_scholar, scholar_ok(9));
    assert_eq!(
        merged.web_of_science,
        SourceStatus::Skipped {
            reason: "not provided".into()
        }
    );
}

#[tokio::test]
async fn report_reflects_run_statuses() {
    let scholar = scholar_ok(42);
    let wos: ReviewStatus = SourceStatus::Failed {
        error: "timed out waiting for 'Verified peer reviews' after 10 attempts".into(),
    };
    let out = report::render(&scholar, &wos, true);
    assert!(out.contains("✅ success"));
    assert!(out.contains("❌ failed | timed out waiting"));
}
