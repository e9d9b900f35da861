use kam_scores::ingest::{
    ingest_bulk, ingest_bytes, ingest_file, parse_snapshot, IngestError, MAX_QUANTITY,
};
use kam_scores::scoring::{compute_scores_range, ScoringConfig};
use kam_scores::store::{RecordStore, SqliteRecordStore};
use kam_scores::{InMemoryRecordStore, MonthKey};
use tempfile::tempdir;

const JANUARY: &str = "ID Number\tProject Responsible\tProject Status\tPotential (t / year)\tEST_AY\tEnddate Project\n\
P-1\tAlice\tN\t50\t10\t01.2024\n\
P-2\tBob\t+\t0\t8\t2024-02\n";

const FEBRUARY: &str = "e697663b99b2fa26c1258c9d00450011,project_responsible,project status,Potential (t / year),est_ay,SOP\n\
P-1,Alice,+,50,10,03.2024\n\
P-2,Bob,+,0,5,2024-02\n\
P-3,Bob,N,12.5,0,\n\
,Bob,N,99,0,\n";

fn month(raw: &str) -> MonthKey {
    raw.parse().unwrap()
}

#[tokio::test]
async fn ingest_then_score_end_to_end() {
    let dir = tempdir().unwrap();
    let store = SqliteRecordStore::new(dir.path().join("kam.sqlite")).unwrap();

    let jan = ingest_bytes(&store, month("2024-01"), "jan.tsv", JANUARY.as_bytes())
        .await
        .unwrap();
    assert_eq!(jan.rows, 2);
    assert_eq!(jan.skipped, 0);
    assert_eq!(jan.content_hash, blake3::hash(JANUARY.as_bytes()).to_hex().to_string());

    let feb = ingest_bytes(&store, month("2024-02"), "feb.csv", FEBRUARY.as_bytes())
        .await
        .unwrap();
    assert_eq!(feb.rows, 3);
    assert_eq!(feb.skipped, 1);

    let stored = store.records_for_month(month("2024-02")).await.unwrap();
    let p3 = stored.iter().find(|r| r.project_id == "P-3").unwrap();
    // 12.5 rounds half to even.
    assert_eq!(p3.potential, 12);
    assert_eq!(p3.kam, "Bob");

    let report = compute_scores_range(
        &store,
        month("2024-01"),
        month("2024-02"),
        &ScoringConfig::default(),
        None,
    )
    .await
    .unwrap();

    let alice = report.breakdown("Alice", month("2024-02")).unwrap();
    assert_eq!(alice.lvp, 50);
    assert_eq!(alice.penalties.sop_delay, 20);
    assert_eq!(alice.penalties.no_new_project, 100);
    // lvp 50 -> 400, minus the sop slip and the missing new project
    assert_eq!(alice.month_score, 280);

    let bob = report.breakdown("Bob", month("2024-02")).unwrap();
    assert_eq!(bob.pp_added, 12);
    assert_eq!(bob.penalties.volume_decrease, 6);
    assert_eq!(bob.penalties.no_new_project, 0);
    assert_eq!(bob.month_score, -6);
}

#[tokio::test]
async fn reingesting_a_month_replaces_it() {
    let dir = tempdir().unwrap();
    let store = SqliteRecordStore::new(dir.path().join("kam.sqlite")).unwrap();
    let jan = month("2024-01");

    ingest_bytes(&store, jan, "first.tsv", JANUARY.as_bytes())
        .await
        .unwrap();
    ingest_bytes(&store, jan, "second.csv", b"ID Number,Project Status\nP-9,N\n")
        .await
        .unwrap();

    let rows = store.records_for_month(jan).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].project_id, "P-9");

    let months = store.list_months().await.unwrap();
    assert_eq!(months.len(), 1);
    assert_eq!(months[0].source_name.as_deref(), Some("second.csv"));
}

#[tokio::test]
async fn upload_without_id_column_leaves_month_untouched() {
    let dir = tempdir().unwrap();
    let store = SqliteRecordStore::new(dir.path().join("kam.sqlite")).unwrap();
    let jan = month("2024-01");
    ingest_bytes(&store, jan, "jan.tsv", JANUARY.as_bytes())
        .await
        .unwrap();

    let err = ingest_bytes(&store, jan, "bad.csv", b"Project,Status\nP-1,N\n")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::MissingColumn(_)));
    assert_eq!(store.records_for_month(jan).await.unwrap().len(), 2);
}

#[tokio::test]
async fn bulk_ingest_reads_months_from_file_names() {
    let dir = tempdir().unwrap();
    let store = SqliteRecordStore::new(dir.path().join("kam.sqlite")).unwrap();

    let jan_path = dir.path().join("export_2024-01.tsv");
    let feb_path = dir.path().join("export_2024-02.csv");
    std::fs::write(&jan_path, JANUARY).unwrap();
    std::fs::write(&feb_path, FEBRUARY).unwrap();

    let summaries = ingest_bulk(&store, &[jan_path, feb_path], &[]).await.unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].month, month("2024-01"));
    assert_eq!(summaries[0].source_name, "export_2024-01.tsv");
    assert_eq!(summaries[1].month, month("2024-02"));

    let months: Vec<MonthKey> = store
        .list_months()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.month)
        .collect();
    assert_eq!(months, vec![month("2024-01"), month("2024-02")]);
}

#[tokio::test]
async fn ingest_file_uses_explicit_month_over_name() {
    let dir = tempdir().unwrap();
    let store = SqliteRecordStore::new(dir.path().join("kam.sqlite")).unwrap();
    let path = dir.path().join("export_2024-01.tsv");
    std::fs::write(&path, JANUARY).unwrap();

    let summary = ingest_file(&store, month("2023-12"), &path).await.unwrap();
    assert_eq!(summary.month, month("2023-12"));
    assert_eq!(
        store.records_for_month(month("2023-12")).await.unwrap().len(),
        2
    );
    assert!(store
        .records_for_month(month("2024-01"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn huge_quantity_cells_are_capped_and_score() {
    let jan = month("2024-01");
    let upload = "ID Number,Project Responsible,Project Status,Potential (t / year)\n\
                  P-1,alice,N,1e30\n\
                  P-2,alice,N,1e30\n";
    let parsed = parse_snapshot(jan, upload.as_bytes()).unwrap();
    assert!(parsed.records.iter().all(|r| r.potential == MAX_QUANTITY));

    let store = InMemoryRecordStore::new();
    store.replace_month(jan, parsed.records).unwrap();

    let report = compute_scores_range(&store, jan, jan, &ScoringConfig::default(), None)
        .await
        .unwrap();
    let breakdown = report.breakdown("alice", jan).unwrap();
    assert_eq!(breakdown.pp_added, 2 * MAX_QUANTITY);
    assert_eq!(breakdown.pp_curr_raw, 2 * MAX_QUANTITY);
    assert_eq!(breakdown.pp_shortfall, 0);
    assert_eq!(breakdown.month_score, 200);
}
