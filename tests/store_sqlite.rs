use kam_scores::store::{RecordStore, SqliteRecordStore, UploadSource};
use kam_scores::{MonthKey, ProjectRecord};
use tempfile::tempdir;

#[derive(Debug, serde::Deserialize)]
struct ExportRow {
    month: String,
    project_id: String,
    kam: String,
    potential: i64,
}

fn month(raw: &str) -> MonthKey {
    raw.parse().unwrap()
}

fn rec(id: &str, kam: &str, potential: i64) -> ProjectRecord {
    ProjectRecord {
        // Overwritten by the month passed to replace_month.
        month: month("1999-01"),
        project_id: id.to_string(),
        kam: kam.to_string(),
        status: "N".to_string(),
        potential,
        est_ay: 3,
        sop: "05.2024".to_string(),
    }
}

#[tokio::test]
async fn replacing_a_month_drops_previous_rows() {
    let dir = tempdir().unwrap();
    let store = SqliteRecordStore::new(dir.path().join("kam.sqlite")).unwrap();
    let jan = month("2024-01");

    let written = store
        .replace_month(jan, vec![rec("p1", "alice", 10), rec("p2", "bob", 20)], None)
        .await
        .unwrap();
    assert_eq!(written, 2);

    store
        .replace_month(jan, vec![rec("p3", "alice", 30)], None)
        .await
        .unwrap();

    let rows = store.records_for_month(jan).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].project_id, "p3");
    assert_eq!(rows[0].month, jan);
    assert_eq!(rows[0].potential, 30);
    assert_eq!(rows[0].est_ay, 3);
    assert_eq!(rows[0].sop, "05.2024");

    assert!(store
        .records_for_month(month("2024-02"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn months_are_listed_in_order_with_provenance() {
    let dir = tempdir().unwrap();
    let store = SqliteRecordStore::new(dir.path().join("kam.sqlite")).unwrap();

    store
        .replace_month(
            month("2024-03"),
            vec![rec("p1", "alice", 1)],
            Some(UploadSource {
                name: "kam_2024-03.tsv".to_string(),
                content_hash: "abc123".to_string(),
            }),
        )
        .await
        .unwrap();
    store
        .replace_month(
            month("2024-01"),
            vec![rec("p1", "alice", 1), rec("p2", "alice", 2), rec("p3", "bob", 3)],
            None,
        )
        .await
        .unwrap();

    let months = store.list_months().await.unwrap();
    assert_eq!(months.len(), 2);
    assert_eq!(months[0].month, month("2024-01"));
    assert_eq!(months[0].rows, 3);
    assert_eq!(months[0].kams, 2);
    assert_eq!(months[0].source_name, None);
    assert_eq!(months[1].month, month("2024-03"));
    assert_eq!(months[1].source_name.as_deref(), Some("kam_2024-03.tsv"));
    assert_eq!(months[1].content_hash.as_deref(), Some("abc123"));
    assert!(months[1].ingested_at.is_some());
}

#[tokio::test]
async fn export_writes_one_line_per_record() {
    let dir = tempdir().unwrap();
    let store = SqliteRecordStore::new(dir.path().join("kam.sqlite")).unwrap();
    store
        .replace_month(month("2024-02"), vec![rec("p2", "bob", 20)], None)
        .await
        .unwrap();
    store
        .replace_month(month("2024-01"), vec![rec("p1", "alice", 10)], None)
        .await
        .unwrap();

    let export_path = dir.path().join("export.jsonl");
    let written = store.export_jsonl(&export_path).await.unwrap();
    assert_eq!(written, 2);

    let raw = std::fs::read_to_string(&export_path).unwrap();
    let rows: Vec<ExportRow> = raw
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].month, "2024-01");
    assert_eq!(rows[0].project_id, "p1");
    assert_eq!(rows[0].kam, "alice");
    assert_eq!(rows[0].potential, 10);
    assert_eq!(rows[1].month, "2024-02");
}

#[tokio::test]
async fn store_reopens_with_existing_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kam.sqlite");
    {
        let store = SqliteRecordStore::new(&path).unwrap();
        store
            .replace_month(month("2024-01"), vec![rec("p1", "alice", 10)], None)
            .await
            .unwrap();
    }

    let reopened = SqliteRecordStore::new(&path).unwrap();
    let rows = reopened.records_for_month(month("2024-01")).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn lock_file_is_not_truncated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kam.sqlite");
    let lock_path = dir.path().join("kam.lock");
    std::fs::write(&lock_path, "keep").unwrap();

    let store = SqliteRecordStore::new(&path).unwrap();
    let lock = store.lock_exclusive().unwrap();
    drop(lock);

    assert_eq!(std::fs::read_to_string(&lock_path).unwrap(), "keep");
}

#[tokio::test]
async fn month_replaced_with_no_rows_is_still_listed() {
    let dir = tempdir().unwrap();
    let store = SqliteRecordStore::new(dir.path().join("kam.sqlite")).unwrap();
    let jan = month("2024-01");

    store
        .replace_month(jan, vec![rec("p1", "alice", 10)], None)
        .await
        .unwrap();
    store
        .replace_month(
            jan,
            Vec::new(),
            Some(UploadSource {
                name: "empty_2024-01.csv".to_string(),
                content_hash: "e0".to_string(),
            }),
        )
        .await
        .unwrap();

    let months = store.list_months().await.unwrap();
    assert_eq!(months.len(), 1);
    assert_eq!(months[0].month, jan);
    assert_eq!(months[0].rows, 0);
    assert_eq!(months[0].kams, 0);
    assert_eq!(months[0].source_name.as_deref(), Some("empty_2024-01.csv"));
    assert!(store.records_for_month(jan).await.unwrap().is_empty());
}
