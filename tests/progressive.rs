// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;
use std::sync::Arc;

use progressive_db::executor::Batch;
use progressive_db::storage::{BackendRef, MemoryBackend};
use progressive_db::types::{DataValue, Row};
use progressive_db::{Database, DatabaseOptions, ErrorKind, Output};

const LINEITEM: &str = "
    CREATE TABLE lineitem (l_quantity INT, l_returnflag CHAR(1), l_linestatus CHAR(1));
    INSERT INTO lineitem VALUES
        (17, 'A', 'F'), (36, 'N', 'O'),
        (8, 'R', 'F'), (28, 'N', 'O'),
        (24, 'A', 'F'), (32, 'R', 'F'),
        (38, 'N', 'O'), (45, 'A', 'F');
";

const QUERY: &str = "SUM(l_quantity), PROGRESSIVE_PARTITION(), PROGRESSIVE_PROGRESS() \
    FROM lineitem GROUP BY l_returnflag, l_linestatus ORDER BY l_returnflag, l_linestatus";

fn options() -> DatabaseOptions {
    DatabaseOptions {
        chunk_size: Some(2),
        ..Default::default()
    }
}

async fn lineitem() -> Database {
    let db = Database::new_in_memory(options()).await.unwrap();
    db.run(LINEITEM).await.unwrap();
    db.run("PREPARE TABLE lineitem").await.unwrap();
    db
}

/// Collect every batch of the only query in `sql`.
async fn batches(db: &Database, sql: &str) -> Result<Vec<Batch>, progressive_db::Error> {
    let mut outputs = db.run(sql).await?;
    let Some(Output::Query(mut stream)) = outputs.pop() else {
        panic!("expect a query: {sql}");
    };
    let mut batches = vec![];
    while let Some(batch) = stream.next_batch().await? {
        batches.push(batch);
    }
    Ok(batches)
}

fn int(v: i64) -> DataValue {
    DataValue::from(v)
}

#[tokio::test]
async fn lineitem_four_chunks() {
    let db = lineitem().await;
    let batches = batches(&db, &format!("SELECT PROGRESSIVE {QUERY}"))
        .await
        .unwrap();
    assert_eq!(batches.len(), 4);
    for (i, batch) in batches.iter().enumerate() {
        let progress = (i + 1) as f64 / 4.0;
        assert_eq!(batch.token.partition, Some(i as u32));
        assert_eq!(batch.token.progress, progress);
        for row in &batch.rows {
            assert_eq!(row[1], int(i as i64));
            assert_eq!(row[2], DataValue::from(progress));
        }
    }
    let sums = |batch: &Batch| -> Vec<DataValue> { batch.rows.iter().map(|r| r[0].clone()).collect() };
    assert_eq!(sums(&batches[0]), vec![int(17), int(36)]);
    assert_eq!(sums(&batches[1]), vec![int(17), int(64), int(8)]);
    assert_eq!(sums(&batches[2]), vec![int(41), int(64), int(40)]);
    assert_eq!(sums(&batches[3]), vec![int(86), int(102), int(40)]);

    let one_pass = db
        .run_to_end("SELECT SUM(l_quantity) FROM lineitem GROUP BY l_returnflag, l_linestatus ORDER BY l_returnflag, l_linestatus")
        .await
        .unwrap();
    assert_eq!(sums(&batches[3]), sums(&one_pass[0]));
    assert_eq!(one_pass[0].token.progress, 1.0);
}

#[tokio::test]
async fn group_sums_never_decrease() {
    let db = lineitem().await;
    let batches = batches(
        &db,
        "SELECT PROGRESSIVE l_returnflag, l_linestatus, SUM(l_quantity), COUNT(*) \
         FROM lineitem GROUP BY l_returnflag, l_linestatus",
    )
    .await
    .unwrap();
    let mut seen: HashMap<(DataValue, DataValue), (DataValue, DataValue)> = HashMap::new();
    let mut last_progress = 0.0;
    for batch in &batches {
        assert!(batch.token.progress > last_progress);
        last_progress = batch.token.progress;
        for row in &batch.rows {
            let key = (row[0].clone(), row[1].clone());
            let value = (row[2].clone(), row[3].clone());
            if let Some(prev) = seen.get(&key) {
                assert!(prev.0 <= value.0 && prev.1 <= value.1, "{key:?} decreased");
            }
            seen.insert(key, value);
        }
        // groups never disappear
        assert_eq!(batch.rows.len(), seen.len());
    }
    assert_eq!(last_progress, 1.0);
}

#[tokio::test]
async fn final_batch_matches_one_pass() {
    let db = lineitem().await;
    let query = "l_returnflag, COUNT(*), AVG(l_quantity), MIN(l_quantity), MAX(l_quantity), \
                 VAR_POP(l_quantity) FROM lineitem WHERE l_quantity > 10 \
                 GROUP BY l_returnflag ORDER BY l_returnflag DESC";
    let progressive = batches(&db, &format!("SELECT PROGRESSIVE {query}"))
        .await
        .unwrap();
    let one_pass = db.run_to_end(&format!("SELECT {query}")).await.unwrap();
    assert_eq!(progressive.last().unwrap().rows, one_pass[0].rows);
    let flags: Vec<Row> = one_pass[0].rows.iter().map(|r| vec![r[0].clone()]).collect();
    let expected: Vec<Row> = vec![
        vec![DataValue::from("R")],
        vec![DataValue::from("N")],
        vec![DataValue::from("A")],
    ];
    assert_eq!(flags, expected);
}

#[tokio::test]
async fn rerun_is_deterministic() {
    let db = lineitem().await;
    let sql = format!("SELECT PROGRESSIVE {QUERY}");
    let first = batches(&db, &sql).await.unwrap();
    let second = batches(&db, &sql).await.unwrap();
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.rows, b.rows);
        assert_eq!(a.token.partition, b.token.partition);
        assert_eq!(a.token.progress, b.token.progress);
    }
}

#[tokio::test]
async fn prepare_is_idempotent() {
    let db = lineitem().await;
    let layout = db.chunks().layout("lineitem").unwrap();
    db.run("PREPARE TABLE lineitem; PREPARE TABLE lineitem")
        .await
        .unwrap();
    assert_eq!(db.chunks().layout("lineitem").unwrap(), layout);
    assert_eq!(db.chunks().chunk_count("lineitem").unwrap(), 4);
}

#[tokio::test]
async fn empty_table_yields_one_batch() {
    let db = Database::new_in_memory(options()).await.unwrap();
    db.run("CREATE TABLE e (a INT); PREPARE TABLE e")
        .await
        .unwrap();
    let batches = batches(&db, "SELECT PROGRESSIVE COUNT(*), SUM(a) FROM e")
        .await
        .unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].token.partition, None);
    assert_eq!(batches[0].token.progress, 1.0);
    let expected: Vec<Row> = vec![vec![int(0), DataValue::Null]];
    assert_eq!(batches[0].rows, expected);
}

#[tokio::test]
async fn chunk_read_failure() {
    let tmp: BackendRef = Arc::new(MemoryBackend::new());
    let db = Database::with_backends(
        Arc::new(MemoryBackend::new()),
        Arc::new(MemoryBackend::new()),
        tmp.clone(),
        options(),
    )
    .await
    .unwrap();
    db.run(LINEITEM).await.unwrap();
    db.run("PREPARE TABLE lineitem").await.unwrap();
    tmp.delete("chunks/lineitem/2").await.unwrap();

    let mut outputs = db
        .run(&format!("SELECT PROGRESSIVE {QUERY}"))
        .await
        .unwrap();
    let Some(Output::Query(mut stream)) = outputs.pop() else {
        panic!("expect a query");
    };
    assert!(stream.next_batch().await.unwrap().is_some());
    assert!(stream.next_batch().await.unwrap().is_some());
    let err = progressive_db::Error::from(stream.next_batch().await.unwrap_err());
    assert_eq!(err.kind(), ErrorKind::ChunkRead);
    assert_eq!(err.chunk_index(), Some(2));
    // the stream ends after the failure
    assert!(stream.next_batch().await.unwrap().is_none());

    let err = batches(&db, "SELECT PROGRESSIVE COUNT(*) FROM lineitem WHERE l_quantity > 100")
        .await
        .unwrap_err();
    assert_eq!(err.chunk_index(), Some(2));
    // the source table is intact
    assert_eq!(
        db.run_to_end("SELECT COUNT(*) FROM lineitem").await.unwrap()[0].rows,
        vec![vec![int(8)]]
    );
}

#[tokio::test]
async fn validation_errors() {
    let db = lineitem().await;
    for (sql, kind) in [
        ("SELECT PROGRESSIVE SUM(l_tax) FROM lineitem", ErrorKind::Validation),
        ("SELECT PROGRESSIVE MEDIAN(l_quantity) FROM lineitem", ErrorKind::UnsupportedAggregate),
        ("SELECT SUM(l_quantity) FUTURE FROM lineitem", ErrorKind::Validation),
        ("SELECT PROGRESSIVE_PARTITION() FROM lineitem", ErrorKind::Validation),
        ("INSERT INTO lineitem VALUES (1, 'A', 'F')", ErrorKind::Validation),
        ("SELECT PROGRESSIVE COUNT(*) FROM nope", ErrorKind::NotFound),
    ] {
        let err = db.run(sql).await.unwrap_err();
        assert_eq!(err.kind(), kind, "{sql}: {err}");
    }
}

#[tokio::test]
async fn division_by_zero_in_a_later_chunk() {
    let db = lineitem().await;
    let mut outputs = db
        .run("SELECT PROGRESSIVE SUM(100 / (l_quantity - 8)) FROM lineitem")
        .await
        .unwrap();
    let Some(Output::Query(mut stream)) = outputs.pop() else {
        panic!("expect a query");
    };
    // chunk 0 holds 17 and 36, chunk 1 holds 8
    assert!(stream.next_batch().await.unwrap().is_some());
    let err = progressive_db::Error::from(stream.next_batch().await.unwrap_err());
    assert_eq!(err.kind(), ErrorKind::DataException);
    assert_eq!(err.kind().sqlstate(), "22000");
    assert_eq!(err.chunk_index(), None);
}
