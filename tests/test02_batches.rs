#![cfg(feature = "sqlite")]

use sql_bridge::prelude::*;
use tempfile::tempdir;

fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    // Leak the tempdir so the file persists for the duration of the test binary.
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

async fn count_rows(conn: &Connection, table: &str) -> Result<i64, BridgeError> {
    let rs = conn
        .create_statement()?
        .execute_query(&format!("SELECT count(*) FROM {table}"))
        .await?;
    rs.next().await?;
    Ok(rs.get_i64(1)?.unwrap_or_default())
}

#[tokio::test(flavor = "multi_thread")]
async fn plain_batch_returns_one_count_per_entry() -> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(":memory:").build().await?;
    let conn = db.connect().await?;
    let stmt = conn.create_statement()?;
    assert_eq!(stmt.batch_state(), BatchState::Empty);

    stmt.add_batch("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT)")?;
    stmt.add_batch("INSERT INTO items VALUES (1, 'a'), (2, 'b')")?;
    stmt.add_batch("UPDATE items SET label = 'z'")?;
    stmt.add_batch("DELETE FROM items WHERE id = 1")?;
    assert_eq!(stmt.batch_state(), BatchState::Queued);

    let counts = stmt.execute_batch().await?;
    assert_eq!(counts, vec![0, 2, 2, 1]);
    assert_eq!(stmt.batch_state(), BatchState::Empty);
    assert_eq!(count_rows(&conn, "items").await?, 1);

    // Draining an empty queue touches nothing.
    assert!(stmt.execute_batch().await?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn prepared_batch_binds_each_queued_row() -> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(":memory:").build().await?;
    let conn = db.connect().await?;
    conn.create_statement()?
        .execute_update("CREATE TABLE prices (id INTEGER, price DECIMAL(18,7), note TEXT)")
        .await?;

    let insert = conn
        .prepare_statement("INSERT INTO prices VALUES (?, ?, ?)")
        .await?;
    for id in 0..100 {
        insert.set_i32(1, id)?;
        insert.set_decimal(2, Decimal::new(id * 1_000_001, 7))?;
        if id % 2 == 0 {
            insert.set_null(3)?;
        } else {
            insert.set_string(3, format!("odd {id}"))?;
        }
        insert.add_batch()?;
    }
    // Bound values were consumed by add_batch.
    assert!(insert.add_batch().unwrap_err().is_usage());

    let counts = insert.execute_batch().await?;
    assert_eq!(counts.len(), 100);
    assert!(counts.iter().all(|&c| c == 1));
    assert_eq!(count_rows(&conn, "prices").await?, 100);

    let rs = conn
        .create_statement()?
        .execute_query("SELECT price, note FROM prices WHERE id = 3")
        .await?;
    assert!(rs.next().await?);
    assert_eq!(rs.get_decimal(1)?.map(|d| d.to_string()).as_deref(), Some("0.3000003"));
    assert_eq!(rs.get_string("note")?.as_deref(), Some("odd 3"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_autocommit_batch_applies_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(unique_db_path("atomic_batch"))
        .build()
        .await?;
    let conn = db.connect().await?;
    conn.create_statement()?
        .execute_update("CREATE TABLE uniq (id INTEGER PRIMARY KEY)")
        .await?;

    let insert = conn.prepare_statement("INSERT INTO uniq VALUES (?)").await?;
    for id in [1, 2, 3, 2, 4] {
        insert.set_i64(1, id)?;
        insert.add_batch()?;
    }
    let err = insert.execute_batch().await.unwrap_err();
    assert_eq!(err.batch_index(), Some(3));
    assert!(err.to_string().contains("UNIQUE"), "engine message kept: {err}");
    assert_eq!(insert.batch_state(), BatchState::Empty);
    assert_eq!(count_rows(&conn, "uniq").await?, 0);

    // The statement and connection stay usable.
    insert.set_i64(1, 9)?;
    assert_eq!(insert.execute_update().await?, 1);
    assert_eq!(count_rows(&conn, "uniq").await?, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_batch_in_manual_mode_leaves_transaction_to_caller()
-> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(unique_db_path("manual_batch"))
        .transaction_mode(TransactionMode::Manual)
        .build()
        .await?;
    let conn = db.connect().await?;
    let stmt = conn.create_statement()?;
    stmt.execute_update("CREATE TABLE uniq (id INTEGER PRIMARY KEY)").await?;
    conn.commit().await?;

    stmt.add_batch("INSERT INTO uniq VALUES (1)")?;
    stmt.add_batch("INSERT INTO uniq VALUES (2)")?;
    stmt.add_batch("INSERT INTO uniq VALUES (1)")?;
    stmt.add_batch("INSERT INTO uniq VALUES (3)")?;
    let err = stmt.execute_batch().await.unwrap_err();
    assert_eq!(err.batch_index(), Some(2));
    assert_eq!(conn.transaction_state(), TransactionState::Open);
    assert_eq!(count_rows(&conn, "uniq").await?, 2);

    conn.rollback().await?;
    assert_eq!(count_rows(&conn, "uniq").await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn pending_batch_blocks_direct_execution() -> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(":memory:").build().await?;
    let conn = db.connect().await?;
    let stmt = conn.create_statement()?;
    stmt.execute_update("CREATE TABLE t (id INTEGER)").await?;

    stmt.add_batch("INSERT INTO t VALUES (1)")?;
    for err in [
        stmt.execute("INSERT INTO t VALUES (2)").await.unwrap_err(),
        stmt.execute_update("INSERT INTO t VALUES (3)").await.unwrap_err(),
        stmt.execute_query("SELECT * FROM t").await.unwrap_err(),
    ] {
        assert!(matches!(err, BridgeError::PendingBatch), "{err}");
    }
    // Nothing reached the engine.
    assert_eq!(count_rows(&conn, "t").await?, 0);

    stmt.clear_batch()?;
    assert_eq!(stmt.batch_state(), BatchState::Empty);
    assert_eq!(stmt.execute_update("INSERT INTO t VALUES (4)").await?, 1);

    let prepared = conn.prepare_statement("INSERT INTO t VALUES (?)").await?;
    prepared.set_i32(1, 5)?;
    prepared.add_batch()?;
    prepared.set_i32(1, 6)?;
    assert!(matches!(
        prepared.execute_update().await.unwrap_err(),
        BridgeError::PendingBatch
    ));
    assert_eq!(prepared.execute_batch().await?, vec![1]);
    assert_eq!(count_rows(&conn, "t").await?, 2);

    // Queued parameters are not re-bound; the pending batch is still what gets reported.
    let queued = conn.prepare_statement("INSERT INTO t VALUES (?)").await?;
    queued.set_i32(1, 7)?;
    queued.add_batch()?;
    for err in [
        queued.execute_query().await.unwrap_err(),
        queued.execute_update().await.unwrap_err(),
        queued.execute().await.unwrap_err(),
    ] {
        assert!(matches!(err, BridgeError::PendingBatch), "{err}");
    }
    assert_eq!(queued.batch_state(), BatchState::Queued);
    assert_eq!(count_rows(&conn, "t").await?, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn prepared_statement_refuses_batched_sql() -> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(":memory:").build().await?;
    let conn = db.connect().await?;
    let prepared = conn.prepare_statement("SELECT ?").await?;
    let err = prepared.add_batch_sql("SELECT 1").unwrap_err();
    assert!(err.is_usage());
    assert!(err.to_string().contains("Cannot add batched SQL statement"));
    assert_eq!(prepared.batch_state(), BatchState::Empty);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn row_returning_entry_fails_the_batch() -> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(":memory:").build().await?;
    let conn = db.connect().await?;
    let stmt = conn.create_statement()?;
    stmt.add_batch("CREATE TABLE t (id INTEGER)")?;
    stmt.add_batch("SELECT 1")?;
    let err = stmt.execute_batch().await.unwrap_err();
    assert_eq!(err.batch_index(), Some(1));
    assert_eq!(err.engine_phase(), Some(EnginePhase::Execute));
    assert_eq!(stmt.batch_state(), BatchState::Empty);
    Ok(())
}
