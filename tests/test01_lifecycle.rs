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

#[tokio::test(flavor = "multi_thread")]
async fn closing_database_cascades_to_every_descendant() -> Result<(), Box<dyn std::error::Error>>
{
    let db = DatabaseOptionsBuilder::new(unique_db_path("cascade"))
        .build()
        .await?;
    let conn = db.connect().await?;
    let other = db.connect().await?;
    assert_eq!(db.connection_count(), 2);

    let stmt = conn.create_statement()?;
    stmt.execute_update("CREATE TABLE t (id INTEGER)").await?;
    stmt.execute_update("INSERT INTO t VALUES (1), (2), (3)").await?;
    let prepared = conn.prepare_statement("SELECT id FROM t WHERE id > ?").await?;
    assert_eq!(conn.statement_count(), 2);

    prepared.set_i32(1, 1)?;
    let rs = prepared.execute_query().await?;
    assert!(rs.next().await?);

    db.close().await?;
    assert!(db.is_closed());
    assert!(conn.is_closed());
    assert!(other.is_closed());
    assert!(stmt.is_closed());
    assert!(prepared.is_closed());
    assert!(rs.is_closed());
    assert_eq!(db.connection_count(), 0);
    assert_eq!(conn.statement_count(), 0);

    assert!(rs.next().await.unwrap_err().is_closed());
    assert!(stmt.execute("SELECT 1").await.unwrap_err().is_closed());
    assert!(conn.create_statement().unwrap_err().is_closed());
    assert!(db.connect().await.unwrap_err().is_closed());

    // Every close is idempotent.
    db.close().await?;
    conn.close().await?;
    stmt.close().await?;
    rs.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn closing_statement_leaves_connection_usable() -> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(":memory:").build().await?;
    let conn = db.connect().await?;
    let first = conn.create_statement()?;
    let second = conn.create_statement()?;
    let rs = first.execute_query("SELECT 1 AS one").await?;

    first.close().await?;
    assert!(rs.is_closed());
    assert_eq!(conn.statement_count(), 1);
    assert!(!conn.is_closed());

    let rs = second.execute_query("SELECT 2 AS two").await?;
    assert!(rs.next().await?);
    assert_eq!(rs.get_i64("two")?, Some(2));
    assert!(conn.is_valid().await);

    conn.close().await?;
    assert!(!conn.is_valid().await);
    assert_eq!(db.connection_count(), 0);
    assert!(!db.is_closed());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn result_outlives_its_dropped_statement_handle() -> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(":memory:").build().await?;
    let conn = db.connect().await?;
    let rs = conn
        .create_statement()?
        .execute_query("SELECT 1 AS n UNION ALL SELECT 2")
        .await?;
    assert!(!rs.is_closed());
    assert_eq!(conn.statement_count(), 1);

    assert!(rs.next().await?);
    assert_eq!(rs.get_i64("n")?, Some(1));
    assert!(rs.next().await?);
    assert!(!rs.next().await?);
    drop(rs);
    assert_eq!(conn.statement_count(), 0);

    let prepared = conn.prepare_statement("SELECT ? AS v").await?;
    prepared.set_i32(1, 5)?;
    let rs = prepared.execute_query().await?;
    drop(prepared);
    assert!(rs.next().await?);
    assert_eq!(rs.get_i64(1)?, Some(5));

    // A cascade from the connection still reaches the orphaned result.
    conn.close().await?;
    assert!(rs.is_closed());
    assert!(rs.next().await.unwrap_err().is_closed());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn native_database_is_released_after_last_handle() -> Result<(), Box<dyn std::error::Error>>
{
    let db = DatabaseOptionsBuilder::new(":memory:").build().await?;
    let watch = db.release_watch();
    let conn = db.connect().await?;
    drop(db);
    assert!(!watch.is_released());
    assert!(conn.is_valid().await);

    // The connection still reaches its database through the back-reference.
    let again = conn.database().connect().await?;
    drop(conn);
    again.close().await?;
    drop(again);
    assert!(watch.is_released());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_shares_the_database() -> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(":memory:").build().await?;
    let conn = db.connect().await?;
    conn.create_statement()?
        .execute_update("CREATE TABLE shared (v TEXT)")
        .await?;

    let copy = conn.duplicate().await?;
    assert_eq!(db.connection_count(), 2);
    copy.create_statement()?
        .execute_update("INSERT INTO shared VALUES ('x')")
        .await?;

    let rs = conn
        .create_statement()?
        .execute_query("SELECT count(*) AS n FROM shared")
        .await?;
    assert!(rs.next().await?);
    assert_eq!(rs.get_i64(1)?, Some(1));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn result_set_is_handed_out_once() -> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(":memory:").build().await?;
    let conn = db.connect().await?;
    let stmt = conn.create_statement()?;

    assert!(stmt.execute("SELECT 'a' AS letter").await?);
    assert_eq!(stmt.update_count(), None);
    let rs = stmt.get_result_set()?.expect("result set");
    assert!(stmt.get_result_set()?.is_none());
    assert!(rs.next().await?);
    assert_eq!(rs.get_string(1)?.as_deref(), Some("a"));
    assert_eq!(rs.row_number(), 1);

    assert!(!stmt.execute("CREATE TABLE t (x INTEGER)").await?);
    assert!(rs.is_closed(), "re-executing closes the earlier result");
    assert_eq!(stmt.update_count(), Some(0));
    assert!(stmt.get_result_set()?.is_none());

    assert!(stmt.execute_query("CREATE TABLE u (x INTEGER)").await.unwrap_err().is_usage());
    assert!(stmt.execute_update("SELECT 1").await.unwrap_err().is_usage());
    assert!(!stmt.is_closed());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn close_on_completion_closes_statement_at_exhaustion()
-> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(":memory:").build().await?;
    let conn = db.connect().await?;

    let stmt = conn.create_statement()?;
    stmt.close_on_completion()?;
    assert!(stmt.is_close_on_completion());
    let rs = stmt
        .execute_query("SELECT 1 UNION ALL SELECT 2")
        .await?;
    assert!(rs.next().await?);
    assert!(rs.next().await?);
    assert!(!stmt.is_closed());
    assert!(!rs.next().await?);
    assert!(stmt.is_closed());
    assert!(rs.is_closed());
    assert!(rs.next().await.unwrap_err().is_closed());

    // An explicit close completes as well.
    let stmt = conn.create_statement()?;
    stmt.close_on_completion()?;
    let rs = stmt.execute_query("SELECT 1").await?;
    rs.close().await?;
    assert!(stmt.is_closed());

    // Without the flag the statement outlives its results.
    let stmt = conn.create_statement()?;
    let rs = stmt.execute_query("SELECT 1").await?;
    assert!(rs.next().await?);
    assert!(!rs.next().await?);
    assert!(!rs.next().await?);
    rs.close().await?;
    assert!(!stmt.is_closed());
    assert_eq!(rs.row_number(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_transactions_commit_and_roll_back() -> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(unique_db_path("manual_tx"))
        .transaction_mode(TransactionMode::Manual)
        .build()
        .await?;
    let conn = db.connect().await?;
    assert!(!conn.auto_commit()?);
    assert_eq!(conn.transaction_state(), TransactionState::Idle);

    let stmt = conn.create_statement()?;
    stmt.execute_update("CREATE TABLE ledger (amount INTEGER)").await?;
    assert_eq!(conn.transaction_state(), TransactionState::Open);
    conn.commit().await?;
    assert_eq!(conn.transaction_state(), TransactionState::Committed);

    stmt.execute_update("INSERT INTO ledger VALUES (10)").await?;
    conn.rollback().await?;
    assert_eq!(conn.transaction_state(), TransactionState::RolledBack);
    // Nothing open: both are no-ops.
    conn.rollback().await?;
    conn.commit().await?;

    stmt.execute_update("INSERT INTO ledger VALUES (20)").await?;
    conn.set_auto_commit(true).await?;
    assert!(conn.auto_commit()?);

    let other = db.connect().await?;
    let rs = other
        .create_statement()?
        .execute_query("SELECT sum(amount) AS total FROM ledger")
        .await?;
    assert!(rs.next().await?);
    assert_eq!(rs.get_i64("total")?, Some(20));
    Ok(())
}
