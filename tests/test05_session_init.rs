#![cfg(feature = "sqlite")]

use sql_bridge::config::{CONNECTION_INIT_MARKER, sha256_hex};
use sql_bridge::prelude::*;
use tempfile::tempdir;

fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    // Leak the tempdir so the file persists for the duration of the test binary.
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

async fn scopes(conn: &Connection) -> Result<Vec<String>, BridgeError> {
    let rs = conn
        .create_statement()?
        .execute_query("SELECT scope FROM boot ORDER BY rowid")
        .await?;
    let mut out = Vec::new();
    while rs.next().await? {
        out.extend(rs.get_string("scope")?);
    }
    Ok(out)
}

#[tokio::test(flavor = "multi_thread")]
async fn init_script_runs_once_per_database_and_once_per_connection()
-> Result<(), Box<dyn std::error::Error>> {
    let script = format!(
        "CREATE TABLE boot (scope TEXT);\nINSERT INTO boot VALUES ('database');\n{CONNECTION_INIT_MARKER}\nINSERT INTO boot VALUES ('connection');"
    );
    let path = unique_db_path("init_once");
    let checksum = sha256_hex(&script);
    let opts = DatabaseOptions::from_pairs([
        ("path", path.as_str()),
        ("session_init_sql", script.as_str()),
        ("session_init_sql_sha256", checksum.as_str()),
    ])?;
    let db = Database::open(opts).await?;

    let first = db.connect().await?;
    let second = db.connect().await?;
    let _third = second.duplicate().await?;
    assert_eq!(
        scopes(&first).await?,
        vec!["database", "connection", "connection", "connection"]
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn checksum_mismatch_fails_before_opening() -> Result<(), Box<dyn std::error::Error>> {
    let err = DatabaseOptions::from_pairs([
        ("session_init_sql", "CREATE TABLE never (x INTEGER);"),
        ("session_init_sql_sha256", sha256_hex("something else").as_str()),
    ])
    .unwrap_err();
    assert!(matches!(err, BridgeError::Config(_)));
    assert!(err.to_string().contains("checksum mismatch"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_database_init_fails_open() -> Result<(), Box<dyn std::error::Error>> {
    let result = DatabaseOptionsBuilder::new(unique_db_path("bad_db_init"))
        .session_init(SessionInit::new("CREATE TABLE broken (;")?)
        .build()
        .await;
    let err = result.err().expect("open should fail");
    assert!(err.engine_phase().is_some(), "{err}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_connection_init_refuses_the_connection() -> Result<(), Box<dyn std::error::Error>>
{
    let script = format!(
        "CREATE TABLE ok (x INTEGER);\n{CONNECTION_INIT_MARKER}\nINSERT INTO missing VALUES (1);"
    );
    let db = DatabaseOptionsBuilder::new(unique_db_path("bad_conn_init"))
        .session_init(SessionInit::new(&script)?)
        .build()
        .await?;
    let err = db.connect().await.unwrap_err();
    assert!(err.to_string().contains("missing"), "{err}");
    assert_eq!(db.connection_count(), 0);
    assert!(!db.is_closed());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unrecognised_options_apply_as_pragmas() -> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(unique_db_path("pragmas"))
        .option("cache_size", "-4000")
        .option("foreign_keys", "ON")
        .build()
        .await?;
    let conn = db.connect().await?;
    let stmt = conn.create_statement()?;

    let rs = stmt.execute_query("PRAGMA cache_size").await?;
    assert!(rs.next().await?);
    assert_eq!(rs.get_i64(1)?, Some(-4000));

    let rs = stmt.execute_query("PRAGMA foreign_keys").await?;
    assert!(rs.next().await?);
    assert_eq!(rs.get_bool(1)?, Some(true));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_pragma_value_is_refused() -> Result<(), Box<dyn std::error::Error>> {
    let result = DatabaseOptionsBuilder::new(":memory:")
        .option("cache_size", "1; DROP TABLE x")
        .build()
        .await;
    let err = result.err().expect("open should fail");
    assert!(matches!(err, BridgeError::Config(_)), "{err}");
    Ok(())
}
