#![cfg(feature = "sqlite")]

use chrono::NaiveDate;
use sql_bridge::prelude::*;

const NESTED_TABLE: &str = "CREATE TABLE nested (
    id INTEGER,
    s 'STRUCT(z INTEGER, a VARCHAR)',
    m 'MAP(VARCHAR, INTEGER)',
    l 'INTEGER[]',
    d DATE
)";

fn record(z: i32, a: &str) -> Value {
    Value::Struct(StructValue::new(vec![
        ("z".into(), Value::Integer(z)),
        ("a".into(), Value::from(a)),
    ]))
}

fn ordered_map() -> Value {
    Value::Map(MapValue::from_pairs(vec![
        (Value::from("b"), Value::Integer(2)),
        (Value::from("a"), Value::Integer(1)),
        (Value::from("c"), Value::Null),
    ]))
}

async fn nested_fixture(policy: BufferPolicy) -> Result<Connection, BridgeError> {
    let db = DatabaseOptionsBuilder::new(":memory:")
        .buffer_policy(policy)
        .build()
        .await?;
    let conn = db.connect().await?;
    conn.create_statement()?.execute_update(NESTED_TABLE).await?;
    let insert = conn
        .prepare_statement("INSERT INTO nested VALUES (?, ?, ?, ?, ?)")
        .await?;
    insert.set_i32(1, 1)?;
    insert.set(2, record(9, "first"))?;
    insert.set(3, ordered_map())?;
    insert.set(
        4,
        Value::List(Sequence::list(vec![
            Value::Integer(3),
            Value::Null,
            Value::Integer(1),
        ])),
    )?;
    insert.set_date(5, NaiveDate::from_ymd_opt(2024, 2, 29).expect("date"))?;
    insert.execute_update().await?;

    insert.set_i32(1, 2)?;
    insert.set_null(2)?;
    insert.set_null(3)?;
    insert.set_null(4)?;
    insert.set_null(5)?;
    insert.execute_update().await?;
    Ok(conn)
}

#[tokio::test(flavor = "multi_thread")]
async fn struct_and_map_keep_their_order_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    for policy in [BufferPolicy::Lazy, BufferPolicy::Eager] {
        let conn = nested_fixture(policy).await?;
        let rs = conn
            .create_statement()?
            .execute_query("SELECT id, s, m, l, d FROM nested ORDER BY id")
            .await?;

        let meta = rs.metadata()?;
        assert_eq!(meta.column_count(), 5);
        assert_eq!(meta.column_type_name(2)?, "STRUCT(z INTEGER, a VARCHAR)");
        assert_eq!(meta.column_host_class_name(2)?, "sql_bridge::StructValue");
        assert_eq!(meta.column_type_name(3)?, "MAP(VARCHAR, INTEGER)");
        assert_eq!(meta.column_type_name(4)?, "INTEGER[]");
        assert_eq!(meta.column_host_class_name(4)?, "sql_bridge::Sequence");

        assert!(rs.next().await?);
        let s = rs.get_value("s")?;
        let fields: Vec<&str> = s.as_struct().expect("struct").field_names().collect();
        assert_eq!(fields, vec!["z", "a"]);
        assert_eq!(s, record(9, "first"));

        let m = rs.get_value(3)?;
        let keys: Vec<&Value> = m.as_map().expect("map").iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&Value::from("b"), &Value::from("a"), &Value::from("c")]);
        assert_eq!(m.as_map().expect("map").get(&Value::from("c")), Some(&Value::Null));

        let l = rs.get_value("l")?;
        let items: Vec<&Value> = l.as_sequence().expect("list").iter().collect();
        assert_eq!(items, vec![&Value::Integer(3), &Value::Null, &Value::Integer(1)]);
        assert_eq!(
            rs.get_value("d")?,
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).expect("date"))
        );

        // Composites have no scalar rendering.
        assert!(matches!(rs.get_string(2), Err(BridgeError::Conversion(_))));

        assert!(rs.next().await?);
        assert_eq!(rs.get_value(2)?, Value::Null);
        assert!(rs.was_null());
        assert_eq!(rs.get_i64(1)?, Some(2));
        assert!(!rs.was_null());
        assert!(!rs.next().await?);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn untyped_column_with_mixed_values_reads_as_variant()
-> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(":memory:").build().await?;
    let conn = db.connect().await?;
    let stmt = conn.create_statement()?;
    stmt.execute_update("CREATE TABLE loose (pos INTEGER, v)").await?;
    stmt.execute_update("INSERT INTO loose VALUES (1, 1), (2, 'two'), (3, 3.5), (4, NULL)")
        .await?;

    let rs = stmt.execute_query("SELECT v FROM loose ORDER BY pos").await?;
    let meta = rs.metadata()?;
    assert_eq!(meta.column_type_name(1)?, "VARIANT");
    assert_eq!(meta.column_host_class_name(1)?, "sql_bridge::Value");

    let mut seen = Vec::new();
    while rs.next().await? {
        seen.push(rs.get_value(1)?);
    }
    assert_eq!(
        seen,
        vec![
            Value::BigInt(1),
            Value::from("two"),
            Value::Double(3.5),
            Value::Null,
        ]
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn decimal_parameter_metadata_is_known_before_binding()
-> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(":memory:").build().await?;
    let conn = db.connect().await?;
    conn.create_statement()?
        .execute_update("CREATE TABLE money (id BIGINT, amount DECIMAL(18,7))")
        .await?;

    let insert = conn.prepare_statement("INSERT INTO money VALUES (?, ?)").await?;
    let params = insert.parameter_metadata()?;
    assert_eq!(params.parameter_count(), 2);
    assert_eq!(params.parameter_type_name(1)?, "BIGINT");
    assert_eq!(params.parameter_type_name(2)?, "DECIMAL(18,7)");
    assert_eq!(params.precision(2)?, 18);
    assert_eq!(params.scale(2)?, 7);
    assert_eq!(params.parameter_host_class_name(2)?, "sql_bridge::Decimal");
    assert_eq!(params.is_nullable(2)?, Nullability::Unknown);
    assert!(params.precision(3).unwrap_err().is_usage());

    let cast = conn
        .prepare_statement("SELECT CAST(? AS DECIMAL(9, 2)) AS price")
        .await?;
    assert_eq!(cast.parameter_metadata()?.scale(1)?, 2);
    assert_eq!(cast.metadata()?.column_count(), 1);
    assert_eq!(cast.metadata()?.column_name(1)?, "price");

    // Unbound parameters are reported before execution.
    assert!(insert.execute_update().await.unwrap_err().is_usage());
    insert.set_i64(1, 1)?;
    insert.set_decimal(2, "12.3456789".parse()?)?;
    assert_eq!(insert.execute_update().await?, 1);
    assert!(insert.set_i64(3, 1).unwrap_err().is_usage());

    let rs = conn
        .create_statement()?
        .execute_query("SELECT amount FROM money")
        .await?;
    assert!(rs.next().await?);
    assert_eq!(rs.metadata()?.scale(1)?, 7);
    assert_eq!(
        rs.get_decimal("amount")?.map(|d| d.to_string()).as_deref(),
        Some("12.3456789")
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn eighteen_digit_decimals_keep_every_digit() -> Result<(), Box<dyn std::error::Error>> {
    let db = DatabaseOptionsBuilder::new(":memory:").build().await?;
    let conn = db.connect().await?;
    conn.create_statement()?
        .execute_update("CREATE TABLE ledger (id INTEGER, amount DECIMAL(18,7))")
        .await?;

    let insert = conn.prepare_statement("INSERT INTO ledger VALUES (?, ?)").await?;
    let amounts = [
        "12345678901.1234567",
        "-99999999999.9999999",
        "12345678901.0000000",
        "0.3000003",
    ];
    for (id, amount) in amounts.iter().enumerate() {
        insert.set_i64(1, i64::try_from(id)?)?;
        insert.set_decimal(2, amount.parse()?)?;
        insert.add_batch()?;
    }
    insert.execute_batch().await?;

    let rs = conn
        .create_statement()?
        .execute_query("SELECT amount FROM ledger ORDER BY id")
        .await?;
    for amount in amounts {
        assert!(rs.next().await?);
        let read = rs.get_decimal(1)?.expect("amount");
        assert_eq!(read.scale(), 7);
        assert_eq!(read.to_string(), amount);
    }
    assert!(!rs.next().await?);
    Ok(())
}
