//! Integration tests for named-parameter execution and record mapping.
//!
//! Set TEST_DATABASE_URL to run.

mod common;

use db_access::queries::Author;
use db_access::{
    Cancel, DbError, NamedParams, NamedStatement, QueryExecutor, QueryParam, Strictness,
};
use sqlx::Row;
use std::time::Duration;

const INSERT_AUTHOR: &str = "INSERT INTO author (name, bio) VALUES (@name, @bio) RETURNING *";

#[tokio::test]
async fn test_dynamic_insert_then_select_by_id() {
    let Some(t) = common::setup().await else {
        return;
    };
    let executor = QueryExecutor::new();
    let cancel = Cancel::none();

    let insert = NamedStatement::parse(INSERT_AUTHOR).unwrap();
    let params = NamedParams::new()
        .with("name", "Rob Pike")
        .with("bio", None::<String>);
    let author: Author = executor
        .fetch_one_record(&t.db, &insert, &params, Strictness::Strict, &cancel)
        .await
        .unwrap();
    assert_eq!(author.name, "Rob Pike");
    assert_eq!(author.bio, None);

    let select = NamedStatement::parse("SELECT name, bio FROM author WHERE id = @id").unwrap();
    let by_id = NamedParams::new().with("id", author.id);

    // projection without id: lax fills the default, strict refuses
    let lax: Author = executor
        .fetch_one_record(&t.db, &select, &by_id, Strictness::Lax, &cancel)
        .await
        .unwrap();
    assert_eq!(lax.name, "Rob Pike");
    assert_eq!(lax.id, 0);

    let err = executor
        .fetch_one_record::<Author>(&t.db, &select, &by_id, Strictness::Strict, &cancel)
        .await
        .unwrap_err();
    match err {
        DbError::Mapping { field, column, .. } => {
            assert_eq!(field, "id");
            assert_eq!(column, "id");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    t.teardown().await;
}

#[tokio::test]
async fn test_repeated_placeholder_binds_once() {
    let Some(t) = common::setup().await else {
        return;
    };
    let stmt = NamedStatement::parse("SELECT @v::text AS a, @v::text AS b, '@v' AS c").unwrap();
    let row = QueryExecutor::new()
        .execute_one(&t.db, &stmt, &NamedParams::new().with("v", "x"), &Cancel::none())
        .await
        .unwrap();
    assert_eq!(row.get::<String, _>("a"), "x");
    assert_eq!(row.get::<String, _>("b"), "x");
    assert_eq!(row.get::<String, _>("c"), "@v");

    t.teardown().await;
}

#[tokio::test]
async fn test_execute_one_rejects_many_rows() {
    let Some(t) = common::setup().await else {
        return;
    };
    let stmt = NamedStatement::parse("SELECT generate_series(1, 3) AS n").unwrap();
    let err = QueryExecutor::new()
        .execute_one(&t.db, &stmt, &NamedParams::new(), &Cancel::none())
        .await
        .unwrap_err();
    match err {
        DbError::Cardinality { expected, actual, .. } => {
            assert_eq!(expected, 1);
            assert_eq!(actual, "more than 1");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    t.teardown().await;
}

#[tokio::test]
async fn test_execute_one_rejects_zero_rows() {
    let Some(t) = common::setup().await else {
        return;
    };
    let stmt = NamedStatement::parse("SELECT id FROM author WHERE false AND id = @id").unwrap();
    let err = QueryExecutor::new()
        .execute_one(&t.db, &stmt, &NamedParams::new().with("id", 1i64), &Cancel::none())
        .await
        .unwrap_err();
    match err {
        DbError::Cardinality { expected, actual, .. } => {
            assert_eq!(expected, 1);
            assert_eq!(actual, "0");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    t.teardown().await;
}

#[tokio::test]
async fn test_params_keep_their_sql_width() {
    let Some(t) = common::setup().await else {
        return;
    };
    let stmt = NamedStatement::parse("SELECT pg_typeof(@x)::text AS t").unwrap();
    let cases = [
        (QueryParam::from(5i16), "smallint"),
        (QueryParam::from(5i32), "integer"),
        (QueryParam::from(5i64), "bigint"),
        (QueryParam::from(1.5f32), "real"),
        (QueryParam::from(1.5f64), "double precision"),
        (QueryParam::from(None::<i32>), "integer"),
    ];
    for (value, expected) in cases {
        let row = QueryExecutor::new()
            .execute_one(&t.db, &stmt, &NamedParams::new().with("x", value), &Cancel::none())
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("t"), expected);
    }

    t.teardown().await;
}

#[tokio::test]
async fn test_execute_write_reports_rows_affected() {
    let Some(t) = common::setup().await else {
        return;
    };
    let executor = QueryExecutor::new();
    let cancel = Cancel::none();
    let insert = NamedStatement::parse(INSERT_AUTHOR).unwrap();

    for name in ["a", "b", "c"] {
        let params = NamedParams::new().with("name", name).with("bio", Some("x"));
        executor
            .execute_write(&t.db, &insert, &params, &cancel)
            .await
            .unwrap();
    }

    let update = NamedStatement::parse("UPDATE author SET bio = @bio WHERE name <> @name").unwrap();
    let params = NamedParams::new().with("bio", None::<String>).with("name", "a");
    let affected = executor
        .execute_write(&t.db, &update, &params, &cancel)
        .await
        .unwrap();
    assert_eq!(affected, 2);

    let nulls = NamedStatement::parse("SELECT id, name, bio FROM author WHERE bio IS NULL").unwrap();
    let authors: Vec<Author> = executor
        .fetch_records(&t.db, &nulls, &NamedParams::new(), Strictness::Strict, &cancel)
        .await
        .unwrap();
    assert_eq!(authors.len(), 2);

    t.teardown().await;
}

#[tokio::test]
async fn test_server_error_carries_sql_state() {
    let Some(t) = common::setup().await else {
        return;
    };
    let stmt = NamedStatement::parse("SELECT * FROM no_such_table WHERE id = @id").unwrap();
    let err = QueryExecutor::new()
        .execute_one(&t.db, &stmt, &NamedParams::new().with("id", 1i64), &Cancel::none())
        .await
        .unwrap_err();
    assert_eq!(err.sql_state(), Some("42P01"));
    match err {
        DbError::Execution { statement, .. } => assert!(statement.contains("no_such_table")),
        other => panic!("unexpected error: {other:?}"),
    }

    t.teardown().await;
}

#[tokio::test]
async fn test_dropped_stream_releases_connection() {
    let Some(t) = common::setup_with("max_connections=1&acquire_timeout=5").await else {
        return;
    };
    let executor = QueryExecutor::new();
    let stmt = NamedStatement::parse("SELECT generate_series(1, 100000) AS n").unwrap();
    let params = NamedParams::new();

    {
        let mut rows = executor.execute(&t.db, &stmt, &params, &Cancel::none()).unwrap();
        let first = rows.next().await.unwrap().unwrap();
        assert_eq!(first.get::<i32, _>("n"), 1);
    }

    // the single pooled connection must be available again
    let ping = NamedStatement::parse("SELECT 1 AS one").unwrap();
    let row = executor
        .execute_one(&t.db, &ping, &params, &Cancel::after(Duration::from_secs(10)))
        .await
        .unwrap();
    assert_eq!(row.get::<i32, _>("one"), 1);

    t.teardown().await;
}

#[tokio::test]
async fn test_stream_collects_in_order() {
    let Some(t) = common::setup().await else {
        return;
    };
    let stmt = NamedStatement::parse("SELECT generate_series(1, @n) AS n").unwrap();
    let params = NamedParams::new().with("n", 5i32);
    let values = QueryExecutor::new()
        .execute(&t.db, &stmt, &params, &Cancel::none())
        .unwrap()
        .try_map(|row| Ok(row.get::<i32, _>("n")))
        .await
        .unwrap();
    assert_eq!(values, vec![1, 2, 3, 4, 5]);

    t.teardown().await;
}

#[tokio::test]
async fn test_deadline_times_out_and_pool_survives() {
    let Some(t) = common::setup().await else {
        return;
    };
    let executor = QueryExecutor::new();
    let sleep = NamedStatement::parse("SELECT pg_sleep(@secs)").unwrap();
    let params = NamedParams::new().with("secs", 5.0f64);

    let err = executor
        .execute_write(&t.db, &sleep, &params, &Cancel::after(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Timeout { .. }), "unexpected error: {err:?}");

    let ping = NamedStatement::parse("SELECT 1").unwrap();
    executor
        .execute_write(&t.db, &ping, &NamedParams::new(), &Cancel::none())
        .await
        .unwrap();

    t.teardown().await;
}
