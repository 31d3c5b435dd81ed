//! Shared setup for database-backed integration tests.
//!
//! Tests run only when `TEST_DATABASE_URL` points at a PostgreSQL server.
//! Each test gets a fresh schema, selected through the connection's
//! `search_path`, so tests never see each other's rows.

#![allow(dead_code)]

use db_access::{Cancel, Database, NamedParams, NamedStatement, QueryExecutor};
use url::Url;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub struct TestDb {
    pub db: Database,
    pub url: String,
    admin: Database,
    schema: String,
}

impl TestDb {
    /// Extra DDL run inside the test schema.
    pub async fn exec(&self, sql: &str) {
        let stmt = NamedStatement::parse(sql).unwrap();
        QueryExecutor::new()
            .execute_write(&self.db, &stmt, &NamedParams::new(), &Cancel::none())
            .await
            .unwrap();
    }

    pub async fn count(&self, table: &str) -> i64 {
        let stmt = NamedStatement::parse(format!("SELECT count(*) AS n FROM {}", table)).unwrap();
        let row = QueryExecutor::new()
            .execute_one(&self.db, &stmt, &NamedParams::new(), &Cancel::none())
            .await
            .unwrap();
        sqlx::Row::get::<i64, _>(&row, "n")
    }

    pub async fn teardown(self) {
        self.db.close().await;
        let drop = NamedStatement::parse(format!("DROP SCHEMA {} CASCADE", self.schema)).unwrap();
        let _ = QueryExecutor::new()
            .execute_write(&self.admin, &drop, &NamedParams::new(), &Cancel::none())
            .await;
        self.admin.close().await;
    }
}

/// Connect to `TEST_DATABASE_URL` with an isolated schema holding the
/// author table. `None` when the variable is unset.
pub async fn setup() -> Option<TestDb> {
    setup_with("").await
}

/// Like [`setup`], with extra query parameters (pool options) on the URL.
pub async fn setup_with(extra: &str) -> Option<TestDb> {
    let base = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return None;
        }
    };

    let schema = format!("t_{}", uuid::Uuid::new_v4().simple());
    let admin = Database::open_url(&base).unwrap();
    let create = NamedStatement::parse(format!("CREATE SCHEMA {}", schema)).unwrap();
    QueryExecutor::new()
        .execute_write(&admin, &create, &NamedParams::new(), &Cancel::none())
        .await
        .unwrap();

    let mut url = Url::parse(&base).unwrap();
    url.query_pairs_mut()
        .append_pair("options", &format!("-c search_path={}", schema));
    for pair in extra.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap();
        url.query_pairs_mut().append_pair(k, v);
    }
    let url = url.to_string();

    let db = Database::open_url(&url).unwrap();
    let test_db = TestDb {
        db,
        url,
        admin,
        schema,
    };
    test_db.exec(SCHEMA_SQL).await;
    Some(test_db)
}
