//! Load-layer integration tests
//!
//! Every test creates its own target table, standing in for the external
//! migration step that owns schema in production. Coverage:
//!
//! - merging extracts into empty and pre-populated tables
//! - upsert semantics: overwrite on key collision, no duplicates, no deletes
//! - idempotence of repeated loads
//! - UndefinedTable / MalformedRow / atomic rollback behavior
//! - transaction finalization independent of result consumption
//! - executor and schema-inspector contracts

use kurator_db::{
    BatchStatement, Connector, DbError, DbSettings, Executor, SchemaInspector, TableLoader,
};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPoolOptions};
use sqlx::{ConnectOptions as _, Row as _};

/// The reference extract: quoted comma, escaped quote, numeric text.
const SCENARIO_CSV: &str = "id,a,b,c\n1,2,abc,\"xy,\"\"z\"\n2,10,\"678\",\",,;abc\"\n";

async fn verification_conn(options: &PgConnectOptions) -> PgConnection {
    options.clone().connect().await.unwrap()
}

async fn create_target(conn: &mut PgConnection) {
    sqlx::query("CREATE TABLE t (id INT PRIMARY KEY, a INT, b TEXT, c TEXT)")
        .execute(conn)
        .await
        .unwrap();
}

async fn fetch_target(conn: &mut PgConnection) -> Vec<(i32, Option<i32>, Option<String>, Option<String>)> {
    sqlx::query("SELECT id, a, b, c FROM t ORDER BY id")
        .fetch_all(conn)
        .await
        .unwrap()
        .into_iter()
        .map(|row| (row.get("id"), row.get("a"), row.get("b"), row.get("c")))
        .collect()
}

fn scenario_rows() -> Vec<(i32, Option<i32>, Option<String>, Option<String>)> {
    vec![
        (1, Some(2), Some("abc".to_string()), Some("xy,\"z".to_string())),
        (2, Some(10), Some("678".to_string()), Some(",,;abc".to_string())),
    ]
}

// ============================================================================
// Merge scenarios
// ============================================================================

#[sqlx::test(migrations = false)]
async fn test_load_into_empty_table(_pool_opts: PgPoolOptions, connect_opts: PgConnectOptions) {
    let mut conn = verification_conn(&connect_opts).await;
    create_target(&mut conn).await;

    let connector = Connector::from_options(connect_opts);
    let loader = TableLoader::new(&connector, "t", &["id"]).unwrap();
    let report = loader.load(SCENARIO_CSV.as_bytes()).await.unwrap();

    assert_eq!(report.table, "t");
    assert_eq!(report.rows, 2);
    assert_eq!(fetch_target(&mut conn).await, scenario_rows());
}

#[sqlx::test(migrations = false)]
async fn test_load_leaves_unrelated_rows_untouched(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let mut conn = verification_conn(&connect_opts).await;
    create_target(&mut conn).await;
    sqlx::query("INSERT INTO t VALUES (0, 1, 'a', 'b')")
        .execute(&mut conn)
        .await
        .unwrap();

    let connector = Connector::from_options(connect_opts);
    let loader = TableLoader::new(&connector, "t", &["id"]).unwrap();
    loader.load(SCENARIO_CSV.as_bytes()).await.unwrap();

    let mut expected = vec![(0, Some(1), Some("a".to_string()), Some("b".to_string()))];
    expected.extend(scenario_rows());
    assert_eq!(fetch_target(&mut conn).await, expected);
}

#[sqlx::test(migrations = false)]
async fn test_load_does_not_duplicate_existing_keys(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let mut conn = verification_conn(&connect_opts).await;
    create_target(&mut conn).await;
    // Identical to the first row of the batch.
    sqlx::query("INSERT INTO t VALUES (1, 2, 'abc', 'xy,\"z')")
        .execute(&mut conn)
        .await
        .unwrap();

    let connector = Connector::from_options(connect_opts);
    let loader = TableLoader::new(&connector, "t", &["id"]).unwrap();
    loader.load(SCENARIO_CSV.as_bytes()).await.unwrap();

    assert_eq!(fetch_target(&mut conn).await, scenario_rows());
}

#[sqlx::test(migrations = false)]
async fn test_load_overwrites_all_non_key_columns_on_collision(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let mut conn = verification_conn(&connect_opts).await;
    create_target(&mut conn).await;
    sqlx::query("INSERT INTO t VALUES (1, 99, 'stale', 'stale')")
        .execute(&mut conn)
        .await
        .unwrap();

    let connector = Connector::from_options(connect_opts);
    let loader = TableLoader::new(&connector, "t", &["id"]).unwrap();
    loader.load(SCENARIO_CSV.as_bytes()).await.unwrap();

    // Full overwrite of the colliding row, not a partial merge.
    assert_eq!(fetch_target(&mut conn).await, scenario_rows());
}

#[sqlx::test(migrations = false)]
async fn test_loading_twice_is_idempotent(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let mut conn = verification_conn(&connect_opts).await;
    create_target(&mut conn).await;

    let connector = Connector::from_options(connect_opts);
    let loader = TableLoader::new(&connector, "t", &["id"]).unwrap();
    loader.load(SCENARIO_CSV.as_bytes()).await.unwrap();
    let after_first = fetch_target(&mut conn).await;

    loader.load(SCENARIO_CSV.as_bytes()).await.unwrap();
    assert_eq!(fetch_target(&mut conn).await, after_first);
}

#[sqlx::test(migrations = false)]
async fn test_composite_key_updates_in_place(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let mut conn = verification_conn(&connect_opts).await;
    sqlx::query(
        "CREATE TABLE daily_topic (day DATE, topic TEXT, hits INT, PRIMARY KEY (day, topic))",
    )
    .execute(&mut conn)
    .await
    .unwrap();

    let connector = Connector::from_options(connect_opts);
    let loader = TableLoader::new(&connector, "daily_topic", &["day", "topic"]).unwrap();

    loader
        .load("day,topic,hits\n2024-05-01,monet,10\n2024-05-01,klimt,3\n".as_bytes())
        .await
        .unwrap();
    loader
        .load("day,topic,hits\n2024-05-01,monet,12\n".as_bytes())
        .await
        .unwrap();

    let rows = sqlx::query("SELECT topic, hits FROM daily_topic ORDER BY topic")
        .fetch_all(&mut conn)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get::<String, _>("topic"), "klimt");
    assert_eq!(rows[0].get::<i32, _>("hits"), 3);
    assert_eq!(rows[1].get::<String, _>("topic"), "monet");
    assert_eq!(rows[1].get::<i32, _>("hits"), 12);
}

#[sqlx::test(migrations = false)]
async fn test_header_only_extract_loads_nothing(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let mut conn = verification_conn(&connect_opts).await;
    create_target(&mut conn).await;

    let connector = Connector::from_options(connect_opts);
    let loader = TableLoader::new(&connector, "t", &["id"]).unwrap();
    let report = loader.load("id,a,b,c\n".as_bytes()).await.unwrap();

    assert_eq!(report.rows, 0);
    assert!(fetch_target(&mut conn).await.is_empty());
}

// ============================================================================
// Failure paths
// ============================================================================

#[sqlx::test(migrations = false)]
async fn test_missing_table_fails_before_any_write(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let connector = Connector::from_options(connect_opts);
    let loader = TableLoader::new(&connector, "never_migrated", &["id"]).unwrap();

    let err = loader.load(SCENARIO_CSV.as_bytes()).await.unwrap_err();
    assert!(matches!(err, DbError::UndefinedTable(_)), "got {err}");

    // Nothing came into being as a side effect of the failed load.
    let executor = Executor::new(&connector);
    assert!(!executor.exists_table("never_migrated").await.unwrap());
    assert!(!executor.exists_table("never_migrated_incoming").await.unwrap());
}

#[sqlx::test(migrations = false)]
async fn test_arity_mismatch_rejects_whole_batch(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let mut conn = verification_conn(&connect_opts).await;
    create_target(&mut conn).await;

    let connector = Connector::from_options(connect_opts);
    let loader = TableLoader::new(&connector, "t", &["id"]).unwrap();

    // Second row is short one field; the first row must not land either.
    let err = loader
        .load("id,a,b,c\n1,2,abc,def\n2,10,oops\n".as_bytes())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::MalformedRow(_)), "got {err}");
    assert!(fetch_target(&mut conn).await.is_empty());
}

#[sqlx::test(migrations = false)]
async fn test_type_mismatch_surfaces_as_malformed_row(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let mut conn = verification_conn(&connect_opts).await;
    create_target(&mut conn).await;

    let connector = Connector::from_options(connect_opts);
    let loader = TableLoader::new(&connector, "t", &["id"]).unwrap();

    let err = loader
        .load("id,a,b,c\nnot_a_number,2,abc,def\n".as_bytes())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::MalformedRow(_)), "got {err}");
    assert!(fetch_target(&mut conn).await.is_empty());
}

#[sqlx::test(migrations = false)]
async fn test_merge_failure_after_staging_rolls_everything_back(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let mut conn = verification_conn(&connect_opts).await;
    // The CHECK constraint is not copied onto the staging table (plain
    // LIKE), so staging the row succeeds and only the merge step fails.
    sqlx::query("CREATE TABLE guarded (id INT PRIMARY KEY, amount INT CHECK (amount > 0))")
        .execute(&mut conn)
        .await
        .unwrap();

    let connector = Connector::from_options(connect_opts);
    let loader = TableLoader::new(&connector, "guarded", &["id"]).unwrap();

    let err = loader
        .load("id,amount\n1,10\n2,-5\n".as_bytes())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Transaction { .. }), "got {err}");

    // No row of the batch is visible, not even the valid one.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM guarded")
        .fetch_one(&mut conn)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_unreachable_warehouse_is_a_connection_failure() {
    let settings = DbSettings {
        host: "localhost".to_string(),
        port: 1,
        database: "unreachable".to_string(),
        user: "nobody".to_string(),
        password: "nothing".to_string(),
    };
    let connector = Connector::new(&settings);

    let err = Executor::new(&connector).execute("SELECT 1").await.unwrap_err();
    assert!(matches!(err, DbError::Connection { .. }), "got {err}");
    assert!(err.to_string().contains("unreachable"));
}

// ============================================================================
// Executor contracts
// ============================================================================

#[sqlx::test(migrations = false)]
async fn test_commit_does_not_depend_on_result_consumption(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let mut conn = verification_conn(&connect_opts).await;
    sqlx::query("CREATE TABLE marks (id INT PRIMARY KEY)")
        .execute(&mut conn)
        .await
        .unwrap();

    let connector = Connector::from_options(connect_opts);
    let results = Executor::new(&connector)
        .execute_atomic(vec![
            BatchStatement::execute("INSERT INTO marks VALUES (1)"),
            BatchStatement::fetch_all("SELECT id FROM marks"),
        ])
        .await
        .unwrap();

    // Abandon the results without reading a single row. The transaction must
    // already be committed and its connection closed.
    drop(results);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM marks")
        .fetch_one(&mut conn)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[sqlx::test(migrations = false)]
async fn test_mid_batch_failure_rolls_back_earlier_statements(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let mut conn = verification_conn(&connect_opts).await;
    sqlx::query("CREATE TABLE marks (id INT PRIMARY KEY)")
        .execute(&mut conn)
        .await
        .unwrap();

    let connector = Connector::from_options(connect_opts);
    let err = Executor::new(&connector)
        .execute_atomic(vec![
            BatchStatement::execute("INSERT INTO marks VALUES (1)"),
            BatchStatement::execute("THIS IS NOT SQL"),
        ])
        .await
        .unwrap_err();

    match err {
        DbError::Transaction { index, .. } => assert_eq!(index, 1),
        other => panic!("expected Transaction error, got {other}"),
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM marks")
        .fetch_one(&mut conn)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[sqlx::test(migrations = false)]
async fn test_execute_atomic_returns_one_result_per_statement_in_order(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let connector = Connector::from_options(connect_opts);
    let results = Executor::new(&connector)
        .execute_atomic(vec![
            BatchStatement::fetch_first("SELECT 1"),
            BatchStatement::execute("SELECT 2"),
            BatchStatement::fetch_all("SELECT 3 UNION ALL SELECT 4"),
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    let mut results = results.into_iter();
    let first = results.next().unwrap().into_first().unwrap();
    assert_eq!(first.get::<i32, _>(0), 1);
    assert!(results.next().unwrap().into_rows().is_empty());
    assert_eq!(results.next().unwrap().into_rows().len(), 2);
}

#[sqlx::test(migrations = false)]
async fn test_execute_one_and_exists_helpers(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let mut conn = verification_conn(&connect_opts).await;
    create_target(&mut conn).await;
    sqlx::query("INSERT INTO t VALUES (1, 2, 'abc', 'def')")
        .execute(&mut conn)
        .await
        .unwrap();

    let connector = Connector::from_options(connect_opts);
    let executor = Executor::new(&connector);

    let row = executor
        .query_first("SELECT b FROM t WHERE id = 1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get::<String, _>(0), "abc");

    assert!(executor.exists("SELECT 1 FROM t WHERE id = 1").await.unwrap());
    assert!(!executor.exists("SELECT 1 FROM t WHERE id = 99").await.unwrap());
    assert!(executor.exists_table("t").await.unwrap());
    assert!(!executor.exists_table("nope").await.unwrap());
}

#[sqlx::test(migrations = false)]
async fn test_query_with_columns_reports_layout_of_empty_results(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let mut conn = verification_conn(&connect_opts).await;
    create_target(&mut conn).await;

    let connector = Connector::from_options(connect_opts);
    let (rows, columns) = Executor::new(&connector)
        .query_with_columns("SELECT id, b FROM t WHERE false")
        .await
        .unwrap();

    assert!(rows.is_empty());
    assert_eq!(columns, vec!["id", "b"]);
}

// ============================================================================
// Schema inspection
// ============================================================================

#[sqlx::test(migrations = false)]
async fn test_columns_of_reports_live_layout_in_order(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let mut conn = verification_conn(&connect_opts).await;
    create_target(&mut conn).await;

    let connector = Connector::from_options(connect_opts);
    let columns = SchemaInspector::new(&connector).columns_of("t").await.unwrap();

    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "a", "b", "c"]);
    assert_eq!(columns[0].data_type, "integer");
    assert_eq!(columns[2].data_type, "text");
}

#[sqlx::test(migrations = false)]
async fn test_columns_of_missing_table_is_a_distinct_error(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let connector = Connector::from_options(connect_opts);
    let err = SchemaInspector::new(&connector)
        .columns_of("never_migrated")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::UndefinedTable(_)), "got {err}");
}
