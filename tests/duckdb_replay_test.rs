//! End-to-end replay tests against an embedded DuckDB destination.

use duckdb::Connection;
use sql_replay::destination::{DestinationConfig, DuckDbConfig};
use sql_replay::replay::{self, ReplayError, ReplayOptions, ReplayRequest};
use sql_replay::source::Origin;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

fn create_test_dump(name: &str, content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let dump_path = temp_dir.path().join(name);
    fs::write(&dump_path, content).unwrap();
    (temp_dir, dump_path)
}

fn simple_dump() -> &'static str {
    r#"
-- Simple dump
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    name VARCHAR(100)
);

/* seed data */
INSERT INTO users VALUES (1, 'Alice');
INSERT INTO users VALUES (2, 'Bob');
INSERT INTO users VALUES (3, 'Charlie');

CREATE TABLE orders (
    id INTEGER PRIMARY KEY,
    user_id INTEGER,
    amount DECIMAL(10,2)
);

INSERT INTO orders VALUES
(1, 1, 99.99),
(2, 2, 75.00);
"#
}

fn duckdb_request(origin: Origin, db_path: &PathBuf, options: ReplayOptions) -> ReplayRequest {
    ReplayRequest {
        origin,
        destination: DestinationConfig::Duckdb(DuckDbConfig {
            path: Some(db_path.clone()),
        }),
        options,
    }
}

fn count_rows(db_path: &PathBuf, table: &str) -> i64 {
    let conn = Connection::open(db_path).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })
    .unwrap()
}

// =============================================================================
// Successful runs
// =============================================================================

#[test]
fn test_replay_local_file() {
    let (temp_dir, dump_path) = create_test_dump("dump.sql", simple_dump());
    let db_path = temp_dir.path().join("out.duckdb");

    let request = duckdb_request(
        Origin::resolve(&dump_path.to_string_lossy()),
        &db_path,
        ReplayOptions::default(),
    );
    let outcome = replay::run(&request, None).unwrap();

    assert_eq!(outcome.applied_count, 6);
    assert_eq!(outcome.failed_count, 0);
    assert_eq!(outcome.commits, 1);
    assert!(outcome.cleanup_issues.is_empty());

    assert_eq!(count_rows(&db_path, "users"), 3);
    assert_eq!(count_rows(&db_path, "orders"), 2);
}

#[test]
fn test_replay_gzip_file() {
    let temp_dir = TempDir::new().unwrap();
    let dump_path = temp_dir.path().join("dump.sql.gz");
    let file = fs::File::create(&dump_path).unwrap();
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    encoder.write_all(simple_dump().as_bytes()).unwrap();
    encoder.finish().unwrap();

    let db_path = temp_dir.path().join("out.duckdb");
    let request = duckdb_request(
        Origin::resolve(&dump_path.to_string_lossy()),
        &db_path,
        ReplayOptions::default(),
    );
    let outcome = replay::run(&request, None).unwrap();

    assert_eq!(outcome.applied_count, 6);
    assert_eq!(count_rows(&db_path, "users"), 3);
}

#[test]
fn test_replay_inline_text_with_commit_batches() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("out.duckdb");

    let mut sql = String::from("CREATE TABLE t (id INTEGER);\n");
    for i in 0..25 {
        sql.push_str(&format!("INSERT INTO t VALUES ({});\n", i));
    }

    let request = duckdb_request(
        Origin::InlineText(sql),
        &db_path,
        ReplayOptions {
            commit_every: 10,
            stop_on_error: false,
        },
    );
    let outcome = replay::run(&request, None).unwrap();

    assert_eq!(outcome.applied_count, 26);
    // 10, 20 and the remaining 6
    assert_eq!(outcome.commits, 3);
    assert_eq!(count_rows(&db_path, "t"), 25);
}

// =============================================================================
// Failure handling
// =============================================================================

#[test]
fn test_failures_do_not_stop_run() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("out.duckdb");
    let sql = "CREATE TABLE t (id INTEGER PRIMARY KEY);\nINSERT INTO t VALUES (1);\nINSERT INTO t VALUES (1);\nINSERT INTO nope VALUES (1);\nINSERT INTO t VALUES (2);\n";

    let request = duckdb_request(
        Origin::InlineText(sql.to_string()),
        &db_path,
        ReplayOptions::default(),
    );
    let outcome = replay::run(&request, None).unwrap();

    assert_eq!(outcome.applied_count, 3);
    assert_eq!(outcome.failed_count, 2);
    let indexes: Vec<u64> = outcome.failures.iter().map(|f| f.index).collect();
    assert_eq!(indexes, vec![3, 4]);
    assert_eq!(outcome.failures[1].statement, "INSERT INTO nope VALUES (1)");
    assert_eq!(count_rows(&db_path, "t"), 2);
}

#[test]
fn test_stop_on_error_leaves_later_statements_unapplied() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("out.duckdb");
    let sql = "CREATE TABLE t (id INTEGER);\nINSERT INTO t VALUES (1);\nINSERT INTO nope VALUES (1);\nINSERT INTO t VALUES (2);\n";

    let request = duckdb_request(
        Origin::InlineText(sql.to_string()),
        &db_path,
        ReplayOptions {
            commit_every: 200,
            stop_on_error: true,
        },
    );
    let err = replay::run(&request, None).unwrap_err();

    assert!(matches!(err, ReplayError::Statement { index: 3, .. }));
    let outcome = err.outcome().unwrap();
    assert_eq!(outcome.applied_count, 2);
    assert_eq!(outcome.failed_count, 1);
    assert_eq!(count_rows(&db_path, "t"), 1);
}

#[test]
fn test_corrupt_compressed_dump_is_fatal() {
    let (temp_dir, dump_path) = create_test_dump("dump.sql.gz", "not really gzip");
    let db_path = temp_dir.path().join("out.duckdb");

    let request = duckdb_request(
        Origin::resolve(&dump_path.to_string_lossy()),
        &db_path,
        ReplayOptions::default(),
    );
    let err = replay::run(&request, None).unwrap_err();

    assert!(matches!(err, ReplayError::Stream { .. }));
    assert_eq!(err.outcome().unwrap().attempted(), 0);
}

#[test]
fn test_unreachable_destination_is_connection_error() {
    let temp_dir = TempDir::new().unwrap();
    // A directory cannot be opened as a database file
    let request = duckdb_request(
        Origin::InlineText("SELECT 1;".to_string()),
        &temp_dir.path().to_path_buf(),
        ReplayOptions::default(),
    );
    let err = replay::run(&request, None).unwrap_err();
    assert!(matches!(err, ReplayError::Connection { .. }));
}
