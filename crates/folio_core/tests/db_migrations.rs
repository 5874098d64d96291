use folio_core::db::migrations::{latest_version, schema_version};
use folio_core::db::{open_db, DbError, DbLocation};
use rusqlite::Connection;

#[test]
fn open_in_memory_applies_all_migrations() {
    let conn = open_db(&DbLocation::Memory).unwrap();

    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    assert_table_exists(&conn, "collections");
    assert_table_exists(&conn, "collection_indexes");
    assert_table_exists(&conn, "items");
}

#[test]
fn opening_same_store_file_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let location = DbLocation::File(dir.path().join("folio.db"));

    let conn_first = open_db(&location).unwrap();
    assert_eq!(schema_version(&conn_first).unwrap(), latest_version());
    drop(conn_first);

    let conn_second = open_db(&location).unwrap();
    assert_eq!(schema_version(&conn_second).unwrap(), latest_version());
    assert_table_exists(&conn_second, "items");
}

#[test]
fn opening_store_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&DbLocation::File(path)).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn location_parse_recognizes_memory() {
    assert_eq!(DbLocation::parse(":memory:"), DbLocation::Memory);
    assert_eq!(
        DbLocation::parse("/var/lib/folio/store.db"),
        DbLocation::File("/var/lib/folio/store.db".into())
    );
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
