mod common;

use common::fixture;
use tabula_store::{Database, OpenOptions, TabulaError, TabulaResult, ValidationMode};
use tempfile::tempdir;

fn rejected(schema: &str) -> bool {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("study.sqlite");
    let result = Database::create_from_schema(&path, fixture(schema), false);
    let refused = matches!(result, Err(TabulaError::Schema { .. }));
    refused && !path.exists()
}

#[test]
fn conventional_schema_is_accepted() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = Database::create_from_schema(
        dir.path().join("study.sqlite"),
        fixture("schemas/basic.sql"),
        false,
    )?;
    assert_eq!(
        db.collection_names(),
        vec!["Configuration", "Cost", "Plant", "Resource"]
    );
    Ok(())
}

#[test]
fn convention_violations_are_refused() {
    assert!(rejected("schemas/missing_configuration.sql"));
    assert!(rejected("schemas/bad_cascade.sql"));
    assert!(rejected("schemas/bad_label.sql"));
}

#[test]
fn existing_files_need_force() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("study.sqlite");
    Database::create_from_schema(&path, fixture("schemas/basic.sql"), false)?.close()?;
    assert!(Database::create_from_schema(&path, fixture("schemas/basic.sql"), false).is_err());
    Database::create_from_schema(&path, fixture("schemas/basic.sql"), true)?;
    Ok(())
}

#[test]
fn warn_mode_opens_a_nonconforming_store() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("legacy.sqlite");
    let conn = rusqlite::Connection::open(&path)?;
    conn.execute_batch(
        "CREATE TABLE Configuration (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT UNIQUE NOT NULL);
         CREATE TABLE Resource (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT);",
    )?;
    conn.close().map_err(|(_, err)| TabulaError::from(err))?;

    assert!(matches!(
        Database::open(&path, OpenOptions::read_only()),
        Err(TabulaError::Schema { .. })
    ));
    let db = Database::open(
        &path,
        OpenOptions::read_only().with_validation_mode(ValidationMode::Warn),
    )?;
    assert_eq!(db.collection_names(), vec!["Configuration", "Resource"]);
    Ok(())
}
