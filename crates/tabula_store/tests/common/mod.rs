#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tabula_store::{Database, ElementInput, TabulaResult, TimeSeriesFrame};
use time::macros::datetime;

pub fn fixture(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn basic_schema() -> PathBuf {
    fixture("schemas/basic.sql")
}

pub fn migrations_dir() -> PathBuf {
    fixture("migrations")
}

/// A fresh store at `dir/study.sqlite` built from the basic schema.
pub fn create_basic(dir: &Path) -> TabulaResult<Database> {
    Database::create_from_schema(dir.join("study.sqlite"), basic_schema(), false)
}

pub fn create_configuration(db: &Database) -> TabulaResult<i64> {
    db.create_element(
        "Configuration",
        ElementInput::new().scalar("label", "config").scalar("value1", 1.0),
    )
}

/// Resource `label` with a yearly `group1` series on 2001-01-01 and 2002-01-01.
pub fn create_resource(db: &Database, label: &str, first: f64, second: f64) -> TabulaResult<i64> {
    let frame = TimeSeriesFrame::new()
        .column(
            "date_time",
            [
                datetime!(2001-01-01 00:00:00),
                datetime!(2002-01-01 00:00:00),
            ],
        )
        .column("some_vector1", [first, second]);
    db.create_element(
        "Resource",
        ElementInput::new()
            .scalar("label", label)
            .scalar("type", "E")
            .time_series("group1", frame),
    )
}
