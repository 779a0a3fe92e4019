use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use rusqlite::{Connection, DatabaseName};
use time::macros::format_description;
use time::OffsetDateTime;

use tabula_core::{TabulaError, TabulaResult};

pub const BACKUP_DIR: &str = "_backups";

/// Where a backup of `db_path` taken at `now` goes:
/// `<dir>/_backups/<stem>_<timestamp>.sqlite`.
pub fn backup_path(db_path: &Path, now: OffsetDateTime) -> TabulaResult<PathBuf> {
    let stamp = now
        .format(format_description!(
            "[year][month][day]T[hour][minute][second]_[subsecond digits:6]"
        ))
        .map_err(|err| TabulaError::migration(format!("format backup timestamp: {err}")))?;
    let stem = db_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "database".to_string());
    let dir = db_path
        .parent()
        .map(|parent| parent.join(BACKUP_DIR))
        .unwrap_or_else(|| PathBuf::from(BACKUP_DIR));
    Ok(dir.join(format!("{stem}_{stamp}.sqlite")))
}

/// Copies the live database behind `conn` next to `db_path` with SQLite's
/// online backup API and returns the backup file.
pub fn create_backup(conn: &Connection, db_path: &Path) -> TabulaResult<PathBuf> {
    let mut target = backup_path(db_path, OffsetDateTime::now_utc())?;
    let mut attempt = 1;
    while target.exists() {
        let name = format!(
            "{}_{attempt}.sqlite",
            target
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        target.set_file_name(name);
        attempt += 1;
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            TabulaError::migration(format!(
                "create backup directory {}: {err}",
                parent.display()
            ))
        })?;
    }
    conn.backup(DatabaseName::Main, &target, None)
        .map_err(|err| {
            TabulaError::migration(format!("backup to {} failed: {err}", target.display()))
        })?;
    info!("tabula migration: backup written to {}", target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use time::macros::datetime;

    #[test]
    fn backup_names_carry_stem_and_timestamp() -> TabulaResult<()> {
        let path = backup_path(
            Path::new("/data/study.sqlite"),
            datetime!(2024-03-05 06:07:08.5 UTC),
        )?;
        assert_eq!(
            path,
            PathBuf::from("/data/_backups/study_20240305T060708_500000.sqlite")
        );
        Ok(())
    }

    #[test]
    fn copies_database_contents() -> TabulaResult<()> {
        let dir = tempdir().expect("tempdir");
        let db_path = dir.path().join("study.sqlite");
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("CREATE TABLE Plant (id INTEGER PRIMARY KEY); INSERT INTO Plant VALUES (7);")?;
        let first = create_backup(&conn, &db_path)?;
        let second = create_backup(&conn, &db_path)?;
        assert_ne!(first, second);
        let copy = Connection::open(&first)?;
        let id: i64 = copy.query_row("SELECT id FROM Plant", [], |row| row.get(0))?;
        assert_eq!(id, 7);
        Ok(())
    }
}
