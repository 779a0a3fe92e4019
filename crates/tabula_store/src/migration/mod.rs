//! Versioned schema migrations.
//!
//! A migrations directory holds one sub-directory per version, numbered from
//! 1 upward, each with an `up.sql` and a `down.sql` script. The version a
//! store is at lives in `PRAGMA user_version`.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use log::{info, warn};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

mod backup;

pub use backup::{backup_path, create_backup, BACKUP_DIR};

use crate::catalog::build_catalog;
use crate::introspect::introspect;
use crate::validate::enforce;
use crate::ValidationMode;
use tabula_core::{TabulaError, TabulaResult};

pub const UP_SCRIPT: &str = "up.sql";
pub const DOWN_SCRIPT: &str = "down.sql";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Migration {
    pub version: u32,
    pub up: String,
    pub down: String,
}

impl Migration {
    fn script(&self, direction: Direction) -> &str {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Migrations {
    steps: BTreeMap<u32, Migration>,
}

impl Migrations {
    pub fn new(steps: impl IntoIterator<Item = Migration>) -> Self {
        Self {
            steps: steps
                .into_iter()
                .map(|migration| (migration.version, migration))
                .collect(),
        }
    }

    /// Reads every numbered sub-directory of `dir`. Missing scripts load as
    /// empty and are reported by [`Migrations::check_chain`].
    pub fn load(dir: &Path) -> TabulaResult<Self> {
        let entries = fs::read_dir(dir).map_err(|err| {
            TabulaError::migration(format!("read migrations dir {}: {err}", dir.display()))
        })?;
        let mut steps = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                TabulaError::migration(format!("read migrations dir {}: {err}", dir.display()))
            })?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let version = match name.parse::<u32>() {
                Ok(version) if version > 0 => version,
                _ => {
                    warn!("tabula migration: skipping non-version directory {}", path.display());
                    continue;
                }
            };
            steps.push(Migration {
                version,
                up: read_script(&path.join(UP_SCRIPT))?,
                down: read_script(&path.join(DOWN_SCRIPT))?,
            });
        }
        Ok(Self::new(steps))
    }

    pub fn latest_version(&self) -> u32 {
        self.steps.keys().next_back().copied().unwrap_or(0)
    }

    pub fn get(&self, version: u32) -> Option<&Migration> {
        self.steps.get(&version)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every version between `from` and `to` (exclusive of the lower bound)
    /// must have both scripts, non-empty.
    pub fn check_chain(&self, from: u32, to: u32) -> TabulaResult<()> {
        let (low, high) = if from <= to { (from, to) } else { (to, from) };
        for version in low + 1..=high {
            match self.get(version) {
                None => {
                    return Err(TabulaError::migration(format!(
                        "migration chain has a gap at version {version}"
                    )))
                }
                Some(migration) => {
                    for direction in [Direction::Up, Direction::Down] {
                        if migration.script(direction).trim().is_empty() {
                            return Err(TabulaError::migration(format!(
                                "migration {version} has no {direction} script"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Applies every migration up and back down on a scratch in-memory store
    /// and checks it ends empty at version 0.
    pub fn check_round_trip(&self) -> TabulaResult<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let latest = self.latest_version();
        let migrator = Migrator::new(&conn, self);
        migrator.apply(0, latest, Direction::Up)?;
        migrator.apply(latest, 0, Direction::Down)?;
        let leftover: Vec<String> = introspect(&conn)?
            .tables
            .into_iter()
            .map(|table| table.name)
            .collect();
        if !leftover.is_empty() {
            return Err(TabulaError::migration(format!(
                "down migrations left tables behind: {}",
                leftover.join(", ")
            )));
        }
        let version = user_version(&conn)?;
        if version != 0 {
            return Err(TabulaError::migration(format!(
                "down migrations ended at version {version}"
            )));
        }
        Ok(())
    }
}

fn read_script(path: &Path) -> TabulaResult<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    fs::read_to_string(path)
        .map_err(|err| TabulaError::migration(format!("read {}: {err}", path.display())))
}

pub fn user_version(conn: &Connection) -> TabulaResult<u32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

pub fn set_user_version(conn: &Connection, version: u32) -> TabulaResult<()> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))?;
    Ok(())
}

/// Runs migration scripts against one connection.
///
/// Each step executes in its own transaction together with its version bump.
/// SQLite ignores `PRAGMA foreign_keys` inside a transaction, so a script
/// that turns foreign keys off to rebuild a table gets no effect from it.
/// When a database path is set, one backup is taken before the first step.
pub struct Migrator<'a> {
    conn: &'a Connection,
    migrations: &'a Migrations,
    backup_of: Option<&'a Path>,
    validation_mode: ValidationMode,
}

impl<'a> Migrator<'a> {
    pub fn new(conn: &'a Connection, migrations: &'a Migrations) -> Self {
        Self {
            conn,
            migrations,
            backup_of: None,
            validation_mode: ValidationMode::Error,
        }
    }

    pub fn with_backup(mut self, db_path: Option<&'a Path>) -> Self {
        self.backup_of = db_path;
        self
    }

    pub fn with_validation_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = mode;
        self
    }

    pub fn apply(&self, from: u32, to: u32, direction: Direction) -> TabulaResult<()> {
        let current = user_version(self.conn)?;
        if current != from {
            return Err(TabulaError::migration(format!(
                "store is at version {current}, not {from}"
            )));
        }
        let ordered = match direction {
            Direction::Up => from <= to,
            Direction::Down => from >= to,
        };
        if !ordered {
            return Err(TabulaError::migration(format!(
                "cannot migrate {direction} from version {from} to {to}"
            )));
        }
        if from == to {
            return Ok(());
        }
        self.migrations.check_chain(from, to)?;
        if let Some(db_path) = self.backup_of {
            create_backup(self.conn, db_path)?;
        }
        match direction {
            Direction::Up => {
                for version in from + 1..=to {
                    self.step(version, direction)?;
                }
            }
            Direction::Down => {
                for version in (to + 1..=from).rev() {
                    self.step(version, direction)?;
                }
            }
        }
        info!("tabula migration: {direction} from {from} to {to} complete");
        Ok(())
    }

    /// Moves from the stored version to `target` in whichever direction
    /// that takes.
    pub fn migrate_to(&self, target: u32) -> TabulaResult<()> {
        let current = user_version(self.conn)?;
        let direction = if target >= current {
            Direction::Up
        } else {
            Direction::Down
        };
        self.apply(current, target, direction)
    }

    fn step(&self, version: u32, direction: Direction) -> TabulaResult<()> {
        let migration = self.migrations.get(version).ok_or_else(|| {
            TabulaError::migration(format!("migration chain has a gap at version {version}"))
        })?;
        let next = match direction {
            Direction::Up => version,
            Direction::Down => version - 1,
        };
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(migration.script(direction)).map_err(|err| {
            TabulaError::migration(format!("migration {version} {direction} failed: {err}"))
        })?;
        set_user_version(&tx, next)?;
        if direction == Direction::Up && self.validation_mode != ValidationMode::Off {
            let schema = introspect(&tx)?;
            enforce(&schema, self.validation_mode)?;
            build_catalog(&schema)?;
        }
        tx.commit()?;
        info!("tabula migration: applied {version} {direction}, store at version {next}");
        Ok(())
    }
}

/// Applies `from` to `to` in `direction`, backing `db_path` up first.
pub fn apply_migrations(
    conn: &Connection,
    db_path: Option<&Path>,
    migrations: &Migrations,
    from: u32,
    to: u32,
    direction: Direction,
) -> TabulaResult<()> {
    Migrator::new(conn, migrations)
        .with_backup(db_path)
        .apply(from, to, direction)
}

/// Moves the store to `target`, picking the direction from its version.
pub fn migrate(
    conn: &Connection,
    db_path: Option<&Path>,
    migrations: &Migrations,
    target: u32,
) -> TabulaResult<()> {
    Migrator::new(conn, migrations)
        .with_backup(db_path)
        .migrate_to(target)
}
