use std::path::{Path, PathBuf};

use log::info;

use crate::{Database, TabulaConfig, TabulaResult};

const DEFAULT_DB_NAME: &str = "tabula.sqlite";

pub fn load_or_init_config(base: &Path) -> TabulaResult<TabulaConfig> {
    let default_sqlite = base.join(DEFAULT_DB_NAME);
    TabulaConfig::load_or_init(base, &default_sqlite)
}

/// Opens the store described by `base/tabula.json`.
///
/// A missing store file is created from the configured migrations; with
/// `auto_migrate` an existing store is brought to the latest version first.
pub fn open_database(base: &Path) -> TabulaResult<Database> {
    let config = load_or_init_config(base)?;
    let path = config.sqlite_path(base);
    let options = config.open_options();
    let Some(migrations_dir) = config.migrations_dir(base) else {
        return Database::open(&path, options);
    };
    if !path.exists() {
        info!("tabula datastore: creating {} from migrations", path.display());
        Database::create_from_migrations(&path, &migrations_dir)?.close()?;
    } else if config.auto_migrate() && !options.read_only {
        let mut db = Database::open(&path, options)?;
        db.migrate(&migrations_dir, None)?;
        return Ok(db);
    }
    Database::open(&path, options)
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(DEFAULT_DB_NAME)
}
