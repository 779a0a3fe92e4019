use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rusqlite::{Connection, OpenFlags};
use sea_query::{Expr, Order, Query};

use crate::catalog::build_catalog;
use crate::db::*;
use crate::introspect::introspect;
use crate::migration::{user_version, Migrations, Migrator};
use crate::time_series::TimeSeriesCache;
use crate::validate::enforce;
use crate::{OpenOptions, ValidationMode};
use tabula_core::{
    Catalog, Collection, ElementRef, TabulaError, TabulaResult, ID_COLUMN, LABEL_ATTRIBUTE,
};

/// One open store: a SQLite connection plus the catalog derived from its
/// schema at open time.
///
/// A `Database` is not shared across threads; open one per thread instead.
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
    options: OpenOptions,
    catalog: Catalog,
    pub(crate) time_series: TimeSeriesCache,
}

impl Database {
    /// Opens an existing store file.
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> TabulaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TabulaError::not_found(format!(
                "database file '{}' does not exist",
                path.display()
            )));
        }
        let flags = if options.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };
        let conn = Connection::open_with_flags(path, flags)?;
        Self::from_connection(conn, Some(path.to_path_buf()), options)
    }

    /// Opens a private in-memory store built from `schema_sql`.
    pub fn open_in_memory(schema_sql: &str) -> TabulaResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema_sql)?;
        Self::from_connection(conn, None, OpenOptions::read_write())
    }

    /// Creates a new store file and applies the schema script in `schema_file`.
    pub fn create_from_schema(
        path: impl AsRef<Path>,
        schema_file: impl AsRef<Path>,
        force: bool,
    ) -> TabulaResult<Self> {
        let schema_file = schema_file.as_ref();
        let sql = fs::read_to_string(schema_file).map_err(|err| {
            TabulaError::storage(format!("read schema '{}': {err}", schema_file.display()))
        })?;
        Self::create_from_schema_sql(path, &sql, force)
    }

    /// Creates a new store file from an in-memory schema script.
    ///
    /// An existing file is an error unless `force` is set, in which case it
    /// is replaced. A schema that fails validation leaves no file behind.
    pub fn create_from_schema_sql(
        path: impl AsRef<Path>,
        schema_sql: &str,
        force: bool,
    ) -> TabulaResult<Self> {
        let path = path.as_ref();
        prepare_new_file(path, force)?;
        let created = Connection::open(path)
            .map_err(TabulaError::from)
            .and_then(|conn| {
                conn.execute_batch(schema_sql)?;
                Self::from_connection(conn, Some(path.to_path_buf()), OpenOptions::read_write())
            });
        if created.is_err() {
            let _ = fs::remove_file(path);
        }
        let db = created?;
        info!(
            "tabula store: created '{}' with {} collections",
            path.display(),
            db.catalog.collection_names().len()
        );
        Ok(db)
    }

    /// Creates a new store file by running every migration in `migrations_dir`.
    pub fn create_from_migrations(
        path: impl AsRef<Path>,
        migrations_dir: impl AsRef<Path>,
    ) -> TabulaResult<Self> {
        let path = path.as_ref();
        let migrations = Migrations::load(migrations_dir.as_ref())?;
        prepare_new_file(path, false)?;
        let created = Connection::open(path)
            .map_err(TabulaError::from)
            .and_then(|conn| {
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                Migrator::new(&conn, &migrations).migrate_to(migrations.latest_version())?;
                Self::from_connection(conn, Some(path.to_path_buf()), OpenOptions::read_write())
            });
        if created.is_err() {
            let _ = fs::remove_file(path);
        }
        let db = created?;
        info!(
            "tabula store: created '{}' at version {}",
            path.display(),
            migrations.latest_version()
        );
        Ok(db)
    }

    fn from_connection(
        conn: Connection,
        path: Option<PathBuf>,
        options: OpenOptions,
    ) -> TabulaResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let catalog = load_catalog(&conn, options.validation_mode)?;
        debug!(
            "tabula store: opened {} (read_only={}, collections={:?})",
            path.as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ":memory:".to_string()),
            options.read_only,
            catalog.collection_names()
        );
        Ok(Self {
            conn,
            path,
            options,
            catalog,
            time_series: TimeSeriesCache::new(),
        })
    }

    /// Runs `f` inside one transaction; any error rolls every write back.
    /// Nested calls join the transaction already open.
    pub fn in_transaction<T, F>(&self, f: F) -> TabulaResult<T>
    where
        F: FnOnce(&Self) -> TabulaResult<T>,
    {
        if !self.conn.is_autocommit() {
            return f(self);
        }
        let tx = self.conn.unchecked_transaction()?;
        let result = f(self)?;
        tx.commit()?;
        Ok(result)
    }

    /// Migrates to `target` (latest when `None`) and reloads the catalog.
    /// Returns the version the store ends at.
    pub fn migrate(
        &mut self,
        migrations_dir: impl AsRef<Path>,
        target: Option<u32>,
    ) -> TabulaResult<u32> {
        let migrations = Migrations::load(migrations_dir.as_ref())?;
        let target = target.unwrap_or_else(|| migrations.latest_version());
        Migrator::new(&self.conn, &migrations)
            .with_backup(self.path.as_deref())
            .with_validation_mode(self.options.validation_mode)
            .migrate_to(target)?;
        self.reload_catalog()?;
        Ok(target)
    }

    /// Rebuilds the catalog from the live schema and drops cached series.
    pub fn reload_catalog(&mut self) -> TabulaResult<()> {
        self.catalog = load_catalog(&self.conn, self.options.validation_mode)?;
        self.time_series.clear()?;
        Ok(())
    }

    pub fn close(self) -> TabulaResult<()> {
        self.conn.close().map_err(|(_, err)| TabulaError::from(err))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        self.options.read_only
    }

    pub fn user_version(&self) -> TabulaResult<u32> {
        user_version(&self.conn)
    }

    pub fn collection_names(&self) -> Vec<&str> {
        self.catalog.collection_names()
    }

    /// Every attribute of `collection`, in name order.
    pub fn attribute_names(&self, collection: &str) -> TabulaResult<Vec<&str>> {
        Ok(self
            .catalog
            .collection(collection)?
            .attributes
            .keys()
            .map(String::as_str)
            .collect())
    }

    pub(crate) fn collection(&self, name: &str) -> TabulaResult<&Collection> {
        self.catalog.collection(name)
    }

    /// Resolves a label or id to the id of an existing element.
    pub(crate) fn resolve_element(
        &self,
        collection: &Collection,
        element: &ElementRef,
    ) -> TabulaResult<i64> {
        let mut select = Query::select();
        select.column(alias(ID_COLUMN)).from(alias(&collection.name));
        match element {
            ElementRef::Id(id) => {
                select.and_where(Expr::col(alias(ID_COLUMN)).eq(*id));
            }
            ElementRef::Label(label) => {
                if !collection.has_label() {
                    return Err(TabulaError::not_found(format!(
                        "collection '{}' has no '{LABEL_ATTRIBUTE}' attribute",
                        collection.name
                    )));
                }
                select.and_where(Expr::col(alias(LABEL_ATTRIBUTE)).eq(label.as_str()));
            }
        }
        query_one(&self.conn, &select, |row| row.get::<_, i64>(0))?.ok_or_else(|| {
            TabulaError::not_found(format!(
                "element with {element} does not exist in collection '{}'",
                collection.name
            ))
        })
    }

    pub(crate) fn element_ids(&self, collection: &Collection) -> TabulaResult<Vec<i64>> {
        let select = Query::select()
            .column(alias(ID_COLUMN))
            .from(alias(&collection.name))
            .order_by(alias(ID_COLUMN), Order::Asc)
            .to_owned();
        query_all(&self.conn, &select, |row| row.get::<_, i64>(0))
    }

    pub(crate) fn count_rows(&self, table: &str) -> TabulaResult<usize> {
        let select = Query::select()
            .expr(Expr::cust("COUNT(*)"))
            .from(alias(table))
            .to_owned();
        let count = query_one(&self.conn, &select, |row| row.get::<_, i64>(0))?.unwrap_or(0);
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn load_catalog(conn: &Connection, mode: ValidationMode) -> TabulaResult<Catalog> {
    let schema = introspect(conn)?;
    enforce(&schema, mode)?;
    build_catalog(&schema)
}

fn prepare_new_file(path: &Path, force: bool) -> TabulaResult<()> {
    if path.exists() {
        if !force {
            return Err(TabulaError::storage(format!(
                "database file '{}' already exists",
                path.display()
            )));
        }
        fs::remove_file(path).map_err(|err| storage_error("remove existing database", err))?;
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| storage_error("create database dir", err))?;
        }
    }
    Ok(())
}
