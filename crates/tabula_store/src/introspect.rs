//! Raw physical schema as reported by SQLite's pragma table functions.

use rusqlite::{params, Connection};

use tabula_core::TabulaResult;

#[derive(Clone, Debug, PartialEq)]
pub struct RawColumn {
    pub name: String,
    pub decl_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    /// 1-based position inside the primary key, 0 when not part of it.
    pub pk_position: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawForeignKey {
    pub column: String,
    pub target_table: String,
    pub target_column: Option<String>,
    pub on_update: String,
    pub on_delete: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawTable {
    pub name: String,
    pub columns: Vec<RawColumn>,
    pub foreign_keys: Vec<RawForeignKey>,
    /// Column lists of every unique index, primary keys included.
    pub unique_indexes: Vec<Vec<String>>,
}

impl RawTable {
    pub fn column(&self, name: &str) -> Option<&RawColumn> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn foreign_key(&self, column: &str) -> Option<&RawForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    /// Primary key columns in key order.
    pub fn primary_key(&self) -> Vec<&str> {
        let mut key: Vec<&RawColumn> = self
            .columns
            .iter()
            .filter(|column| column.pk_position > 0)
            .collect();
        key.sort_by_key(|column| column.pk_position);
        key.into_iter().map(|column| column.name.as_str()).collect()
    }

    pub fn is_unique(&self, column: &str) -> bool {
        self.unique_indexes
            .iter()
            .any(|index| index.len() == 1 && index[0] == column)
            || self.primary_key() == [column]
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawSchema {
    pub tables: Vec<RawTable>,
}

impl RawSchema {
    pub fn table(&self, name: &str) -> Option<&RawTable> {
        self.tables.iter().find(|table| table.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

pub fn introspect(conn: &Connection) -> TabulaResult<RawSchema> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        tables.push(RawTable {
            columns: columns(conn, &name)?,
            foreign_keys: foreign_keys(conn, &name)?,
            unique_indexes: unique_indexes(conn, &name)?,
            name,
        });
    }
    Ok(RawSchema { tables })
}

fn columns(conn: &Connection, table: &str) -> TabulaResult<Vec<RawColumn>> {
    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let rows = stmt
        .query_map(params![table], |row| {
            Ok(RawColumn {
                name: row.get(0)?,
                decl_type: row.get::<_, String>(1)?.to_uppercase(),
                not_null: row.get::<_, i64>(2)? != 0,
                default: row.get(3)?,
                pk_position: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn foreign_keys(conn: &Connection, table: &str) -> TabulaResult<Vec<RawForeignKey>> {
    let mut stmt = conn.prepare(
        "SELECT \"from\", \"table\", \"to\", on_update, on_delete \
         FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
    )?;
    let rows = stmt
        .query_map(params![table], |row| {
            Ok(RawForeignKey {
                column: row.get(0)?,
                target_table: row.get(1)?,
                target_column: row.get(2)?,
                on_update: row.get::<_, String>(3)?.to_uppercase(),
                on_delete: row.get::<_, String>(4)?.to_uppercase(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn unique_indexes(conn: &Connection, table: &str) -> TabulaResult<Vec<Vec<String>>> {
    let mut stmt =
        conn.prepare("SELECT name FROM pragma_index_list(?1) WHERE \"unique\" = 1 ORDER BY seq")?;
    let index_names = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut info = conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
    let mut indexes = Vec::with_capacity(index_names.len());
    for index in index_names {
        let columns = info
            .query_map(params![index], |row| row.get::<_, Option<String>>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        indexes.push(columns.into_iter().flatten().collect());
    }
    Ok(indexes)
}
