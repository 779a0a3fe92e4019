use log::debug;
use sea_query::{Expr, Query};

use crate::db::*;
use crate::store::Database;
use tabula_core::{ElementRef, GroupKind, TabulaError, TabulaResult, ID_COLUMN};

impl Database {
    /// Deletes one element. Group rows go with it through `ON DELETE
    /// CASCADE`; relations pointing at it follow their own foreign key action.
    pub fn delete_element(
        &self,
        collection: &str,
        element: impl Into<ElementRef>,
    ) -> TabulaResult<()> {
        let source = self.collection(collection)?;
        let id = self.resolve_element(source, &element.into())?;
        let delete = Query::delete()
            .from_table(alias(&source.name))
            .and_where(Expr::col(alias(ID_COLUMN)).eq(id))
            .to_owned();
        exec(self.connection(), &delete)?;
        debug!("tabula delete: '{}' element {id}", source.name);
        Ok(())
    }

    /// Drops every row of one time-series group for one element.
    pub fn delete_time_series(
        &self,
        collection: &str,
        group: &str,
        element: impl Into<ElementRef>,
    ) -> TabulaResult<()> {
        let source = self.collection(collection)?;
        if !source.groups(GroupKind::TimeSeries).contains(group) {
            return Err(TabulaError::not_found(format!(
                "collection '{}' has no time series group '{group}'",
                source.name
            )));
        }
        let id = self.resolve_element(source, &element.into())?;
        let delete = Query::delete()
            .from_table(alias(&source.group_table(GroupKind::TimeSeries, group)))
            .and_where(Expr::col(alias(ID_COLUMN)).eq(id))
            .to_owned();
        let removed = exec(self.connection(), &delete)?;
        debug!(
            "tabula delete: {removed} time series rows of '{}.{group}' for element {id}",
            source.name
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "
        CREATE TABLE Configuration (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT UNIQUE NOT NULL);
        CREATE TABLE Plant (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT UNIQUE NOT NULL);
        CREATE TABLE Plant_time_series_inflow (
            id INTEGER,
            date_time TEXT NOT NULL,
            inflow REAL,
            FOREIGN KEY(id) REFERENCES Plant(id) ON UPDATE CASCADE ON DELETE CASCADE,
            PRIMARY KEY (id, date_time)
        );
        INSERT INTO Plant (label) VALUES ('p1');
        INSERT INTO Plant_time_series_inflow VALUES (1, '2001-01-01T00:00:00', 1.0);
    ";

    #[test]
    fn deleting_an_element_cascades() -> TabulaResult<()> {
        let db = Database::open_in_memory(SCHEMA)?;
        db.delete_element("Plant", "p1")?;
        assert_eq!(db.count_rows("Plant")?, 0);
        assert_eq!(db.count_rows("Plant_time_series_inflow")?, 0);
        Ok(())
    }

    #[test]
    fn unknown_group_is_not_found() -> TabulaResult<()> {
        let db = Database::open_in_memory(SCHEMA)?;
        assert!(matches!(
            db.delete_time_series("Plant", "outflow", "p1"),
            Err(TabulaError::NotFound { .. })
        ));
        db.delete_time_series("Plant", "inflow", "p1")?;
        assert_eq!(db.count_rows("Plant_time_series_inflow")?, 0);
        assert_eq!(db.count_rows("Plant")?, 1);
        Ok(())
    }
}
