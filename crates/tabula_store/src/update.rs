use std::path::Path;

use log::debug;
use sea_query::{Expr, OnConflict, Order, Query, SimpleExpr, Value as SeaValue};

use crate::create::check_type;
use crate::db::*;
use crate::store::Database;
use tabula_core::{
    Attribute, AttributeClass, Collection, DimensionKey, ElementRef, GroupKind, TabulaError,
    TabulaResult, Value, DATE_TIME_DIMENSION, ID_COLUMN, VECTOR_INDEX_COLUMN,
};

impl Database {
    pub fn update_scalar_parameter(
        &self,
        collection: &str,
        attribute: &str,
        element: impl Into<ElementRef>,
        value: impl Into<Value>,
    ) -> TabulaResult<()> {
        let attribute = self.expect_class(collection, attribute, AttributeClass::ScalarParameter)?;
        let value = value.into();
        check_type(attribute, &value)?;
        let id = self.resolve_element(self.collection(collection)?, &element.into())?;
        self.write_cell(attribute, id, &value)
    }

    /// Replaces a whole vector. The length must match what is stored, unless
    /// the element has no rows in the group yet.
    pub fn update_vector_parameters<I, V>(
        &self,
        collection: &str,
        attribute: &str,
        element: impl Into<ElementRef>,
        values: I,
    ) -> TabulaResult<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let attribute = self.expect_class(collection, attribute, AttributeClass::VectorParameter)?;
        self.update_group_parameter(collection, attribute, element.into(), values)
    }

    /// Replaces a whole set under the same length rule as vectors.
    pub fn update_set_parameters<I, V>(
        &self,
        collection: &str,
        attribute: &str,
        element: impl Into<ElementRef>,
        values: I,
    ) -> TabulaResult<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let attribute = self.expect_class(collection, attribute, AttributeClass::SetParameter)?;
        self.update_group_parameter(collection, attribute, element.into(), values)
    }

    /// Points `element` at `related` through the scalar relation of
    /// `relation_type` towards `target`.
    pub fn set_scalar_relation(
        &self,
        collection: &str,
        target: &str,
        element: impl Into<ElementRef>,
        related: impl Into<ElementRef>,
        relation_type: &str,
    ) -> TabulaResult<()> {
        let source = self.collection(collection)?;
        let attribute = source.relation(target, relation_type, AttributeClass::ScalarRelation)?;
        let id = self.resolve_element(source, &element.into())?;
        let related = self.resolve_related(source, attribute, id, &related.into())?;
        self.write_cell(attribute, id, &Value::Integer(related))
    }

    pub fn set_vector_relation<I, R>(
        &self,
        collection: &str,
        target: &str,
        element: impl Into<ElementRef>,
        related: I,
        relation_type: &str,
    ) -> TabulaResult<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<ElementRef>,
    {
        self.set_grouped_relation(
            collection,
            target,
            element.into(),
            related,
            relation_type,
            AttributeClass::VectorRelation,
        )
    }

    pub fn set_set_relation<I, R>(
        &self,
        collection: &str,
        target: &str,
        element: impl Into<ElementRef>,
        related: I,
        relation_type: &str,
    ) -> TabulaResult<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<ElementRef>,
    {
        self.set_grouped_relation(
            collection,
            target,
            element.into(),
            related,
            relation_type,
            AttributeClass::SetRelation,
        )
    }

    /// Stores file paths for the collection's time-series file attributes.
    /// Paths must be relative.
    pub fn set_time_series_file(
        &self,
        collection: &str,
        files: &[(&str, &str)],
    ) -> TabulaResult<()> {
        let source = self.collection(collection)?;
        let mut attributes = Vec::with_capacity(files.len());
        for (name, path) in files {
            let attribute = self.expect_class(collection, name, AttributeClass::TimeSeriesFile)?;
            if !is_relative_path(path) {
                return Err(TabulaError::type_mismatch(format!(
                    "time series file '{collection}.{name}' must be a relative path, got '{path}'"
                )));
            }
            attributes.push((attribute, Value::from(*path)));
        }
        let Some((first, _)) = attributes.first() else {
            return Ok(());
        };
        let table = first.table.clone();
        self.in_transaction(|db| {
            if db.count_rows(&table)? == 0 {
                let values = attributes
                    .iter()
                    .map(|(_, value)| value_to_sea(value).map(SimpleExpr::Value))
                    .collect::<TabulaResult<Vec<_>>>()?;
                let insert = Query::insert()
                    .into_table(alias(&table))
                    .columns(attributes.iter().map(|(attribute, _)| alias(&attribute.name)))
                    .values(values)
                    .map_err(|err| storage_error("build insert", err))?
                    .to_owned();
                exec(db.connection(), &insert)?;
            } else {
                let mut update = Query::update();
                update.table(alias(&table));
                for (attribute, value) in &attributes {
                    update.value(alias(&attribute.name), value_to_sea(value)?);
                }
                exec(db.connection(), &update)?;
            }
            Ok(())
        })?;
        debug!(
            "tabula update: stored {} time series files for '{}'",
            files.len(),
            source.name
        );
        Ok(())
    }

    /// Inserts or replaces the value at `key`.
    pub fn add_time_series_row(
        &self,
        collection: &str,
        attribute: &str,
        element: impl Into<ElementRef>,
        value: impl Into<Value>,
        key: &DimensionKey,
    ) -> TabulaResult<()> {
        let attribute = self.expect_class(collection, attribute, AttributeClass::TimeSeries)?;
        let value = value.into();
        check_type(attribute, &value)?;
        key.ensure_matches(attribute.dimensions())?;
        let id = self.resolve_element(self.collection(collection)?, &element.into())?;

        let mut columns = vec![alias(ID_COLUMN)];
        let mut values = vec![SimpleExpr::Value(SeaValue::BigInt(Some(id)))];
        for (name, bound) in key_values(attribute, key)? {
            columns.push(alias(&name));
            values.push(SimpleExpr::Value(bound));
        }
        columns.push(alias(&attribute.name));
        values.push(SimpleExpr::Value(value_to_sea(&value)?));
        let conflict_columns = std::iter::once(alias(ID_COLUMN))
            .chain(attribute.dimensions().iter().map(|name| alias(name)))
            .collect::<Vec<_>>();
        let insert = Query::insert()
            .into_table(alias(&attribute.table))
            .columns(columns)
            .values(values)
            .map_err(|err| storage_error("build insert", err))?
            .on_conflict(
                OnConflict::columns(conflict_columns)
                    .update_column(alias(&attribute.name))
                    .to_owned(),
            )
            .to_owned();
        exec(self.connection(), &insert)?;
        Ok(())
    }

    /// Overwrites the value at `key`; the row must already exist.
    pub fn update_time_series_row(
        &self,
        collection: &str,
        attribute: &str,
        element: impl Into<ElementRef>,
        value: impl Into<Value>,
        key: &DimensionKey,
    ) -> TabulaResult<()> {
        let attribute = self.expect_class(collection, attribute, AttributeClass::TimeSeries)?;
        let value = value.into();
        check_type(attribute, &value)?;
        key.ensure_matches(attribute.dimensions())?;
        let id = self.resolve_element(self.collection(collection)?, &element.into())?;

        let mut update = Query::update();
        update
            .table(alias(&attribute.table))
            .value(alias(&attribute.name), value_to_sea(&value)?)
            .and_where(Expr::col(alias(ID_COLUMN)).eq(id));
        for (name, bound) in key_values(attribute, key)? {
            update.and_where(Expr::col(alias(&name)).eq(bound));
        }
        if exec(self.connection(), &update)? == 0 {
            return Err(TabulaError::not_found(format!(
                "no time series row of '{collection}.{}' for element {id} at {:?}",
                attribute.name, key.date_time
            )));
        }
        Ok(())
    }

    fn update_group_parameter<I, V>(
        &self,
        collection: &str,
        attribute: &Attribute,
        element: ElementRef,
        values: I,
    ) -> TabulaResult<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        for value in &values {
            check_type(attribute, value)?;
        }
        let id = self.resolve_element(self.collection(collection)?, &element)?;
        self.write_group_values(attribute, id, values)
    }

    fn set_grouped_relation<I, R>(
        &self,
        collection: &str,
        target: &str,
        element: ElementRef,
        related: I,
        relation_type: &str,
        class: AttributeClass,
    ) -> TabulaResult<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<ElementRef>,
    {
        let source = self.collection(collection)?;
        let attribute = source.relation(target, relation_type, class)?;
        let id = self.resolve_element(source, &element)?;
        let values = related
            .into_iter()
            .map(|related| {
                self.resolve_related(source, attribute, id, &related.into())
                    .map(Value::Integer)
            })
            .collect::<TabulaResult<Vec<_>>>()?;
        self.write_group_values(attribute, id, values)
    }

    /// Resolves the other end of a relation, refusing self-references.
    /// An empty label or `i64::MIN` clears the link.
    fn resolve_related(
        &self,
        source: &Collection,
        attribute: &Attribute,
        id: i64,
        related: &ElementRef,
    ) -> TabulaResult<i64> {
        let Some((target, _)) = attribute.relation() else {
            return Err(TabulaError::type_mismatch(format!(
                "attribute '{}.{}' is not a relation",
                source.name, attribute.name
            )));
        };
        let cleared = match related {
            ElementRef::Id(id) => *id == i64::MIN,
            ElementRef::Label(label) => label.is_empty(),
        };
        if cleared {
            return Ok(i64::MIN);
        }
        let related_id = self.resolve_element(self.collection(target)?, related)?;
        if target == source.name && related_id == id {
            return Err(TabulaError::integrity(format!(
                "element {id} of '{}' cannot relate to itself through '{}'",
                source.name, attribute.name
            )));
        }
        Ok(related_id)
    }

    pub(crate) fn write_cell(&self, attribute: &Attribute, id: i64, value: &Value) -> TabulaResult<()> {
        let update = Query::update()
            .table(alias(&attribute.table))
            .value(alias(&attribute.name), value_to_sea(value)?)
            .and_where(Expr::col(alias(ID_COLUMN)).eq(id))
            .to_owned();
        exec(self.connection(), &update)?;
        Ok(())
    }

    /// Writes one vector or set column for an element.
    ///
    /// With no stored rows the values become new rows (other members NULL);
    /// otherwise the count must match and rows are updated in place.
    pub(crate) fn write_group_values(
        &self,
        attribute: &Attribute,
        id: i64,
        values: Vec<Value>,
    ) -> TabulaResult<()> {
        let Some((kind, _)) = attribute.group() else {
            return Err(TabulaError::type_mismatch(format!(
                "attribute '{}.{}' is not grouped",
                attribute.collection, attribute.name
            )));
        };
        let row_key = if kind == GroupKind::Vector {
            VECTOR_INDEX_COLUMN
        } else {
            "rowid"
        };
        let select = Query::select()
            .column(alias(row_key))
            .from(alias(&attribute.table))
            .and_where(Expr::col(alias(ID_COLUMN)).eq(id))
            .order_by(alias(row_key), Order::Asc)
            .to_owned();
        let keys = query_all(self.connection(), &select, |row| row.get::<_, i64>(0))?;
        if keys.is_empty() {
            if values.is_empty() {
                return Ok(());
            }
            let key_column = (kind == GroupKind::Vector).then_some(VECTOR_INDEX_COLUMN);
            return self.in_transaction(|db| {
                db.insert_group_rows(&attribute.table, id, key_column, &[(attribute, values)])
            });
        }
        if keys.len() != values.len() {
            return Err(TabulaError::shape(format!(
                "'{}.{}' of element {id} holds {} values, got {}",
                attribute.collection,
                attribute.name,
                keys.len(),
                values.len()
            )));
        }
        self.in_transaction(|db| {
            for (key, value) in keys.iter().zip(&values) {
                let update = Query::update()
                    .table(alias(&attribute.table))
                    .value(alias(&attribute.name), value_to_sea(value)?)
                    .and_where(Expr::col(alias(ID_COLUMN)).eq(id))
                    .and_where(Expr::col(alias(row_key)).eq(*key))
                    .to_owned();
                exec(db.connection(), &update)?;
            }
            Ok(())
        })
    }
}

/// Bound values for every dimension of `attribute`, in key order.
fn key_values(
    attribute: &Attribute,
    key: &DimensionKey,
) -> TabulaResult<Vec<(String, SeaValue)>> {
    attribute
        .dimensions()
        .iter()
        .map(|name| {
            let bound = if name == DATE_TIME_DIMENSION {
                value_to_sea(&Value::Timestamp(key.date_time))?
            } else {
                let value = key.others.get(name).copied().ok_or_else(|| {
                    TabulaError::shape(format!("dimension '{name}' has no key value"))
                })?;
                SeaValue::BigInt(Some(value))
            };
            Ok((name.clone(), bound))
        })
        .collect()
}

fn is_relative_path(path: &str) -> bool {
    let has_drive = path.len() >= 2
        && path.as_bytes()[0].is_ascii_alphabetic()
        && path.as_bytes()[1] == b':';
    !path.is_empty()
        && !Path::new(path).is_absolute()
        && !path.starts_with('/')
        && !path.starts_with('\\')
        && !path.starts_with('~')
        && !has_drive
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const SCHEMA: &str = "
        CREATE TABLE Configuration (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT UNIQUE NOT NULL);
        CREATE TABLE Plant (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT UNIQUE NOT NULL,
            plant_spill_to INTEGER,
            FOREIGN KEY(plant_spill_to) REFERENCES Plant(id) ON UPDATE CASCADE ON DELETE SET NULL
        );
        CREATE TABLE Plant_time_series_files (inflow_file TEXT);
        CREATE TABLE Plant_time_series_inflow (
            id INTEGER,
            date_time TEXT NOT NULL,
            block INTEGER NOT NULL,
            inflow REAL,
            FOREIGN KEY(id) REFERENCES Plant(id) ON UPDATE CASCADE ON DELETE CASCADE,
            PRIMARY KEY (id, date_time, block)
        );
        INSERT INTO Plant (label) VALUES ('p1'), ('p2');
    ";

    #[test]
    fn relative_paths_only() {
        assert!(is_relative_path("data/inflow.csv"));
        assert!(!is_relative_path("/data/inflow.csv"));
        assert!(!is_relative_path("~/inflow.csv"));
        assert!(!is_relative_path("C:\\inflow.csv"));
        assert!(!is_relative_path(""));
    }

    #[test]
    fn self_relation_is_rejected() -> TabulaResult<()> {
        let db = Database::open_in_memory(SCHEMA)?;
        assert!(matches!(
            db.set_scalar_relation("Plant", "Plant", "p1", "p1", "spill_to"),
            Err(TabulaError::Integrity { .. })
        ));
        db.set_scalar_relation("Plant", "Plant", "p1", "p2", "spill_to")?;
        assert!(matches!(
            db.set_scalar_relation("Plant", "Plant", "p1", "p2", "turbine_to"),
            Err(TabulaError::NotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn time_series_rows_upsert() -> TabulaResult<()> {
        let db = Database::open_in_memory(SCHEMA)?;
        let key = DimensionKey::at(datetime!(2001-01-01 0:00)).with("block", 1);
        db.add_time_series_row("Plant", "inflow", "p1", 1.0, &key)?;
        db.add_time_series_row("Plant", "inflow", "p1", 2.0, &key)?;
        assert_eq!(db.count_rows("Plant_time_series_inflow")?, 1);
        let other = DimensionKey::at(datetime!(2001-01-01 0:00)).with("block", 2);
        assert!(matches!(
            db.update_time_series_row("Plant", "inflow", "p1", 3.0, &other),
            Err(TabulaError::NotFound { .. })
        ));
        let missing_block = DimensionKey::at(datetime!(2001-01-01 0:00));
        assert!(matches!(
            db.add_time_series_row("Plant", "inflow", "p1", 3.0, &missing_block),
            Err(TabulaError::Shape { .. })
        ));
        Ok(())
    }

    #[test]
    fn time_series_files_keep_one_row() -> TabulaResult<()> {
        let db = Database::open_in_memory(SCHEMA)?;
        db.set_time_series_file("Plant", &[("inflow_file", "inflow_a.csv")])?;
        db.set_time_series_file("Plant", &[("inflow_file", "inflow_b.csv")])?;
        assert_eq!(db.count_rows("Plant_time_series_files")?, 1);
        assert_eq!(db.read_time_series_file("Plant", "inflow_file")?, "inflow_b.csv");
        Ok(())
    }
}
