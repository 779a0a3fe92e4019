use std::collections::{BTreeMap, HashSet};

use log::debug;
use sea_query::{Query, SimpleExpr, Value as SeaValue};

use crate::db::*;
use crate::store::Database;
use tabula_core::{
    Attribute, AttributeKind, Collection, ElementInput, ElementRef, FieldValue, GroupKind,
    SemanticType, TabulaError, TabulaResult, TimeSeriesFrame, Value, CONFIGURATION_COLLECTION,
    DATE_TIME_DIMENSION, ID_COLUMN, VECTOR_INDEX_COLUMN,
};

type GroupColumns<'a> = Vec<(&'a Attribute, Vec<Value>)>;

/// Validated, relation-resolved values for one new element.
#[derive(Default)]
struct CreatePlan<'a> {
    scalars: Vec<(&'a Attribute, Value)>,
    groups: BTreeMap<(GroupKind, &'a str), GroupColumns<'a>>,
    time_series: Vec<(&'a str, TimeSeriesFrame, usize)>,
}

impl Database {
    /// Creates one element with every supplied attribute and returns its id.
    ///
    /// All input is checked before anything is written. The writes themselves
    /// are separate statements; wrap the call in [`Database::in_transaction`]
    /// when a storage failure must not leave a partial element behind.
    pub fn create_element(&self, collection: &str, input: ElementInput) -> TabulaResult<i64> {
        let collection = self.collection(collection)?;
        if collection.name == CONFIGURATION_COLLECTION && self.count_rows(&collection.name)? > 0 {
            return Err(TabulaError::integrity(format!(
                "'{CONFIGURATION_COLLECTION}' already holds its single element"
            )));
        }
        let plan = self.plan_create(collection, input)?;
        let id = self.insert_primary_row(collection, &plan.scalars)?;
        for ((kind, group), members) in &plan.groups {
            let table = collection.group_table(*kind, group);
            let key_column = (*kind == GroupKind::Vector).then_some(VECTOR_INDEX_COLUMN);
            self.insert_group_rows(&table, id, key_column, members)?;
        }
        for (group, frame, rows) in &plan.time_series {
            let table = collection.group_table(GroupKind::TimeSeries, group);
            self.insert_frame(&table, id, frame, *rows)?;
        }
        debug!(
            "tabula create: '{}' element {id} ({} scalars, {} groups, {} time series)",
            collection.name,
            plan.scalars.len(),
            plan.groups.len(),
            plan.time_series.len()
        );
        Ok(id)
    }

    fn plan_create<'a>(
        &self,
        collection: &'a Collection,
        input: ElementInput,
    ) -> TabulaResult<CreatePlan<'a>> {
        let mut plan = CreatePlan::default();
        let mut seen = HashSet::new();
        for (name, field) in input.fields {
            if !seen.insert(name.clone()) {
                return Err(TabulaError::shape(format!(
                    "'{name}' is supplied more than once"
                )));
            }
            match field {
                FieldValue::TimeSeries(frame) => {
                    let (group, rows) = self.check_frame(collection, &name, &frame)?;
                    plan.time_series.push((group, frame, rows));
                }
                FieldValue::Scalar(value) => {
                    let attribute = collection.attribute(&name)?;
                    match &attribute.kind {
                        AttributeKind::ScalarParameter => {
                            check_type(attribute, &value)?;
                            plan.scalars.push((attribute, value));
                        }
                        AttributeKind::ScalarRelation { .. } => {
                            let resolved = self.resolve_relation_value(attribute, &value)?;
                            plan.scalars.push((attribute, resolved));
                        }
                        _ => {
                            return Err(TabulaError::type_mismatch(format!(
                                "attribute '{}.{name}' is a {} and cannot take a single value",
                                collection.name,
                                attribute.class()
                            )))
                        }
                    }
                }
                FieldValue::List(values) => {
                    let attribute = collection.attribute(&name)?;
                    let Some((kind, group)) = attribute
                        .group()
                        .filter(|(kind, _)| *kind != GroupKind::TimeSeries)
                    else {
                        return Err(TabulaError::type_mismatch(format!(
                            "attribute '{}.{name}' is a {} and cannot take a list",
                            collection.name,
                            attribute.class()
                        )));
                    };
                    if values.is_empty() {
                        return Err(TabulaError::shape(format!(
                            "attribute '{}.{name}' was given an empty list",
                            collection.name
                        )));
                    }
                    let resolved = if attribute.is_relation() {
                        values
                            .iter()
                            .map(|value| self.resolve_relation_value(attribute, value))
                            .collect::<TabulaResult<Vec<_>>>()?
                    } else {
                        for value in &values {
                            check_type(attribute, value)?;
                        }
                        values
                    };
                    plan.groups
                        .entry((kind, group))
                        .or_default()
                        .push((attribute, resolved));
                }
            }
        }
        for ((kind, group), members) in plan.groups.iter_mut() {
            let expected = members.first().map(|(_, values)| values.len()).unwrap_or(0);
            if let Some((attribute, values)) =
                members.iter().find(|(_, values)| values.len() != expected)
            {
                return Err(TabulaError::shape(format!(
                    "group '{group}' of '{}' mixes lengths: '{}' has {} values, expected {expected}",
                    collection.name,
                    attribute.name,
                    values.len()
                )));
            }
            // Members the caller left out are stored as NULL.
            for attribute in collection.group_members(*kind, group) {
                if !members.iter().any(|(member, _)| member.name == attribute.name) {
                    let nulls = vec![attribute.semantic_type.null_value(); expected];
                    members.push((attribute, nulls));
                }
            }
        }
        Ok(plan)
    }

    /// Checks a time-series frame against its group; returns the group and
    /// its row count.
    fn check_frame<'a>(
        &self,
        collection: &'a Collection,
        group: &str,
        frame: &TimeSeriesFrame,
    ) -> TabulaResult<(&'a str, usize)> {
        let members = collection.group_members(GroupKind::TimeSeries, group);
        let Some(first) = members.first().copied() else {
            return Err(TabulaError::not_found(format!(
                "collection '{}' has no time series group '{group}'",
                collection.name
            )));
        };
        let Some((_, group)) = first.group() else {
            return Err(TabulaError::not_found(format!(
                "collection '{}' has no time series group '{group}'",
                collection.name
            )));
        };
        let rows = frame.row_count()?;
        if rows == 0 {
            return Err(TabulaError::shape(format!(
                "time series group '{group}' of '{}' was given no rows",
                collection.name
            )));
        }
        let dimensions = first.dimensions();
        for dimension in dimensions {
            let Some(values) = frame.get(dimension) else {
                return Err(TabulaError::shape(format!(
                    "time series group '{group}' is missing dimension column '{dimension}'"
                )));
            };
            let expected = if dimension == DATE_TIME_DIMENSION {
                SemanticType::Timestamp
            } else {
                SemanticType::Integer
            };
            if let Some(bad) = values
                .iter()
                .find(|value| value.semantic_type() != expected || value.is_null())
            {
                return Err(TabulaError::type_mismatch(format!(
                    "dimension '{dimension}' of time series group '{group}' needs non-null \
                     {expected} values, found {bad:?}"
                )));
            }
        }
        for (name, values) in &frame.columns {
            if dimensions.contains(name) {
                continue;
            }
            let Some(attribute) = members.iter().find(|member| member.name == *name) else {
                return Err(TabulaError::not_found(format!(
                    "time series group '{group}' of '{}' has no attribute '{name}'",
                    collection.name
                )));
            };
            for value in values {
                check_type(attribute, value)?;
            }
        }
        Ok((group, rows))
    }

    /// Maps a relation value (target id or target label) to the target id.
    /// Null sentinels pass through as a null id.
    pub(crate) fn resolve_relation_value(
        &self,
        attribute: &Attribute,
        value: &Value,
    ) -> TabulaResult<Value> {
        let Some((target, _)) = attribute.relation() else {
            return Err(TabulaError::type_mismatch(format!(
                "attribute '{}.{}' is not a relation",
                attribute.collection, attribute.name
            )));
        };
        if value.is_null() && matches!(value, Value::Integer(_) | Value::String(_)) {
            return Ok(SemanticType::Integer.null_value());
        }
        let element = match value {
            Value::Integer(id) => ElementRef::Id(*id),
            Value::String(label) => ElementRef::Label(label.clone()),
            other => {
                return Err(TabulaError::type_mismatch(format!(
                    "relation '{}.{}' needs an id or a label, found {}",
                    attribute.collection,
                    attribute.name,
                    other.semantic_type()
                )))
            }
        };
        let target = self.collection(target)?;
        Ok(Value::Integer(self.resolve_element(target, &element)?))
    }

    pub(crate) fn insert_primary_row(
        &self,
        collection: &Collection,
        scalars: &[(&Attribute, Value)],
    ) -> TabulaResult<i64> {
        if scalars.is_empty() {
            self.connection().execute(
                &format!("INSERT INTO \"{}\" DEFAULT VALUES", collection.name),
                [],
            )?;
        } else {
            let values = scalars
                .iter()
                .map(|(_, value)| value_to_sea(value).map(SimpleExpr::Value))
                .collect::<TabulaResult<Vec<_>>>()?;
            let insert = Query::insert()
                .into_table(alias(&collection.name))
                .columns(scalars.iter().map(|(attribute, _)| alias(&attribute.name)))
                .values(values)
                .map_err(|err| storage_error("build insert", err))?
                .to_owned();
            exec(self.connection(), &insert)?;
        }
        Ok(self.connection().last_insert_rowid())
    }

    /// Inserts one row per position; `key_column` receives the 1-based index.
    pub(crate) fn insert_group_rows(
        &self,
        table: &str,
        id: i64,
        key_column: Option<&str>,
        members: &[(&Attribute, Vec<Value>)],
    ) -> TabulaResult<()> {
        let rows = members.first().map(|(_, values)| values.len()).unwrap_or(0);
        for row in 0..rows {
            let mut columns = vec![alias(ID_COLUMN)];
            let mut values = vec![SimpleExpr::Value(SeaValue::BigInt(Some(id)))];
            if let Some(key_column) = key_column {
                columns.push(alias(key_column));
                values.push(SimpleExpr::Value(SeaValue::BigInt(Some(row as i64 + 1))));
            }
            for (attribute, member_values) in members {
                columns.push(alias(&attribute.name));
                values.push(SimpleExpr::Value(value_to_sea(&member_values[row])?));
            }
            let insert = Query::insert()
                .into_table(alias(table))
                .columns(columns)
                .values(values)
                .map_err(|err| storage_error("build insert", err))?
                .to_owned();
            exec(self.connection(), &insert)?;
        }
        Ok(())
    }

    pub(crate) fn insert_frame(
        &self,
        table: &str,
        id: i64,
        frame: &TimeSeriesFrame,
        rows: usize,
    ) -> TabulaResult<()> {
        for row in 0..rows {
            let mut columns = vec![alias(ID_COLUMN)];
            let mut values = vec![SimpleExpr::Value(SeaValue::BigInt(Some(id)))];
            for (name, column) in &frame.columns {
                columns.push(alias(name));
                values.push(SimpleExpr::Value(value_to_sea(&column[row])?));
            }
            let insert = Query::insert()
                .into_table(alias(table))
                .columns(columns)
                .values(values)
                .map_err(|err| storage_error("build insert", err))?
                .to_owned();
            exec(self.connection(), &insert)?;
        }
        Ok(())
    }
}

pub(crate) fn check_type(attribute: &Attribute, value: &Value) -> TabulaResult<()> {
    if value.semantic_type() == attribute.semantic_type {
        return Ok(());
    }
    Err(TabulaError::type_mismatch(format!(
        "attribute '{}.{}' holds {} values, got {}",
        attribute.collection,
        attribute.name,
        attribute.semantic_type,
        value.semantic_type()
    )))
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
            capacity REAL
        );
        CREATE TABLE Plant_vector_costs (
            id INTEGER,
            vector_index INTEGER NOT NULL,
            cost REAL,
            fuel INTEGER,
            FOREIGN KEY(id) REFERENCES Plant(id) ON UPDATE CASCADE ON DELETE CASCADE,
            PRIMARY KEY (id, vector_index)
        );
        CREATE TABLE Plant_time_series_inflow (
            id INTEGER,
            date_time TEXT NOT NULL,
            inflow REAL,
            FOREIGN KEY(id) REFERENCES Plant(id) ON UPDATE CASCADE ON DELETE CASCADE,
            PRIMARY KEY (id, date_time)
        );
    ";

    #[test]
    fn fills_missing_group_members_with_null() -> TabulaResult<()> {
        let db = Database::open_in_memory(SCHEMA)?;
        let id = db.create_element(
            "Plant",
            ElementInput::new()
                .scalar("label", "p1")
                .list("cost", [1.0, 2.0]),
        )?;
        let fuel: Vec<Option<i64>> = db
            .connection()
            .prepare("SELECT fuel FROM Plant_vector_costs WHERE id = ?1 ORDER BY vector_index")?
            .query_map([id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        assert_eq!(fuel, vec![None, None]);
        Ok(())
    }

    #[test]
    fn rejects_before_writing() -> TabulaResult<()> {
        let db = Database::open_in_memory(SCHEMA)?;
        let ragged = ElementInput::new()
            .scalar("label", "p1")
            .list("cost", [1.0, 2.0])
            .list("fuel", [1i64]);
        assert!(matches!(
            db.create_element("Plant", ragged),
            Err(TabulaError::Shape { .. })
        ));
        let frame = TimeSeriesFrame::new().column("inflow", [1.0]);
        let missing_date = ElementInput::new()
            .scalar("label", "p1")
            .time_series("inflow", frame);
        assert!(matches!(
            db.create_element("Plant", missing_date),
            Err(TabulaError::Shape { .. })
        ));
        assert_eq!(db.count_rows("Plant")?, 0);
        Ok(())
    }

    #[test]
    fn writes_time_series_frames() -> TabulaResult<()> {
        let db = Database::open_in_memory(SCHEMA)?;
        let frame = TimeSeriesFrame::new()
            .column(
                DATE_TIME_DIMENSION,
                [datetime!(2001-01-01 0:00), datetime!(2002-01-01 0:00)],
            )
            .column("inflow", [1.0, f64::NAN]);
        db.create_element(
            "Plant",
            ElementInput::new()
                .scalar("label", "p1")
                .time_series("inflow", frame),
        )?;
        assert_eq!(db.count_rows("Plant_time_series_inflow")?, 2);
        Ok(())
    }
}
