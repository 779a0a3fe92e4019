//! Forward-fill lookups over time-series tables.
//!
//! The first query against an attribute scans its table once and keeps, per
//! element and per combination of extra dimensions, the non-null values
//! sorted by `date_time`. Later queries binary-search that index. Extra
//! dimensions are exact-match partitions; only `date_time` is filled forward.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::debug;
use sea_query::{Expr, Query};
use time::PrimitiveDateTime;

use crate::db::*;
use crate::store::Database;
use tabula_core::{
    Attribute, AttributeClass, DimensionKey, ElementRef, SemanticType, TabulaError, TabulaResult,
    Value, DATE_TIME_DIMENSION, ID_COLUMN,
};

#[derive(Clone, Debug)]
struct Breakpoint {
    at: PrimitiveDateTime,
    value: Value,
}

/// Sorted breakpoints of one time-series attribute for every element.
#[derive(Debug)]
pub(crate) struct SeriesIndex {
    semantic_type: SemanticType,
    /// Non-date dimensions in key order.
    partitions: Vec<String>,
    elements: HashMap<i64, HashMap<Vec<i64>, Vec<Breakpoint>>>,
}

impl SeriesIndex {
    pub(crate) fn build(db: &Database, attribute: &Attribute) -> TabulaResult<Self> {
        let partitions: Vec<String> = attribute
            .dimensions()
            .iter()
            .filter(|name| *name != DATE_TIME_DIMENSION)
            .cloned()
            .collect();
        let mut select = Query::select();
        select
            .column(alias(ID_COLUMN))
            .column(alias(DATE_TIME_DIMENSION));
        for name in &partitions {
            select.column(alias(name));
        }
        select
            .column(alias(&attribute.name))
            .from(alias(&attribute.table))
            .and_where(Expr::col(alias(&attribute.name)).is_not_null());

        let value_idx = partitions.len() + 2;
        let semantic_type = attribute.semantic_type;
        let rows = query_all(db.connection(), &select, |row| {
            let id: i64 = row.get(0)?;
            let at = read_value(row, 1, SemanticType::Timestamp)?;
            let mut partition = Vec::with_capacity(value_idx - 2);
            for idx in 2..value_idx {
                partition.push(row.get::<_, i64>(idx)?);
            }
            let value = read_value(row, value_idx, semantic_type)?;
            Ok((id, at, partition, value))
        })?;

        let mut elements: HashMap<i64, HashMap<Vec<i64>, Vec<Breakpoint>>> = HashMap::new();
        for (id, at, partition, value) in rows {
            let Some(at) = at.as_timestamp().filter(|_| !at.is_null()) else {
                continue;
            };
            elements
                .entry(id)
                .or_default()
                .entry(partition)
                .or_default()
                .push(Breakpoint { at, value });
        }
        for partitions in elements.values_mut() {
            for breakpoints in partitions.values_mut() {
                breakpoints.sort_by_key(|breakpoint| breakpoint.at);
            }
        }
        debug!(
            "tabula time series: indexed '{}.{}' for {} elements",
            attribute.collection,
            attribute.name,
            elements.len()
        );
        Ok(Self {
            semantic_type,
            partitions,
            elements,
        })
    }

    /// Latest value at or before `key.date_time`, or the null sentinel.
    pub(crate) fn lookup(&self, element_id: i64, key: &DimensionKey) -> Value {
        let partition: Option<Vec<i64>> = self
            .partitions
            .iter()
            .map(|name| key.others.get(name).copied())
            .collect();
        let breakpoints = partition.and_then(|partition| {
            self.elements
                .get(&element_id)
                .and_then(|partitions| partitions.get(&partition))
        });
        let Some(breakpoints) = breakpoints else {
            return self.semantic_type.null_value();
        };
        let idx = breakpoints.partition_point(|breakpoint| breakpoint.at <= key.date_time);
        match idx {
            0 => self.semantic_type.null_value(),
            _ => breakpoints[idx - 1].value.clone(),
        }
    }
}

/// Indexes keyed by `(collection, attribute)`, built on first use.
#[derive(Debug, Default)]
pub(crate) struct TimeSeriesCache {
    entries: Mutex<HashMap<(String, String), Arc<SeriesIndex>>>,
}

impl TimeSeriesCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, attribute: &Attribute) -> TabulaResult<Option<Arc<SeriesIndex>>> {
        let entries = self.lock()?;
        Ok(entries
            .get(&(attribute.collection.clone(), attribute.name.clone()))
            .cloned())
    }

    pub(crate) fn insert(
        &self,
        attribute: &Attribute,
        index: SeriesIndex,
    ) -> TabulaResult<Arc<SeriesIndex>> {
        let index = Arc::new(index);
        let mut entries = self.lock()?;
        entries.insert(
            (attribute.collection.clone(), attribute.name.clone()),
            Arc::clone(&index),
        );
        Ok(index)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> TabulaResult<usize> {
        Ok(self.lock()?.len())
    }

    pub(crate) fn clear(&self) -> TabulaResult<()> {
        self.lock()?.clear();
        Ok(())
    }

    fn lock(
        &self,
    ) -> TabulaResult<std::sync::MutexGuard<'_, HashMap<(String, String), Arc<SeriesIndex>>>> {
        self.entries
            .lock()
            .map_err(|_| TabulaError::storage("time series cache lock poisoned"))
    }
}

impl Database {
    /// Forward-filled value of a time-series attribute for one element.
    ///
    /// Only read-only stores may be queried this way; the index would
    /// otherwise go stale under concurrent writes.
    pub fn query_time_series(
        &self,
        collection: &str,
        attribute: &str,
        element: impl Into<ElementRef>,
        key: &DimensionKey,
    ) -> TabulaResult<Value> {
        let attribute = self.time_series_attribute(collection, attribute, key)?;
        let element_id = self.resolve_element(self.collection(collection)?, &element.into())?;
        Ok(match self.series_index(attribute)? {
            Some(index) => index.lookup(element_id, key),
            None => attribute.semantic_type.null_value(),
        })
    }

    /// Forward-filled values of one attribute for every element, in id order.
    pub fn read_time_series_row(
        &self,
        collection: &str,
        attribute: &str,
        key: &DimensionKey,
    ) -> TabulaResult<Vec<Value>> {
        let attribute = self.time_series_attribute(collection, attribute, key)?;
        let ids = self.element_ids(self.collection(collection)?)?;
        Ok(match self.series_index(attribute)? {
            Some(index) => ids.iter().map(|id| index.lookup(*id, key)).collect(),
            None => vec![attribute.semantic_type.null_value(); ids.len()],
        })
    }

    fn time_series_attribute(
        &self,
        collection: &str,
        attribute: &str,
        key: &DimensionKey,
    ) -> TabulaResult<&Attribute> {
        let attribute = self.collection(collection)?.attribute(attribute)?;
        if attribute.class() != AttributeClass::TimeSeries {
            return Err(TabulaError::type_mismatch(format!(
                "attribute '{}.{}' is a {}, not a time series",
                attribute.collection,
                attribute.name,
                attribute.class()
            )));
        }
        if !self.is_read_only() {
            return Err(TabulaError::read_only(format!(
                "time series cache for '{collection}.{}' requires a read-only connection",
                attribute.name
            )));
        }
        key.ensure_matches(attribute.dimensions())?;
        Ok(attribute)
    }

    /// Cached index, built on first use; `None` when the table has no rows.
    fn series_index(&self, attribute: &Attribute) -> TabulaResult<Option<Arc<SeriesIndex>>> {
        if let Some(index) = self.time_series.get(attribute)? {
            return Ok(Some(index));
        }
        if self.count_rows(&attribute.table)? == 0 {
            return Ok(None);
        }
        let index = SeriesIndex::build(self, attribute)?;
        Ok(Some(self.time_series.insert(attribute, index)?))
    }
}
