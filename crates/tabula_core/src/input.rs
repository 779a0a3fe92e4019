use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use crate::{TabulaError, TabulaResult, Value, DATE_TIME_DIMENSION};

/// Addresses one element either by identity or by its `label`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ElementRef {
    Id(i64),
    Label(String),
}

impl From<i64> for ElementRef {
    fn from(value: i64) -> Self {
        ElementRef::Id(value)
    }
}

impl From<&str> for ElementRef {
    fn from(value: &str) -> Self {
        ElementRef::Label(value.to_string())
    }
}

impl From<String> for ElementRef {
    fn from(value: String) -> Self {
        ElementRef::Label(value)
    }
}

impl From<&String> for ElementRef {
    fn from(value: &String) -> Self {
        ElementRef::Label(value.clone())
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementRef::Id(id) => write!(f, "id {id}"),
            ElementRef::Label(label) => write!(f, "label '{label}'"),
        }
    }
}

/// Value supplied for one attribute (or one time-series group) on create.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum FieldValue {
    Scalar(Value),
    List(Vec<Value>),
    TimeSeries(TimeSeriesFrame),
}

/// Attribute values for a new element.
///
/// Scalars and relations use [`FieldValue::Scalar`]; vector and set members
/// use [`FieldValue::List`]; time series are supplied per group as a
/// [`TimeSeriesFrame`] keyed by the group name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementInput {
    pub fields: Vec<(String, FieldValue)>,
}

impl ElementInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scalar(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields
            .push((name.into(), FieldValue::Scalar(value.into())));
        self
    }

    pub fn list<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.fields.push((name.into(), FieldValue::List(values)));
        self
    }

    pub fn time_series(mut self, group: impl Into<String>, frame: TimeSeriesFrame) -> Self {
        self.fields
            .push((group.into(), FieldValue::TimeSeries(frame)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Column-oriented block of time-series rows.
///
/// Holds the dimension columns (`date_time` plus any extra keys) and one
/// column per attribute; every column has the same length.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesFrame {
    pub columns: BTreeMap<String, Vec<Value>>,
}

impl TimeSeriesFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.columns
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Number of rows; fails when columns disagree on length.
    pub fn row_count(&self) -> TabulaResult<usize> {
        let mut lengths = self.columns.iter().map(|(name, values)| (name, values.len()));
        let Some((_, expected)) = lengths.next() else {
            return Ok(0);
        };
        for (name, len) in lengths {
            if len != expected {
                return Err(TabulaError::shape(format!(
                    "time series column '{name}' has {len} rows, expected {expected}"
                )));
            }
        }
        Ok(expected)
    }
}

/// Position along a time series: the `date_time` plus exact-match keys.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct DimensionKey {
    pub date_time: PrimitiveDateTime,
    pub others: BTreeMap<String, i64>,
}

impl DimensionKey {
    pub fn at(date_time: PrimitiveDateTime) -> Self {
        Self {
            date_time,
            others: BTreeMap::new(),
        }
    }

    pub fn with(mut self, dimension: impl Into<String>, value: i64) -> Self {
        self.others.insert(dimension.into(), value);
        self
    }

    /// Checks the key names exactly the declared dimensions.
    pub fn ensure_matches(&self, dimensions: &[String]) -> TabulaResult<()> {
        let declared: Vec<&str> = dimensions
            .iter()
            .map(String::as_str)
            .filter(|name| *name != DATE_TIME_DIMENSION)
            .collect();
        let supplied: Vec<&str> = self.others.keys().map(String::as_str).collect();
        let same = declared.len() == supplied.len()
            && declared.iter().all(|name| self.others.contains_key(*name));
        if same {
            Ok(())
        } else {
            Err(TabulaError::shape(format!(
                "dimension keys [{}] do not match declared dimensions [{}]",
                supplied.join(", "),
                dimensions.join(", ")
            )))
        }
    }
}
