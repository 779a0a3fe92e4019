use std::collections::{BTreeMap, HashMap};

use sea_query::{Expr, Order, Query};

use crate::create::check_type;
use crate::db::*;
use crate::store::Database;
use tabula_core::{
    Attribute, AttributeClass, Collection, ElementRef, GroupKind, SemanticType, TabulaError,
    TabulaResult, TimeSeriesFrame, Value, DATE_TIME_DIMENSION, ID_COLUMN, LABEL_ATTRIBUTE,
    VECTOR_INDEX_COLUMN,
};

const ROWID: &str = "rowid";

impl Database {
    pub fn number_of_elements(&self, collection: &str) -> TabulaResult<usize> {
        let collection = self.collection(collection)?;
        self.count_rows(&collection.name)
    }

    /// Ids of every element, ascending.
    pub fn read_element_ids(&self, collection: &str) -> TabulaResult<Vec<i64>> {
        self.element_ids(self.collection(collection)?)
    }

    /// Labels of every element, in id order.
    pub fn read_element_labels(&self, collection: &str) -> TabulaResult<Vec<String>> {
        let collection = self.collection(collection)?;
        let labels = self.id_to_label(collection)?;
        Ok(labels.into_values().collect())
    }

    /// One value per element in id order. NULL cells read as `default` when
    /// given, otherwise as the schema default or the null sentinel.
    pub fn read_scalar_parameters(
        &self,
        collection: &str,
        attribute: &str,
        default: Option<Value>,
    ) -> TabulaResult<Vec<Value>> {
        let attribute = self.expect_class(collection, attribute, AttributeClass::ScalarParameter)?;
        let fallback = fallback(attribute, default)?;
        Ok(self
            .read_scalar_column(attribute)?
            .into_iter()
            .map(|value| or_fallback(value, &fallback))
            .collect())
    }

    pub fn read_scalar_parameter(
        &self,
        collection: &str,
        attribute: &str,
        element: impl Into<ElementRef>,
        default: Option<Value>,
    ) -> TabulaResult<Value> {
        let attribute = self.expect_class(collection, attribute, AttributeClass::ScalarParameter)?;
        let fallback = fallback(attribute, default)?;
        let id = self.resolve_element(self.collection(collection)?, &element.into())?;
        let value = self.read_cell(attribute, id)?;
        Ok(or_fallback(value, &fallback))
    }

    /// Vectors of every element in id order; each is ordered by `vector_index`.
    pub fn read_vector_parameters(
        &self,
        collection: &str,
        attribute: &str,
    ) -> TabulaResult<Vec<Vec<Value>>> {
        let attribute = self.expect_class(collection, attribute, AttributeClass::VectorParameter)?;
        self.read_group_column(self.collection(collection)?, attribute)
    }

    pub fn read_vector_parameter(
        &self,
        collection: &str,
        attribute: &str,
        element: impl Into<ElementRef>,
    ) -> TabulaResult<Vec<Value>> {
        let attribute = self.expect_class(collection, attribute, AttributeClass::VectorParameter)?;
        let id = self.resolve_element(self.collection(collection)?, &element.into())?;
        self.read_group_values(attribute, id)
    }

    /// Sets of every element in id order; members come back in insertion order.
    pub fn read_set_parameters(
        &self,
        collection: &str,
        attribute: &str,
    ) -> TabulaResult<Vec<Vec<Value>>> {
        let attribute = self.expect_class(collection, attribute, AttributeClass::SetParameter)?;
        self.read_group_column(self.collection(collection)?, attribute)
    }

    pub fn read_set_parameter(
        &self,
        collection: &str,
        attribute: &str,
        element: impl Into<ElementRef>,
    ) -> TabulaResult<Vec<Value>> {
        let attribute = self.expect_class(collection, attribute, AttributeClass::SetParameter)?;
        let id = self.resolve_element(self.collection(collection)?, &element.into())?;
        self.read_group_values(attribute, id)
    }

    /// Target ids of a scalar relation for every element; unset is `i64::MIN`.
    pub fn read_scalar_relation_ids(
        &self,
        collection: &str,
        target: &str,
        relation_type: &str,
    ) -> TabulaResult<Vec<i64>> {
        let attribute = self.collection(collection)?.relation(
            target,
            relation_type,
            AttributeClass::ScalarRelation,
        )?;
        Ok(self
            .read_scalar_column(attribute)?
            .into_iter()
            .map(|value| value.as_i64().unwrap_or(i64::MIN))
            .collect())
    }

    /// Target labels of a scalar relation for every element; unset is `""`.
    pub fn read_scalar_relations(
        &self,
        collection: &str,
        target: &str,
        relation_type: &str,
    ) -> TabulaResult<Vec<String>> {
        let ids = self.read_scalar_relation_ids(collection, target, relation_type)?;
        let labels = self.id_to_label(self.collection(target)?)?;
        Ok(ids.iter().map(|id| label_of(&labels, *id)).collect())
    }

    pub fn read_scalar_relation(
        &self,
        collection: &str,
        target: &str,
        relation_type: &str,
        element: impl Into<ElementRef>,
    ) -> TabulaResult<String> {
        let source = self.collection(collection)?;
        let attribute = source.relation(target, relation_type, AttributeClass::ScalarRelation)?;
        let id = self.resolve_element(source, &element.into())?;
        let related = match self.read_cell(attribute, id)? {
            Value::Integer(related) => related,
            _ => i64::MIN,
        };
        let labels = self.id_to_label(self.collection(target)?)?;
        Ok(label_of(&labels, related))
    }

    /// Target labels of a vector relation for every element, in id order.
    pub fn read_vector_relations(
        &self,
        collection: &str,
        target: &str,
        relation_type: &str,
    ) -> TabulaResult<Vec<Vec<String>>> {
        self.read_grouped_relation(
            collection,
            target,
            relation_type,
            AttributeClass::VectorRelation,
        )
    }

    pub fn read_set_relations(
        &self,
        collection: &str,
        target: &str,
        relation_type: &str,
    ) -> TabulaResult<Vec<Vec<String>>> {
        self.read_grouped_relation(collection, target, relation_type, AttributeClass::SetRelation)
    }

    /// Target ids of a vector relation for every element, in id order.
    pub fn read_vector_relation_ids(
        &self,
        collection: &str,
        target: &str,
        relation_type: &str,
    ) -> TabulaResult<Vec<Vec<i64>>> {
        self.read_grouped_relation_ids(
            collection,
            target,
            relation_type,
            AttributeClass::VectorRelation,
        )
    }

    pub fn read_set_relation_ids(
        &self,
        collection: &str,
        target: &str,
        relation_type: &str,
    ) -> TabulaResult<Vec<Vec<i64>>> {
        self.read_grouped_relation_ids(
            collection,
            target,
            relation_type,
            AttributeClass::SetRelation,
        )
    }

    /// Every stored row of a time-series attribute for one element, ordered
    /// by its dimensions. Columns are the dimensions plus the attribute.
    pub fn read_time_series_table(
        &self,
        collection: &str,
        attribute: &str,
        element: impl Into<ElementRef>,
    ) -> TabulaResult<TimeSeriesFrame> {
        let attribute = self.expect_class(collection, attribute, AttributeClass::TimeSeries)?;
        let id = self.resolve_element(self.collection(collection)?, &element.into())?;
        self.read_frame(&attribute.table, attribute.dimensions(), &[attribute], id)
    }

    /// Path stored for a time-series file attribute; `""` when unset.
    pub fn read_time_series_file(&self, collection: &str, attribute: &str) -> TabulaResult<String> {
        let attribute = self.expect_class(collection, attribute, AttributeClass::TimeSeriesFile)?;
        let select = Query::select()
            .column(alias(&attribute.name))
            .from(alias(&attribute.table))
            .limit(1)
            .to_owned();
        let value = query_one(self.connection(), &select, |row| {
            row.get::<_, Option<String>>(0)
        })?;
        Ok(value.flatten().unwrap_or_default())
    }

    pub(crate) fn expect_class(
        &self,
        collection: &str,
        attribute: &str,
        class: AttributeClass,
    ) -> TabulaResult<&Attribute> {
        let attribute = self.collection(collection)?.attribute(attribute)?;
        if attribute.class() != class {
            return Err(TabulaError::type_mismatch(format!(
                "attribute '{collection}.{}' is a {}, not a {class}",
                attribute.name,
                attribute.class()
            )));
        }
        Ok(attribute)
    }

    /// Stored values of a primary-table column in id order, NULL as the
    /// null sentinel.
    pub(crate) fn read_scalar_column(&self, attribute: &Attribute) -> TabulaResult<Vec<Value>> {
        let select = Query::select()
            .column(alias(&attribute.name))
            .from(alias(&attribute.table))
            .order_by(alias(ID_COLUMN), Order::Asc)
            .to_owned();
        query_all(self.connection(), &select, |row| {
            read_value(row, 0, attribute.semantic_type)
        })
    }

    fn read_cell(&self, attribute: &Attribute, id: i64) -> TabulaResult<Value> {
        let select = Query::select()
            .column(alias(&attribute.name))
            .from(alias(&attribute.table))
            .and_where(Expr::col(alias(ID_COLUMN)).eq(id))
            .to_owned();
        let value = query_one(self.connection(), &select, |row| {
            read_value(row, 0, attribute.semantic_type)
        })?;
        Ok(value.unwrap_or_else(|| attribute.semantic_type.null_value()))
    }

    /// Values of a vector or set attribute for one element, in row order.
    pub(crate) fn read_group_values(&self, attribute: &Attribute, id: i64) -> TabulaResult<Vec<Value>> {
        let select = Query::select()
            .column(alias(&attribute.name))
            .from(alias(&attribute.table))
            .and_where(Expr::col(alias(ID_COLUMN)).eq(id))
            .order_by(alias(group_order_column(attribute)), Order::Asc)
            .to_owned();
        query_all(self.connection(), &select, |row| {
            read_value(row, 0, attribute.semantic_type)
        })
    }

    /// Values of a vector or set attribute for every element, in id order.
    /// Elements without rows get an empty list.
    pub(crate) fn read_group_column(
        &self,
        collection: &Collection,
        attribute: &Attribute,
    ) -> TabulaResult<Vec<Vec<Value>>> {
        let select = Query::select()
            .column(alias(ID_COLUMN))
            .column(alias(&attribute.name))
            .from(alias(&attribute.table))
            .order_by(alias(ID_COLUMN), Order::Asc)
            .order_by(alias(group_order_column(attribute)), Order::Asc)
            .to_owned();
        let rows = query_all(self.connection(), &select, |row| {
            Ok((row.get::<_, i64>(0)?, read_value(row, 1, attribute.semantic_type)?))
        })?;
        let mut by_element: HashMap<i64, Vec<Value>> = HashMap::new();
        for (id, value) in rows {
            by_element.entry(id).or_default().push(value);
        }
        Ok(self
            .element_ids(collection)?
            .into_iter()
            .map(|id| by_element.remove(&id).unwrap_or_default())
            .collect())
    }

    fn read_grouped_relation_ids(
        &self,
        collection: &str,
        target: &str,
        relation_type: &str,
        class: AttributeClass,
    ) -> TabulaResult<Vec<Vec<i64>>> {
        let source = self.collection(collection)?;
        let attribute = source.relation(target, relation_type, class)?;
        Ok(self
            .read_group_column(source, attribute)?
            .into_iter()
            .map(|values| {
                values
                    .iter()
                    .map(|value| value.as_i64().unwrap_or(i64::MIN))
                    .collect()
            })
            .collect())
    }

    fn read_grouped_relation(
        &self,
        collection: &str,
        target: &str,
        relation_type: &str,
        class: AttributeClass,
    ) -> TabulaResult<Vec<Vec<String>>> {
        let ids = self.read_grouped_relation_ids(collection, target, relation_type, class)?;
        let labels = self.id_to_label(self.collection(target)?)?;
        Ok(ids
            .into_iter()
            .map(|ids| ids.iter().map(|id| label_of(&labels, *id)).collect())
            .collect())
    }

    /// Rows of a time-series table for one element with the given value
    /// columns, ordered by the dimensions.
    pub(crate) fn read_frame(
        &self,
        table: &str,
        dimensions: &[String],
        members: &[&Attribute],
        id: i64,
    ) -> TabulaResult<TimeSeriesFrame> {
        let mut select = Query::select();
        for dimension in dimensions {
            select.column(alias(dimension));
        }
        for member in members {
            select.column(alias(&member.name));
        }
        select
            .from(alias(table))
            .and_where(Expr::col(alias(ID_COLUMN)).eq(id));
        for dimension in dimensions {
            select.order_by(alias(dimension), Order::Asc);
        }
        let types: Vec<SemanticType> = dimensions
            .iter()
            .map(|dimension| {
                if dimension == DATE_TIME_DIMENSION {
                    SemanticType::Timestamp
                } else {
                    SemanticType::Integer
                }
            })
            .chain(members.iter().map(|member| member.semantic_type))
            .collect();
        let rows = query_all(self.connection(), &select, |row| {
            types
                .iter()
                .enumerate()
                .map(|(idx, semantic_type)| read_value(row, idx, *semantic_type))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?;
        let order: Vec<String> = dimensions
            .iter()
            .cloned()
            .chain(members.iter().map(|member| member.name.clone()))
            .collect();
        let mut columns: BTreeMap<String, Vec<Value>> = order
            .iter()
            .map(|name| (name.clone(), Vec::with_capacity(rows.len())))
            .collect();
        for row in rows {
            for (name, value) in order.iter().zip(row) {
                if let Some(column) = columns.get_mut(name) {
                    column.push(value);
                }
            }
        }
        Ok(TimeSeriesFrame { columns })
    }

    /// Ids to labels for every element of `collection`, in id order.
    fn id_to_label(&self, collection: &Collection) -> TabulaResult<BTreeMap<i64, String>> {
        if !collection.has_label() {
            return Err(TabulaError::not_found(format!(
                "collection '{}' has no '{LABEL_ATTRIBUTE}' attribute",
                collection.name
            )));
        }
        let select = Query::select()
            .column(alias(ID_COLUMN))
            .column(alias(LABEL_ATTRIBUTE))
            .from(alias(&collection.name))
            .to_owned();
        let rows = query_all(self.connection(), &select, |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.into_iter().collect())
    }
}

fn group_order_column(attribute: &Attribute) -> &'static str {
    match attribute.group() {
        Some((GroupKind::Vector, _)) => VECTOR_INDEX_COLUMN,
        _ => ROWID,
    }
}

fn fallback(attribute: &Attribute, default: Option<Value>) -> TabulaResult<Value> {
    match default {
        Some(value) => {
            check_type(attribute, &value)?;
            Ok(value)
        }
        None => Ok(attribute.fallback_value()),
    }
}

fn or_fallback(value: Value, fallback: &Value) -> Value {
    if value.is_null() {
        fallback.clone()
    } else {
        value
    }
}

fn label_of(labels: &BTreeMap<i64, String>, id: i64) -> String {
    labels.get(&id).cloned().unwrap_or_default()
}
