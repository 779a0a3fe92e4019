//! Builds the immutable [`Catalog`] from an introspected schema.

use std::collections::BTreeMap;

use tabula_core::{
    parse_timestamp, Attribute, AttributeKind, Catalog, Collection, GroupKind, SemanticType,
    TabulaError, TabulaResult, Value, DATE_TIME_DIMENSION, ID_COLUMN, TIME_SERIES_FILES_SUFFIX,
    VECTOR_INDEX_COLUMN,
};

use crate::introspect::{RawColumn, RawSchema, RawTable};

/// What a physical table holds, derived from its name alone.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TableRole<'a> {
    Primary {
        collection: &'a str,
    },
    Group {
        collection: &'a str,
        kind: GroupKind,
        group: &'a str,
    },
    TimeSeriesFiles {
        collection: &'a str,
    },
}

impl<'a> TableRole<'a> {
    pub(crate) fn collection(self) -> &'a str {
        match self {
            TableRole::Primary { collection }
            | TableRole::Group { collection, .. }
            | TableRole::TimeSeriesFiles { collection } => collection,
        }
    }
}

pub(crate) fn classify_table(name: &str) -> Option<TableRole<'_>> {
    if let Some(collection) = name.strip_suffix(TIME_SERIES_FILES_SUFFIX) {
        if !collection.is_empty() && !collection.contains('_') {
            return Some(TableRole::TimeSeriesFiles { collection });
        }
    }
    for kind in [GroupKind::TimeSeries, GroupKind::Vector, GroupKind::Set] {
        if let Some((collection, group)) = name.split_once(kind.table_infix()) {
            if collection.is_empty() || group.is_empty() || collection.contains('_') {
                return None;
            }
            return Some(TableRole::Group {
                collection,
                kind,
                group,
            });
        }
    }
    if name.is_empty() || name.contains('_') {
        return None;
    }
    Some(TableRole::Primary { collection: name })
}

/// Maps a declared column type to its semantic type.
///
/// Text columns whose name starts with `date` carry timestamps.
pub(crate) fn semantic_type(table: &str, column: &RawColumn) -> TabulaResult<SemanticType> {
    let decl = column.decl_type.as_str();
    if decl.contains("INT") {
        Ok(SemanticType::Integer)
    } else if decl.contains("REAL") || decl.contains("FLOA") || decl.contains("DOUB") {
        Ok(SemanticType::Float)
    } else if decl.contains("TEXT") || decl.contains("CHAR") || decl.contains("CLOB") {
        if column.name.starts_with("date") {
            Ok(SemanticType::Timestamp)
        } else {
            Ok(SemanticType::String)
        }
    } else {
        Err(TabulaError::schema(format!(
            "column '{table}.{}' has unsupported type '{}'",
            column.name, column.decl_type
        )))
    }
}

fn default_value(column: &RawColumn, semantic_type: SemanticType) -> Option<Value> {
    let raw = column.default.as_deref()?.trim();
    if raw.eq_ignore_ascii_case("NULL") {
        return None;
    }
    let unquoted = raw
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .or_else(|| raw.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')))
        .unwrap_or(raw);
    match semantic_type {
        SemanticType::Float => unquoted.parse::<f64>().ok().map(Value::Float),
        SemanticType::Integer => unquoted.parse::<i64>().ok().map(Value::Integer),
        SemanticType::String => Some(Value::String(unquoted.to_string())),
        SemanticType::Timestamp => parse_timestamp(unquoted).ok().map(Value::Timestamp),
    }
}

pub fn build_catalog(schema: &RawSchema) -> TabulaResult<Catalog> {
    let mut collections = BTreeMap::new();
    for table in &schema.tables {
        if let Some(TableRole::Primary { collection }) = classify_table(&table.name) {
            collections.insert(collection.to_string(), Collection::new(collection));
        }
    }
    for table in &schema.tables {
        let role = classify_table(&table.name).ok_or_else(|| {
            TabulaError::schema(format!(
                "table '{}' does not follow the collection naming conventions",
                table.name
            ))
        })?;
        let collection = collections.get_mut(role.collection()).ok_or_else(|| {
            TabulaError::schema(format!(
                "table '{}' belongs to undeclared collection '{}'",
                table.name,
                role.collection()
            ))
        })?;
        match role {
            TableRole::Primary { .. } => add_primary_attributes(collection, table)?,
            TableRole::Group { kind, group, .. } => {
                add_group_attributes(collection, table, kind, group)?
            }
            TableRole::TimeSeriesFiles { .. } => add_time_series_files(collection, table)?,
        }
    }
    Ok(Catalog::new(collections))
}

fn insert_attribute(collection: &mut Collection, attribute: Attribute) -> TabulaResult<()> {
    if let Some(existing) = collection.attributes.get(&attribute.name) {
        return Err(TabulaError::schema(format!(
            "attribute '{}' of collection '{}' is declared in both '{}' and '{}'",
            attribute.name, collection.name, existing.table, attribute.table
        )));
    }
    collection
        .attributes
        .insert(attribute.name.clone(), attribute);
    Ok(())
}

fn attribute(
    collection: &Collection,
    table: &RawTable,
    column: &RawColumn,
    kind: AttributeKind,
) -> TabulaResult<Attribute> {
    let semantic_type = semantic_type(&table.name, column)?;
    Ok(Attribute {
        name: column.name.clone(),
        collection: collection.name.clone(),
        table: table.name.clone(),
        semantic_type,
        not_null: column.not_null,
        default_value: default_value(column, semantic_type),
        kind,
    })
}

/// Splits `lowercase(target)_{relation_type}` back into its relation type.
fn relation_type(table: &str, column: &str, target: &str) -> TabulaResult<String> {
    let prefix = format!("{}_", target.to_lowercase());
    match column.strip_prefix(&prefix) {
        Some(relation_type) if !relation_type.is_empty() => Ok(relation_type.to_string()),
        _ => Err(TabulaError::schema(format!(
            "relation column '{table}.{column}' must be named '{prefix}<relation_type>'"
        ))),
    }
}

fn add_primary_attributes(collection: &mut Collection, table: &RawTable) -> TabulaResult<()> {
    for column in table.columns.iter().filter(|c| c.name != ID_COLUMN) {
        let kind = match table.foreign_key(&column.name) {
            Some(fk) => AttributeKind::ScalarRelation {
                relation_type: relation_type(&table.name, &column.name, &fk.target_table)?,
                target: fk.target_table.clone(),
            },
            None => AttributeKind::ScalarParameter,
        };
        let attribute = attribute(collection, table, column, kind)?;
        insert_attribute(collection, attribute)?;
    }
    Ok(())
}

fn add_group_attributes(
    collection: &mut Collection,
    table: &RawTable,
    kind: GroupKind,
    group: &str,
) -> TabulaResult<()> {
    if table.column(ID_COLUMN).is_none() {
        return Err(TabulaError::schema(format!(
            "table '{}' is missing the '{ID_COLUMN}' column",
            table.name
        )));
    }
    let dimensions = match kind {
        GroupKind::Vector => {
            if table.column(VECTOR_INDEX_COLUMN).is_none() {
                return Err(TabulaError::schema(format!(
                    "vector table '{}' is missing the '{VECTOR_INDEX_COLUMN}' column",
                    table.name
                )));
            }
            vec![VECTOR_INDEX_COLUMN.to_string()]
        }
        GroupKind::Set => Vec::new(),
        GroupKind::TimeSeries => time_series_dimensions(table)?,
    };
    for column in table
        .columns
        .iter()
        .filter(|c| c.name != ID_COLUMN && !dimensions.contains(&c.name))
    {
        let fk = table.foreign_key(&column.name);
        let attribute_kind = match (kind, fk) {
            (GroupKind::Vector, None) => AttributeKind::VectorParameter {
                group: group.to_string(),
            },
            (GroupKind::Vector, Some(fk)) => AttributeKind::VectorRelation {
                group: group.to_string(),
                relation_type: relation_type(&table.name, &column.name, &fk.target_table)?,
                target: fk.target_table.clone(),
            },
            (GroupKind::Set, None) => AttributeKind::SetParameter {
                group: group.to_string(),
            },
            (GroupKind::Set, Some(fk)) => AttributeKind::SetRelation {
                group: group.to_string(),
                relation_type: relation_type(&table.name, &column.name, &fk.target_table)?,
                target: fk.target_table.clone(),
            },
            (GroupKind::TimeSeries, None) => AttributeKind::TimeSeries {
                group: group.to_string(),
                dimensions: dimensions.clone(),
            },
            (GroupKind::TimeSeries, Some(_)) => {
                return Err(TabulaError::schema(format!(
                    "time series column '{}.{}' cannot be a relation",
                    table.name, column.name
                )));
            }
        };
        let attribute = attribute(collection, table, column, attribute_kind)?;
        if kind == GroupKind::TimeSeries && attribute.semantic_type == SemanticType::Timestamp {
            return Err(TabulaError::schema(format!(
                "time series value '{}.{}' cannot be a timestamp",
                table.name, column.name
            )));
        }
        insert_attribute(collection, attribute)?;
    }
    Ok(())
}

/// Primary key columns other than `id`; `date_time` must be among them and
/// the remaining keys must be integers.
fn time_series_dimensions(table: &RawTable) -> TabulaResult<Vec<String>> {
    let dimensions: Vec<String> = table
        .primary_key()
        .into_iter()
        .filter(|name| *name != ID_COLUMN)
        .map(str::to_string)
        .collect();
    if !dimensions.iter().any(|name| name == DATE_TIME_DIMENSION) {
        return Err(TabulaError::schema(format!(
            "time series table '{}' must key on '{DATE_TIME_DIMENSION}'",
            table.name
        )));
    }
    for name in &dimensions {
        let Some(column) = table.column(name) else {
            continue;
        };
        let expected = if name == DATE_TIME_DIMENSION {
            SemanticType::Timestamp
        } else {
            SemanticType::Integer
        };
        let found = semantic_type(&table.name, column)?;
        if found != expected {
            return Err(TabulaError::schema(format!(
                "time series dimension '{}.{name}' must be {expected}, found {found}",
                table.name
            )));
        }
    }
    Ok(dimensions)
}

fn add_time_series_files(collection: &mut Collection, table: &RawTable) -> TabulaResult<()> {
    for column in &table.columns {
        let attribute = attribute(collection, table, column, AttributeKind::TimeSeriesFile)?;
        if attribute.semantic_type != SemanticType::String {
            return Err(TabulaError::schema(format!(
                "time series file column '{}.{}' must be TEXT",
                table.name, column.name
            )));
        }
        insert_attribute(collection, attribute)?;
    }
    Ok(())
}
