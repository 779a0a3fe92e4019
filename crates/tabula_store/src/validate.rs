//! Structural conventions every store must follow, checked at open time.

use log::warn;

use tabula_core::{
    GroupKind, TabulaError, TabulaResult, CONFIGURATION_COLLECTION, DATE_TIME_DIMENSION,
    ID_COLUMN, LABEL_ATTRIBUTE, VECTOR_INDEX_COLUMN,
};

use crate::catalog::{classify_table, TableRole};
use crate::introspect::{RawForeignKey, RawSchema, RawTable};
use crate::ValidationMode;

const ALLOWED_ACTIONS: [&str; 2] = ["CASCADE", "SET NULL"];

/// Runs every check and applies `mode`: `Error` refuses the schema, `Warn`
/// logs each finding and `Off` skips validation entirely.
pub fn enforce(schema: &RawSchema, mode: ValidationMode) -> TabulaResult<()> {
    if mode == ValidationMode::Off {
        return Ok(());
    }
    let findings = validate_schema(schema);
    if findings.is_empty() {
        return Ok(());
    }
    match mode {
        ValidationMode::Error => Err(TabulaError::schema(findings.join("; "))),
        _ => {
            for finding in &findings {
                warn!("tabula schema warning: {finding}");
            }
            Ok(())
        }
    }
}

/// Collects every convention violation in `schema`.
pub fn validate_schema(schema: &RawSchema) -> Vec<String> {
    let mut findings = Vec::new();
    if schema.table(CONFIGURATION_COLLECTION).is_none() {
        findings.push(format!(
            "required collection '{CONFIGURATION_COLLECTION}' is missing"
        ));
    }
    for table in &schema.tables {
        let Some(role) = classify_table(&table.name) else {
            findings.push(format!(
                "table '{}' does not follow the collection naming conventions",
                table.name
            ));
            continue;
        };
        check_names(table, role, &mut findings);
        match role {
            TableRole::Primary { .. } => check_primary(table, &mut findings),
            TableRole::Group {
                collection, kind, ..
            } => check_group(schema, table, collection, kind, &mut findings),
            TableRole::TimeSeriesFiles { collection } => {
                if !is_collection(schema, collection) {
                    findings.push(format!(
                        "table '{}' belongs to undeclared collection '{collection}'",
                        table.name
                    ));
                }
            }
        }
        for fk in &table.foreign_keys {
            check_foreign_key(schema, table, fk, &mut findings);
        }
    }
    findings
}

pub(crate) fn is_pascal_case(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

pub(crate) fn is_snake_case(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.ends_with('_')
        && !name.contains("__")
}

fn is_collection(schema: &RawSchema, name: &str) -> bool {
    schema.table(name).is_some()
        && matches!(classify_table(name), Some(TableRole::Primary { .. }))
}

fn check_names(table: &RawTable, role: TableRole<'_>, findings: &mut Vec<String>) {
    if !is_pascal_case(role.collection()) {
        findings.push(format!(
            "collection '{}' must be PascalCase",
            role.collection()
        ));
    }
    if let TableRole::Group { group, .. } = role {
        if !is_snake_case(group) {
            findings.push(format!(
                "group '{group}' of table '{}' must be snake_case",
                table.name
            ));
        }
    }
    for column in &table.columns {
        if !is_snake_case(&column.name) {
            findings.push(format!(
                "column '{}.{}' must be snake_case",
                table.name, column.name
            ));
        }
    }
}

fn check_primary(table: &RawTable, findings: &mut Vec<String>) {
    match table.column(ID_COLUMN) {
        Some(id) if id.decl_type == "INTEGER" && table.primary_key() == [ID_COLUMN] => {}
        Some(_) => findings.push(format!(
            "collection '{}' must declare '{ID_COLUMN} INTEGER PRIMARY KEY'",
            table.name
        )),
        None => findings.push(format!(
            "collection '{}' is missing the '{ID_COLUMN}' column",
            table.name
        )),
    }
    if let Some(label) = table.column(LABEL_ATTRIBUTE) {
        if label.decl_type != "TEXT" || !label.not_null || !table.is_unique(LABEL_ATTRIBUTE) {
            findings.push(format!(
                "'{}.{LABEL_ATTRIBUTE}' must be TEXT UNIQUE NOT NULL",
                table.name
            ));
        }
    }
}

fn check_group(
    schema: &RawSchema,
    table: &RawTable,
    collection: &str,
    kind: GroupKind,
    findings: &mut Vec<String>,
) {
    if !is_collection(schema, collection) {
        findings.push(format!(
            "table '{}' belongs to undeclared collection '{collection}'",
            table.name
        ));
    }
    match table.foreign_key(ID_COLUMN) {
        Some(fk) if fk.target_table == collection && fk.on_delete == "CASCADE" => {}
        Some(_) => findings.push(format!(
            "'{}.{ID_COLUMN}' must reference '{collection}({ID_COLUMN})' with ON DELETE CASCADE",
            table.name
        )),
        None => findings.push(format!(
            "'{}.{ID_COLUMN}' must be a foreign key to '{collection}'",
            table.name
        )),
    }
    let key = table.primary_key();
    match kind {
        GroupKind::Vector => {
            if key != [ID_COLUMN, VECTOR_INDEX_COLUMN] {
                findings.push(format!(
                    "vector table '{}' must declare PRIMARY KEY ({ID_COLUMN}, {VECTOR_INDEX_COLUMN})",
                    table.name
                ));
            }
        }
        GroupKind::TimeSeries => {
            if key.first() != Some(&ID_COLUMN) || !key.contains(&DATE_TIME_DIMENSION) {
                findings.push(format!(
                    "time series table '{}' must declare PRIMARY KEY ({ID_COLUMN}, \
                     {DATE_TIME_DIMENSION}, ...dimensions)",
                    table.name
                ));
            }
        }
        GroupKind::Set => {}
    }
}

fn check_foreign_key(
    schema: &RawSchema,
    table: &RawTable,
    fk: &RawForeignKey,
    findings: &mut Vec<String>,
) {
    for (event, action) in [("UPDATE", &fk.on_update), ("DELETE", &fk.on_delete)] {
        if !ALLOWED_ACTIONS.contains(&action.as_str()) {
            findings.push(format!(
                "foreign key '{}.{}' must declare ON {event} CASCADE or SET NULL, found {action}",
                table.name, fk.column
            ));
        }
    }
    if !is_collection(schema, &fk.target_table) {
        findings.push(format!(
            "foreign key '{}.{}' references '{}', which is not a collection",
            table.name, fk.column, fk.target_table
        ));
    }
    if let Some(target_column) = &fk.target_column {
        if target_column != ID_COLUMN {
            findings.push(format!(
                "foreign key '{}.{}' must reference '{}({ID_COLUMN})'",
                table.name, fk.column, fk.target_table
            ));
        }
    }
    if fk.column != ID_COLUMN {
        let prefix = format!("{}_", fk.target_table.to_lowercase());
        let named = fk
            .column
            .strip_prefix(&prefix)
            .is_some_and(|relation_type| !relation_type.is_empty());
        if !named {
            findings.push(format!(
                "relation column '{}.{}' must be named '{prefix}<relation_type>'",
                table.name, fk.column
            ));
        }
    }
}
