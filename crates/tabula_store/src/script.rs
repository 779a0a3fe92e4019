//! Rebuilding a store's contents from an empty schema.
//!
//! [`reconstruction_script`] walks every collection and emits the calls that
//! recreate its elements; [`replay`] runs them against another store with
//! the same schema. Elements are addressed by their id in the source store
//! and remapped on replay, so id gaps in the source are harmless.

use std::collections::HashMap;

use log::info;
use serde::{Deserialize, Serialize};

use crate::store::Database;
use tabula_core::{
    AttributeClass, Collection, ElementInput, GroupKind, TabulaError, TabulaResult, Value,
    CONFIGURATION_COLLECTION,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    CreateElement {
        collection: String,
        source_id: i64,
        input: ElementInput,
    },
    SetScalarRelation {
        collection: String,
        target: String,
        relation_type: String,
        source_id: i64,
        related_id: i64,
    },
    SetVectorRelation {
        collection: String,
        target: String,
        relation_type: String,
        source_id: i64,
        related_ids: Vec<i64>,
    },
    SetSetRelation {
        collection: String,
        target: String,
        relation_type: String,
        source_id: i64,
        related_ids: Vec<i64>,
    },
    SetTimeSeriesFile {
        collection: String,
        files: Vec<(String, String)>,
    },
}

/// Steps that rebuild the contents of `db`: every element first, then the
/// relations between them, then time-series file paths.
pub fn reconstruction_script(db: &Database) -> TabulaResult<Vec<ScriptStep>> {
    let mut collections: Vec<&Collection> = db.catalog().collections().collect();
    collections.sort_by_key(|collection| collection.name != CONFIGURATION_COLLECTION);

    let mut creates = Vec::new();
    let mut links = Vec::new();
    let mut files = Vec::new();
    for collection in collections {
        let ids = db.read_element_ids(&collection.name)?;
        let mut inputs = vec![ElementInput::new(); ids.len()];

        for attribute in collection.attributes_of(AttributeClass::ScalarParameter) {
            let values = db.read_scalar_column(attribute)?;
            for (input, value) in inputs.iter_mut().zip(values) {
                if !value.is_null() {
                    *input = std::mem::take(input).scalar(attribute.name.clone(), value);
                }
            }
        }
        for class in [AttributeClass::VectorParameter, AttributeClass::SetParameter] {
            for attribute in collection.attributes_of(class) {
                let columns = db.read_group_column(collection, attribute)?;
                for (input, values) in inputs.iter_mut().zip(columns) {
                    if !values.is_empty() {
                        *input = std::mem::take(input).list(attribute.name.clone(), values);
                    }
                }
            }
        }
        for group in collection.groups(GroupKind::TimeSeries) {
            let members = collection.group_members(GroupKind::TimeSeries, group);
            let Some(first) = members.first() else {
                continue;
            };
            for (input, id) in inputs.iter_mut().zip(&ids) {
                let frame = db.read_frame(&first.table, first.dimensions(), &members, *id)?;
                if frame.row_count()? > 0 {
                    *input = std::mem::take(input).time_series(group, frame);
                }
            }
        }
        for (input, id) in inputs.into_iter().zip(&ids) {
            creates.push(ScriptStep::CreateElement {
                collection: collection.name.clone(),
                source_id: *id,
                input,
            });
        }

        for attribute in collection.attributes_of(AttributeClass::ScalarRelation) {
            let Some((target, relation_type)) = attribute.relation() else {
                continue;
            };
            let related = db.read_scalar_column(attribute)?;
            for (id, related) in ids.iter().zip(related) {
                if let Some(related_id) = related.as_i64().filter(|_| !related.is_null()) {
                    links.push(ScriptStep::SetScalarRelation {
                        collection: collection.name.clone(),
                        target: target.to_string(),
                        relation_type: relation_type.to_string(),
                        source_id: *id,
                        related_id,
                    });
                }
            }
        }
        for class in [AttributeClass::VectorRelation, AttributeClass::SetRelation] {
            for attribute in collection.attributes_of(class) {
                let Some((target, relation_type)) = attribute.relation() else {
                    continue;
                };
                let columns = db.read_group_column(collection, attribute)?;
                for (id, values) in ids.iter().zip(columns) {
                    if values.is_empty() {
                        continue;
                    }
                    let related_ids: Vec<i64> = values
                        .iter()
                        .map(|value| value.as_i64().unwrap_or(i64::MIN))
                        .collect();
                    let collection = collection.name.clone();
                    let target = target.to_string();
                    let relation_type = relation_type.to_string();
                    let source_id = *id;
                    links.push(if class == AttributeClass::VectorRelation {
                        ScriptStep::SetVectorRelation {
                            collection,
                            target,
                            relation_type,
                            source_id,
                            related_ids,
                        }
                    } else {
                        ScriptStep::SetSetRelation {
                            collection,
                            target,
                            relation_type,
                            source_id,
                            related_ids,
                        }
                    });
                }
            }
        }

        let mut paths = Vec::new();
        for attribute in collection.attributes_of(AttributeClass::TimeSeriesFile) {
            let path = db.read_time_series_file(&collection.name, &attribute.name)?;
            if !path.is_empty() {
                paths.push((attribute.name.clone(), path));
            }
        }
        if !paths.is_empty() {
            files.push(ScriptStep::SetTimeSeriesFile {
                collection: collection.name.clone(),
                files: paths,
            });
        }
    }
    creates.extend(links);
    creates.extend(files);
    Ok(creates)
}

/// Runs `steps` against `db` inside one transaction.
pub fn replay(db: &Database, steps: &[ScriptStep]) -> TabulaResult<()> {
    db.in_transaction(|db| {
        let mut ids: HashMap<(String, i64), i64> = HashMap::new();
        for step in steps {
            match step {
                ScriptStep::CreateElement {
                    collection,
                    source_id,
                    input,
                } => {
                    let id = db.create_element(collection, input.clone())?;
                    ids.insert((collection.clone(), *source_id), id);
                }
                ScriptStep::SetScalarRelation {
                    collection,
                    target,
                    relation_type,
                    source_id,
                    related_id,
                } => {
                    let attribute = db.collection(collection)?.relation(
                        target,
                        relation_type,
                        AttributeClass::ScalarRelation,
                    )?;
                    let id = mapped(&ids, collection, *source_id)?;
                    let related = mapped(&ids, target, *related_id)?;
                    db.write_cell(attribute, id, &Value::Integer(related))?;
                }
                ScriptStep::SetVectorRelation {
                    collection,
                    target,
                    relation_type,
                    source_id,
                    related_ids,
                }
                | ScriptStep::SetSetRelation {
                    collection,
                    target,
                    relation_type,
                    source_id,
                    related_ids,
                } => {
                    let class = match step {
                        ScriptStep::SetVectorRelation { .. } => AttributeClass::VectorRelation,
                        _ => AttributeClass::SetRelation,
                    };
                    let attribute =
                        db.collection(collection)?
                            .relation(target, relation_type, class)?;
                    let id = mapped(&ids, collection, *source_id)?;
                    let values = related_ids
                        .iter()
                        .map(|related| mapped(&ids, target, *related).map(Value::Integer))
                        .collect::<TabulaResult<Vec<_>>>()?;
                    db.write_group_values(attribute, id, values)?;
                }
                ScriptStep::SetTimeSeriesFile { collection, files } => {
                    let files: Vec<(&str, &str)> = files
                        .iter()
                        .map(|(attribute, path)| (attribute.as_str(), path.as_str()))
                        .collect();
                    db.set_time_series_file(collection, &files)?;
                }
            }
        }
        info!("tabula script: replayed {} steps", steps.len());
        Ok(())
    })
}

/// Id in the target store of a source element; null ids stay null.
fn mapped(ids: &HashMap<(String, i64), i64>, collection: &str, source_id: i64) -> TabulaResult<i64> {
    if source_id == i64::MIN {
        return Ok(source_id);
    }
    ids.get(&(collection.to_string(), source_id))
        .copied()
        .ok_or_else(|| {
            TabulaError::integrity(format!(
                "script references '{collection}' element {source_id} before creating it"
            ))
        })
}
