use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Attribute, AttributeClass, GroupKind, TabulaError, TabulaResult};

/// The singleton collection every store must declare.
pub const CONFIGURATION_COLLECTION: &str = "Configuration";
pub const LABEL_ATTRIBUTE: &str = "label";
pub const ID_COLUMN: &str = "id";
pub const VECTOR_INDEX_COLUMN: &str = "vector_index";
pub const TIME_SERIES_FILES_SUFFIX: &str = "_time_series_files";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub attributes: BTreeMap<String, Attribute>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn has_label(&self) -> bool {
        self.attributes.contains_key(LABEL_ATTRIBUTE)
    }

    pub fn attribute(&self, name: &str) -> TabulaResult<&Attribute> {
        self.attributes.get(name).ok_or_else(|| {
            TabulaError::not_found(format!(
                "attribute '{name}' does not exist in collection '{}'",
                self.name
            ))
        })
    }

    pub fn attributes_of(&self, class: AttributeClass) -> impl Iterator<Item = &Attribute> {
        self.attributes
            .values()
            .filter(move |attribute| attribute.class() == class)
    }

    /// Members of one vector, set or time-series group, in name order.
    pub fn group_members(&self, kind: GroupKind, group: &str) -> Vec<&Attribute> {
        self.attributes
            .values()
            .filter(|attribute| attribute.group() == Some((kind, group)))
            .collect()
    }

    pub fn groups(&self, kind: GroupKind) -> BTreeSet<&str> {
        self.attributes
            .values()
            .filter_map(|attribute| match attribute.group() {
                Some((found, group)) if found == kind => Some(group),
                _ => None,
            })
            .collect()
    }

    pub fn group_table(&self, kind: GroupKind, group: &str) -> String {
        format!("{}{}{}", self.name, kind.table_infix(), group)
    }

    pub fn time_series_files_table(&self) -> String {
        format!("{}{TIME_SERIES_FILES_SUFFIX}", self.name)
    }

    /// Relation of `class` pointing at `target` with the given relation type.
    pub fn relation(
        &self,
        target: &str,
        relation_type: &str,
        class: AttributeClass,
    ) -> TabulaResult<&Attribute> {
        let found = self.attributes_of(class).find(|attribute| {
            attribute.relation() == Some((target, relation_type))
        });
        match found {
            Some(attribute) => Ok(attribute),
            None => {
                let available = self.relation_types(target, class);
                Err(TabulaError::not_found(format!(
                    "collection '{}' has no {class} to '{target}' with relation type \
                     '{relation_type}' (available: [{}])",
                    self.name,
                    available.join(", ")
                )))
            }
        }
    }

    pub fn relation_types(&self, target: &str, class: AttributeClass) -> Vec<&str> {
        self.attributes_of(class)
            .filter_map(|attribute| match attribute.relation() {
                Some((found, relation_type)) if found == target => Some(relation_type),
                _ => None,
            })
            .collect()
    }
}

/// Immutable snapshot of every collection in a store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    collections: BTreeMap<String, Collection>,
}

impl Catalog {
    pub fn new(collections: BTreeMap<String, Collection>) -> Self {
        Self { collections }
    }

    pub fn collection(&self, name: &str) -> TabulaResult<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| TabulaError::not_found(format!("collection '{name}' does not exist")))
    }

    pub fn attribute(&self, collection: &str, attribute: &str) -> TabulaResult<&Attribute> {
        self.collection(collection)?.attribute(attribute)
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    pub fn collection_names(&self) -> Vec<&str> {
        self.collections.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}
