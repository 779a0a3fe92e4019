use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{SemanticType, Value};

/// Name of the dimension every time series is forward-filled over.
pub const DATE_TIME_DIMENSION: &str = "date_time";

/// Structural class of an attribute together with the data that class needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum AttributeKind {
    ScalarParameter,
    ScalarRelation {
        target: String,
        relation_type: String,
    },
    VectorParameter {
        group: String,
    },
    VectorRelation {
        group: String,
        target: String,
        relation_type: String,
    },
    SetParameter {
        group: String,
    },
    SetRelation {
        group: String,
        target: String,
        relation_type: String,
    },
    TimeSeries {
        group: String,
        dimensions: Vec<String>,
    },
    TimeSeriesFile,
}

/// Fieldless mirror of [`AttributeKind`], handy for messages and filters.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeClass {
    ScalarParameter,
    ScalarRelation,
    VectorParameter,
    VectorRelation,
    SetParameter,
    SetRelation,
    TimeSeries,
    TimeSeriesFile,
}

impl fmt::Display for AttributeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeClass::ScalarParameter => "scalar parameter",
            AttributeClass::ScalarRelation => "scalar relation",
            AttributeClass::VectorParameter => "vector parameter",
            AttributeClass::VectorRelation => "vector relation",
            AttributeClass::SetParameter => "set parameter",
            AttributeClass::SetRelation => "set relation",
            AttributeClass::TimeSeries => "time series",
            AttributeClass::TimeSeriesFile => "time series file",
        };
        f.write_str(name)
    }
}

/// Where the rows of a grouped attribute live.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum GroupKind {
    Vector,
    Set,
    TimeSeries,
}

impl GroupKind {
    pub fn table_infix(self) -> &'static str {
        match self {
            GroupKind::Vector => "_vector_",
            GroupKind::Set => "_set_",
            GroupKind::TimeSeries => "_time_series_",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub collection: String,
    pub table: String,
    pub semantic_type: SemanticType,
    pub not_null: bool,
    pub default_value: Option<Value>,
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn class(&self) -> AttributeClass {
        match &self.kind {
            AttributeKind::ScalarParameter => AttributeClass::ScalarParameter,
            AttributeKind::ScalarRelation { .. } => AttributeClass::ScalarRelation,
            AttributeKind::VectorParameter { .. } => AttributeClass::VectorParameter,
            AttributeKind::VectorRelation { .. } => AttributeClass::VectorRelation,
            AttributeKind::SetParameter { .. } => AttributeClass::SetParameter,
            AttributeKind::SetRelation { .. } => AttributeClass::SetRelation,
            AttributeKind::TimeSeries { .. } => AttributeClass::TimeSeries,
            AttributeKind::TimeSeriesFile => AttributeClass::TimeSeriesFile,
        }
    }

    pub fn group(&self) -> Option<(GroupKind, &str)> {
        match &self.kind {
            AttributeKind::VectorParameter { group } | AttributeKind::VectorRelation { group, .. } => {
                Some((GroupKind::Vector, group.as_str()))
            }
            AttributeKind::SetParameter { group } | AttributeKind::SetRelation { group, .. } => {
                Some((GroupKind::Set, group.as_str()))
            }
            AttributeKind::TimeSeries { group, .. } => Some((GroupKind::TimeSeries, group.as_str())),
            AttributeKind::ScalarParameter
            | AttributeKind::ScalarRelation { .. }
            | AttributeKind::TimeSeriesFile => None,
        }
    }

    /// Target collection and relation type for the three relation classes.
    pub fn relation(&self) -> Option<(&str, &str)> {
        match &self.kind {
            AttributeKind::ScalarRelation {
                target,
                relation_type,
            }
            | AttributeKind::VectorRelation {
                target,
                relation_type,
                ..
            }
            | AttributeKind::SetRelation {
                target,
                relation_type,
                ..
            } => Some((target.as_str(), relation_type.as_str())),
            AttributeKind::ScalarParameter
            | AttributeKind::VectorParameter { .. }
            | AttributeKind::SetParameter { .. }
            | AttributeKind::TimeSeries { .. }
            | AttributeKind::TimeSeriesFile => None,
        }
    }

    pub fn is_relation(&self) -> bool {
        self.relation().is_some()
    }

    /// Dimension columns of a time series, `date_time` included.
    pub fn dimensions(&self) -> &[String] {
        match &self.kind {
            AttributeKind::TimeSeries { dimensions, .. } => dimensions.as_slice(),
            _ => &[],
        }
    }

    /// Null sentinel, or the schema default when one is declared.
    pub fn fallback_value(&self) -> Value {
        self.default_value
            .clone()
            .unwrap_or_else(|| self.semantic_type.null_value())
    }
}

/// Attribute id of a relation: `lowercase(target)_{relation_type}`.
pub fn relation_attribute_name(target: &str, relation_type: &str) -> String {
    format!("{}_{}", target.to_lowercase(), relation_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attribute(kind: AttributeKind) -> Attribute {
        Attribute {
            name: "value1".to_string(),
            collection: "Plant".to_string(),
            table: "Plant".to_string(),
            semantic_type: SemanticType::Float,
            not_null: false,
            default_value: None,
            kind,
        }
    }

    #[test]
    fn relation_names_are_derived_from_target_and_type() {
        assert_eq!(relation_attribute_name("Plant", "turbine_to"), "plant_turbine_to");
        assert_eq!(relation_attribute_name("Resource", "id"), "resource_id");
    }

    #[test]
    fn classification_helpers_follow_kind() {
        let relation = attribute(AttributeKind::VectorRelation {
            group: "costs".to_string(),
            target: "Cost".to_string(),
            relation_type: "id".to_string(),
        });
        assert_eq!(relation.class(), AttributeClass::VectorRelation);
        assert_eq!(relation.group(), Some((GroupKind::Vector, "costs")));
        assert_eq!(relation.relation(), Some(("Cost", "id")));

        let series = attribute(AttributeKind::TimeSeries {
            group: "generation".to_string(),
            dimensions: vec!["date_time".to_string(), "block".to_string()],
        });
        assert!(!series.is_relation());
        assert_eq!(series.dimensions().len(), 2);
        assert!(series.fallback_value().is_null());
    }
}
