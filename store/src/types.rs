//! Shared data model for drafts, existing records and update actions

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of resource kinds the store holds.
///
/// Adding a new kind means extending this enum and every exhaustive
/// match over it; there is no open-ended runtime registration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Category,
    Product,
    Channel,
    Inventory,
}

impl ResourceKind {
    /// Path segment used by the HTTP store for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Category => "categories",
            ResourceKind::Product => "products",
            ResourceKind::Channel => "channels",
            ResourceKind::Inventory => "inventory",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Localized text keyed by locale tag (e.g. "en", "de-DE").
pub type LocalizedText = BTreeMap<String, String>;

/// A typed pointer to another entity.
///
/// An unresolved reference carries the caller-facing external key of
/// the target; a resolved one carries the store-internal id. Once
/// resolved a reference is never re-resolved within the same run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Reference {
    Unresolved { kind: ResourceKind, key: String },
    Resolved { kind: ResourceKind, id: String },
}

impl Reference {
    /// Reference by external key, to be resolved before use.
    pub fn by_key(kind: ResourceKind, key: impl Into<String>) -> Self {
        Reference::Unresolved {
            kind,
            key: key.into(),
        }
    }

    /// Reference by concrete store id.
    pub fn by_id(kind: ResourceKind, id: impl Into<String>) -> Self {
        Reference::Resolved { kind, id: id.into() }
    }

    /// The kind of the referenced entity.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Reference::Unresolved { kind, .. } | Reference::Resolved { kind, .. } => *kind,
        }
    }

    /// The external key, if still unresolved.
    pub fn key(&self) -> Option<&str> {
        match self {
            Reference::Unresolved { key, .. } => Some(key),
            Reference::Resolved { .. } => None,
        }
    }

    /// The store id, if resolved.
    pub fn id(&self) -> Option<&str> {
        match self {
            Reference::Resolved { id, .. } => Some(id),
            Reference::Unresolved { .. } => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Reference::Resolved { .. })
    }
}

/// Custom-typed metadata carried by a draft.
///
/// The type itself is referenced like any other entity and must be
/// resolved before the draft can be diffed or created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomFieldsDraft {
    #[serde(rename = "type")]
    pub type_ref: Reference,
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Custom-typed metadata as the store holds it, with a concrete type id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomFields {
    pub type_id: String,
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Caller-supplied desired state of one record.
///
/// The `external_key` is the caller-chosen stable identifier used to
/// correlate the draft with an existing record; it is never the
/// store's internal id. A draft with a blank external key cannot be
/// synchronized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Draft {
    pub external_key: String,
    pub kind: ResourceKind,
    pub name: LocalizedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedText>,
    /// Identity-establishing reference (e.g. parent category, supply
    /// channel). Resolution failures here are fatal for the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Reference>,
    /// Unordered reference set (e.g. category assignments, tags).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignments: Vec<Reference>,
    /// Ordered reference collection where relative position matters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<Reference>,
    /// Generic key/value properties.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomFieldsDraft>,
}

impl Draft {
    /// Minimal draft with a single-locale name.
    pub fn new(kind: ResourceKind, external_key: impl Into<String>, name: impl Into<String>) -> Self {
        let mut localized = LocalizedText::new();
        localized.insert("en".to_string(), name.into());
        Self {
            external_key: external_key.into(),
            kind,
            name: localized,
            description: None,
            parent: None,
            assignments: Vec::new(),
            entries: Vec::new(),
            properties: BTreeMap::new(),
            custom: None,
        }
    }
}

/// The store's current representation of one record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExistingRecord {
    pub id: String,
    pub version: u64,
    pub external_key: String,
    pub kind: ResourceKind,
    pub name: LocalizedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignment_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomFields>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// One atomic field-level mutation applied to an existing record.
///
/// Action lists produced by the diff builder are ordered: content
/// and identity actions first, then collection actions, then
/// custom-field actions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum UpdateAction {
    /// Re-parent the record under the given id.
    ChangeParent { parent_id: String },
    /// Set one locale of a localized text field.
    SetLocalizedValue {
        field: String,
        locale: String,
        value: String,
    },
    /// Remove one locale from a localized text field.
    RemoveLocalizedValue { field: String, locale: String },
    /// Set or overwrite a generic property.
    SetProperty {
        name: String,
        value: serde_json::Value,
    },
    /// Remove a generic property.
    RemoveProperty { name: String },
    /// Add an id to the unordered assignment set.
    AddAssignment { id: String },
    /// Remove an id from the unordered assignment set.
    RemoveAssignment { id: String },
    /// Append an id to the ordered entry collection.
    AddEntry { id: String },
    /// Remove an id from the ordered entry collection.
    RemoveEntry { id: String },
    /// Replace the relative order of the entry collection.
    ReorderEntries { ids: Vec<String> },
    /// Attach a custom type, replacing any previous fields wholesale.
    SetCustomType {
        type_id: String,
        fields: BTreeMap<String, serde_json::Value>,
    },
    /// Detach the custom type and all its fields.
    RemoveCustomType,
    /// Set one custom field on the attached type.
    SetCustomField {
        name: String,
        value: serde_json::Value,
    },
    /// Remove one custom field from the attached type.
    RemoveCustomField { name: String },
}

/// Predicate passed to paginated queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum QueryPredicate {
    /// All records of the kind.
    All,
    /// Records whose external key is in the given set.
    KeyIn(Vec<String>),
}

impl QueryPredicate {
    /// Render the predicate as a store filter expression.
    pub fn to_filter(&self) -> Option<String> {
        match self {
            QueryPredicate::All => None,
            QueryPredicate::KeyIn(keys) => {
                let quoted: Vec<String> = keys
                    .iter()
                    .map(|k| format!("\"{}\"", k.replace('"', "\\\"")))
                    .collect();
                Some(format!("key in ({})", quoted.join(",")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_accessors() {
        let by_key = Reference::by_key(ResourceKind::Category, "c0");
        assert_eq!(by_key.key(), Some("c0"));
        assert_eq!(by_key.id(), None);
        assert!(!by_key.is_resolved());

        let by_id = Reference::by_id(ResourceKind::Category, "id-c0");
        assert_eq!(by_id.id(), Some("id-c0"));
        assert!(by_id.is_resolved());
    }

    #[test]
    fn key_in_predicate_renders_filter() {
        let predicate = QueryPredicate::KeyIn(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(predicate.to_filter().unwrap(), "key in (\"a\",\"b\")");
        assert_eq!(QueryPredicate::All.to_filter(), None);
    }

    #[test]
    fn update_action_serializes_tagged() {
        let action = UpdateAction::ChangeParent {
            parent_id: "id-c0".to_string(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "changeParent");
        assert_eq!(json["parent_id"], "id-c0");
    }
}
