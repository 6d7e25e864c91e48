//! Custom-field update action builders
//!
//! One builder exists per resource kind that supports custom-typed
//! metadata. Selection is an exhaustive match over `ResourceKind`, so
//! an unregistered kind is a compile-visible configuration fact, not
//! a runtime dispatch surprise; kinds without a builder surface
//! `UnsupportedResourceKind` before any draft is processed.

use std::collections::BTreeMap;

use keysync_store::{CustomFields, CustomFieldsDraft, ResourceKind, UpdateAction};

use crate::error::{Result, SyncError};

/// Constructors for the custom-metadata subset of update actions.
///
/// Kept as a trait so every supported resource kind carries its own
/// builder type; a kind with store-side quirks overrides only the
/// constructors it needs.
pub trait CustomActionBuilder {
    fn set_type_action(
        &self,
        type_id: &str,
        fields: &BTreeMap<String, serde_json::Value>,
    ) -> UpdateAction {
        UpdateAction::SetCustomType {
            type_id: type_id.to_string(),
            fields: fields.clone(),
        }
    }

    fn remove_type_action(&self) -> UpdateAction {
        UpdateAction::RemoveCustomType
    }

    fn set_field_action(&self, name: &str, value: &serde_json::Value) -> UpdateAction {
        UpdateAction::SetCustomField {
            name: name.to_string(),
            value: value.clone(),
        }
    }

    fn remove_field_action(&self, name: &str) -> UpdateAction {
        UpdateAction::RemoveCustomField {
            name: name.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct CategoryCustomActionBuilder;
#[derive(Debug)]
pub struct ChannelCustomActionBuilder;
#[derive(Debug)]
pub struct InventoryCustomActionBuilder;

impl CustomActionBuilder for CategoryCustomActionBuilder {}
impl CustomActionBuilder for ChannelCustomActionBuilder {}
impl CustomActionBuilder for InventoryCustomActionBuilder {}

/// The closed set of custom-field action builders, keyed by kind.
#[derive(Debug)]
pub enum CustomFieldActionBuilder {
    Category(CategoryCustomActionBuilder),
    Channel(ChannelCustomActionBuilder),
    Inventory(InventoryCustomActionBuilder),
}

impl CustomFieldActionBuilder {
    /// The builder for a resource kind, or `UnsupportedResourceKind`
    /// for kinds whose custom metadata the engine does not diff.
    pub fn for_kind(kind: ResourceKind) -> Result<Self> {
        match kind {
            ResourceKind::Category => Ok(Self::Category(CategoryCustomActionBuilder)),
            ResourceKind::Channel => Ok(Self::Channel(ChannelCustomActionBuilder)),
            ResourceKind::Inventory => Ok(Self::Inventory(InventoryCustomActionBuilder)),
            ResourceKind::Product => Err(SyncError::UnsupportedResourceKind { kind }),
        }
    }

    fn inner(&self) -> &dyn CustomActionBuilder {
        match self {
            Self::Category(builder) => builder,
            Self::Channel(builder) => builder,
            Self::Inventory(builder) => builder,
        }
    }

    /// Diff the custom-metadata sub-objects of an existing record and
    /// a desired draft into update actions.
    ///
    /// Cases, in order: desired has no custom metadata but existing
    /// does, detach; desired type differs from existing, set the
    /// desired type with its full field map (implicitly replacing all
    /// fields); types match, set changed or added fields and remove
    /// fields absent from desired.
    pub fn build_actions(
        &self,
        existing: Option<&CustomFields>,
        desired: Option<&CustomFieldsDraft>,
    ) -> Vec<UpdateAction> {
        let builder = self.inner();

        let desired = match desired {
            Some(desired) => desired,
            None => {
                return match existing {
                    Some(_) => vec![builder.remove_type_action()],
                    None => Vec::new(),
                };
            }
        };

        // The resolver guarantees a resolved type reference; a draft
        // that got here with an unresolved one has already failed.
        let desired_type_id = match desired.type_ref.id() {
            Some(id) => id,
            None => return Vec::new(),
        };

        let existing = match existing {
            Some(existing) if existing.type_id == desired_type_id => existing,
            _ => return vec![builder.set_type_action(desired_type_id, &desired.fields)],
        };

        let mut actions = Vec::new();
        for (name, value) in &desired.fields {
            if existing.fields.get(name) != Some(value) {
                actions.push(builder.set_field_action(name, value));
            }
        }
        for name in existing.fields.keys() {
            if !desired.fields.contains_key(name) {
                actions.push(builder.remove_field_action(name));
            }
        }
        actions
    }
}
