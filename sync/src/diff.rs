//! Diff builder computing the update actions that converge an
//! existing record to a desired draft
//!
//! Pure: no network or cache access, only the two inputs and the
//! removal-policy flags. Action order is fixed: scalar and localized
//! content, then the identity-establishing parent, then properties,
//! then collection actions, then custom-field actions last, so
//! dependent actions never precede their prerequisites.

use std::collections::HashSet;

use keysync_store::{Draft, ExistingRecord, LocalizedText, Reference, UpdateAction};

use crate::custom::CustomFieldActionBuilder;
use crate::error::Result;
use crate::options::SyncOptions;

/// Compute the ordered update actions transforming `existing` into
/// the state described by `desired`. An empty result means the record
/// is already up to date.
pub fn build_actions(
    existing: &ExistingRecord,
    desired: &Draft,
    options: &SyncOptions,
) -> Result<Vec<UpdateAction>> {
    let mut actions = Vec::new();

    diff_localized(
        "name",
        Some(&existing.name),
        Some(&desired.name),
        options.remove_other_locales,
        &mut actions,
    );
    diff_localized(
        "description",
        existing.description.as_ref(),
        desired.description.as_ref(),
        options.remove_other_locales,
        &mut actions,
    );

    diff_parent(existing, desired, &mut actions);
    diff_properties(existing, desired, options, &mut actions);
    diff_assignments(existing, desired, options, &mut actions);
    diff_entries(existing, desired, options, &mut actions);

    let custom_builder = CustomFieldActionBuilder::for_kind(existing.kind)?;
    actions.extend(custom_builder.build_actions(existing.custom.as_ref(), desired.custom.as_ref()));

    Ok(actions)
}

/// Identity: re-parent when the desired parent differs. A draft
/// without a parent leaves the existing parent untouched; parents are
/// never removed by a diff.
fn diff_parent(existing: &ExistingRecord, desired: &Draft, actions: &mut Vec<UpdateAction>) {
    let desired_parent_id = desired.parent.as_ref().and_then(Reference::id);
    if let Some(parent_id) = desired_parent_id {
        if existing.parent_id.as_deref() != Some(parent_id) {
            actions.push(UpdateAction::ChangeParent {
                parent_id: parent_id.to_string(),
            });
        }
    }
}

/// Per-locale diff of one localized text field. Locales absent from
/// the desired side are removed only under the remove-other-locales
/// policy; an absent desired field counts as having no locales.
fn diff_localized(
    field: &str,
    existing: Option<&LocalizedText>,
    desired: Option<&LocalizedText>,
    remove_other_locales: bool,
    actions: &mut Vec<UpdateAction>,
) {
    let empty = LocalizedText::new();
    let existing = existing.unwrap_or(&empty);
    let desired = desired.unwrap_or(&empty);

    for (locale, value) in desired {
        if existing.get(locale) != Some(value) {
            actions.push(UpdateAction::SetLocalizedValue {
                field: field.to_string(),
                locale: locale.clone(),
                value: value.clone(),
            });
        }
    }

    if remove_other_locales {
        for locale in existing.keys() {
            if !desired.contains_key(locale) {
                actions.push(UpdateAction::RemoveLocalizedValue {
                    field: field.to_string(),
                    locale: locale.clone(),
                });
            }
        }
    }
}

fn diff_properties(
    existing: &ExistingRecord,
    desired: &Draft,
    options: &SyncOptions,
    actions: &mut Vec<UpdateAction>,
) {
    for (name, value) in &desired.properties {
        if existing.properties.get(name) != Some(value) {
            actions.push(UpdateAction::SetProperty {
                name: name.clone(),
                value: value.clone(),
            });
        }
    }

    if options.remove_other_properties {
        for name in existing.properties.keys() {
            if !desired.properties.contains_key(name) {
                actions.push(UpdateAction::RemoveProperty { name: name.clone() });
            }
        }
    }
}

/// Unordered set diff by identity. References still unresolved after
/// resolution are skipped: their entries stay unchanged on the record.
fn diff_assignments(
    existing: &ExistingRecord,
    desired: &Draft,
    options: &SyncOptions,
    actions: &mut Vec<UpdateAction>,
) {
    let desired_ids: Vec<&str> = desired.assignments.iter().filter_map(Reference::id).collect();
    let desired_set: HashSet<&str> = desired_ids.iter().copied().collect();
    let existing_set: HashSet<&str> = existing.assignment_ids.iter().map(String::as_str).collect();

    for id in &desired_ids {
        if !existing_set.contains(id) {
            actions.push(UpdateAction::AddAssignment { id: id.to_string() });
        }
    }

    if options.remove_other_set_entries {
        for id in &existing.assignment_ids {
            if !desired_set.contains(id.as_str()) {
                actions.push(UpdateAction::RemoveAssignment { id: id.clone() });
            }
        }
    }
}

/// Ordered collection diff: identity first (add/remove), then
/// position. A reorder action is emitted only when elements present
/// on both sides occur in a different relative order.
fn diff_entries(
    existing: &ExistingRecord,
    desired: &Draft,
    options: &SyncOptions,
    actions: &mut Vec<UpdateAction>,
) {
    let desired_ids: Vec<&str> = desired.entries.iter().filter_map(Reference::id).collect();
    let desired_set: HashSet<&str> = desired_ids.iter().copied().collect();
    let existing_set: HashSet<&str> = existing.entry_ids.iter().map(String::as_str).collect();

    for id in &desired_ids {
        if !existing_set.contains(id) {
            actions.push(UpdateAction::AddEntry { id: id.to_string() });
        }
    }

    if options.remove_other_collection_entries {
        for id in &existing.entry_ids {
            if !desired_set.contains(id.as_str()) {
                actions.push(UpdateAction::RemoveEntry { id: id.clone() });
            }
        }
    }

    let common_in_existing: Vec<&str> = existing
        .entry_ids
        .iter()
        .map(String::as_str)
        .filter(|id| desired_set.contains(id))
        .collect();
    let common_in_desired: Vec<&str> = desired_ids
        .iter()
        .copied()
        .filter(|id| existing_set.contains(id))
        .collect();

    if common_in_existing != common_in_desired {
        // The reorder must describe the full post-diff collection:
        // entries retained under the no-removal policy keep their
        // place after the desired ones instead of being dropped.
        let mut ids: Vec<String> = desired_ids.iter().map(|id| id.to_string()).collect();
        if !options.remove_other_collection_entries {
            ids.extend(
                existing
                    .entry_ids
                    .iter()
                    .filter(|id| !desired_set.contains(id.as_str()))
                    .cloned(),
            );
        }
        actions.push(UpdateAction::ReorderEntries { ids });
    }
}
