//! Keyed comparison of desired rows against stored rows.
//!
//! Each pass looks at one entity type and returns only the buckets it owns.
//! Items match against every stored item of the board so that an item placed
//! in another layout is reused instead of created twice.

use super::changes::{BoardChanges, ChangeSet, SetChanges, Update};
use crate::models::{
    DesiredItem, ItemData, ItemKind, SectionKind, SectionPatch, SectionRow, StatusCodeRow, StoredItem,
    WidgetOptionKey, WidgetOptionRow,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Desired and current rows split by key.
#[derive(Debug)]
pub struct Matched<'a, D, C> {
    pub created: Vec<&'a D>,
    pub kept: Vec<(&'a D, &'a C)>,
    pub removed: Vec<&'a C>,
}

pub fn match_by_key<'a, D, C, K, FD, FC>(
    desired: &'a [D],
    current: &'a [C],
    desired_key: FD,
    current_key: FC,
) -> Matched<'a, D, C>
where
    K: Ord,
    FD: Fn(&'a D) -> K,
    FC: Fn(&'a C) -> K,
{
    let by_key: BTreeMap<K, &'a C> = current.iter().map(|row| (current_key(row), row)).collect();
    let desired_keys: BTreeSet<K> = desired.iter().map(&desired_key).collect();

    let mut matched = Matched {
        created: Vec::new(),
        kept: Vec::new(),
        removed: Vec::new(),
    };
    for row in desired {
        match by_key.get(&desired_key(row)) {
            Some(existing) => matched.kept.push((row, *existing)),
            None => matched.created.push(row),
        }
    }
    matched.removed = current
        .iter()
        .filter(|row| !desired_keys.contains(&current_key(*row)))
        .collect();
    matched
}

fn section_changed(desired: &SectionRow, current: &SectionRow) -> bool {
    if desired.kind != current.kind || desired.position != current.position {
        return true;
    }
    desired.kind == SectionKind::Category && desired.name != current.name
}

pub fn diff_sections(desired: &[SectionRow], current: &[SectionRow]) -> BoardChanges {
    let matched = match_by_key(desired, current, |row| row.id.as_str(), |row| row.id.as_str());
    let mut changes = BoardChanges::default();
    changes.sections.create = matched.created.into_iter().cloned().collect();
    for (wanted, existing) in matched.kept {
        if section_changed(wanted, existing) {
            changes.sections.update.push(Update {
                target: existing.id.clone(),
                patch: SectionPatch {
                    kind: wanted.kind,
                    position: wanted.position,
                    name: wanted.name.clone(),
                },
            });
        }
    }
    changes.sections.delete = matched.removed.into_iter().map(|row| row.id.clone()).collect();
    changes
}

pub fn diff_apps(desired: &[DesiredItem], current: &[StoredItem]) -> BoardChanges {
    diff_items(ItemKind::App, desired, current)
}

pub fn diff_widgets(desired: &[DesiredItem], current: &[StoredItem]) -> BoardChanges {
    diff_items(ItemKind::Widget, desired, current)
}

fn diff_items(kind: ItemKind, desired: &[DesiredItem], current: &[StoredItem]) -> BoardChanges {
    let desired: Vec<&DesiredItem> = desired.iter().filter(|item| item.item.kind == kind).collect();
    let current: Vec<&StoredItem> = current.iter().filter(|item| item.data.kind() == kind).collect();
    let matched = match_by_key(&desired, &current, |item| item.item.id.as_str(), |item| item.id.as_str());

    let mut changes = BoardChanges::default();
    for wanted in matched.created {
        changes = changes.merge(create_item(wanted));
    }
    for (wanted, existing) in matched.kept {
        changes = changes.merge(update_item(wanted, existing));
    }
    for existing in matched.removed {
        // Items this layout never placed are left alone.
        let Some(placement) = &existing.placement else {
            continue;
        };
        if existing.placed_elsewhere {
            changes.layout_items.delete.push(placement.key());
        } else {
            changes.items.delete.push(existing.id.clone());
        }
    }
    changes
}

fn create_item(wanted: &DesiredItem) -> BoardChanges {
    let mut changes = BoardChanges::default();
    changes.items.create.push(wanted.item.clone());
    changes.layout_items.create.push(wanted.placement.clone());
    match &wanted.data {
        ItemData::App { app, status_codes } => {
            changes.apps.create.push(app.clone());
            changes.app_status_codes = diff_status_codes(&app.item_id, status_codes, &BTreeSet::new());
        }
        ItemData::Widget { widget, options } => {
            changes.widgets.create.push(widget.clone());
            changes.widget_options = diff_widget_options(&widget.item_id, options, &BTreeMap::new());
        }
    }
    changes
}

fn update_item(wanted: &DesiredItem, existing: &StoredItem) -> BoardChanges {
    let mut changes = BoardChanges::default();
    match &existing.placement {
        None => changes.layout_items.create.push(wanted.placement.clone()),
        Some(placement) if *placement != wanted.placement => changes.layout_items.update.push(Update {
            target: placement.key(),
            patch: wanted.placement.patch(),
        }),
        Some(_) => {}
    }

    match (&wanted.data, &existing.data) {
        (
            ItemData::App { app, status_codes },
            ItemData::App {
                app: stored_app,
                status_codes: stored_codes,
            },
        ) => {
            if app.fields != stored_app.fields {
                changes.apps.update.push(Update {
                    target: app.item_id.clone(),
                    patch: app.fields.clone(),
                });
            }
            changes.app_status_codes = diff_status_codes(&app.item_id, status_codes, stored_codes);
        }
        (
            ItemData::Widget { widget, options },
            ItemData::Widget {
                widget: stored_widget,
                options: stored_options,
            },
        ) => {
            if widget.sort != stored_widget.sort {
                changes.widgets.update.push(Update {
                    target: widget.item_id.clone(),
                    patch: widget.sort.clone(),
                });
            }
            changes.widget_options = diff_widget_options(&widget.item_id, options, stored_options);
        }
        // Kind changes are rejected before diffing.
        _ => {}
    }

    if !changes.is_empty() {
        changes.items.update.push(Update {
            target: existing.id.clone(),
            patch: (),
        });
    }
    changes
}

pub fn diff_status_codes(app_id: &str, desired: &BTreeSet<u16>, current: &BTreeSet<u16>) -> SetChanges<StatusCodeRow> {
    let row = |code: &u16| StatusCodeRow {
        app_id: app_id.to_string(),
        code: *code,
    };
    SetChanges {
        create: desired.difference(current).map(row).collect(),
        delete: current.difference(desired).map(row).collect(),
    }
}

pub fn diff_widget_options(
    widget_id: &str,
    desired: &BTreeMap<String, Value>,
    current: &BTreeMap<String, Value>,
) -> ChangeSet<WidgetOptionRow, WidgetOptionKey, Value> {
    let key = |path: &str| WidgetOptionKey {
        widget_id: widget_id.to_string(),
        path: path.to_string(),
    };
    let mut changes = ChangeSet::default();
    for (path, value) in desired {
        match current.get(path) {
            None => changes.create.push(WidgetOptionRow {
                widget_id: widget_id.to_string(),
                path: path.clone(),
                value: value.clone(),
            }),
            Some(stored) if stored != value => changes.update.push(Update {
                target: key(path),
                patch: value.clone(),
            }),
            Some(_) => {}
        }
    }
    changes.delete = current
        .keys()
        .filter(|path| !desired.contains_key(*path))
        .map(|path| key(path))
        .collect();
    changes
}
