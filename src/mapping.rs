//! Conversions between wire shapes and storage rows.

use crate::models::{
    AppAppearance, AppBehaviour, AppFields, AppItem, AppNetwork, AppRow, BoardItem, BoardSection, DesiredItem,
    GridPlacement, ItemData, ItemRow, LayoutItemRow, SectionKind, SectionPayload, SectionRow, StoredItem, WidgetItem,
    WidgetRow,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const OPTION_PATH_SEPARATOR: char = '.';

pub fn section_to_row(layout_id: &str, section: &SectionPayload) -> SectionRow {
    SectionRow {
        id: section.id.clone(),
        layout_id: layout_id.to_string(),
        kind: section.kind,
        position: section.position.to_index(),
        // Only categories carry a name.
        name: match section.kind {
            SectionKind::Category => section.name.clone(),
            _ => None,
        },
    }
}

pub fn section_from_row(row: &SectionRow, items: Vec<BoardItem>) -> BoardSection {
    BoardSection {
        id: row.id.clone(),
        kind: row.kind,
        position: row.position,
        name: row.name.clone(),
        items,
    }
}

pub fn item_to_desired(board_id: &str, layout_id: &str, section_id: &str, item: &BoardItem) -> DesiredItem {
    let (grid, data) = match item {
        BoardItem::App(app) => (app.placement, app_data(app)),
        BoardItem::Widget(widget) => (widget.placement, widget_data(widget)),
    };
    DesiredItem {
        item: ItemRow {
            id: item.id().to_string(),
            board_id: board_id.to_string(),
            kind: item.kind(),
        },
        placement: LayoutItemRow {
            item_id: item.id().to_string(),
            layout_id: layout_id.to_string(),
            section_id: section_id.to_string(),
            grid,
        },
        data,
    }
}

/// Every item of the submitted sections, mapped to rows and tagged with its section.
pub fn desired_items(board_id: &str, layout_id: &str, sections: &[SectionPayload]) -> Vec<DesiredItem> {
    sections
        .iter()
        .flat_map(|section| {
            section
                .items
                .iter()
                .map(move |item| item_to_desired(board_id, layout_id, &section.id, item))
        })
        .collect()
}

fn app_data(app: &AppItem) -> ItemData {
    ItemData::App {
        app: AppRow {
            item_id: app.id.clone(),
            fields: AppFields {
                name: app.name.clone(),
                description: app.description.clone(),
                internal_url: app.url.clone(),
                external_url: app.external_url.clone(),
                icon_url: app.icon_url.clone(),
                open_in_new_tab: app.behaviour.open_in_new_tab,
                tooltip_description: app.behaviour.tooltip_description.clone(),
                name_style: app.appearance.name_style,
                name_position: app.appearance.name_position,
                font_size: app.appearance.font_size,
                name_line_clamp: app.appearance.name_line_clamp,
                is_ping_enabled: app.network.ping_enabled,
            },
        },
        status_codes: app.network.status_codes.iter().copied().collect(),
    }
}

fn widget_data(widget: &WidgetItem) -> ItemData {
    ItemData::Widget {
        widget: WidgetRow {
            item_id: widget.id.clone(),
            sort: widget.sort.clone(),
        },
        options: flatten_options(&widget.options),
    }
}

pub fn item_from_stored(stored: &StoredItem) -> BoardItem {
    let placement = grid_or_default(stored.placement.as_ref());
    match &stored.data {
        ItemData::App { app, status_codes } => BoardItem::App(AppItem {
            id: stored.id.clone(),
            name: app.fields.name.clone(),
            url: app.fields.internal_url.clone(),
            external_url: app.fields.external_url.clone(),
            icon_url: app.fields.icon_url.clone(),
            description: app.fields.description.clone(),
            behaviour: AppBehaviour {
                open_in_new_tab: app.fields.open_in_new_tab,
                tooltip_description: app.fields.tooltip_description.clone(),
            },
            appearance: AppAppearance {
                name_style: app.fields.name_style,
                name_position: app.fields.name_position,
                font_size: app.fields.font_size,
                name_line_clamp: app.fields.name_line_clamp,
            },
            network: AppNetwork {
                ping_enabled: app.fields.is_ping_enabled,
                status_codes: status_codes.iter().copied().collect(),
            },
            placement,
        }),
        ItemData::Widget { widget, options } => BoardItem::Widget(WidgetItem {
            id: stored.id.clone(),
            sort: widget.sort.clone(),
            options: unflatten_options(options),
            placement,
        }),
    }
}

/// Flattens nested option objects into dot-joined key paths. Non-object
/// values and empty objects are leaves.
pub fn flatten_options(options: &Map<String, Value>) -> BTreeMap<String, Value> {
    let mut flat = BTreeMap::new();
    for (key, value) in options {
        flatten_into(key.clone(), value, &mut flat);
    }
    flat
}

fn flatten_into(path: String, value: &Value, flat: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(nested) if !nested.is_empty() => {
            for (key, child) in nested {
                flatten_into(format!("{}{}{}", path, OPTION_PATH_SEPARATOR, key), child, flat);
            }
        }
        leaf => {
            flat.insert(path, leaf.clone());
        }
    }
}

pub fn unflatten_options(flat: &BTreeMap<String, Value>) -> Map<String, Value> {
    let mut root = Map::new();
    for (path, value) in flat {
        let segments: Vec<&str> = path.split(OPTION_PATH_SEPARATOR).collect();
        insert_path(&mut root, &segments, value.clone());
    }
    root
}

fn insert_path(target: &mut Map<String, Value>, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        target.insert((*head).to_string(), value);
        return;
    }
    let entry = target
        .entry((*head).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(child) = entry {
        insert_path(child, rest, value);
    }
}

fn grid_or_default(placement: Option<&LayoutItemRow>) -> GridPlacement {
    placement.map(|row| row.grid).unwrap_or_default()
}
