//! Loads persisted board state: the read model for clients and the current
//! layout state a save is diffed against.

use super::{board_by_name, layout_by_id, layouts_for_board, parse_text_enum, Database};
use crate::errors::{AppError, AppResult};
use crate::mapping::{item_from_stored, section_from_row};
use crate::models::{
    AppFields, AppRow, BoardItem, BoardRecord, BoardView, GridPlacement, ItemData, ItemKind, LayoutItemRow,
    LayoutRecord, SectionRow, StoredItem, WidgetRow,
};
use crate::reconcile::{CurrentLayout, DesiredLayout};
use rusqlite::{Connection, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet};

impl Database {
    /// Board plus one resolved layout with its sections and items.
    pub fn board_view(&self, board_name: &str, layout_id: Option<&str>) -> AppResult<BoardView> {
        let conn = self.conn()?;
        let board = board_by_name(&conn, board_name)?
            .ok_or_else(|| AppError::NotFound(format!("board '{}' not found", board_name)))?;
        let layouts = layouts_for_board(&conn, &board.id)?;
        let layout = resolve_layout(&board, layouts, layout_id)?;
        build_view(&conn, board, layout)
    }
}

/// The requested layout when it belongs to the board, otherwise the
/// desktop layout, otherwise the first one.
pub(crate) fn resolve_layout(
    board: &BoardRecord,
    layouts: Vec<LayoutRecord>,
    requested: Option<&str>,
) -> AppResult<LayoutRecord> {
    match requested {
        Some(layout_id) => layouts
            .into_iter()
            .find(|layout| layout.id == layout_id)
            .ok_or_else(|| AppError::NotFound(format!("layout '{}' not found on board '{}'", layout_id, board.name))),
        // Already ordered desktop first.
        None => layouts
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("board '{}' has no layouts", board.name))),
    }
}

/// The layout a save targets, checked to belong to `board_id`.
pub(crate) fn layout_for_save(conn: &Connection, board_id: &str, layout_id: &str) -> AppResult<LayoutRecord> {
    match layout_by_id(conn, layout_id)? {
        Some(layout) if layout.board_id == board_id => Ok(layout),
        _ => Err(AppError::NotFound(format!(
            "layout '{}' not found on board '{}'",
            layout_id, board_id
        ))),
    }
}

fn build_view(conn: &Connection, board: BoardRecord, layout: LayoutRecord) -> AppResult<BoardView> {
    let sections = load_sections(conn, &layout.id)?;
    let mut by_section: BTreeMap<String, Vec<BoardItem>> = BTreeMap::new();
    for stored in load_board_items(conn, &board.id, &layout.id)? {
        if let Some(placement) = &stored.placement {
            by_section
                .entry(placement.section_id.clone())
                .or_default()
                .push(item_from_stored(&stored));
        }
    }
    let sections = sections
        .iter()
        .map(|row| section_from_row(row, by_section.remove(&row.id).unwrap_or_default()))
        .collect();

    Ok(BoardView {
        board,
        layout_id: layout.id,
        layout_name: layout.name,
        layout_kind: layout.kind,
        show_left_sidebar: layout.show_left_sidebar,
        show_right_sidebar: layout.show_right_sidebar,
        sections,
    })
}

pub(crate) fn load_current_layout(conn: &Connection, board_id: &str, layout_id: &str) -> AppResult<CurrentLayout> {
    Ok(CurrentLayout {
        sections: load_sections(conn, layout_id)?,
        items: load_board_items(conn, board_id, layout_id)?,
    })
}

pub(crate) fn load_sections(conn: &Connection, layout_id: &str) -> AppResult<Vec<SectionRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, layout_id, kind, position, name
         FROM sections
         WHERE layout_id = ?1
         ORDER BY position ASC, id ASC",
    )?;
    let rows = stmt.query_map([layout_id], |row| {
        Ok(SectionRow {
            id: row.get(0)?,
            layout_id: row.get(1)?,
            kind: parse_text_enum(2, &row.get::<_, String>(2)?)?,
            position: row.get(3)?,
            name: row.get(4)?,
        })
    })?;
    let mut sections = Vec::new();
    for row in rows {
        sections.push(row?);
    }
    Ok(sections)
}

/// One joined row per board item; specialization columns are NULL for the other kind.
struct ItemJoinRow {
    id: String,
    kind: ItemKind,
    placement: Option<LayoutItemRow>,
    placed_elsewhere: bool,
    app: Option<AppFields>,
    sort: Option<String>,
}

/// Every item of the board, apps first, each annotated with its placement in
/// `layout_id` and whether any other layout places it.
pub(crate) fn load_board_items(conn: &Connection, board_id: &str, layout_id: &str) -> AppResult<Vec<StoredItem>> {
    let mut stmt = conn.prepare(
        "SELECT i.id, i.kind,
                li.section_id, li.x, li.y, li.width, li.height,
                EXISTS (SELECT 1 FROM layout_items o WHERE o.item_id = i.id AND o.layout_id <> ?2),
                a.name, a.description, a.internal_url, a.external_url, a.icon_url, a.open_in_new_tab,
                a.tooltip_description, a.name_style, a.name_position, a.font_size, a.name_line_clamp,
                a.is_ping_enabled,
                w.sort
         FROM items i
         LEFT JOIN layout_items li ON li.item_id = i.id AND li.layout_id = ?2
         LEFT JOIN apps a ON a.item_id = i.id
         LEFT JOIN widgets w ON w.item_id = i.id
         WHERE i.board_id = ?1
         ORDER BY i.kind ASC, i.created_at ASC, i.id ASC",
    )?;
    let rows = stmt.query_map([board_id, layout_id], |row| {
        let id: String = row.get(0)?;
        let section_id: Option<String> = row.get(2)?;
        let placement = section_id.map(|section_id| {
            Ok::<_, rusqlite::Error>(LayoutItemRow {
                item_id: id.clone(),
                layout_id: layout_id.to_string(),
                section_id,
                grid: GridPlacement {
                    x: row.get(3)?,
                    y: row.get(4)?,
                    width: row.get(5)?,
                    height: row.get(6)?,
                },
            })
        });
        let app = match row.get::<_, Option<String>>(8)? {
            Some(name) => Some(AppFields {
                name,
                description: row.get(9)?,
                internal_url: row.get(10)?,
                external_url: row.get(11)?,
                icon_url: row.get(12)?,
                open_in_new_tab: row.get(13)?,
                tooltip_description: row.get(14)?,
                name_style: parse_text_enum(15, &row.get::<_, String>(15)?)?,
                name_position: parse_text_enum(16, &row.get::<_, String>(16)?)?,
                font_size: row.get(17)?,
                name_line_clamp: row.get(18)?,
                is_ping_enabled: row.get(19)?,
            }),
            None => None,
        };
        Ok(ItemJoinRow {
            kind: parse_text_enum(1, &row.get::<_, String>(1)?)?,
            placement: placement.transpose()?,
            placed_elsewhere: row.get(7)?,
            app,
            sort: row.get(20)?,
            id,
        })
    })?;
    let mut joined = Vec::new();
    for row in rows {
        joined.push(row?);
    }

    let mut status_codes = load_status_codes(conn, board_id)?;
    let mut options = load_widget_options(conn, board_id)?;

    joined
        .into_iter()
        .map(|row| {
            let data = match (row.kind, row.app, row.sort) {
                (ItemKind::App, Some(fields), _) => ItemData::App {
                    status_codes: status_codes.remove(&row.id).unwrap_or_default(),
                    app: AppRow {
                        item_id: row.id.clone(),
                        fields,
                    },
                },
                (ItemKind::Widget, _, Some(sort)) => ItemData::Widget {
                    options: options.remove(&row.id).unwrap_or_default(),
                    widget: WidgetRow {
                        item_id: row.id.clone(),
                        sort,
                    },
                },
                (kind, _, _) => {
                    return Err(AppError::Internal(format!(
                        "item '{}' has no {} row",
                        row.id,
                        kind.as_str()
                    )))
                }
            };
            Ok(StoredItem {
                id: row.id,
                placement: row.placement,
                placed_elsewhere: row.placed_elsewhere,
                data,
            })
        })
        .collect()
}

fn load_status_codes(conn: &Connection, board_id: &str) -> AppResult<BTreeMap<String, BTreeSet<u16>>> {
    let mut stmt = conn.prepare(
        "SELECT s.app_id, s.code
         FROM app_status_codes s
         JOIN items i ON i.id = s.app_id
         WHERE i.board_id = ?1",
    )?;
    let rows = stmt.query_map([board_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u16>(1)?)))?;
    let mut codes: BTreeMap<String, BTreeSet<u16>> = BTreeMap::new();
    for row in rows {
        let (app_id, code) = row?;
        codes.entry(app_id).or_default().insert(code);
    }
    Ok(codes)
}

fn load_widget_options(
    conn: &Connection,
    board_id: &str,
) -> AppResult<BTreeMap<String, BTreeMap<String, serde_json::Value>>> {
    let mut stmt = conn.prepare(
        "SELECT o.widget_id, o.path, o.value_json
         FROM widget_options o
         JOIN items i ON i.id = o.widget_id
         WHERE i.board_id = ?1",
    )?;
    let rows = stmt.query_map([board_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    let mut options: BTreeMap<String, BTreeMap<String, serde_json::Value>> = BTreeMap::new();
    for row in rows {
        let (widget_id, path, raw) = row?;
        options
            .entry(widget_id)
            .or_default()
            .insert(path, serde_json::from_str(&raw)?);
    }
    Ok(options)
}

/// Rejects section ids that live under another layout and new item ids owned
/// by another board. Ids already in this layout or board pass.
pub(crate) fn ensure_ids_unclaimed(
    conn: &Connection,
    board_id: &str,
    layout_id: &str,
    desired: &DesiredLayout,
) -> AppResult<()> {
    let mut section_stmt = conn.prepare("SELECT layout_id FROM sections WHERE id = ?1")?;
    for section_id in desired.section_ids() {
        let owner: Option<String> = section_stmt
            .query_row([&section_id], |row| row.get(0))
            .optional()?;
        if let Some(owner) = owner.filter(|owner| owner != layout_id) {
            return Err(AppError::Conflict(format!(
                "section '{}' belongs to layout '{}'",
                section_id, owner
            )));
        }
    }

    let mut item_stmt = conn.prepare("SELECT board_id FROM items WHERE id = ?1")?;
    for item_id in desired.item_ids() {
        let owner: Option<String> = item_stmt.query_row([&item_id], |row| row.get(0)).optional()?;
        if let Some(owner) = owner.filter(|owner| owner != board_id) {
            return Err(AppError::Conflict(format!("item '{}' belongs to board '{}'", item_id, owner)));
        }
    }
    Ok(())
}
