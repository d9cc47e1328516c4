//! Applies a [`BoardChanges`] inside one SQLite transaction.
//!
//! The pipeline is an explicit list of steps. Parents are created before
//! children, updates run once every row exists, and deletes run last with
//! items removed before the sections that held them.

use super::board_query::{ensure_ids_unclaimed, layout_for_save, load_current_layout};
use super::Database;
use crate::errors::{AppError, AppResult};
use crate::reconcile::changes::BoardChanges;
use crate::reconcile::{check_item_kinds, reconcile, DesiredLayout};
use chrono::Utc;
use rusqlite::{params, Connection, Transaction};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStep {
    CreateSections,
    CreateItems,
    CreateLayoutItems,
    CreateApps,
    CreateAppStatusCodes,
    CreateWidgets,
    CreateWidgetOptions,
    UpdateSections,
    UpdateItems,
    UpdateLayoutItems,
    UpdateApps,
    UpdateWidgets,
    UpdateWidgetOptions,
    DeleteItems,
    DeleteLayoutItems,
    DeleteAppStatusCodes,
    DeleteWidgetOptions,
    DeleteSections,
}

pub const APPLY_ORDER: [ApplyStep; 18] = [
    ApplyStep::CreateSections,
    ApplyStep::CreateItems,
    ApplyStep::CreateLayoutItems,
    ApplyStep::CreateApps,
    ApplyStep::CreateAppStatusCodes,
    ApplyStep::CreateWidgets,
    ApplyStep::CreateWidgetOptions,
    ApplyStep::UpdateSections,
    ApplyStep::UpdateItems,
    ApplyStep::UpdateLayoutItems,
    ApplyStep::UpdateApps,
    ApplyStep::UpdateWidgets,
    ApplyStep::UpdateWidgetOptions,
    ApplyStep::DeleteItems,
    ApplyStep::DeleteLayoutItems,
    ApplyStep::DeleteAppStatusCodes,
    ApplyStep::DeleteWidgetOptions,
    ApplyStep::DeleteSections,
];

impl ApplyStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateSections => "create-sections",
            Self::CreateItems => "create-items",
            Self::CreateLayoutItems => "create-layout-items",
            Self::CreateApps => "create-apps",
            Self::CreateAppStatusCodes => "create-app-status-codes",
            Self::CreateWidgets => "create-widgets",
            Self::CreateWidgetOptions => "create-widget-options",
            Self::UpdateSections => "update-sections",
            Self::UpdateItems => "update-items",
            Self::UpdateLayoutItems => "update-layout-items",
            Self::UpdateApps => "update-apps",
            Self::UpdateWidgets => "update-widgets",
            Self::UpdateWidgetOptions => "update-widget-options",
            Self::DeleteItems => "delete-items",
            Self::DeleteLayoutItems => "delete-layout-items",
            Self::DeleteAppStatusCodes => "delete-app-status-codes",
            Self::DeleteWidgetOptions => "delete-widget-options",
            Self::DeleteSections => "delete-sections",
        }
    }

    /// Number of rows this step would touch.
    pub fn pending(self, changes: &BoardChanges) -> usize {
        match self {
            Self::CreateSections => changes.sections.create.len(),
            Self::CreateItems => changes.items.create.len(),
            Self::CreateLayoutItems => changes.layout_items.create.len(),
            Self::CreateApps => changes.apps.create.len(),
            Self::CreateAppStatusCodes => changes.app_status_codes.create.len(),
            Self::CreateWidgets => changes.widgets.create.len(),
            Self::CreateWidgetOptions => changes.widget_options.create.len(),
            Self::UpdateSections => changes.sections.update.len(),
            Self::UpdateItems => changes.items.update.len(),
            Self::UpdateLayoutItems => changes.layout_items.update.len(),
            Self::UpdateApps => changes.apps.update.len(),
            Self::UpdateWidgets => changes.widgets.update.len(),
            Self::UpdateWidgetOptions => changes.widget_options.update.len(),
            Self::DeleteItems => changes.items.delete.len(),
            Self::DeleteLayoutItems => changes.layout_items.delete.len(),
            Self::DeleteAppStatusCodes => changes.app_status_codes.delete.len(),
            Self::DeleteWidgetOptions => changes.widget_options.delete.len(),
            Self::DeleteSections => changes.sections.delete.len(),
        }
    }

    fn run(self, tx: &Transaction<'_>, changes: &BoardChanges, now: &str) -> rusqlite::Result<()> {
        match self {
            Self::CreateSections => {
                let mut stmt = tx.prepare(
                    "INSERT INTO sections (id, layout_id, kind, position, name, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for row in &changes.sections.create {
                    stmt.execute(params![row.id, row.layout_id, row.kind.as_str(), row.position, row.name, now])?;
                }
            }
            Self::CreateItems => {
                let mut stmt = tx.prepare(
                    "INSERT INTO items (id, board_id, kind, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                )?;
                for row in &changes.items.create {
                    stmt.execute(params![row.id, row.board_id, row.kind.as_str(), now])?;
                }
            }
            Self::CreateLayoutItems => {
                let mut stmt = tx.prepare(
                    "INSERT INTO layout_items (item_id, layout_id, section_id, x, y, width, height)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for row in &changes.layout_items.create {
                    stmt.execute(params![
                        row.item_id,
                        row.layout_id,
                        row.section_id,
                        row.grid.x,
                        row.grid.y,
                        row.grid.width,
                        row.grid.height,
                    ])?;
                }
            }
            Self::CreateApps => {
                let mut stmt = tx.prepare(
                    "INSERT INTO apps (
                       item_id, name, description, internal_url, external_url, icon_url, open_in_new_tab,
                       tooltip_description, name_style, name_position, font_size, name_line_clamp, is_ping_enabled
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                )?;
                for row in &changes.apps.create {
                    let fields = &row.fields;
                    stmt.execute(params![
                        row.item_id,
                        fields.name,
                        fields.description,
                        fields.internal_url,
                        fields.external_url,
                        fields.icon_url,
                        fields.open_in_new_tab,
                        fields.tooltip_description,
                        fields.name_style.as_str(),
                        fields.name_position.as_str(),
                        fields.font_size,
                        fields.name_line_clamp,
                        fields.is_ping_enabled,
                    ])?;
                }
            }
            Self::CreateAppStatusCodes => {
                let mut stmt = tx.prepare("INSERT INTO app_status_codes (app_id, code) VALUES (?1, ?2)")?;
                for row in &changes.app_status_codes.create {
                    stmt.execute(params![row.app_id, row.code])?;
                }
            }
            Self::CreateWidgets => {
                let mut stmt = tx.prepare("INSERT INTO widgets (item_id, sort) VALUES (?1, ?2)")?;
                for row in &changes.widgets.create {
                    stmt.execute(params![row.item_id, row.sort])?;
                }
            }
            Self::CreateWidgetOptions => {
                let mut stmt =
                    tx.prepare("INSERT INTO widget_options (widget_id, path, value_json) VALUES (?1, ?2, ?3)")?;
                for row in &changes.widget_options.create {
                    stmt.execute(params![row.widget_id, row.path, row.value.to_string()])?;
                }
            }
            Self::UpdateSections => {
                let mut stmt = tx.prepare(
                    "UPDATE sections SET kind = ?1, position = ?2, name = ?3, updated_at = ?4 WHERE id = ?5",
                )?;
                for update in &changes.sections.update {
                    let patch = &update.patch;
                    stmt.execute(params![patch.kind.as_str(), patch.position, patch.name, now, update.target])?;
                }
            }
            Self::UpdateItems => {
                let mut stmt = tx.prepare("UPDATE items SET updated_at = ?1 WHERE id = ?2")?;
                for update in &changes.items.update {
                    stmt.execute(params![now, update.target])?;
                }
            }
            Self::UpdateLayoutItems => {
                let mut stmt = tx.prepare(
                    "UPDATE layout_items SET section_id = ?1, x = ?2, y = ?3, width = ?4, height = ?5
                     WHERE item_id = ?6 AND layout_id = ?7",
                )?;
                for update in &changes.layout_items.update {
                    let patch = &update.patch;
                    stmt.execute(params![
                        patch.section_id,
                        patch.grid.x,
                        patch.grid.y,
                        patch.grid.width,
                        patch.grid.height,
                        update.target.item_id,
                        update.target.layout_id,
                    ])?;
                }
            }
            Self::UpdateApps => {
                let mut stmt = tx.prepare(
                    "UPDATE apps SET
                       name = ?1, description = ?2, internal_url = ?3, external_url = ?4, icon_url = ?5,
                       open_in_new_tab = ?6, tooltip_description = ?7, name_style = ?8, name_position = ?9,
                       font_size = ?10, name_line_clamp = ?11, is_ping_enabled = ?12
                     WHERE item_id = ?13",
                )?;
                for update in &changes.apps.update {
                    let fields = &update.patch;
                    stmt.execute(params![
                        fields.name,
                        fields.description,
                        fields.internal_url,
                        fields.external_url,
                        fields.icon_url,
                        fields.open_in_new_tab,
                        fields.tooltip_description,
                        fields.name_style.as_str(),
                        fields.name_position.as_str(),
                        fields.font_size,
                        fields.name_line_clamp,
                        fields.is_ping_enabled,
                        update.target,
                    ])?;
                }
            }
            Self::UpdateWidgets => {
                let mut stmt = tx.prepare("UPDATE widgets SET sort = ?1 WHERE item_id = ?2")?;
                for update in &changes.widgets.update {
                    stmt.execute(params![update.patch, update.target])?;
                }
            }
            Self::UpdateWidgetOptions => {
                let mut stmt =
                    tx.prepare("UPDATE widget_options SET value_json = ?1 WHERE widget_id = ?2 AND path = ?3")?;
                for update in &changes.widget_options.update {
                    stmt.execute(params![update.patch.to_string(), update.target.widget_id, update.target.path])?;
                }
            }
            Self::DeleteItems => {
                let mut stmt = tx.prepare("DELETE FROM items WHERE id = ?1")?;
                for id in &changes.items.delete {
                    stmt.execute([id])?;
                }
            }
            Self::DeleteLayoutItems => {
                let mut stmt = tx.prepare("DELETE FROM layout_items WHERE item_id = ?1 AND layout_id = ?2")?;
                for key in &changes.layout_items.delete {
                    stmt.execute(params![key.item_id, key.layout_id])?;
                }
            }
            Self::DeleteAppStatusCodes => {
                let mut stmt = tx.prepare("DELETE FROM app_status_codes WHERE app_id = ?1 AND code = ?2")?;
                for row in &changes.app_status_codes.delete {
                    stmt.execute(params![row.app_id, row.code])?;
                }
            }
            Self::DeleteWidgetOptions => {
                let mut stmt = tx.prepare("DELETE FROM widget_options WHERE widget_id = ?1 AND path = ?2")?;
                for key in &changes.widget_options.delete {
                    stmt.execute(params![key.widget_id, key.path])?;
                }
            }
            Self::DeleteSections => {
                let mut stmt = tx.prepare("DELETE FROM sections WHERE id = ?1")?;
                for id in &changes.sections.delete {
                    stmt.execute([id])?;
                }
            }
        }
        Ok(())
    }
}

/// Runs every step with pending rows, then commits unless `cancel` was raised.
/// Nothing is written when any step fails or the save was cancelled.
pub fn apply_changes(conn: &mut Connection, changes: &BoardChanges, cancel: &AtomicBool) -> AppResult<()> {
    if changes.is_empty() {
        return Ok(());
    }
    let now = Utc::now().to_rfc3339();
    let tx = conn.transaction()?;

    for step in APPLY_ORDER {
        let rows = step.pending(changes);
        if rows == 0 {
            continue;
        }
        step.run(&tx, changes, &now).map_err(|error| AppError::Transaction {
            step: step.as_str().to_string(),
            message: error.to_string(),
        })?;
        tracing::debug!(step = step.as_str(), rows, "apply step finished");
    }

    if cancel.load(Ordering::SeqCst) {
        tx.rollback()?;
        return Err(AppError::Cancelled("save cancelled before commit".to_string()));
    }
    tx.commit().map_err(|error| AppError::Transaction {
        step: "commit".to_string(),
        message: error.to_string(),
    })
}

impl Database {
    /// Load, check, diff and apply one layout save while holding the connection.
    pub fn save_layout(
        &self,
        board_id: &str,
        layout_id: &str,
        desired: &DesiredLayout,
        cancel: &AtomicBool,
    ) -> AppResult<BoardChanges> {
        let mut conn = self.conn()?;
        layout_for_save(&conn, board_id, layout_id)?;
        let current = load_current_layout(&conn, board_id, layout_id)?;
        check_item_kinds(&desired.items, &current.items)?;
        ensure_ids_unclaimed(&conn, board_id, layout_id, desired)?;

        let changes = reconcile(desired, &current);
        apply_changes(&mut conn, &changes, cancel)?;
        Ok(changes)
    }
}
