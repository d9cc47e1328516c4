pub mod apply;
pub mod board_query;

use crate::errors::{AppError, AppResult};
use crate::models::{BoardCustomization, BoardRecord, BoardSummary, LayoutKind, LayoutRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const BOARD_COLUMNS: &str = "id, name, owner_id, allow_guests, is_ping_enabled, app_opacity, background_image_url,
     primary_color, secondary_color, primary_shade, custom_css, page_title, meta_title, logo_image_url,
     favicon_image_url, created_at, updated_at";

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

/// A freshly created board with both of its layouts.
#[derive(Debug, Clone)]
pub struct CreatedBoard {
    pub board: BoardRecord,
    pub layouts: Vec<LayoutRecord>,
}

impl CreatedBoard {
    pub fn layout(&self, kind: LayoutKind) -> Option<&LayoutRecord> {
        self.layouts.iter().find(|layout| layout.kind == kind)
    }
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };

        db.ensure_schema_extensions()?;

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    pub fn create_board(
        &self,
        name: &str,
        owner_id: Option<&str>,
        page_title: Option<&str>,
        allow_guests: bool,
    ) -> AppResult<CreatedBoard> {
        let now = Utc::now();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if board_id_by_name(&tx, name)?.is_some() {
            return Err(AppError::Conflict(format!("board name '{}' is already taken", name)));
        }

        let board_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO boards (id, name, owner_id, allow_guests, is_ping_enabled, page_title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?6)",
            params![board_id, name, owner_id, allow_guests, page_title, now.to_rfc3339()],
        )?;

        let mut layouts = Vec::with_capacity(2);
        for (kind, layout_name) in [(LayoutKind::Desktop, "Desktop"), (LayoutKind::Mobile, "Mobile")] {
            layouts.push(insert_layout(&tx, &board_id, layout_name, kind, &now)?);
        }

        let board = board_by_id(&tx, &board_id)?
            .ok_or_else(|| AppError::Internal(format!("board '{}' vanished during creation", board_id)))?;
        tx.commit()?;

        Ok(CreatedBoard { board, layouts })
    }

    pub fn board_by_name(&self, name: &str) -> AppResult<Option<BoardRecord>> {
        let conn = self.conn()?;
        board_by_name(&conn, name)
    }

    pub fn board_by_id(&self, board_id: &str) -> AppResult<Option<BoardRecord>> {
        let conn = self.conn()?;
        board_by_id(&conn, board_id)
    }

    pub fn board_name_exists(&self, name: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        Ok(board_id_by_name(&conn, name)?.is_some())
    }

    pub fn layouts_for_board(&self, board_id: &str) -> AppResult<Vec<LayoutRecord>> {
        let conn = self.conn()?;
        layouts_for_board(&conn, board_id)
    }

    pub fn update_customization(
        &self,
        name: &str,
        customization: &BoardCustomization,
    ) -> AppResult<Option<BoardRecord>> {
        let conn = self.conn()?;
        let appearance = &customization.appearance;
        let metadata = &customization.page_metadata;
        let changed = conn.execute(
            "UPDATE boards SET
               allow_guests = ?1, is_ping_enabled = ?2, app_opacity = ?3, background_image_url = ?4,
               primary_color = ?5, secondary_color = ?6, primary_shade = ?7, custom_css = ?8,
               page_title = ?9, meta_title = ?10, logo_image_url = ?11, favicon_image_url = ?12,
               updated_at = ?13
             WHERE name = ?14",
            params![
                customization.access.allow_guests,
                customization.network.pings_enabled,
                appearance.opacity,
                appearance.background_src,
                appearance.primary_color,
                appearance.secondary_color,
                appearance.shade,
                appearance.custom_css,
                metadata.page_title,
                metadata.meta_title,
                metadata.logo_src,
                metadata.favicon_src,
                Utc::now().to_rfc3339(),
                name,
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        board_by_name(&conn, name)
    }

    /// Every board with its item counts. Categories are counted on the desktop layout.
    pub fn list_boards(&self) -> AppResult<Vec<BoardSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT b.name, b.owner_id,
               (SELECT COUNT(1) FROM items i WHERE i.board_id = b.id AND i.kind = 'app'),
               (SELECT COUNT(1) FROM items i WHERE i.board_id = b.id AND i.kind = 'widget'),
               (SELECT COUNT(1) FROM sections s JOIN layouts l ON l.id = s.layout_id
                 WHERE l.board_id = b.id AND l.kind = 'desktop' AND s.kind = 'category')
             FROM boards b
             ORDER BY b.name ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BoardSummary {
                name: row.get(0)?,
                owner_id: row.get(1)?,
                count_apps: row.get(2)?,
                count_widgets: row.get(3)?,
                count_categories: row.get(4)?,
            })
        })?;
        let mut boards = Vec::new();
        for row in rows {
            boards.push(row?);
        }
        Ok(boards)
    }

    fn ensure_schema_extensions(&self) -> AppResult<()> {
        let conn = self.conn()?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
    }
}

fn insert_layout(
    tx: &Transaction<'_>,
    board_id: &str,
    name: &str,
    kind: LayoutKind,
    now: &DateTime<Utc>,
) -> AppResult<LayoutRecord> {
    let id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO layouts (id, board_id, name, kind, show_left_sidebar, show_right_sidebar, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, 0, ?5)",
        params![id, board_id, name, kind.as_str(), now.to_rfc3339()],
    )?;
    Ok(LayoutRecord {
        id,
        board_id: board_id.to_string(),
        name: name.to_string(),
        kind,
        show_left_sidebar: false,
        show_right_sidebar: false,
    })
}

pub(crate) fn board_id_by_name(conn: &Connection, name: &str) -> AppResult<Option<String>> {
    let id = conn
        .query_row("SELECT id FROM boards WHERE name = ?1", [name], |row| row.get(0))
        .optional()?;
    Ok(id)
}

pub(crate) fn board_by_name(conn: &Connection, name: &str) -> AppResult<Option<BoardRecord>> {
    let sql = format!("SELECT {} FROM boards WHERE name = ?1", BOARD_COLUMNS);
    let board = conn.query_row(&sql, [name], parse_board_row).optional()?;
    Ok(board)
}

pub(crate) fn board_by_id(conn: &Connection, board_id: &str) -> AppResult<Option<BoardRecord>> {
    let sql = format!("SELECT {} FROM boards WHERE id = ?1", BOARD_COLUMNS);
    let board = conn.query_row(&sql, [board_id], parse_board_row).optional()?;
    Ok(board)
}

/// Layouts of a board, desktop first.
pub(crate) fn layouts_for_board(conn: &Connection, board_id: &str) -> AppResult<Vec<LayoutRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, board_id, name, kind, show_left_sidebar, show_right_sidebar
         FROM layouts
         WHERE board_id = ?1
         ORDER BY CASE kind WHEN 'desktop' THEN 0 ELSE 1 END, created_at ASC, id ASC",
    )?;
    let rows = stmt.query_map([board_id], parse_layout_row)?;
    let mut layouts = Vec::new();
    for row in rows {
        layouts.push(row?);
    }
    Ok(layouts)
}

pub(crate) fn layout_by_id(conn: &Connection, layout_id: &str) -> AppResult<Option<LayoutRecord>> {
    let layout = conn
        .query_row(
            "SELECT id, board_id, name, kind, show_left_sidebar, show_right_sidebar FROM layouts WHERE id = ?1",
            [layout_id],
            parse_layout_row,
        )
        .optional()?;
    Ok(layout)
}

fn parse_board_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BoardRecord> {
    Ok(BoardRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        allow_guests: row.get(3)?,
        is_ping_enabled: row.get(4)?,
        app_opacity: row.get(5)?,
        background_image_url: row.get(6)?,
        primary_color: row.get(7)?,
        secondary_color: row.get(8)?,
        primary_shade: row.get(9)?,
        custom_css: row.get(10)?,
        page_title: row.get(11)?,
        meta_title: row.get(12)?,
        logo_image_url: row.get(13)?,
        favicon_image_url: row.get(14)?,
        created_at: parse_time(&row.get::<_, String>(15)?)?,
        updated_at: parse_time(&row.get::<_, String>(16)?)?,
    })
}

fn parse_layout_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LayoutRecord> {
    Ok(LayoutRecord {
        id: row.get(0)?,
        board_id: row.get(1)?,
        name: row.get(2)?,
        kind: parse_text_enum(3, &row.get::<_, String>(3)?)?,
        show_left_sidebar: row.get(4)?,
        show_right_sidebar: row.get(5)?,
    })
}

/// Reads a text column into one of the kebab/lowercase serde enums of `models`.
pub(crate) fn parse_text_enum<T: serde::de::DeserializeOwned>(column: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown value '{}': {}", raw, error),
            )),
        )
    })
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}
