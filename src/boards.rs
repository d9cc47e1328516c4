use crate::config::ServiceConfig;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{
    BoardByNamePayload, BoardRecord, BoardSummary, BoardView, CreateBoardPayload, LayoutKind, LayoutRecord,
    SaveBoardPayload, UpdateCustomizationPayload,
};
use crate::reconcile::changes::ChangeSummary;
use crate::reconcile::DesiredLayout;
use crate::validation::{check_board_name, check_save_payload, is_mobile_user_agent};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Caller identity passed in by the transport; authentication happens upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestContext {
    pub user_id: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn is_mobile(&self) -> bool {
        self.user_agent.as_deref().map(is_mobile_user_agent).unwrap_or(false)
    }
}

/// Raises the flag when the owning future is dropped before the save finished.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct BoardService {
    db: Arc<Database>,
}

impl BoardService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn open(config: &ServiceConfig) -> AppResult<Self> {
        let db = Database::new(&config.database_path())?;
        tracing::info!(path = %db.path().display(), "board database ready");
        Ok(Self::new(Arc::new(db)))
    }

    async fn blocking<T, F>(&self, work: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> AppResult<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || work(db.as_ref())).await?
    }

    pub async fn by_name(&self, payload: BoardByNamePayload) -> AppResult<BoardView> {
        self.blocking(move |db| db.board_view(&payload.board_name, payload.layout_id.as_deref()))
            .await
    }

    pub async fn by_name_simple(&self, board_name: String) -> AppResult<BoardRecord> {
        self.blocking(move |db| {
            db.board_by_name(&board_name)?
                .ok_or_else(|| AppError::NotFound(format!("board '{}' not found", board_name)))
        })
        .await
    }

    /// Reconciles one layout of a board with the submitted sections.
    pub async fn save(&self, payload: SaveBoardPayload) -> AppResult<ChangeSummary> {
        check_save_payload(&payload)?;
        let board_id = payload.board_id.clone();
        let layout_id = payload.layout_id.clone();
        let desired = DesiredLayout::from_payload(&payload.board_id, &payload.layout_id, &payload.sections);

        let cancel = Arc::new(AtomicBool::new(false));
        let _cancel_on_drop = CancelOnDrop(cancel.clone());
        let result = {
            let board_id = board_id.clone();
            let layout_id = layout_id.clone();
            self.blocking(move |db| db.save_layout(&board_id, &layout_id, &desired, &cancel))
                .await
        };

        match result {
            Ok(changes) => {
                let summary = changes.summary();
                tracing::info!(
                    board_id = %board_id,
                    layout_id = %layout_id,
                    created = summary.created,
                    updated = summary.updated,
                    deleted = summary.deleted,
                    sections_created = summary.sections_created,
                    sections_deleted = summary.sections_deleted,
                    items_created = summary.items_created,
                    items_deleted = summary.items_deleted,
                    "board saved"
                );
                Ok(summary)
            }
            Err(error) => {
                tracing::warn!(board_id = %board_id, layout_id = %layout_id, error = %error, "board save failed");
                Err(error)
            }
        }
    }

    /// Creates the board with its layouts and returns the layout the caller should open.
    pub async fn create(&self, payload: CreateBoardPayload, context: RequestContext) -> AppResult<LayoutRecord> {
        check_board_name(&payload.board_name)?;
        let wanted = if context.is_mobile() {
            LayoutKind::Mobile
        } else {
            LayoutKind::Desktop
        };
        let created = self
            .blocking(move |db| {
                db.create_board(
                    &payload.board_name,
                    context.user_id.as_deref(),
                    payload.page_title.as_deref(),
                    payload.allow_guests,
                )
            })
            .await?;
        tracing::info!(board_id = %created.board.id, name = %created.board.name, "board created");
        created
            .layout(wanted)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("board '{}' has no {} layout", created.board.name, wanted.as_str())))
    }

    pub async fn update_customization(&self, payload: UpdateCustomizationPayload) -> AppResult<BoardRecord> {
        check_board_name(&payload.board_name)?;
        let board = self
            .blocking(move |db| {
                db.update_customization(&payload.board_name, &payload.customization)?
                    .ok_or_else(|| AppError::NotFound(format!("board '{}' not found", payload.board_name)))
            })
            .await?;
        tracing::info!(board_id = %board.id, "board customization updated");
        Ok(board)
    }

    pub async fn check_name_available(&self, board_name: String) -> AppResult<bool> {
        check_board_name(&board_name)?;
        self.blocking(move |db| Ok(!db.board_name_exists(&board_name)?)).await
    }

    pub async fn list(&self) -> AppResult<Vec<BoardSummary>> {
        self.blocking(|db| db.list_boards()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoardItem, SectionKind, SectionPayload, SectionPosition};
    use serde_json::json;

    struct Harness {
        _dir: tempfile::TempDir,
        service: BoardService,
        board_id: String,
        layout_id: String,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("boards.sqlite")).expect("db");
        let service = BoardService::new(Arc::new(db));
        let layout = service
            .create(
                CreateBoardPayload {
                    board_name: "home".to_string(),
                    page_title: Some("Home".to_string()),
                    allow_guests: false,
                },
                RequestContext::default(),
            )
            .await
            .expect("create");
        Harness {
            _dir: dir,
            service,
            board_id: layout.board_id.clone(),
            layout_id: layout.id,
        }
    }

    impl Harness {
        async fn save(&self, sections: serde_json::Value) -> AppResult<ChangeSummary> {
            self.service
                .save(SaveBoardPayload {
                    board_id: self.board_id.clone(),
                    layout_id: self.layout_id.clone(),
                    sections: serde_json::from_value(sections).expect("sections"),
                })
                .await
        }

        async fn view(&self) -> BoardView {
            self.service
                .by_name(BoardByNamePayload {
                    board_name: "home".to_string(),
                    layout_id: Some(self.layout_id.clone()),
                })
                .await
                .expect("view")
        }
    }

    fn media_with_plex() -> serde_json::Value {
        json!([
            { "id": "s1", "kind": "category", "position": 0, "name": "Media", "items": [
                { "id": "i1", "kind": "app", "name": "Plex", "url": "http://plex.local" }
            ] }
        ])
    }

    #[tokio::test]
    async fn create_returns_layout_for_the_callers_device() {
        let harness = harness().await;
        let board = harness.service.by_name_simple("home".to_string()).await.expect("board");
        assert_eq!(board.page_title.as_deref(), Some("Home"));

        let mobile = harness
            .service
            .create(
                CreateBoardPayload {
                    board_name: "phone".to_string(),
                    page_title: None,
                    allow_guests: true,
                },
                RequestContext {
                    user_id: Some("user-7".to_string()),
                    user_agent: Some("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148".to_string()),
                },
            )
            .await
            .expect("create mobile");
        assert_eq!(mobile.kind, LayoutKind::Mobile);

        let boards = harness.service.list().await.expect("list");
        assert_eq!(boards.len(), 2);
        assert_eq!(boards[1].owner_id.as_deref(), Some("user-7"));
        assert!(!harness.service.check_name_available("phone".to_string()).await.expect("check"));
        assert!(harness.service.check_name_available("tablet".to_string()).await.expect("check"));
    }

    #[tokio::test]
    async fn saving_an_empty_board_creates_section_item_and_app() {
        let harness = harness().await;
        let summary = harness.save(media_with_plex()).await.expect("save");
        assert_eq!(summary.sections_created, 1);
        assert_eq!(summary.items_created, 1);

        let view = harness.view().await;
        assert_eq!(view.sections.len(), 1);
        assert_eq!(view.sections[0].name.as_deref(), Some("Media"));
        let BoardItem::App(app) = &view.sections[0].items[0] else {
            panic!("expected app");
        };
        assert_eq!(app.name, "Plex");
        assert_eq!(app.network.status_codes.len(), 6);
    }

    #[tokio::test]
    async fn removing_an_app_deletes_only_its_item() {
        let harness = harness().await;
        harness.save(media_with_plex()).await.expect("first");
        let summary = harness
            .save(json!([{ "id": "s1", "kind": "category", "position": 0, "name": "Media", "items": [] }]))
            .await
            .expect("second");
        assert_eq!(summary.items_deleted, 1);
        assert_eq!(summary.sections_deleted, 0);
        assert_eq!(summary.sections_updated, 0);

        let view = harness.view().await;
        assert_eq!(view.sections.len(), 1);
        assert!(view.sections[0].items.is_empty());
    }

    #[tokio::test]
    async fn renaming_a_category_updates_one_section() {
        let harness = harness().await;
        harness.save(media_with_plex()).await.expect("first");
        let mut renamed = media_with_plex();
        renamed[0]["name"] = json!("Movies");
        let summary = harness.save(renamed).await.expect("rename");
        assert_eq!(summary.sections_updated, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.created + summary.deleted, 0);
        assert_eq!(harness.view().await.sections[0].name.as_deref(), Some("Movies"));
    }

    #[tokio::test]
    async fn symbolic_sidebar_positions_are_stored_as_indexes() {
        let harness = harness().await;
        harness
            .save(json!([
                { "id": "left", "kind": "sidebar-left", "position": "left", "items": [] },
                { "id": "right", "kind": "sidebar-right", "position": "right", "items": [] }
            ]))
            .await
            .expect("save");
        let view = harness.view().await;
        let positions: Vec<(String, i64)> = view
            .sections
            .iter()
            .map(|section| (section.id.clone(), section.position))
            .collect();
        assert_eq!(positions, vec![("left".to_string(), 0), ("right".to_string(), 1)]);
    }

    #[tokio::test]
    async fn resubmitting_the_read_model_changes_nothing() {
        let harness = harness().await;
        harness
            .save(json!([
                { "id": "s1", "kind": "category", "position": 0, "name": "Media", "items": [
                    { "id": "i1", "kind": "app", "name": "Plex", "url": "http://plex.local", "x": 0, "y": 0 },
                    { "id": "w1", "kind": "widget", "sort": "weather", "options": { "location": { "name": "Paris" } } }
                ] },
                { "id": "r1", "kind": "row", "position": 1, "items": [] }
            ]))
            .await
            .expect("save");
        let before = harness.view().await;
        let item_stamps = {
            let conn = harness.service.db.conn().expect("conn");
            let mut stmt = conn
                .prepare("SELECT id, updated_at FROM items ORDER BY id")
                .expect("prepare");
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
                .expect("query");
            rows.collect::<Result<Vec<_>, _>>().expect("rows")
        };

        let summary = harness
            .service
            .save(before.to_save_payload())
            .await
            .expect("resubmit");
        assert_eq!(summary, ChangeSummary::default());

        let after = harness.view().await;
        assert_eq!(after.board.updated_at, before.board.updated_at);
        assert_eq!(serde_json::to_value(&after.sections).expect("json"), serde_json::to_value(&before.sections).expect("json"));
        let conn = harness.service.db.conn().expect("conn");
        let mut stmt = conn
            .prepare("SELECT id, updated_at FROM items ORDER BY id")
            .expect("prepare");
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .expect("query");
        assert_eq!(rows.collect::<Result<Vec<_>, _>>().expect("rows"), item_stamps);
    }

    #[tokio::test]
    async fn moving_an_item_only_updates_its_placement() {
        let harness = harness().await;
        harness
            .save(json!([
                { "id": "s1", "kind": "category", "position": 0, "name": "Media", "items": [
                    { "id": "i1", "kind": "app", "name": "Plex", "url": "http://plex.local" }
                ] },
                { "id": "s2", "kind": "category", "position": 1, "name": "Tools", "items": [] }
            ]))
            .await
            .expect("save");
        let summary = harness
            .save(json!([
                { "id": "s1", "kind": "category", "position": 0, "name": "Media", "items": [] },
                { "id": "s2", "kind": "category", "position": 1, "name": "Tools", "items": [
                    { "id": "i1", "kind": "app", "name": "Plex", "url": "http://plex.local" }
                ] }
            ]))
            .await
            .expect("move");
        // Placement update plus the item touch.
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.created + summary.deleted, 0);
        let view = harness.view().await;
        assert!(view.sections[0].items.is_empty());
        assert_eq!(view.sections[1].items[0].id(), "i1");
    }

    #[tokio::test]
    async fn shared_item_survives_removal_from_one_layout() {
        let harness = harness().await;
        harness.save(media_with_plex()).await.expect("desktop save");
        let layouts = harness.service.db.layouts_for_board(&harness.board_id).expect("layouts");
        let mobile = layouts
            .iter()
            .find(|layout| layout.kind == LayoutKind::Mobile)
            .expect("mobile")
            .id
            .clone();

        let mobile_sections = json!([
            { "id": "m1", "kind": "category", "position": 0, "name": "Media", "items": [
                { "id": "i1", "kind": "app", "name": "Plex", "url": "http://plex.local", "width": 2 }
            ] }
        ]);
        let summary = harness
            .service
            .save(SaveBoardPayload {
                board_id: harness.board_id.clone(),
                layout_id: mobile.clone(),
                sections: serde_json::from_value(mobile_sections).expect("sections"),
            })
            .await
            .expect("mobile save");
        assert_eq!(summary.items_created, 0);

        harness
            .save(json!([{ "id": "s1", "kind": "category", "position": 0, "name": "Media", "items": [] }]))
            .await
            .expect("desktop removal");
        let mobile_view = harness
            .service
            .by_name(BoardByNamePayload {
                board_name: "home".to_string(),
                layout_id: Some(mobile),
            })
            .await
            .expect("mobile view");
        assert_eq!(mobile_view.sections[0].items.len(), 1);
        assert!(harness.view().await.sections[0].items.is_empty());
    }

    #[tokio::test]
    async fn rejected_saves_leave_storage_untouched() {
        let harness = harness().await;
        harness.save(media_with_plex()).await.expect("first");

        let kind_change = json!([
            { "id": "s1", "kind": "category", "position": 0, "name": "Media", "items": [
                { "id": "i1", "kind": "widget", "sort": "clock" }
            ] }
        ]);
        let error = harness.save(kind_change).await.expect_err("kind change");
        assert_eq!(error.code(), "VALIDATION_FAILED");

        let layouts = harness.service.db.layouts_for_board(&harness.board_id).expect("layouts");
        let mobile = layouts
            .iter()
            .find(|layout| layout.kind == LayoutKind::Mobile)
            .expect("mobile")
            .id
            .clone();
        let stolen = harness
            .service
            .save(SaveBoardPayload {
                board_id: harness.board_id.clone(),
                layout_id: mobile,
                sections: vec![SectionPayload {
                    id: "s1".to_string(),
                    kind: SectionKind::Category,
                    position: SectionPosition::Index(0),
                    name: Some("Media".to_string()),
                    items: vec![],
                }],
            })
            .await
            .expect_err("section of another layout");
        assert_eq!(stolen.code(), "CONFLICT");

        let missing = harness
            .service
            .save(SaveBoardPayload {
                board_id: "nope".to_string(),
                layout_id: harness.layout_id.clone(),
                sections: vec![],
            })
            .await
            .expect_err("missing board");
        assert_eq!(missing.code(), "NOT_FOUND");

        let view = harness.view().await;
        assert_eq!(view.sections.len(), 1);
        assert!(matches!(view.sections[0].items[0], BoardItem::App(_)));
    }

    #[tokio::test]
    async fn typed_save_of_nameless_category_writes_nothing() {
        let harness = harness().await;
        let error = harness
            .service
            .save(SaveBoardPayload {
                board_id: harness.board_id.clone(),
                layout_id: harness.layout_id.clone(),
                sections: vec![SectionPayload {
                    id: "s1".to_string(),
                    kind: SectionKind::Category,
                    position: SectionPosition::Index(0),
                    name: None,
                    items: vec![],
                }],
            })
            .await
            .expect_err("nameless category");
        assert_eq!(error.code(), "VALIDATION_FAILED");
        assert!(harness.view().await.sections.is_empty());
    }

    #[tokio::test]
    async fn resaving_float_widget_options_is_a_no_op() {
        let harness = harness().await;
        let sections = json!([
            { "id": "s1", "kind": "row", "position": 0, "items": [
                { "id": "w1", "kind": "widget", "sort": "weather", "options": {
                    "location": { "lat": 1.0715660391465826e-75, "lon": 2.3522219, "scale": 0.1 }
                } }
            ] }
        ]);
        harness.save(sections.clone()).await.expect("first");
        let before: String = harness
            .service
            .db
            .conn()
            .expect("conn")
            .query_row("SELECT updated_at FROM items WHERE id = 'w1'", [], |row| row.get(0))
            .expect("updated_at");

        let summary = harness.save(sections).await.expect("second");
        assert_eq!(summary, ChangeSummary::default());
        let after: String = harness
            .service
            .db
            .conn()
            .expect("conn")
            .query_row("SELECT updated_at FROM items WHERE id = 'w1'", [], |row| row.get(0))
            .expect("updated_at");
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn deleting_a_section_with_items_cascades() {
        let harness = harness().await;
        harness.save(media_with_plex()).await.expect("first");
        let summary = harness.save(json!([])).await.expect("clear");
        assert_eq!(summary.sections_deleted, 1);
        assert_eq!(summary.items_deleted, 1);
        let conn = harness.service.db.conn().expect("conn");
        for table in ["sections", "items", "apps", "layout_items", "app_status_codes"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(1) FROM {}", table), [], |row| row.get(0))
                .expect("count");
            assert_eq!(count, 0, "{} should be empty", table);
        }
    }

    #[tokio::test]
    async fn unknown_board_is_not_found() {
        let harness = harness().await;
        let error = harness
            .service
            .by_name(BoardByNamePayload {
                board_name: "missing".to_string(),
                layout_id: None,
            })
            .await
            .expect_err("missing");
        assert_eq!(error.code(), "NOT_FOUND");
        let error = harness
            .service
            .by_name_simple("missing".to_string())
            .await
            .expect_err("missing");
        assert_eq!(error.code(), "NOT_FOUND");
    }
}
