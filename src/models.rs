use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_STATUS_CODES: [u16; 6] = [200, 301, 302, 304, 307, 308];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutKind {
    Desktop,
    Mobile,
}

impl LayoutKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionKind {
    Category,
    /// Free grid row between categories.
    Row,
    SidebarLeft,
    SidebarRight,
}

impl SectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Row => "row",
            Self::SidebarLeft => "sidebar-left",
            Self::SidebarRight => "sidebar-right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionSide {
    Left,
    Right,
}

/// Section position as sent by clients: a grid index or a sidebar side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionPosition {
    Index(i64),
    Side(SectionSide),
}

impl SectionPosition {
    pub fn to_index(self) -> i64 {
        match self {
            Self::Index(index) => index,
            Self::Side(SectionSide::Left) => 0,
            Self::Side(SectionSide::Right) => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    App,
    Widget,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Widget => "widget",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NameStyle {
    #[default]
    Normal,
    Hover,
    Hidden,
}

impl NameStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Hover => "hover",
            Self::Hidden => "hidden",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NamePosition {
    #[default]
    Column,
    Row,
    ColumnReverse,
    RowReverse,
}

impl NamePosition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Column => "column",
            Self::Row => "row",
            Self::ColumnReverse => "column-reverse",
            Self::RowReverse => "row-reverse",
        }
    }
}

// ─── Wire shapes ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppBehaviour {
    pub open_in_new_tab: bool,
    pub tooltip_description: Option<String>,
}

impl Default for AppBehaviour {
    fn default() -> Self {
        Self {
            open_in_new_tab: true,
            tooltip_description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppAppearance {
    pub name_style: NameStyle,
    pub name_position: NamePosition,
    pub font_size: i64,
    pub name_line_clamp: i64,
}

impl Default for AppAppearance {
    fn default() -> Self {
        Self {
            name_style: NameStyle::Normal,
            name_position: NamePosition::Column,
            font_size: 16,
            name_line_clamp: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppNetwork {
    pub ping_enabled: bool,
    pub status_codes: Vec<u16>,
}

impl Default for AppNetwork {
    fn default() -> Self {
        Self {
            ping_enabled: true,
            status_codes: DEFAULT_STATUS_CODES.to_vec(),
        }
    }
}

/// Grid placement of an item. Missing x/y means the grid picks a free spot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridPlacement {
    pub x: Option<i64>,
    pub y: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppItem {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub behaviour: AppBehaviour,
    #[serde(default)]
    pub appearance: AppAppearance,
    #[serde(default)]
    pub network: AppNetwork,
    #[serde(flatten)]
    pub placement: GridPlacement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetItem {
    pub id: String,
    pub sort: String,
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
    #[serde(flatten)]
    pub placement: GridPlacement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BoardItem {
    App(AppItem),
    Widget(WidgetItem),
}

impl BoardItem {
    pub fn id(&self) -> &str {
        match self {
            Self::App(app) => &app.id,
            Self::Widget(widget) => &widget.id,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Self::App(_) => ItemKind::App,
            Self::Widget(_) => ItemKind::Widget,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionPayload {
    pub id: String,
    pub kind: SectionKind,
    pub position: SectionPosition,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub items: Vec<BoardItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveBoardPayload {
    pub board_id: String,
    pub layout_id: String,
    pub sections: Vec<SectionPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardByNamePayload {
    pub board_name: String,
    #[serde(default)]
    pub layout_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardNamePayload {
    pub board_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBoardPayload {
    pub board_name: String,
    #[serde(default)]
    pub page_title: Option<String>,
    #[serde(default)]
    pub allow_guests: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccessCustomization {
    pub allow_guests: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkCustomization {
    pub pings_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppearanceCustomization {
    pub opacity: Option<i64>,
    pub background_src: Option<String>,
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    pub shade: Option<i64>,
    pub custom_css: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageMetadataCustomization {
    pub page_title: Option<String>,
    pub meta_title: Option<String>,
    pub logo_src: Option<String>,
    pub favicon_src: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BoardCustomization {
    pub access: AccessCustomization,
    pub network: NetworkCustomization,
    pub appearance: AppearanceCustomization,
    pub page_metadata: PageMetadataCustomization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCustomizationPayload {
    pub board_name: String,
    pub customization: BoardCustomization,
}

// ─── Read models ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRecord {
    pub id: String,
    pub name: String,
    pub owner_id: Option<String>,
    pub allow_guests: bool,
    pub is_ping_enabled: bool,
    pub app_opacity: Option<i64>,
    pub background_image_url: Option<String>,
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    pub primary_shade: Option<i64>,
    pub custom_css: Option<String>,
    pub page_title: Option<String>,
    pub meta_title: Option<String>,
    pub logo_image_url: Option<String>,
    pub favicon_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRecord {
    pub id: String,
    pub board_id: String,
    pub name: String,
    pub kind: LayoutKind,
    pub show_left_sidebar: bool,
    pub show_right_sidebar: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSection {
    pub id: String,
    pub kind: SectionKind,
    pub position: i64,
    pub name: Option<String>,
    pub items: Vec<BoardItem>,
}

impl From<BoardSection> for SectionPayload {
    fn from(section: BoardSection) -> Self {
        Self {
            id: section.id,
            kind: section.kind,
            position: SectionPosition::Index(section.position),
            name: section.name,
            items: section.items,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    #[serde(flatten)]
    pub board: BoardRecord,
    pub layout_id: String,
    pub layout_name: String,
    pub layout_kind: LayoutKind,
    pub show_left_sidebar: bool,
    pub show_right_sidebar: bool,
    pub sections: Vec<BoardSection>,
}

impl BoardView {
    /// The save payload that reproduces this layout unchanged.
    pub fn to_save_payload(&self) -> SaveBoardPayload {
        SaveBoardPayload {
            board_id: self.board.id.clone(),
            layout_id: self.layout_id.clone(),
            sections: self.sections.iter().cloned().map(SectionPayload::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSummary {
    pub name: String,
    pub owner_id: Option<String>,
    pub count_apps: u32,
    pub count_widgets: u32,
    pub count_categories: u32,
}

// ─── Storage rows ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRow {
    pub id: String,
    pub layout_id: String,
    pub kind: SectionKind,
    pub position: i64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionPatch {
    pub kind: SectionKind,
    pub position: i64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRow {
    pub id: String,
    pub board_id: String,
    pub kind: ItemKind,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PlacementKey {
    pub item_id: String,
    pub layout_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementPatch {
    pub section_id: String,
    pub grid: GridPlacement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutItemRow {
    pub item_id: String,
    pub layout_id: String,
    pub section_id: String,
    pub grid: GridPlacement,
}

impl LayoutItemRow {
    pub fn key(&self) -> PlacementKey {
        PlacementKey {
            item_id: self.item_id.clone(),
            layout_id: self.layout_id.clone(),
        }
    }

    pub fn patch(&self) -> PlacementPatch {
        PlacementPatch {
            section_id: self.section_id.clone(),
            grid: self.grid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppFields {
    pub name: String,
    pub description: Option<String>,
    pub internal_url: String,
    pub external_url: Option<String>,
    pub icon_url: Option<String>,
    pub open_in_new_tab: bool,
    pub tooltip_description: Option<String>,
    pub name_style: NameStyle,
    pub name_position: NamePosition,
    pub font_size: i64,
    pub name_line_clamp: i64,
    pub is_ping_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRow {
    pub item_id: String,
    pub fields: AppFields,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StatusCodeRow {
    pub app_id: String,
    pub code: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetRow {
    pub item_id: String,
    pub sort: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct WidgetOptionKey {
    pub widget_id: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WidgetOptionRow {
    pub widget_id: String,
    pub path: String,
    pub value: serde_json::Value,
}

/// Kind specific part of a persisted or desired item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemData {
    App {
        app: AppRow,
        status_codes: BTreeSet<u16>,
    },
    Widget {
        widget: WidgetRow,
        options: BTreeMap<String, serde_json::Value>,
    },
}

impl ItemData {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::App { .. } => ItemKind::App,
            Self::Widget { .. } => ItemKind::Widget,
        }
    }
}

/// An item as loaded for a save: its placement in the target layout (if any)
/// and whether another layout of the board still places it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    pub id: String,
    pub placement: Option<LayoutItemRow>,
    pub placed_elsewhere: bool,
    pub data: ItemData,
}

/// An item as requested by a save, already mapped to storage rows.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredItem {
    pub item: ItemRow,
    pub placement: LayoutItemRow,
    pub data: ItemData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbolic_positions_map_to_fixed_indexes() {
        let left: SectionPosition = serde_json::from_value(serde_json::json!("left")).expect("left");
        let right: SectionPosition = serde_json::from_value(serde_json::json!("right")).expect("right");
        let index: SectionPosition = serde_json::from_value(serde_json::json!(4)).expect("index");
        assert_eq!(left.to_index(), 0);
        assert_eq!(right.to_index(), 1);
        assert_eq!(index.to_index(), 4);
    }

    #[test]
    fn app_item_fills_defaults_and_flattens_placement() {
        let item: BoardItem = serde_json::from_value(serde_json::json!({
            "id": "i1",
            "kind": "app",
            "name": "Plex",
            "url": "http://x",
            "x": 2,
            "y": 3
        }))
        .expect("app item");
        let BoardItem::App(app) = item else {
            panic!("expected app");
        };
        assert_eq!(app.placement.x, Some(2));
        assert_eq!(app.placement.width, None);
        assert!(app.behaviour.open_in_new_tab);
        assert_eq!(app.network.status_codes, DEFAULT_STATUS_CODES.to_vec());
    }

    #[test]
    fn section_kind_uses_kebab_case() {
        let kind: SectionKind = serde_json::from_value(serde_json::json!("sidebar-left")).expect("kind");
        assert_eq!(kind, SectionKind::SidebarLeft);
        assert_eq!(SectionKind::Row.as_str(), "row");
    }
}
