//! Turns a submitted layout into the row mutations that make storage match it.

pub mod changes;
pub mod diff;

use crate::errors::{AppResult, ValidationErrors};
use crate::mapping::{desired_items, section_to_row};
use crate::models::{DesiredItem, SectionPayload, SectionRow, StoredItem};
use changes::BoardChanges;
use std::collections::BTreeMap;

/// Stored state of one layout: its sections and every item of the board.
#[derive(Debug, Clone, Default)]
pub struct CurrentLayout {
    pub sections: Vec<SectionRow>,
    pub items: Vec<StoredItem>,
}

/// Desired rows of a save, derived once from the payload.
#[derive(Debug, Clone)]
pub struct DesiredLayout {
    pub sections: Vec<SectionRow>,
    pub items: Vec<DesiredItem>,
}

impl DesiredLayout {
    pub fn from_payload(board_id: &str, layout_id: &str, sections: &[SectionPayload]) -> Self {
        Self {
            sections: sections.iter().map(|section| section_to_row(layout_id, section)).collect(),
            items: desired_items(board_id, layout_id, sections),
        }
    }

    pub fn section_ids(&self) -> Vec<String> {
        self.sections.iter().map(|section| section.id.clone()).collect()
    }

    pub fn item_ids(&self) -> Vec<String> {
        self.items.iter().map(|item| item.item.id.clone()).collect()
    }
}

/// An item keeps its kind for life; a save that changes it is refused.
pub fn check_item_kinds(desired: &[DesiredItem], current: &[StoredItem]) -> AppResult<()> {
    let stored: BTreeMap<&str, &StoredItem> = current.iter().map(|item| (item.id.as_str(), item)).collect();
    let mut errors = ValidationErrors::default();
    for item in desired {
        if let Some(existing) = stored.get(item.item.id.as_str()) {
            let was = existing.data.kind();
            if was != item.item.kind {
                errors.push(
                    format!("items/{}", item.item.id),
                    format!("cannot change kind from {} to {}", was.as_str(), item.item.kind.as_str()),
                );
            }
        }
    }
    errors.into_result()
}

pub fn reconcile(desired: &DesiredLayout, current: &CurrentLayout) -> BoardChanges {
    diff::diff_sections(&desired.sections, &current.sections)
        .merge(diff::diff_apps(&desired.items, &current.items))
        .merge(diff::diff_widgets(&desired.items, &current.items))
}
