//! Pending row mutations produced by the diff passes.
//!
//! Every pass builds its own [`BoardChanges`]; passes are combined with
//! [`BoardChanges::merge`] and the result is handed once to the apply pipeline.

use crate::models::{
    AppFields, AppRow, ItemRow, LayoutItemRow, PlacementKey, PlacementPatch, SectionPatch, SectionRow, StatusCodeRow,
    WidgetOptionKey, WidgetOptionRow, WidgetRow,
};
use serde::Serialize;

/// An update addressed to one existing row.
#[derive(Debug, Clone, PartialEq)]
pub struct Update<K, P> {
    pub target: K,
    pub patch: P,
}

/// Create, update and delete buckets for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet<R, K, P> {
    pub create: Vec<R>,
    pub update: Vec<Update<K, P>>,
    pub delete: Vec<K>,
}

impl<R, K, P> Default for ChangeSet<R, K, P> {
    fn default() -> Self {
        Self {
            create: Vec::new(),
            update: Vec::new(),
            delete: Vec::new(),
        }
    }
}

impl<R, K, P> ChangeSet<R, K, P> {
    pub fn merge(mut self, other: Self) -> Self {
        self.create.extend(other.create);
        self.update.extend(other.update);
        self.delete.extend(other.delete);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// Specialization rows are removed by the item cascade, so they only create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChanges<R, K, P> {
    pub create: Vec<R>,
    pub update: Vec<Update<K, P>>,
}

impl<R, K, P> Default for RowChanges<R, K, P> {
    fn default() -> Self {
        Self {
            create: Vec::new(),
            update: Vec::new(),
        }
    }
}

impl<R, K, P> RowChanges<R, K, P> {
    pub fn merge(mut self, other: Self) -> Self {
        self.create.extend(other.create);
        self.update.extend(other.update);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty()
    }
}

/// Rows whose identity is their whole content: inserted or removed, never updated.
#[derive(Debug, Clone, PartialEq)]
pub struct SetChanges<R> {
    pub create: Vec<R>,
    pub delete: Vec<R>,
}

impl<R> Default for SetChanges<R> {
    fn default() -> Self {
        Self {
            create: Vec::new(),
            delete: Vec::new(),
        }
    }
}

impl<R> SetChanges<R> {
    pub fn merge(mut self, other: Self) -> Self {
        self.create.extend(other.create);
        self.delete.extend(other.delete);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardChanges {
    pub sections: ChangeSet<SectionRow, String, SectionPatch>,
    /// Item updates only bump `updated_at` when a dependent row changed.
    pub items: ChangeSet<ItemRow, String, ()>,
    pub layout_items: ChangeSet<LayoutItemRow, PlacementKey, PlacementPatch>,
    pub apps: RowChanges<AppRow, String, AppFields>,
    pub app_status_codes: SetChanges<StatusCodeRow>,
    pub widgets: RowChanges<WidgetRow, String, String>,
    pub widget_options: ChangeSet<WidgetOptionRow, WidgetOptionKey, serde_json::Value>,
}

impl BoardChanges {
    pub fn merge(self, other: Self) -> Self {
        Self {
            sections: self.sections.merge(other.sections),
            items: self.items.merge(other.items),
            layout_items: self.layout_items.merge(other.layout_items),
            apps: self.apps.merge(other.apps),
            app_status_codes: self.app_status_codes.merge(other.app_status_codes),
            widgets: self.widgets.merge(other.widgets),
            widget_options: self.widget_options.merge(other.widget_options),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
            && self.items.is_empty()
            && self.layout_items.is_empty()
            && self.apps.is_empty()
            && self.app_status_codes.is_empty()
            && self.widgets.is_empty()
            && self.widget_options.is_empty()
    }

    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            created: self.sections.create.len()
                + self.items.create.len()
                + self.layout_items.create.len()
                + self.apps.create.len()
                + self.app_status_codes.create.len()
                + self.widgets.create.len()
                + self.widget_options.create.len(),
            updated: self.sections.update.len()
                + self.items.update.len()
                + self.layout_items.update.len()
                + self.apps.update.len()
                + self.widgets.update.len()
                + self.widget_options.update.len(),
            deleted: self.sections.delete.len()
                + self.items.delete.len()
                + self.layout_items.delete.len()
                + self.app_status_codes.delete.len()
                + self.widget_options.delete.len(),
            sections_created: self.sections.create.len(),
            sections_updated: self.sections.update.len(),
            sections_deleted: self.sections.delete.len(),
            items_created: self.items.create.len(),
            items_deleted: self.items.delete.len(),
        }
    }
}

/// Row counts of one save, logged and returned to callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub sections_created: usize,
    pub sections_updated: usize,
    pub sections_deleted: usize,
    pub items_created: usize,
    pub items_deleted: usize,
}
