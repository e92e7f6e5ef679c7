// src/application/projection.rs
use crate::domain::{Note, NotebookId};
use icu_collator::{Collator, CollatorOptions};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Title,
    CreatedAt,
    UpdatedAt,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Title => f.write_str("title"),
            SortKey::CreatedAt => f.write_str("created"),
            SortKey::UpdatedAt => f.write_str("updated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// Search and sort parameters of the visible note list.
///
/// The visible list is always recomputed from the canonical list with these
/// parameters, never from a previous projection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewParams {
    query: String,
    active_sort: Option<(SortKey, SortDirection)>,
    // direction the next toggle of each key will apply
    next_title: SortDirection,
    next_created: SortDirection,
    next_updated: SortDirection,
}

impl ViewParams {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn active_sort(&self) -> Option<(SortKey, SortDirection)> {
        self.active_sort
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    /// Direction the next [`toggle_sort`](Self::toggle_sort) on `key` will apply.
    pub fn next_direction(&self, key: SortKey) -> SortDirection {
        match key {
            SortKey::Title => self.next_title,
            SortKey::CreatedAt => self.next_created,
            SortKey::UpdatedAt => self.next_updated,
        }
    }

    /// Sort by `key` in its remembered direction, then flip the remembered
    /// direction of that key only.
    pub fn toggle_sort(&mut self, key: SortKey) -> SortDirection {
        let slot = match key {
            SortKey::Title => &mut self.next_title,
            SortKey::CreatedAt => &mut self.next_created,
            SortKey::UpdatedAt => &mut self.next_updated,
        };
        let applied = *slot;
        *slot = applied.flipped();
        self.active_sort = Some((key, applied));
        applied
    }
}

/// Derive the visible list from the canonical one.
///
/// Trashed notes and notes outside `notebook` (when given) are excluded.
/// Without an active sort the canonical order is kept.
pub fn project(all_notes: &[Note], notebook: Option<NotebookId>, params: &ViewParams) -> Vec<Note> {
    let needle = params.query.to_lowercase();
    let mut visible: Vec<Note> = all_notes
        .iter()
        .filter(|n| !n.deleted)
        .filter(|n| notebook.map_or(true, |id| n.notebook_id == id))
        .filter(|n| needle.is_empty() || n.title.to_lowercase().contains(&needle))
        .cloned()
        .collect();

    if let Some((key, direction)) = params.active_sort {
        let collator = match key {
            SortKey::Title => title_collator(),
            _ => None,
        };
        visible.sort_by(|a, b| {
            let ord = compare_by(key, collator.as_ref(), a, b);
            let ord = match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            };
            ord.then_with(|| a.id.cmp(&b.id))
        });
    }
    visible
}

fn compare_by(key: SortKey, collator: Option<&Collator>, a: &Note, b: &Note) -> Ordering {
    match key {
        SortKey::Title => compare_titles(collator, &a.title, &b.title),
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    }
}

/// Root-locale collator for title sorting.
pub fn title_collator() -> Option<Collator> {
    match Collator::try_new(&Default::default(), CollatorOptions::new()) {
        Ok(collator) => Some(collator),
        Err(e) => {
            warn!(error = ?e, "Collator unavailable, sorting titles case-insensitively");
            None
        }
    }
}

/// Locale-aware comparison, so "Éclair" sorts between "apple" and "Zebra".
/// Without a collator titles are compared case-insensitively. The exact
/// string is the tie-break either way.
pub fn compare_titles(collator: Option<&Collator>, a: &str, b: &str) -> Ordering {
    let ord = match collator {
        Some(collator) => collator.compare(a, b),
        None => a.to_lowercase().cmp(&b.to_lowercase()),
    };
    ord.then_with(|| a.cmp(b))
}
