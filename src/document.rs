//! In-memory SWOT document model.
//!
//! A document is a title plus four fixed categories, each holding an
//! ordered sequence of text items. Item position within its category is
//! the addressing key for edits and field locks. The nested shape lives
//! only in memory; [`SwotDocument::flatten`] produces the flat list the
//! storage API expects on save.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The closed set of SWOT categories.
///
/// The set is fixed for the lifetime of a document — only the item
/// sequences inside a category grow and shrink. Ordering of the variants
/// is the display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Strength,
    Weakness,
    Opportunity,
    Threat,
}

impl Category {
    /// All categories in display order.
    pub const ALL: [Category; 4] = [
        Category::Strength,
        Category::Weakness,
        Category::Opportunity,
        Category::Threat,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Strength => "Strength",
            Category::Weakness => "Weakness",
            Category::Opportunity => "Opportunity",
            Category::Threat => "Threat",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single text entry within a category.
///
/// `id` is the persisted identity assigned by the storage API on a prior
/// save; unsaved items have none. Content may be empty or whitespace-only
/// while a user is typing — such entries are excluded at save time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub content: String,
}

impl Item {
    pub fn unsaved(content: impl Into<String>) -> Self {
        Self { id: None, content: content.into() }
    }
}

/// One entry of the flat list the storage API accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub category: Category,
    pub content: String,
}

/// The in-memory collaborative document.
///
/// Created when an editing session opens — either from a persisted
/// snapshot or from [`SwotDocument::template`] — mutated by local edits
/// and accepted remote events, and written to durable storage only on an
/// explicit save.
#[derive(Debug, Clone, PartialEq)]
pub struct SwotDocument {
    /// Persisted identity, present once the document has been saved.
    pub id: Option<u64>,
    /// Owning project.
    pub project: u64,
    pub title: String,
    items: BTreeMap<Category, Vec<Item>>,
}

impl SwotDocument {
    /// A fresh unsaved document: empty title, one empty item per category.
    pub fn template(project: u64) -> Self {
        let mut items = BTreeMap::new();
        for category in Category::ALL {
            items.insert(category, vec![Item::unsaved("")]);
        }
        Self { id: None, project, title: String::new(), items }
    }

    /// Rebuild a document from a persisted flat item list.
    ///
    /// Items land in their categories in list order. Categories with no
    /// persisted items come back empty.
    pub fn from_parts(
        id: Option<u64>,
        project: u64,
        title: impl Into<String>,
        flat: impl IntoIterator<Item = FlatItem>,
    ) -> Self {
        let mut items: BTreeMap<Category, Vec<Item>> =
            Category::ALL.iter().map(|c| (*c, Vec::new())).collect();
        for entry in flat {
            items
                .get_mut(&entry.category)
                .expect("all categories pre-seeded")
                .push(Item { id: entry.id, content: entry.content });
        }
        Self { id, project, title: title.into(), items }
    }

    /// Items of one category, in insertion order.
    pub fn items(&self, category: Category) -> &[Item] {
        &self.items[&category]
    }

    /// Content at (category, index), if in range.
    pub fn content_at(&self, category: Category, index: usize) -> Option<&str> {
        self.items[&category].get(index).map(|i| i.content.as_str())
    }

    /// Overwrite content at (category, index). Returns false when the
    /// index is out of range for the current sequence (no auto-extension).
    pub fn set_content(&mut self, category: Category, index: usize, content: &str) -> bool {
        match self.items.get_mut(&category).and_then(|v| v.get_mut(index)) {
            Some(item) => {
                item.content = content.to_string();
                true
            }
            None => false,
        }
    }

    /// Append an empty item to a category. Returns its index.
    pub fn add_item(&mut self, category: Category) -> usize {
        let seq = self.items.get_mut(&category).expect("fixed category set");
        seq.push(Item::unsaved(""));
        seq.len() - 1
    }

    /// Remove the item at (category, index), shifting later items down.
    ///
    /// Indices of the items after it change; any field lock addressed by
    /// position is not re-keyed.
    pub fn remove_item(&mut self, category: Category, index: usize) -> Option<Item> {
        let seq = self.items.get_mut(&category).expect("fixed category set");
        if index < seq.len() {
            Some(seq.remove(index))
        } else {
            None
        }
    }

    /// Flatten to the storage API's list shape, category order then
    /// insertion order, dropping entries whose trimmed content is empty.
    pub fn flatten(&self) -> Vec<FlatItem> {
        let mut flat = Vec::new();
        for category in Category::ALL {
            for item in &self.items[&category] {
                if item.content.trim().is_empty() {
                    continue;
                }
                flat.push(FlatItem {
                    id: item.id,
                    category,
                    content: item.content.clone(),
                });
            }
        }
        flat
    }
}
