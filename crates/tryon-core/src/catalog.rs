//! Catalog reference data and the selection layer over it.
//!
//! The catalog itself is owned by the backend; this module only describes
//! the items it returns, filters them the way the selection panel does, and
//! marks categories that can no longer be picked because they are worn.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Category value for tops.
pub const UPPER_BODY: &str = "upper_body";
/// Category value for bottoms.
pub const LOWER_BODY: &str = "lower_body";
/// Category value for footwear.
pub const SHOES: &str = "shoes";

/// Category filters offered by the selection panel, with display labels.
pub const CATEGORY_LABELS: [(&str, &str); 3] =
    [(UPPER_BODY, "Tops"), (LOWER_BODY, "Bottoms"), (SHOES, "Shoes")];

/// Gender filters offered by the selection panel, with display labels.
pub const GENDER_LABELS: [(&str, &str); 2] = [("women", "Women"), ("men", "Men")];

/// A garment in the catalog. Read-only reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Catalog-wide identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Composition category (e.g. `upper_body`).
    pub category: String,
    /// Finer-grained kind (e.g. `t-shirt`).
    #[serde(default)]
    pub subcategory: String,
    /// Dominant colour.
    #[serde(default)]
    pub color: String,
    /// Style tags.
    #[serde(default)]
    pub style: Vec<String>,
    /// Server-relative path of the garment image.
    pub image_path: String,
    /// Free-text description passed to the composition backend.
    #[serde(default)]
    pub description: String,
    /// Target gender (`women`, `men`), may be empty.
    #[serde(default)]
    pub gender: String,
    /// Brand name, may be empty.
    #[serde(default)]
    pub brand: String,
}

/// A follow-up suggestion returned by the recommendation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationItem {
    /// Catalog identifier of the suggested item.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Server-relative image path.
    pub image_url: String,
    /// Composition category.
    pub category: String,
    /// Why the item complements the outfit.
    pub reason: String,
}

/// Category and gender filter; `None` means "all".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    /// Restrict to one category.
    pub category: Option<String>,
    /// Restrict to one gender.
    pub gender: Option<String>,
}

impl CatalogFilter {
    /// Creates a filter for a single category.
    #[must_use]
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            gender: None,
        }
    }

    /// Adds a gender restriction.
    #[must_use]
    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    /// Returns `true` if the item passes this filter.
    ///
    /// Empty filter strings behave like "all".
    #[must_use]
    pub fn matches(&self, item: &CatalogItem) -> bool {
        let category_ok = self
            .category
            .as_deref()
            .filter(|c| !c.is_empty())
            .map_or(true, |c| item.category == c);
        let gender_ok = self
            .gender
            .as_deref()
            .filter(|g| !g.is_empty())
            .map_or(true, |g| item.gender == g);
        category_ok && gender_ok
    }

    /// Applies the filter to a slice of items.
    #[must_use]
    pub fn apply<'a>(&self, items: &'a [CatalogItem]) -> Vec<&'a CatalogItem> {
        items.iter().filter(|item| self.matches(item)).collect()
    }
}

/// A catalog item as presented for selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry<'a> {
    /// The underlying item.
    pub item: &'a CatalogItem,
    /// `false` when the item's category is already worn.
    pub selectable: bool,
    /// `true` when this is the pending selection.
    pub selected: bool,
}

/// Builds the selection view: filtered items with worn categories disabled.
#[must_use]
pub fn selectable_entries<'a, 'w>(
    items: &'a [CatalogItem],
    filter: &CatalogFilter,
    worn_categories: impl IntoIterator<Item = &'w str>,
    selected_id: Option<&str>,
) -> Vec<CatalogEntry<'a>> {
    let worn: HashSet<&str> = worn_categories.into_iter().collect();
    filter
        .apply(items)
        .into_iter()
        .map(|item| CatalogEntry {
            item,
            selectable: !worn.contains(item.category.as_str()),
            selected: selected_id == Some(item.id.as_str()),
        })
        .collect()
}

/// Finds a catalog item by id, e.g. to resolve a clicked recommendation.
#[must_use]
pub fn find_by_id<'a>(items: &'a [CatalogItem], id: &str) -> Option<&'a CatalogItem> {
    items.iter().find(|item| item.id == id)
}

/// Joins the backend base URL, static prefix, and a server-relative image path.
#[must_use]
pub fn static_image_url(base_url: &str, static_path: &str, image_path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let prefix = static_path.trim_matches('/');
    let path = image_path.trim_start_matches('/');
    if prefix.is_empty() {
        format!("{base}/{path}")
    } else {
        format!("{base}/{prefix}/{path}")
    }
}
