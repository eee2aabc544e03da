use std::path::Path;

use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::api::FurnitureSelection;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FurnitureItem {
    pub id: String,
    pub name: String,
    pub image: String,
    pub category: String,
}

impl FurnitureItem {
    pub fn selection(&self) -> FurnitureSelection {
        FurnitureSelection {
            id: self.id.clone(),
            name: self.name.clone(),
            image: self.image.clone(),
        }
    }

    fn matches(&self, filter: &CatalogFilter) -> bool {
        if let Some(category) = filter.category.as_deref() {
            if category != "all" && !self.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if let Some(search) = filter.search.as_deref() {
            let needle = search.trim().to_ascii_lowercase();
            if !needle.is_empty()
                && !self.name.to_ascii_lowercase().contains(&needle)
                && !self.id.to_ascii_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    pub category: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub id: String,
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct FurnitureCatalog {
    items: IndexMap<String, FurnitureItem>,
}

impl FurnitureCatalog {
    pub fn new(items: Option<IndexMap<String, FurnitureItem>>) -> Self {
        Self {
            items: items.unwrap_or_else(default_items),
        }
    }

    /// Loads a catalog from a JSON array of items. Later duplicates win.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading catalog {}", path.display()))?;
        let rows: Vec<FurnitureItem> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid catalog JSON in {}", path.display()))?;
        let mut items = IndexMap::new();
        for row in rows {
            items.insert(row.id.clone(), row);
        }
        Ok(Self::new(Some(items)))
    }

    pub fn get(&self, id: &str) -> Option<&FurnitureItem> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn list(&self, filter: &CatalogFilter) -> Vec<FurnitureItem> {
        self.items
            .values()
            .filter(|item| item.matches(filter))
            .cloned()
            .collect()
    }

    /// Category counts in first-seen order, led by an `all` row.
    pub fn categories(&self) -> Vec<CategorySummary> {
        let mut counts: IndexMap<String, usize> = IndexMap::new();
        for item in self.items.values() {
            *counts.entry(item.category.clone()).or_insert(0) += 1;
        }
        let mut out = vec![CategorySummary {
            id: "all".to_string(),
            name: "All".to_string(),
            count: self.items.len(),
        }];
        out.extend(counts.into_iter().map(|(id, count)| CategorySummary {
            name: category_display_name(&id),
            id,
            count,
        }));
        out
    }
}

impl Default for FurnitureCatalog {
    fn default() -> Self {
        Self::new(None)
    }
}

fn category_display_name(id: &str) -> String {
    match id {
        "living" => "Living Room".to_string(),
        "dining" => "Dining".to_string(),
        "bedroom" => "Bedroom".to_string(),
        "office" => "Office".to_string(),
        other => other.to_string(),
    }
}

fn default_items() -> IndexMap<String, FurnitureItem> {
    let mut map = IndexMap::new();

    let mut insert = |id: &str, name: &str, image: &str, category: &str| {
        map.insert(
            id.to_string(),
            FurnitureItem {
                id: id.to_string(),
                name: name.to_string(),
                image: image.to_string(),
                category: category.to_string(),
            },
        );
    };

    insert(
        "sofa-1",
        "Modern Sofa",
        "/lovable-uploads/7adc2304-b1d3-4933-bf4a-78b784a87b24.png",
        "living",
    );
    insert(
        "sofa-2",
        "Neutral Sofa",
        "src/assets/furniture/sofa-neutral.png",
        "living",
    );
    insert(
        "armchair-1",
        "Leather Armchair",
        "/lovable-uploads/94e616fa-2037-4802-98ad-22c97a8349b9.png",
        "living",
    );
    insert(
        "chair-1",
        "Neutral Chair",
        "src/assets/furniture/chair-neutral.png",
        "living",
    );
    insert(
        "coffee-table",
        "Coffee Table",
        "src/assets/furniture/coffee-table.png",
        "living",
    );
    insert(
        "round-coffee-table",
        "Round Coffee Table",
        "/lovable-uploads/5ada5843-ed84-4ab0-b0f1-1dd7c0c97530.png",
        "living",
    );
    insert(
        "side-table",
        "Side Table",
        "src/assets/furniture/side-table.png",
        "living",
    );
    insert(
        "tv-stand",
        "TV Stand",
        "src/assets/furniture/tv-stand.png",
        "living",
    );
    insert(
        "floor-lamp",
        "Floor Lamp",
        "/lovable-uploads/69630eb6-2e4b-4cbb-80fd-641b190f29a0.png",
        "living",
    );
    insert(
        "dining-table",
        "Dining Table",
        "src/assets/furniture/table-dining.png",
        "dining",
    );
    insert(
        "dining-table-set",
        "Dining Table Set",
        "/lovable-uploads/f08af0d5-bcfb-445a-86e7-230f0987274a.png",
        "dining",
    );
    insert(
        "modern-dining-table",
        "Modern Dining Table",
        "/lovable-uploads/f8145924-89f4-4d41-8da2-507042f0fa41.png",
        "dining",
    );
    insert(
        "elegant-dining-set",
        "Elegant Dining Set",
        "/lovable-uploads/14762623-97d1-404a-8b9a-5c0ea1c9fc58.png",
        "dining",
    );
    insert(
        "bed-1",
        "Queen Bed",
        "src/assets/furniture/bed-queen.png",
        "bedroom",
    );
    insert(
        "nightstand",
        "Nightstand",
        "src/assets/furniture/nightstand.png",
        "bedroom",
    );
    insert(
        "dresser",
        "Dresser",
        "src/assets/furniture/dresser.png",
        "bedroom",
    );
    insert(
        "table-lamp",
        "Table Lamp",
        "src/assets/furniture/table-lamp.png",
        "bedroom",
    );
    insert(
        "office-chair",
        "Office Chair",
        "src/assets/furniture/office-chair.png",
        "office",
    );
    insert(
        "desk",
        "Writing Desk",
        "src/assets/furniture/desk.png",
        "office",
    );
    insert(
        "bookshelf",
        "Bookshelf",
        "src/assets/furniture/bookshelf.png",
        "office",
    );

    map
}
