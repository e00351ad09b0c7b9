//! Searchable categories and the catalog offered in the category menu.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One searchable kind of entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDescriptor {
    /// Stable identifier, also the entity type name used in references.
    pub id: String,
    /// Name shown in the category menu.
    pub display_name: String,
    /// Label shown while searching this category.
    pub search_label: String,
    /// Single characters that select this category from the menu.
    pub trigger_keys: BTreeSet<String>,
    /// Host collection searched for this category.
    pub source_collection: Option<String>,
    /// Whether the "create new" row is actionable.
    pub can_create: bool,
    /// Whether results come from the optional external provider.
    pub is_external_source: bool,
    /// Entity type of the children, when results can be drilled into.
    pub child_kind: Option<String>,
}

impl CategoryDescriptor {
    /// A creatable category with no triggers, no collection, and no children.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        Self {
            id: id.into(),
            search_label: display_name.clone(),
            display_name,
            trigger_keys: BTreeSet::new(),
            source_collection: None,
            can_create: true,
            is_external_source: false,
            child_kind: None,
        }
    }

    pub fn with_search_label(mut self, label: impl Into<String>) -> Self {
        self.search_label = label.into();
        self
    }

    /// Adds a trigger key; keys are matched case-insensitively.
    pub fn with_trigger(mut self, key: char) -> Self {
        self.trigger_keys.insert(key.to_lowercase().collect());
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.source_collection = Some(collection.into());
        self
    }

    /// Marks results as containers whose children can be searched.
    pub fn with_children(mut self, child_kind: impl Into<String>) -> Self {
        self.child_kind = Some(child_kind.into());
        self
    }

    /// Routes searches to the external provider.
    pub fn external(mut self) -> Self {
        self.is_external_source = true;
        self
    }

    pub fn creatable(mut self, can_create: bool) -> Self {
        self.can_create = can_create;
        self
    }

    pub fn supports_drill_down(&self) -> bool {
        self.child_kind.is_some()
    }

    /// Whether `key` selects this category.
    pub fn matches_trigger(&self, key: char) -> bool {
        let key: String = key.to_lowercase().collect();
        self.trigger_keys.contains(&key)
    }
}

/// Ordered list of categories shown in the category menu.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryCatalog {
    categories: Vec<CategoryDescriptor>,
}

impl CategoryCatalog {
    /// Builds a catalog ordered by display name.
    pub fn new(categories: impl IntoIterator<Item = CategoryDescriptor>) -> Self {
        let mut catalog = Self {
            categories: categories.into_iter().collect(),
        };
        catalog.sort();
        catalog
    }

    /// The built-in document categories.
    pub fn standard() -> Self {
        Self::new([
            CategoryDescriptor::new("Actor", "Actors")
                .with_search_label("actor")
                .with_trigger('a')
                .with_collection("actors"),
            CategoryDescriptor::new("Item", "Items")
                .with_search_label("item")
                .with_trigger('i')
                .with_collection("items"),
            CategoryDescriptor::new("JournalEntry", "Journal entries/pages")
                .with_search_label("journal entry")
                .with_trigger('j')
                .with_collection("journal")
                .with_children("JournalEntryPage"),
            CategoryDescriptor::new("RollTable", "Roll Tables")
                .with_search_label("roll table")
                .with_trigger('r')
                .with_collection("tables"),
            CategoryDescriptor::new("Scene", "Scenes")
                .with_search_label("scene")
                .with_trigger('s')
                .with_collection("scenes"),
        ])
    }

    /// Adds the campaign-builder categories served by the external provider.
    pub fn with_external_categories(mut self) -> Self {
        let external = [
            ("Campaign", "Campaigns", "campaign", 'g'),
            ("Character", "Characters", "character", 'c'),
            ("Location", "Locations", "location", 'l'),
            ("Organization", "Organizations", "organization", 'o'),
            ("PC", "PCs", "PC", 'p'),
            ("Session", "Sessions", "session", 'n'),
            ("World", "Worlds", "world", 'w'),
        ];
        self.categories
            .extend(external.into_iter().map(|(id, name, label, key)| {
                CategoryDescriptor::new(id, name)
                    .with_search_label(label)
                    .with_trigger(key)
                    .external()
            }));
        self.sort();
        self
    }

    /// Adds one category, keeping the display order.
    pub fn push(&mut self, category: CategoryDescriptor) {
        self.categories.push(category);
        self.sort();
    }

    fn sort(&mut self) {
        self.categories
            .sort_by_key(|c| c.display_name.to_lowercase());
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CategoryDescriptor> {
        self.categories.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryDescriptor> {
        self.categories.iter()
    }

    pub fn by_id(&self, id: &str) -> Option<&CategoryDescriptor> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// First category whose trigger keys contain `key`.
    pub fn find_by_trigger(&self, key: char) -> Option<&CategoryDescriptor> {
        self.categories.iter().find(|c| c.matches_trigger(key))
    }
}
