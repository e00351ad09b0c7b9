//! In-memory document store.
//!
//! Useful for hosts that index their documents up front, for prototyping, and
//! as the fixture behind this crate's tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::store::{ChildSource, CreatedEntity, DocumentStore, SearchHit, SearchPage};

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    name: String,
    children: Option<Arc<MemoryChildren>>,
}

impl Entry {
    fn hit(&self) -> SearchHit {
        let mut hit = SearchHit::new(&self.id, &self.name);
        if let Some(children) = &self.children {
            hit = hit.with_children(children.clone());
        }
        hit
    }
}

fn page(entries: impl Iterator<Item = Entry>, query: &str, limit: usize) -> SearchPage {
    let needle = query.to_lowercase();
    let mut matches: Vec<Entry> = entries
        .filter(|e| e.name.to_lowercase().contains(&needle))
        .collect();
    matches.sort_by_key(|e| e.name.to_lowercase());

    let has_more = matches.len() > limit;
    let hits = matches.iter().take(limit).map(Entry::hit).collect();
    SearchPage::new(hits, has_more)
}

fn next_id(counter: &AtomicU64, prefix: &str) -> String {
    format!("{}.{:04}", prefix, counter.fetch_add(1, Ordering::Relaxed))
}

/// Children of one in-memory container.
///
/// Child ids are local to the container (`p0000`, `p0001`, ...).
#[derive(Debug, Default)]
pub struct MemoryChildren {
    entries: RwLock<Vec<Entry>>,
    counter: AtomicU64,
}

impl MemoryChildren {
    /// Adds a child and returns its id.
    pub fn insert(&self, name: impl Into<String>) -> String {
        let id = format!("p{:04}", self.counter.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push(Entry {
            id: id.clone(),
            name: name.into(),
            children: None,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl ChildSource for MemoryChildren {
    async fn search_children(&self, query: &str, limit: usize) -> Result<SearchPage, StoreError> {
        let entries = self.entries.read().clone();
        Ok(page(entries.into_iter(), query, limit))
    }

    async fn create_child(&self, seed_name: &str) -> Result<Option<CreatedEntity>, StoreError> {
        let name = if seed_name.is_empty() {
            "New Page"
        } else {
            seed_name
        };
        let id = self.insert(name);
        Ok(Some(CreatedEntity::new(id, name)))
    }
}

/// A [`DocumentStore`] over named in-memory collections.
///
/// Ids are `<collection>.<counter>`. Searching a collection also searches every
/// requested extra source that exists as a collection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Entry>>>,
    counter: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a leaf entity and returns its id.
    pub fn insert(&self, collection: &str, name: impl Into<String>) -> String {
        let id = next_id(&self.counter, collection);
        self.push(collection, id.clone(), name.into(), None);
        id
    }

    /// Adds a container entity and returns its id with a handle to fill its
    /// children.
    pub fn insert_container(
        &self,
        collection: &str,
        name: impl Into<String>,
    ) -> (String, Arc<MemoryChildren>) {
        let id = next_id(&self.counter, collection);
        let children = Arc::new(MemoryChildren::default());
        self.push(collection, id.clone(), name.into(), Some(children.clone()));
        (id, children)
    }

    fn push(&self, collection: &str, id: String, name: String, children: Option<Arc<MemoryChildren>>) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .push(Entry { id, name, children });
    }

    /// Number of entities in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn search(
        &self,
        collection: &str,
        extra_sources: &[String],
        query: &str,
        limit: usize,
    ) -> Result<SearchPage, StoreError> {
        let collections = self.collections.read();
        let primary = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let extra = extra_sources
            .iter()
            .filter(|name| name.as_str() != collection)
            .filter_map(|name| collections.get(name))
            .flatten();

        Ok(page(primary.iter().chain(extra).cloned(), query, limit))
    }

    async fn create_entity(
        &self,
        collection: &str,
        seed_name: &str,
    ) -> Result<Option<CreatedEntity>, StoreError> {
        if !self.collections.read().contains_key(collection) {
            return Err(StoreError::CollectionNotFound(collection.to_string()));
        }
        let name = if seed_name.is_empty() {
            format!("New {}", collection)
        } else {
            seed_name.to_string()
        };
        let id = self.insert(collection, name.clone());
        Ok(Some(CreatedEntity::new(id, name)))
    }
}
