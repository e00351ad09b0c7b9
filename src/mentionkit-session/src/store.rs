//! Data sources consumed by sessions.
//!
//! The host owns all entity data. Sessions reach it through three async traits:
//! [`DocumentStore`] for the built-in collections, [`ChildSource`] for the
//! children of a drillable result, and [`ExternalSource`] for categories served
//! by an optional add-on provider.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;

/// One match returned by a source.
#[derive(Clone)]
pub struct SearchHit {
    pub unique_id: String,
    pub display_name: String,
    /// Handle to the hit's children, for containers.
    pub children: Option<Arc<dyn ChildSource>>,
}

impl SearchHit {
    pub fn new(unique_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
            display_name: display_name.into(),
            children: None,
        }
    }

    pub fn with_children(mut self, children: Arc<dyn ChildSource>) -> Self {
        self.children = Some(children);
        self
    }
}

impl fmt::Debug for SearchHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchHit")
            .field("unique_id", &self.unique_id)
            .field("display_name", &self.display_name)
            .field("has_children", &self.children.is_some())
            .finish()
    }
}

/// A page of hits, at most the requested limit long.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    /// The source held more matches than it returned.
    pub has_more: bool,
}

impl SearchPage {
    pub fn new(hits: Vec<SearchHit>, has_more: bool) -> Self {
        Self { hits, has_more }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// Entity produced by a successful create flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEntity {
    pub unique_id: String,
    pub display_name: String,
}

impl CreatedEntity {
    pub fn new(unique_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Children of one container entity.
#[async_trait]
pub trait ChildSource: Send + Sync {
    /// Case-insensitive substring search over the children's names.
    async fn search_children(&self, query: &str, limit: usize) -> Result<SearchPage, StoreError>;

    /// Runs the host's create-child flow seeded with `seed_name`.
    ///
    /// `Ok(None)` means the user cancelled.
    async fn create_child(&self, seed_name: &str) -> Result<Option<CreatedEntity>, StoreError>;
}

/// The host's built-in document collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Case-insensitive substring search over one collection plus the extra
    /// sources configured by the user.
    async fn search(
        &self,
        collection: &str,
        extra_sources: &[String],
        query: &str,
        limit: usize,
    ) -> Result<SearchPage, StoreError>;

    /// Runs the host's create flow seeded with `seed_name`.
    ///
    /// `Ok(None)` means the user cancelled.
    async fn create_entity(
        &self,
        collection: &str,
        seed_name: &str,
    ) -> Result<Option<CreatedEntity>, StoreError>;
}

/// Optional provider for categories flagged `is_external_source`.
#[async_trait]
pub trait ExternalSource: Send + Sync {
    /// Whether the provider is installed and ready.
    fn available(&self) -> bool;

    async fn query(
        &self,
        category_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<SearchPage, StoreError>;

    async fn create(
        &self,
        category_id: &str,
        seed_name: &str,
    ) -> Result<Option<CreatedEntity>, StoreError>;
}

/// Handle used to search and create a result's children.
#[derive(Clone)]
pub struct ParentRef(Arc<dyn ChildSource>);

impl ParentRef {
    pub fn new(source: Arc<dyn ChildSource>) -> Self {
        Self(source)
    }

    pub fn source(&self) -> &dyn ChildSource {
        self.0.as_ref()
    }
}

impl fmt::Debug for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ParentRef(..)")
    }
}

/// A row shown in the popup.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub unique_id: String,
    pub display_name: String,
    /// Present only for results that can be drilled into.
    pub parent_ref: Option<ParentRef>,
}

impl SearchResult {
    pub fn new(unique_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
            display_name: display_name.into(),
            parent_ref: None,
        }
    }

    pub fn has_children(&self) -> bool {
        self.parent_ref.is_some()
    }

    /// Case-insensitive substring match on the display name.
    pub fn matches(&self, filter: &str) -> bool {
        filter.is_empty()
            || self
                .display_name
                .to_lowercase()
                .contains(&filter.to_lowercase())
    }
}

impl PartialEq for SearchResult {
    fn eq(&self, other: &Self) -> bool {
        self.unique_id == other.unique_id && self.display_name == other.display_name
    }
}

impl From<SearchHit> for SearchResult {
    fn from(hit: SearchHit) -> Self {
        Self {
            unique_id: hit.unique_id,
            display_name: hit.display_name,
            parent_ref: hit.children.map(ParentRef),
        }
    }
}
