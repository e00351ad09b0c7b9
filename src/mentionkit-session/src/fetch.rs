//! Fetch and create requests issued by a session.
//!
//! A session never awaits anything while handling an event. It hands back a
//! request instead; the caller runs it against [`Sources`] and feeds the result
//! to [`MentionSession::apply_fetch`](crate::MentionSession::apply_fetch) or
//! [`MentionSession::complete_create`](crate::MentionSession::complete_create).
//! Every fetch carries a [`FetchTicket`]; results for an outdated ticket are
//! discarded, so the newest input always wins.

use std::sync::Arc;

use tracing::debug;

use crate::category::CategoryDescriptor;
use crate::error::{MentionError, MentionResult};
use crate::store::{CreatedEntity, DocumentStore, ExternalSource, ParentRef, SearchPage};

/// Generation number of a fetch within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchTicket(pub u64);

/// Where focus goes once a fetch lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusRule {
    /// First result row if there are results, else the create row.
    FirstResult,
    /// Always the create row.
    CreateRow,
}

/// What a fetch searches.
#[derive(Debug, Clone)]
pub enum FetchTarget {
    /// A built-in collection of the document store.
    Collection(String),
    /// A category served by the external provider.
    External { category_id: String },
    /// Children of a container.
    Children(ParentRef),
    /// Nothing to search; resolves to an empty page.
    Nothing,
}

impl FetchTarget {
    /// The target for a top-level search in `category`.
    pub fn for_category(category: &CategoryDescriptor) -> Self {
        if category.is_external_source {
            Self::External {
                category_id: category.id.clone(),
            }
        } else {
            match &category.source_collection {
                Some(collection) => Self::Collection(collection.clone()),
                None => Self::Nothing,
            }
        }
    }
}

/// A search the caller must run.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub ticket: FetchTicket,
    pub target: FetchTarget,
    pub query: String,
    pub limit: usize,
    pub extra_sources: Vec<String>,
    pub focus: FocusRule,
}

impl FetchRequest {
    /// Runs the search.
    pub async fn run(&self, sources: &Sources) -> MentionResult<SearchPage> {
        debug!(ticket = self.ticket.0, query = %self.query, "running fetch");
        match &self.target {
            FetchTarget::Collection(collection) => Ok(sources
                .store
                .search(collection, &self.extra_sources, &self.query, self.limit)
                .await?),
            FetchTarget::External { category_id } => {
                let external = sources.external_for(category_id)?;
                Ok(external.query(category_id, &self.query, self.limit).await?)
            }
            FetchTarget::Children(parent) => Ok(parent
                .source()
                .search_children(&self.query, self.limit)
                .await?),
            FetchTarget::Nothing => Ok(SearchPage::empty()),
        }
    }
}

/// What a create flow produces.
#[derive(Debug, Clone)]
pub enum CreateTarget {
    /// A new top-level entity in a built-in collection.
    Collection(String),
    /// A new entity of an external category.
    External { category_id: String },
    /// A new child of a container.
    Child(ParentRef),
}

/// A create flow the caller must run.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub target: CreateTarget,
    /// Current filter text, used as the suggested name.
    pub seed_name: String,
}

impl CreateRequest {
    /// Runs the host's create flow. `Ok(None)` means the user cancelled.
    pub async fn run(&self, sources: &Sources) -> MentionResult<Option<CreatedEntity>> {
        debug!(seed = %self.seed_name, "running create flow");
        match &self.target {
            CreateTarget::Collection(collection) => Ok(sources
                .store
                .create_entity(collection, &self.seed_name)
                .await?),
            CreateTarget::External { category_id } => {
                let external = sources.external_for(category_id)?;
                Ok(external.create(category_id, &self.seed_name).await?)
            }
            CreateTarget::Child(parent) => Ok(parent.source().create_child(&self.seed_name).await?),
        }
    }
}

/// The data sources requests run against.
#[derive(Clone)]
pub struct Sources {
    pub store: Arc<dyn DocumentStore>,
    pub external: Option<Arc<dyn ExternalSource>>,
}

impl Sources {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            external: None,
        }
    }

    pub fn with_external(mut self, external: Arc<dyn ExternalSource>) -> Self {
        self.external = Some(external);
        self
    }

    fn external_for(&self, category_id: &str) -> MentionResult<&dyn ExternalSource> {
        match &self.external {
            Some(external) if external.available() => Ok(external.as_ref()),
            _ => Err(MentionError::source_unavailable(category_id)),
        }
    }
}

impl std::fmt::Debug for Sources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sources")
            .field("external", &self.external.is_some())
            .finish_non_exhaustive()
    }
}
