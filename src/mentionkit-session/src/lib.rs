#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args
)]
//! Mentionkit Session - the interaction half of the mention autocomplete.
//!
//! Typing the trigger character (`@` by default) in a registered editor surface
//! opens a popup. The user picks a category from a menu, narrows a live search
//! over the host's documents, optionally drills into a container's children,
//! and commits. The chosen entity is inserted as a reference token at the caret
//! position saved when the popup opened.
//!
//! - [`MentionController`]: owns the single open session and routes input
//! - [`MentionSession`]: the state machine itself
//! - [`DocumentStore`], [`ChildSource`], [`ExternalSource`]: data sources
//!   provided by the host
//! - [`EditorSurface`], [`ListenerRegistry`]: the editing element and the
//!   click-outside listeners
//! - [`ViewModel`]: what the popup template renders
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use mentionkit_session::{
//!     CategoryCatalog, MentionEvent, MentionKey, MentionSession, MemoryStore, Mode,
//!     SessionServices, testing::{FakeSurface, RecordingRegistry},
//! };
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! store.insert("actors", "Goblin");
//!
//! let services = SessionServices::new(
//!     CategoryCatalog::standard(),
//!     store,
//!     Arc::new(RecordingRegistry::default()),
//! );
//! let surface = Arc::new(FakeSurface::new(1));
//! let mut session = MentionSession::open(1, surface.clone(), services);
//!
//! session.dispatch(MentionEvent::char('a')).await.unwrap();
//! assert_eq!(session.mode(), Mode::SearchingCategory);
//! assert_eq!(session.focused_index(), 1);
//!
//! session.dispatch(MentionKey::Enter.into()).await.unwrap();
//! assert_eq!(surface.inserted(), vec!["@UUID[actors.0000]{Goblin}".to_string()]);
//! # });
//! ```

mod category;
mod config;
mod controller;
mod editor;
mod error;
mod event;
pub mod fetch;
mod memory;
mod reference;
mod session;
mod store;
pub mod telemetry;
pub mod testing;
mod view;

pub use category::{CategoryCatalog, CategoryDescriptor};
pub use config::{MentionSettings, RefetchPolicy, SettingsStore};
pub use controller::{KeyDisposition, MentionController};
pub use editor::{
    CaretMark, ContainerContext, EditorSurface, FrameId, ListenerGuard, ListenerId,
    ListenerRegistry, ListenerScope, SurfaceId, SurfaceKind,
};
pub use error::{MentionError, MentionResult, StoreError};
pub use event::{MentionEvent, MentionKey};
pub use fetch::{CreateRequest, FetchRequest, FetchTicket, Sources};
pub use memory::{MemoryChildren, MemoryStore};
pub use reference::{DrillLevel, ReferenceFormatter, ReferenceTarget, UuidReferenceFormatter};
pub use session::{Effect, EventOutcome, MentionSession, SessionExit, SessionServices};
pub use store::{
    ChildSource, CreatedEntity, DocumentStore, ExternalSource, ParentRef, SearchHit, SearchPage,
    SearchResult,
};
pub use view::{CategoryView, Mode, ResultView, ViewModel};

// Re-exported so hosts can name geometry types without a direct dependency.
pub use mentionkit_position as position;
