//! Editor surfaces and document-level listeners.

use std::fmt;
use std::sync::Arc;

use mentionkit_position::{CaretGeometry, Size};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::store::SearchResult;

/// Identifies a registered editor surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Identifies an embedded frame hosting a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameId(pub u64);

/// What kind of editing element a surface is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceKind {
    /// A rich-text (contenteditable) editor in the main document.
    RichText,
    /// A rich-text editor inside an embedded frame.
    FramedRichText { frame: FrameId },
    /// A single-line text input.
    PlainText,
    /// A multi-line text area.
    TextArea,
}

impl SurfaceKind {
    /// The embedded frame whose pointer events must also be watched.
    pub fn frame(&self) -> Option<FrameId> {
        match self {
            Self::FramedRichText { frame } => Some(*frame),
            _ => None,
        }
    }
}

/// Opaque caret position saved by a surface when a session opens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaretMark(pub u64);

/// The entity a surface is embedded in, if any.
///
/// Editing a journal page gives a "current journal" shortcut in the journal
/// category.
#[derive(Debug, Clone)]
pub struct ContainerContext {
    /// Id of the category the container belongs to.
    pub category_id: String,
    pub entity: SearchResult,
}

/// An editable element the user types into.
pub trait EditorSurface: Send + Sync {
    fn id(&self) -> SurfaceId;

    fn kind(&self) -> SurfaceKind;

    /// Caret rectangle in viewport coordinates, if it can be measured.
    ///
    /// Rich-text hosts typically answer with
    /// [`rich_text_caret`](mentionkit_position::rich_text_caret), plain text
    /// hosts with [`plain_text_caret`](mentionkit_position::plain_text_caret).
    fn caret_geometry(&self) -> Option<CaretGeometry>;

    fn viewport_size(&self) -> Size;

    /// Records the current caret so text can be inserted there later.
    fn save_caret(&self) -> CaretMark;

    /// Inserts `text` at a previously saved caret, even if focus moved.
    fn insert_text_at_saved_caret(&self, caret: &CaretMark, text: &str);

    fn focus(&self);

    /// Text currently selected in the surface; empty if none.
    fn current_selection_text(&self) -> String {
        String::new()
    }

    fn enclosing_container(&self) -> Option<ContainerContext> {
        None
    }
}

/// Where a pointer-down listener is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerScope {
    Document,
    Frame(FrameId),
}

/// Handle returned when registering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Host facility for pointer-down listeners outside the popup.
///
/// The host forwards those pointer events to
/// [`MentionController::pointer_down`](crate::MentionController::pointer_down).
pub trait ListenerRegistry: Send + Sync {
    fn add_pointer_down(&self, scope: ListenerScope) -> ListenerId;

    fn remove(&self, id: ListenerId);
}

/// Removes its listeners when dropped.
pub struct ListenerGuard {
    registry: Arc<dyn ListenerRegistry>,
    ids: Vec<ListenerId>,
}

impl ListenerGuard {
    /// Registers a pointer-down listener for every scope.
    pub fn register(
        registry: Arc<dyn ListenerRegistry>,
        scopes: impl IntoIterator<Item = ListenerScope>,
    ) -> Self {
        let ids = scopes
            .into_iter()
            .map(|scope| registry.add_pointer_down(scope))
            .collect();
        Self { registry, ids }
    }

    /// Listeners for a surface: the document, plus its frame if it has one.
    pub fn for_surface(registry: Arc<dyn ListenerRegistry>, kind: SurfaceKind) -> Self {
        let scopes = std::iter::once(ListenerScope::Document)
            .chain(kind.frame().map(ListenerScope::Frame));
        Self::register(registry, scopes)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerGuard").field("ids", &self.ids).finish()
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            trace!(listener = id.0, "removing pointer-down listener");
            self.registry.remove(id);
        }
    }
}
