//! Testing utilities.
//!
//! In-memory stand-ins for the host collaborators: an editor surface that
//! records insertions and a listener registry that tracks what is attached.

use mentionkit_position::{CaretGeometry, Size};
use parking_lot::Mutex;

use crate::editor::{
    CaretMark, ContainerContext, EditorSurface, ListenerId, ListenerRegistry, ListenerScope,
    SurfaceId, SurfaceKind,
};

#[derive(Debug, Default)]
struct SurfaceState {
    caret_offset: u64,
    caret_geometry: Option<CaretGeometry>,
    selection: String,
    container: Option<ContainerContext>,
    insertions: Vec<(CaretMark, String)>,
    focus_count: usize,
}

/// An editor surface whose caret is a plain offset.
///
/// `save_caret` returns the current offset; insertions are recorded together
/// with the mark they were made at.
#[derive(Debug)]
pub struct FakeSurface {
    id: SurfaceId,
    kind: SurfaceKind,
    viewport: Size,
    state: Mutex<SurfaceState>,
}

impl FakeSurface {
    /// A rich-text surface with a caret at (100, 40) in a 1280x800 viewport.
    pub fn new(id: u64) -> Self {
        Self {
            id: SurfaceId(id),
            kind: SurfaceKind::RichText,
            viewport: Size::new(1280.0, 800.0),
            state: Mutex::new(SurfaceState {
                caret_geometry: Some(CaretGeometry::new(100.0, 40.0, 1.0, 16.0)),
                ..Default::default()
            }),
        }
    }

    pub fn with_kind(mut self, kind: SurfaceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_viewport(mut self, viewport: Size) -> Self {
        self.viewport = viewport;
        self
    }

    /// Sets the measured caret; `None` simulates an unmeasurable caret.
    pub fn with_caret_geometry(self, caret: Option<CaretGeometry>) -> Self {
        self.state.lock().caret_geometry = caret;
        self
    }

    pub fn with_selection(self, text: impl Into<String>) -> Self {
        self.state.lock().selection = text.into();
        self
    }

    pub fn with_container(self, container: ContainerContext) -> Self {
        self.state.lock().container = Some(container);
        self
    }

    /// Moves the live caret, as typing or re-rendering would.
    pub fn move_caret(&self, offset: u64) {
        self.state.lock().caret_offset = offset;
    }

    /// Inserted texts, oldest first.
    pub fn inserted(&self) -> Vec<String> {
        self.state
            .lock()
            .insertions
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Insertions with the caret mark each was made at.
    pub fn insertions(&self) -> Vec<(CaretMark, String)> {
        self.state.lock().insertions.clone()
    }

    pub fn focus_count(&self) -> usize {
        self.state.lock().focus_count
    }
}

impl EditorSurface for FakeSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn kind(&self) -> SurfaceKind {
        self.kind
    }

    fn caret_geometry(&self) -> Option<CaretGeometry> {
        self.state.lock().caret_geometry
    }

    fn viewport_size(&self) -> Size {
        self.viewport
    }

    fn save_caret(&self) -> CaretMark {
        CaretMark(self.state.lock().caret_offset)
    }

    fn insert_text_at_saved_caret(&self, caret: &CaretMark, text: &str) {
        self.state
            .lock()
            .insertions
            .push((caret.clone(), text.to_string()));
    }

    fn focus(&self) {
        self.state.lock().focus_count += 1;
    }

    fn current_selection_text(&self) -> String {
        self.state.lock().selection.clone()
    }

    fn enclosing_container(&self) -> Option<ContainerContext> {
        self.state.lock().container.clone()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u64,
    active: Vec<(ListenerId, ListenerScope)>,
    registered: usize,
}

/// A listener registry that tracks attached listeners.
#[derive(Debug, Default)]
pub struct RecordingRegistry {
    state: Mutex<RegistryState>,
}

impl RecordingRegistry {
    /// Scopes with a listener currently attached.
    pub fn active(&self) -> Vec<ListenerScope> {
        self.state.lock().active.iter().map(|(_, scope)| *scope).collect()
    }

    /// Total number of listeners ever attached.
    pub fn registered(&self) -> usize {
        self.state.lock().registered
    }
}

impl ListenerRegistry for RecordingRegistry {
    fn add_pointer_down(&self, scope: ListenerScope) -> ListenerId {
        let mut state = self.state.lock();
        state.next_id += 1;
        state.registered += 1;
        let id = ListenerId(state.next_id);
        state.active.push((id, scope));
        id
    }

    fn remove(&self, id: ListenerId) {
        self.state.lock().active.retain(|(active, _)| *active != id);
    }
}
