//! Application-level owner of the single open session.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::editor::{EditorSurface, SurfaceId};
use crate::error::{MentionError, MentionResult};
use crate::event::{MentionEvent, MentionKey};
use crate::session::{EventOutcome, MentionSession, SessionExit, SessionServices};
use crate::view::ViewModel;

/// What the host should do with a keydown it forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDisposition {
    /// The key opened a session; suppress its default action.
    Consumed,
    /// Not ours; let the editor handle it.
    PassThrough,
}

/// Watches registered surfaces for the trigger key and routes popup input to
/// the open session.
///
/// At most one session is open at a time. Opening a new one closes the previous
/// one first, including its pointer-down listeners.
pub struct MentionController {
    services: SessionServices,
    surfaces: HashMap<SurfaceId, Arc<dyn EditorSurface>>,
    session: Option<MentionSession>,
    next_session_id: u64,
}

impl MentionController {
    pub fn new(services: SessionServices) -> Self {
        Self {
            services,
            surfaces: HashMap::new(),
            session: None,
            next_session_id: 1,
        }
    }

    pub fn services(&self) -> &SessionServices {
        &self.services
    }

    /// Starts watching a surface for the trigger key.
    pub fn register_surface(&mut self, surface: Arc<dyn EditorSurface>) {
        let id = surface.id();
        debug!(surface = %id, kind = ?surface.kind(), "surface registered");
        self.surfaces.insert(id, surface);
    }

    /// Stops watching a surface, closing its session if one is open.
    pub fn unregister_surface(&mut self, id: SurfaceId) {
        if self.surfaces.remove(&id).is_some() {
            debug!(surface = %id, "surface unregistered");
        }
        if self.session.as_ref().is_some_and(|s| s.surface().id() == id) {
            self.close();
        }
    }

    pub fn is_registered(&self, id: SurfaceId) -> bool {
        self.surfaces.contains_key(&id)
    }

    /// Keydown on a registered surface while no popup has focus.
    pub fn surface_key(&mut self, surface: SurfaceId, key: MentionKey) -> MentionResult<KeyDisposition> {
        let trigger = self.services.settings.trigger();
        if key != MentionKey::Char(trigger) || !self.is_registered(surface) {
            return Ok(KeyDisposition::PassThrough);
        }
        self.open(surface)?;
        Ok(KeyDisposition::Consumed)
    }

    /// Opens a session on a registered surface, replacing any open one.
    pub fn open(&mut self, surface: SurfaceId) -> MentionResult<&MentionSession> {
        let editor = self
            .surfaces
            .get(&surface)
            .cloned()
            .ok_or(MentionError::UnknownSurface(surface))?;

        self.close();

        let id = self.next_session_id;
        self.next_session_id += 1;
        info!(session = id, surface = %surface, "opening mention popup");

        let session = self
            .session
            .insert(MentionSession::open(id, editor, self.services.clone()));
        Ok(&*session)
    }

    pub fn session(&self) -> Option<&MentionSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut MentionSession> {
        self.session.as_mut()
    }

    pub fn view_model(&self) -> Option<ViewModel> {
        self.session
            .as_ref()
            .filter(|s| s.is_open())
            .map(MentionSession::view_model)
    }

    /// Routes a popup event to the open session, running any fetch or create
    /// flow it triggers. Returns `Ok(None)` when no session is open.
    pub async fn dispatch(&mut self, event: MentionEvent) -> MentionResult<Option<EventOutcome>> {
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        let result = session.dispatch(event).await;
        if session.exit().is_some() {
            self.session = None;
        }
        result.map(Some)
    }

    /// Pointer-down reported by the document or frame listeners.
    pub fn pointer_down(&mut self, inside_popup: bool) -> Option<SessionExit> {
        if inside_popup {
            return None;
        }
        self.close_interactive()
    }

    /// The popup lost keyboard focus.
    pub fn focus_lost(&mut self) -> Option<SessionExit> {
        self.close_interactive()
    }

    /// Closes an open popup but leaves a running create flow alone; its dialog
    /// is what took the pointer and focus.
    fn close_interactive(&mut self) -> Option<SessionExit> {
        if self.session.as_ref().is_some_and(MentionSession::is_creating) {
            return None;
        }
        self.close()
    }

    /// Closes and drops the current session without inserting anything.
    pub fn close(&mut self) -> Option<SessionExit> {
        let mut session = self.session.take()?;
        session.dispose();
        session.exit().cloned()
    }
}

impl std::fmt::Debug for MentionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MentionController")
            .field("surfaces", &self.surfaces.len())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
