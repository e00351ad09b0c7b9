//! The mention session state machine.
//!
//! A session lives from the trigger key to the moment a reference is inserted
//! or the popup is dismissed. Event handling is synchronous: transitions happen
//! immediately, and any search or create flow the transition needs is returned
//! to the caller as a request (see [`crate::fetch`]). [`MentionSession::dispatch`]
//! runs those requests inline for callers that do not need to interleave them.

use std::sync::Arc;

use mentionkit_position::{ESTIMATED_BOX, PopupPlacement, PositionCalculator, Size};
use tracing::{debug, trace, warn};

use crate::category::{CategoryCatalog, CategoryDescriptor};
use crate::config::{MentionSettings, RefetchPolicy, SettingsStore};
use crate::editor::{CaretMark, ContainerContext, EditorSurface, ListenerGuard, ListenerRegistry};
use crate::error::{MentionError, MentionResult};
use crate::event::{MentionEvent, MentionKey};
use crate::fetch::{
    CreateRequest, CreateTarget, FetchRequest, FetchTarget, FetchTicket, FocusRule, Sources,
};
use crate::reference::{ReferenceFormatter, ReferenceTarget, UuidReferenceFormatter};
use crate::store::{CreatedEntity, DocumentStore, ExternalSource, SearchPage, SearchResult};
use crate::view::{CategoryView, Mode, ResultView, ViewModel};

// ============================================================
// SERVICES
// ============================================================

/// Shared collaborators handed to every session.
#[derive(Clone)]
pub struct SessionServices {
    pub catalog: Arc<CategoryCatalog>,
    pub sources: Sources,
    pub settings: Arc<dyn SettingsStore>,
    pub formatter: Arc<dyn ReferenceFormatter>,
    pub listeners: Arc<dyn ListenerRegistry>,
}

impl SessionServices {
    /// Services with default settings and the UUID reference format.
    pub fn new(
        catalog: CategoryCatalog,
        store: Arc<dyn DocumentStore>,
        listeners: Arc<dyn ListenerRegistry>,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            sources: Sources::new(store),
            settings: Arc::new(MentionSettings::default()),
            formatter: Arc::new(UuidReferenceFormatter::default()),
            listeners,
        }
    }

    /// Uses `settings` for limits and the reference label.
    pub fn with_settings(mut self, settings: MentionSettings) -> Self {
        self.formatter = Arc::new(UuidReferenceFormatter::new(settings.add_name));
        self.settings = Arc::new(settings);
        self
    }

    /// Reads limits and the reference label from a host settings store.
    pub fn with_settings_store(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.formatter = Arc::new(UuidReferenceFormatter::new(settings.add_name()));
        self.settings = settings;
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn ReferenceFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_external(mut self, external: Arc<dyn ExternalSource>) -> Self {
        self.sources = self.sources.with_external(external);
        self
    }
}

impl std::fmt::Debug for SessionServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionServices")
            .field("catalog", &self.catalog)
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}

// ============================================================
// OUTCOMES
// ============================================================

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    /// Text was inserted at the saved caret.
    Inserted(String),
    /// Closed without inserting anything.
    Cancelled,
}

/// Follow-up work produced by an event.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Run this search and pass the result to `apply_fetch`.
    Fetch(FetchRequest),
    /// Run this create flow and pass the result to `complete_create`.
    Create(CreateRequest),
    /// The session has ended.
    Exit(SessionExit),
}

/// Result of handling one event.
#[derive(Debug, Clone, Default)]
pub struct EventOutcome {
    /// The view model changed.
    pub rerender: bool,
    pub effect: Option<Effect>,
}

impl EventOutcome {
    pub fn ignored() -> Self {
        Self::default()
    }

    fn rerender() -> Self {
        Self {
            rerender: true,
            effect: None,
        }
    }

    fn effect(effect: Effect) -> Self {
        Self {
            rerender: true,
            effect: Some(effect),
        }
    }

    fn exit(exit: SessionExit) -> Self {
        Self {
            rerender: false,
            effect: Some(Effect::Exit(exit)),
        }
    }

    pub fn fetch(&self) -> Option<&FetchRequest> {
        match &self.effect {
            Some(Effect::Fetch(request)) => Some(request),
            _ => None,
        }
    }

    pub fn exit_reason(&self) -> Option<&SessionExit> {
        match &self.effect {
            Some(Effect::Exit(exit)) => Some(exit),
            _ => None,
        }
    }
}

// ============================================================
// STATE
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Open,
    /// A create flow is running; the popup is gone but the caret is kept.
    Creating,
    Closed(SessionExit),
}

/// What a fetch searched, for cache validity.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FetchScope {
    category_id: String,
    parent_id: Option<String>,
}

#[derive(Debug, Clone)]
struct LastFetch {
    scope: FetchScope,
    filter_text: String,
    row_count: usize,
    has_more: bool,
}

#[derive(Debug, Clone)]
struct SessionState {
    mode: Mode,
    focused_index: usize,
    active_category: Option<CategoryDescriptor>,
    filter_text: String,
    selected_parent: Option<SearchResult>,
    /// The parent came from the current-container row, so there is no
    /// "whole parent" row.
    parent_preselected: bool,
    saved_category_filter: Option<String>,
    visible_results: Vec<SearchResult>,
    /// Everything the last fetch returned, before truncation.
    fetched: Vec<SearchResult>,
    has_more: bool,
    loading: bool,
    /// Focus rule of the fetch in flight.
    pending_focus: FocusRule,
    last_fetch: Option<LastFetch>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            mode: Mode::AwaitingCategory,
            focused_index: 0,
            active_category: None,
            filter_text: String::new(),
            selected_parent: None,
            parent_preselected: false,
            saved_category_filter: None,
            visible_results: Vec::new(),
            fetched: Vec::new(),
            has_more: false,
            loading: false,
            pending_focus: FocusRule::FirstResult,
            last_fetch: None,
        }
    }
}

impl SessionState {
    fn clear_results(&mut self) {
        self.visible_results.clear();
        self.fetched.clear();
        self.has_more = false;
    }

    fn scope(&self) -> Option<FetchScope> {
        let category = self.active_category.as_ref()?;
        Some(FetchScope {
            category_id: category.id.clone(),
            parent_id: match self.mode {
                Mode::SearchingSubItem => self.selected_parent.as_ref().map(|p| p.unique_id.clone()),
                _ => None,
            },
        })
    }
}

// ============================================================
// SESSION
// ============================================================

/// One open mention popup.
pub struct MentionSession {
    id: u64,
    surface: Arc<dyn EditorSurface>,
    services: SessionServices,
    caret: CaretMark,
    calculator: PositionCalculator,
    position: PopupPlacement,
    state: SessionState,
    generation: u64,
    preset_filter: Option<String>,
    container: Option<ContainerContext>,
    listeners: Option<ListenerGuard>,
    phase: Phase,
}

impl MentionSession {
    /// Opens a session on `surface`.
    ///
    /// Saves the caret, registers the pointer-down listeners, and estimates the
    /// popup position. A caret that cannot be measured puts the popup at the
    /// viewport origin.
    pub fn open(id: u64, surface: Arc<dyn EditorSurface>, services: SessionServices) -> Self {
        let caret = surface.save_caret();
        let preset_filter = Some(surface.current_selection_text()).filter(|s| !s.is_empty());
        let container = surface.enclosing_container();
        let listeners = ListenerGuard::for_surface(services.listeners.clone(), surface.kind());

        let mut calculator = PositionCalculator::new();
        let position = match calculator.estimate(
            surface.caret_geometry(),
            surface.viewport_size(),
            ESTIMATED_BOX,
        ) {
            Ok(position) => position,
            Err(err) => {
                debug!(session = id, error = %err, "popup anchored at origin");
                PopupPlacement::ORIGIN
            }
        };

        debug!(
            session = id,
            surface = %surface.id(),
            preset = preset_filter.is_some(),
            "mention session opened"
        );

        Self {
            id,
            surface,
            services,
            caret,
            calculator,
            position,
            state: SessionState::default(),
            generation: 0,
            preset_filter,
            container,
            listeners: Some(listeners),
            phase: Phase::Open,
        }
    }

    // --------------------------------------------------------
    // Accessors
    // --------------------------------------------------------

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn surface(&self) -> &Arc<dyn EditorSurface> {
        &self.surface
    }

    /// The data sources requests should run against.
    pub fn sources(&self) -> &Sources {
        &self.services.sources
    }

    pub fn is_open(&self) -> bool {
        self.phase == Phase::Open
    }

    pub fn is_creating(&self) -> bool {
        self.phase == Phase::Creating
    }

    /// How the session ended, once it has.
    pub fn exit(&self) -> Option<&SessionExit> {
        match &self.phase {
            Phase::Closed(exit) => Some(exit),
            _ => None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn focused_index(&self) -> usize {
        self.state.focused_index
    }

    pub fn filter_text(&self) -> &str {
        &self.state.filter_text
    }

    pub fn active_category(&self) -> Option<&CategoryDescriptor> {
        self.state.active_category.as_ref()
    }

    pub fn selected_parent(&self) -> Option<&SearchResult> {
        self.state.selected_parent.as_ref()
    }

    pub fn visible_results(&self) -> &[SearchResult] {
        &self.state.visible_results
    }

    pub fn popup_position(&self) -> PopupPlacement {
        self.position
    }

    /// Whether pointer-down listeners are still registered.
    pub fn has_listeners(&self) -> bool {
        self.listeners.is_some()
    }

    /// Rows before the first result: create, plus "whole parent" when shown.
    pub fn fixed_row_count(&self) -> usize {
        match self.state.mode {
            Mode::AwaitingCategory => 0,
            Mode::SearchingCategory => 1,
            Mode::SearchingSubItem if self.shows_parent_row() => 2,
            Mode::SearchingSubItem => 1,
        }
    }

    /// Number of selectable rows in the current mode.
    pub fn row_count(&self) -> usize {
        match self.state.mode {
            Mode::AwaitingCategory => self.services.catalog.len(),
            _ => self.fixed_row_count() + self.state.visible_results.len(),
        }
    }

    fn shows_parent_row(&self) -> bool {
        self.state.mode == Mode::SearchingSubItem && !self.state.parent_preselected
    }

    /// Snapshot for the popup renderer.
    pub fn view_model(&self) -> ViewModel {
        let state = &self.state;
        let can_create = match state.mode {
            Mode::AwaitingCategory => false,
            Mode::SearchingCategory => state.active_category.as_ref().is_some_and(|c| c.can_create),
            Mode::SearchingSubItem => state
                .selected_parent
                .as_ref()
                .is_some_and(SearchResult::has_children),
        };

        ViewModel {
            mode: state.mode,
            category_list: self.services.catalog.iter().map(CategoryView::from).collect(),
            focused_index: state.focused_index,
            filter_text: state.filter_text.clone(),
            visible_results: state.visible_results.iter().map(ResultView::from).collect(),
            active_category_label: state.active_category.as_ref().map(|c| c.search_label.clone()),
            selected_parent_name: state.selected_parent.as_ref().map(|p| p.display_name.clone()),
            shows_parent_row: self.shows_parent_row(),
            can_create,
            has_more_results: state.has_more,
            loading: state.loading,
            popup_position: self.position,
        }
    }

    // --------------------------------------------------------
    // Positioning
    // --------------------------------------------------------

    /// Re-places the popup after a paint, using its rendered size.
    ///
    /// Returns whether the position changed.
    pub fn refine_position(&mut self, actual: Size, viewport: Size) -> bool {
        match self.calculator.refine(actual, viewport) {
            Ok(position) => {
                let changed = position != self.position;
                self.position = position;
                changed
            }
            Err(err) => {
                trace!(session = self.id, error = %err, "refine skipped");
                false
            }
        }
    }

    // --------------------------------------------------------
    // Events
    // --------------------------------------------------------

    /// Applies one event.
    ///
    /// Fails with [`MentionError::SessionClosed`] once the session has exited or
    /// handed over to a create flow.
    pub fn handle_event(&mut self, event: MentionEvent) -> MentionResult<EventOutcome> {
        if !self.is_open() {
            return Err(MentionError::SessionClosed);
        }
        trace!(session = self.id, ?event, mode = ?self.state.mode, "handling event");

        let outcome = match self.state.mode {
            Mode::AwaitingCategory => self.handle_menu_event(event),
            Mode::SearchingCategory | Mode::SearchingSubItem => self.handle_search_event(event),
        };
        Ok(outcome)
    }

    /// Applies one event and runs the fetch or create flow it asks for.
    pub async fn dispatch(&mut self, event: MentionEvent) -> MentionResult<EventOutcome> {
        let outcome = self.handle_event(event)?;
        match &outcome.effect {
            Some(Effect::Fetch(request)) => {
                let result = request.run(&self.services.sources).await;
                self.apply_fetch(request.ticket, result)?;
            }
            Some(Effect::Create(request)) => {
                let created = match request.run(&self.services.sources).await {
                    Ok(created) => created,
                    Err(err) => {
                        warn!(session = self.id, error = %err, "create flow failed");
                        self.close(SessionExit::Cancelled);
                        return Err(err);
                    }
                };
                let exit = self.complete_create(created)?;
                return Ok(EventOutcome::exit(exit));
            }
            Some(Effect::Exit(_)) | None => {}
        }
        Ok(outcome)
    }

    fn handle_menu_event(&mut self, event: MentionEvent) -> EventOutcome {
        match event {
            MentionEvent::Key(MentionKey::ArrowDown) => self.move_focus(true),
            MentionEvent::Key(MentionKey::ArrowUp) => self.move_focus(false),
            MentionEvent::Key(MentionKey::Enter) => self.select_category(self.state.focused_index),
            MentionEvent::Key(MentionKey::Char(key)) => {
                let found = self.services.catalog.iter().position(|c| c.matches_trigger(key));
                match found {
                    Some(index) => self.select_category(index),
                    None => EventOutcome::ignored(),
                }
            }
            MentionEvent::Key(MentionKey::Escape) => {
                let trigger = self.services.settings.trigger();
                self.commit(trigger.to_string())
            }
            MentionEvent::Key(MentionKey::Backspace) => self.close(SessionExit::Cancelled),
            MentionEvent::Key(MentionKey::Other) => EventOutcome::ignored(),
            MentionEvent::Hover { row } => self.hover(row),
            MentionEvent::Click { row } => self.select_category(row),
        }
    }

    fn handle_search_event(&mut self, event: MentionEvent) -> EventOutcome {
        match event {
            MentionEvent::Key(MentionKey::Char(c)) => {
                if self
                    .preset_filter
                    .as_deref()
                    .is_some_and(|preset| preset == self.state.filter_text)
                {
                    self.state.filter_text.clear();
                }
                self.state.filter_text.push(c);
                self.refresh(FocusRule::FirstResult)
            }
            MentionEvent::Key(MentionKey::Backspace) => {
                if self.state.filter_text.pop().is_some() {
                    self.refresh(FocusRule::CreateRow)
                } else {
                    self.pop_level()
                }
            }
            MentionEvent::Key(MentionKey::ArrowDown) => self.move_focus(true),
            MentionEvent::Key(MentionKey::ArrowUp) => self.move_focus(false),
            MentionEvent::Key(MentionKey::Enter) => self.select_row(self.state.focused_index),
            MentionEvent::Key(MentionKey::Escape) => self.close(SessionExit::Cancelled),
            MentionEvent::Key(MentionKey::Other) => EventOutcome::ignored(),
            MentionEvent::Hover { row } => self.hover(row),
            MentionEvent::Click { row } => {
                if row >= self.row_count() {
                    return EventOutcome::ignored();
                }
                self.state.focused_index = row;
                self.select_row(row)
            }
        }
    }

    fn move_focus(&mut self, forward: bool) -> EventOutcome {
        let rows = self.row_count();
        if rows == 0 {
            return EventOutcome::ignored();
        }
        let current = self.state.focused_index.min(rows - 1);
        self.state.focused_index = if forward {
            (current + 1) % rows
        } else {
            (current + rows - 1) % rows
        };
        EventOutcome::rerender()
    }

    fn hover(&mut self, row: usize) -> EventOutcome {
        if row >= self.row_count() || row == self.state.focused_index {
            return EventOutcome::ignored();
        }
        self.state.focused_index = row;
        EventOutcome::rerender()
    }

    // --------------------------------------------------------
    // Transitions
    // --------------------------------------------------------

    fn select_category(&mut self, index: usize) -> EventOutcome {
        let Some(category) = self.services.catalog.get(index).cloned() else {
            return EventOutcome::ignored();
        };
        debug!(session = self.id, category = %category.id, "category selected");

        let state = &mut self.state;
        state.mode = Mode::SearchingCategory;
        state.active_category = Some(category);
        state.filter_text = self.preset_filter.clone().unwrap_or_default();
        state.selected_parent = None;
        state.parent_preselected = false;
        state.saved_category_filter = None;
        state.focused_index = 0;
        state.last_fetch = None;
        self.refresh(FocusRule::FirstResult)
    }

    fn drill_into(&mut self, parent: SearchResult, preselected: bool) -> EventOutcome {
        debug!(
            session = self.id,
            parent = %parent.unique_id,
            preselected,
            "searching sub-items"
        );

        let state = &mut self.state;
        state.saved_category_filter = Some(std::mem::take(&mut state.filter_text));
        state.mode = Mode::SearchingSubItem;
        state.selected_parent = Some(parent);
        state.parent_preselected = preselected;
        state.filter_text = self.preset_filter.clone().unwrap_or_default();
        state.focused_index = 0;
        state.last_fetch = None;
        self.refresh(FocusRule::FirstResult)
    }

    fn pop_level(&mut self) -> EventOutcome {
        match self.state.mode {
            Mode::SearchingSubItem => {
                let state = &mut self.state;
                state.mode = Mode::SearchingCategory;
                state.selected_parent = None;
                state.parent_preselected = false;
                state.filter_text = state.saved_category_filter.take().unwrap_or_default();
                state.focused_index = 0;
                state.last_fetch = None;
                self.refresh(FocusRule::FirstResult)
            }
            Mode::SearchingCategory => {
                // Outstanding fetches belong to the discarded category.
                self.generation += 1;
                self.state = SessionState::default();
                EventOutcome::rerender()
            }
            Mode::AwaitingCategory => self.close(SessionExit::Cancelled),
        }
    }

    fn select_row(&mut self, row: usize) -> EventOutcome {
        let Some(category) = self.state.active_category.clone() else {
            return EventOutcome::ignored();
        };

        match self.state.mode {
            Mode::SearchingCategory => {
                if row == 0 {
                    return self.start_create(&category);
                }
                let Some(result) = self.state.visible_results.get(row - 1).cloned() else {
                    return EventOutcome::ignored();
                };
                if category.supports_drill_down() {
                    let preselected = self.is_container_row(&category, &result);
                    self.drill_into(result, preselected)
                } else {
                    let text = self.services.formatter.format(&ReferenceTarget::top(
                        &category,
                        &result.unique_id,
                        &result.display_name,
                    ));
                    self.commit(text)
                }
            }
            Mode::SearchingSubItem => {
                let Some(parent) = self.state.selected_parent.clone() else {
                    return EventOutcome::ignored();
                };
                if row == 0 {
                    return self.start_create_child(&parent);
                }
                if row == 1 && self.shows_parent_row() {
                    let text = self.services.formatter.format(&ReferenceTarget::top(
                        &category,
                        &parent.unique_id,
                        &parent.display_name,
                    ));
                    return self.commit(text);
                }
                let Some(child) = self
                    .state
                    .visible_results
                    .get(row - self.fixed_row_count())
                    .cloned()
                else {
                    return EventOutcome::ignored();
                };
                let text = self.services.formatter.format(&ReferenceTarget::sub_item(
                    &category,
                    &parent.unique_id,
                    &child.unique_id,
                    &child.display_name,
                ));
                self.commit(text)
            }
            Mode::AwaitingCategory => EventOutcome::ignored(),
        }
    }

    fn is_container_row(&self, category: &CategoryDescriptor, result: &SearchResult) -> bool {
        self.container.as_ref().is_some_and(|container| {
            container.category_id == category.id && container.entity.unique_id == result.unique_id
        })
    }

    // --------------------------------------------------------
    // Fetching
    // --------------------------------------------------------

    fn refetch_needed(&self) -> bool {
        if self.services.settings.refetch_policy() == RefetchPolicy::Always {
            return true;
        }
        let Some(last) = &self.state.last_fetch else {
            return true;
        };
        if self.state.scope().as_ref() != Some(&last.scope) || last.has_more {
            return true;
        }
        !self
            .state
            .filter_text
            .to_lowercase()
            .starts_with(&last.filter_text.to_lowercase())
    }

    fn refresh(&mut self, focus: FocusRule) -> EventOutcome {
        if !self.refetch_needed() {
            self.narrow_locally(focus);
            return EventOutcome::rerender();
        }

        let Some(category) = self.state.active_category.as_ref() else {
            return EventOutcome::rerender();
        };
        let target = match self.state.mode {
            Mode::SearchingSubItem => match self
                .state
                .selected_parent
                .as_ref()
                .and_then(|p| p.parent_ref.clone())
            {
                Some(parent) => FetchTarget::Children(parent),
                None => FetchTarget::Nothing,
            },
            _ => FetchTarget::for_category(category),
        };

        self.generation += 1;
        self.state.clear_results();
        self.state.loading = true;
        self.state.pending_focus = focus;
        self.state.focused_index = 0;

        let request = FetchRequest {
            ticket: FetchTicket(self.generation),
            target,
            query: self.state.filter_text.clone(),
            limit: self.services.settings.max_results(),
            extra_sources: self.services.settings.extra_sources(),
            focus,
        };
        debug!(
            session = self.id,
            ticket = self.generation,
            query = %request.query,
            "fetch issued"
        );
        EventOutcome::effect(Effect::Fetch(request))
    }

    fn narrow_locally(&mut self, focus: FocusRule) {
        let max = self.services.settings.max_results();
        let filter = self.state.filter_text.clone();
        let matching: Vec<_> = self
            .state
            .fetched
            .iter()
            .filter(|r| r.matches(&filter))
            .cloned()
            .collect();
        trace!(
            session = self.id,
            cached = self.state.last_fetch.as_ref().map_or(0, |last| last.row_count),
            matches = matching.len(),
            "narrowed cached results"
        );

        self.state.has_more = matching.len() > max;
        self.state.visible_results = matching.into_iter().take(max).collect();
        self.apply_focus(focus);
    }

    fn apply_focus(&mut self, focus: FocusRule) {
        self.state.focused_index = match focus {
            FocusRule::FirstResult if !self.state.visible_results.is_empty() => {
                self.fixed_row_count()
            }
            _ => 0,
        };
    }

    /// Lands the result of a fetch.
    ///
    /// Returns `Ok(false)` when the ticket is outdated or the session is no
    /// longer open; the result is dropped. A failed fetch leaves the list empty
    /// and returns the error; the session stays open.
    pub fn apply_fetch(
        &mut self,
        ticket: FetchTicket,
        result: MentionResult<SearchPage>,
    ) -> MentionResult<bool> {
        if !self.is_open() || ticket.0 != self.generation {
            debug!(
                session = self.id,
                ticket = ticket.0,
                current = self.generation,
                "discarding stale fetch"
            );
            return Ok(false);
        }
        self.state.loading = false;

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                warn!(session = self.id, error = %err, "fetch failed");
                self.state.clear_results();
                self.state.last_fetch = None;
                self.state.focused_index = 0;
                return Err(err);
            }
        };

        let max = self.services.settings.max_results();
        let row_count = page.hits.len();
        let mut results: Vec<SearchResult> = page.hits.into_iter().map(SearchResult::from).collect();

        if let Some(shortcut) = self.container_shortcut() {
            results.retain(|r| r.unique_id != shortcut.unique_id);
            results.insert(0, shortcut);
        }

        let has_more = page.has_more || results.len() > max;
        self.state.fetched = results.clone();
        results.truncate(max);
        self.state.visible_results = results;
        self.state.has_more = has_more;
        self.state.last_fetch = self.state.scope().map(|scope| LastFetch {
            scope,
            filter_text: self.state.filter_text.clone(),
            row_count,
            has_more: page.has_more,
        });

        self.apply_focus(self.state.pending_focus);

        debug!(
            session = self.id,
            ticket = ticket.0,
            rows = row_count,
            visible = self.state.visible_results.len(),
            "fetch applied"
        );
        Ok(true)
    }

    /// The "current container" row, when the session was opened inside a
    /// container of the active category and it matches the filter.
    fn container_shortcut(&self) -> Option<SearchResult> {
        if self.state.mode != Mode::SearchingCategory {
            return None;
        }
        let category = self.state.active_category.as_ref()?;
        let container = self.container.as_ref()?;
        if container.category_id != category.id || !container.entity.matches(&self.state.filter_text)
        {
            return None;
        }
        Some(container.entity.clone())
    }

    // --------------------------------------------------------
    // Create flows
    // --------------------------------------------------------

    fn start_create(&mut self, category: &CategoryDescriptor) -> EventOutcome {
        if !category.can_create {
            return EventOutcome::ignored();
        }
        let target = if category.is_external_source {
            CreateTarget::External {
                category_id: category.id.clone(),
            }
        } else {
            match &category.source_collection {
                Some(collection) => CreateTarget::Collection(collection.clone()),
                None => return EventOutcome::ignored(),
            }
        };
        self.begin_create(target)
    }

    fn start_create_child(&mut self, parent: &SearchResult) -> EventOutcome {
        match &parent.parent_ref {
            Some(parent_ref) => self.begin_create(CreateTarget::Child(parent_ref.clone())),
            None => EventOutcome::ignored(),
        }
    }

    fn begin_create(&mut self, target: CreateTarget) -> EventOutcome {
        debug!(session = self.id, seed = %self.state.filter_text, "create flow started");
        self.generation += 1;
        self.phase = Phase::Creating;
        self.listeners = None;
        EventOutcome::effect(Effect::Create(CreateRequest {
            target,
            seed_name: self.state.filter_text.clone(),
        }))
    }

    /// Finishes a create flow.
    ///
    /// A created entity is inserted as a reference; a cancelled flow (`None`)
    /// closes without inserting.
    pub fn complete_create(&mut self, created: Option<CreatedEntity>) -> MentionResult<SessionExit> {
        if self.phase != Phase::Creating {
            return Err(MentionError::SessionClosed);
        }
        let outcome = match created {
            Some(entity) => {
                let Some(category) = self.state.active_category.clone() else {
                    return Ok(self.finish(SessionExit::Cancelled));
                };
                let text = match (&self.state.mode, &self.state.selected_parent) {
                    (Mode::SearchingSubItem, Some(parent)) => {
                        self.services.formatter.format(&ReferenceTarget::sub_item(
                            &category,
                            &parent.unique_id,
                            &entity.unique_id,
                            &entity.display_name,
                        ))
                    }
                    _ => self.services.formatter.format(&ReferenceTarget::top(
                        &category,
                        &entity.unique_id,
                        &entity.display_name,
                    )),
                };
                self.surface.focus();
                self.surface.insert_text_at_saved_caret(&self.caret, &text);
                self.finish(SessionExit::Inserted(text))
            }
            None => {
                debug!(session = self.id, "create flow cancelled");
                self.finish(SessionExit::Cancelled)
            }
        };
        Ok(outcome)
    }

    // --------------------------------------------------------
    // Exit
    // --------------------------------------------------------

    /// Focuses the surface, inserts at the saved caret, and closes.
    fn commit(&mut self, text: String) -> EventOutcome {
        self.surface.focus();
        self.surface.insert_text_at_saved_caret(&self.caret, &text);
        self.close(SessionExit::Inserted(text))
    }

    fn close(&mut self, exit: SessionExit) -> EventOutcome {
        EventOutcome::exit(self.finish(exit))
    }

    fn finish(&mut self, exit: SessionExit) -> SessionExit {
        self.generation += 1;
        self.listeners = None;
        self.state.loading = false;
        debug!(session = self.id, ?exit, "mention session closed");
        self.phase = Phase::Closed(exit.clone());
        exit
    }

    /// Closes the session without inserting anything.
    ///
    /// Safe to call on a session that already ended.
    pub fn dispose(&mut self) {
        if self.exit().is_none() {
            self.finish(SessionExit::Cancelled);
        }
    }
}

impl std::fmt::Debug for MentionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MentionSession")
            .field("id", &self.id)
            .field("surface", &self.surface.id())
            .field("phase", &self.phase)
            .field("mode", &self.state.mode)
            .field("focused_index", &self.state.focused_index)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::ContainerContext;
    use crate::memory::MemoryStore;
    use crate::store::{ParentRef, SearchHit};
    use crate::testing::{FakeSurface, RecordingRegistry};
    use pretty_assertions::assert_eq;

    struct Fixture {
        store: Arc<MemoryStore>,
        surface: Arc<FakeSurface>,
        registry: Arc<RecordingRegistry>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_surface(FakeSurface::new(1))
        }

        fn with_surface(surface: FakeSurface) -> Self {
            Self {
                store: Arc::new(MemoryStore::new()),
                surface: Arc::new(surface),
                registry: Arc::new(RecordingRegistry::default()),
            }
        }

        fn open(&self, settings: MentionSettings) -> MentionSession {
            self.open_with(CategoryCatalog::standard(), settings)
        }

        fn open_with(&self, catalog: CategoryCatalog, settings: MentionSettings) -> MentionSession {
            let services = SessionServices::new(catalog, self.store.clone(), self.registry.clone())
                .with_settings(settings);
            MentionSession::open(1, self.surface.clone(), services)
        }
    }

    fn names(session: &MentionSession) -> Vec<&str> {
        session
            .visible_results()
            .iter()
            .map(|r| r.display_name.as_str())
            .collect()
    }

    async fn type_text(session: &mut MentionSession, text: &str) {
        for c in text.chars() {
            session.dispatch(MentionEvent::char(c)).await.unwrap();
        }
    }

    #[test]
    fn test_open_estimates_position() {
        let fx = Fixture::new();
        let session = fx.open(MentionSettings::default());

        assert_eq!(session.popup_position(), PopupPlacement::new(110.0, 40.0));
        assert_eq!(session.mode(), Mode::AwaitingCategory);
        assert_eq!(session.row_count(), 5);
        assert!(session.has_listeners());
        assert_eq!(fx.registry.active().len(), 1);
    }

    #[test]
    fn test_open_without_caret_uses_origin() {
        let fx = Fixture::with_surface(FakeSurface::new(1).with_caret_geometry(None));
        let mut session = fx.open(MentionSettings::default());

        assert_eq!(session.popup_position(), PopupPlacement::ORIGIN);
        assert!(!session.refine_position(Size::new(200.0, 100.0), Size::new(800.0, 600.0)));
    }

    #[test]
    fn test_refine_position_reports_change() {
        let fx = Fixture::with_surface(
            FakeSurface::new(1)
                .with_caret_geometry(Some(mentionkit_position::CaretGeometry::new(
                    100.0, 700.0, 1.0, 16.0,
                ))),
        );
        let mut session = fx.open(MentionSettings::default());
        assert_eq!(session.popup_position().top, 395.0);

        let viewport = Size::new(1280.0, 800.0);
        assert!(session.refine_position(Size::new(200.0, 120.0), viewport));
        assert_eq!(session.popup_position().top, 575.0);
        assert!(!session.refine_position(Size::new(200.0, 120.0), viewport));
    }

    #[test]
    fn test_unknown_trigger_is_ignored() {
        let fx = Fixture::new();
        let mut session = fx.open(MentionSettings::default());

        let outcome = session.handle_event(MentionEvent::char('x')).unwrap();
        assert!(!outcome.rerender);
        assert!(outcome.effect.is_none());
        assert_eq!(session.mode(), Mode::AwaitingCategory);
    }

    #[test]
    fn test_escape_in_menu_inserts_trigger() {
        let fx = Fixture::new();
        let mut session = fx.open(MentionSettings::default());

        let outcome = session.handle_event(MentionKey::Escape.into()).unwrap();
        assert_eq!(
            outcome.exit_reason(),
            Some(&SessionExit::Inserted("@".to_string()))
        );
        assert_eq!(fx.surface.inserted(), vec!["@".to_string()]);
        assert_eq!(fx.surface.focus_count(), 1);
        assert!(fx.registry.active().is_empty());
    }

    #[test]
    fn test_backspace_in_menu_cancels() {
        let fx = Fixture::new();
        let mut session = fx.open(MentionSettings::default());

        session.handle_event(MentionKey::Backspace.into()).unwrap();
        assert_eq!(session.exit(), Some(&SessionExit::Cancelled));
        assert!(fx.surface.inserted().is_empty());
        assert!(!session.has_listeners());

        let err = session.handle_event(MentionKey::Enter.into()).unwrap_err();
        assert!(matches!(err, MentionError::SessionClosed));
    }

    #[test]
    fn test_stale_fetch_is_discarded() {
        let fx = Fixture::new();
        let mut session = fx.open(MentionSettings::default());

        let first = session.handle_event(MentionEvent::char('a')).unwrap();
        let first = first.fetch().unwrap().ticket;
        let second = session.handle_event(MentionEvent::char('g')).unwrap();
        let second = second.fetch().unwrap().ticket;
        assert!(second > first);

        let stale = SearchPage::new(vec![SearchHit::new("Actor.1", "Orc")], false);
        assert!(!session.apply_fetch(first, Ok(stale)).unwrap());
        assert!(session.visible_results().is_empty());

        let fresh = SearchPage::new(vec![SearchHit::new("Actor.2", "Goblin")], false);
        assert!(session.apply_fetch(second, Ok(fresh)).unwrap());
        assert_eq!(names(&session), vec!["Goblin"]);
        assert_eq!(session.focused_index(), 1);
    }

    #[test]
    fn test_issuing_fetch_clears_results() {
        let fx = Fixture::new();
        let mut session = fx.open(MentionSettings::default());

        let outcome = session.handle_event(MentionEvent::char('a')).unwrap();
        let ticket = outcome.fetch().unwrap().ticket;
        let page = SearchPage::new(vec![SearchHit::new("Actor.1", "Orc")], false);
        session.apply_fetch(ticket, Ok(page)).unwrap();
        assert_eq!(session.visible_results().len(), 1);

        session.handle_event(MentionEvent::char('o')).unwrap();
        assert!(session.visible_results().is_empty());
        assert!(session.view_model().loading);
    }

    #[tokio::test]
    async fn test_results_are_truncated() {
        let fx = Fixture::new();
        for name in ["Goblin", "Gnoll", "Ghoul"] {
            fx.store.insert("actors", name);
        }
        let mut session = fx.open(MentionSettings::default().with_result_length(2));

        session.dispatch(MentionEvent::char('a')).await.unwrap();
        assert_eq!(names(&session), vec!["Ghoul", "Gnoll"]);
        assert!(session.view_model().has_more_results);
        assert_eq!(session.row_count(), 3);
    }

    #[tokio::test]
    async fn test_hover_rerenders_only_on_change() {
        let fx = Fixture::new();
        fx.store.insert("actors", "Goblin");
        let mut session = fx.open(MentionSettings::default());
        session.dispatch(MentionEvent::char('a')).await.unwrap();
        assert_eq!(session.focused_index(), 1);

        let same = session.handle_event(MentionEvent::Hover { row: 1 }).unwrap();
        assert!(!same.rerender);
        let moved = session.handle_event(MentionEvent::Hover { row: 0 }).unwrap();
        assert!(moved.rerender);
        assert_eq!(session.focused_index(), 0);
        let outside = session.handle_event(MentionEvent::Hover { row: 9 }).unwrap();
        assert!(!outside.rerender);
    }

    #[tokio::test]
    async fn test_backspace_with_filter_focuses_create_row() {
        let fx = Fixture::new();
        fx.store.insert("actors", "Goblin");
        let mut session = fx.open(MentionSettings::default());
        session.dispatch(MentionEvent::char('a')).await.unwrap();
        type_text(&mut session, "go").await;
        assert_eq!(session.focused_index(), 1);

        session.dispatch(MentionKey::Backspace.into()).await.unwrap();
        assert_eq!(session.filter_text(), "g");
        assert_eq!(names(&session), vec!["Goblin"]);
        assert_eq!(session.focused_index(), 0);
    }

    #[tokio::test]
    async fn test_reuse_prefix_narrows_locally() {
        let fx = Fixture::new();
        for name in ["Goblin", "Gnoll", "Orc"] {
            fx.store.insert("actors", name);
        }
        let settings = MentionSettings::default().with_refetch_policy(RefetchPolicy::ReusePrefix);
        let mut session = fx.open(settings);
        session.dispatch(MentionEvent::char('a')).await.unwrap();
        assert_eq!(names(&session), vec!["Gnoll", "Goblin", "Orc"]);

        let outcome = session.dispatch(MentionEvent::char('G')).await.unwrap();
        assert!(outcome.fetch().is_none());
        assert_eq!(names(&session), vec!["Gnoll", "Goblin"]);
        assert_eq!(session.focused_index(), 1);
    }

    #[tokio::test]
    async fn test_reuse_prefix_refetches_incomplete_cache() {
        let fx = Fixture::new();
        for name in ["Goblin", "Gnoll", "Orc"] {
            fx.store.insert("actors", name);
        }
        let settings = MentionSettings::default()
            .with_refetch_policy(RefetchPolicy::ReusePrefix)
            .with_result_length(1);
        let mut session = fx.open(settings);
        session.dispatch(MentionEvent::char('a')).await.unwrap();

        let outcome = session.dispatch(MentionEvent::char('o')).await.unwrap();
        assert!(outcome.fetch().is_some());
    }

    #[test]
    fn test_local_narrowing_recomputes_has_more() {
        let fx = Fixture::new();
        let settings = MentionSettings::default()
            .with_refetch_policy(RefetchPolicy::ReusePrefix)
            .with_result_length(2);
        let mut session = fx.open(settings);

        let outcome = session.handle_event(MentionEvent::char('a')).unwrap();
        let ticket = outcome.fetch().unwrap().ticket;
        let hits = ["Gnoll", "Goblin", "Orc"]
            .into_iter()
            .enumerate()
            .map(|(i, name)| SearchHit::new(format!("Actor.{}", i), name))
            .collect();
        session.apply_fetch(ticket, Ok(SearchPage::new(hits, false))).unwrap();
        assert_eq!(names(&session), vec!["Gnoll", "Goblin"]);
        assert!(session.view_model().has_more_results);

        let outcome = session.handle_event(MentionEvent::char('r')).unwrap();
        assert!(outcome.fetch().is_none());
        assert_eq!(names(&session), vec!["Orc"]);
        assert!(!session.view_model().has_more_results);

        session.handle_event(MentionKey::Backspace.into()).unwrap();
        session.handle_event(MentionEvent::char('o')).unwrap();
        assert_eq!(names(&session), vec!["Gnoll", "Goblin"]);
        assert!(session.view_model().has_more_results);
    }

    #[tokio::test]
    async fn test_always_policy_fetches_every_key() {
        let fx = Fixture::new();
        fx.store.insert("actors", "Goblin");
        let mut session = fx.open(MentionSettings::default());
        session.dispatch(MentionEvent::char('a')).await.unwrap();

        for c in "gob".chars() {
            let outcome = session.dispatch(MentionEvent::char(c)).await.unwrap();
            assert!(outcome.fetch().is_some());
        }
    }

    #[test]
    fn test_fetch_error_keeps_session_open() {
        let fx = Fixture::new();
        let mut session = fx.open(MentionSettings::default());

        let outcome = session.handle_event(MentionEvent::char('a')).unwrap();
        let ticket = outcome.fetch().unwrap().ticket;
        let err = session
            .apply_fetch(ticket, Err(crate::error::StoreError::query("actors", "offline").into()))
            .unwrap_err();

        assert!(matches!(err, MentionError::Store(_)));
        assert!(session.is_open());
        assert!(session.visible_results().is_empty());
        assert_eq!(session.focused_index(), 0);
        assert!(!session.view_model().loading);
    }

    #[tokio::test]
    async fn test_preset_selection_seeds_and_is_replaced() {
        let fx = Fixture::with_surface(FakeSurface::new(1).with_selection("Gob"));
        fx.store.insert("actors", "Goblin");
        fx.store.insert("actors", "Orc");
        let mut session = fx.open(MentionSettings::default());

        session.dispatch(MentionEvent::char('a')).await.unwrap();
        assert_eq!(session.filter_text(), "Gob");
        assert_eq!(names(&session), vec!["Goblin"]);

        session.dispatch(MentionEvent::char('o')).await.unwrap();
        assert_eq!(session.filter_text(), "o");
        assert_eq!(names(&session), vec!["Goblin", "Orc"]);

        session.dispatch(MentionEvent::char('r')).await.unwrap();
        assert_eq!(session.filter_text(), "or");
    }

    #[tokio::test]
    async fn test_container_row_preselects_parent() {
        let store = Arc::new(MemoryStore::new());
        let (lore_id, pages) = store.insert_container("journal", "Lore");
        store.insert_container("journal", "Atlas");
        pages.insert("History");

        let mut lore = SearchResult::new(&lore_id, "Lore");
        lore.parent_ref = Some(ParentRef::new(pages.clone()));
        let surface = FakeSurface::new(1).with_container(ContainerContext {
            category_id: "JournalEntry".to_string(),
            entity: lore,
        });
        let fx = Fixture {
            store,
            ..Fixture::with_surface(surface)
        };
        let mut session = fx.open(MentionSettings::default());

        session.dispatch(MentionEvent::char('j')).await.unwrap();
        assert_eq!(names(&session), vec!["Lore", "Atlas"]);
        assert_eq!(session.focused_index(), 1);

        session.dispatch(MentionKey::Enter.into()).await.unwrap();
        assert_eq!(session.mode(), Mode::SearchingSubItem);
        assert_eq!(session.fixed_row_count(), 1);
        assert!(!session.view_model().shows_parent_row);
        assert_eq!(names(&session), vec!["History"]);
        assert_eq!(session.focused_index(), 1);

        session.dispatch(MentionKey::Enter.into()).await.unwrap();
        assert_eq!(
            fx.surface.inserted(),
            vec![format!("@UUID[{}.JournalEntryPage.p0000]{{History}}", lore_id)]
        );
    }

    #[tokio::test]
    async fn test_create_flow_inserts_reference() {
        let fx = Fixture::new();
        fx.store.insert("actors", "Goblin");
        let mut session = fx.open(MentionSettings::default());
        session.dispatch(MentionEvent::char('a')).await.unwrap();
        type_text(&mut session, "Bob").await;
        assert_eq!(session.focused_index(), 0);

        let outcome = session.dispatch(MentionKey::Enter.into()).await.unwrap();
        let expected = "@UUID[actors.0001]{Bob}".to_string();
        assert_eq!(outcome.exit_reason(), Some(&SessionExit::Inserted(expected.clone())));
        assert_eq!(fx.surface.inserted(), vec![expected]);
        assert_eq!(fx.store.count("actors"), 2);
        assert!(fx.registry.active().is_empty());
    }

    #[test]
    fn test_create_cancelled_inserts_nothing() {
        let fx = Fixture::new();
        let mut session = fx.open(MentionSettings::default());
        session.handle_event(MentionEvent::char('a')).unwrap();

        let outcome = session.handle_event(MentionKey::Enter.into()).unwrap();
        assert!(matches!(outcome.effect, Some(Effect::Create(_))));
        assert!(session.is_creating());
        assert!(!session.has_listeners());

        let exit = session.complete_create(None).unwrap();
        assert_eq!(exit, SessionExit::Cancelled);
        assert!(fx.surface.inserted().is_empty());
        assert!(session.complete_create(None).is_err());
    }

    #[test]
    fn test_create_row_inert_when_not_creatable() {
        let fx = Fixture::new();
        let catalog = CategoryCatalog::new([CategoryDescriptor::new("Scene", "Scenes")
            .with_trigger('s')
            .with_collection("scenes")
            .creatable(false)]);
        let mut session = fx.open_with(catalog, MentionSettings::default());
        session.handle_event(MentionEvent::char('s')).unwrap();

        let outcome = session.handle_event(MentionKey::Enter.into()).unwrap();
        assert!(outcome.effect.is_none());
        assert!(session.is_open());
        assert!(!session.view_model().can_create);
    }

    #[test]
    fn test_add_name_off() {
        let fx = Fixture::new();
        let mut session = fx.open(MentionSettings::default().with_add_name(false));
        let outcome = session.handle_event(MentionEvent::char('a')).unwrap();
        let ticket = outcome.fetch().unwrap().ticket;
        let page = SearchPage::new(vec![SearchHit::new("Actor.1", "Orc")], false);
        session.apply_fetch(ticket, Ok(page)).unwrap();

        session.handle_event(MentionKey::Enter.into()).unwrap();
        assert_eq!(fx.surface.inserted(), vec!["@UUID[Actor.1]".to_string()]);
    }

    struct BareLabels;

    impl SettingsStore for BareLabels {
        fn max_results(&self) -> usize {
            5
        }

        fn extra_sources(&self) -> Vec<String> {
            Vec::new()
        }

        fn add_name(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_settings_store_controls_label() {
        let fx = Fixture::new();
        let services =
            SessionServices::new(CategoryCatalog::standard(), fx.store.clone(), fx.registry.clone())
                .with_settings_store(Arc::new(BareLabels));
        let mut session = MentionSession::open(1, fx.surface.clone(), services);

        let outcome = session.handle_event(MentionEvent::char('a')).unwrap();
        let ticket = outcome.fetch().unwrap().ticket;
        let page = SearchPage::new(vec![SearchHit::new("Actor.1", "Orc")], false);
        session.apply_fetch(ticket, Ok(page)).unwrap();

        session.handle_event(MentionKey::Enter.into()).unwrap();
        assert_eq!(fx.surface.inserted(), vec!["@UUID[Actor.1]".to_string()]);
    }

    #[test]
    fn test_dispose_removes_listeners() {
        let fx = Fixture::new();
        let mut session = fx.open(MentionSettings::default());
        session.dispose();
        session.dispose();

        assert_eq!(session.exit(), Some(&SessionExit::Cancelled));
        assert!(fx.registry.active().is_empty());
        assert_eq!(fx.registry.registered(), 1);
    }
}
