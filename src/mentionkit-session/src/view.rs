//! Serializable snapshot handed to the popup renderer.

use mentionkit_position::PopupPlacement;
use serde::Serialize;

use crate::category::CategoryDescriptor;
use crate::store::SearchResult;

/// Top-level interaction mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// The category menu is shown.
    AwaitingCategory,
    /// Searching entities of the active category.
    SearchingCategory,
    /// Searching children of the selected parent.
    SearchingSubItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryView {
    pub id: String,
    pub display_name: String,
    /// Trigger keys, uppercased for display.
    pub trigger_keys: Vec<String>,
}

impl From<&CategoryDescriptor> for CategoryView {
    fn from(category: &CategoryDescriptor) -> Self {
        Self {
            id: category.id.clone(),
            display_name: category.display_name.clone(),
            trigger_keys: category
                .trigger_keys
                .iter()
                .map(|k| k.to_uppercase())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultView {
    pub unique_id: String,
    pub display_name: String,
    pub has_children: bool,
}

impl From<&SearchResult> for ResultView {
    fn from(result: &SearchResult) -> Self {
        Self {
            unique_id: result.unique_id.clone(),
            display_name: result.display_name.clone(),
            has_children: result.has_children(),
        }
    }
}

/// Everything the popup template needs to draw one frame.
///
/// In search modes the rows are: the "create" row, then the "whole parent"
/// row when searching an explicitly chosen parent, then `visible_results`.
/// `focused_index` counts rows in that order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewModel {
    pub mode: Mode,
    pub category_list: Vec<CategoryView>,
    pub focused_index: usize,
    pub filter_text: String,
    pub visible_results: Vec<ResultView>,
    pub active_category_label: Option<String>,
    pub selected_parent_name: Option<String>,
    /// Whether the "whole parent" row is shown.
    pub shows_parent_row: bool,
    /// Whether the "create" row is actionable.
    pub can_create: bool,
    pub has_more_results: bool,
    /// A fetch is in flight.
    pub loading: bool,
    pub popup_position: PopupPlacement,
}
